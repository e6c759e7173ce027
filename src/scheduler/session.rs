// src/scheduler/session.rs

use crate::audio::{open_output, AudioDeviceDescriptor, AudioDriver, AudioError, OutputHandle};
use crate::catalog::SoundAsset;
use crate::scheduler::state::{ActiveSessionInfo, PlaybackStrategy, ScheduleItem};
use crate::scheduler::SchedulerInner;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

const LOG_TARGET: &str = "r_alertsound::scheduler::session";

/// Shortest time between the starts of two looped cycles. Keeps near-empty
/// clips from replaying in a tight loop.
pub const MIN_CYCLE_INTERVAL: Duration = Duration::from_millis(50);

/// Which cancellation source ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// The facade's stop-everything scope.
    Global,
    /// The caller-supplied per-alert token.
    Caller,
}

/// How a playback session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed { cycles: u32 },
    Cancelled(CancelSource),
    /// The driver reported an error mid-stream.
    DriverError(AudioError),
}

/// How a single play cycle ended.
enum CycleEnd {
    Finished,
    DeadlineReached,
    Cancelled(CancelSource),
    Failed(AudioError),
}

/// Exclusive ownership of one device handle for one item's playback.
/// Dropping the session stops the stream, closes the device and clears the
/// asset's `playing` flag.
pub struct PlaybackSession {
    handle: Box<dyn OutputHandle>,
    asset: Arc<SoundAsset>,
    strategy: PlaybackStrategy,
    correlation_id: String,
    streaming: bool,
}

impl PlaybackSession {
    /// Acquires a fresh output handle for `selected` (with transport fallback).
    pub fn open(
        driver: &dyn AudioDriver,
        selected: Option<&AudioDeviceDescriptor>,
        asset: Arc<SoundAsset>,
        strategy: PlaybackStrategy,
        correlation_id: String,
    ) -> Result<Self, AudioError> {
        let handle = open_output(driver, selected)?;
        asset.set_playing(true);
        debug!(target: LOG_TARGET, correlation_id = %correlation_id, handle = handle.id(), ?strategy, "Playback session opened.");
        Ok(Self {
            handle,
            asset,
            strategy,
            correlation_id,
            streaming: false,
        })
    }

    /// Stops the device if a stream is in flight. Idempotent.
    fn stop(&mut self) {
        if self.streaming {
            trace!(target: LOG_TARGET, correlation_id = %self.correlation_id, handle = self.handle.id(), "Stopping output.");
            self.handle.stop();
            self.streaming = false;
        }
    }

    /// Plays the asset once from its start and races completion against both
    /// cancellation sources and the optional deadline.
    async fn play_cycle(
        &mut self,
        deadline: Option<Instant>,
        global: &CancellationToken,
        caller: &CancellationToken,
    ) -> Result<CycleEnd, AudioError> {
        let completion = self.handle.play(self.asset.path())?;
        self.streaming = true;

        let deadline_reached = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let end = tokio::select! {
            biased;
            _ = global.cancelled() => CycleEnd::Cancelled(CancelSource::Global),
            _ = caller.cancelled() => CycleEnd::Cancelled(CancelSource::Caller),
            _ = deadline_reached => CycleEnd::DeadlineReached,
            result = completion => match result {
                Ok(Ok(())) => CycleEnd::Finished,
                Ok(Err(e)) => CycleEnd::Failed(e),
                Err(_) => CycleEnd::Failed(AudioError::PlaybackError(
                    "output dropped its completion signal".to_string(),
                )),
            },
        };

        match end {
            CycleEnd::Finished | CycleEnd::Failed(_) => self.streaming = false,
            CycleEnd::DeadlineReached | CycleEnd::Cancelled(_) => self.stop(),
        }
        Ok(end)
    }

    /// Runs the session's strategy to completion or cancellation.
    /// `Err` only when the driver refuses to start a stream.
    #[instrument(skip(self, global, caller), fields(correlation_id = %self.correlation_id, asset = %self.asset.name()))]
    pub async fn run(
        &mut self,
        global: &CancellationToken,
        caller: &CancellationToken,
    ) -> Result<SessionOutcome, AudioError> {
        let deadline = match self.strategy {
            PlaybackStrategy::BoundedLoop(duration) => Some(Instant::now() + duration),
            PlaybackStrategy::ContinuousLoop | PlaybackStrategy::PlayOnce => None,
        };
        let mut cycles = 0u32;

        loop {
            if let Some(at) = deadline {
                if Instant::now() >= at {
                    return Ok(SessionOutcome::Completed { cycles });
                }
            }

            let cycle_started = Instant::now();
            match self.play_cycle(deadline, global, caller).await? {
                CycleEnd::Finished => {
                    cycles += 1;
                    if self.strategy == PlaybackStrategy::PlayOnce {
                        return Ok(SessionOutcome::Completed { cycles });
                    }
                    let next_start = cycle_started + MIN_CYCLE_INTERVAL;
                    if Instant::now() < next_start {
                        trace!(target: LOG_TARGET, cycles, "Clip shorter than the minimum cycle, pacing replay.");
                        let resume = deadline.map_or(next_start, |at| at.min(next_start));
                        tokio::select! {
                            biased;
                            _ = global.cancelled() => return Ok(SessionOutcome::Cancelled(CancelSource::Global)),
                            _ = caller.cancelled() => return Ok(SessionOutcome::Cancelled(CancelSource::Caller)),
                            _ = sleep_until(resume) => {}
                        }
                    }
                    trace!(target: LOG_TARGET, cycles, "Cycle finished, replaying from start.");
                }
                CycleEnd::DeadlineReached => {
                    cycles += 1;
                    debug!(target: LOG_TARGET, cycles, "Duration elapsed mid-cycle, stream truncated.");
                    return Ok(SessionOutcome::Completed { cycles });
                }
                CycleEnd::Cancelled(source) => return Ok(SessionOutcome::Cancelled(source)),
                CycleEnd::Failed(e) => return Ok(SessionOutcome::DriverError(e)),
            }
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop();
        self.handle.close();
        self.asset.set_playing(false);
        debug!(target: LOG_TARGET, correlation_id = %self.correlation_id, handle = self.handle.id(), "Playback session released.");
    }
}

/// Plays one dequeued item: waits for the session gate, opens the currently
/// selected device and runs the category's strategy.
#[instrument(skip(inner, item, scope), fields(correlation_id = %item.correlation_id, asset = %item.asset.name()))]
pub(crate) async fn play_one(
    inner: Arc<SchedulerInner>,
    item: ScheduleItem,
    scope: CancellationToken,
) -> Result<SessionOutcome, AudioError> {
    if let Some(source) = cancelled_source(&scope, &item.cancel) {
        info!(target: LOG_TARGET, ?source, "Alert cancelled before playback started.");
        return Ok(SessionOutcome::Cancelled(source));
    }

    let _gate = tokio::select! {
        biased;
        _ = scope.cancelled() => return Ok(SessionOutcome::Cancelled(CancelSource::Global)),
        _ = item.cancel.cancelled() => return Ok(SessionOutcome::Cancelled(CancelSource::Caller)),
        gate = inner.session_gate.lock() => gate,
    };

    let strategy = inner.strategy_for(item.category());
    let selected = inner.devices.selected();
    let mut session = PlaybackSession::open(
        inner.driver.as_ref(),
        selected.as_ref(),
        Arc::clone(&item.asset),
        strategy,
        item.correlation_id.clone(),
    )?;

    inner.set_active(Some(ActiveSessionInfo {
        correlation_id: item.correlation_id.clone(),
        asset_name: item.asset.name().to_string(),
        category: item.category(),
        strategy,
        started_at: SystemTime::now(),
    }));
    info!(target: LOG_TARGET, ?strategy, priority = item.priority, "Playback started.");

    let outcome = session.run(&scope, &item.cancel).await;
    drop(session);
    inner.set_active(None);

    match &outcome {
        Ok(SessionOutcome::DriverError(e)) => {
            error!(target: LOG_TARGET, "Output reported an error mid-playback: {}", e);
        }
        Err(e) => warn!(target: LOG_TARGET, "Output refused to start the stream: {}", e),
        Ok(_) => {}
    }
    outcome
}

fn cancelled_source(scope: &CancellationToken, caller: &CancellationToken) -> Option<CancelSource> {
    if scope.is_cancelled() {
        Some(CancelSource::Global)
    } else if caller.is_cancelled() {
        Some(CancelSource::Caller)
    } else {
        None
    }
}
