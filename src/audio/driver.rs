use crate::audio::device::{AudioDeviceDescriptor, TransportKind};
use crate::audio::error::AudioError;
use std::path::Path;
use tokio::sync::oneshot;
use tracing::{info, warn};

const LOG_TARGET: &str = "r_alertsound::audio::driver";

/// Completion signal for a single `play` call. Resolves once the stream
/// finishes naturally (`Ok`) or fails mid-stream (`Err`). A stopped stream
/// may drop the sender without resolving.
pub type PlaybackCompletion = oneshot::Receiver<Result<(), AudioError>>;

/// An open output device. Exactly one exists at a time, owned by the
/// currently running playback session.
pub trait OutputHandle: Send {
    /// Identifier used in diagnostics.
    fn id(&self) -> u64;

    /// Starts rendering the linear-PCM file at `path` from its beginning.
    fn play(&mut self, path: &Path) -> Result<PlaybackCompletion, AudioError>;

    /// Requests the current stream to stop and returns without waiting for
    /// the backend. Safe to call when idle.
    fn stop(&mut self);

    /// Waits for any stopping stream, then releases the device. The handle is
    /// unusable afterwards.
    fn close(&mut self);
}

/// Factory for output handles, keyed by transport kind.
pub trait AudioDriver: Send + Sync {
    /// Opens `device` (or the platform default when `None`) using `kind`.
    fn open(
        &self,
        device: Option<&AudioDeviceDescriptor>,
        kind: TransportKind,
    ) -> Result<Box<dyn OutputHandle>, AudioError>;
}

/// Opens a fresh handle for `selected`, falling back to the platform default
/// event-driven output when the preferred transport fails to initialize.
pub fn open_output(
    driver: &dyn AudioDriver,
    selected: Option<&AudioDeviceDescriptor>,
) -> Result<Box<dyn OutputHandle>, AudioError> {
    let preferred = selected.map_or(TransportKind::EventDriven, |d| d.transport);
    let device_name = selected.map_or("platform default", |d| d.name.as_str());

    match driver.open(selected, preferred) {
        Ok(handle) => {
            info!(target: LOG_TARGET, device = %device_name, transport = %preferred, handle = handle.id(), "Output device opened.");
            Ok(handle)
        }
        Err(e) if preferred != TransportKind::EventDriven || selected.is_some() => {
            warn!(
                target: LOG_TARGET,
                device = %device_name,
                "Failed to open output with {} transport ({}). Downgrading to event-driven platform default.",
                preferred, e
            );
            let handle = driver.open(None, TransportKind::EventDriven).map_err(|fallback_err| {
                AudioError::DeviceOpen(format!(
                    "{} ({}); fallback to event-driven default also failed: {}",
                    device_name, e, fallback_err
                ))
            })?;
            info!(target: LOG_TARGET, handle = handle.id(), "Fallback output device opened.");
            Ok(handle)
        }
        Err(e) => Err(AudioError::DeviceOpen(format!("{}: {}", device_name, e))),
    }
}
