use crate::audio::error::AudioError;
use alsa::nix::errno::Errno;
use alsa::pcm::{Access, Format, HwParams, State as PcmState, PCM};
use alsa::{Direction, ValueOr};
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use symphonia::core::audio::SignalSpec;
use tracing::instrument;
use tracing::{debug, error, info, warn};

const LOG_TARGET: &str = "r_alertsound::audio::alsa_handler";

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Manages one ALSA PCM device for audio output.
pub struct AlsaPcmHandler {
    device_name: String,
    pcm: Option<PCM>,
    configured_spec: Option<SignalSpec>,
}

impl AlsaPcmHandler {
    pub fn new(device_name: &str) -> Self {
        debug!(target: LOG_TARGET, "Creating AlsaPcmHandler for device: {}", device_name);
        AlsaPcmHandler {
            device_name: device_name.to_string(),
            pcm: None,
            configured_spec: None,
        }
    }

    /// Opens the PCM without configuring it, so open failures surface before
    /// any stream is decoded.
    pub fn check_open(&mut self) -> Result<(), AudioError> {
        if self.pcm.is_none() {
            self.pcm = Some(self.open_pcm()?);
        }
        Ok(())
    }

    fn open_pcm(&self) -> Result<PCM, AudioError> {
        let device = CString::new(self.device_name.clone())
            .map_err(|e| AudioError::DeviceOpen(format!("Invalid device name: {}", e)))?;
        PCM::open(&device, Direction::Playback, false)
            .map_err(|e| AudioError::DeviceOpen(format!("{}: {}", self.device_name, e)))
    }

    /// Configures the PCM for `spec`. Reopens the device when the spec
    /// changes, since hardware params cannot be renegotiated in place.
    #[instrument(skip(self, spec), fields(device = %self.device_name, rate = spec.rate, channels = spec.channels.count()))]
    pub fn configure(&mut self, spec: SignalSpec) -> Result<(), AudioError> {
        if self.configured_spec == Some(spec) {
            if let Some(pcm) = &self.pcm {
                if pcm.state() == PcmState::Setup {
                    pcm.prepare()?;
                }
                return Ok(());
            }
        }

        self.close();
        let pcm = self.open_pcm()?;
        {
            let hwp = HwParams::any(&pcm)?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(Format::s16())?;
            hwp.set_channels(spec.channels.count() as u32)?;
            hwp.set_rate_near(spec.rate, ValueOr::Nearest)?;
            let actual_rate = hwp.get_rate()?;
            if actual_rate != spec.rate {
                warn!(target: LOG_TARGET, "ALSA rate negotiation: requested={}, actual={}", spec.rate, actual_rate);
            }
            pcm.hw_params(&hwp)?;

            let swp = pcm.sw_params_current()?;
            let buffer_size = hwp.get_buffer_size()?;
            let period_size = hwp.get_period_size()?;
            swp.set_start_threshold(buffer_size - period_size)?;
            pcm.sw_params(&swp)?;
            debug!(target: LOG_TARGET, "ALSA parameters applied (buffer={}, period={}).", buffer_size, period_size);
        }

        self.pcm = Some(pcm);
        self.configured_spec = Some(spec);
        info!(target: LOG_TARGET, "ALSA device '{}' configured.", self.device_name);
        Ok(())
    }

    /// Writes S16 interleaved samples, handling ALSA underruns.
    /// Returns `Ok(0)` when an underrun occurred and was recovered.
    pub fn write_s16_buffer(&self, buffer: &[i16]) -> Result<usize, AudioError> {
        let pcm = self
            .pcm
            .as_ref()
            .ok_or(AudioError::InvalidState("PCM not initialized for writing".to_string()))?;
        let io = pcm.io_i16()?;

        match io.writei(buffer) {
            Ok(frames_written) => Ok(frames_written),
            Err(e) if e.errno() == Errno::EPIPE => {
                warn!(target: LOG_TARGET, "ALSA buffer underrun (EPIPE), attempting recovery...");
                match pcm.recover(libc::EPIPE, true) {
                    Ok(()) => Ok(0),
                    Err(recover_err) => {
                        error!(target: LOG_TARGET, "ALSA underrun recovery failed: {}", recover_err);
                        Err(AudioError::AlsaError(format!("ALSA recovery failed: {}", recover_err)))
                    }
                }
            }
            Err(e) => {
                error!(target: LOG_TARGET, "ALSA write error: {}", e);
                Err(AudioError::AlsaError(e.to_string()))
            }
        }
    }

    /// Waits for queued frames to play out, polling `stop_flag` so a stop
    /// request never waits for the whole hardware buffer.
    /// Returns `Ok(false)` when stopped before the buffer emptied.
    pub fn drain_unless_stopped(&self, stop_flag: &AtomicBool) -> Result<bool, AudioError> {
        let Some(pcm) = &self.pcm else {
            return Ok(true);
        };
        let buffer_size = pcm.hw_params_current()?.get_buffer_size()?;
        loop {
            if stop_flag.load(Ordering::Acquire) {
                self.drop_stream();
                return Ok(false);
            }
            match pcm.state() {
                // Short clips may never reach the start threshold.
                PcmState::Prepared => {
                    if let Err(e) = pcm.start() {
                        debug!(target: LOG_TARGET, "Nothing left to play out ({}).", e);
                        break;
                    }
                }
                PcmState::Running => {
                    if pcm.avail_update()? >= buffer_size {
                        break;
                    }
                    thread::sleep(DRAIN_POLL_INTERVAL);
                }
                _ => break,
            }
        }
        if pcm.state() == PcmState::Running {
            pcm.drain()?;
        }
        Ok(true)
    }

    /// Discards queued frames immediately.
    pub fn drop_stream(&self) {
        if let Some(pcm) = &self.pcm {
            if pcm.state() == PcmState::Running || pcm.state() == PcmState::Prepared {
                if let Err(e) = pcm.drop() {
                    warn!(target: LOG_TARGET, "Error dropping ALSA stream (ignored): {}", e);
                }
            }
        }
    }

    /// Closes the PCM device if it's open.
    pub fn close(&mut self) {
        if let Some(pcm) = self.pcm.take() {
            debug!(target: LOG_TARGET, "Closing ALSA PCM device '{}' (state: {:?})...", self.device_name, pcm.state());
            if pcm.state() == PcmState::Running || pcm.state() == PcmState::Prepared {
                if let Err(e) = pcm.drop() {
                    warn!(target: LOG_TARGET, "Error dropping ALSA buffer during close (ignored): {}", e);
                }
            }
        }
        self.configured_spec = None;
    }
}

impl Drop for AlsaPcmHandler {
    fn drop(&mut self) {
        self.close();
    }
}
