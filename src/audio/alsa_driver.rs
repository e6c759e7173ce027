use crate::audio::{
    alsa_handler::AlsaPcmHandler,
    decoder::{DecodeResult, SymphoniaDecoder},
    device::{AudioDeviceDescriptor, DeviceEnumerator, TransportKind},
    driver::{AudioDriver, OutputHandle, PlaybackCompletion},
    error::AudioError,
};
use alsa::device_name::HintIter;
use alsa::Direction;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::oneshot;
use tokio::task;
use tracing::{debug, error, info, instrument, trace, warn};

const LOG_TARGET: &str = "r_alertsound::audio::alsa_driver";

/// Frames handed to ALSA per write; bounds how long a stop request waits.
const WRITE_CHUNK_FRAMES: usize = 1024;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// ALSA-backed [`AudioDriver`].
#[derive(Debug, Default, Clone)]
pub struct AlsaDriver;

impl AlsaDriver {
    pub fn new() -> Self {
        AlsaDriver
    }

    fn pcm_name(device: Option<&AudioDeviceDescriptor>, kind: TransportKind) -> String {
        match (device, kind) {
            (Some(d), _) => d.native_id.clone(),
            (None, TransportKind::Direct) => "hw:0,0".to_string(),
            (None, TransportKind::SharedExclusive) => "plughw:0,0".to_string(),
            (None, _) => "default".to_string(),
        }
    }
}

impl AudioDriver for AlsaDriver {
    fn open(
        &self,
        device: Option<&AudioDeviceDescriptor>,
        kind: TransportKind,
    ) -> Result<Box<dyn OutputHandle>, AudioError> {
        let pcm_name = Self::pcm_name(device, kind);
        let mut handler = AlsaPcmHandler::new(&pcm_name);
        handler.check_open()?;
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(target: LOG_TARGET, handle = id, pcm = %pcm_name, transport = %kind, "ALSA output opened.");
        Ok(Box::new(AlsaOutput {
            id,
            handler: Arc::new(Mutex::new(handler)),
            active: None,
        }))
    }
}

/// A stream rendering on its own OS thread. Stopping only raises the flag;
/// the render loop notices it between chunks and while draining.
pub(crate) struct RenderThread {
    stop_flag: Arc<AtomicBool>,
    worker: thread::JoinHandle<()>,
}

impl RenderThread {
    pub(crate) fn spawn<F>(name: String, render: F) -> Result<Self, AudioError>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop_flag);
        let worker = thread::Builder::new().name(name).spawn(move || render(&flag))?;
        Ok(Self { stop_flag, worker })
    }

    pub(crate) fn signal_stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Signals and waits for the thread to exit.
    pub(crate) fn join(self) -> bool {
        self.signal_stop();
        self.worker.join().is_ok()
    }
}

/// One open ALSA PCM device.
pub struct AlsaOutput {
    id: u64,
    handler: Arc<Mutex<AlsaPcmHandler>>,
    active: Option<RenderThread>,
}

impl AlsaOutput {
    fn render(
        handler: &Mutex<AlsaPcmHandler>,
        path: &Path,
        stop_flag: &AtomicBool,
    ) -> Result<bool, AudioError> {
        let mut decoder = SymphoniaDecoder::open(path)?;
        let channels = decoder.channels().max(1);
        let mut guard = handler
            .lock()
            .map_err(|_| AudioError::InvalidState("ALSA handler mutex poisoned".to_string()))?;
        guard.configure(decoder.spec())?;

        loop {
            if stop_flag.load(Ordering::Acquire) {
                guard.drop_stream();
                return Ok(false);
            }
            let samples = match decoder.decode_next()? {
                DecodeResult::Decoded(samples) => samples,
                DecodeResult::EndOfStream => break,
            };
            let total_frames = samples.len() / channels;
            let mut offset = 0;
            while offset < total_frames {
                if stop_flag.load(Ordering::Acquire) {
                    guard.drop_stream();
                    return Ok(false);
                }
                let chunk_frames = (total_frames - offset).min(WRITE_CHUNK_FRAMES);
                let chunk = &samples[offset * channels..(offset + chunk_frames) * channels];
                match guard.write_s16_buffer(chunk)? {
                    0 => trace!(target: LOG_TARGET, "Underrun recovered, retrying chunk."),
                    written => offset += written.min(chunk_frames),
                }
            }
        }

        guard.drain_unless_stopped(stop_flag)
    }

    /// Waits for the previous render thread, which has at most one chunk
    /// or one drain poll left once its stop flag is raised.
    fn join_worker(&mut self) {
        if let Some(stream) = self.active.take() {
            if !stream.join() {
                warn!(target: LOG_TARGET, handle = self.id, "ALSA render thread panicked.");
            }
        }
    }
}

impl OutputHandle for AlsaOutput {
    fn id(&self) -> u64 {
        self.id
    }

    fn play(&mut self, path: &Path) -> Result<PlaybackCompletion, AudioError> {
        self.join_worker();
        if !path.exists() {
            return Err(AudioError::PlaybackError(format!("file not found: {}", path.display())));
        }

        let (done_tx, done_rx) = oneshot::channel();
        let handler = Arc::clone(&self.handler);
        let path: PathBuf = path.to_path_buf();
        let handle_id = self.id;

        let stream = RenderThread::spawn(format!("alsa-out-{}", handle_id), move |stop_flag| {
            match Self::render(&handler, &path, stop_flag) {
                Ok(true) => {
                    trace!(target: LOG_TARGET, handle = handle_id, "Stream finished naturally.");
                    let _ = done_tx.send(Ok(()));
                }
                Ok(false) => {
                    trace!(target: LOG_TARGET, handle = handle_id, "Stream stopped on request.");
                }
                Err(e) => {
                    error!(target: LOG_TARGET, handle = handle_id, "Stream failed: {}", e);
                    let _ = done_tx.send(Err(e));
                }
            }
        })?;

        self.active = Some(stream);
        Ok(done_rx)
    }

    fn stop(&mut self) {
        if let Some(stream) = &self.active {
            stream.signal_stop();
            trace!(target: LOG_TARGET, handle = self.id, finished = stream.is_finished(), "Stop signalled to render thread.");
        }
    }

    fn close(&mut self) {
        self.join_worker();
        match self.handler.lock() {
            Ok(mut guard) => guard.close(),
            Err(poisoned) => poisoned.into_inner().close(),
        }
        debug!(target: LOG_TARGET, handle = self.id, "ALSA output closed.");
    }
}

/// Lists ALSA PCM playback devices from the configuration hints.
#[derive(Debug, Default, Clone)]
pub struct AlsaDeviceEnumerator;

impl AlsaDeviceEnumerator {
    pub fn new() -> Self {
        AlsaDeviceEnumerator
    }
}

#[async_trait]
impl DeviceEnumerator for AlsaDeviceEnumerator {
    #[instrument(skip(self))]
    async fn enumerate(&self) -> Result<Vec<AudioDeviceDescriptor>, AudioError> {
        let devices = task::spawn_blocking(|| -> Result<Vec<AudioDeviceDescriptor>, AudioError> {
            let hints = HintIter::new_str(None, "pcm")
                .map_err(|e| AudioError::EnumerationError(e.to_string()))?;
            let devices = hints
                .filter(|hint| matches!(hint.direction, None | Some(Direction::Playback)))
                .filter_map(|hint| {
                    let pcm_name = hint.name?;
                    if pcm_name == "null" {
                        return None;
                    }
                    let display_name = hint
                        .desc
                        .as_deref()
                        .and_then(|d| d.lines().next())
                        .map(|d| format!("{} ({})", d, pcm_name))
                        .unwrap_or_else(|| pcm_name.clone());
                    let transport = TransportKind::from_pcm_name(&pcm_name);
                    Some(AudioDeviceDescriptor::new(display_name, transport, pcm_name))
                })
                .collect::<Vec<_>>();
            Ok(devices)
        })
        .await??;
        info!(target: LOG_TARGET, "Enumerated {} ALSA playback devices.", devices.len());
        Ok(devices)
    }
}
