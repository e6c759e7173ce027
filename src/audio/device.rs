use crate::audio::error::AudioError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const LOG_TARGET: &str = "r_alertsound::audio::device";

/// Output mechanism family used to open a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Basic,
    EventDriven,
    Direct,
    SharedExclusive,
}

impl TransportKind {
    /// Classifies an ALSA PCM name into a transport family.
    pub fn from_pcm_name(pcm_name: &str) -> Self {
        if pcm_name.starts_with("plughw:") {
            TransportKind::SharedExclusive
        } else if pcm_name.starts_with("hw:") {
            TransportKind::Direct
        } else if pcm_name == "default"
            || pcm_name.starts_with("dmix")
            || pcm_name.starts_with("pulse")
            || pcm_name.starts_with("pipewire")
        {
            TransportKind::EventDriven
        } else {
            TransportKind::Basic
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportKind::Basic => "basic",
            TransportKind::EventDriven => "event-driven",
            TransportKind::Direct => "direct",
            TransportKind::SharedExclusive => "shared-exclusive",
        };
        f.pad(label)
    }
}

/// An enumerated output device. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceDescriptor {
    pub name: String,
    pub transport: TransportKind,
    /// Backend specific handle reference (the PCM name for ALSA).
    pub native_id: String,
}

impl AudioDeviceDescriptor {
    pub fn new(name: impl Into<String>, transport: TransportKind, native_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport,
            native_id: native_id.into(),
        }
    }
}

/// Source of output device descriptors.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<AudioDeviceDescriptor>, AudioError>;
}

#[derive(Debug, Default)]
struct RegistryState {
    devices: Vec<AudioDeviceDescriptor>,
    selected: Option<AudioDeviceDescriptor>,
}

/// Known output devices plus the current selection (`None` = platform default).
///
/// Selection changes that must not race an open session go through
/// [`AlertScheduler::select_device`](crate::scheduler::AlertScheduler::select_device).
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    state: Mutex<RegistryState>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with `devices`.
    pub fn with_devices(devices: Vec<AudioDeviceDescriptor>) -> Self {
        Self {
            state: Mutex::new(RegistryState { devices, selected: None }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        // Registry state stays consistent across a panic, so recover from poisoning.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn list_devices(&self) -> Vec<AudioDeviceDescriptor> {
        self.lock().devices.clone()
    }

    pub fn find(&self, name: &str) -> Option<AudioDeviceDescriptor> {
        self.lock().devices.iter().find(|d| d.name == name).cloned()
    }

    pub fn selected(&self) -> Option<AudioDeviceDescriptor> {
        self.lock().selected.clone()
    }

    /// Replaces the known device set wholesale from `enumerator`.
    /// The selection survives only if a device with the same name is still present.
    #[instrument(skip(self, enumerator))]
    pub async fn refresh(&self, enumerator: &dyn DeviceEnumerator) -> Result<usize, AudioError> {
        let devices = enumerator.enumerate().await?;
        let count = devices.len();
        let mut state = self.lock();
        if let Some(current) = state.selected.take() {
            match devices.iter().find(|d| d.name == current.name) {
                Some(still_present) => state.selected = Some(still_present.clone()),
                None => warn!(target: LOG_TARGET, device = %current.name, "Selected device disappeared on re-enumeration, reverting to platform default."),
            }
        }
        state.devices = devices;
        info!(target: LOG_TARGET, "Device registry refreshed with {} devices.", count);
        Ok(count)
    }

    pub(crate) fn set_selected(&self, device: Option<AudioDeviceDescriptor>) {
        let mut state = self.lock();
        match &device {
            Some(d) => info!(target: LOG_TARGET, device = %d.name, transport = %d.transport, "Output device selected."),
            None => info!(target: LOG_TARGET, "Output device reset to platform default."),
        }
        state.selected = device;
        debug!(target: LOG_TARGET, "Registry now tracks {} devices.", state.devices.len());
    }
}
