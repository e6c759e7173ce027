//! Audio output: device registry, driver capability and the ALSA backend

pub mod alsa_driver;
mod alsa_handler;
mod decoder;
pub mod device;
pub mod driver;
pub mod error;

pub use alsa_driver::{AlsaDeviceEnumerator, AlsaDriver};
pub use device::{AudioDeviceDescriptor, DeviceEnumerator, DeviceRegistry, TransportKind};
pub use driver::{open_output, AudioDriver, OutputHandle, PlaybackCompletion};
pub use error::AudioError;
