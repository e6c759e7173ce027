use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

/// Alert category; selects the duration/loop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundCategory {
    Intrusion,
    Fault,
    Action,
    None,
}

impl fmt::Display for SoundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SoundCategory::Intrusion => "intrusion",
            SoundCategory::Fault => "fault",
            SoundCategory::Action => "action",
            SoundCategory::None => "none",
        };
        f.pad(label)
    }
}

impl FromStr for SoundCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intrusion" | "i" => Ok(SoundCategory::Intrusion),
            "fault" | "f" => Ok(SoundCategory::Fault),
            "action" | "a" => Ok(SoundCategory::Action),
            "none" | "n" => Ok(SoundCategory::None),
            other => Err(format!("unknown sound category '{}'", other)),
        }
    }
}

/// A named, categorized reference to a playable sound file.
#[derive(Debug)]
pub struct SoundAsset {
    name: String,
    path: PathBuf,
    category: SoundCategory,
    playing: AtomicBool,
}

impl SoundAsset {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, category: SoundCategory) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            category,
            playing: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn category(&self) -> SoundCategory {
        self.category
    }

    /// Whether a playback session currently holds this asset. Observability only.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Relaxed);
    }

    /// True when `key` names this asset either by stem or by full file name.
    pub fn matches(&self, key: &str) -> bool {
        if self.name == key {
            return true;
        }
        self.path
            .file_name()
            .and_then(|f| f.to_str())
            .map_or(false, |file_name| file_name == key)
    }
}
