//! Asset catalog: named, categorized sound records

mod asset;
mod provider;

pub use asset::{SoundAsset, SoundCategory};
pub use provider::{AssetProvider, DirectoryAssetProvider};

use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, instrument, warn};

const LOG_TARGET: &str = "r_alertsound::catalog";

/// Error types for catalog loading.
#[derive(Debug)]
pub enum CatalogError {
    IoError(io::Error),
    NotADirectory(PathBuf),
}

impl From<io::Error> for CatalogError {
    fn from(err: io::Error) -> Self {
        CatalogError::IoError(err)
    }
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::IoError(e) => write!(f, "I/O error: {}", e),
            CatalogError::NotADirectory(p) => write!(f, "Not a directory: {}", p.display()),
        }
    }
}

impl Error for CatalogError {}

/// Holds the current set of sound assets. Reloads replace the whole set
/// atomically under the catalog's own lock.
#[derive(Debug, Default)]
pub struct AssetCatalog {
    assets: Mutex<Vec<Arc<SoundAsset>>>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: Vec<SoundAsset>) -> Self {
        let catalog = Self::new();
        catalog.replace(assets);
        catalog
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<SoundAsset>>> {
        self.assets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Loads `directory` through `provider` and swaps the result in.
    /// On failure the previous set is kept.
    #[instrument(skip(self, provider), fields(directory = %directory.display()))]
    pub async fn reload(&self, provider: &dyn AssetProvider, directory: &Path) -> Result<usize, CatalogError> {
        let assets = provider.load(directory).await.map_err(|e| {
            warn!(target: LOG_TARGET, "Catalog reload failed, keeping previous assets: {}", e);
            e
        })?;
        Ok(self.replace(assets))
    }

    /// Replaces the catalog contents, returning the new asset count.
    pub fn replace(&self, assets: Vec<SoundAsset>) -> usize {
        let assets: Vec<Arc<SoundAsset>> = assets.into_iter().map(Arc::new).collect();
        let count = assets.len();
        *self.lock() = assets;
        info!(target: LOG_TARGET, "Catalog now holds {} assets.", count);
        count
    }

    pub fn assets(&self) -> Vec<Arc<SoundAsset>> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Finds an asset by stem or file name.
    pub fn find(&self, key: &str) -> Option<Arc<SoundAsset>> {
        self.lock().iter().find(|a| a.matches(key)).cloned()
    }

    pub fn by_category(&self, category: SoundCategory) -> Vec<Arc<SoundAsset>> {
        self.lock().iter().filter(|a| a.category() == category).cloned().collect()
    }

    /// Clears every asset's `playing` flag.
    pub fn reset_playing_flags(&self) {
        for asset in self.lock().iter() {
            asset.set_playing(false);
        }
    }
}
