use crate::catalog::asset::{SoundAsset, SoundCategory};
use crate::catalog::CatalogError;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info, instrument};

const LOG_TARGET: &str = "r_alertsound::catalog::provider";

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg"];

/// Turns a directory into a set of sound records.
#[async_trait]
pub trait AssetProvider: Send + Sync {
    async fn load(&self, directory: &Path) -> Result<Vec<SoundAsset>, CatalogError>;
}

/// Scans a directory for audio files. Category assignment matches each file
/// against the configured per-category file names; anything else is `None`.
#[derive(Debug, Clone, Default)]
pub struct DirectoryAssetProvider {
    category_files: Vec<(SoundCategory, String)>,
}

impl DirectoryAssetProvider {
    pub fn new(category_files: Vec<(SoundCategory, String)>) -> Self {
        Self { category_files }
    }

    fn category_for(&self, asset_name: &str, file_name: &str) -> SoundCategory {
        self.category_files
            .iter()
            .find(|(_, configured)| configured == asset_name || configured == file_name)
            .map_or(SoundCategory::None, |(category, _)| *category)
    }
}

#[async_trait]
impl AssetProvider for DirectoryAssetProvider {
    #[instrument(skip(self), fields(directory = %directory.display()))]
    async fn load(&self, directory: &Path) -> Result<Vec<SoundAsset>, CatalogError> {
        let metadata = tokio::fs::metadata(directory).await?;
        if !metadata.is_dir() {
            return Err(CatalogError::NotADirectory(directory.to_path_buf()));
        }

        let mut entries = tokio::fs::read_dir(directory).await?;
        let mut assets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_audio = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if !is_audio || !entry.file_type().await?.is_file() {
                continue;
            }
            let (Some(stem), Some(file_name)) = (
                path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
                path.file_name().and_then(|s| s.to_str()).map(str::to_string),
            ) else {
                debug!(target: LOG_TARGET, "Skipping non UTF-8 file name: {}", path.display());
                continue;
            };
            let category = self.category_for(&stem, &file_name);
            debug!(target: LOG_TARGET, asset = %stem, %category, "Discovered sound asset.");
            assets.push(SoundAsset::new(stem, path, category));
        }

        assets.sort_by(|a, b| a.name().cmp(b.name()));
        info!(target: LOG_TARGET, "Loaded {} sound assets.", assets.len());
        Ok(assets)
    }
}
