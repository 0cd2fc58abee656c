use directories::ProjectDirs;
use doc_model::ViewerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const CONFIG_SCHEMA_VERSION: u32 = 1;
const MAX_KEY_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid storage key {0:?}: use 1-128 ASCII letters, digits, '-' or '_'")]
    InvalidKey(String),
    #[error("config schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Key -> blob persistence used for locally shared documents.
pub trait BlobStore {
    fn put(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError>;

    /// Returns `None` when nothing is stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// Download name for a shared document.
pub fn share_file_name(id: &str) -> String {
    format!("shared-{id}.pdf")
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_owned()))
    }
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.blob"))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        fs::create_dir_all(&self.dir)?;

        // Write then rename so a reader never sees a half-written blob.
        let path = self.blob_path(key);
        let partial = path.with_extension("blob.partial");
        fs::write(&partial, blob)?;
        fs::rename(&partial, &path)?;

        log::debug!("stored {} bytes under {key}", blob.len());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;

        match fs::read(self.blob_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&mut self, key: &str, blob: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.blobs.insert(key.to_owned(), blob.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        Ok(self.blobs.get(key).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigEnvelope {
    version: u32,
    config: ViewerConfig,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "PDFCraft", "PDFCraft Pro")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Blob store for shared documents under this root.
    pub fn shared_documents(&self) -> FsBlobStore {
        FsBlobStore::new(self.root.join("shared"))
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn load_config(&self) -> Result<ViewerConfig, StorageError> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(ViewerConfig::default());
        }

        load_config_file(&path)
    }

    pub fn save_config(&self, config: &ViewerConfig) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = ConfigEnvelope { version: CONFIG_SCHEMA_VERSION, config: config.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.config_path(), bytes)?;
        Ok(())
    }
}

/// Reads a config file written by [`Storage::save_config`]. Missing fields
/// take their defaults.
pub fn load_config_file(path: &Path) -> Result<ViewerConfig, StorageError> {
    let bytes = fs::read(path)?;
    let envelope: ConfigEnvelope = serde_json::from_slice(&bytes)?;

    if envelope.version > CONFIG_SCHEMA_VERSION {
        return Err(StorageError::UnsupportedVersion {
            found: envelope.version,
            supported: CONFIG_SCHEMA_VERSION,
        });
    }

    validate_config(&envelope.config)?;
    Ok(envelope.config)
}

fn validate_config(config: &ViewerConfig) -> Result<(), StorageError> {
    let positive = [
        ("min_scale", config.min_scale),
        ("max_scale", config.max_scale),
        ("initial_scale", config.initial_scale),
        ("zoom_step", config.zoom_step),
        ("estimated_page_height_px", config.estimated_page_height_px),
        ("device_pixel_ratio", config.device_pixel_ratio),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(StorageError::InvalidConfig(format!(
                "{name} must be a positive number, got {value}"
            )));
        }
    }

    if !(config.page_margin_px.is_finite() && config.page_margin_px >= 0.0) {
        return Err(StorageError::InvalidConfig(format!(
            "page_margin_px must not be negative, got {}",
            config.page_margin_px
        )));
    }

    if config.min_scale > config.max_scale {
        return Err(StorageError::InvalidConfig(format!(
            "min_scale {} is greater than max_scale {}",
            config.min_scale, config.max_scale
        )));
    }

    Ok(())
}
