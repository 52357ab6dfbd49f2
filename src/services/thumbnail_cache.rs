// ThumbnailCache Service
// Cache-aside store of YouTube thumbnails converted to JPEG on local disk
//
// Lookups go memory index -> disk -> network. A per-video lock guarantees a
// single fetch+conversion per id no matter how many callers race for it.

use std::collections::HashMap;
use std::io::{BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jpeg_encoder::{ColorType, Encoder, EncodingError, SamplingFactor};
use lru::LruCache;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::services::is_safe_file_stem;

/// Payloads below this size are placeholder or error images
pub const MIN_THUMBNAIL_BYTES: usize = 1024;
const JPEG_QUALITY: u8 = 95;
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Errors that can occur while producing a thumbnail
#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Invalid video id: {0}")]
    InvalidId(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Thumbnail origin returned {0}")]
    Status(StatusCode),

    #[error("Thumbnail too small ({0} bytes)")]
    TooSmall(usize),

    #[error("Image conversion failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] EncodingError),

    #[error("Image too large to encode ({0}x{1})")]
    Dimensions(u32, u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Conversion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Origin of raw thumbnail bytes
#[async_trait]
pub trait ThumbnailSource: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<Vec<u8>, ThumbnailError>;
}

/// Fetches thumbnails over HTTP from a `{video_id}` URL template
pub struct HttpThumbnailSource {
    client: Client,
    url_template: String,
}

impl HttpThumbnailSource {
    pub fn new(url_template: String) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            url_template,
        })
    }

    fn url(&self, video_id: &str) -> String {
        self.url_template.replace("{video_id}", video_id)
    }
}

#[async_trait]
impl ThumbnailSource for HttpThumbnailSource {
    async fn fetch(&self, video_id: &str) -> Result<Vec<u8>, ThumbnailError> {
        let response = self.client.get(self.url(video_id)).send().await?;
        if response.status() != StatusCode::OK {
            return Err(ThumbnailError::Status(response.status()));
        }

        let bytes = response.bytes().await?;
        if bytes.len() < MIN_THUMBNAIL_BYTES {
            return Err(ThumbnailError::TooSmall(bytes.len()));
        }
        Ok(bytes.to_vec())
    }
}

type KeyLock = Arc<AsyncMutex<()>>;

/// Cache of converted thumbnails keyed by video id
pub struct ThumbnailCache {
    dir: PathBuf,
    source: Arc<dyn ThumbnailSource>,
    index: Mutex<LruCache<String, PathBuf>>,
    locks: Mutex<HashMap<String, KeyLock>>,
}

impl ThumbnailCache {
    /// `capacity` bounds the in-memory index; files on disk are kept
    pub fn new(dir: PathBuf, source: Arc<dyn ThumbnailSource>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            dir,
            source,
            index: Mutex::new(LruCache::new(capacity)),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Deterministic cache location for a video id. Ids are used verbatim as the
    /// file stem, so anything that is not already a safe stem is rejected.
    pub fn path_for(&self, video_id: &str) -> Result<PathBuf, ThumbnailError> {
        if !is_safe_file_stem(video_id) {
            return Err(ThumbnailError::InvalidId(video_id.to_string()));
        }
        Ok(self.dir.join(format!("{video_id}.jpg")))
    }

    /// Return the local JPEG for `video_id`, fetching and converting it on a miss
    pub async fn get_thumbnail(&self, video_id: &str) -> Result<PathBuf, ThumbnailError> {
        let path = self.path_for(video_id)?;

        if let Some(path) = self.lookup_index(video_id) {
            return Ok(path);
        }

        if tokio::fs::try_exists(&path).await? {
            self.remember(video_id, &path);
            return Ok(path);
        }

        let lease = self.lease(video_id);
        let _held = lease.lock.lock().await;

        // Another caller may have finished while we waited
        if let Some(path) = self.lookup_index(video_id) {
            return Ok(path);
        }
        if tokio::fs::try_exists(&path).await? {
            self.remember(video_id, &path);
            return Ok(path);
        }

        let bytes = self.source.fetch(video_id).await?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let dir = self.dir.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || convert_to_jpeg(&bytes, &dir, &target)).await??;

        log::info!("Cached thumbnail for {video_id} at {}", path.display());
        self.remember(video_id, &path);
        Ok(path)
    }

    /// Number of ids currently held in the memory index
    pub fn indexed_len(&self) -> usize {
        self.index.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of per-id locks currently alive
    pub fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn lookup_index(&self, video_id: &str) -> Option<PathBuf> {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(video_id)
            .cloned()
    }

    fn remember(&self, video_id: &str, path: &Path) {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(video_id.to_string(), path.to_path_buf());
    }

    fn lease(&self, video_id: &str) -> KeyLease<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(video_id.to_string())
            .or_default()
            .clone();

        KeyLease {
            locks: &self.locks,
            key: video_id.to_string(),
            lock,
        }
    }
}

/// Shared use of one video id's lock; the map entry is dropped with the last lease
struct KeyLease<'a> {
    locks: &'a Mutex<HashMap<String, KeyLock>>,
    key: String,
    lock: KeyLock,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

/// Decode any supported image and write it as a JPEG at `target`:
/// quality 95, 4:4:4 sampling, optimized Huffman tables.
/// The file only appears at `target` once fully written.
fn convert_to_jpeg(bytes: &[u8], dir: &Path, target: &Path) -> Result<(), ThumbnailError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(ThumbnailError::Dimensions(width, height)),
    };

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let mut encoder = Encoder::new(&mut writer, JPEG_QUALITY);
        encoder.set_sampling_factor(SamplingFactor::F_1_1);
        encoder.set_optimized_huffman_tables(true);
        encoder.encode(rgb.as_raw(), w, h, ColorType::Rgb)?;
        writer.flush()?;
    }
    temp.persist(target).map_err(|e| ThumbnailError::Io(e.error))?;
    Ok(())
}
