//! Local picture store: the raw bytes this peer can serve.
//!
//! Pictures live as `{root}/{picture-id}.png`. Files are immutable once
//! written: a picture id always names the same bytes.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::Bytes;
use memmap2::Mmap;

use vista_core::PictureId;

/// Where the responding side looks up pictures it was asked for.
pub trait PictureSource: Send + Sync {
    /// Raw encoded bytes of `picture_id`, or None if this peer doesn't hold it.
    fn raw_bytes(&self, picture_id: &PictureId) -> Result<Option<Bytes>>;
}

/// Directory-backed picture store.
#[derive(Debug, Clone)]
pub struct PictureStore {
    root: PathBuf,
}

impl PictureStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create picture store: {}", root.display()))?;
        Ok(Self { root })
    }

    /// Store a picture.
    ///
    /// Writes are atomic: write to temp file, then rename. If the picture
    /// already exists, this is a no-op.
    pub fn put(&self, picture_id: &PictureId, data: &[u8]) -> Result<()> {
        let path = self.picture_path(picture_id);
        if path.exists() {
            return Ok(());
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;
            file.write_all(data).context("failed to write picture data")?;
            file.sync_all().context("failed to sync picture to disk")?;
        }

        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        tracing::debug!(picture = %picture_id, bytes = data.len(), "picture stored");
        Ok(())
    }

    /// Number of pictures held.
    pub fn count(&self) -> usize {
        fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
                    .count()
            })
            .unwrap_or(0)
    }

    fn picture_path(&self, picture_id: &PictureId) -> PathBuf {
        self.root.join(format!("{picture_id}.png"))
    }
}

impl PictureSource for PictureStore {
    fn raw_bytes(&self, picture_id: &PictureId) -> Result<Option<Bytes>> {
        let path = self.picture_path(picture_id);
        if !path.exists() {
            return Ok(None);
        }

        let file = fs::File::open(&path)
            .with_context(|| format!("failed to open picture: {}", path.display()))?;
        if file.metadata()?.len() == 0 {
            return Ok(Some(Bytes::new()));
        }

        // Safety: file is opened read-only and pictures are never rewritten
        // in place (put goes through tmp + rename)
        let mmap = unsafe {
            Mmap::map(&file)
                .with_context(|| format!("failed to mmap picture: {}", path.display()))?
        };
        // The mapping backs the returned bytes; chunks slice it without copying.
        Ok(Some(Bytes::from_owner(mmap)))
    }
}
