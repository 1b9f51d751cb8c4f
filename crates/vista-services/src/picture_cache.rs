//! Picture cache: client-side status and decoded images, keyed by picture id.
//!
//! Every picture moves `(absent) → Fetching → {Ready, Error}` and then stays
//! put until the whole cache is cleared on disconnect. Reads hand out cloned
//! entries, so a renderer never sees a half-built Ready picture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use image::DynamicImage;
use serde::Serialize;
use tokio::sync::Notify;

use vista_core::PictureId;

/// Handle the rendering layer uses to refer to an uploaded picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TextureId(pub u64);

/// Output of a successful decode.
#[derive(Debug, Clone)]
pub struct DecodedPicture {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
}

/// A decoded picture as the renderer sees it.
#[derive(Debug)]
pub struct ReadyPicture {
    pub image: DynamicImage,
    pub width: u32,
    pub height: u32,
    pub texture: TextureId,
}

/// Cache entry, also the view returned by [`PictureCache::get`].
#[derive(Debug, Clone)]
pub enum PictureView {
    Fetching,
    Ready(Arc<ReadyPicture>),
    Error,
}

/// Status without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PictureStatus {
    Fetching,
    Ready,
    Error,
}

impl PictureView {
    pub fn status(&self) -> PictureStatus {
        match self {
            PictureView::Fetching => PictureStatus::Fetching,
            PictureView::Ready(_) => PictureStatus::Ready,
            PictureView::Error => PictureStatus::Error,
        }
    }
}

/// What [`PictureCache::request`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A new Fetching entry was created; the caller must issue the transfer.
    Issued,
    /// An entry already existed; nothing was done.
    Existing(PictureStatus),
}

/// Per-status totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounts {
    pub fetching: usize,
    pub ready: usize,
    pub error: usize,
}

#[derive(Clone)]
pub struct PictureCache {
    entries: Arc<DashMap<PictureId, PictureView>>,
    next_texture: Arc<AtomicU64>,
    /// Woken on every status transition.
    changed: Arc<Notify>,
}

impl Default for PictureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PictureCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_texture: Arc::new(AtomicU64::new(1)),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Insert a Fetching entry unless one exists. Only the caller that gets
    /// [`RequestOutcome::Issued`] may send the request to the peer.
    pub fn request(&self, picture_id: PictureId) -> RequestOutcome {
        match self.entries.entry(picture_id) {
            Entry::Occupied(existing) => RequestOutcome::Existing(existing.get().status()),
            Entry::Vacant(vacant) => {
                vacant.insert(PictureView::Fetching);
                tracing::debug!(picture = %picture_id, "picture fetching");
                RequestOutcome::Issued
            }
        }
    }

    /// Non-blocking read, called once per frame per visible picture.
    pub fn get(&self, picture_id: &PictureId) -> Option<PictureView> {
        self.entries.get(picture_id).map(|e| e.value().clone())
    }

    /// Fetching → Ready. Returns false if the picture is no longer tracked
    /// (cleared since the request) or already settled.
    pub fn complete(&self, picture_id: PictureId, decoded: DecodedPicture) -> bool {
        let applied = match self.entries.get_mut(&picture_id) {
            Some(mut entry) if matches!(*entry, PictureView::Fetching) => {
                let texture = TextureId(self.next_texture.fetch_add(1, Ordering::Relaxed));
                *entry = PictureView::Ready(Arc::new(ReadyPicture {
                    image: decoded.image,
                    width: decoded.width,
                    height: decoded.height,
                    texture,
                }));
                tracing::info!(
                    picture = %picture_id,
                    width = decoded.width,
                    height = decoded.height,
                    texture = texture.0,
                    "picture ready"
                );
                true
            }
            Some(entry) => {
                tracing::debug!(
                    picture = %picture_id,
                    status = ?entry.status(),
                    "completion for settled picture, ignoring"
                );
                false
            }
            None => {
                tracing::debug!(picture = %picture_id, "completion for unknown picture, dropping");
                false
            }
        };
        if applied {
            self.changed.notify_waiters();
        }
        applied
    }

    /// Mark a picture as failed. A Ready picture stays Ready; an absent one
    /// stays absent.
    pub fn fail(&self, picture_id: PictureId) -> bool {
        let applied = match self.entries.get_mut(&picture_id) {
            Some(mut entry) if matches!(*entry, PictureView::Fetching) => {
                *entry = PictureView::Error;
                tracing::warn!(picture = %picture_id, "picture failed");
                true
            }
            _ => false,
        };
        if applied {
            self.changed.notify_waiters();
        }
        applied
    }

    /// Drop every entry. Called once per disconnect.
    pub fn clear(&self) {
        let before = self.entries.len();
        self.entries.clear();
        tracing::info!(removed = before, "picture cache cleared");
        self.changed.notify_waiters();
    }

    /// Wait until `picture_id` leaves Fetching or `timeout` passes. Returns
    /// the entry at that point, None if it is absent.
    pub async fn settled(&self, picture_id: &PictureId, timeout: Duration) -> Option<PictureView> {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                match self.get(picture_id) {
                    Some(PictureView::Fetching) => notified.await,
                    other => return other,
                }
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(view) => view,
            Err(_) => self.get(picture_id),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> CacheCounts {
        let mut counts = CacheCounts::default();
        for entry in self.entries.iter() {
            match entry.value() {
                PictureView::Fetching => counts.fetching += 1,
                PictureView::Ready(_) => counts.ready += 1,
                PictureView::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Ids and statuses of every entry, ordered by picture id.
    pub fn snapshot(&self) -> Vec<(PictureId, PictureStatus)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.value().status()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}
