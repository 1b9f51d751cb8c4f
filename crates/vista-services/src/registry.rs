//! Transfer registry: one [`ByteCollector`] per in-flight transfer.
//!
//! Collectors are created by the first chunk of a transfer and removed as
//! soon as the transfer completes, turns out malformed, or is aborted by
//! an error packet. Pushes for one transfer id happen under that id's map
//! entry, so they are serialized.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use vista_core::TransferId;

use crate::collector::{ByteCollector, CollectOutcome};

/// Shared map of in-flight transfers.
#[derive(Clone)]
pub struct TransferRegistry {
    active: Arc<DashMap<TransferId, ByteCollector>>,
    /// Largest stream a collector will accept.
    limit: u64,
}

impl TransferRegistry {
    pub fn new(limit: u64) -> Self {
        Self {
            active: Arc::new(DashMap::new()),
            limit,
        }
    }

    /// Feed one chunk to the collector for `transfer_id`, creating it if
    /// this is the first chunk. The entry is gone again by the time a
    /// `Complete` or `Malformed` outcome is returned.
    pub fn on_chunk(
        &self,
        transfer_id: TransferId,
        chunk: &[u8],
        remaining_after: u64,
    ) -> CollectOutcome {
        match self.active.entry(transfer_id) {
            Entry::Occupied(mut occupied) => {
                let outcome = occupied.get_mut().push(chunk, remaining_after);
                if !matches!(outcome, CollectOutcome::Continue) {
                    occupied.remove();
                }
                outcome
            }
            Entry::Vacant(vacant) => {
                let mut collector = ByteCollector::new(self.limit);
                let outcome = collector.push(chunk, remaining_after);
                if matches!(outcome, CollectOutcome::Continue) {
                    vacant.insert(collector);
                }
                outcome
            }
        }
    }

    /// Drop any in-flight collector for `transfer_id`. Returns whether one existed.
    pub fn on_error(&self, transfer_id: TransferId) -> bool {
        self.active.remove(&transfer_id).is_some()
    }

    pub fn contains(&self, transfer_id: &TransferId) -> bool {
        self.active.contains_key(transfer_id)
    }

    /// Number of transfers with a partially received stream.
    pub fn in_flight(&self) -> usize {
        self.active.len()
    }

    /// Discard every collector.
    pub fn clear(&self) {
        self.active.clear();
    }
}
