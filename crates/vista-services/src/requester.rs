//! Requesting side of the picture protocol.
//!
//! `request()` turns a cache miss into a RequestPicture packet under a fresh
//! transfer id. Chunk and Error packets for that transfer feed the registry;
//! a completed stream is decoded on a blocking worker and the result lands
//! in the cache. Packets for transfers we are not waiting on are dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, Semaphore};

use vista_core::config::TransferSettings;
use vista_core::wire::PacketKind;
use vista_core::{ChunkPacket, ErrorPacket, Packet, PictureId, RequestPacket, TransferId};

use crate::collector::CollectOutcome;
use crate::decoder::PictureDecoder;
use crate::error::TransferError;
use crate::handler::PacketHandler;
use crate::picture_cache::{DecodedPicture, PictureCache, RequestOutcome};
use crate::registry::TransferRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Chunks are still arriving.
    Receiving,
    /// Stream complete, bytes handed to the decoder.
    Decoding,
}

#[derive(Debug, Clone, Copy)]
struct Outstanding {
    picture_id: PictureId,
    phase: Phase,
    last_activity: Instant,
}

/// Client role: fetches pictures from the peer into a [`PictureCache`].
#[derive(Clone)]
pub struct PictureRequester {
    cache: PictureCache,
    registry: TransferRegistry,
    /// Transfers we issued and have not settled yet.
    outstanding: Arc<DashMap<TransferId, Outstanding>>,
    outbound: mpsc::UnboundedSender<Packet>,
    decoder: Arc<dyn PictureDecoder>,
    decode_permits: Arc<Semaphore>,
    fetch_timeout: Duration,
}

impl PictureRequester {
    pub fn new(
        cache: PictureCache,
        settings: &TransferSettings,
        decoder: Arc<dyn PictureDecoder>,
        outbound: mpsc::UnboundedSender<Packet>,
    ) -> Self {
        Self {
            cache,
            registry: TransferRegistry::new(settings.effective_max_picture_bytes()),
            outstanding: Arc::new(DashMap::new()),
            outbound,
            decoder,
            decode_permits: Arc::new(Semaphore::new(settings.effective_decode_workers())),
            fetch_timeout: settings.fetch_timeout(),
        }
    }

    pub fn cache(&self) -> &PictureCache {
        &self.cache
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    /// Transfers issued and not yet settled (receiving or decoding).
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Ask the peer for `picture_id` unless the cache already knows it.
    pub fn request(&self, picture_id: PictureId) -> RequestOutcome {
        let outcome = self.cache.request(picture_id);
        if outcome != RequestOutcome::Issued {
            return outcome;
        }

        let transfer_id = TransferId::new();
        self.outstanding.insert(
            transfer_id,
            Outstanding {
                picture_id,
                phase: Phase::Receiving,
                last_activity: Instant::now(),
            },
        );

        let packet = Packet::Request(RequestPacket {
            transfer_id,
            picture_id,
        });
        if self.outbound.send(packet).is_err() {
            self.fail_transfer(transfer_id, TransferError::Disconnected);
        } else {
            tracing::info!(picture = %picture_id, transfer = %transfer_id, "picture requested");
        }
        outcome
    }

    fn on_chunk(&self, chunk: ChunkPacket) {
        let transfer_id = chunk.transfer_id;
        let picture_id = match self.outstanding.get_mut(&transfer_id) {
            Some(mut o) if o.phase == Phase::Receiving => {
                o.last_activity = Instant::now();
                o.picture_id
            }
            _ => {
                tracing::debug!(
                    error = %TransferError::UnknownTransfer(transfer_id),
                    "dropping chunk"
                );
                return;
            }
        };

        match self
            .registry
            .on_chunk(transfer_id, &chunk.payload, chunk.bytes_remaining)
        {
            CollectOutcome::Continue => {
                tracing::trace!(
                    transfer = %transfer_id,
                    payload_len = chunk.payload.len(),
                    remaining = chunk.bytes_remaining,
                    "chunk received"
                );
                // Abandoned by the stall sweep while we were pushing.
                if !self.outstanding.contains_key(&transfer_id) {
                    self.registry.on_error(transfer_id);
                }
            }
            CollectOutcome::Complete(bytes) => {
                tracing::debug!(
                    picture = %picture_id,
                    transfer = %transfer_id,
                    bytes = bytes.len(),
                    "picture reassembled"
                );
                self.spawn_decode(transfer_id, bytes);
            }
            CollectOutcome::Malformed(reason) => {
                self.fail_transfer(transfer_id, TransferError::MalformedStream(reason));
            }
        }
    }

    fn on_error(&self, error: ErrorPacket) {
        let transfer_id = error.transfer_id;
        let receiving = self
            .outstanding
            .get(&transfer_id)
            .is_some_and(|o| o.phase == Phase::Receiving);

        if receiving {
            self.fail_transfer(transfer_id, TransferError::ExplicitPeerError);
        } else {
            self.registry.on_error(transfer_id);
            tracing::debug!(
                error = %TransferError::UnknownTransfer(transfer_id),
                "dropping error packet"
            );
        }
    }

    /// Hand reassembled bytes to a blocking decode worker. The delivery
    /// path returns immediately.
    fn spawn_decode(&self, transfer_id: TransferId, bytes: Bytes) {
        if let Some(mut o) = self.outstanding.get_mut(&transfer_id) {
            o.phase = Phase::Decoding;
        }

        let this = self.clone();
        tokio::spawn(async move {
            let permit = match this.decode_permits.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => return, // semaphore closed
            };
            let decoder = this.decoder.clone();
            let result = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                decoder.decode(&bytes)
            })
            .await;

            match result {
                Ok(Ok(decoded)) => this.finish(transfer_id, decoded),
                Ok(Err(e)) => this.fail_transfer(transfer_id, TransferError::DecodeFailure(e)),
                Err(join) => this.fail_transfer(
                    transfer_id,
                    TransferError::DecodeFailure(anyhow!("decode worker panicked: {join}")),
                ),
            }
        });
    }

    fn finish(&self, transfer_id: TransferId, decoded: DecodedPicture) {
        match self.outstanding.remove(&transfer_id) {
            Some((_, o)) => {
                self.cache.complete(o.picture_id, decoded);
            }
            None => tracing::debug!(
                transfer = %transfer_id,
                "decode finished for abandoned transfer, dropping"
            ),
        }
    }

    /// Settle a transfer as failed: drop its collector, forget it, mark the
    /// picture Error.
    fn fail_transfer(&self, transfer_id: TransferId, error: TransferError) {
        self.registry.on_error(transfer_id);
        if let Some((_, o)) = self.outstanding.remove(&transfer_id) {
            tracing::warn!(
                picture = %o.picture_id,
                transfer = %transfer_id,
                error = %error,
                "picture transfer failed"
            );
            self.cache.fail(o.picture_id);
        }
    }

    /// Fail every receiving transfer that has been silent for longer than
    /// the fetch timeout. Returns the affected pictures.
    pub fn expire_stalled(&self) -> Vec<PictureId> {
        let stalled: Vec<(TransferId, PictureId)> = self
            .outstanding
            .iter()
            .filter(|e| {
                e.phase == Phase::Receiving && e.last_activity.elapsed() > self.fetch_timeout
            })
            .map(|e| (*e.key(), e.picture_id))
            .collect();

        for (transfer_id, _) in &stalled {
            self.fail_transfer(*transfer_id, TransferError::Stalled(self.fetch_timeout));
        }
        stalled.into_iter().map(|(_, picture_id)| picture_id).collect()
    }
}

impl PacketHandler for PictureRequester {
    fn name(&self) -> &'static str {
        "picture_requester"
    }

    fn kinds(&self) -> &'static [PacketKind] {
        &[PacketKind::Chunk, PacketKind::Error]
    }

    fn handle_packet(&self, packet: Packet) -> Result<()> {
        match packet {
            Packet::Chunk(chunk) => self.on_chunk(chunk),
            Packet::Error(error) => self.on_error(error),
            Packet::Request(_) => bail!("requester does not serve pictures"),
        }
        Ok(())
    }

    /// Forget everything: transfers in flight, collectors, cached pictures.
    fn on_disconnect(&self) {
        let abandoned = self.outstanding.len();
        self.outstanding.clear();
        self.registry.clear();
        self.cache.clear();
        tracing::info!(abandoned, "requester disconnected");
    }
}

/// Sweep stalled transfers once a second.
///
/// Runs until the task is aborted.
pub async fn expiry_loop(requester: PictureRequester) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        interval.tick().await;

        let expired = requester.expire_stalled();
        if !expired.is_empty() {
            tracing::debug!(expired = expired.len(), "expired stalled transfers");
        }
    }
}
