//! Responding side of the picture protocol.
//!
//! Each RequestPicture is answered on a blocking worker: look the picture up,
//! then either stream it as chunks under the requester's transfer id or send
//! a single Error packet. The responder keeps no per-transfer state.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc;

use vista_core::config::TransferSettings;
use vista_core::wire::PacketKind;
use vista_core::{ErrorPacket, Packet, RequestPacket, TransferId};

use crate::chunker::chunk_picture;
use crate::handler::PacketHandler;
use crate::picture_store::PictureSource;

/// Server role: answers picture requests from a [`PictureSource`].
#[derive(Clone)]
pub struct PictureResponder {
    source: Arc<dyn PictureSource>,
    outbound: mpsc::UnboundedSender<Packet>,
    chunk_size: usize,
    /// Pictures larger than this are refused rather than streamed.
    limit: u64,
}

impl PictureResponder {
    pub fn new(
        source: Arc<dyn PictureSource>,
        settings: &TransferSettings,
        outbound: mpsc::UnboundedSender<Packet>,
    ) -> Self {
        Self {
            source,
            outbound,
            chunk_size: settings.effective_chunk_size(),
            limit: settings.effective_max_picture_bytes(),
        }
    }

    /// Answer one request. Returns the number of chunks sent; 0 means the
    /// request was refused with an Error packet.
    pub fn serve(&self, request: &RequestPacket) -> Result<usize> {
        let (transfer_id, picture_id) = (request.transfer_id, request.picture_id);

        let data = match self.source.raw_bytes(&picture_id) {
            Ok(Some(data)) if data.len() as u64 <= self.limit => data,
            Ok(Some(data)) => {
                tracing::warn!(
                    picture = %picture_id,
                    bytes = data.len(),
                    limit = self.limit,
                    "picture too large to send"
                );
                self.refuse(transfer_id)?;
                return Ok(0);
            }
            Ok(None) => {
                tracing::debug!(picture = %picture_id, "picture not held");
                self.refuse(transfer_id)?;
                return Ok(0);
            }
            Err(e) => {
                tracing::warn!(picture = %picture_id, error = %e, "failed to read picture");
                self.refuse(transfer_id)?;
                return Ok(0);
            }
        };

        let bytes = data.len();
        let chunks = chunk_picture(transfer_id, data, self.chunk_size);
        let sent = chunks.len();
        for chunk in chunks {
            if self.outbound.send(Packet::Chunk(chunk)).is_err() {
                bail!("connection closed while sending {picture_id}");
            }
        }

        tracing::info!(
            picture = %picture_id,
            transfer = %transfer_id,
            bytes,
            chunks = sent,
            "picture sent"
        );
        Ok(sent)
    }

    fn refuse(&self, transfer_id: TransferId) -> Result<()> {
        if self
            .outbound
            .send(Packet::Error(ErrorPacket { transfer_id }))
            .is_err()
        {
            bail!("connection closed while refusing transfer {transfer_id}");
        }
        Ok(())
    }
}

impl PacketHandler for PictureResponder {
    fn name(&self) -> &'static str {
        "picture_responder"
    }

    fn kinds(&self) -> &'static [PacketKind] {
        &[PacketKind::RequestPicture]
    }

    fn handle_packet(&self, packet: Packet) -> Result<()> {
        let request = match packet {
            Packet::Request(request) => request,
            other => bail!("responder cannot handle {:?} packets", other.kind()),
        };

        // Disk reads stay off the connection's read task.
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = this.serve(&request) {
                tracing::debug!(transfer = %request.transfer_id, error = %e, "request abandoned");
            }
        });
        Ok(())
    }

    fn on_disconnect(&self) {
        tracing::debug!("responder disconnected");
    }
}
