//! Connection driver: frames packets over an ordered byte stream.
//!
//! The read half decodes one frame at a time and hands each packet to the
//! dispatcher in arrival order. The write half drains the outbound queue
//! that handlers push into. The connection is over when the peer closes,
//! a frame is bad or a write fails, and every handler then gets
//! `on_disconnect`. A peer that only closed its sending side still
//! receives responses queued by then.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

use vista_core::wire::HEADER_LEN;
use vista_core::Packet;

use crate::dispatch::PacketDispatcher;

/// How long a half-closed connection may keep writing queued responses.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Connection<S> {
    stream: S,
    peer: String,
    dispatcher: Arc<PacketDispatcher>,
    outbound_rx: mpsc::UnboundedReceiver<Packet>,
    shutdown: broadcast::Receiver<()>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        dispatcher: Arc<PacketDispatcher>,
        outbound_rx: mpsc::UnboundedReceiver<Packet>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            stream,
            peer: peer.into(),
            dispatcher,
            outbound_rx,
            shutdown,
        }
    }

    /// Drive the connection until the peer goes away, a frame is bad, or
    /// shutdown is signalled.
    pub async fn run(mut self) -> Result<()> {
        let (reader, writer) = tokio::io::split(self.stream);
        let mut write_task = tokio::spawn(write_loop(writer, self.outbound_rx));
        let mut writer_open = true;
        tracing::info!(peer = %self.peer, "connection established");

        let (result, peer_closed) = {
            let read = read_loop(reader, &self.dispatcher);
            tokio::pin!(read);
            loop {
                tokio::select! {
                    _ = self.shutdown.recv() => {
                        tracing::info!(peer = %self.peer, "connection shutting down");
                        break (Ok(()), false);
                    }
                    r = &mut read => {
                        let clean = r.is_ok();
                        break (r, clean);
                    }
                    r = &mut write_task, if writer_open => match r {
                        // Every sender is gone; keep reading.
                        Ok(Ok(())) => writer_open = false,
                        Ok(Err(e)) => break (Err(e), false),
                        Err(e) => break (Err(anyhow::anyhow!("write loop panicked: {e}")), false),
                    },
                }
            }
        };

        self.dispatcher.disconnect();

        // The peer only closed its sending side: flush what handlers still
        // queue for it. Dropping the dispatcher releases their senders.
        if peer_closed && writer_open {
            drop(self.dispatcher);
            tokio::select! {
                _ = self.shutdown.recv() => {}
                drained = tokio::time::timeout(DRAIN_TIMEOUT, &mut write_task) => match drained {
                    Ok(Ok(Err(e))) => tracing::debug!(peer = %self.peer, error = %e, "drain failed"),
                    Ok(_) => {}
                    Err(_) => tracing::debug!(peer = %self.peer, "drain timed out"),
                },
            }
        }
        write_task.abort();

        match &result {
            Ok(()) => tracing::info!(peer = %self.peer, "connection closed"),
            Err(e) => tracing::warn!(peer = %self.peer, error = %e, "connection failed"),
        }
        result
    }
}

/// Read frames until EOF. EOF is clean only on a frame boundary. A frame
/// that fails validation ends the connection: the stream has lost its
/// framing.
async fn read_loop<R>(mut reader: R, dispatcher: &PacketDispatcher) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    loop {
        let n = reader
            .read(&mut header_buf)
            .await
            .context("failed to read packet header")?;
        if n == 0 {
            return Ok(());
        }
        if n < HEADER_LEN {
            reader
                .read_exact(&mut header_buf[n..])
                .await
                .with_context(|| format!("connection closed mid-header after {n} bytes"))?;
        }

        let (header, kind) = Packet::decode_header(&header_buf)?;
        let mut payload = vec![0u8; header.payload_len()];
        reader
            .read_exact(&mut payload)
            .await
            .context("connection closed mid-payload")?;

        let packet = Packet::from_parts(&header, kind, Bytes::from(payload));
        tracing::trace!(kind = kind.name(), transfer = %packet.transfer_id(), "packet in");
        dispatcher.dispatch(packet);
    }
}

/// Encode and write queued packets until every sender is dropped.
async fn write_loop<W>(mut writer: W, mut outbound_rx: mpsc::UnboundedReceiver<Packet>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(packet) = outbound_rx.recv().await {
        let frame = packet.encode()?;
        writer
            .write_all(&frame)
            .await
            .context("failed to write packet")?;
        tracing::trace!(kind = packet.kind().name(), bytes = frame.len(), "packet out");
    }
    writer.shutdown().await.ok();
    Ok(())
}
