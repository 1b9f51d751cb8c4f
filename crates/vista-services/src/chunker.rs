//! Chunking: split a picture into chunk packets for the wire.

use bytes::Bytes;

use vista_core::{ChunkPacket, TransferId};

/// Split `data` into chunks of at most `chunk_size` bytes, each tagged with
/// the number of bytes that follow it. The last chunk carries 0.
///
/// An empty picture becomes a single empty chunk so the receiver still
/// sees a terminating packet. `chunk_size` of 0 is treated as 1.
pub fn chunk_picture(
    transfer_id: TransferId,
    data: Bytes,
    chunk_size: usize,
) -> Vec<ChunkPacket> {
    let chunk_size = chunk_size.max(1);
    let total = data.len();

    if total == 0 {
        return vec![ChunkPacket {
            transfer_id,
            payload: Bytes::new(),
            bytes_remaining: 0,
        }];
    }

    let mut chunks = Vec::with_capacity(total.div_ceil(chunk_size));
    let mut offset = 0;
    while offset < total {
        let end = (offset + chunk_size).min(total);
        chunks.push(ChunkPacket {
            transfer_id,
            payload: data.slice(offset..end),
            bytes_remaining: (total - end) as u64,
        });
        offset = end;
    }
    chunks
}
