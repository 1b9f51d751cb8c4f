//! Packet types: the three messages of the picture protocol and their
//! encoding behind a [`PacketHeader`].

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zerocopy::byteorder::{U32, U64};
use zerocopy::{AsBytes, FromBytes};

use crate::wire::{PacketHeader, PacketKind, WireError, HEADER_LEN, MAX_PAYLOAD, WIRE_VERSION};

// ── Identifiers ───────────────────────────────────────────────────────────────

/// Durable identity of a picture. Stable across peers and sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PictureId(pub Uuid);

/// Identity of one chunked exchange. Lives only as long as a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub Uuid);

impl PictureId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl TransferId {
    /// A fresh random transfer id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PictureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PictureId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ── Packets ───────────────────────────────────────────────────────────────────

/// Requester → holder: send picture `picture_id`, tagging chunks with `transfer_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    pub transfer_id: TransferId,
    pub picture_id: PictureId,
}

/// One fragment of a picture's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPacket {
    pub transfer_id: TransferId,
    pub payload: Bytes,
    /// Bytes of the stream still to come after this payload.
    pub bytes_remaining: u64,
}

/// The holder cannot supply the picture for this transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPacket {
    pub transfer_id: TransferId,
}

/// Any message that travels over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Request(RequestPacket),
    Chunk(ChunkPacket),
    Error(ErrorPacket),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Request(_) => PacketKind::RequestPicture,
            Packet::Chunk(_) => PacketKind::Chunk,
            Packet::Error(_) => PacketKind::Error,
        }
    }

    pub fn transfer_id(&self) -> TransferId {
        match self {
            Packet::Request(p) => p.transfer_id,
            Packet::Chunk(p) => p.transfer_id,
            Packet::Error(p) => p.transfer_id,
        }
    }

    /// Build the frame header for this packet.
    pub fn header(&self) -> Result<PacketHeader, WireError> {
        let (picture_id, bytes_remaining, length) = match self {
            Packet::Request(p) => (*p.picture_id.as_bytes(), 0, 0),
            Packet::Chunk(p) => {
                if p.payload.len() > MAX_PAYLOAD {
                    return Err(WireError::PayloadTooLarge(p.payload.len()));
                }
                ([0u8; 16], p.bytes_remaining, p.payload.len() as u32)
            }
            Packet::Error(_) => ([0u8; 16], 0, 0),
        };

        Ok(PacketHeader {
            kind: self.kind().into(),
            version: WIRE_VERSION,
            reserved: [0; 2],
            transfer_id: *self.transfer_id().as_bytes(),
            picture_id,
            bytes_remaining: U64::new(bytes_remaining),
            length: U32::new(length),
        })
    }

    /// Serialize header and payload into one frame.
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let header = self.header()?;
        let payload: &[u8] = match self {
            Packet::Chunk(p) => &p.payload,
            _ => &[],
        };
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_slice(header.as_bytes());
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    /// Parse and validate a frame header from the front of `buf`.
    pub fn decode_header(buf: &[u8]) -> Result<(PacketHeader, PacketKind), WireError> {
        let header = PacketHeader::read_from_prefix(buf).ok_or(WireError::Truncated {
            needed: HEADER_LEN,
            got: buf.len(),
        })?;
        let kind = header.validate()?;
        Ok((header, kind))
    }

    /// Assemble a packet from an already validated header and its payload.
    pub fn from_parts(header: &PacketHeader, kind: PacketKind, payload: Bytes) -> Self {
        let transfer_id = TransferId::from_bytes(header.transfer_id);
        match kind {
            PacketKind::RequestPicture => Packet::Request(RequestPacket {
                transfer_id,
                picture_id: PictureId::from_bytes(header.picture_id),
            }),
            PacketKind::Chunk => Packet::Chunk(ChunkPacket {
                transfer_id,
                payload,
                bytes_remaining: header.bytes_remaining.get(),
            }),
            PacketKind::Error => Packet::Error(ErrorPacket { transfer_id }),
        }
    }

    /// Decode one complete frame. Trailing bytes beyond the declared
    /// payload are ignored.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let (header, kind) = Self::decode_header(buf)?;
        let needed = HEADER_LEN + header.payload_len();
        if buf.len() < needed {
            return Err(WireError::Truncated {
                needed,
                got: buf.len(),
            });
        }
        let payload = Bytes::copy_from_slice(&buf[HEADER_LEN..needed]);
        Ok(Self::from_parts(&header, kind, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picture() -> PictureId {
        "6f1c2a36-8a52-4e4f-9d57-3f4c1c7f2b10".parse().unwrap()
    }

    #[test]
    fn request_frame_carries_both_ids() {
        let transfer_id = TransferId::new();
        let packet = Packet::Request(RequestPacket {
            transfer_id,
            picture_id: picture(),
        });

        let frame = packet.encode().unwrap();
        assert_eq!(frame.len(), HEADER_LEN);
        assert_eq!(Packet::decode(&frame).unwrap(), packet);
    }

    #[test]
    fn chunk_frame_carries_payload_and_remainder() {
        let packet = Packet::Chunk(ChunkPacket {
            transfer_id: TransferId::new(),
            payload: Bytes::from_static(b"\x89PNG\r\n"),
            bytes_remaining: 4096,
        });

        let frame = packet.encode().unwrap();
        assert_eq!(frame.len(), HEADER_LEN + 6);
        match Packet::decode(&frame).unwrap() {
            Packet::Chunk(chunk) => {
                assert_eq!(&chunk.payload[..], b"\x89PNG\r\n");
                assert_eq!(chunk.bytes_remaining, 4096);
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn oversized_chunk_is_rejected_on_encode() {
        let packet = Packet::Chunk(ChunkPacket {
            transfer_id: TransferId::new(),
            payload: Bytes::from(vec![0u8; MAX_PAYLOAD + 1]),
            bytes_remaining: 0,
        });
        assert_eq!(
            packet.encode().unwrap_err(),
            WireError::PayloadTooLarge(MAX_PAYLOAD + 1)
        );
    }

    #[test]
    fn truncated_frames_are_rejected() {
        let packet = Packet::Chunk(ChunkPacket {
            transfer_id: TransferId::new(),
            payload: Bytes::from_static(b"abcdef"),
            bytes_remaining: 0,
        });
        let frame = packet.encode().unwrap();

        assert!(matches!(
            Packet::decode(&frame[..10]),
            Err(WireError::Truncated { needed: HEADER_LEN, got: 10 })
        ));
        assert!(matches!(
            Packet::decode(&frame[..HEADER_LEN + 2]),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn picture_id_parses_and_displays() {
        let id = picture();
        assert_eq!(id.to_string(), "6f1c2a36-8a52-4e4f-9d57-3f4c1c7f2b10");
        assert!("not-a-uuid".parse::<PictureId>().is_err());
    }
}
