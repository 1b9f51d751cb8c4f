//! Vista wire format: the frame header every packet travels behind.
//!
//! These types ARE the protocol. Every field, every size, every reserved byte
//! is part of the wire format. Integers are little-endian regardless of host.
//!
//! The header is #[repr(C, packed)] for deterministic layout and uses
//! zerocopy derives for allocation-free serialization. There is no unsafe
//! code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Packet Header ─────────────────────────────────────────────────────────────

/// Precedes every packet on the channel.
///
/// The receiver can classify and route a packet, and knows how many payload
/// bytes follow, before reading a single byte of payload.
///
/// Wire size: 48 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PacketHeader {
    /// Packet kind, see [`PacketKind`].
    pub kind: u8,

    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// Reserved, must be zero.
    pub reserved: [u8; 2],

    /// Transfer the packet belongs to. Every kind carries one.
    pub transfer_id: [u8; 16],

    /// Picture being requested. Zero for everything but RequestPicture.
    pub picture_id: [u8; 16],

    /// Chunk only: bytes of the stream that follow this chunk's payload.
    /// Strictly decreasing within a transfer, zero on the final chunk.
    pub bytes_remaining: U64<LittleEndian>,

    /// Length of the payload in bytes, not including this header.
    /// Nonzero only for Chunk packets.
    pub length: U32<LittleEndian>,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(PacketHeader, [u8; 48]);

/// Size of [`PacketHeader`] on the wire.
pub const HEADER_LEN: usize = 48;

impl PacketHeader {
    /// Check the fixed fields and return the packet kind.
    pub fn validate(&self) -> Result<PacketKind, WireError> {
        if self.version != WIRE_VERSION {
            return Err(WireError::UnknownVersion(self.version));
        }
        if self.reserved != [0u8; 2] {
            return Err(WireError::ReservedBytesSet);
        }
        let kind = PacketKind::try_from(self.kind)?;
        let length = self.length.get() as usize;
        if length > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(length));
        }
        if length != 0 && kind != PacketKind::Chunk {
            return Err(WireError::UnexpectedPayload(kind, length));
        }
        Ok(kind)
    }

    /// Payload length declared by this header.
    pub fn payload_len(&self) -> usize {
        self.length.get() as usize
    }
}

// ── Packet Kind ───────────────────────────────────────────────────────────────

/// Discriminates the three messages of the picture protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Requester → holder: please send picture X under transfer T.
    RequestPicture = 0x01,

    /// Holder → requester: one fragment of the picture bytes.
    Chunk = 0x02,

    /// Holder → requester: the picture cannot be supplied.
    Error = 0x03,
}

impl PacketKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestPicture => "request_picture",
            Self::Chunk => "chunk",
            Self::Error => "error",
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0x01 => Ok(PacketKind::RequestPicture),
            0x02 => Ok(PacketKind::Chunk),
            0x03 => Ok(PacketKind::Error),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<PacketKind> for u8 {
    fn from(k: PacketKind) -> u8 {
        k as u8
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current wire format version.
pub const WIRE_VERSION: u8 = 0x01;

/// Maximum payload size in bytes.
/// Larger pictures must be split by the sender into multiple chunks.
pub const MAX_PAYLOAD: usize = 65535;

/// Default chunk payload size used by senders.
pub const DEFAULT_CHUNK_SIZE: usize = 30_000;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown packet kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unknown wire version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("reserved header bytes are non-zero")]
    ReservedBytesSet,

    #[error("{0:?} packet carries {1} payload bytes, expected none")]
    UnexpectedPayload(PacketKind, usize),

    #[error("truncated frame: need {needed} bytes, have {got}")]
    Truncated { needed: usize, got: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
