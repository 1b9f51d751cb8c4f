//! vista-core: shared types, wire format, and configuration.
//! All other Vista crates depend on this one.

pub mod config;
pub mod packet;
pub mod wire;

pub use packet::{ChunkPacket, ErrorPacket, Packet, PictureId, RequestPacket, TransferId};
