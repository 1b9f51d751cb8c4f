//! vista-services: the picture transfer protocol: reassembly, caching,
//! and the requesting and responding roles.

pub mod chunker;
pub mod collector;
pub mod decoder;
pub mod error;
pub mod handler;
pub mod picture_cache;
pub mod picture_store;
pub mod registry;
pub mod requester;
pub mod responder;

pub use chunker::chunk_picture;
pub use collector::{ByteCollector, CollectOutcome, MalformedReason};
pub use decoder::{ImageDecoder, PictureDecoder};
pub use error::TransferError;
pub use handler::PacketHandler;
pub use picture_cache::{
    CacheCounts, DecodedPicture, PictureCache, PictureStatus, PictureView, ReadyPicture,
    RequestOutcome, TextureId,
};
pub use picture_store::{PictureSource, PictureStore};
pub use registry::TransferRegistry;
pub use requester::PictureRequester;
pub use responder::PictureResponder;
