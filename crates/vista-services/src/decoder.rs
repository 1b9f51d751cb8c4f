//! Picture decoding: bytes in, decoded image out.

use anyhow::{Context, Result};
use image::GenericImageView;

use crate::picture_cache::DecodedPicture;

/// Turns reassembled picture bytes into an image.
///
/// Called on a blocking worker thread, never on the packet delivery path.
pub trait PictureDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPicture>;
}

/// Decoder backed by the `image` crate. Format is sniffed from the bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl PictureDecoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPicture> {
        let image = image::load_from_memory(bytes).context("failed to decode picture")?;
        let (width, height) = image.dimensions();
        Ok(DecodedPicture {
            image,
            width,
            height,
        })
    }
}
