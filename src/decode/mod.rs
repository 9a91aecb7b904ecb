//! Decode capability
//!
//! The viewer never parses documents itself. A [`DocumentDecoder`] turns raw
//! bytes into a [`DecodedDocument`] that reports page geometry and rasterizes
//! pages on request. Decoded documents are not required to be `Send`: each
//! thread that needs one opens its own copy from the shared bytes.

mod image_doc;
#[cfg(feature = "pdf")]
mod mupdf_doc;

use std::sync::Arc;

pub use image_doc::ImageDocumentDecoder;
#[cfg(feature = "pdf")]
pub use mupdf_doc::MupdfDecoder;

use crate::viewer::CancellationToken;

/// Intrinsic page dimensions at scale 1.0
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Decoded bitmap for one page at one scale.
///
/// Pixels are packed RGB, 3 bytes per pixel, row-major with no padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl Raster {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self, DecodeFault> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(DecodeFault::engine(format!(
                "raster buffer holds {} bytes, expected {expected} for {width}x{height}",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGB triple at `(x, y)`, or `None` outside the bitmap
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some((self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]))
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Errors raised by the decode capability
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DecodeFault {
    #[error("not a valid document: {0}")]
    Malformed(String),

    #[error("document has no pages")]
    EmptyDocument,

    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("decoder: {0}")]
    Engine(String),
}

impl DecodeFault {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }
}

/// Factory for decoded documents
pub trait DocumentDecoder: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn DecodedDocument>, DecodeFault>;
}

/// One opened document. Pages are 1-based.
pub trait DecodedDocument {
    fn page_count(&self) -> usize;

    fn page_size(&self, page: usize) -> Result<PageSize, DecodeFault>;

    /// Rasterize `page` at `scale`. Implementations may poll `cancel`
    /// between stages and bail out early; the caller treats any result
    /// produced after cancellation as discarded.
    fn rasterize(
        &self,
        page: usize,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Raster, DecodeFault>;
}

pub(crate) fn check_page(page: usize, page_count: usize) -> Result<(), DecodeFault> {
    if page == 0 || page > page_count {
        Err(DecodeFault::PageOutOfRange { page, page_count })
    } else {
        Ok(())
    }
}

/// Picks a decoder by sniffing the leading bytes
pub struct SniffingDecoder {
    images: ImageDocumentDecoder,
    #[cfg(feature = "pdf")]
    pdf: MupdfDecoder,
}

impl SniffingDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            images: ImageDocumentDecoder,
            #[cfg(feature = "pdf")]
            pdf: MupdfDecoder,
        }
    }
}

impl Default for SniffingDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentDecoder for SniffingDecoder {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn DecodedDocument>, DecodeFault> {
        if bytes.starts_with(b"%PDF") {
            #[cfg(feature = "pdf")]
            return self.pdf.open(bytes);
            #[cfg(not(feature = "pdf"))]
            return Err(DecodeFault::Malformed(
                "PDF support is not compiled in (enable the `pdf` feature)".to_string(),
            ));
        }
        self.images.open(bytes)
    }
}

/// Decoder used by the binary
#[must_use]
pub fn default_decoder() -> Arc<dyn DocumentDecoder> {
    Arc::new(SniffingDecoder::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_rejects_mismatched_buffer() {
        let err = Raster::new(vec![0; 10], 2, 2).unwrap_err();
        assert!(matches!(err, DecodeFault::Engine(_)));
    }

    #[test]
    fn raster_pixel_lookup() {
        let pixels = vec![1, 2, 3, 4, 5, 6];
        let raster = Raster::new(pixels, 2, 1).unwrap();
        assert_eq!(raster.pixel(1, 0), Some((4, 5, 6)));
        assert_eq!(raster.pixel(2, 0), None);
        assert_eq!(raster.pixel(0, 1), None);
    }

    #[test]
    fn check_page_bounds() {
        assert!(check_page(1, 3).is_ok());
        assert!(check_page(3, 3).is_ok());
        assert_eq!(
            check_page(0, 3),
            Err(DecodeFault::PageOutOfRange {
                page: 0,
                page_count: 3
            })
        );
        assert!(check_page(4, 3).is_err());
    }

    #[test]
    fn sniffing_decoder_rejects_garbage() {
        let decoder = SniffingDecoder::new();
        assert!(matches!(
            decoder.open(b"definitely not a document"),
            Err(DecodeFault::Malformed(_))
        ));
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn pdf_bytes_reach_the_pdf_decoder() {
        let decoder = default_decoder();
        let routed = decoder
            .open(b"%PDF-1.7\n%%EOF\n")
            .err()
            .is_none_or(|e| !e.to_string().contains("not compiled in"));
        assert!(routed);
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn pdf_without_feature_is_malformed() {
        let decoder = SniffingDecoder::new();
        let err = decoder.open(b"%PDF-1.7\n...").err().unwrap();
        assert!(err.to_string().contains("pdf"));
    }
}
