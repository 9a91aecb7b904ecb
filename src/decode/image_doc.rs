//! Raster image documents
//!
//! A still image is a one-page document. An animated GIF is a multi-page
//! document with one page per frame.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, Frame, ImageFormat, RgbaImage};

use super::{DecodeFault, DecodedDocument, DocumentDecoder, PageSize, Raster, check_page};
use crate::viewer::CancellationToken;

/// Largest edge, in pixels, a rasterized page may have
pub const MAX_RASTER_DIMENSION: f32 = 8192.0;

pub struct ImageDocumentDecoder;

impl DocumentDecoder for ImageDocumentDecoder {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn DecodedDocument>, DecodeFault> {
        let format = image::guess_format(bytes).map_err(malformed)?;

        let pages: Vec<RgbaImage> = if format == ImageFormat::Gif {
            let decoder = GifDecoder::new(Cursor::new(bytes)).map_err(malformed)?;
            decoder
                .into_frames()
                .collect_frames()
                .map_err(malformed)?
                .into_iter()
                .map(Frame::into_buffer)
                .collect()
        } else {
            let img = image::load_from_memory_with_format(bytes, format).map_err(malformed)?;
            vec![img.to_rgba8()]
        };

        if pages.is_empty() {
            return Err(DecodeFault::EmptyDocument);
        }

        log::debug!("Opened {format:?} document with {} page(s)", pages.len());
        Ok(Box::new(ImageDocument { pages }))
    }
}

fn malformed(err: image::ImageError) -> DecodeFault {
    DecodeFault::Malformed(err.to_string())
}

struct ImageDocument {
    pages: Vec<RgbaImage>,
}

impl ImageDocument {
    fn page(&self, page: usize) -> Result<&RgbaImage, DecodeFault> {
        check_page(page, self.pages.len())?;
        Ok(&self.pages[page - 1])
    }
}

impl DecodedDocument for ImageDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize, DecodeFault> {
        let img = self.page(page)?;
        Ok(PageSize::new(img.width() as f32, img.height() as f32))
    }

    fn rasterize(
        &self,
        page: usize,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Raster, DecodeFault> {
        let src = self.page(page)?;
        let (width, height) = output_dimensions(src.width(), src.height(), scale);

        if cancel.is_cancelled() {
            return Err(DecodeFault::engine("rasterization cancelled"));
        }

        let scaled = if (width, height) == src.dimensions() {
            src.clone()
        } else {
            imageops::resize(src, width, height, FilterType::Triangle)
        };

        Raster::new(flatten_onto_white(&scaled), width, height)
    }
}

fn output_dimensions(src_width: u32, src_height: u32, scale: f32) -> (u32, u32) {
    let mut width = src_width as f32 * scale;
    let mut height = src_height as f32 * scale;

    let max_dim = width.max(height);
    if max_dim > MAX_RASTER_DIMENSION {
        let reduction = MAX_RASTER_DIMENSION / max_dim;
        width *= reduction;
        height *= reduction;
    }

    (width.round().max(1.0) as u32, height.round().max(1.0) as u32)
}

fn flatten_onto_white(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(img.width() as usize * img.height() as usize * 3);
    for px in img.pixels() {
        let [r, g, b, a] = px.0;
        let alpha = u16::from(a);
        for channel in [r, g, b] {
            let blended = (u16::from(channel) * alpha + 255 * (255 - alpha)) / 255;
            out.push(blended as u8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn gif_bytes(frames: &[[u8; 4]]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder
                .encode_frames(
                    frames
                        .iter()
                        .map(|c| Frame::new(RgbaImage::from_pixel(8, 4, Rgba(*c)))),
                )
                .unwrap();
        }
        out
    }

    #[test]
    fn png_is_single_page() {
        let doc = ImageDocumentDecoder
            .open(&png_bytes(40, 20, [255, 0, 0, 255]))
            .ok()
            .unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.page_size(1).unwrap(), PageSize::new(40.0, 20.0));
        assert!(doc.page_size(2).is_err());
    }

    #[test]
    fn gif_frames_become_pages() {
        let doc = ImageDocumentDecoder
            .open(&gif_bytes(&[
                [255, 0, 0, 255],
                [0, 255, 0, 255],
                [0, 0, 255, 255],
            ]))
            .ok()
            .unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.page_size(3).unwrap(), PageSize::new(8.0, 4.0));
    }

    #[test]
    fn rasterize_scales_output() {
        let doc = ImageDocumentDecoder
            .open(&png_bytes(40, 20, [0, 0, 255, 255]))
            .ok()
            .unwrap();
        let raster = doc.rasterize(1, 0.5, &CancellationToken::new()).unwrap();
        assert_eq!((raster.width(), raster.height()), (20, 10));
        assert_eq!(raster.pixel(5, 5), Some((0, 0, 255)));
    }

    #[test]
    fn rasterize_stops_when_cancelled() {
        let doc = ImageDocumentDecoder
            .open(&png_bytes(4, 4, [0, 0, 0, 255]))
            .ok()
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert!(doc.rasterize(1, 1.0, &token).is_err());
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let doc = ImageDocumentDecoder
            .open(&png_bytes(2, 2, [0, 0, 0, 0]))
            .ok()
            .unwrap();
        let raster = doc.rasterize(1, 1.0, &CancellationToken::new()).unwrap();
        assert_eq!(raster.pixel(0, 0), Some((255, 255, 255)));
    }

    #[test]
    fn oversized_output_is_capped() {
        let (w, h) = output_dimensions(1000, 500, 100.0);
        assert_eq!(w, MAX_RASTER_DIMENSION as u32);
        assert_eq!(h, (MAX_RASTER_DIMENSION / 2.0) as u32);
    }

    #[test]
    fn truncated_png_is_malformed() {
        let mut bytes = png_bytes(4, 4, [1, 2, 3, 255]);
        bytes.truncate(20);
        assert!(matches!(
            ImageDocumentDecoder.open(&bytes),
            Err(DecodeFault::Malformed(_))
        ));
    }
}
