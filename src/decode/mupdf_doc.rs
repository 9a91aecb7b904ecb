//! PDF documents through MuPDF

use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::{DecodeFault, DecodedDocument, DocumentDecoder, PageSize, Raster, check_page};
use crate::viewer::CancellationToken;

/// Largest edge, in pixels, a rasterized page may have
const MAX_RASTER_DIMENSION: f32 = 8192.0;

pub struct MupdfDecoder;

impl DocumentDecoder for MupdfDecoder {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn DecodedDocument>, DecodeFault> {
        let doc = Document::from_bytes(bytes, "application/pdf")
            .map_err(|e| DecodeFault::Malformed(e.to_string()))?;
        let page_count = doc.page_count().map_err(engine)?.max(0) as usize;
        if page_count == 0 {
            return Err(DecodeFault::EmptyDocument);
        }
        Ok(Box::new(MupdfDocument { doc, page_count }))
    }
}

fn engine(err: mupdf::error::Error) -> DecodeFault {
    DecodeFault::Engine(err.to_string())
}

struct MupdfDocument {
    doc: Document,
    page_count: usize,
}

impl DecodedDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page: usize) -> Result<PageSize, DecodeFault> {
        check_page(page, self.page_count)?;
        let bounds = self
            .doc
            .load_page(page as i32 - 1)
            .and_then(|p| p.bounds())
            .map_err(engine)?;
        Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }

    fn rasterize(
        &self,
        page: usize,
        scale: f32,
        cancel: &CancellationToken,
    ) -> Result<Raster, DecodeFault> {
        check_page(page, self.page_count)?;
        let loaded = self.doc.load_page(page as i32 - 1).map_err(engine)?;
        let bounds = loaded.bounds().map_err(engine)?;

        let mut mag = scale;
        let max_dim = (bounds.x1 - bounds.x0).max(bounds.y1 - bounds.y0) * mag;
        if max_dim > MAX_RASTER_DIMENSION {
            mag *= MAX_RASTER_DIMENSION / max_dim;
        }

        if cancel.is_cancelled() {
            return Err(DecodeFault::engine("rasterization cancelled"));
        }

        let pixmap = loaded
            .to_pixmap(&Matrix::new_scale(mag, mag), &Colorspace::device_rgb(), false, false)
            .map_err(engine)?;
        let pixels = pixmap_to_rgb(&pixmap)?;
        Raster::new(pixels, pixmap.width(), pixmap.height())
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, DecodeFault> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(DecodeFault::engine(format!(
            "unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(DecodeFault::engine("pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for row in samples.chunks(stride).take(height) {
        let row = &row[..row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }
    Ok(out)
}
