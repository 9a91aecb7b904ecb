//! Target surface for completed renders

use std::sync::Arc;

use crate::decode::Raster;

/// Holds the bitmap currently on screen. Written only by the viewer on the
/// owner thread, after the scheduler's generation check.
#[derive(Debug, Default)]
pub struct RenderSurface {
    bitmap: Option<Arc<Raster>>,
    presents: usize,
}

impl RenderSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the visible bitmap
    pub fn present(&mut self, raster: Arc<Raster>) {
        self.bitmap = Some(raster);
        self.presents += 1;
    }

    pub fn clear(&mut self) {
        self.bitmap = None;
    }

    #[must_use]
    pub fn bitmap(&self) -> Option<&Arc<Raster>> {
        self.bitmap.as_ref()
    }

    /// Number of bitmaps presented since creation
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.presents
    }
}
