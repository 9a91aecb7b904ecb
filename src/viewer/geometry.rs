//! Zoom modes and effective render scale
//!
//! Fit-to-width is an explicit mode, never a stored number: its scale is
//! recomputed from the container width and the page's intrinsic width every
//! time either changes.

use crate::decode::PageSize;

/// Smallest allowed render scale
pub const MIN_SCALE: f32 = 0.25;
/// Largest allowed explicit render scale
pub const MAX_SCALE: f32 = 4.0;
/// Zoom in/out increment
pub const DEFAULT_ZOOM_STEP: f32 = 0.2;
/// Horizontal margin, in container pixels, kept free in fit-to-width mode
pub const DEFAULT_FIT_PADDING: f32 = 16.0;

/// How the page scale is chosen
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoomMode {
    /// Fixed scale factor (1.0 = 100%)
    Explicit(f32),
    /// Scale derived from the container width
    FitWidth,
}

impl Default for ZoomMode {
    fn default() -> Self {
        Self::Explicit(1.0)
    }
}

impl ZoomMode {
    /// Explicit mode with the factor clamped into range
    #[must_use]
    pub fn explicit(scale: f32) -> Self {
        Self::Explicit(clamp_scale(scale))
    }
}

/// Clamp an explicit scale to `[MIN_SCALE, MAX_SCALE]`, mapping NaN/Inf to 1.0
#[must_use]
pub fn clamp_scale(scale: f32) -> f32 {
    if !scale.is_finite() {
        1.0
    } else {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    }
}

/// Round to hundredths so repeated zoom steps do not accumulate drift
#[must_use]
pub fn round_scale(scale: f32) -> f32 {
    (scale * 100.0).round() / 100.0
}

/// Two scales are the same for rendering purposes
#[must_use]
pub fn same_scale(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

/// Resolves a [`ZoomMode`] to a numeric scale
#[derive(Clone, Copy, Debug)]
pub struct ViewportGeometry {
    padding: f32,
}

impl Default for ViewportGeometry {
    fn default() -> Self {
        Self::new(DEFAULT_FIT_PADDING)
    }
}

impl ViewportGeometry {
    #[must_use]
    pub fn new(padding: f32) -> Self {
        Self {
            padding: if padding.is_finite() {
                padding.max(0.0)
            } else {
                DEFAULT_FIT_PADDING
            },
        }
    }

    #[must_use]
    pub fn padding(&self) -> f32 {
        self.padding
    }

    /// Effective scale for a page of intrinsic size `page` inside a container
    /// of `container_width` pixels (`None` when not yet measured).
    #[must_use]
    pub fn resolve(&self, mode: ZoomMode, page: PageSize, container_width: Option<f32>) -> f32 {
        match mode {
            ZoomMode::Explicit(scale) => scale,
            ZoomMode::FitWidth => match container_width {
                Some(width) if width.is_finite() && page.width > 0.0 => {
                    ((width - self.padding) / page.width).max(MIN_SCALE)
                }
                _ => 1.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_scale_passes_through() {
        let geometry = ViewportGeometry::default();
        let page = PageSize::new(400.0, 600.0);
        assert_eq!(geometry.resolve(ZoomMode::Explicit(1.7), page, Some(800.0)), 1.7);
        assert_eq!(geometry.resolve(ZoomMode::Explicit(1.7), page, None), 1.7);
    }

    #[test]
    fn fit_width_uses_container_minus_padding() {
        let geometry = ViewportGeometry::default();
        let scale = geometry.resolve(ZoomMode::FitWidth, PageSize::new(400.0, 600.0), Some(800.0));
        assert!(same_scale(scale, (800.0 - DEFAULT_FIT_PADDING) / 400.0));
    }

    #[test]
    fn fit_width_has_lower_bound() {
        let geometry = ViewportGeometry::default();
        let scale = geometry.resolve(ZoomMode::FitWidth, PageSize::new(4000.0, 10.0), Some(100.0));
        assert_eq!(scale, MIN_SCALE);

        let tiny = geometry.resolve(ZoomMode::FitWidth, PageSize::new(400.0, 10.0), Some(4.0));
        assert_eq!(tiny, MIN_SCALE);
    }

    #[test]
    fn fit_width_without_container_is_natural_size() {
        let geometry = ViewportGeometry::default();
        assert_eq!(
            geometry.resolve(ZoomMode::FitWidth, PageSize::new(400.0, 600.0), None),
            1.0
        );
        assert_eq!(
            geometry.resolve(ZoomMode::FitWidth, PageSize::new(0.0, 600.0), Some(800.0)),
            1.0
        );
    }

    #[test]
    fn clamp_scale_handles_bounds_and_nan() {
        assert_eq!(clamp_scale(0.01), MIN_SCALE);
        assert_eq!(clamp_scale(10.0), MAX_SCALE);
        assert_eq!(clamp_scale(f32::NAN), 1.0);
        assert_eq!(clamp_scale(f32::INFINITY), 1.0);
        assert_eq!(clamp_scale(1.5), 1.5);
    }

    #[test]
    fn negative_padding_is_ignored() {
        assert_eq!(ViewportGeometry::new(-5.0).padding(), 0.0);
        assert_eq!(ViewportGeometry::new(f32::NAN).padding(), DEFAULT_FIT_PADDING);
    }

    #[test]
    fn round_scale_removes_drift() {
        assert_eq!(round_scale(1.2 + 0.2 + 0.2 + 0.2), 1.8);
    }
}
