pub mod raster_view;
pub mod status_bar;

pub use raster_view::RasterView;
pub use status_bar::StatusBar;
