//! Drawing: canvas abstraction, software raster surface, renderer, picking

pub mod canvas;
pub mod pick;
pub mod raster;
pub mod renderer;

pub use canvas::{Canvas, DrawList, Rect, Rgba, TextAlign};
pub use pick::Hit;
pub use raster::RasterCanvas;
pub use renderer::{HudState, RenderOptions, Renderer};
