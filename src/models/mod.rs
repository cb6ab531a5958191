pub mod common;
pub mod gemini;
pub mod image;
pub mod result;

pub use common::*;
pub use image::*;
pub use result::*;
