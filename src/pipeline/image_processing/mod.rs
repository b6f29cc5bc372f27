// Image processing: decoding originals, geometry application and encoding
pub mod formats;
mod icc;
mod render;
mod source;

pub use icc::extract_icc_profile;
pub use render::{RenderPlan, flatten, render, transform};
pub use source::{SourceImage, apply_orientation};
