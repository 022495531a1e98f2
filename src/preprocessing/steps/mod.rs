//! Individual enhancement steps

pub mod contrast;
pub mod grayscale;
pub mod resize;
pub mod sharpen;
pub mod threshold;
