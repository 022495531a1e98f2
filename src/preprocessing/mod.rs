//! Enhancement stage
//!
//! Turns a cropped capture into a single-channel image tuned for decoding:
//! grayscale, optional upscale, contrast, optional sharpen, optional threshold.

pub mod pipeline;
pub mod steps;

pub use pipeline::{
    enhance, enhance_variants, EnhancedVariants, EnhancementParams, ProcessedImage, StepTiming,
};
