//! Модуль обработки аудио: клипы, склейка фрагментов и конвертация

pub mod clip;
pub mod converter;
pub mod stitcher;

pub use clip::AudioClip;
pub use converter::{
    build_filter_chain, calculate_speed, convert_directory, convert_one, ConversionSummary,
    ConversionTask, ConversionVariant, ProgressCallback,
};
pub use stitcher::{stitch, trim_silence};
