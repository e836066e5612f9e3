//! Вспомогательные модули: транскодер и временные файлы

pub mod ffmpeg;
pub mod temp;

pub use ffmpeg::{Ffmpeg, Transcoder};
pub use temp::{ChunkWorkspace, TempFileGuard};
