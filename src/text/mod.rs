//! Модуль обработки текста реплик

pub mod chunker;

pub use chunker::{split_text, DelimiterClass};
