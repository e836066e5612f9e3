//! Основной файл библиотеки dialogue-tts
//!
//! Библиотека превращает реплики игровых диалогов в готовую озвучку:
//! длинные реплики режутся на фрагменты, фрагменты синтезируются выбранным
//! бэкендом и склеиваются, затем готовые файлы конвертируются ffmpeg в два
//! варианта с разной скоростью. Все это выполняется фоновой очередью
//! заданий с поддержкой отмены и уведомлений о прогрессе.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dialogue_tts::queue::{ConversionJob, JobManager, Services};
//! use dialogue_tts::tts::DefaultBackends;
//! use dialogue_tts::utils::Ffmpeg;
//!
//! # async fn example() -> dialogue_tts::error::Result<()> {
//! let services = Services::new(Arc::new(DefaultBackends), Arc::new(Ffmpeg::locate()?));
//! let manager = JobManager::new(services)?;
//! manager.enqueue(ConversionJob {
//!     label: "chapter 1".to_string(),
//!     audio_dir: "voice/chapter1".into(),
//!     converter: Default::default(),
//! });
//! manager.wait_idle().await;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod notification;
pub mod progress;
pub mod queue;
pub mod text;
pub mod tts;
pub mod utils;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, BackendConfig, ChunkingConfig, ConverterConfig};
pub use error::{DialogueError, Result};
pub use queue::{ConversionJob, GenerationJob, Job, JobId, JobManager, Services};
