//! Модуль обработки ошибок библиотеки dialogue-tts
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при генерации
//! и конвертации аудио диалогов.

use thiserror::Error;

/// Ошибки библиотеки dialogue-tts
#[derive(Debug, Error)]
pub enum DialogueError {
    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка чтения или записи WAV
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Ошибка декодирования аудио
    #[error("Audio decoding error: {0}")]
    Decode(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Не удалось загрузить бэкенд синтеза речи
    #[error("Backend load error: {0}")]
    BackendLoad(String),

    /// Ошибка синтеза речи
    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    /// Внешний транскодер завершился с ошибкой; stderr сохраняется без изменений
    #[error("Transcoder failed ({status}): {stderr}")]
    Transcoder {
        status: String,
        stderr: String,
    },

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Некорректные входные данные
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Файл не найден
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Текущее задание отменено
    #[error("Job cancelled")]
    Cancelled,

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),
}

impl DialogueError {
    /// Является ли ошибка сигналом отмены, а не сбоем
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DialogueError::Cancelled)
    }
}

impl From<&str> for DialogueError {
    fn from(s: &str) -> Self {
        DialogueError::Other(s.to_string())
    }
}

impl From<String> for DialogueError {
    fn from(s: String) -> Self {
        DialogueError::Other(s)
    }
}

/// Тип Result для библиотеки dialogue-tts
pub type Result<T> = std::result::Result<T, DialogueError>;
