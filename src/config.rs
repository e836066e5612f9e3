//! Модуль конфигурации библиотеки dialogue-tts
//!
//! Этот модуль содержит структуры и перечисления для настройки синтеза,
//! разбиения текста и конвертации аудио.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DialogueError, Result};

/// Фильтры ffmpeg, которые поддерживает конвертер.
///
/// Порядок объявления совпадает с каноническим порядком применения.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Фильтр верхних частот
    Highpass,
    /// Фильтр нижних частот
    Lowpass,
    /// Де-эссер
    Deesser,
    /// Компрессор динамического диапазона
    Acompressor,
    /// Нормализация громкости
    Loudnorm,
    /// Лимитер
    Alimiter,
}

impl FilterKind {
    /// Все фильтры в каноническом порядке
    pub const CANONICAL_ORDER: [FilterKind; 6] = [
        FilterKind::Highpass,
        FilterKind::Lowpass,
        FilterKind::Deesser,
        FilterKind::Acompressor,
        FilterKind::Loudnorm,
        FilterKind::Alimiter,
    ];

    /// Имя фильтра в графе ffmpeg
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Highpass => "highpass",
            Self::Lowpass => "lowpass",
            Self::Deesser => "deesser",
            Self::Acompressor => "acompressor",
            Self::Loudnorm => "loudnorm",
            Self::Alimiter => "alimiter",
        }
    }

    /// Позиция фильтра в каноническом порядке
    pub fn canonical_order_index(&self) -> usize {
        Self::CANONICAL_ORDER
            .iter()
            .position(|kind| kind == self)
            .unwrap_or(Self::CANONICAL_ORDER.len())
    }

    /// Параметры по умолчанию, подобранные под мужской голос лектора
    pub fn default_params(&self) -> &'static str {
        match self {
            Self::Highpass => "f=70",
            Self::Lowpass => "f=14000",
            Self::Deesser => "i=0.4:m=0.3",
            Self::Acompressor => "threshold=-18dB:ratio=2:attack=5:release=120:makeup=2",
            Self::Loudnorm => "I=-16:TP=-1.5:LRA=11",
            Self::Alimiter => "limit=-1dB",
        }
    }
}

/// Настройка одного фильтра
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterSpec {
    /// Какой фильтр
    pub kind: FilterKind,
    /// Строка параметров (`f=70`, `limit=-1dB` и т.п.)
    pub params: String,
    /// Включен ли фильтр
    pub enabled: bool,
}

impl FilterSpec {
    pub fn new(kind: FilterKind, params: impl Into<String>, enabled: bool) -> Self {
        Self {
            kind,
            params: params.into(),
            enabled,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn canonical_order_index(&self) -> usize {
        self.kind.canonical_order_index()
    }
}

/// Набор фильтров по умолчанию: все включены с параметрами по умолчанию
pub fn default_filters() -> Vec<FilterSpec> {
    FilterKind::CANONICAL_ORDER
        .iter()
        .map(|kind| FilterSpec::new(*kind, kind.default_params(), true))
        .collect()
}

/// Конфигурация конвертера аудио
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConverterConfig {
    /// Базовый коэффициент ускорения
    pub base_speed: f32,
    /// Дополнительный множитель для второго (ускоренного) варианта
    pub boost_factor: f32,
    /// Фильтры ffmpeg
    pub filters: Vec<FilterSpec>,
    /// Максимальное число одновременно работающих процессов транскодера
    pub max_workers: Option<usize>,
    /// Как часто (в завершенных файлах) сообщать о прогрессе
    pub progress_interval: usize,
    /// Аудио кодек для перекодирования
    pub codec: String,
    /// Расширение готовых файлов
    pub output_extension: String,
    /// Путь к ffmpeg; если не указан, ищется в PATH
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            base_speed: 1.1,
            boost_factor: 1.10,
            filters: default_filters(),
            max_workers: None,
            progress_interval: 5,
            codec: "libvorbis".to_string(),
            output_extension: "ogg".to_string(),
            ffmpeg_path: None,
        }
    }
}

impl ConverterConfig {
    /// Число воркеров: из конфигурации или половина ядер, минимум один
    pub fn effective_workers(&self) -> usize {
        self.max_workers.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| (n.get() / 2).max(1))
                .unwrap_or(4)
        })
    }
}

/// Вставлять ли тишину между склеенными фрагментами.
///
/// Ранние версии вставляли фиксированную паузу, текущие склеивают встык.
/// По умолчанию паузы нет.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InterChunkGap {
    /// Склейка без паузы
    #[default]
    None,
    /// Пауза фиксированной длины
    Silence { ms: u64 },
}

/// Конфигурация разбиения длинных реплик и склейки фрагментов
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Максимальная длина текста для одного вызова синтезатора (в символах)
    pub max_chars: usize,
    /// Порог тишины в dBFS
    pub silence_threshold_db: f32,
    /// Минимальная длина тишины, которую стоит обрезать
    pub min_silence_ms: u64,
    /// Пауза между фрагментами
    pub inter_chunk_gap: InterChunkGap,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 200,
            silence_threshold_db: -40.0,
            min_silence_ms: 1350,
            inter_chunk_gap: InterChunkGap::None,
        }
    }
}

/// Локальный движок, доступный через HTTP API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocalEngine {
    Xtts,
    Stylish,
}

impl LocalEngine {
    /// Сегмент пути в URL сервера
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xtts => "xtts",
            Self::Stylish => "stylish",
        }
    }
}

fn default_timeout_secs() -> u64 {
    90
}

fn default_elevenlabs_model() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_language_code() -> String {
    "pl-PL".to_string()
}

/// Конфигурация бэкенда синтеза речи
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Локальный сервер (XTTS, STylish)
    LocalApi {
        engine: LocalEngine,
        api_url: String,
        #[serde(default)]
        voice_file: Option<PathBuf>,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// ElevenLabs
    #[serde(rename = "elevenlabs")]
    ElevenLabs {
        api_key: String,
        voice_id: String,
        #[serde(default = "default_elevenlabs_model")]
        model_id: String,
    },
    /// Google Cloud Text-to-Speech
    GoogleCloud {
        api_key: String,
        #[serde(default)]
        voice_name: Option<String>,
        #[serde(default = "default_language_code")]
        language_code: String,
    },
}

impl BackendConfig {
    /// Человекочитаемое имя бэкенда
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LocalApi { engine: LocalEngine::Xtts, .. } => "XTTS",
            Self::LocalApi { engine: LocalEngine::Stylish, .. } => "STylish",
            Self::ElevenLabs { .. } => "ElevenLabs",
            Self::GoogleCloud { .. } => "Google Cloud TTS",
        }
    }

    /// Проверить, что все обязательные поля заполнены
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::LocalApi { api_url, .. } => {
                if api_url.trim().is_empty() {
                    return Err(DialogueError::Configuration(format!(
                        "{} requires a local API URL",
                        self.display_name()
                    )));
                }
            }
            Self::ElevenLabs { api_key, voice_id, .. } => {
                if api_key.trim().is_empty() || voice_id.trim().is_empty() {
                    return Err(DialogueError::Configuration(
                        "ElevenLabs requires both an API key and a voice id".to_string(),
                    ));
                }
            }
            Self::GoogleCloud { api_key, .. } => {
                if api_key.trim().is_empty() {
                    return Err(DialogueError::Configuration(
                        "Google Cloud TTS requires an API key".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Загрузить конфигурацию бэкенда из JSON файла
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DialogueError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Общая конфигурация приложения
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Настройки конвертера
    pub converter: ConverterConfig,
    /// Настройки разбиения и склейки
    pub chunking: ChunkingConfig,
    /// Расширение сырых файлов, которые пишут синтезаторы
    pub raw_extension: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            converter: ConverterConfig::default(),
            chunking: ChunkingConfig::default(),
            raw_extension: "wav".to_string(),
        }
    }
}

impl AppConfig {
    /// Загрузить конфигурацию из JSON файла
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DialogueError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Сохранить конфигурацию в JSON файл
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
