//! Задания очереди

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, ConverterConfig};

/// Идентификатор задания, уникальный в пределах одного менеджера
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job #{}", self.0)
    }
}

/// Генерация озвучки для набора реплик
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub label: String,
    /// Каталог для сырых файлов; готовые варианты попадут в `ready/`
    pub audio_dir: PathBuf,
    /// Реплики в порядке озвучивания: (номер строки, текст)
    pub lines: Vec<(String, String)>,
    pub backend: BackendConfig,
    pub converter: ConverterConfig,
    /// Не синтезировать реплики, для которых сырой файл уже есть
    pub skip_existing: bool,
}

/// Только конвертация уже сгенерированных файлов
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub label: String,
    pub audio_dir: PathBuf,
    pub converter: ConverterConfig,
}

/// Задание очереди. После постановки в очередь не изменяется.
#[derive(Debug, Clone)]
pub enum Job {
    Generation(GenerationJob),
    Conversion(ConversionJob),
}

impl Job {
    pub fn label(&self) -> &str {
        match self {
            Job::Generation(job) => &job.label,
            Job::Conversion(job) => &job.label,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::Generation(_) => JobKind::Generation,
            Job::Conversion(_) => JobKind::Conversion,
        }
    }
}

impl From<GenerationJob> for Job {
    fn from(job: GenerationJob) -> Self {
        Job::Generation(job)
    }
}

impl From<ConversionJob> for Job {
    fn from(job: ConversionJob) -> Self {
        Job::Conversion(job)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Generation,
    Conversion,
}

/// Краткое описание задания для наблюдателей
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub label: String,
    pub kind: JobKind,
}

impl JobSummary {
    pub fn of(id: JobId, job: &Job) -> Self {
        Self {
            id,
            label: job.label().to_string(),
            kind: job.kind(),
        }
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            JobKind::Generation => "generation",
            JobKind::Conversion => "conversion",
        };
        write!(f, "{} '{}' ({})", self.id, self.label, kind)
    }
}
