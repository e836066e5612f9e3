//! Выполнение одного задания
//!
//! Генерация идет по состояниям `LoadingBackend -> Generating -> Converting`.
//! Ошибка загрузки бэкенда прерывает задание, ошибка отдельной реплики или
//! отдельного файла только учитывается в итоговых счетчиках. Отмена
//! проверяется на границе реплик и при запуске каждого файла конвертации;
//! перед выходом по отмене наблюдатели получают уже набранные счетчики.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::audio::converter::{
    convert_directory, target_paths, ConversionSummary, ProgressCallback,
};
use crate::config::{AppConfig, ChunkingConfig, ConverterConfig};
use crate::error::{DialogueError, Result};
use crate::progress::{JobPhase, ObserverRegistry, ProgressEvent, ProgressObserver};
use crate::queue::job::{ConversionJob, GenerationJob, Job, JobId};
use crate::tts::{synthesize_line, BackendCache, BackendProvider};
use crate::utils::ffmpeg::Transcoder;

/// Каталог готовых вариантов внутри каталога задания
pub const READY_DIR: &str = "ready";

/// Общие зависимости всех заданий менеджера
pub struct Services {
    pub provider: Arc<dyn BackendProvider>,
    pub backends: BackendCache,
    pub transcoder: Arc<dyn Transcoder>,
    pub chunking: ChunkingConfig,
    /// Расширение сырых файлов реплик
    pub raw_extension: String,
}

impl Services {
    pub fn new(provider: Arc<dyn BackendProvider>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self::from_config(&AppConfig::default(), provider, transcoder)
    }

    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn BackendProvider>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            provider,
            backends: BackendCache::new(),
            transcoder,
            chunking: config.chunking.clone(),
            raw_extension: config.raw_extension.trim_start_matches('.').to_string(),
        }
    }
}

/// Итог успешно завершенного задания
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub generated: usize,
    pub skipped: usize,
    /// Реплики, сырой файл которых уже был и синтез не запускался
    pub existing: usize,
    pub conversion: Option<ConversionSummary>,
}

impl JobReport {
    pub fn message(&self) -> String {
        let mut parts = Vec::new();
        if self.generated > 0 || self.skipped > 0 {
            parts.push(format!(
                "generated {}, skipped {}",
                self.generated, self.skipped
            ));
        }
        if self.existing > 0 {
            parts.push(format!("{} lines already present", self.existing));
        }
        if let Some(summary) = &self.conversion {
            parts.push(format!(
                "converted {}, already done {}, failed {}",
                summary.converted, summary.skipped, summary.failed
            ));
        }
        if parts.is_empty() {
            "nothing to do".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Все, что нужно заданию во время выполнения
#[derive(Clone)]
pub struct JobContext {
    pub id: JobId,
    pub cancel: CancellationToken,
    pub progress: Arc<ObserverRegistry<dyn ProgressObserver>>,
    pub services: Arc<Services>,
}

impl JobContext {
    fn emit(&self, event: ProgressEvent) {
        self.progress.notify(&event);
    }
}

/// Имя сырого файла реплики: `output1 (<номер>).<ext>`
pub fn raw_line_path(audio_dir: &Path, line_id: &str, extension: &str) -> PathBuf {
    audio_dir.join(format!("output1 ({}).{}", line_id, extension))
}

pub async fn run_job(ctx: JobContext, job: Job) -> Result<JobReport> {
    match job {
        Job::Generation(job) => run_generation(&ctx, &job).await,
        Job::Conversion(job) => run_conversion_only(&ctx, &job).await,
    }
}

async fn run_generation(ctx: &JobContext, job: &GenerationJob) -> Result<JobReport> {
    let services = &ctx.services;

    ctx.emit(ProgressEvent::indeterminate(
        ctx.id,
        JobPhase::LoadingBackend,
        format!("Loading {}", job.backend.display_name()),
    ));
    let synth = services
        .backends
        .get(&job.backend, services.provider.as_ref())
        .await
        .map_err(|e| {
            log::error!("{}: backend load failed: {}", ctx.id, e);
            e
        })?;

    tokio::fs::create_dir_all(&job.audio_dir).await?;

    let total = job.lines.len();
    let ready_dir = job.audio_dir.join(READY_DIR);
    let mut report = JobReport::default();
    for (index, (line_id, text)) in job.lines.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            return Err(cancelled_during_generation(ctx, index, total, &report));
        }

        let destination = raw_line_path(&job.audio_dir, line_id, &services.raw_extension);
        if job.skip_existing && destination.exists() {
            log::debug!("{}: line {} already exists, skipping", ctx.id, line_id);
            report.existing += 1;
            ctx.emit(ProgressEvent::new(
                ctx.id,
                JobPhase::Generating,
                index + 1,
                total,
                format!("Line {} already exists", line_id),
            ));
            continue;
        }

        match synthesize_line(
            synth.as_ref(),
            text,
            &destination,
            &services.chunking,
            services.transcoder.as_ref(),
        )
        .await
        {
            Ok(_) => {
                report.generated += 1;
                let extension = &job.converter.output_extension;
                if let Err(e) = discard_converted(&destination, &ready_dir, extension).await {
                    log::warn!("{}: stale variants of line {} kept: {}", ctx.id, line_id, e);
                }
            }
            Err(e) => {
                log::error!("{}: line {} skipped: {}", ctx.id, line_id, e);
                report.skipped += 1;
            }
        }

        ctx.emit(ProgressEvent::new(
            ctx.id,
            JobPhase::Generating,
            index + 1,
            total,
            format!("Line {}", line_id),
        ));
    }

    if ctx.cancel.is_cancelled() {
        return Err(cancelled_during_generation(ctx, total, total, &report));
    }

    report.conversion = Some(convert(ctx, &job.audio_dir, &job.converter).await?);
    finish(ctx, report)
}

/// Удалить готовые варианты реплики, чтобы новый сырой файл был сконвертирован заново
async fn discard_converted(raw: &Path, ready_dir: &Path, extension: &str) -> Result<()> {
    for target in target_paths(raw, ready_dir, extension) {
        match tokio::fs::remove_file(&target).await {
            Ok(()) => log::debug!("Removed stale {}", target.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn cancelled_during_generation(
    ctx: &JobContext,
    done: usize,
    total: usize,
    report: &JobReport,
) -> DialogueError {
    let message = format!(
        "Cancelled after {} of {} lines (generated {}, skipped {}, already present {})",
        done, total, report.generated, report.skipped, report.existing
    );
    log::info!("{}: {}", ctx.id, message);
    ctx.emit(ProgressEvent::new(ctx.id, JobPhase::Generating, done, total, message));
    DialogueError::Cancelled
}

/// Итог задания после конвертации; при отмене сообщает частичные счетчики
fn finish(ctx: &JobContext, report: JobReport) -> Result<JobReport> {
    if !ctx.cancel.is_cancelled() {
        return Ok(report);
    }

    let (done, total, not_started) = match &report.conversion {
        Some(s) => (s.converted + s.skipped + s.failed, s.total, s.not_dispatched),
        None => (0, 0, 0),
    };
    let message = format!(
        "Cancelled during conversion ({}; not started {})",
        report.message(),
        not_started
    );
    log::info!("{}: {}", ctx.id, message);
    ctx.emit(ProgressEvent::new(ctx.id, JobPhase::Converting, done, total, message));
    Err(DialogueError::Cancelled)
}

async fn run_conversion_only(ctx: &JobContext, job: &ConversionJob) -> Result<JobReport> {
    let summary = convert(ctx, &job.audio_dir, &job.converter).await?;
    finish(
        ctx,
        JobReport {
            conversion: Some(summary),
            ..JobReport::default()
        },
    )
}

async fn convert(
    ctx: &JobContext,
    audio_dir: &Path,
    converter: &ConverterConfig,
) -> Result<ConversionSummary> {
    ctx.emit(ProgressEvent::indeterminate(
        ctx.id,
        JobPhase::Converting,
        "Converting audio files",
    ));

    let callback: ProgressCallback = {
        let progress = ctx.progress.clone();
        let id = ctx.id;
        Arc::new(move |done, total| {
            progress.notify(&ProgressEvent::new(
                id,
                JobPhase::Converting,
                done,
                total,
                "Converting audio files",
            ));
        })
    };

    convert_directory(
        audio_dir,
        &audio_dir.join(READY_DIR),
        converter,
        ctx.services.transcoder.clone(),
        callback,
        &ctx.cancel,
    )
    .await
}
