//! Модуль конвертации готовых реплик
//!
//! Для каждой сырой реплики создаются два варианта в каталоге `ready/`:
//! `output1 (<n>).ogg` с базовым ускорением и `output2 (<n>).ogg` с
//! дополнительным. Скорость зависит от длительности реплики, поверх нее
//! применяется цепочка фильтров ffmpeg. Файлы обрабатываются параллельно,
//! число одновременных процессов ограничено семафором.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::audio::clip::AudioClip;
use crate::config::{ConverterConfig, FilterSpec};
use crate::error::{DialogueError, Result};
use crate::utils::ffmpeg::Transcoder;
use crate::utils::temp::TempFileGuard;

/// Шаг прибавки скорости за каждые начатые 2 секунды сверх трех
const SPEED_STEP: f32 = 0.02;
/// Верхняя граница скорости относительно базовой
const MAX_SPEED_RATIO: f32 = 1.2;
/// Реплики короче этого не ускоряются
const SHORT_LINE_MS: u64 = 2000;
const BASE_WINDOW_MS: u64 = 3000;
const BUCKET_MS: u64 = 2000;

/// Префикс сырых файлов, который снимается при построении имен вариантов
const RAW_PREFIX: &str = "output1 ";

/// Колбэк прогресса конвертации: (завершено, всего к обработке)
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

fn round_speed(speed: f32) -> f32 {
    (speed * 1000.0).round() / 1000.0
}

/// Коэффициент ускорения в зависимости от длительности реплики.
///
/// До 2 секунд скорость не меняется, от 2 до 3 секунд используется базовая,
/// дальше за каждые начатые 2 секунды добавляется 0.02, но не больше
/// `base_speed * 1.2`.
pub fn calculate_speed(duration_ms: u64, base_speed: f32) -> f32 {
    if duration_ms < SHORT_LINE_MS {
        return 1.0;
    }
    if duration_ms <= BASE_WINDOW_MS {
        return base_speed;
    }

    let extra = duration_ms - BASE_WINDOW_MS;
    let buckets = (extra + BUCKET_MS - 1) / BUCKET_MS;
    let speed = base_speed + SPEED_STEP * buckets as f32;
    round_speed(speed.min(base_speed * MAX_SPEED_RATIO))
}

/// Строит выражение для `-af`.
///
/// Фильтры идут строго в каноническом порядке независимо от порядка в
/// конфигурации; выключенные и фильтры без параметров пропускаются.
/// `atempo` добавляется последним и только при скорости, отличной от 1.0.
/// `None` означает, что фильтровать нечего и можно копировать поток.
pub fn build_filter_chain(filters: &[FilterSpec], speed: f32) -> Option<String> {
    let mut enabled: Vec<&FilterSpec> = filters
        .iter()
        .filter(|f| f.enabled && !f.params.trim().is_empty())
        .collect();
    enabled.sort_by_key(|f| f.canonical_order_index());

    let mut stages: Vec<String> = enabled
        .iter()
        .map(|f| format!("{}={}", f.name(), f.params.trim()))
        .collect();

    if (speed - 1.0).abs() > f32::EPSILON {
        stages.push(format!("atempo={}", round_speed(speed)));
    }

    if stages.is_empty() {
        None
    } else {
        Some(stages.join(","))
    }
}

/// Один выходной вариант реплики
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionVariant {
    pub target: PathBuf,
    pub speed: f32,
    pub filter_chain: Option<String>,
}

/// Задание на конвертацию одного исходного файла
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionTask {
    pub source: PathBuf,
    /// Базовый и ускоренный варианты
    pub variants: [ConversionVariant; 2],
}

impl ConversionTask {
    /// Рассчитать скорости и фильтры по длительности исходника
    pub fn plan(
        source: &Path,
        targets: [PathBuf; 2],
        duration_ms: u64,
        config: &ConverterConfig,
    ) -> Self {
        let base = calculate_speed(duration_ms, config.base_speed);
        let boosted = if duration_ms > SHORT_LINE_MS {
            round_speed(base * config.boost_factor)
        } else {
            base
        };

        let [first, second] = targets;
        let variant = |target: PathBuf, speed: f32| ConversionVariant {
            target,
            speed,
            filter_chain: build_filter_chain(&config.filters, speed),
        };

        Self {
            source: source.to_path_buf(),
            variants: [variant(first, base), variant(second, boosted)],
        }
    }
}

/// Итог конвертации каталога
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    /// Всего найдено исходных файлов
    pub total: usize,
    pub converted: usize,
    /// Оба варианта уже существовали
    pub skipped: usize,
    pub failed: usize,
    /// Не запущены из-за отмены
    pub not_dispatched: usize,
}

/// Результат обработки одного файла
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Converted,
    Skipped,
}

/// Подходит ли файл как исходник: `.wav`/`.ogg`, не промежуточный
pub fn is_eligible_source(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if name.contains(".temp.") {
        return false;
    }
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref(),
        Some("wav") | Some("ogg")
    )
}

/// Исходные файлы непосредственно в каталоге, отсортированные по имени
pub fn list_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DialogueError::FileNotFound(dir.display().to_string()));
    }

    let mut sources = Vec::new();
    let mut stems = HashSet::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| DialogueError::Io(e.into()))?;
        if !entry.file_type().is_file() || !is_eligible_source(entry.path()) {
            continue;
        }
        // Одинаковое имя без расширения дает одни и те же цели в `ready/`
        let stem = entry
            .path()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if !stems.insert(stem) {
            log::warn!(
                "Skipping {}: another source with the same name was found",
                entry.path().display()
            );
            continue;
        }
        sources.push(entry.into_path());
    }
    Ok(sources)
}

/// Пути двух вариантов: `output1 <rest>.<ext>` и `output2 <rest>.<ext>`
pub fn target_paths(source: &Path, target_dir: &Path, extension: &str) -> [PathBuf; 2] {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let rest = stem.strip_prefix(RAW_PREFIX).unwrap_or(&stem);

    [
        target_dir.join(format!("output1 {}.{}", rest, extension)),
        target_dir.join(format!("output2 {}.{}", rest, extension)),
    ]
}

fn both_exist(targets: &[PathBuf; 2]) -> bool {
    targets.iter().all(|t| t.exists())
}

fn intermediate_path(source: &Path, target_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    target_dir.join(format!("{}.temp.wav", stem))
}

/// Аргументы финального прохода ffmpeg для одного варианта.
///
/// Без фильтров и при `stream_copy` поток копируется без перекодирования.
pub fn transcoder_args(
    input: &Path,
    variant: &ConversionVariant,
    codec: &str,
    stream_copy: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
    args.push("-i".into());
    args.push(input.as_os_str().to_owned());

    match &variant.filter_chain {
        Some(chain) => {
            args.push("-af".into());
            args.push(chain.into());
            args.push("-c:a".into());
            args.push(codec.into());
        }
        None if stream_copy => {
            args.push("-c".into());
            args.push("copy".into());
        }
        None => {
            args.push("-c:a".into());
            args.push(codec.into());
        }
    }

    args.push(variant.target.as_os_str().to_owned());
    args
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(extension))
}

/// Конвертирует один исходный файл.
///
/// Если оба варианта уже есть, ничего не делает. Иначе декодирует исходник,
/// сохраняет промежуточный WAV и вызывает транскодер для каждого
/// недостающего варианта. Промежуточный файл удаляется всегда, частично
/// записанный вариант удаляется при ошибке.
pub async fn convert_one(
    source: &Path,
    target_dir: &Path,
    config: &ConverterConfig,
    transcoder: &dyn Transcoder,
) -> Result<FileOutcome> {
    let targets = target_paths(source, target_dir, &config.output_extension);
    if both_exist(&targets) {
        log::debug!("Both variants exist for {}, skipping", source.display());
        return Ok(FileOutcome::Skipped);
    }

    let intermediate = TempFileGuard::new(intermediate_path(source, target_dir));
    let decoded = {
        let source = source.to_path_buf();
        let intermediate = intermediate.path().to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<u64> {
            let clip = AudioClip::from_file(&source)?;
            clip.write_wav(&intermediate)?;
            Ok(clip.duration_ms())
        })
        .await
        .map_err(|e| DialogueError::AudioProcessing(format!("Decoder task failed: {}", e)))?
    };
    let duration_ms = decoded?;

    let task = ConversionTask::plan(source, targets, duration_ms, config);
    for variant in &task.variants {
        if variant.target.exists() {
            continue;
        }

        // Копировать поток можно только из исходника в том же контейнере
        let stream_copy = variant.filter_chain.is_none()
            && has_extension(source, &config.output_extension);
        let input = if stream_copy { source } else { intermediate.path() };

        let output = TempFileGuard::new(&variant.target);
        let args = transcoder_args(input, variant, &config.codec, stream_copy);
        transcoder.run(&args).await?;
        output.commit();

        log::debug!(
            "Converted {} -> {} (speed {})",
            task.source.display(),
            variant.target.display(),
            variant.speed
        );
    }

    Ok(FileOutcome::Converted)
}

/// Конвертирует все подходящие файлы каталога `dir` в `target_dir`.
///
/// Отмена кооперативная: после нее новые файлы не запускаются, а уже
/// запущенные доводятся до конца. Ошибка одного файла не прерывает пакет.
pub async fn convert_directory(
    dir: &Path,
    target_dir: &Path,
    config: &ConverterConfig,
    transcoder: Arc<dyn Transcoder>,
    progress: ProgressCallback,
    cancel: &CancellationToken,
) -> Result<ConversionSummary> {
    tokio::fs::create_dir_all(target_dir).await?;

    let sources = list_sources(dir)?;
    let mut summary = ConversionSummary {
        total: sources.len(),
        ..Default::default()
    };

    let pending: Vec<PathBuf> = sources
        .into_iter()
        .filter(|source| {
            let done = both_exist(&target_paths(source, target_dir, &config.output_extension));
            if done {
                summary.skipped += 1;
            }
            !done
        })
        .collect();

    let to_process = pending.len();
    let workers = config.effective_workers();
    let interval = config.progress_interval.max(1);
    log::info!(
        "Converting {} of {} files from {} with {} workers",
        to_process,
        summary.total,
        dir.display(),
        workers
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let completed = Arc::new(AtomicUsize::new(0));
    let shared_config = Arc::new(config.clone());
    let target_dir = Arc::new(target_dir.to_path_buf());
    let mut tasks = Vec::with_capacity(to_process);

    for source in pending {
        if cancel.is_cancelled() {
            break;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => permit
                .map_err(|e| DialogueError::Other(format!("Worker pool closed: {}", e)))?,
        };

        let transcoder = transcoder.clone();
        let config = shared_config.clone();
        let target_dir = target_dir.clone();
        let completed = completed.clone();
        let progress = progress.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let result = convert_one(&source, &target_dir, &config, transcoder.as_ref()).await;
            if let Err(e) = &result {
                log::error!("Conversion of {} failed: {}", source.display(), e);
            }

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if done % interval == 0 || done == to_process {
                progress(done, to_process);
            }
            result
        }));
    }

    summary.not_dispatched = to_process - tasks.len();
    if summary.not_dispatched > 0 {
        log::info!(
            "Conversion cancelled, {} files were not started",
            summary.not_dispatched
        );
    }

    let results = join_all(tasks).await;
    if summary.not_dispatched > 0 {
        progress(completed.load(Ordering::SeqCst), to_process);
    }

    for result in results {
        match result {
            Ok(Ok(FileOutcome::Converted)) => summary.converted += 1,
            Ok(Ok(FileOutcome::Skipped)) => summary.skipped += 1,
            Ok(Err(_)) => summary.failed += 1,
            Err(e) => {
                log::error!("Conversion task panicked: {}", e);
                summary.failed += 1;
            }
        }
    }

    log::info!(
        "Conversion finished: {} converted, {} skipped, {} failed, {} not started",
        summary.converted,
        summary.skipped,
        summary.failed,
        summary.not_dispatched
    );
    Ok(summary)
}
