//! Интерфейс командной строки dialogue-tts

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::{AppConfig, BackendConfig};
use crate::error::{DialogueError, Result};
use crate::notification::{ConsoleProgressObserver, LogObserver, MemoryProgressObserver};
use crate::progress::JobPhase;
use crate::queue::{ConversionJob, GenerationJob, Job, JobId, JobManager, Services};
use crate::text::split_text;
use crate::tts::DefaultBackends;
use crate::utils::ffmpeg::Ffmpeg;

/// Озвучка игровых диалогов: генерация, склейка и конвертация
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Подробный лог (debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Сгенерировать реплики и сконвертировать результат
    Generate(GenerateCommand),

    /// Сконвертировать уже сгенерированные файлы
    Convert(ConvertCommand),

    /// Показать, как реплика будет разбита на фрагменты
    Split(SplitCommand),

    /// Проверить, что ffmpeg доступен
    CheckFfmpeg,
}

#[derive(Parser, Debug)]
pub struct GenerateCommand {
    /// Каталог для сырых файлов
    #[arg(short, long)]
    pub audio_dir: PathBuf,

    /// Текстовый файл, одна реплика на строку
    #[arg(short, long)]
    pub lines: PathBuf,

    /// JSON с конфигурацией бэкенда
    #[arg(short, long)]
    pub backend_config: PathBuf,

    /// JSON с общей конфигурацией
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Синтезировать заново и реплики, у которых уже есть файл
    #[arg(long)]
    pub regenerate: bool,
}

#[derive(Parser, Debug)]
pub struct ConvertCommand {
    #[arg(short, long)]
    pub audio_dir: PathBuf,

    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Число одновременных процессов ffmpeg
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct SplitCommand {
    #[arg(short, long, default_value_t = 200)]
    pub max_chars: usize,

    pub text: String,
}

/// Реплики из текста: номер строки (с единицы) и текст, пустые строки пропускаются
pub fn parse_lines(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| ((index + 1).to_string(), line.trim().to_string()))
        .collect()
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => Ok(AppConfig::default()),
    }
}

fn label_for(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Выполнить одно задание в отдельном менеджере; Ctrl-C отменяет задание
async fn run_single_job(config: &AppConfig, job: Job) -> Result<()> {
    let ffmpeg = Ffmpeg::from_config(config.converter.ffmpeg_path.as_deref())?;
    let services = Services::from_config(config, Arc::new(DefaultBackends), Arc::new(ffmpeg));
    let manager = JobManager::new(services)?;

    let history = MemoryProgressObserver::new();
    manager.subscribe_progress(Arc::new(ConsoleProgressObserver::new()));
    manager.subscribe_progress(Arc::new(history.clone()));
    manager.subscribe_queue(Arc::new(LogObserver));

    let id = manager.enqueue(job);

    let canceller = manager.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling the current job");
            canceller.request_cancel_current();
        }
    });

    manager.wait_idle().await;
    ctrl_c.abort();

    final_outcome(&history, id)
}

fn final_outcome(history: &MemoryProgressObserver, id: JobId) -> Result<()> {
    let last = history
        .history()
        .into_iter()
        .rev()
        .find(|e| e.job_id == id && e.phase.is_terminal());

    match last {
        Some(event) if event.phase == JobPhase::Completed => Ok(()),
        Some(event) if event.phase == JobPhase::Cancelled => Err(DialogueError::Cancelled),
        Some(event) => Err(DialogueError::Other(event.message)),
        None => Err(DialogueError::Other(format!("{} did not finish", id))),
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Generate(cmd) => {
            let config = load_config(cmd.config.as_deref())?;
            let backend = BackendConfig::from_file(&cmd.backend_config)?;
            backend.validate()?;

            let content = tokio::fs::read_to_string(&cmd.lines).await?;
            let lines = parse_lines(&content);
            if lines.is_empty() {
                return Err(DialogueError::InvalidInput(format!(
                    "No dialogue lines in {}",
                    cmd.lines.display()
                )));
            }

            let job = GenerationJob {
                label: label_for(&cmd.audio_dir),
                audio_dir: cmd.audio_dir,
                lines,
                backend,
                converter: config.converter.clone(),
                skip_existing: !cmd.regenerate,
            };
            run_single_job(&config, job.into()).await
        }
        Commands::Convert(cmd) => {
            let mut config = load_config(cmd.config.as_deref())?;
            if cmd.workers.is_some() {
                config.converter.max_workers = cmd.workers;
            }

            let job = ConversionJob {
                label: label_for(&cmd.audio_dir),
                audio_dir: cmd.audio_dir,
                converter: config.converter.clone(),
            };
            run_single_job(&config, job.into()).await
        }
        Commands::Split(cmd) => {
            for (index, chunk) in split_text(&cmd.text, cmd.max_chars).iter().enumerate() {
                println!("{:3} [{:3}] {}", index, chunk.chars().count(), chunk);
            }
            Ok(())
        }
        Commands::CheckFfmpeg => {
            let ffmpeg = Ffmpeg::locate()?;
            let version = ffmpeg.version().await?;
            println!("ffmpeg {} at {}", version, ffmpeg.binary().display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEvent;
    use crate::progress::ProgressObserver;

    #[test]
    fn test_parse_lines_keeps_line_numbers() {
        let lines = parse_lines("Pierwsza\n\n  Trzecia  \n   \nPiąta");
        assert_eq!(
            lines,
            vec![
                ("1".to_string(), "Pierwsza".to_string()),
                ("3".to_string(), "Trzecia".to_string()),
                ("5".to_string(), "Piąta".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "dialogue-tts",
            "convert",
            "--audio-dir",
            "voice",
            "--workers",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Convert(cmd) => {
                assert_eq!(cmd.audio_dir, PathBuf::from("voice"));
                assert_eq!(cmd.workers, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["dialogue-tts", "split", "-m", "20", "Tekst."]).unwrap();
        assert!(matches!(cli.command, Commands::Split(ref cmd) if cmd.max_chars == 20));
    }

    #[test]
    fn test_generate_skips_existing_lines_unless_regenerating() {
        let args = ["dialogue-tts", "generate", "-a", "voice", "-l", "lines.txt", "-b", "xtts.json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.command, Commands::Generate(ref cmd) if !cmd.regenerate));

        let cli = Cli::try_parse_from(args.iter().copied().chain(["--regenerate"])).unwrap();
        assert!(matches!(cli.command, Commands::Generate(ref cmd) if cmd.regenerate));
    }

    #[test]
    fn test_final_outcome_maps_phases() {
        let history = MemoryProgressObserver::new();
        history.on_progress(&ProgressEvent::new(JobId(1), JobPhase::Failed, 0, 0, "boom"));
        history.on_progress(&ProgressEvent::new(JobId(2), JobPhase::Cancelled, 0, 0, ""));

        assert!(matches!(
            final_outcome(&history, JobId(1)),
            Err(DialogueError::Other(ref m)) if m == "boom"
        ));
        assert!(matches!(final_outcome(&history, JobId(2)), Err(DialogueError::Cancelled)));
        assert!(final_outcome(&history, JobId(3)).is_err());
    }
}
