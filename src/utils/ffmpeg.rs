//! Модуль для работы с FFmpeg
//!
//! Транскодер всегда вызывается со списком аргументов, без командной оболочки.
//! Трейт `Transcoder` позволяет подменить ffmpeg в тестах.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use semver::Version;
use tokio::process::Command;

use crate::error::{DialogueError, Result};

lazy_static! {
    static ref VERSION_RE: Regex =
        Regex::new(r"version\s+n?(\d+)\.(\d+)(?:\.(\d+))?").expect("valid version regex");
}

/// Внешний транскодер
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Запустить транскодер с готовым списком аргументов
    async fn run(&self, args: &[OsString]) -> Result<()>;
}

/// FFmpeg как транскодер
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    binary: PathBuf,
}

impl Ffmpeg {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Найти ffmpeg в PATH
    pub fn locate() -> Result<Self> {
        let binary = which::which("ffmpeg").map_err(|e| {
            DialogueError::Configuration(format!("ffmpeg not found in PATH: {}", e))
        })?;
        log::debug!("Using ffmpeg at {}", binary.display());
        Ok(Self::new(binary))
    }

    /// Явный путь, если задан, иначе поиск в PATH
    pub fn from_config(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Ok(Self::new(path)),
            Some(path) => Err(DialogueError::FileNotFound(path.display().to_string())),
            None => Self::locate(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Версия ffmpeg из вывода `ffmpeg -version`
    pub async fn version(&self) -> Result<Version> {
        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(DialogueError::Transcoder {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or("");
        parse_version(first_line).ok_or_else(|| {
            DialogueError::Other(format!("Cannot parse ffmpeg version from '{}'", first_line))
        })
    }
}

/// Достать версию из первой строки `ffmpeg -version`
pub fn parse_version(line: &str) -> Option<Version> {
    let caps = VERSION_RE.captures(line)?;
    let part = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };
    Some(Version::new(part(1), part(2), part(3)))
}

#[async_trait]
impl Transcoder for Ffmpeg {
    async fn run(&self, args: &[OsString]) -> Result<()> {
        log::debug!("Running {} {:?}", self.binary.display(), args);

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            log::error!("ffmpeg failed with {}: {}", output.status, stderr.trim());
            return Err(DialogueError::Transcoder {
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(())
    }
}
