//! Подставные реализации для тестов: синтезатор, провайдер бэкендов и транскодер

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::audio::clip::AudioClip;
use crate::config::BackendConfig;
use crate::error::{DialogueError, Result};
use crate::tts::{BackendProvider, Synthesizer};
use crate::utils::ffmpeg::Transcoder;

pub const RATE: u32 = 8000;

/// Записать синусоиду заданной длительности в WAV
pub fn write_tone_wav(path: &Path, duration_ms: u64) {
    let frames = (duration_ms * RATE as u64 / 1000) as usize;
    let samples = (0..frames)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / RATE as f32).sin() * 0.5)
        .collect();
    AudioClip::new(samples, RATE, 1).write_wav(path).unwrap();
}

/// Транскодер, который копирует вход в выход и считает вызовы
pub struct FakeTranscoder {
    calls: Mutex<Vec<Vec<OsString>>>,
    fail_on: Option<String>,
    hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
            hook: None,
        }
    }

    /// Падать, если какой-либо аргумент содержит `needle`
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::new()
        }
    }

    /// Вызвать `hook` в начале каждого запуска
    pub fn on_run(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<Vec<OsString>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn run(&self, args: &[OsString]) -> Result<()> {
        self.calls.lock().push(args.to_vec());
        if let Some(hook) = &self.hook {
            hook();
        }

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .map(PathBuf::from)
            .ok_or_else(|| DialogueError::InvalidInput("no input".to_string()))?;
        let output = args
            .last()
            .map(PathBuf::from)
            .ok_or_else(|| DialogueError::InvalidInput("no output".to_string()))?;

        if let Some(needle) = &self.fail_on {
            if args.iter().any(|a| a.to_string_lossy().contains(needle.as_str())) {
                tokio::fs::write(&output, b"partial").await?;
                return Err(DialogueError::Transcoder {
                    status: "exit status: 1".to_string(),
                    stderr: format!("simulated failure for {}", input.display()),
                });
            }
        }

        tokio::fs::copy(&input, &output).await?;
        Ok(())
    }
}

/// Синтезатор, который пишет тон длительностью 40 мс на каждый символ
pub struct FakeSynthesizer {
    calls: Mutex<Vec<String>>,
    fail_on: HashSet<String>,
    skip_writing: HashSet<String>,
    gate: Option<Arc<Notify>>,
    started: Arc<Notify>,
}

impl FakeSynthesizer {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_on: HashSet::new(),
            skip_writing: HashSet::new(),
            gate: None,
            started: Arc::new(Notify::new()),
        }
    }

    /// Возвращать ошибку для этого текста
    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.insert(text.to_string());
        self
    }

    /// Сообщать об успехе, но не создавать файл для этого текста
    pub fn without_file_for(mut self, text: &str) -> Self {
        self.skip_writing.insert(text.to_string());
        self
    }

    /// Перед каждым синтезом ждать разрешения через `Notify`
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Сигнал о начале очередного синтеза
    pub fn started(&self) -> Arc<Notify> {
        self.started.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    fn name(&self) -> &str {
        "fake"
    }

    async fn synthesize(&self, text: &str, destination: &Path) -> Result<PathBuf> {
        self.calls.lock().push(text.to_string());
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.fail_on.contains(text) {
            return Err(DialogueError::Synthesis(format!("cannot say '{}'", text)));
        }
        if !self.skip_writing.contains(text) {
            write_tone_wav(destination, 40 * text.chars().count() as u64);
        }
        Ok(destination.to_path_buf())
    }
}

/// Провайдер, который отдает один и тот же синтезатор и считает загрузки
pub struct FakeProvider {
    synthesizer: Arc<FakeSynthesizer>,
    loads: AtomicUsize,
    fail: bool,
}

impl FakeProvider {
    pub fn new(synthesizer: Arc<FakeSynthesizer>) -> Self {
        Self {
            synthesizer,
            loads: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Arc::new(FakeSynthesizer::new()))
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendProvider for FakeProvider {
    async fn load(&self, config: &BackendConfig) -> Result<Arc<dyn Synthesizer>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DialogueError::BackendLoad(format!(
                "{} is not available",
                config.display_name()
            )));
        }
        Ok(self.synthesizer.clone())
    }
}

/// Конфигурация бэкенда для тестов
pub fn local_backend(url: &str) -> BackendConfig {
    BackendConfig::LocalApi {
        engine: crate::config::LocalEngine::Xtts,
        api_url: url.to_string(),
        voice_file: None,
        timeout_secs: 5,
    }
}
