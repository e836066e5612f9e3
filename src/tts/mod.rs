//! Модуль для работы с TTS
//!
//! Ядро знает о синтезаторах только через трейт `Synthesizer`. Конкретный
//! бэкенд выбирается конфигурацией задания: закрытое перечисление `Backend`
//! содержит по одному варианту на каждый поддерживаемый сервис.

pub mod elevenlabs;
pub mod google;
pub mod line;
pub mod local_api;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::BackendConfig;
use crate::error::{DialogueError, Result};

pub use elevenlabs::ElevenLabsClient;
pub use google::GoogleCloudClient;
pub use line::synthesize_line;
pub use local_api::LocalApiClient;

/// Синтезатор речи
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Имя бэкенда для логов
    fn name(&self) -> &str;

    /// Синтезировать `text` в файл `destination`.
    ///
    /// Возвращает путь к фактически записанному файлу.
    async fn synthesize(&self, text: &str, destination: &Path) -> Result<PathBuf>;
}

/// Все поддерживаемые бэкенды
pub enum Backend {
    LocalApi(LocalApiClient),
    ElevenLabs(ElevenLabsClient),
    GoogleCloud(GoogleCloudClient),
}

impl Backend {
    /// Создать бэкенд по конфигурации; неполная конфигурация отклоняется сразу
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        config.validate()?;

        let backend = match config {
            BackendConfig::LocalApi {
                engine,
                api_url,
                voice_file,
                timeout_secs,
            } => Backend::LocalApi(LocalApiClient::new(
                *engine,
                api_url,
                voice_file.clone(),
                *timeout_secs,
            )?),
            BackendConfig::ElevenLabs {
                api_key,
                voice_id,
                model_id,
            } => Backend::ElevenLabs(ElevenLabsClient::new(api_key, voice_id, model_id)?),
            BackendConfig::GoogleCloud {
                api_key,
                voice_name,
                language_code,
            } => Backend::GoogleCloud(GoogleCloudClient::new(
                api_key,
                voice_name.clone(),
                language_code,
            )?),
        };
        Ok(backend)
    }
}

#[async_trait]
impl Synthesizer for Backend {
    fn name(&self) -> &str {
        match self {
            Backend::LocalApi(client) => client.name(),
            Backend::ElevenLabs(client) => client.name(),
            Backend::GoogleCloud(client) => client.name(),
        }
    }

    async fn synthesize(&self, text: &str, destination: &Path) -> Result<PathBuf> {
        match self {
            Backend::LocalApi(client) => client.synthesize(text, destination).await,
            Backend::ElevenLabs(client) => client.synthesize(text, destination).await,
            Backend::GoogleCloud(client) => client.synthesize(text, destination).await,
        }
    }
}

/// Источник синтезаторов по конфигурации
#[async_trait]
pub trait BackendProvider: Send + Sync {
    async fn load(&self, config: &BackendConfig) -> Result<Arc<dyn Synthesizer>>;
}

/// Провайдер, создающий настоящие HTTP клиенты
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackends;

#[async_trait]
impl BackendProvider for DefaultBackends {
    async fn load(&self, config: &BackendConfig) -> Result<Arc<dyn Synthesizer>> {
        let backend = Backend::from_config(config)
            .map_err(|e| DialogueError::BackendLoad(format!("{}: {}", config.display_name(), e)))?;
        Ok(Arc::new(backend))
    }
}

/// Кэш загруженного бэкенда.
///
/// Бэкенд переиспользуется только для той же самой конфигурации; любое
/// изменение (сервис, голос, ключ) приводит к загрузке заново.
#[derive(Default)]
pub struct BackendCache {
    current: Mutex<Option<(BackendConfig, Arc<dyn Synthesizer>)>>,
}

impl BackendCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Вернуть бэкенд для `config`, загрузив его при необходимости
    pub async fn get(
        &self,
        config: &BackendConfig,
        provider: &dyn BackendProvider,
    ) -> Result<Arc<dyn Synthesizer>> {
        {
            let mut current = self.current.lock();
            if let Some((loaded, synth)) = current.as_ref() {
                if loaded == config {
                    log::debug!("Reusing loaded backend {}", synth.name());
                    return Ok(synth.clone());
                }
                log::info!(
                    "Backend configuration changed ({} -> {}), reloading",
                    loaded.display_name(),
                    config.display_name()
                );
            }
            *current = None;
        }

        log::info!("Loading backend {}", config.display_name());
        let synth = provider.load(config).await?;
        *self.current.lock() = Some((config.clone(), synth.clone()));
        Ok(synth)
    }

    /// Сбросить загруженный бэкенд
    pub fn invalidate(&self) {
        *self.current.lock() = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.current.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{local_backend, FakeProvider, FakeSynthesizer};

    #[tokio::test]
    async fn test_cache_reuses_same_config_and_reloads_on_change() {
        let provider = FakeProvider::new(Arc::new(FakeSynthesizer::new()));
        let cache = BackendCache::new();

        cache.get(&local_backend("http://a"), &provider).await.unwrap();
        cache.get(&local_backend("http://a"), &provider).await.unwrap();
        assert_eq!(provider.load_count(), 1);

        cache.get(&local_backend("http://b"), &provider).await.unwrap();
        assert_eq!(provider.load_count(), 2);

        cache.invalidate();
        assert!(!cache.is_loaded());
        cache.get(&local_backend("http://b"), &provider).await.unwrap();
        assert_eq!(provider.load_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_cache_empty() {
        let cache = BackendCache::new();
        let good = FakeProvider::new(Arc::new(FakeSynthesizer::new()));
        cache.get(&local_backend("http://a"), &good).await.unwrap();

        let result = cache.get(&local_backend("http://b"), &FakeProvider::failing()).await;
        assert!(matches!(result, Err(DialogueError::BackendLoad(_))));
        assert!(!cache.is_loaded());
    }

    #[tokio::test]
    async fn test_default_backends_reject_incomplete_config() {
        let config = BackendConfig::GoogleCloud {
            api_key: String::new(),
            voice_name: None,
            language_code: "pl-PL".to_string(),
        };
        let result = DefaultBackends.load(&config).await;
        assert!(matches!(result, Err(DialogueError::BackendLoad(_))));

        let synth = DefaultBackends.load(&local_backend("http://127.0.0.1:1")).await.unwrap();
        assert_eq!(synth.name(), "XTTS");
    }
}
