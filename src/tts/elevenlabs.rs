//! Клиент ElevenLabs
//!
//! Запрашивает сырой PCM (`pcm_22050`, 16 бит, моно) и сам заворачивает его в WAV.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;

use crate::audio::clip::AudioClip;
use crate::error::{DialogueError, Result};
use crate::tts::Synthesizer;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const OUTPUT_FORMAT: &str = "pcm_22050";
const SAMPLE_RATE: u32 = 22050;

pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: &str, voice_id: &str, model_id: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            voice_id: voice_id.to_string(),
            model_id: model_id.to_string(),
        })
    }

    /// Другой адрес API (прокси, тестовый сервер)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.base_url, self.voice_id, OUTPUT_FORMAT
        )
    }
}

/// Сырой 16-битный little-endian PCM в клип
pub fn pcm16_to_clip(bytes: &[u8], sample_rate: u32) -> AudioClip {
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
    AudioClip::new(samples, sample_rate, 1)
}

#[async_trait]
impl Synthesizer for ElevenLabsClient {
    fn name(&self) -> &str {
        "ElevenLabs"
    }

    async fn synthesize(&self, text: &str, destination: &Path) -> Result<PathBuf> {
        log::debug!("Sending TTS request to ElevenLabs voice {}", self.voice_id);
        let response = self
            .client
            .post(self.url())
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.model_id,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            log::error!("ElevenLabs API error (status {}): {}", status, error_text);
            return Err(DialogueError::Synthesis(format!(
                "ElevenLabs returned {}: {}",
                status, error_text
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(DialogueError::Synthesis(
                "ElevenLabs returned empty audio".to_string(),
            ));
        }

        pcm16_to_clip(&bytes, SAMPLE_RATE).write_wav(destination)?;
        Ok(destination.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_is_wrapped_into_wav() {
        let pcm: Vec<u8> = [0i16, 16384, -16384, 32767]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let clip = pcm16_to_clip(&pcm, SAMPLE_RATE);
        assert_eq!(clip.frames(), 4);
        assert!((clip.samples[1] - 0.5).abs() < 1e-4);
        assert!((clip.samples[2] + 0.5).abs() < 1e-4);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.wav");
        clip.write_wav(&path).unwrap();
        let loaded = AudioClip::from_file(&path).unwrap();
        assert_eq!(loaded.sample_rate, 22050);
        assert_eq!(loaded.channels, 1);
    }

    #[test]
    fn test_url_contains_voice_and_format() {
        let client = ElevenLabsClient::new("key", "voice-123", "eleven_multilingual_v2")
            .unwrap()
            .with_base_url("http://localhost:9000/");
        assert_eq!(
            client.url(),
            "http://localhost:9000/v1/text-to-speech/voice-123?output_format=pcm_22050"
        );
    }
}
