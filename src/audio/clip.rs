//! Модуль для работы с аудиоклипами в памяти
//!
//! Клип хранит чередующиеся (interleaved) семплы f32 вместе с частотой
//! дискретизации и числом каналов. WAV читается и пишется через hound,
//! остальные контейнеры (OGG/Vorbis, MP3, AAC) декодируются через Symphonia.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DialogueError, Result};

/// Аудиоклип в памяти
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Чередующиеся семплы в диапазоне [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Частота дискретизации в Гц
    pub sample_rate: u32,
    /// Число каналов
    pub channels: u16,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Клип тишины заданной длительности
    pub fn silence(duration_ms: u64, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let frames = (duration_ms as u128 * sample_rate as u128 / 1000) as usize;
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Число кадров (семплов на канал)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Длительность клипа
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Длительность клипа в миллисекундах
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    /// Совпадают ли частота и число каналов
    pub fn same_format(&self, other: &AudioClip) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Вырезать диапазон кадров `[start, end)`
    pub fn slice_frames(&self, start: usize, end: usize) -> AudioClip {
        let channels = self.channels as usize;
        let end = end.min(self.frames());
        let start = start.min(end);
        AudioClip::new(
            self.samples[start * channels..end * channels].to_vec(),
            self.sample_rate,
            self.channels,
        )
    }

    /// Дописать другой клип в конец
    pub fn append(&mut self, other: &AudioClip) -> Result<()> {
        if !self.same_format(other) {
            return Err(DialogueError::AudioProcessing(format!(
                "Cannot join clips with different formats: {} Hz/{} ch vs {} Hz/{} ch",
                self.sample_rate, self.channels, other.sample_rate, other.channels
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Склеить клипы по порядку. Все клипы должны иметь одинаковый формат.
    pub fn concat(clips: &[AudioClip]) -> Result<AudioClip> {
        let first = clips.first().ok_or_else(|| {
            DialogueError::AudioProcessing("Nothing to concatenate".to_string())
        })?;

        let total: usize = clips.iter().map(|clip| clip.samples.len()).sum();
        let mut joined = AudioClip::new(Vec::with_capacity(total), first.sample_rate, first.channels);
        for clip in clips {
            joined.append(clip)?;
        }
        Ok(joined)
    }

    /// Загрузить клип из файла, формат определяется по расширению
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DialogueError::FileNotFound(path.display().to_string()));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "wav" => decode_wav(path),
            "ogg" | "mp3" | "aac" => decode_with_symphonia(path, &extension),
            other => Err(DialogueError::Decode(format!(
                "Unsupported audio format '{}': {}",
                other,
                path.display()
            ))),
        }
    }

    /// Записать клип в 16-битный PCM WAV
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<()> {
        let spec = WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path.as_ref(), spec)?;
        for sample in &self.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

fn decode_wav(path: &Path) -> Result<AudioClip> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        (format, bits) => {
            return Err(DialogueError::Decode(format!(
                "Unsupported WAV format: {:?}, {} bit",
                format, bits
            )))
        }
    };

    Ok(AudioClip::new(samples, spec.sample_rate, spec.channels))
}

fn decode_with_symphonia(path: &Path, extension: &str) -> Result<AudioClip> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(extension);

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DialogueError::Decode(format!("Cannot probe {}: {}", path.display(), e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DialogueError::Decode(format!("No audio track in {}", path.display())))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DialogueError::Decode(format!("Cannot create decoder: {}", e)))?;

    let mut samples = Vec::new();
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;

                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(e) => {
                log::warn!("Skipping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
        }
    }

    if sample_rate == 0 {
        return Err(DialogueError::Decode(format!(
            "Unknown sample rate in {}",
            path.display()
        )));
    }

    log::debug!(
        "Decoded {} samples from {} ({} Hz, {} ch)",
        samples.len(),
        path.display(),
        sample_rate,
        channels
    );
    Ok(AudioClip::new(samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_roundtrip_keeps_format_and_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");

        let samples: Vec<f32> = (0..8000).map(|i| ((i as f32) * 0.01).sin() * 0.5).collect();
        let clip = AudioClip::new(samples, 8000, 2);
        clip.write_wav(&path).unwrap();

        let loaded = AudioClip::from_file(&path).unwrap();
        assert_eq!(loaded.sample_rate, 8000);
        assert_eq!(loaded.channels, 2);
        assert_eq!(loaded.frames(), 4000);
        assert_eq!(loaded.duration_ms(), 500);
        assert!((loaded.samples[100] - clip.samples[100]).abs() < 1e-3);
    }

    #[test]
    fn test_append_requires_same_format() {
        let mut a = AudioClip::silence(100, 16000, 1);
        let b = AudioClip::silence(100, 22050, 1);
        assert!(a.append(&b).is_err());

        let c = AudioClip::silence(50, 16000, 1);
        a.append(&c).unwrap();
        assert_eq!(a.duration_ms(), 150);

        let joined = AudioClip::concat(&[a.clone(), c.clone(), c]).unwrap();
        assert_eq!(joined.duration_ms(), 250);
        assert!(AudioClip::concat(&[]).is_err());
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        assert!(matches!(
            AudioClip::from_file("/definitely/missing.wav"),
            Err(DialogueError::FileNotFound(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not audio").unwrap();
        assert!(matches!(AudioClip::from_file(&path), Err(DialogueError::Decode(_))));
    }
}
