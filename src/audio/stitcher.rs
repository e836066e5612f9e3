//! Склейка синтезированных фрагментов
//!
//! Каждый фрагмент сначала освобождается от длинной тишины в начале и в конце,
//! затем фрагменты склеиваются по порядку в один клип.

use crate::audio::clip::AudioClip;
use crate::config::{ChunkingConfig, InterChunkGap};
use crate::error::{DialogueError, Result};

/// Длина окна анализа тишины
const FRAME_MS: u64 = 10;

/// Уровень окна в dBFS по среднеквадратичному значению
fn frame_dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    if mean_square <= 0.0 {
        f32::NEG_INFINITY
    } else {
        10.0 * mean_square.log10()
    }
}

/// Обрезает тишину в начале и в конце клипа.
///
/// Тихим считается окно с уровнем не выше `threshold_db`. Ведущая или
/// завершающая тишина удаляется, только если она длится не меньше
/// `min_silence_ms`. Полностью тихий клип возвращается без изменений.
pub fn trim_silence(clip: &AudioClip, threshold_db: f32, min_silence_ms: u64) -> AudioClip {
    let total_frames = clip.frames();
    if total_frames == 0 || clip.sample_rate == 0 {
        return clip.clone();
    }

    let window = ((clip.sample_rate as u64 * FRAME_MS / 1000) as usize).max(1);
    let channels = clip.channels as usize;

    let silent: Vec<bool> = clip
        .samples
        .chunks(window * channels)
        .map(|chunk| frame_dbfs(chunk) <= threshold_db)
        .collect();

    let leading = silent.iter().take_while(|s| **s).count();
    if leading == silent.len() {
        log::debug!("Clip is silent end to end, keeping it as is");
        return clip.clone();
    }
    let trailing = silent.iter().rev().take_while(|s| **s).count();

    let frames_to_ms = |frames: usize| frames as u64 * 1000 / clip.sample_rate as u64;

    let lead_frames = (leading * window).min(total_frames);
    let start = if frames_to_ms(lead_frames) >= min_silence_ms {
        lead_frames
    } else {
        0
    };

    // Последнее окно может быть короче остальных
    let tail_start = if trailing == 0 {
        total_frames
    } else {
        (silent.len() - trailing) * window
    };
    let end = if frames_to_ms(total_frames - tail_start) >= min_silence_ms {
        tail_start
    } else {
        total_frames
    };

    if start == 0 && end == total_frames {
        return clip.clone();
    }

    log::debug!(
        "Trimmed {} ms of leading and {} ms of trailing silence",
        frames_to_ms(start),
        frames_to_ms(total_frames - end)
    );
    clip.slice_frames(start, end)
}

/// Обрезает каждый фрагмент и склеивает их в исходном порядке.
///
/// Пауза между фрагментами вставляется только при `InterChunkGap::Silence`.
pub fn stitch(clips: &[AudioClip], config: &ChunkingConfig) -> Result<AudioClip> {
    let first = clips
        .first()
        .ok_or_else(|| DialogueError::AudioProcessing("No chunks to stitch".to_string()))?;

    let gap = match config.inter_chunk_gap {
        InterChunkGap::None => None,
        InterChunkGap::Silence { ms } => {
            Some(AudioClip::silence(ms, first.sample_rate, first.channels))
        }
    };

    let mut parts = Vec::with_capacity(clips.len() * 2);
    for (index, clip) in clips.iter().enumerate() {
        if index > 0 {
            if let Some(gap) = &gap {
                parts.push(gap.clone());
            }
        }
        parts.push(trim_silence(
            clip,
            config.silence_threshold_db,
            config.min_silence_ms,
        ));
    }

    AudioClip::concat(&parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8000;

    fn tone(ms: u64) -> AudioClip {
        let frames = (ms * RATE as u64 / 1000) as usize;
        let samples = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / RATE as f32).sin() * 0.5)
            .collect();
        AudioClip::new(samples, RATE, 1)
    }

    fn padded(lead_ms: u64, tone_ms: u64, tail_ms: u64) -> AudioClip {
        AudioClip::concat(&[
            AudioClip::silence(lead_ms, RATE, 1),
            tone(tone_ms),
            AudioClip::silence(tail_ms, RATE, 1),
        ])
        .unwrap()
    }

    #[test]
    fn test_long_silence_is_trimmed_on_both_sides() {
        let clip = padded(2000, 1000, 2000);
        let trimmed = trim_silence(&clip, -40.0, 1350);
        assert_eq!(trimmed.duration_ms(), 1000);
    }

    #[test]
    fn test_short_silence_is_kept() {
        let clip = padded(500, 1000, 2000);
        let trimmed = trim_silence(&clip, -40.0, 1350);
        assert_eq!(trimmed.duration_ms(), 1500);
    }

    #[test]
    fn test_all_silent_clip_is_returned_unchanged() {
        let clip = AudioClip::silence(3000, RATE, 1);
        let trimmed = trim_silence(&clip, -40.0, 1350);
        assert_eq!(trimmed, clip);
    }

    #[test]
    fn test_stitch_without_gap() {
        let config = ChunkingConfig::default();
        let stitched = stitch(&[padded(2000, 1000, 2000), tone(500)], &config).unwrap();
        assert_eq!(stitched.duration_ms(), 1500);
    }

    #[test]
    fn test_stitch_with_configured_gap() {
        let config = ChunkingConfig {
            inter_chunk_gap: InterChunkGap::Silence { ms: 250 },
            ..ChunkingConfig::default()
        };
        let stitched = stitch(&[tone(500), tone(500), tone(500)], &config).unwrap();
        assert_eq!(stitched.duration_ms(), 2000);
    }

    #[test]
    fn test_stitch_rejects_empty_input() {
        assert!(stitch(&[], &ChunkingConfig::default()).is_err());
    }
}
