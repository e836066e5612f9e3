//! Синтез одной реплики
//!
//! Короткая реплика синтезируется одним вызовом. Длинная режется на фрагменты,
//! каждый фрагмент синтезируется во временный каталог рядом с итоговым файлом,
//! затем фрагменты склеиваются и экспортируются один раз.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::audio::clip::AudioClip;
use crate::audio::stitcher::stitch;
use crate::config::ChunkingConfig;
use crate::error::{DialogueError, Result};
use crate::text::split_text;
use crate::tts::Synthesizer;
use crate::utils::ffmpeg::Transcoder;
use crate::utils::temp::{ChunkWorkspace, TempFileGuard};

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("wav"))
}

/// Синтезировать реплику `text` в файл `destination`.
///
/// Ошибка синтеза любого фрагмента считается ошибкой всей реплики.
/// Фрагмент, о котором синтезатор сообщил успех, но файла нет, пропускается
/// с предупреждением. Если не осталось ни одного фрагмента, это ошибка.
pub async fn synthesize_line(
    synth: &dyn Synthesizer,
    text: &str,
    destination: &Path,
    chunking: &ChunkingConfig,
    transcoder: &dyn Transcoder,
) -> Result<PathBuf> {
    let chunks = split_text(text, chunking.max_chars);
    if chunks.is_empty() {
        return Err(DialogueError::InvalidInput("Empty dialogue line".to_string()));
    }

    if chunks.len() == 1 && is_wav(destination) {
        return synth.synthesize(&chunks[0], destination).await;
    }

    log::debug!(
        "Line split into {} chunks for {}",
        chunks.len(),
        destination.display()
    );

    let mut workspace = ChunkWorkspace::next_to(destination, "wav")?;
    let mut produced = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        let chunk_path = workspace.chunk_path(index);
        let written = synth.synthesize(chunk, &chunk_path).await?;
        produced.push(written);
    }

    let stitched_wav = if is_wav(destination) {
        destination.to_path_buf()
    } else {
        workspace.path().join("stitched.wav")
    };

    let output = TempFileGuard::new(&stitched_wav);
    {
        let chunking = chunking.clone();
        let target = stitched_wav.clone();
        tokio::task::spawn_blocking(move || stitch_files(&produced, &chunking, &target))
            .await
            .map_err(|e| DialogueError::AudioProcessing(format!("Stitch task failed: {}", e)))??;
    }

    if is_wav(destination) {
        output.commit();
        return Ok(destination.to_path_buf());
    }

    let final_output = TempFileGuard::new(destination);
    let args: Vec<OsString> = vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        stitched_wav.into_os_string(),
        destination.as_os_str().to_owned(),
    ];
    transcoder.run(&args).await?;
    Ok(final_output.commit())
}

fn stitch_files(files: &[PathBuf], chunking: &ChunkingConfig, target: &Path) -> Result<()> {
    let mut clips = Vec::with_capacity(files.len());
    for file in files {
        if !file.exists() {
            log::warn!("Chunk file {} is missing, skipping it", file.display());
            continue;
        }
        clips.push(AudioClip::from_file(file)?);
    }

    if clips.is_empty() {
        return Err(DialogueError::Synthesis(
            "No chunk produced any audio".to_string(),
        ));
    }

    let clip = stitch(&clips, chunking)?;
    clip.write_wav(target)
}
