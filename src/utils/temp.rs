//! Модуль для работы с временными файлами
//!
//! Все временные файлы и каталоги удаляются при выходе из области видимости,
//! в том числе при ошибке и при отмене задания.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// Временный каталог для фрагментов одной реплики.
///
/// Создается рядом с итоговым файлом (`temp_XXXXXXXX`) и удаляется целиком
/// при уничтожении.
pub struct ChunkWorkspace {
    temp_dir: TempDir,
    extension: String,
    files: Vec<PathBuf>,
}

impl ChunkWorkspace {
    /// Создать каталог рядом с `destination`
    pub fn next_to(destination: &Path, extension: &str) -> Result<Self> {
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let temp_dir = tempfile::Builder::new()
            .prefix("temp_")
            .rand_bytes(8)
            .tempdir_in(&parent)?;

        log::debug!("Created chunk workspace {}", temp_dir.path().display());
        Ok(Self {
            temp_dir,
            extension: extension.trim_start_matches('.').to_string(),
            files: Vec::new(),
        })
    }

    /// Путь для очередного фрагмента: `part_000_abcdef.wav`
    pub fn chunk_path(&mut self, index: usize) -> PathBuf {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("part_{:03}_{}.{}", index, &suffix[..6], self.extension);
        let path = self.temp_dir.path().join(file_name);
        self.files.push(path.clone());
        path
    }

    /// Путь к временному каталогу
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Все выданные пути к фрагментам в порядке выдачи
    pub fn chunk_files(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for ChunkWorkspace {
    fn drop(&mut self) {
        log::debug!("Removing chunk workspace {}", self.temp_dir.path().display());
    }
}

/// Файл, который удаляется при уничтожении, если его не зафиксировали.
///
/// Используется для промежуточных файлов и для частично записанного
/// результата транскодера.
pub struct TempFileGuard {
    path: PathBuf,
    keep: bool,
}

impl TempFileGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Оставить файл на диске
    pub fn commit(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.keep || !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_lives_next_to_destination_and_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("output1 (3).wav");

        let workspace_path;
        {
            let mut workspace = ChunkWorkspace::next_to(&destination, "wav").unwrap();
            workspace_path = workspace.path().to_path_buf();
            assert_eq!(workspace_path.parent().unwrap(), dir.path());
            assert!(workspace_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("temp_"));

            let chunk = workspace.chunk_path(7);
            let name = chunk.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("part_007_"));
            assert!(name.ends_with(".wav"));
            fs::write(&chunk, b"data").unwrap();
            assert_eq!(workspace.chunk_files().len(), 1);
        }
        assert!(!workspace_path.exists());
    }

    #[test]
    fn test_guard_removes_unless_committed() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("partial.ogg");
        let kept = dir.path().join("done.ogg");
        fs::write(&dropped, b"x").unwrap();
        fs::write(&kept, b"x").unwrap();

        {
            let _guard = TempFileGuard::new(&dropped);
        }
        let guard = TempFileGuard::new(&kept);
        assert_eq!(guard.path(), kept.as_path());
        guard.commit();

        assert!(!dropped.exists());
        assert!(kept.exists());
    }
}
