//! Модуль для отслеживания прогресса выполнения заданий
//!
//! Этот модуль предоставляет реализацию паттерна Observer: подписчики очереди
//! получают снимок состояния очереди, подписчики прогресса получают события
//! о ходе текущего задания.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::queue::job::{JobId, JobSummary};

/// Значение `completed` и `total` для неопределенного прогресса
pub const INDETERMINATE: i64 = -1;

/// Состояние задания
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// Ожидает в очереди
    Queued,
    /// Загрузка бэкенда синтеза
    LoadingBackend,
    /// Генерация реплик
    Generating,
    /// Конвертация готовых файлов
    Converting,
    Completed,
    Cancelled,
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::LoadingBackend => "loading backend",
            Self::Generating => "generating",
            Self::Converting => "converting",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Завершено ли задание
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Событие прогресса задания
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub phase: JobPhase,
    /// Сколько выполнено, либо `INDETERMINATE`
    pub completed: i64,
    /// Сколько всего, либо `INDETERMINATE`
    pub total: i64,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(
        job_id: JobId,
        phase: JobPhase,
        completed: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id,
            phase,
            completed: completed as i64,
            total: total as i64,
            message: message.into(),
        }
    }

    /// Работа идет, но оценить объем пока нельзя
    pub fn indeterminate(job_id: JobId, phase: JobPhase, message: impl Into<String>) -> Self {
        Self {
            job_id,
            phase,
            completed: INDETERMINATE,
            total: INDETERMINATE,
            message: message.into(),
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.completed == INDETERMINATE && self.total == INDETERMINATE
    }

    /// Доля выполненного в процентах, если она известна
    pub fn percent(&self) -> Option<f32> {
        if self.is_indeterminate() || self.total <= 0 {
            return None;
        }
        Some((self.completed as f32 / self.total as f32 * 100.0).clamp(0.0, 100.0))
    }
}

/// Наблюдатель, получающий события прогресса
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Наблюдатель за состоянием очереди
pub trait QueueObserver: Send + Sync {
    /// Текущее задание (если есть) и ожидающие задания в порядке очереди
    fn on_queue_changed(&self, current: Option<&JobSummary>, pending: &[JobSummary]);
}

/// Реестр наблюдателей.
///
/// Каждая подписка получает уникальный идентификатор, по которому ее можно
/// отменить. Уведомление рассылается по снимку списка, поэтому наблюдатель
/// может отписаться прямо из обработчика.
pub struct ObserverRegistry<T: ?Sized> {
    observers: RwLock<HashMap<usize, Arc<T>>>,
    next_id: AtomicUsize,
}

impl<T: ?Sized> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    /// Добавить наблюдателя, вернуть идентификатор подписки
    pub fn subscribe(&self, observer: Arc<T>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    /// Удалить наблюдателя; `false`, если такой подписки нет
    pub fn unsubscribe(&self, id: usize) -> bool {
        self.observers.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Наблюдатели в порядке подписки
    fn snapshot(&self) -> Vec<Arc<T>> {
        let observers = self.observers.read();
        let mut entries: Vec<(&usize, &Arc<T>)> = observers.iter().collect();
        entries.sort_by_key(|(id, _)| **id);
        entries.into_iter().map(|(_, o)| o.clone()).collect()
    }
}

impl<T: ?Sized> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Вызвать наблюдателя, не давая его панике выйти наружу
fn guarded(kind: &str, call: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(call)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("{} observer panicked: {}", kind, reason);
    }
}

impl ObserverRegistry<dyn ProgressObserver> {
    /// Разослать событие. Паника одного наблюдателя не мешает остальным.
    pub fn notify(&self, event: &ProgressEvent) {
        for observer in self.snapshot() {
            guarded("Progress", || observer.on_progress(event));
        }
    }
}

impl ObserverRegistry<dyn QueueObserver> {
    pub fn notify(&self, current: Option<&JobSummary>, pending: &[JobSummary]) {
        for observer in self.snapshot() {
            guarded("Queue", || observer.on_queue_changed(current, pending));
        }
    }
}
