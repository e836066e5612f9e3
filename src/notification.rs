//! Модуль для реализации системы уведомлений
//!
//! Этот модуль предоставляет готовые наблюдатели для очереди заданий:
//! вывод в консоль и в лог, история в памяти, функция обратного вызова
//! и пересылка событий в канал Tokio.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::progress::{ProgressEvent, ProgressObserver, QueueObserver};
use crate::queue::job::JobSummary;

fn describe(event: &ProgressEvent) -> String {
    if event.is_indeterminate() {
        format!("[{}] {}: {}", event.job_id, event.phase.as_str(), event.message)
    } else {
        format!(
            "[{}] {} {}/{}: {}",
            event.job_id,
            event.phase.as_str(),
            event.completed,
            event.total,
            event.message
        )
    }
}

/// Наблюдатель, выводящий информацию о прогрессе в консоль
pub struct ConsoleProgressObserver {
    /// Префикс для вывода (опционально)
    prefix: Option<String>,
}

impl ConsoleProgressObserver {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl Default for ConsoleProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgressObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        let prefix = self.prefix.as_deref().unwrap_or("");
        match event.percent() {
            Some(percent) => println!("{}{} ({:.0}%)", prefix, describe(event), percent),
            None => println!("{}{}", prefix, describe(event)),
        }
    }
}

/// Наблюдатель, пишущий события очереди и прогресса в лог
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        log::info!("{}", describe(event));
    }
}

impl QueueObserver for LogObserver {
    fn on_queue_changed(&self, current: Option<&JobSummary>, pending: &[JobSummary]) {
        match current {
            Some(job) => log::info!("Running {} ({} pending)", job, pending.len()),
            None => log::info!("Queue idle ({} pending)", pending.len()),
        }
    }
}

/// Наблюдатель, сохраняющий события прогресса в памяти
#[derive(Clone, Default)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl MemoryProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить историю событий
    pub fn history(&self) -> Vec<ProgressEvent> {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        self.history.lock().push(event.clone());
    }
}

/// Снимок очереди на момент уведомления
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSnapshot {
    pub current: Option<JobSummary>,
    pub pending: Vec<JobSummary>,
}

/// Наблюдатель, сохраняющий снимки очереди в памяти
#[derive(Clone, Default)]
pub struct MemoryQueueObserver {
    snapshots: Arc<Mutex<Vec<QueueSnapshot>>>,
}

impl MemoryQueueObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<QueueSnapshot> {
        self.snapshots.lock().clone()
    }
}

impl QueueObserver for MemoryQueueObserver {
    fn on_queue_changed(&self, current: Option<&JobSummary>, pending: &[JobSummary]) {
        self.snapshots.lock().push(QueueSnapshot {
            current: current.cloned(),
            pending: pending.to_vec(),
        });
    }
}

/// Наблюдатель, вызывающий функцию обратного вызова
pub struct CallbackProgressObserver<F>
where
    F: Fn(&ProgressEvent) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackProgressObserver<F>
where
    F: Fn(&ProgressEvent) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressObserver for CallbackProgressObserver<F>
where
    F: Fn(&ProgressEvent) + Send + Sync + 'static,
{
    fn on_progress(&self, event: &ProgressEvent) {
        (self.callback)(event);
    }
}

/// Наблюдатель, пересылающий события в канал.
///
/// Уведомления приходят из рабочего цикла очереди, поэтому отправка не
/// блокируется: при переполненном канале событие отбрасывается.
pub struct ChannelProgressObserver {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressObserver {
    pub fn new(sender: mpsc::Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelProgressObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        if let Err(e) = self.sender.try_send(event.clone()) {
            log::warn!("Dropping progress event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::JobPhase;
    use crate::queue::job::{JobId, JobKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(completed: usize) -> ProgressEvent {
        ProgressEvent::new(JobId(1), JobPhase::Generating, completed, 3, "line")
    }

    #[test]
    fn test_console_and_log_observers_do_not_panic() {
        ConsoleProgressObserver::with_prefix("[Test] ").on_progress(&event(1));
        ConsoleProgressObserver::new().on_progress(&ProgressEvent::indeterminate(
            JobId(1),
            JobPhase::Converting,
            "converting",
        ));
        LogObserver.on_progress(&event(2));
        LogObserver.on_queue_changed(None, &[]);
    }

    #[test]
    fn test_memory_observer() {
        let observer = MemoryProgressObserver::new();
        let shared = observer.clone();
        shared.on_progress(&event(1));
        shared.on_progress(&event(2));

        let history = observer.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].completed, 2);

        observer.clear_history();
        assert!(shared.history().is_empty());
    }

    #[test]
    fn test_memory_queue_observer() {
        let observer = MemoryQueueObserver::new();
        let job = JobSummary {
            id: JobId(3),
            label: "Rozdział 1".to_string(),
            kind: JobKind::Conversion,
        };
        observer.on_queue_changed(Some(&job), &[]);
        observer.on_queue_changed(None, &[job.clone()]);

        let snapshots = observer.snapshots();
        assert_eq!(snapshots[0].current.as_ref(), Some(&job));
        assert_eq!(snapshots[1].pending, vec![job]);
    }

    #[test]
    fn test_callback_observer() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let observer = CallbackProgressObserver::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        observer.on_progress(&event(1));
        observer.on_progress(&event(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let observer = ChannelProgressObserver::new(tx);
        observer.on_progress(&event(1));
        observer.on_progress(&event(2));

        assert_eq!(rx.recv().await.unwrap().completed, 1);
        assert_eq!(rx.recv().await.unwrap().completed, 2);
    }
}
