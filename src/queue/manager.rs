//! Менеджер очереди заданий
//!
//! Одна очередь FIFO и один рабочий цикл. Цикл запускается при постановке
//! задания в пустую очередь и завершается, когда очередь опустела. Каждое
//! задание получает собственный токен отмены, поэтому отмена одного задания
//! не может задеть следующее.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{DialogueError, Result};
use crate::progress::{
    JobPhase, ObserverRegistry, ProgressEvent, ProgressObserver, QueueObserver,
};
use crate::queue::job::{Job, JobId, JobSummary};
use crate::queue::runner::{run_job, JobContext, Services};

struct QueueState {
    pending: VecDeque<(JobSummary, Job)>,
    /// Выполняемое задание; никогда не входит в `pending`
    current: Option<(JobSummary, CancellationToken)>,
    worker_running: bool,
    next_id: u64,
}

impl QueueState {
    fn pending_summaries(&self) -> Vec<JobSummary> {
        self.pending.iter().map(|(summary, _)| summary.clone()).collect()
    }

    fn current_summary(&self) -> Option<JobSummary> {
        self.current.as_ref().map(|(summary, _)| summary.clone())
    }
}

struct Inner {
    state: Mutex<QueueState>,
    queue_observers: ObserverRegistry<dyn QueueObserver>,
    progress_observers: Arc<ObserverRegistry<dyn ProgressObserver>>,
    services: Arc<Services>,
    runtime: Handle,
    idle: watch::Sender<bool>,
}

/// Менеджер фоновых заданий.
///
/// Клонирование дешевое: все клоны работают с одной и той же очередью.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    /// Создать менеджер. Должен вызываться внутри рантайма Tokio.
    pub fn new(services: Services) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            DialogueError::Configuration(format!("JobManager requires a Tokio runtime: {}", e))
        })?;
        let (idle, _) = watch::channel(true);

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    current: None,
                    worker_running: false,
                    next_id: 1,
                }),
                queue_observers: ObserverRegistry::new(),
                progress_observers: Arc::new(ObserverRegistry::new()),
                services: Arc::new(services),
                runtime,
                idle,
            }),
        })
    }

    /// Поставить задание в конец очереди, запустив рабочий цикл при простое
    pub fn enqueue(&self, job: impl Into<Job>) -> JobId {
        let job = job.into();
        let (summary, current, pending, start_worker) = {
            let mut state = self.inner.state.lock();
            let id = JobId(state.next_id);
            state.next_id += 1;

            let summary = JobSummary::of(id, &job);
            state.pending.push_back((summary.clone(), job));

            let start_worker = !state.worker_running;
            if start_worker {
                state.worker_running = true;
                self.inner.idle.send_replace(false);
            }
            (
                summary,
                state.current_summary(),
                state.pending_summaries(),
                start_worker,
            )
        };

        log::info!("Enqueued {}", summary);
        self.inner
            .progress_observers
            .notify(&ProgressEvent::new(summary.id, JobPhase::Queued, 0, 0, "Queued"));
        self.inner.queue_observers.notify(current.as_ref(), &pending);

        if start_worker {
            let inner = self.inner.clone();
            self.inner.runtime.spawn(Inner::run_worker(inner));
        }
        summary.id
    }

    /// Убрать задание из очереди ожидания.
    ///
    /// Возвращает `false`, если такого задания среди ожидающих нет, в том
    /// числе если оно уже выполняется.
    pub fn remove_queued(&self, id: JobId) -> bool {
        let (removed, current, pending) = {
            let mut state = self.inner.state.lock();
            let removed = match state.pending.iter().position(|(s, _)| s.id == id) {
                Some(index) => state.pending.remove(index).map(|(summary, _)| summary),
                None => None,
            };
            (removed, state.current_summary(), state.pending_summaries())
        };

        match removed {
            Some(summary) => {
                log::info!("Removed {} from the queue", summary);
                self.inner.queue_observers.notify(current.as_ref(), &pending);
                true
            }
            None => false,
        }
    }

    /// Запросить отмену выполняемого задания.
    ///
    /// Отмена кооперативная: задание остановится на ближайшей границе реплики
    /// или файла. Возвращает `false`, если ничего не выполняется.
    pub fn request_cancel_current(&self) -> bool {
        let state = self.inner.state.lock();
        match &state.current {
            Some((summary, token)) => {
                log::info!("Cancellation requested for {}", summary);
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn current_job(&self) -> Option<JobSummary> {
        self.inner.state.lock().current_summary()
    }

    pub fn pending_jobs(&self) -> Vec<JobSummary> {
        self.inner.state.lock().pending_summaries()
    }

    pub fn is_idle(&self) -> bool {
        *self.inner.idle.borrow()
    }

    pub fn subscribe_queue(&self, observer: Arc<dyn QueueObserver>) -> usize {
        self.inner.queue_observers.subscribe(observer)
    }

    pub fn unsubscribe_queue(&self, id: usize) -> bool {
        self.inner.queue_observers.unsubscribe(id)
    }

    pub fn subscribe_progress(&self, observer: Arc<dyn ProgressObserver>) -> usize {
        self.inner.progress_observers.subscribe(observer)
    }

    pub fn unsubscribe_progress(&self, id: usize) -> bool {
        self.inner.progress_observers.unsubscribe(id)
    }

    /// Дождаться, пока очередь опустеет и рабочий цикл остановится
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        // Отправитель живет в `Inner`, поэтому канал не закроется раньше нас
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

impl Inner {
    async fn run_worker(self: Arc<Self>) {
        log::debug!("Queue worker started");
        loop {
            let next = {
                let mut state = self.state.lock();
                match state.pending.pop_front() {
                    Some((summary, job)) => {
                        let token = CancellationToken::new();
                        state.current = Some((summary.clone(), token.clone()));
                        Some((summary, job, token, state.pending_summaries()))
                    }
                    None => {
                        state.current = None;
                        state.worker_running = false;
                        self.idle.send_replace(true);
                        None
                    }
                }
            };

            let (summary, job, token, pending) = match next {
                Some(next) => next,
                None => break,
            };
            self.queue_observers.notify(Some(&summary), &pending);
            log::info!("Starting {}", summary);

            let ctx = JobContext {
                id: summary.id,
                cancel: token,
                progress: self.progress_observers.clone(),
                services: self.services.clone(),
            };
            let outcome = match tokio::spawn(run_job(ctx, job)).await {
                Ok(outcome) => outcome,
                Err(e) => Err(DialogueError::Other(format!("Job task panicked: {}", e))),
            };

            let event = match outcome {
                Ok(report) => {
                    log::info!("Finished {}: {}", summary, report.message());
                    ProgressEvent::new(summary.id, JobPhase::Completed, 1, 1, report.message())
                }
                Err(e) if e.is_cancelled() => {
                    log::info!("Cancelled {}", summary);
                    ProgressEvent::new(summary.id, JobPhase::Cancelled, 0, 0, "Cancelled")
                }
                Err(e) => {
                    log::error!("Failed {}: {}", summary, e);
                    ProgressEvent::new(summary.id, JobPhase::Failed, 0, 0, e.to_string())
                }
            };
            self.progress_observers.notify(&event);

            let pending = {
                let mut state = self.state.lock();
                state.current = None;
                state.pending_summaries()
            };
            self.queue_observers.notify(None, &pending);
        }
        log::debug!("Queue worker stopped");
    }
}
