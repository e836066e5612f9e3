//! Очередь фоновых заданий: постановка, отмена и выполнение

pub mod job;
pub mod manager;
pub mod runner;

pub use job::{ConversionJob, GenerationJob, Job, JobId, JobKind, JobSummary};
pub use manager::JobManager;
pub use runner::{JobReport, Services, READY_DIR};
