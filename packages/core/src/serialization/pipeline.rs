//! Serialization Pipeline
//!
//! Converts a snapshot of the graph mirror to text and text back to
//! assertions without blocking the caller for long.
//!
//! # State machine
//!
//! `Idle → Running → {Succeeded, Failed, TimedOut} → Idle`
//!
//! Only one job runs at a time. A `serialize` call that finds a job running
//! returns that job's status instead of starting another. The running flag is
//! owned by a guard, so every exit path (success, error, timeout, or the
//! caller dropping the future) puts the pipeline back to `Idle`.
//!
//! # Execution
//!
//! - **Background**: a worker task is started and must complete its
//!   handshake before the job slot is taken, so a worker that fails to start
//!   never puts the pipeline into `Running`. The snapshot then goes to it as
//!   N-Triples and the exchange is raced against a size-scaled timeout; on
//!   expiry the worker is aborted and `PipelineError::TimedOut` is returned.
//! - **Cooperative**: the same job runs on the caller's task, yielding between
//!   chunks. It has no timeout and runs to completion or failure.

use crate::config::{SerializationConfig, WorkerMode};
use crate::db::{ModelEvent, SerializationPerformance, SerializationProgress, SerializationStatus};
use crate::graph::Namespaces;
use crate::models::Assertion;
use crate::serialization::parser::{split_chunks, StatementParser};
use crate::serialization::turtle::write_ntriples;
use crate::serialization::worker::{run_serialize_job, JobOutput, WorkerHandle, WorkerMessage, WorkerRequest};
use crate::serialization::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::broadcast;

/// Creates a worker for one background job, given the channel capacity
pub type WorkerSpawner = Arc<dyn Fn(usize) -> WorkerHandle + Send + Sync>;

/// Snapshot of the single-flight job slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub in_progress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub quad_count: usize,
}

/// Text produced by a finished serialization
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedGraph {
    pub text: String,
    pub performance: SerializationPerformance,
}

/// Result of a `serialize` call
#[derive(Debug, Clone, PartialEq)]
pub enum SerializeOutcome {
    Completed(SerializedGraph),
    /// Another job was already running; nothing was started
    InProgress(JobStatus),
}

/// Clears the job slot when dropped
struct JobGuard {
    job: Arc<Mutex<JobStatus>>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let mut job = self.job.lock().unwrap_or_else(PoisonError::into_inner);
        *job = JobStatus::default();
    }
}

/// Chunked, optionally worker-offloaded serializer
#[derive(Clone)]
pub struct SerializationPipeline {
    config: SerializationConfig,
    namespaces: Namespaces,
    job: Arc<Mutex<JobStatus>>,
    event_tx: Option<broadcast::Sender<ModelEvent>>,
    spawner: WorkerSpawner,
}

impl SerializationPipeline {
    pub fn new(config: SerializationConfig, namespaces: Namespaces) -> Self {
        Self {
            config,
            namespaces,
            job: Arc::new(Mutex::new(JobStatus::default())),
            event_tx: None,
            spawner: Arc::new(WorkerHandle::spawn),
        }
    }

    /// Publish progress and completion events on `event_tx`
    pub fn with_events(mut self, event_tx: broadcast::Sender<ModelEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Replace how background workers are created
    pub fn with_worker_spawner(mut self, spawner: WorkerSpawner) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn config(&self) -> &SerializationConfig {
        &self.config
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Current state of the job slot
    pub fn status(&self) -> JobStatus {
        self.job.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Serialize a snapshot of assertions to Turtle
    pub async fn serialize(&self, snapshot: Vec<Assertion>) -> Result<SerializeOutcome, PipelineError> {
        let quad_count = snapshot.len();
        if let Some(running) = self.running_job() {
            return Ok(self.already_running(running));
        }

        // A worker that cannot start is reported before the job slot is taken
        let worker = match self.resolve_mode() {
            WorkerMode::Cooperative => None,
            _ => Some(self.start_worker(quad_count).await?),
        };
        let _guard = match self.try_begin(quad_count) {
            Ok(guard) => guard,
            Err(running) => return Ok(self.already_running(running)),
        };

        let started = Instant::now();
        self.emit(ModelEvent::Serializing(SerializationProgress::new(
            SerializationStatus::Started,
            format!("Serializing {} assertions", quad_count),
            0,
            quad_count,
        )));

        let output = match self.run_job(snapshot, worker).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Serialization of {} assertions failed: {}", quad_count, e);
                return Err(e);
            }
        };

        let performance = SerializationPerformance::new(
            quad_count,
            started.elapsed().as_millis() as u64,
            output.parsing_time_ms,
            output.serializing_time_ms,
        );
        tracing::info!(
            "Serialized {} assertions in {}ms ({:.0} assertions/s)",
            quad_count,
            performance.time_ms,
            performance.quads_per_second
        );
        self.emit(ModelEvent::Serializing(SerializationProgress::new(
            SerializationStatus::Completed,
            "Serialization complete",
            100,
            quad_count,
        )));
        self.emit(ModelEvent::Serialized {
            performance: performance.clone(),
        });

        Ok(SerializeOutcome::Completed(SerializedGraph {
            text: output.text,
            performance,
        }))
    }

    /// Parse text into assertions in byte-bounded chunks
    ///
    /// Statements that fail to parse are logged and skipped. Only when the
    /// input had content, yielded no assertions at all and reported errors is
    /// the whole parse treated as failed.
    pub async fn deserialize(&self, text: &str) -> Result<Vec<Assertion>, PipelineError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let chunks = split_chunks(text, self.config.max_chunk_size);
        let total_chunks = chunks.len();
        let mut parser = StatementParser::new();
        for (n, chunk) in chunks.into_iter().enumerate() {
            parser.feed(chunk);
            let current = n + 1;
            tracing::debug!("Parsed chunk {}/{}", current, total_chunks);
            self.emit(ModelEvent::Serializing(
                SerializationProgress::new(
                    SerializationStatus::Parsing,
                    format!("Parsing chunk {}/{}", current, total_chunks),
                    (current * 100 / total_chunks) as u8,
                    parser.assertion_count(),
                )
                .with_chunks(current, total_chunks),
            ));
            tokio::task::yield_now().await;
        }

        let output = parser.finish();
        if !output.errors.is_empty() {
            tracing::warn!(
                "{} statement(s) could not be parsed and were skipped",
                output.errors.len()
            );
        }
        if output.assertions.is_empty() {
            if let Some(first) = output.errors.first() {
                return Err(PipelineError::Parse {
                    errors: output.errors.len(),
                    message: first.to_string(),
                });
            }
        }
        Ok(output.assertions)
    }

    async fn run_job(
        &self,
        mut snapshot: Vec<Assertion>,
        worker: Option<WorkerHandle>,
    ) -> Result<JobOutput, PipelineError> {
        snapshot.sort();
        let request = WorkerRequest {
            transfer: write_ntriples(&snapshot)?,
            quad_count: snapshot.len(),
            max_chunk_size: self.config.max_chunk_size,
            write_chunk_size: self.config.cooperative_chunk_size,
            namespaces: self.namespaces.clone(),
        };
        drop(snapshot);
        match worker {
            Some(worker) => self.run_in_worker(worker, request).await,
            None => self.run_cooperatively(&request).await,
        }
    }

    fn running_job(&self) -> Option<JobStatus> {
        let job = self.job.lock().unwrap_or_else(PoisonError::into_inner);
        job.in_progress.then(|| job.clone())
    }

    fn already_running(&self, running: JobStatus) -> SerializeOutcome {
        tracing::debug!(
            "Serialization already running ({} assertions), not starting another",
            running.quad_count
        );
        SerializeOutcome::InProgress(running)
    }

    /// Spawn a worker and wait for its handshake, bounded by the job budget
    async fn start_worker(&self, quad_count: usize) -> Result<WorkerHandle, PipelineError> {
        let budget = self.config.timeout_for(quad_count);
        let mut worker = (self.spawner)(self.config.channel_capacity);
        match tokio::time::timeout(budget, worker.wait_ready()).await {
            Ok(Ok(())) => Ok(worker),
            Ok(Err(e)) => {
                tracing::warn!("Serialization worker failed to start: {}", e);
                Err(e)
            }
            Err(_) => {
                worker.terminate();
                Err(PipelineError::worker(format!(
                    "worker not ready after {}ms",
                    budget.as_millis()
                )))
            }
        }
    }

    fn try_begin(&self, quad_count: usize) -> Result<JobGuard, JobStatus> {
        let mut job = self.job.lock().unwrap_or_else(PoisonError::into_inner);
        if job.in_progress {
            return Err(job.clone());
        }
        *job = JobStatus {
            in_progress: true,
            started_at: Some(Utc::now()),
            quad_count,
        };
        Ok(JobGuard {
            job: Arc::clone(&self.job),
        })
    }

    fn resolve_mode(&self) -> WorkerMode {
        match self.config.worker_mode {
            WorkerMode::Auto => match tokio::runtime::Handle::try_current().map(|h| h.runtime_flavor()) {
                Ok(RuntimeFlavor::MultiThread) => WorkerMode::Background,
                _ => WorkerMode::Cooperative,
            },
            mode => mode,
        }
    }

    async fn run_cooperatively(&self, request: &WorkerRequest) -> Result<JobOutput, PipelineError> {
        run_serialize_job(request, |progress| {
            self.emit(ModelEvent::Serializing(progress));
        })
        .await
        .map_err(PipelineError::Serialization)
    }

    async fn run_in_worker(
        &self,
        mut worker: WorkerHandle,
        request: WorkerRequest,
    ) -> Result<JobOutput, PipelineError> {
        let quad_count = request.quad_count;
        let budget = self.config.timeout_for(quad_count);

        let exchange = async {
            worker.submit(request).await?;
            loop {
                match worker.recv().await {
                    Some(WorkerMessage::Progress(progress)) => {
                        tracing::debug!("Worker progress {}%: {}", progress.progress, progress.message);
                        self.emit(ModelEvent::Serializing(progress));
                    }
                    Some(WorkerMessage::Completed(output)) => return Ok(output),
                    Some(WorkerMessage::Failed { error }) => {
                        return Err(PipelineError::Serialization(error))
                    }
                    Some(WorkerMessage::Ready) => {}
                    None => return Err(PipelineError::worker("worker exited before finishing")),
                }
            }
        };

        let settled = tokio::select! {
            biased;

            _ = tokio::time::sleep(budget) => None,
            result = exchange => Some(result),
        };

        match settled {
            Some(result) => result,
            None => {
                worker.terminate();
                tracing::warn!(
                    "Serialization exceeded its {}ms budget, worker terminated",
                    budget.as_millis()
                );
                Err(PipelineError::TimedOut {
                    after: budget,
                    quad_count,
                })
            }
        }
    }

    fn emit(&self, event: ModelEvent) {
        if let Some(tx) = &self.event_tx {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
