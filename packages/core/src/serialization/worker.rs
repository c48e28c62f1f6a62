//! Background serialization worker
//!
//! The worker is a spawned task that talks to the pipeline over two bounded
//! channels and shares no state with it. The pipeline hands over a one-time
//! snapshot in the N-Triples transfer form; the worker parses and validates it
//! chunk by chunk, writes the Turtle document and sends it back.
//!
//! ```text
//! pipeline                         worker
//!    |  <-------- Ready ------------  |
//!    |  -------- WorkerRequest -----> |
//!    |  <-------- Progress* --------  |
//!    |  <-- Completed | Failed -----  |
//! ```
//!
//! Terminating the worker aborts its task; a job in flight is simply dropped.
//! The same job function runs inline on the cooperative path.

use crate::db::{SerializationProgress, SerializationStatus};
use crate::graph::Namespaces;
use crate::serialization::parser::{split_chunks, StatementParser};
use crate::serialization::turtle::TurtleWriter;
use crate::serialization::PipelineError;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One serialization job
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    /// N-Triples text of the snapshot
    pub transfer: String,
    /// Number of assertions the transfer holds
    pub quad_count: usize,
    /// Byte size of each chunk fed to the parser
    pub max_chunk_size: usize,
    /// Statements written between yields
    pub write_chunk_size: usize,
    pub namespaces: Namespaces,
}

/// Messages sent from the worker to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// The worker is running and accepting requests
    Ready,
    /// Best-effort progress; dropped when the channel is full
    Progress(SerializationProgress),
    Completed(JobOutput),
    Failed { error: String },
}

/// Result of a finished job
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub text: String,
    pub statement_count: usize,
    pub parsing_time_ms: u64,
    pub serializing_time_ms: u64,
}

/// Pipeline-side handle to a worker task
///
/// Dropping the handle aborts the task.
pub struct WorkerHandle {
    requests: mpsc::Sender<WorkerRequest>,
    messages: mpsc::Receiver<WorkerMessage>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn the standard worker task
    pub fn spawn(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (message_tx, message_rx) = mpsc::channel(capacity);
        let task = tokio::spawn(run_worker(request_rx, message_tx));
        Self::from_parts(request_tx, message_rx, task)
    }

    /// Wrap a worker implemented elsewhere
    ///
    /// The task must send `Ready` before anything else and then answer each
    /// request with `Completed` or `Failed`.
    pub fn from_parts(
        requests: mpsc::Sender<WorkerRequest>,
        messages: mpsc::Receiver<WorkerMessage>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            requests,
            messages,
            task,
        }
    }

    /// Wait for the startup handshake
    pub async fn wait_ready(&mut self) -> Result<(), PipelineError> {
        match self.messages.recv().await {
            Some(WorkerMessage::Ready) => Ok(()),
            Some(other) => Err(PipelineError::worker(format!(
                "expected ready handshake, got {:?}",
                other
            ))),
            None => Err(PipelineError::worker("worker exited during startup")),
        }
    }

    pub async fn submit(&self, request: WorkerRequest) -> Result<(), PipelineError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| PipelineError::worker("worker is no longer accepting requests"))
    }

    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.messages.recv().await
    }

    /// Forcibly stop the worker
    pub fn terminate(&self) {
        self.task.abort();
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_worker(mut requests: mpsc::Receiver<WorkerRequest>, messages: mpsc::Sender<WorkerMessage>) {
    if messages.send(WorkerMessage::Ready).await.is_err() {
        return;
    }

    while let Some(request) = requests.recv().await {
        let progress_tx = messages.clone();
        let result = run_serialize_job(&request, |progress| {
            // Progress is advisory; never block the job on a slow reader
            let _ = progress_tx.try_send(WorkerMessage::Progress(progress));
        })
        .await;

        let message = match result {
            Ok(output) => WorkerMessage::Completed(output),
            Err(error) => WorkerMessage::Failed { error },
        };
        if messages.send(message).await.is_err() {
            break;
        }
    }
    tracing::debug!("Serialization worker stopped");
}

/// Parse the transfer text in byte-bounded chunks, then write Turtle
///
/// Yields to the scheduler after every chunk of either phase. Progress covers
/// 0-50% while parsing and 50-100% while writing.
pub async fn run_serialize_job<P>(request: &WorkerRequest, mut report: P) -> Result<JobOutput, String>
where
    P: FnMut(SerializationProgress),
{
    let quad_count = request.quad_count;
    let parse_started = Instant::now();

    let chunks = split_chunks(&request.transfer, request.max_chunk_size);
    let total_chunks = chunks.len();
    let mut parser = StatementParser::new();
    for (n, chunk) in chunks.into_iter().enumerate() {
        parser.feed(chunk);
        let current = n + 1;
        report(
            SerializationProgress::new(
                SerializationStatus::Parsing,
                format!("Parsing chunk {}/{}", current, total_chunks),
                (current * 50 / total_chunks) as u8,
                quad_count,
            )
            .with_chunks(current, total_chunks),
        );
        tokio::task::yield_now().await;
    }
    let parsed = parser.finish();
    let parsing_time_ms = parse_started.elapsed().as_millis() as u64;

    // The transfer is written from a valid snapshot, so anything short of
    // every statement coming back means the output would be incomplete
    if !parsed.errors.is_empty() || parsed.assertions.len() != quad_count {
        let first = parsed
            .errors
            .first()
            .map(|e| format!("; first: {}", e))
            .unwrap_or_default();
        return Err(format!(
            "transfer of {} assertions parsed to {} ({} rejected){}",
            quad_count,
            parsed.assertions.len(),
            parsed.errors.len(),
            first
        ));
    }

    let serialize_started = Instant::now();
    let mut assertions = parsed.assertions;
    assertions.sort();
    assertions.dedup();

    let write_chunk_size = request.write_chunk_size.max(1);
    let total_batches = assertions.len().div_ceil(write_chunk_size).max(1);
    let mut writer =
        TurtleWriter::with_capacity(&request.namespaces, assertions.len()).map_err(|e| e.to_string())?;
    for (n, batch) in assertions.chunks(write_chunk_size).enumerate() {
        for assertion in batch {
            writer.write(assertion).map_err(|e| e.to_string())?;
        }
        let current = n + 1;
        report(
            SerializationProgress::new(
                SerializationStatus::Serializing,
                format!("Writing batch {}/{}", current, total_batches),
                (50 + current * 50 / total_batches) as u8,
                quad_count,
            )
            .with_chunks(current, total_batches),
        );
        tokio::task::yield_now().await;
    }

    Ok(JobOutput {
        text: writer.finish().map_err(|e| e.to_string())?,
        statement_count: assertions.len(),
        parsing_time_ms,
        serializing_time_ms: serialize_started.elapsed().as_millis() as u64,
    })
}
