//! Tests for SerializationPipeline
//!
//! Tests cover:
//! - Cooperative and background execution producing the same text
//! - Single-flight behavior while a job is running
//! - Timeout with forced worker termination
//! - Worker startup failure and a missing handshake
//! - Assertions that cannot be written failing the job
//! - Best-effort deserialization and the aggregate parse failure

#[cfg(test)]
mod tests {
    use crate::config::{SerializationConfig, WorkerMode};
    use crate::db::{ModelEvent, SerializationStatus};
    use crate::graph::namespaces::*;
    use crate::models::{Assertion, Term};
    use crate::serialization::worker::{WorkerHandle, WorkerMessage, WorkerRequest};
    use crate::serialization::{
        PipelineError, SerializationPipeline, SerializeOutcome, WorkerSpawner,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};

    fn config(mode: WorkerMode) -> SerializationConfig {
        SerializationConfig {
            worker_mode: mode,
            max_chunk_size: 128,
            cooperative_chunk_size: 3,
            ..Default::default()
        }
    }

    fn sample(count: usize) -> Vec<Assertion> {
        let ns = Namespaces::default();
        (0..count)
            .flat_map(|i| {
                let subject = ns.node_iri(&format!("n{:03}", i));
                [
                    Assertion::new(subject.clone(), RDF_TYPE, Term::iri(format!("{}Node", TS))),
                    Assertion::new(subject, DC_TITLE, Term::literal(format!("Item {}", i))),
                ]
            })
            .collect()
    }

    fn completed(outcome: SerializeOutcome) -> String {
        match outcome {
            SerializeOutcome::Completed(graph) => graph.text,
            SerializeOutcome::InProgress(status) => panic!("unexpected in-progress {:?}", status),
        }
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// A worker that handshakes, accepts the request and then never answers
    fn stalled_spawner(dropped: Arc<AtomicBool>) -> WorkerSpawner {
        Arc::new(move |capacity| {
            let (request_tx, mut request_rx) = mpsc::channel::<WorkerRequest>(capacity);
            let (message_tx, message_rx) = mpsc::channel(capacity);
            let flag = DropFlag(dropped.clone());
            let task = tokio::spawn(async move {
                let _flag = flag;
                let _ = message_tx.send(WorkerMessage::Ready).await;
                let _request = request_rx.recv().await;
                std::future::pending::<()>().await;
            });
            WorkerHandle::from_parts(request_tx, message_rx, task)
        })
    }

    #[tokio::test]
    async fn test_cooperative_and_background_agree() {
        let cooperative = SerializationPipeline::new(config(WorkerMode::Cooperative), Namespaces::default());
        let background = SerializationPipeline::new(config(WorkerMode::Background), Namespaces::default());

        let mut shuffled = sample(10);
        shuffled.reverse();

        let a = completed(cooperative.serialize(shuffled.clone()).await.unwrap());
        let b = completed(background.serialize(shuffled).await.unwrap());
        assert_eq!(a, b);
        assert_eq!(cooperative.deserialize(&a).await.unwrap().len(), 20);
        assert!(!cooperative.status().in_progress);
        assert!(!background.status().in_progress);
    }

    #[tokio::test]
    async fn test_auto_mode_stays_on_caller_in_current_thread_runtime() {
        let spawned = Arc::new(AtomicUsize::new(0));
        let counter = spawned.clone();
        let pipeline = SerializationPipeline::new(config(WorkerMode::Auto), Namespaces::default())
            .with_worker_spawner(Arc::new(move |capacity| {
                counter.fetch_add(1, Ordering::SeqCst);
                WorkerHandle::spawn(capacity)
            }));

        completed(pipeline.serialize(sample(2)).await.unwrap());
        assert_eq!(spawned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_events_report_progress_and_performance() {
        let (tx, mut rx) = broadcast::channel(256);
        let pipeline = SerializationPipeline::new(config(WorkerMode::Cooperative), Namespaces::default())
            .with_events(tx);

        completed(pipeline.serialize(sample(4)).await.unwrap());

        let mut statuses = Vec::new();
        let mut performance = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                ModelEvent::Serializing(progress) => statuses.push(progress.status),
                ModelEvent::Serialized { performance: p } => performance = Some(p),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(statuses.first(), Some(&SerializationStatus::Started));
        assert!(statuses.contains(&SerializationStatus::Parsing));
        assert!(statuses.contains(&SerializationStatus::Serializing));
        assert_eq!(statuses.last(), Some(&SerializationStatus::Completed));
        assert_eq!(performance.unwrap().quad_count, 8);
    }

    #[tokio::test]
    async fn test_second_serialize_while_running_reports_existing_job() {
        let dropped = Arc::new(AtomicBool::new(false));
        let pipeline = SerializationPipeline::new(config(WorkerMode::Background), Namespaces::default())
            .with_worker_spawner(stalled_spawner(dropped.clone()));

        let first = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.serialize(sample(3)).await })
        };
        while !pipeline.status().in_progress {
            tokio::task::yield_now().await;
        }

        match pipeline.serialize(sample(50)).await.unwrap() {
            SerializeOutcome::InProgress(status) => {
                assert!(status.in_progress);
                assert_eq!(status.quad_count, 6);
                assert!(status.started_at.is_some());
            }
            SerializeOutcome::Completed(_) => panic!("a second job must not start"),
        }

        first.abort();
        let _ = first.await;
        assert!(!pipeline.status().in_progress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_terminates_worker() {
        let dropped = Arc::new(AtomicBool::new(false));
        let config = SerializationConfig {
            base_timeout_ms: 50,
            per_quad_timeout_us: 0,
            max_timeout_ms: 50,
            ..config(WorkerMode::Background)
        };
        let pipeline = SerializationPipeline::new(config, Namespaces::default())
            .with_worker_spawner(stalled_spawner(dropped.clone()));

        let err = pipeline.serialize(sample(2)).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::TimedOut {
                after: Duration::from_millis(50),
                quad_count: 4
            }
        );
        assert!(!pipeline.status().in_progress);

        for _ in 0..10 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(dropped.load(Ordering::SeqCst), "worker task should be aborted");
    }

    #[tokio::test]
    async fn test_worker_startup_failure_never_enters_running() {
        let (tx, mut rx) = broadcast::channel(16);
        let pipeline = SerializationPipeline::new(config(WorkerMode::Background), Namespaces::default())
            .with_events(tx)
            .with_worker_spawner(Arc::new(|capacity| {
                let (request_tx, _) = mpsc::channel(capacity);
                let (message_tx, message_rx) = mpsc::channel::<WorkerMessage>(capacity);
                let task = tokio::spawn(async move { drop(message_tx) });
                WorkerHandle::from_parts(request_tx, message_rx, task)
            }));

        let err = pipeline.serialize(sample(1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Worker(_)));
        assert!(!pipeline.status().in_progress);
        assert!(rx.try_recv().is_err(), "no job should have started");
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_without_handshake_times_out_before_running() {
        let config = SerializationConfig {
            base_timeout_ms: 50,
            per_quad_timeout_us: 0,
            max_timeout_ms: 50,
            ..config(WorkerMode::Background)
        };
        let pipeline = SerializationPipeline::new(config, Namespaces::default()).with_worker_spawner(
            Arc::new(|capacity| {
                let (request_tx, _) = mpsc::channel(capacity);
                let (message_tx, message_rx) = mpsc::channel::<WorkerMessage>(capacity);
                let task = tokio::spawn(async move {
                    let _silent = message_tx;
                    std::future::pending::<()>().await;
                });
                WorkerHandle::from_parts(request_tx, message_rx, task)
            }),
        );

        let err = pipeline.serialize(sample(1)).await.unwrap_err();
        match err {
            PipelineError::Worker(message) => assert!(message.contains("not ready"), "{}", message),
            other => panic!("expected worker error, got {:?}", other),
        }
        assert!(!pipeline.status().in_progress);
    }

    #[tokio::test]
    async fn test_unwritable_assertion_fails_the_job() {
        for mode in [WorkerMode::Cooperative, WorkerMode::Background] {
            let pipeline = SerializationPipeline::new(config(mode), Namespaces::default());
            let mut snapshot = sample(2);
            snapshot.push(Assertion::new(
                "http://example.org/trestle/has space",
                DC_TITLE,
                Term::literal("lost"),
            ));

            let err = pipeline.serialize(snapshot).await.unwrap_err();
            assert!(
                matches!(&err, PipelineError::Serialization(m) if m.contains("has space")),
                "{:?}",
                err
            );
            assert!(!pipeline.status().in_progress);
        }
    }

    #[tokio::test]
    async fn test_deserialize_round_trip_in_small_chunks() {
        let pipeline = SerializationPipeline::new(config(WorkerMode::Cooperative), Namespaces::default());
        let text = completed(pipeline.serialize(sample(6)).await.unwrap());

        let mut parsed = pipeline.deserialize(&text).await.unwrap();
        parsed.sort();
        let mut expected = sample(6);
        expected.sort();
        assert_eq!(parsed, expected);
    }

    #[tokio::test]
    async fn test_deserialize_empty_and_header_only() {
        let pipeline = SerializationPipeline::new(config(WorkerMode::Cooperative), Namespaces::default());
        assert!(pipeline.deserialize("").await.unwrap().is_empty());
        assert!(pipeline.deserialize("  \n").await.unwrap().is_empty());

        let header = completed(pipeline.serialize(Vec::new()).await.unwrap());
        assert!(pipeline.deserialize(&header).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deserialize_skips_bad_statements() {
        let pipeline = SerializationPipeline::new(config(WorkerMode::Cooperative), Namespaces::default());
        let text = "<http://ex.org/a> <http://ex.org/p> \"ok\" .\n\
                    broken statement here .\n\
                    <http://ex.org/b> <http://ex.org/p> \"ok\" .\n";
        let parsed = pipeline.deserialize(text).await.unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn test_deserialize_all_bad_is_an_error() {
        let pipeline = SerializationPipeline::new(config(WorkerMode::Cooperative), Namespaces::default());
        let err = pipeline
            .deserialize("<not closed\nstill nothing .\n")
            .await
            .unwrap_err();
        match err {
            PipelineError::Parse { errors, message } => {
                assert!(errors >= 1);
                assert!(!message.is_empty());
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
