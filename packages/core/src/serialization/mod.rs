//! Serialization Layer
//!
//! Text in and out of the graph mirror:
//!
//! - `turtle`: model/RDF term conversion and the Turtle and N-Triples writers
//! - `parser`: chunk-tolerant streaming statement parser
//! - `worker`: background worker task and its message protocol
//! - `pipeline`: single-flight job control, timeouts and progress events

mod error;
pub mod parser;
pub mod pipeline;
pub mod turtle;
pub mod worker;

pub use error::{ParseError, PipelineError};
pub use parser::{parse_document, split_chunks, ParseOutput, StatementParser};
pub use pipeline::{JobStatus, SerializationPipeline, SerializeOutcome, SerializedGraph, WorkerSpawner};
pub use turtle::{from_triple, to_triple, write_ntriples, write_turtle, TurtleWriter};
pub use worker::{WorkerHandle, WorkerMessage, WorkerRequest};
