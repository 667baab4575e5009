//! exstream - Streaming Example Parser
//!
//! A bounded-ring producer/consumer for streams of training examples.
//! A single worker thread pulls `(feature vector, length[, label])` records
//! from an [`ExampleSource`] into a fixed-size ring of slots; the consumer
//! takes them out one at a time, in source order, and releases each slot
//! when done. Parsing and I/O latency is thereby decoupled from the
//! consumer's compute.
//!
//! # Key properties
//!
//! - Single-producer single-consumer slot state machine
//!   (`Empty -> Writing -> Ready -> Reading`)
//! - FIFO delivery, bounded residency, no loss before end of stream
//! - Slot storage optionally reused across examples (zero reallocation in
//!   steady state)
//! - Clean termination on source EOF and forced termination via abort,
//!   from the consumer thread or any other
//!
//! # Example
//!
//! ```
//! use exstream::{ExampleParser, ParserConfig, VecSource};
//!
//! let source = VecSource::labelled(vec![
//!     (vec![1.0_f32, 2.0], 0.0),
//!     (vec![3.0], 1.0),
//! ]);
//! let mut parser = ExampleParser::new(source, ParserConfig::default());
//! parser.start().unwrap();
//!
//! while let Some(example) = parser.next() {
//!     println!("fv = {:?}, label = {}", example.fv(), example.label());
//!     example.finalize();
//! }
//! parser.end();
//! ```

mod config;
mod example;
mod metrics;
mod parser;
mod ring;
mod source;

pub use config::{ParserConfig, DEFAULT_RING_CAPACITY};
pub use example::{Example, ExampleKind};
pub use metrics::{Metrics, MetricsSnapshot};
pub use parser::{AbortHandle, ExampleHandle, ExampleParser, ParserError, ParserStatus};
pub use source::{ExampleSource, VecSource};
