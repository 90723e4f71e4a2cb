//! Log processing for kubelogs
//!
//! This crate resolves log targets to concrete container sources, picks
//! representative pods, and merges many container log streams into one sink.

mod ordering;
mod parser;
mod request;
mod resolver;
mod sink;
mod stream;
mod waiter;

#[cfg(test)]
mod testing;

pub use ordering::{PodOrdering, sort_pods};
pub use parser::RecordParser;
pub use request::{LogsRequest, stream_logs};
pub use resolver::{LogSource, LogTargetResolver, Target};
pub use sink::{LogLine, LogSink, RecordSink, WriterSink};
pub use stream::{AggregateOptions, StreamAggregator};
pub use waiter::{PodMatch, PodWaiter};

// Re-export types used in our public API
pub use kubelogs_k8s::{Error, LogOptions, Result};
pub use kubelogs_types::{ContainerRef, DefaultContainers, LogLevel, PodSnapshot, Record};
