use std::future::Future;

use chrono::Utc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use kubelogs_k8s::Result;
use kubelogs_types::{ContainerRef, Record};

use crate::parser::RecordParser;

/// One complete line read from a source
#[derive(Clone, Copy, Debug)]
pub struct LogLine<'a> {
    pub source: &'a ContainerRef,
    /// Label to put in front of the line, when prefixing is on
    pub prefix: Option<&'a str>,
    /// Raw bytes including the trailing line feed
    pub bytes: &'a [u8],
}

/// Destination of aggregated log output.
///
/// The aggregator is the only caller and never calls into a sink from two
/// tasks at once, so each call delivers one whole line.
pub trait LogSink: Send {
    fn write_line(&mut self, line: LogLine<'_>) -> impl Future<Output = Result<()>> + Send;

    /// Deliver the diagnostic for a stream error that is being ignored
    fn write_error(&mut self, message: &str) -> impl Future<Output = Result<()>> + Send;

    fn flush(&mut self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Raw byte output into any async writer
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> LogSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_line(&mut self, line: LogLine<'_>) -> Result<()> {
        // Prefix and payload go out in a single write.
        let prefix = line.prefix.unwrap_or_default().as_bytes();
        let mut buf = Vec::with_capacity(prefix.len() + line.bytes.len());
        buf.extend_from_slice(prefix);
        buf.extend_from_slice(line.bytes);
        self.writer.write_all(&buf).await?;
        Ok(())
    }

    async fn write_error(&mut self, message: &str) -> Result<()> {
        self.writer
            .write_all(format!("error: {}\n", message).as_bytes())
            .await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Parses every line into a [`Record`] and hands it to a callback.
///
/// Lines without a valid timestamp are dropped.
pub struct RecordSink<F> {
    handler: F,
    dropped: u64,
}

impl<F> RecordSink<F>
where
    F: FnMut(Record) -> Result<()> + Send,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            dropped: 0,
        }
    }

    /// Number of lines discarded because they carried no timestamp
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl<F> LogSink for RecordSink<F>
where
    F: FnMut(Record) -> Result<()> + Send,
{
    async fn write_line(&mut self, line: LogLine<'_>) -> Result<()> {
        let record = RecordParser::parse(line.bytes);
        if !record.has_timestamp() {
            self.dropped += 1;
            return Ok(());
        }
        (self.handler)(record)
    }

    /// The error reaches the handler as an `ERROR` record stamped now
    async fn write_error(&mut self, message: &str) -> Result<()> {
        tracing::debug!("delivering ignored stream error: {}", message);
        (self.handler)(Record {
            timestamp: Some(Utc::now()),
            level: Some("ERROR".to_string()),
            source: None,
            message: format!("error: {}", message),
        })
    }
}
