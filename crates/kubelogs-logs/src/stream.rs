use std::io;
use std::sync::Arc;

use futures::io::AsyncBufReadExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use kubelogs_k8s::{Error, LogStream, Result};

use crate::resolver::LogSource;
use crate::sink::{LogLine, LogSink};

const DEFAULT_MAX_CONCURRENCY: usize = 5;
const CHANNEL_CAPACITY: usize = 1024;

/// Options for a merge run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateOptions {
    pub follow: bool,
    /// Most streams that may be followed at once
    pub max_concurrency: usize,
    /// Label every line with `[pod/<pod>/<container>] `
    pub prefix: bool,
    /// Turn stream failures into inline `error:` lines
    pub ignore_errors: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            follow: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            prefix: false,
            ignore_errors: false,
        }
    }
}

/// Work item sent from a source task to the writer
enum Chunk {
    Line { index: usize, bytes: Vec<u8> },
    Error(String),
}

/// Merges the logs of many sources into one sink
pub struct StreamAggregator {
    options: AggregateOptions,
}

impl StreamAggregator {
    pub fn new(options: AggregateOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    /// Stream every source into `sink`.
    ///
    /// Sources are drained one after another unless following more than one
    /// of them, in which case each gets its own task. Only whole lines ever
    /// reach the sink.
    pub async fn run<S: LogSink>(
        &self,
        sources: &[LogSource],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if !self.options.follow || sources.len() <= 1 {
            self.run_sequential(sources, sink, cancel).await?;
        } else {
            self.run_parallel(sources, sink, cancel).await?;
        }
        sink.flush().await
    }

    async fn run_sequential<S: LogSink>(
        &self,
        sources: &[LogSource],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for source in sources {
            tracing::debug!(source = %source.reference(), "streaming logs");
            let prefix = self.prefix_for(source);
            let copied = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                copied = copy_source(source, prefix.as_deref(), sink) => copied,
            };

            if let Err(err) = copied {
                self.recover(err, sink).await?;
            }
        }
        Ok(())
    }

    async fn run_parallel<S: LogSink>(
        &self,
        sources: &[LogSource],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if sources.len() > self.options.max_concurrency {
            return Err(Error::TooManyFollowedStreams {
                requested: sources.len(),
                max: self.options.max_concurrency,
            });
        }

        let stop = cancel.child_token();
        let failure: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut tasks = JoinSet::new();

        for (index, source) in sources.iter().enumerate() {
            let source = source.clone();
            let tx = tx.clone();
            let stop = stop.clone();
            let failure = Arc::clone(&failure);
            let ignore_errors = self.options.ignore_errors;

            tasks.spawn(async move {
                let forwarded = tokio::select! {
                    biased;
                    _ = stop.cancelled() => Ok(()),
                    forwarded = forward_source(&source, index, &tx) => forwarded,
                };
                match forwarded {
                    Ok(()) => {}
                    Err(err) if ignore_errors && is_stream_error(&err) => {
                        // Fails only once the writer is gone.
                        let _ = tx.send(Chunk::Error(err.to_string())).await;
                    }
                    Err(err) => {
                        tracing::debug!(source = %source.reference(), "stream failed: {}", err);
                        failure.lock().get_or_insert(err);
                        stop.cancel();
                    }
                }
            });
        }
        drop(tx);

        let prefixes: Vec<Option<String>> = sources.iter().map(|s| self.prefix_for(s)).collect();
        let written: Result<()> = loop {
            let chunk = tokio::select! {
                biased;
                _ = stop.cancelled() => break Ok(()),
                chunk = rx.recv() => chunk,
            };
            let Some(chunk) = chunk else {
                break Ok(());
            };

            let write = async {
                match &chunk {
                    Chunk::Line { index, bytes } => {
                        sink.write_line(LogLine {
                            source: sources[*index].reference(),
                            prefix: prefixes[*index].as_deref(),
                            bytes,
                        })
                        .await
                    }
                    Chunk::Error(message) => sink.write_error(message).await,
                }
            };
            let result = tokio::select! {
                biased;
                _ = stop.cancelled() => break Ok(()),
                result = write => result,
            };
            if let Err(err) = result {
                break Err(err);
            }
        };

        stop.cancel();
        drop(rx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::warn!("log stream task failed: {}", err);
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        written?;
        match failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn prefix_for(&self, source: &LogSource) -> Option<String> {
        self.options.prefix.then(|| source.reference().prefix())
    }

    /// Downgrade a stream failure to an inline line when allowed
    async fn recover<S: LogSink>(&self, err: Error, sink: &mut S) -> Result<()> {
        if self.options.ignore_errors && is_stream_error(&err) {
            tracing::debug!("ignoring stream error: {}", err);
            sink.write_error(&err.to_string()).await
        } else {
            Err(err)
        }
    }
}

fn is_stream_error(err: &Error) -> bool {
    matches!(err, Error::Stream { .. })
}

/// Read the next complete line into `buf`.
///
/// Returns `false` at end of data; a trailing line without a line feed is
/// discarded.
async fn next_line(stream: &mut LogStream, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    let read = stream.read_until(b'\n', buf).await?;
    Ok(read > 0 && buf.last() == Some(&b'\n'))
}

async fn copy_source<S: LogSink>(
    source: &LogSource,
    prefix: Option<&str>,
    sink: &mut S,
) -> Result<()> {
    let mut stream = source.open().await?;
    let mut buf = Vec::new();
    while next_line(&mut stream, &mut buf)
        .await
        .map_err(|e| source.stream_error(e))?
    {
        sink.write_line(LogLine {
            source: source.reference(),
            prefix,
            bytes: &buf,
        })
        .await?;
    }
    Ok(())
}

async fn forward_source(source: &LogSource, index: usize, tx: &mpsc::Sender<Chunk>) -> Result<()> {
    let mut stream = source.open().await?;
    loop {
        let mut bytes = Vec::new();
        let complete = next_line(&mut stream, &mut bytes)
            .await
            .map_err(|e| source.stream_error(e))?;
        if !complete {
            return Ok(());
        }
        if tx.send(Chunk::Line { index, bytes }).await.is_err() {
            return Ok(());
        }
    }
}
