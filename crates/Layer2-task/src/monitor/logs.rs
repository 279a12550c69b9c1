//! Log aggregation for one container

use crate::engine::frame::{self, Frame, HEADER_LEN};
use crate::engine::LogStream;
use crate::supervisor::SupervisedTask;
use fleet_foundation::{Error, LineSink, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Forwards one container's log lines, tagged with its host port
pub struct LogAggregator {
    host_port: u16,
    stream: LogStream,
    sink: Arc<dyn LineSink>,
}

impl LogAggregator {
    pub fn new(host_port: u16, stream: LogStream, sink: Arc<dyn LineSink>) -> Self {
        Self {
            host_port,
            stream,
            sink,
        }
    }

    /// Wrap as a supervised task; the interrupt closes the stream
    pub fn into_task(self) -> SupervisedTask {
        let name = format!("logs@{}", self.host_port);
        SupervisedTask::cancellable(name, move |token| self.run(token))
    }

    /// Read until end-of-data or cancellation
    ///
    /// The stream handle is dropped when this returns.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Log stream for port {} interrupted", self.host_port);
                    return Ok(());
                }
                next = frame::read_frame(&mut self.stream) => next,
            };

            match next {
                Ok(Some(Frame::Data { payload, .. })) => {
                    let text = String::from_utf8_lossy(&payload);
                    for line in text.lines() {
                        forward(self.host_port, &self.sink, line).await?;
                    }
                }
                Ok(Some(Frame::Truncated(bytes))) => {
                    warn!(
                        "Log line from port {} is shorter than the {}-byte frame header",
                        self.host_port, HEADER_LEN
                    );
                    let raw = String::from_utf8_lossy(&bytes);
                    forward(self.host_port, &self.sink, &raw).await?;
                }
                Ok(None) => {
                    debug!("Log stream for port {} ended", self.host_port);
                    return Ok(());
                }
                Err(e) => {
                    return Err(Error::Stream(format!(
                        "Log stream for port {} failed: {}",
                        self.host_port, e
                    )));
                }
            }
        }
    }
}

async fn forward(host_port: u16, sink: &Arc<dyn LineSink>, payload: &str) -> Result<()> {
    let text = format!("@ port {}: {}", host_port, payload);
    info!("{}", text);
    sink.write_line(&text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::frame::{encode_lines, StreamKind};
    use fleet_foundation::MemorySink;
    use futures::stream;
    use std::io::Cursor;
    use tokio_util::io::StreamReader;

    fn stream_of(bytes: Vec<u8>) -> LogStream {
        Box::pin(Cursor::new(bytes))
    }

    #[tokio::test]
    async fn test_lines_are_tagged_with_port() {
        let mut bytes = encode_lines(StreamKind::Stdout, b"GET /request1\nGET /request2\n");
        bytes.extend(encode_lines(StreamKind::Stderr, b"warn: slow\n"));

        let sink = Arc::new(MemorySink::new());
        LogAggregator::new(8771, stream_of(bytes), sink.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            sink.lines().await,
            vec![
                "@ port 8771: GET /request1",
                "@ port 8771: GET /request2",
                "@ port 8771: warn: slow",
            ]
        );
    }

    #[tokio::test]
    async fn test_short_line_forwarded_raw() {
        let sink = Arc::new(MemorySink::new());
        LogAggregator::new(8770, stream_of(b"oops".to_vec()), sink.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sink.lines().await, vec!["@ port 8770: oops"]);
    }

    #[tokio::test]
    async fn test_interrupt_ends_pending_stream() {
        let pending = stream::pending::<std::io::Result<Cursor<Vec<u8>>>>();
        let stream: LogStream = Box::pin(StreamReader::new(pending));
        let sink = Arc::new(MemorySink::new());

        let token = CancellationToken::new();
        let handle = tokio::spawn(LogAggregator::new(8770, stream, sink).run(token.clone()));
        token.cancel();

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_truncated_payload_is_stream_error() {
        let mut bytes = frame::header(StreamKind::Stdout, 64).to_vec();
        bytes.extend_from_slice(b"cut off");

        let sink = Arc::new(MemorySink::new());
        let err = LogAggregator::new(8770, stream_of(bytes), sink)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stream(_)));
    }
}
