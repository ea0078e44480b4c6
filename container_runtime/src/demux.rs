//! Tagged frames of a container's attached output.
//!
//! A container started without a TTY emits stdout and stderr over one
//! connection, each chunk carrying the stream it came from. The engine
//! client splits that connection into [`LogOutput`] items; this module
//! turns them into [`LogFrame`]s and ends the stream on engine errors.
//! Routing the frames to sinks is left to the caller.

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::engine::LogStream;
use crate::error::EngineError;

/// Origin of a frame's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdin,
    Stdout,
    Stderr,
    /// Text written by the engine itself, not by the process.
    System,
}

/// One demultiplexed chunk of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFrame {
    pub source: StreamSource,
    pub payload: Bytes,
}

impl From<LogOutput> for LogFrame {
    fn from(output: LogOutput) -> Self {
        let (source, payload) = match output {
            LogOutput::StdIn { message } => (StreamSource::Stdin, message),
            LogOutput::StdOut { message } => (StreamSource::Stdout, message),
            LogOutput::StdErr { message } => (StreamSource::Stderr, message),
            // Without a TTY the process never writes console frames.
            LogOutput::Console { message } => (StreamSource::System, message),
        };
        LogFrame { source, payload }
    }
}

/// Turn the attached output of container `id` into a [`LogStream`].
///
/// A `System` frame ends the stream with an error carrying the engine's
/// message; transport failures are reported the same way.
pub fn frames<S>(id: &str, output: S) -> LogStream
where
    S: Stream<Item = Result<LogOutput, BollardError>> + Send + 'static,
{
    let container = id.to_string();
    output
        .map(move |item| match item.map(LogFrame::from) {
            Ok(frame) if frame.source == StreamSource::System => Err(EngineError::OutputStream {
                id: container.clone(),
                reason: String::from_utf8_lossy(&frame.payload).trim().to_string(),
            }),
            Ok(frame) => Ok(frame),
            Err(e) => Err(EngineError::OutputStream {
                id: container.clone(),
                reason: e.to_string(),
            }),
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, TryStreamExt};

    fn out(data: &'static str) -> Result<LogOutput, BollardError> {
        Ok(LogOutput::StdOut {
            message: Bytes::from_static(data.as_bytes()),
        })
    }

    #[test]
    fn test_sources() {
        let frame = LogFrame::from(LogOutput::StdErr {
            message: Bytes::from_static(b"warning"),
        });
        assert_eq!(frame.source, StreamSource::Stderr);
        assert_eq!(&frame.payload[..], b"warning");

        let frame = LogFrame::from(LogOutput::StdIn {
            message: Bytes::new(),
        });
        assert_eq!(frame.source, StreamSource::Stdin);
    }

    #[tokio::test]
    async fn test_frames_pass_through_in_order() {
        let raw = stream::iter(vec![out("a"), out("b")]);
        let frames: Vec<LogFrame> = frames("c0", raw).try_collect().await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[1].payload[..], b"b");
    }

    #[tokio::test]
    async fn test_frames_surfaces_system_frame_as_error() {
        let raw = stream::iter(vec![
            out("building\n"),
            Ok(LogOutput::Console {
                message: Bytes::from_static(b"container killed\n"),
            }),
        ]);
        let mut stream = frames("c1", raw);

        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(&first.payload[..], b"building\n");

        let err = stream.try_next().await.unwrap_err();
        assert!(err.to_string().contains("container killed"));
    }

    #[tokio::test]
    async fn test_frames_reports_transport_failure() {
        let raw = stream::iter(vec![out("partial"), Err(BollardError::RequestTimeoutError)]);
        let result: Result<Vec<_>, _> = frames("c2", raw).try_collect().await;
        assert!(matches!(result, Err(EngineError::OutputStream { .. })));
    }
}
