//! Routing of demultiplexed container output to the caller's sinks.

use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use container_runtime::{EngineError, LogStream, StreamSource};

/// Why routing stopped before the stream ended.
#[derive(Debug, thiserror::Error)]
pub enum RouteFailure {
    /// The engine's output stream broke or carried a system error.
    #[error(transparent)]
    Stream(#[from] EngineError),
    /// A sink refused a write.
    #[error("write to {sink} failed: {source}")]
    Sink {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Byte counts forwarded to each sink.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoutedBytes {
    pub stdout: u64,
    pub stderr: u64,
}

/// Forward every frame of `frames` to the matching sink as it arrives.
///
/// Stdin frames (a TTY-less engine may echo them) go to `stdout`. Each frame
/// is flushed before the next is read. Returns when the stream ends.
pub async fn route_frames<O, E>(
    mut frames: LogStream,
    stdout: &mut O,
    stderr: &mut E,
) -> Result<RoutedBytes, RouteFailure>
where
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut routed = RoutedBytes::default();

    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let len = frame.payload.len() as u64;

        match frame.source {
            StreamSource::Stdout | StreamSource::Stdin => {
                write_frame(stdout, &frame.payload, "stdout").await?;
                routed.stdout += len;
            }
            StreamSource::Stderr => {
                write_frame(stderr, &frame.payload, "stderr").await?;
                routed.stderr += len;
            }
            // The decoder turns system frames into stream errors.
            StreamSource::System => {}
        }
        trace!(source = ?frame.source, len, "forwarded frame");
    }

    Ok(routed)
}

async fn write_frame<W>(sink: &mut W, payload: &[u8], name: &'static str) -> Result<(), RouteFailure>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let io = async {
        sink.write_all(payload).await?;
        sink.flush().await
    };
    io.await
        .map_err(|source| RouteFailure::Sink { sink: name, source })
}
