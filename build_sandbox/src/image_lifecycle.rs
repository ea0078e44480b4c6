//! Presence, freshness and pulling of the build image.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::Deserialize;
use tracing::{debug, info, warn};

use container_runtime::{ContainerRuntime, EngineError, ImageReference, PullStream};

use crate::error::{Result, SandboxError};

/// Local state of the build image relative to upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// Not present locally.
    Missing,
    /// Present, but upstream publishes a different image for the same tag.
    Stale,
    /// Present and identical to upstream.
    Current,
}

/// One parsed status line of an image pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullProgressEvent {
    pub status: String,
    pub layer_id: String,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

impl PullProgressEvent {
    /// Completion of this layer in percent, always within `0..=100`.
    ///
    /// A layer that reports no total size counts as complete.
    pub fn percentage(&self) -> u8 {
        if self.bytes_total == 0 {
            return 100;
        }
        let pct = u128::from(self.bytes_done) * 100 / u128::from(self.bytes_total);
        pct.min(100) as u8
    }
}

// Wire form of a pull status document. Every field is optional on the
// wire, so a document only fails to parse when it is not JSON at all.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PullStatusDocument {
    status: String,
    id: String,
    #[serde(rename = "progressDetail")]
    progress_detail: ProgressDetail,
    error: Option<String>,
    #[serde(rename = "errorDetail")]
    error_detail: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProgressDetail {
    current: u64,
    total: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorDetail {
    message: String,
}

/// What one raw line of the pull stream amounts to.
#[derive(Debug, PartialEq, Eq)]
enum PullLine {
    Progress(PullProgressEvent),
    /// The engine reported a failure in-band.
    Failed(String),
    /// Not a status document; ignored.
    Unparseable,
}

fn parse_pull_line(line: &[u8]) -> PullLine {
    let doc: PullStatusDocument = match serde_json::from_slice(line) {
        Ok(doc) => doc,
        Err(_) => return PullLine::Unparseable,
    };

    if let Some(message) = doc.error {
        let detail = doc.error_detail.map(|d| d.message).unwrap_or_default();
        return PullLine::Failed(if message.is_empty() { detail } else { message });
    }

    PullLine::Progress(PullProgressEvent {
        status: doc.status,
        layer_id: doc.id,
        bytes_done: doc.progress_detail.current,
        bytes_total: doc.progress_detail.total,
    })
}

/// Lazy sequence of [`PullProgressEvent`]s for one pull.
///
/// Lines that are not status documents, including ones that are not even
/// UTF-8, are skipped. The sequence ends when the engine closes the stream,
/// or with a single error after any progress already produced when the pull
/// itself fails. It cannot be restarted.
pub struct PullProgress {
    reference: String,
    lines: PullStream,
    done: bool,
    skipped: usize,
}

impl PullProgress {
    fn new(reference: &ImageReference, lines: PullStream) -> Self {
        Self {
            reference: reference.to_string(),
            lines,
            done: false,
            skipped: 0,
        }
    }

    /// Number of lines ignored so far because they did not parse.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }
}

impl Stream for PullProgress {
    type Item = Result<PullProgressEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }

            let line = match self.lines.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    self.done = true;
                    debug!(image = %self.reference, skipped = self.skipped, "pull stream closed");
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(Some(Ok(line))) => line,
            };

            match parse_pull_line(&line) {
                PullLine::Progress(event) => return Poll::Ready(Some(Ok(event))),
                PullLine::Failed(reason) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(EngineError::PullFailed {
                        reference: self.reference.clone(),
                        reason,
                    }
                    .into())));
                }
                PullLine::Unparseable => {
                    self.skipped += 1;
                    continue;
                }
            }
        }
    }
}

/// Decides whether the build image needs fetching and fetches it.
#[derive(Clone)]
pub struct ImageLifecycleManager {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ImageLifecycleManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Exact `repository:tag` match against local images. No network access.
    pub async fn has_image(&self, image: &ImageReference) -> Result<bool> {
        let local = self.runtime.list_local_images().await?;
        let present = local.contains(image);
        debug!(image = %image, present, "checked local images");
        Ok(present)
    }

    /// Compare the cached image's identity with the one published upstream.
    ///
    /// An image that is not cached, or carries no repo digest, needs an
    /// update. Failing to reach the registry is an error, never "current".
    pub async fn needs_update(&self, image: &ImageReference) -> Result<bool> {
        let local = match self.runtime.local_digests(image).await {
            Ok(digests) => digests,
            Err(EngineError::ImageNotFound(_)) => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        let upstream = self
            .runtime
            .registry_digest(image)
            .await
            .map_err(|source| match source {
                EngineError::Unavailable { .. } => SandboxError::Engine(source),
                source => SandboxError::UpdateCheck {
                    reference: image.to_string(),
                    source,
                },
            })?;

        let current = local
            .iter()
            .filter_map(|d| d.rsplit_once('@').map(|(_, digest)| digest))
            .any(|digest| digest == upstream);

        if !current {
            info!(image = %image, upstream = %upstream, "newer build image available");
        }
        Ok(!current)
    }

    /// [`has_image`](Self::has_image) and [`needs_update`](Self::needs_update) combined.
    pub async fn status(&self, image: &ImageReference) -> Result<ImageStatus> {
        if !self.has_image(image).await? {
            return Ok(ImageStatus::Missing);
        }
        if self.needs_update(image).await? {
            Ok(ImageStatus::Stale)
        } else {
            Ok(ImageStatus::Current)
        }
    }

    /// Start pulling `image` and return its progress events.
    pub async fn pull(&self, image: &ImageReference) -> Result<PullProgress> {
        let lines = self.runtime.pull_image(image).await.map_err(|e| {
            warn!(image = %image, error = %e, "pull rejected");
            e
        })?;
        Ok(PullProgress::new(image, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(done: u64, total: u64) -> PullProgressEvent {
        PullProgressEvent {
            status: "Downloading".to_string(),
            layer_id: "abc".to_string(),
            bytes_done: done,
            bytes_total: total,
        }
    }

    #[test]
    fn test_percentage() {
        assert_eq!(event(0, 100).percentage(), 0);
        assert_eq!(event(50, 200).percentage(), 25);
        assert_eq!(event(200, 200).percentage(), 100);
    }

    #[test]
    fn test_percentage_zero_total_is_complete() {
        assert_eq!(event(0, 0).percentage(), 100);
        assert_eq!(event(42, 0).percentage(), 100);
    }

    #[test]
    fn test_percentage_is_clamped() {
        assert_eq!(event(300, 200).percentage(), 100);
        assert_eq!(event(u64::MAX, u64::MAX).percentage(), 100);
        assert_eq!(event(u64::MAX / 2, u64::MAX).percentage(), 49);
    }

    #[test]
    fn test_parse_progress_line() {
        let line = r#"{"status":"Downloading","progressDetail":{"current":512,"total":1024},"progress":"[=====>   ]","id":"a3ed95caeb02"}"#;
        match parse_pull_line(line.as_bytes()) {
            PullLine::Progress(ev) => {
                assert_eq!(ev.layer_id, "a3ed95caeb02");
                assert_eq!(ev.percentage(), 50);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_line_without_detail() {
        match parse_pull_line(br#"{"status":"Pulling from deployctl/build","id":"latest"}"#) {
            PullLine::Progress(ev) => {
                assert_eq!(ev.bytes_total, 0);
                assert_eq!(ev.percentage(), 100);
            }
            other => panic!("unexpected: {:?}", other),
        }
        // The engine sends an empty object when there is no byte count.
        assert!(matches!(
            parse_pull_line(br#"{"status":"Pull complete","progressDetail":{},"id":"x"}"#),
            PullLine::Progress(_)
        ));
    }

    #[test]
    fn test_parse_garbage_is_unparseable() {
        assert_eq!(parse_pull_line(b"{\"status\": \"Downl"), PullLine::Unparseable);
        assert_eq!(parse_pull_line(b""), PullLine::Unparseable);
        assert_eq!(parse_pull_line(b"not json"), PullLine::Unparseable);
        assert_eq!(
            parse_pull_line(b"\xff\xfe garbled \xc3\x28"),
            PullLine::Unparseable
        );
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        assert!(matches!(
            parse_pull_line(b"  {\"status\":\"Waiting\",\"id\":\"l2\"}\r"),
            PullLine::Progress(_)
        ));
    }

    #[test]
    fn test_parse_error_document() {
        let line = r#"{"errorDetail":{"message":"manifest unknown"},"error":"manifest unknown"}"#;
        assert_eq!(
            parse_pull_line(line.as_bytes()),
            PullLine::Failed("manifest unknown".to_string())
        );
    }
}
