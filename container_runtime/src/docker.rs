//! Docker Engine API client.
//!
//! This module talks to a local Docker (or API compatible) engine over its
//! unix socket through `bollard`. Output streams and pull progress are
//! handed to callers as raw engine data: tagged frames (see
//! [`crate::demux`]) and newline-delimited status lines.
//!
//! # Requirements
//!
//! - A running engine reachable at `DOCKER_HOST=unix://...` or
//!   `/var/run/docker.sock`
//! - Engine API v1.41 or newer
//!
//! # Timeouts
//!
//! Short calls (ping, create, start, image listing, inspection) are bounded
//! by [`DockerConfig::request_timeout`]. A pull, an attached output stream
//! and an exit wait are not bounded: they last as long as the work does.
//!
//! # Pull bodies
//!
//! `bollard` decodes the pull body itself and gives up on the first line
//! that is not JSON. Pulls therefore read the body directly and split it on
//! `\n` at the byte level, leaving every line to the caller.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, ContainerWaitResponse, HostConfig};
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptionsBuilder, ListImagesOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions, WaitContainerOptionsBuilder,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use http_body_util::{BodyDataStream, BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyperlocal::{UnixClientExt, UnixConnector, Uri as UnixUri};
use serde::Deserialize;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use crate::demux;
use crate::engine::{
    ContainerId, ContainerRuntime, ContainerWait, CreateContainerOptions, LogStream, PullStream,
};
use crate::error::{EngineError, Result};
use crate::image::ImageReference;

/// Socket used when neither configuration nor `DOCKER_HOST` names one.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

// Attach and wait outlive any build; the client still wants a bound.
const STREAMING_TIMEOUT_SECS: u64 = 60 * 60 * 24 * 365;

/// Configuration for [`DockerEngine`].
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Path of the engine's unix socket
    pub socket_path: PathBuf,
    /// Timeout for short engine calls (default: 30s)
    pub request_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DockerConfig {
    /// Resolve the socket from `DOCKER_HOST`, falling back to the default.
    pub fn from_env() -> Self {
        Self::from_docker_host(std::env::var("DOCKER_HOST").ok().as_deref())
    }

    /// Resolve the socket from a `DOCKER_HOST` style value.
    pub fn from_docker_host(docker_host: Option<&str>) -> Self {
        let mut config = Self::default();
        match docker_host.map(str::trim).filter(|h| !h.is_empty()) {
            Some(host) => match host.strip_prefix("unix://") {
                Some(path) if !path.is_empty() => config.socket_path = PathBuf::from(path),
                _ => warn!(
                    docker_host = %host,
                    "only unix:// engine endpoints are supported, using {}",
                    DEFAULT_SOCKET
                ),
            },
            None => {}
        }
        config
    }

    pub fn with_socket(mut self, socket_path: impl Into<PathBuf>) -> Self {
        self.socket_path = socket_path.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Human readable endpoint, as shown in errors.
    pub fn endpoint(&self) -> String {
        format!("unix://{}", self.socket_path.display())
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

/// Exit code of a wait result, or the engine's reason for failing it.
///
/// The client reports a nonzero exit as an error; only one that carries
/// a message is a real engine failure.
fn wait_outcome(
    item: std::result::Result<ContainerWaitResponse, BollardError>,
) -> std::result::Result<i64, String> {
    match item {
        Ok(response) => match response.error.and_then(|e| e.message) {
            Some(message) if !message.is_empty() => Err(message),
            _ => Ok(response.status_code),
        },
        Err(BollardError::DockerContainerWaitError { error, code }) if error.is_empty() => {
            Ok(code)
        }
        Err(BollardError::DockerContainerWaitError { error, .. }) => Err(error),
        Err(e) => Err(e.to_string()),
    }
}

/// Keep tags that name a real reference (`<none>:<none>` is dropped).
fn parse_repo_tags<I>(tags: I) -> HashSet<ImageReference>
where
    I: IntoIterator<Item = String>,
{
    tags.into_iter()
        .filter(|tag| tag != "<none>:<none>")
        .filter_map(|tag| ImageReference::parse(&tag).ok())
        .collect()
}

fn encode_query(pairs: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Split a pull body into lines without assuming they are text.
fn pull_lines(reference: String, body: Incoming) -> PullStream {
    let reader = StreamReader::new(
        BodyDataStream::new(body).map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
    );
    FramedRead::new(reader, AnyDelimiterCodec::new(b"\n".to_vec(), Vec::new()))
        .map(move |line| {
            line.map_err(|e| EngineError::PullFailed {
                reference: reference.clone(),
                reason: e.to_string(),
            })
        })
        .boxed()
}

// ==================== Client ====================

/// Connection handle to a Docker Engine.
///
/// Created once with [`DockerEngine::connect`] and shared by reference;
/// dropping it releases the pooled connections.
pub struct DockerEngine {
    config: DockerConfig,
    /// Short calls, bounded by the request timeout.
    docker: Docker,
    /// Attach and wait.
    streaming: Docker,
    /// Pull bodies, read line by line.
    raw: Client<UnixConnector, Full<Bytes>>,
}

impl fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerEngine")
            .field("endpoint", &self.config.endpoint())
            .finish()
    }
}

impl DockerEngine {
    /// Connect to the engine and verify it answers.
    pub async fn connect(config: DockerConfig) -> Result<Self> {
        let unavailable = |message: String| EngineError::Unavailable {
            endpoint: config.endpoint(),
            message,
        };

        if !config.socket_path.exists() {
            return Err(unavailable("socket not found".to_string()));
        }
        let socket = config
            .socket_path
            .to_str()
            .ok_or_else(|| unavailable("socket path is not valid UTF-8".to_string()))?;

        let timeout_secs = config.request_timeout.as_secs().max(1);
        let docker = Docker::connect_with_socket(socket, timeout_secs, API_DEFAULT_VERSION)
            .map_err(|e| unavailable(e.to_string()))?;
        let streaming =
            Docker::connect_with_socket(socket, STREAMING_TIMEOUT_SECS, API_DEFAULT_VERSION)
                .map_err(|e| unavailable(e.to_string()))?;

        let engine = Self {
            config,
            docker,
            streaming,
            raw: Client::unix(),
        };
        engine.ping().await?;

        info!(endpoint = %engine.config.endpoint(), "connected to container engine");
        Ok(engine)
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    /// GET /_ping
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| EngineError::Unavailable {
                endpoint: self.config.endpoint(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Map a client failure that no operation-specific rule claimed.
    fn engine_error(&self, operation: &'static str, error: BollardError) -> EngineError {
        match error {
            BollardError::RequestTimeoutError => EngineError::Timeout {
                operation,
                secs: self.config.request_timeout.as_secs(),
            },
            BollardError::DockerResponseServerError {
                status_code,
                message,
            } => EngineError::Api {
                operation,
                status: status_code,
                message,
            },
            e @ (BollardError::JsonSerdeError { .. } | BollardError::JsonDataError { .. }) => {
                EngineError::InvalidResponse {
                    operation,
                    reason: e.to_string(),
                }
            }
            e => EngineError::Unavailable {
                endpoint: self.config.endpoint(),
                message: e.to_string(),
            },
        }
    }

    /// POST /images/create, returning the response once the engine accepts.
    async fn request_pull(&self, image: &ImageReference) -> Result<Response<Incoming>> {
        let path = format!(
            "/v{}.{}/images/create?{}",
            API_DEFAULT_VERSION.major_version,
            API_DEFAULT_VERSION.minor_version,
            encode_query(&[("fromImage", image.repository()), ("tag", image.tag())])
        );
        debug!(path = %path, "engine request");

        let request = Request::builder()
            .method(Method::POST)
            .uri(hyper::Uri::from(UnixUri::new(&self.config.socket_path, &path)))
            .body(Full::new(Bytes::new()))
            .map_err(|e| EngineError::InvalidResponse {
                operation: "pull_image",
                reason: format!("could not build request: {}", e),
            })?;

        let response = self
            .raw
            .request(request)
            .await
            .map_err(|e| EngineError::Unavailable {
                endpoint: self.config.endpoint(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.into_body().collect().await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                serde_json::from_slice::<ApiMessage>(&bytes)
                    .map(|m| m.message)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string())
            }
            Err(e) => e.to_string(),
        };
        if status == StatusCode::NOT_FOUND {
            Err(EngineError::ImageNotFound(image.to_string()))
        } else {
            Err(EngineError::PullFailed {
                reference: image.to_string(),
                reason: message,
            })
        }
    }
}

fn is_not_found(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerEngine {
    async fn create_container(&self, options: &CreateContainerOptions) -> Result<ContainerId> {
        let image = options.image.to_string();
        let body = ContainerCreateBody {
            image: Some(image.clone()),
            cmd: Some(options.command.clone()),
            working_dir: Some(options.working_dir.to_string_lossy().into_owned()),
            user: Some(options.user.to_string()),
            tty: Some(false),
            open_stdin: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(HostConfig {
                binds: Some(options.mounts.iter().map(|m| m.to_bind_spec()).collect()),
                auto_remove: Some(options.auto_remove),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        };
        let query = options
            .name
            .as_deref()
            .map(|name| CreateContainerOptionsBuilder::new().name(name).build());

        let created = match self.docker.create_container(query, body).await {
            Ok(created) => created,
            Err(e) if is_not_found(&e) => return Err(EngineError::ImageNotFound(image)),
            Err(BollardError::DockerResponseServerError { message, .. }) => {
                return Err(EngineError::CreateFailed {
                    image,
                    reason: message,
                })
            }
            Err(e) => return Err(self.engine_error("create_container", e)),
        };

        for warning in &created.warnings {
            warn!(container = %created.id, "engine warning: {}", warning);
        }
        debug!(container = %created.id, image = %options.image, "container created");
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        match self
            .docker
            .start_container(id, None::<StartContainerOptions>)
            .await
        {
            Ok(()) => {}
            Err(BollardError::DockerResponseServerError { message, .. }) => {
                return Err(EngineError::StartFailed {
                    id: id.to_string(),
                    reason: message,
                })
            }
            Err(e) => return Err(self.engine_error("start_container", e)),
        }

        debug!(container = %id, "container started");
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::new().force(true).build();
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => {}
            // Already gone: auto-removal won the race.
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(self.engine_error("remove_container", e)),
        }

        debug!(container = %id, "container removed");
        Ok(())
    }

    async fn stream_logs(&self, id: &str) -> Result<LogStream> {
        let options = AttachContainerOptionsBuilder::new()
            .stream(true)
            .logs(true)
            .stdout(true)
            .stderr(true)
            .build();

        let attached = match self.streaming.attach_container(id, Some(options)).await {
            Ok(attached) => attached,
            Err(BollardError::DockerResponseServerError { message, .. }) => {
                return Err(EngineError::OutputStream {
                    id: id.to_string(),
                    reason: message,
                })
            }
            Err(e) => return Err(self.engine_error("attach_container", e)),
        };

        Ok(demux::frames(id, attached.output))
    }

    async fn await_completion(&self, id: &str) -> Result<ContainerWait> {
        let options = WaitContainerOptionsBuilder::new()
            .condition("next-exit")
            .build();
        let docker = self.streaming.clone();

        // The wait is registered when the task first polls it; the caller
        // starts the container only after this returns.
        let (exit_tx, error_tx, wait) = ContainerWait::channel();
        let container = id.to_string();
        tokio::spawn(async move {
            let outcome = {
                let mut results = Box::pin(docker.wait_container(&container, Some(options)));
                match results.next().await {
                    Some(item) => wait_outcome(item),
                    None => Err("wait ended without an exit status".to_string()),
                }
            };
            match outcome {
                Ok(code) => {
                    debug!(container = %container, code, "container exited");
                    let _ = exit_tx.send(code);
                }
                Err(reason) => {
                    let _ = error_tx.send(EngineError::WaitFailed {
                        id: container,
                        reason,
                    });
                }
            }
        });

        Ok(wait)
    }

    async fn list_local_images(&self) -> Result<HashSet<ImageReference>> {
        let summaries = self
            .docker
            .list_images(None::<ListImagesOptions>)
            .await
            .map_err(|e| self.engine_error("list_images", e))?;

        Ok(parse_repo_tags(
            summaries.into_iter().flat_map(|summary| summary.repo_tags),
        ))
    }

    async fn local_digests(&self, image: &ImageReference) -> Result<Vec<String>> {
        let inspect = match self.docker.inspect_image(&image.to_string()).await {
            Ok(inspect) => inspect,
            Err(e) if is_not_found(&e) => {
                return Err(EngineError::ImageNotFound(image.to_string()))
            }
            Err(e) => return Err(self.engine_error("inspect_image", e)),
        };

        Ok(inspect.repo_digests.unwrap_or_default())
    }

    async fn registry_digest(&self, image: &ImageReference) -> Result<String> {
        let inspect = match self
            .docker
            .inspect_registry_image(&image.to_string(), None)
            .await
        {
            Ok(inspect) => inspect,
            Err(BollardError::DockerResponseServerError { message, .. }) => {
                return Err(EngineError::RegistryLookup {
                    reference: image.to_string(),
                    reason: message,
                })
            }
            Err(e) => return Err(self.engine_error("distribution_inspect", e)),
        };

        inspect
            .descriptor
            .digest
            .ok_or_else(|| EngineError::InvalidResponse {
                operation: "distribution_inspect",
                reason: "descriptor carries no digest".to_string(),
            })
    }

    async fn pull_image(&self, image: &ImageReference) -> Result<PullStream> {
        let response = self.request_pull(image).await.map_err(|e| {
            debug!(image = %image, error = %e, "pull refused");
            e
        })?;

        info!(image = %image, "pulling image");
        Ok(pull_lines(image.to_string(), response.into_body()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::StreamSource;
    use crate::engine::{BindMount, ContainerUser};
    use bollard::models::ContainerWaitExitError;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    #[test]
    fn test_config_default() {
        let config = DockerConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/var/run/docker.sock"));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.endpoint(), "unix:///var/run/docker.sock");
    }

    #[test]
    fn test_config_from_docker_host() {
        let config = DockerConfig::from_docker_host(Some("unix:///run/user/1000/docker.sock"));
        assert_eq!(
            config.socket_path,
            PathBuf::from("/run/user/1000/docker.sock")
        );

        let fallback = DockerConfig::from_docker_host(Some("tcp://10.0.0.1:2375"));
        assert_eq!(fallback.socket_path, PathBuf::from(DEFAULT_SOCKET));

        let unset = DockerConfig::from_docker_host(None);
        assert_eq!(unset.socket_path, PathBuf::from(DEFAULT_SOCKET));
    }

    #[test]
    fn test_wait_outcome() {
        let exited = ContainerWaitResponse {
            status_code: 0,
            ..Default::default()
        };
        assert_eq!(wait_outcome(Ok(exited)), Ok(0));

        let nonzero = BollardError::DockerContainerWaitError {
            error: String::new(),
            code: 2,
        };
        assert_eq!(wait_outcome(Err(nonzero)), Ok(2));

        let engine_failure = BollardError::DockerContainerWaitError {
            error: "cgroup gone".to_string(),
            code: 137,
        };
        assert_eq!(
            wait_outcome(Err(engine_failure)),
            Err("cgroup gone".to_string())
        );

        let reported = ContainerWaitResponse {
            status_code: 0,
            error: Some(ContainerWaitExitError {
                message: Some("daemon shutting down".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(
            wait_outcome(Ok(reported)),
            Err("daemon shutting down".to_string())
        );
    }

    #[test]
    fn test_parse_repo_tags_skips_untagged() {
        let tags = parse_repo_tags(vec![
            "deployctl/build:latest".to_string(),
            "deployctl/build:1.2".to_string(),
            "<none>:<none>".to_string(),
        ]);
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(&ImageReference::new("deployctl/build", "latest")));
    }

    #[test]
    fn test_encode_query_escapes() {
        assert_eq!(
            encode_query(&[("fromImage", "registry:5000/team/build"), ("tag", "v1")]),
            "fromImage=registry%3A5000%2Fteam%2Fbuild&tag=v1"
        );
    }

    #[tokio::test]
    async fn test_connect_missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = DockerConfig::default().with_socket(dir.path().join("docker.sock"));
        let err = DockerEngine::connect(config).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_connect_to_non_socket_is_unavailable() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = DockerConfig::default().with_socket(file.path());
        let err = DockerEngine::connect(config).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {}", err);
    }

    /// Canned answer of the fake engine: sent after `delay`.
    struct Reply {
        delay: Duration,
        bytes: Vec<u8>,
    }

    impl Reply {
        fn now(bytes: Vec<u8>) -> Self {
            Self {
                delay: Duration::ZERO,
                bytes,
            }
        }
    }

    /// Serve one canned response per connection, chosen by request line.
    fn spawn_fake_engine<F>(listener: UnixListener, respond: F)
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let respond = Arc::new(respond);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let respond = respond.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let text = String::from_utf8_lossy(&request).to_string();
                    let header_end = text.find("\r\n\r\n").unwrap_or(text.len()) + 4;
                    let content_length = text
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    while request.len() < header_end + content_length {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let request_line = text.lines().next().unwrap_or_default().to_string();
                    let reply = respond(&request_line);
                    tokio::time::sleep(reply.delay).await;
                    let _ = stream.write_all(&reply.bytes).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
    }

    fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            content_type,
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn http_ok(body: &[u8]) -> Vec<u8> {
        http_response("200 OK", "application/json", body)
    }

    fn not_found() -> Vec<u8> {
        http_response("404 Not Found", "application/json", br#"{"message":"no such route"}"#)
    }

    /// Pull answer streamed without a length, ended by connection close.
    fn pull_body(body: &[u8]) -> Vec<u8> {
        let mut out =
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n"
                .to_vec();
        out.extend_from_slice(body);
        out
    }

    /// One multiplexed frame as the engine writes it on an attached stream.
    fn raw_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![tag, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    async fn connect_fake<F>(timeout: Duration, respond: F) -> (tempfile::TempDir, DockerEngine)
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("engine.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        spawn_fake_engine(listener, move |request_line| {
            if request_line.contains("/_ping") {
                Reply::now(http_response("200 OK", "text/plain", b"OK"))
            } else {
                respond(request_line)
            }
        });

        let config = DockerConfig::default()
            .with_socket(&socket)
            .with_request_timeout(timeout);
        let engine = DockerEngine::connect(config).await.unwrap();
        (dir, engine)
    }

    #[tokio::test]
    async fn test_attach_and_wait_against_fake_engine() {
        let (_dir, engine) = connect_fake(Duration::from_secs(5), |request_line| {
            if request_line.contains("/attach") {
                let mut out = b"HTTP/1.1 101 UPGRADED\r\nContent-Type: application/vnd.docker.raw-stream\r\nConnection: Upgrade\r\nUpgrade: tcp\r\n\r\n".to_vec();
                out.extend_from_slice(&raw_frame(1, b"hi\n"));
                out.extend_from_slice(&raw_frame(2, b"warn\n"));
                Reply::now(out)
            } else if request_line.contains("/wait") {
                Reply::now(http_ok(b"{\"StatusCode\":3,\"Error\":null}\n"))
            } else {
                Reply::now(not_found())
            }
        })
        .await;

        let frames: Vec<_> = engine
            .stream_logs("abc")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].source, StreamSource::Stdout);
        assert_eq!(&frames[0].payload[..], b"hi\n");
        assert_eq!(frames[1].source, StreamSource::Stderr);

        let wait = engine.await_completion("abc").await.unwrap();
        assert_eq!(wait.exited.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_create_rejection_maps_to_create_failed() {
        let (_dir, engine) = connect_fake(Duration::from_secs(5), |_| {
            Reply::now(http_response(
                "400 Bad Request",
                "application/json",
                br#"{"message":"invalid mount config"}"#,
            ))
        })
        .await;

        let options = CreateContainerOptions {
            image: ImageReference::new("deployctl/build", "latest"),
            command: vec!["true".to_string()],
            mounts: vec![BindMount::same_path("/tmp/x")],
            working_dir: PathBuf::from("/tmp/x"),
            user: ContainerUser { uid: 1000, gid: 1000 },
            auto_remove: true,
            name: None,
        };

        match engine.create_container(&options).await {
            Err(EngineError::CreateFailed { reason, .. }) => {
                assert_eq!(reason, "invalid mount config")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pull_keeps_lines_after_undecodable_one() {
        let (_dir, engine) = connect_fake(Duration::from_secs(5), |request_line| {
            if request_line.contains("/images/create") {
                let mut body = br#"{"status":"Downloading","id":"l1","progressDetail":{"current":1,"total":2}}"#.to_vec();
                body.extend_from_slice(b"\n\xff\xfe garbled \xc3\x28\n");
                body.extend_from_slice(br#"{"status":"Download complete","id":"l1"}"#);
                body.push(b'\n');
                Reply::now(pull_body(&body))
            } else {
                Reply::now(not_found())
            }
        })
        .await;

        let lines: Vec<Bytes> = engine
            .pull_image(&ImageReference::new("deployctl/build", "latest"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(&lines[1][..], b"\xff\xfe garbled \xc3\x28");
        assert!(lines[2].starts_with(br#"{"status":"Download complete""#));
    }

    #[tokio::test]
    async fn test_pull_is_not_bounded_by_request_timeout() {
        let (_dir, engine) = connect_fake(Duration::from_secs(1), |request_line| {
            if request_line.contains("/images/create") {
                Reply {
                    delay: Duration::from_millis(1500),
                    bytes: pull_body(b"{\"status\":\"Pulling fs layer\",\"id\":\"l1\"}\n"),
                }
            } else {
                Reply::now(not_found())
            }
        })
        .await;

        let lines: Vec<Bytes> = engine
            .pull_image(&ImageReference::new("deployctl/build", "latest"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[tokio::test]
    async fn test_pull_of_unknown_image_is_not_found() {
        let (_dir, engine) = connect_fake(Duration::from_secs(5), |_| Reply::now(not_found())).await;

        let err = engine
            .pull_image(&ImageReference::new("deployctl/missing", "latest"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::ImageNotFound(_)), "{}", err);
    }
}
