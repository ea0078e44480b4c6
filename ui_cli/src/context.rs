//! Wiring of configuration into the engine, sandbox and upgrader.

use std::path::PathBuf;
use std::sync::Arc;

use build_sandbox::{ImageLifecycleManager, SandboxedCommandRunner};
use container_runtime::{ContainerRuntime, DockerConfig, DockerEngine, ImageReference};
use self_upgrade::{ReleaseEndpoints, ReleaseSource, SelfUpgrader, DEV_VERSION};
use tracing::debug;
use user_config::CliConfig;

use crate::error::Result;

/// Version of this build, set by the release pipeline.
pub fn version() -> &'static str {
    option_env!("DEPLOYCTL_VERSION").unwrap_or(DEV_VERSION)
}

/// Loaded configuration plus the factories built from it.
pub struct AppContext {
    pub config: CliConfig,
    pub image: ImageReference,
}

impl AppContext {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = CliConfig::load_from(config_path.as_deref())?;
        Self::from_config(config)
    }

    pub fn from_config(config: CliConfig) -> Result<Self> {
        let image = ImageReference::parse(&config.build_image.reference())?;
        Ok(Self { config, image })
    }

    pub fn docker_config(&self) -> DockerConfig {
        let mut docker = DockerConfig::from_env()
            .with_request_timeout(self.config.engine.request_timeout());
        if let Some(socket) = &self.config.engine.socket {
            docker = docker.with_socket(socket);
        }
        docker
    }

    /// Acquire the engine connection shared by all components.
    pub async fn connect_engine(&self) -> Result<Arc<dyn ContainerRuntime>> {
        let docker = self.docker_config();
        debug!(endpoint = %docker.endpoint(), "connecting to engine");
        let engine = DockerEngine::connect(docker).await?;
        Ok(Arc::new(engine))
    }

    pub fn image_manager(&self, runtime: Arc<dyn ContainerRuntime>) -> ImageLifecycleManager {
        ImageLifecycleManager::new(runtime)
    }

    pub fn runner(&self, runtime: Arc<dyn ContainerRuntime>) -> SandboxedCommandRunner {
        SandboxedCommandRunner::new(runtime, self.image.clone())
    }

    pub fn upgrader(&self) -> Result<SelfUpgrader> {
        let release = &self.config.release;
        let endpoints = ReleaseEndpoints {
            latest_url: release.latest_url.clone(),
            download_url: release.download_url.clone(),
            timeout: release.timeout(),
        };
        let user_agent = format!("deployctl/{}", version());
        let source = ReleaseSource::new(endpoints, &user_agent)?;
        Ok(SelfUpgrader::new(version(), source, release.homebrew_formula.clone()))
    }
}
