//! Docker-backed sandbox runtime
//!
//! Drives one container per execution through the engine API using bollard.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, KillContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures_util::stream::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, ImagePolicy, Language, SANDBOX_WORKDIR};
use crate::sandbox::{SandboxError, SandboxHandle, SandboxRuntime, SandboxSpec, StreamCollector, Streams};

/// Label attached to every sandbox, holding the execution id
pub const EXECUTION_LABEL: &str = "execbox.execution";

/// Sandbox runtime backed by a Docker engine
///
/// The underlying client is cheap to clone and safe to share between
/// concurrent executions.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    image_policy: ImagePolicy,
}

impl DockerRuntime {
    /// Connect to the engine named by the config
    pub fn connect(config: &Config) -> Result<Self, SandboxError> {
        let docker = match config.docker_socket {
            Some(ref socket) => Docker::connect_with_socket(
                &socket.to_string_lossy(),
                config.docker_timeout,
                API_DEFAULT_VERSION,
            ),
            None => Docker::connect_with_local_defaults()
                .map(|docker| docker.with_timeout(Duration::from_secs(config.docker_timeout))),
        }
        .map_err(|e| SandboxError::Connect(e.to_string()))?;

        Ok(Self {
            docker,
            image_policy: config.image_policy,
        })
    }

    /// Check that the engine answers
    pub async fn ping(&self) -> Result<(), SandboxError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::Connect(e.to_string()))
    }

    /// Pull every registry image, one after another
    #[instrument(skip(self))]
    pub async fn prefetch_images(&self) -> Result<(), SandboxError> {
        for language in Language::ALL {
            let image = language.profile().image;
            if self.image_present(image).await? {
                debug!(image, "image already present");
                continue;
            }
            self.pull_image(image).await?;
        }
        Ok(())
    }

    /// Pull an image, draining the progress stream
    #[instrument(skip(self))]
    pub async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        info!(image, "pulling image");
        let options = Some(CreateImageOptions {
            from_image: Some(image.to_owned()),
            ..Default::default()
        });

        let mut progress = self.docker.create_image(options, None, None);
        while let Some(step) = progress.next().await {
            step.map_err(|e| SandboxError::ImagePull {
                image: image.to_owned(),
                message: e.to_string(),
            })?;
        }

        debug!(image, "image pulled");
        Ok(())
    }

    async fn image_present(&self, image: &str) -> Result<bool, SandboxError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_status(&e, 404) => Ok(false),
            Err(e) => Err(SandboxError::ImagePull {
                image: image.to_owned(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        match self.image_policy {
            // Prefetched images are pulled at startup; a missing one fails at create.
            ImagePolicy::Prefetch | ImagePolicy::Never => Ok(()),
            ImagePolicy::IfMissing => {
                if !self.image_present(image).await? {
                    self.pull_image(image).await?;
                }
                Ok(())
            }
        }
    }

    #[instrument(skip(self, spec), fields(sandbox = %spec.name))]
    async fn create(&self, spec: &SandboxSpec) -> Result<SandboxHandle, SandboxError> {
        self.ensure_image(&spec.image).await?;

        let options = Some(CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(SANDBOX_WORKDIR.to_owned()),
            network_disabled: Some(spec.network_disabled),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(false),
            tty: Some(false),
            labels: Some(HashMap::from([(
                EXECUTION_LABEL.to_owned(),
                spec.execution_id.clone(),
            )])),
            host_config: Some(host_config(spec)),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(options, body)
            .await
            .map_err(|e| match e {
                e if is_status(&e, 404) => SandboxError::ImageMissing(spec.image.clone()),
                e => SandboxError::CreateFailed {
                    name: spec.name.clone(),
                    message: e.to_string(),
                },
            })?;

        for warning in &response.warnings {
            warn!(warning, "engine warning on sandbox creation");
        }
        debug!(id = %response.id, "sandbox created");

        Ok(SandboxHandle {
            name: spec.name.clone(),
            id: Some(response.id),
        })
    }

    #[instrument(skip(self), fields(sandbox = %handle.name))]
    async fn start(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        self.docker
            .start_container(&handle.name, None::<StartContainerOptions>)
            .await
            .map_err(|e| SandboxError::StartFailed {
                name: handle.name.clone(),
                message: e.to_string(),
            })?;
        debug!("sandbox started");
        Ok(())
    }

    async fn wait(&self, handle: &SandboxHandle) -> Result<i64, SandboxError> {
        let mut statuses = self
            .docker
            .wait_container(&handle.name, None::<WaitContainerOptions>);

        match statuses.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxError::WaitFailed {
                name: handle.name.clone(),
                message: e.to_string(),
            }),
            None => Err(SandboxError::WaitFailed {
                name: handle.name.clone(),
                message: "wait stream ended without an exit status".to_owned(),
            }),
        }
    }

    #[instrument(skip(self), fields(sandbox = %handle.name))]
    async fn kill(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        let options = Some(KillContainerOptions {
            signal: "SIGKILL".to_owned(),
        });

        match self.docker.kill_container(&handle.name, options).await {
            Ok(()) => Ok(()),
            // Already stopped between the deadline and the kill
            Err(e) if is_status(&e, 409) => {
                debug!("sandbox was no longer running");
                Ok(())
            }
            Err(e) => Err(SandboxError::KillFailed {
                name: handle.name.clone(),
                message: e.to_string(),
            }),
        }
    }

    #[instrument(skip(self), fields(sandbox = %handle.name))]
    async fn read_streams(&self, handle: &SandboxHandle) -> Result<Streams, SandboxError> {
        let mut logs = self.docker.logs(
            &handle.name,
            Some(LogsOptions {
                stdout: true,
                stderr: true,
                follow: false,
                ..Default::default()
            }),
        );

        let mut collector = StreamCollector::new();
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    collector.push_stdout(&message)
                }
                Ok(LogOutput::StdErr { message }) => collector.push_stderr(&message),
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    return Err(SandboxError::StreamsFailed {
                        name: handle.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let streams = collector.finish();
        if streams.truncated {
            warn!("sandbox output exceeded the capture limit and was truncated");
        }
        Ok(streams)
    }

    #[instrument(skip(self), fields(sandbox = %handle.name))]
    async fn remove(&self, handle: &SandboxHandle) -> Result<(), SandboxError> {
        let options = Some(RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        });

        match self.docker.remove_container(&handle.name, options).await {
            Ok(()) => Ok(()),
            // Never created, or already gone / being removed
            Err(e) if is_status(&e, 404) || is_status(&e, 409) => {
                debug!(error = %e, "sandbox already removed");
                Ok(())
            }
            Err(e) => Err(SandboxError::RemoveFailed {
                name: handle.name.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// Resource and isolation settings for the sandbox container
fn host_config(spec: &SandboxSpec) -> HostConfig {
    let limits = &spec.limits;
    HostConfig {
        binds: Some(vec![spec.mount.bind()]),
        memory: Some(limits.memory_bytes),
        // Equal to memory: no swap on top of the ceiling
        memory_swap: Some(limits.memory_bytes),
        cpu_period: Some(limits.cpu_period),
        cpu_quota: Some(limits.cpu_quota),
        pids_limit: Some(limits.pids),
        network_mode: Some("none".to_owned()),
        security_opt: Some(vec!["no-new-privileges:true".to_owned()]),
        auto_remove: Some(false),
        ..Default::default()
    }
}

fn is_status(error: &BollardError, status: u16) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == status
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::{MountConfig, SandboxLimits};

    fn spec() -> SandboxSpec {
        SandboxSpec {
            name: "execbox-exec_1".to_owned(),
            execution_id: "exec_1".to_owned(),
            image: "python:3.9-slim".to_owned(),
            command: vec!["python".to_owned(), "/code/main.py".to_owned()],
            mount: MountConfig {
                source: PathBuf::from("/tmp/execbox-exec_1-abc"),
                target: "/code".to_owned(),
                writable: true,
            },
            limits: SandboxLimits::default(),
            network_disabled: true,
        }
    }

    #[test]
    fn host_config_disables_network() {
        let config = host_config(&spec());
        assert_eq!(config.network_mode.as_deref(), Some("none"));
    }

    #[test]
    fn host_config_applies_limits() {
        let config = host_config(&spec());
        assert_eq!(config.memory, Some(256 * 1024 * 1024));
        assert_eq!(config.memory_swap, config.memory);
        assert_eq!(config.cpu_period, Some(100_000));
        assert_eq!(config.cpu_quota, Some(50_000));
        assert_eq!(config.pids_limit, Some(256));
        assert_eq!(config.auto_remove, Some(false));
    }

    #[test]
    fn host_config_binds_workspace() {
        let config = host_config(&spec());
        assert_eq!(
            config.binds,
            Some(vec!["/tmp/execbox-exec_1-abc:/code:rw".to_owned()])
        );
    }

    #[test]
    fn is_status_matches_server_errors() {
        let not_found = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "no such container".to_owned(),
        };
        assert!(is_status(&not_found, 404));
        assert!(!is_status(&not_found, 409));
    }

    #[tokio::test]
    #[cfg(feature = "integration-tests")]
    #[ignore = "requires docker"]
    async fn test_ping() {
        let runtime = DockerRuntime::connect(&Config::default()).unwrap();
        runtime.ping().await.unwrap();
    }

    #[tokio::test]
    #[cfg(feature = "integration-tests")]
    #[ignore = "requires docker"]
    async fn test_remove_missing_sandbox_is_ok() {
        let runtime = DockerRuntime::connect(&Config::default()).unwrap();
        let handle = SandboxHandle::named("execbox-never-created");
        runtime.remove(&handle).await.unwrap();
        runtime.remove(&handle).await.unwrap();
    }
}
