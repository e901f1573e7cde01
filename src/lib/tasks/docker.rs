use bollard::{
    Docker,
    container::{
        CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
        StartContainerOptions, StopContainerOptions,
    },
    image::CreateImageOptions,
    secret::{ContainerSummary, HostConfig},
};
use futures_util::stream::StreamExt;
use tracing::{debug, info};

use crate::lib::tasks::types::{Task, short_id};

/// Thin wrapper over the local Docker daemon. The underlying client is
/// cheap to clone and reentrant, so every concurrent consumer holds its own
/// copy and takes its own snapshots.
#[derive(Debug, Clone)]
pub struct DockerManager {
    client: Docker,
}

impl DockerManager {
    pub fn new() -> Result<Self, bollard::errors::Error> {
        let client = Docker::connect_with_unix_defaults()?;
        Ok(DockerManager { client })
    }

    /// Pull the task's image to completion. Called before create only when
    /// the task asks for a forced pull.
    pub async fn pull_image(&self, image: &str) -> Result<(), bollard::errors::Error> {
        info!(image, "pulling image");

        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            let layer_info = msg?;
            if let Some(status) = layer_info.status {
                debug!(image, status, "pull progress");
            }
        }

        info!(image, "image pulled");
        Ok(())
    }

    /// Translate the task spec into a container create call. The returned id
    /// is the one handle for the task's whole lifetime.
    pub async fn create(&self, task: &Task) -> Result<String, bollard::errors::Error> {
        let host_config = HostConfig {
            memory: task.memory,
            nano_cpus: task.cpu.map(|cpu| (cpu * 1_000_000_000.0) as i64),
            publish_all_ports: Some(true),
            ..Default::default()
        };

        let container_config = bollard::container::Config {
            image: Some(task.image.clone()),
            cmd: if task.command.is_empty() {
                None
            } else {
                Some(task.command.clone())
            },
            env: Some(task.env.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: task.name.clone(),
            ..Default::default()
        });

        let resp = self
            .client
            .create_container(options, container_config)
            .await?;

        info!(task_id = %task.id, container = short_id(&resp.id), "container created");
        Ok(resp.id)
    }

    pub async fn start(&self, container_id: &str) -> Result<(), bollard::errors::Error> {
        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;

        info!(container = short_id(container_id), "container started");
        Ok(())
    }

    /// Graceful stop with a bounded timeout, after which the daemon kills
    /// the container.
    pub async fn stop(
        &self,
        container_id: &str,
        timeout_secs: i64,
    ) -> Result<(), bollard::errors::Error> {
        self.client
            .stop_container(container_id, Some(StopContainerOptions { t: timeout_secs }))
            .await?;

        info!(container = short_id(container_id), "container stopped");
        Ok(())
    }

    /// Fresh exit-code snapshot for the kill path. None means the runtime
    /// did not report one.
    pub async fn inspect_exit_code(
        &self,
        container_id: &str,
    ) -> Result<Option<i64>, bollard::errors::Error> {
        let resp = self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;

        Ok(resp.state.and_then(|state| state.exit_code))
    }

    /// All containers the runtime knows about, running or not.
    pub async fn list(&self) -> Result<Vec<ContainerSummary>, bollard::errors::Error> {
        self.client
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
    }

    pub fn client(&self) -> &Docker {
        &self.client
    }
}
