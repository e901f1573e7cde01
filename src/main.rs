use std::error::Error;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::lib::executor::api::ExecutorServer;
use crate::lib::executor::types::{Executor, ExecutorConfig};
use crate::lib::health::types::RegistryClient;
use crate::lib::logs::types::LogSink;
use crate::lib::status::types::StatusReporter;
use crate::lib::tasks::docker::DockerManager;

mod lib {
    pub mod executor {
        pub mod api;
        pub mod executor;
        pub mod types;
    }
    pub mod health {
        pub mod registry;
        pub mod types;
        pub mod watcher;
    }
    pub mod logs {
        pub mod relay;
        pub mod types;
    }
    pub mod status {
        pub mod reporter;
        pub mod types;
    }
    pub mod tasks {
        pub mod docker;
        pub mod state;
        pub mod types;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("outrider=debug".parse()?))
        .init();

    info!("starting outrider");

    let config = ExecutorConfig::from_env();

    // Without a Docker client we can't do anything.
    let docker = DockerManager::new()?;

    let registry = RegistryClient::new(
        &config.registry_url,
        &config.task_host,
        config.registry_attempts,
        config.registry_retry_delay,
        config.http_timeout,
    )?;
    let reporter = StatusReporter::new(&config.status_url, config.http_timeout)?;
    let sink = Arc::new(
        LogSink::connect(&config.log_sink_addr, &config.service_name, &config.environment)
            .await?,
    );

    let listen_addr = config.listen_addr.clone();
    let executor = Arc::new(Executor::new(docker, registry, reporter, sink, config));

    let server = ExecutorServer::new(executor, &listen_addr);
    server.start_server().await?;

    info!("outrider exiting");
    Ok(())
}
