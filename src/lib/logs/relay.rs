use std::sync::Arc;

use bollard::container::{LogOutput, LogsOptions};
use futures_util::{Stream, StreamExt, pin_mut};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::lib::logs::types::{LogRecord, LogSink, epoch_millis};
use crate::lib::tasks::docker::DockerManager;
use crate::lib::tasks::types::short_id;

impl LogSink {
    pub async fn connect(
        target: &str,
        service_name: &str,
        environment: &str,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        Ok(LogSink {
            socket,
            target: target.to_string(),
            service_name: service_name.to_string(),
            environment: environment.to_string(),
        })
    }

    /// Ship one line. Send failures drop the line; the transport is local
    /// and carries no acknowledgment.
    pub async fn forward(&self, level: &str, payload: &str) {
        let record = LogRecord {
            timestamp: epoch_millis(),
            level,
            payload,
            service_name: &self.service_name,
            environment: &self.environment,
        };

        let buf = match serde_json::to_vec(&record) {
            Ok(buf) => buf,
            Err(e) => {
                debug!(error = %e, "could not encode log record, dropping line");
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&buf, &self.target).await {
            debug!(error = %e, "log sink unreachable, dropping line");
        }
    }
}

/// Attach to both output streams of a container and pump them to the sink
/// until the streams close or the shutdown token fires. The pumps share
/// nothing but the token.
pub async fn relay_logs(
    docker: &DockerManager,
    container_id: &str,
    sink: Arc<LogSink>,
    shutdown: CancellationToken,
) {
    info!(container = short_id(container_id), "starting log relay");

    let stdout = docker.client().logs(
        container_id,
        Some(LogsOptions::<String> {
            follow: true,
            stdout: true,
            ..Default::default()
        }),
    );
    let stderr = docker.client().logs(
        container_id,
        Some(LogsOptions::<String> {
            follow: true,
            stderr: true,
            ..Default::default()
        }),
    );

    let out_pump = tokio::spawn(pump("stdout", stdout, sink.clone(), shutdown.clone()));
    let err_pump = tokio::spawn(pump("stderr", stderr, sink, shutdown));
    let _ = tokio::join!(out_pump, err_pump);
}

/// Pump one stream into the sink line by line. stdout maps to "info" and
/// stderr to "error", the only severity signal a raw byte stream offers.
/// Read errors end this pump only; the sibling keeps running.
pub async fn pump<S>(
    name: &'static str,
    stream: S,
    sink: Arc<LogSink>,
    shutdown: CancellationToken,
) where
    S: Stream<Item = Result<LogOutput, bollard::errors::Error>>,
{
    pin_mut!(stream);

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let item = tokio::select! {
            _ = shutdown.cancelled() => break,
            item = stream.next() => item,
        };

        let output = match item {
            Some(Ok(output)) => output,
            Some(Err(e)) => {
                error!(stream = name, error = %e, "error reading container log stream, exiting log pump");
                break;
            }
            None => break,
        };

        let bytes = output.into_bytes();
        let text = String::from_utf8_lossy(&bytes);
        let line = text.trim_end_matches('\n');

        match name {
            "stdout" => sink.forward("info", line).await,
            "stderr" => sink.forward("error", line).await,
            _ => {
                error!(stream = name, "unknown stream type, exiting log pump");
                return;
            }
        }
    }

    warn!(stream = name, "log pump exited");
}
