use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::net::UdpSocket;

/// One relayed container line as it goes over the wire to the log sink.
#[derive(Debug, Serialize)]
pub struct LogRecord<'a> {
    #[serde(rename = "Timestamp")]
    pub timestamp: u64,
    #[serde(rename = "Level")]
    pub level: &'a str,
    #[serde(rename = "Payload")]
    pub payload: &'a str,
    #[serde(rename = "ServiceName")]
    pub service_name: &'a str,
    #[serde(rename = "Environment")]
    pub environment: &'a str,
}

/// Connectionless sink for relayed lines. UDP keeps the relay free of
/// backpressure; a line that cannot be sent is dropped.
#[derive(Debug)]
pub struct LogSink {
    pub socket: UdpSocket,
    pub target: String,
    pub service_name: String,
    pub environment: String,
}

pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
