use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;

use crate::lib::status::types::{StatusReporter, StatusUpdate, wire_state};
use crate::lib::tasks::types::TaskState;

impl StatusReporter {
    pub fn new(url: &str, http_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(http_timeout).build()?;

        Ok(StatusReporter {
            client,
            url: url.to_string(),
        })
    }

    /// Send one state transition. Updates are delivered without
    /// acknowledgment, so a caller about to exit must still honor the grace
    /// delay after this returns. A delivery failure is fatal: there is no
    /// way to tell the orchestrator about a state it never learns.
    pub async fn report(&self, task_id: &str, state: &TaskState) {
        let update = StatusUpdate {
            update_id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            state: wire_state(state),
        };

        info!(task_id, state = ?state, "reporting task state");

        let result = self
            .client
            .post(&self.url)
            .json(&update)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        if let Err(e) = result {
            error!(task_id, error = %e, "error sending status update");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, routing::post};

    use super::*;

    #[tokio::test]
    async fn report_posts_the_wire_update() {
        let captured: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();
        let app = Router::new().route(
            "/updates",
            post(move |Json(update): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(update);
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let reporter = StatusReporter::new(
            &format!("http://{addr}/updates"),
            Duration::from_secs(2),
        )
        .unwrap();
        reporter.report("task_1", &TaskState::Killed).await;

        let update = captured.lock().unwrap().take().expect("update delivered");
        assert_eq!(update["task_id"], "task_1");
        assert_eq!(update["state"], 3);
        assert!(update["update_id"].is_string());
    }
}
