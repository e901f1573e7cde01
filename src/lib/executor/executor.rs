use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::lib::executor::types::{
    ExecState, Executor, ExecutorConfig, ExecutorError, LifecycleHooks, TASK_DUMP_PATH,
};
use crate::lib::health::types::{HealthWatcher, RegistryClient};
use crate::lib::logs::relay::relay_logs;
use crate::lib::logs::types::LogSink;
use crate::lib::status::types::StatusReporter;
use crate::lib::tasks::docker::DockerManager;
use crate::lib::tasks::state::valid_state_transition;
use crate::lib::tasks::types::{Task, TaskState, short_id};

/// A container that stopped on request with exit code 0 finished its work;
/// anything else was shot.
pub fn classify_exit(exit_code: Option<i64>) -> TaskState {
    match exit_code {
        Some(0) => TaskState::Finished,
        _ => TaskState::Killed,
    }
}

/// Best-effort diagnostic dump of the accepted task spec, overwritten on
/// each launch and never read back.
pub async fn dump_task_spec(task: &Task, path: &Path) {
    match serde_json::to_vec_pretty(task) {
        Ok(buf) => {
            if let Err(e) = tokio::fs::write(path, buf).await {
                warn!(path = %path.display(), error = %e, "could not write task spec dump");
            }
        }
        Err(e) => {
            warn!(error = %e, "could not encode task spec dump");
        }
    }
}

impl Executor {
    pub fn new(
        docker: DockerManager,
        registry: RegistryClient,
        reporter: StatusReporter,
        sink: Arc<LogSink>,
        config: ExecutorConfig,
    ) -> Self {
        Executor {
            docker,
            registry,
            reporter,
            sink,
            config,
            state: Arc::new(Mutex::new(ExecState::default())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Accept and run one task. Running is reported before the container
    /// exists so the orchestrator sees liveness during image pull and
    /// creation. Create/start failures are terminal: a spec the runtime
    /// rejected will not succeed on retry.
    pub async fn launch(&self, mut task: Task) -> Result<String, ExecutorError> {
        {
            let mut state = self.state.lock().await;
            if state.task.is_some() {
                return Err(ExecutorError::TaskAlreadyRunning);
            }
            task.state = TaskState::Running;
            state.task = Some(task.clone());
        }

        info!(task_id = %task.id, name = %task.name, image = %task.image, "launching task");

        dump_task_spec(&task, Path::new(TASK_DUMP_PATH)).await;
        self.reporter.report(&task.id, &TaskState::Running).await;

        if task.force_pull {
            if let Err(e) = self.docker.pull_image(&task.image).await {
                error!(task_id = %task.id, error = %e, "failed to pull image");
                self.fail(&task.id);
                return Err(e.into());
            }
        }

        let container_id = match self.docker.create(&task).await {
            Ok(id) => id,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "failed to create container");
                self.fail(&task.id);
                return Err(e.into());
            }
        };

        if let Err(e) = self.docker.start(&container_id).await {
            error!(task_id = %task.id, error = %e, "failed to start container");
            self.fail(&task.id);
            return Err(e.into());
        }

        self.state.lock().await.container_id = Some(container_id.clone());

        // The relay and the watcher run concurrently from here; the watcher
        // outcome alone decides the terminal state.
        let exec = self.clone();
        let task_id = task.id.clone();
        let id = container_id.clone();
        tokio::spawn(async move {
            let relay_docker = exec.docker.clone();
            let relay_id = id.clone();
            let relay_sink = exec.sink.clone();
            let relay_shutdown = exec.shutdown.clone();
            tokio::spawn(async move {
                relay_logs(&relay_docker, &relay_id, relay_sink, relay_shutdown).await;
            });

            let watcher = HealthWatcher::new(
                exec.docker.clone(),
                exec.registry.clone(),
                &id,
                exec.config.health_backoff,
                exec.config.health_interval,
            );

            info!(container = short_id(&id), task_id = %task_id, "monitoring container");
            match watcher.watch(exec.shutdown.clone()).await {
                Ok(()) => {
                    info!(task_id = %task_id, "task completed");
                    exec.conclude(&task_id, TaskState::Finished).await;
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "task watch failed");
                    exec.conclude(&task_id, TaskState::Failed).await;
                }
            }
        });

        Ok(container_id)
    }

    /// Stop the supervised task's container and classify the result. Once a
    /// kill was requested the task is reported regardless of stop/inspect
    /// errors; the orchestrator must learn a terminal state either way.
    pub async fn kill(&self, task_id: &str) -> Result<TaskState, ExecutorError> {
        let container_id = {
            let state = self.state.lock().await;
            let Some(task) = state.task.as_ref() else {
                return Err(ExecutorError::NoSuchTask(task_id.to_string()));
            };
            if task.id != task_id {
                return Err(ExecutorError::NoSuchTask(task_id.to_string()));
            }
            state.container_id.clone()
        };

        info!(task_id, "killing task");

        let exit_code = match container_id {
            Some(id) => {
                if let Err(e) = self.docker.stop(&id, self.config.kill_timeout_secs).await {
                    error!(container = short_id(&id), error = %e, "error stopping container");
                }

                // A kill request arrives both when a task is shot and when it
                // is being replaced; the reported state has to reflect how the
                // container actually exited.
                match self.docker.inspect_exit_code(&id).await {
                    Ok(code) => code,
                    Err(e) => {
                        error!(container = short_id(&id), error = %e, "error inspecting container");
                        None
                    }
                }
            }
            None => {
                warn!(task_id, "kill requested before a container existed");
                None
            }
        };

        let next = classify_exit(exit_code);
        let reported = next.clone();
        let exec = self.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            exec.conclude(&task_id, next).await;
        });

        Ok(reported)
    }

    /// The currently supervised task, if any.
    pub async fn snapshot(&self) -> Vec<Task> {
        self.state.lock().await.task.clone().into_iter().collect()
    }

    fn fail(&self, task_id: &str) {
        let exec = self.clone();
        let task_id = task_id.to_string();
        tokio::spawn(async move {
            exec.conclude(&task_id, TaskState::Failed).await;
        });
    }

    /// Report a terminal state exactly once, then exit. The transition map
    /// makes later calls no-ops, so a kill racing the watcher cannot produce
    /// a second report. The grace delay gives the unacknowledged update time
    /// to leave before the process dies.
    pub async fn conclude(&self, task_id: &str, next: TaskState) {
        {
            let mut state = self.state.lock().await;
            let Some(task) = state.task.as_mut() else {
                return;
            };
            if !valid_state_transition(&task.state, &next) {
                warn!(task_id, current = ?task.state, next = ?next, "ignoring transition after terminal state");
                return;
            }
            task.state = next.clone();
        }

        self.reporter.report(task_id, &next).await;
        self.shutdown.cancel();

        tokio::time::sleep(self.config.grace_delay).await;
        info!(task_id, state = ?next, "executor exiting");
        std::process::exit(0);
    }
}

impl LifecycleHooks for Executor {}
