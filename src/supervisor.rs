use crate::bridge::BridgeSink;
use crate::config::{LaunchConfig, ShellConfig};
use crate::errors::AppResult;
use crate::models::{BackendStatus, RunMode, WorkerState};
use crate::worker::WorkerHandle;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Serializes worker lifecycle requests and owns the single worker slot.
/// All state lives behind one async mutex, so transitions are observed in
/// the order they occur and no second worker can slip in between a check
/// and a spawn.
#[derive(Clone)]
pub struct Supervisor {
    config: ShellConfig,
    bridge: Arc<dyn BridgeSink>,
    inner: Arc<Mutex<SupervisorInner>>,
}

struct SupervisorInner {
    state: WorkerState,
    mode: Option<RunMode>,
    worker: Option<WorkerHandle>,
}

impl Supervisor {
    pub fn new(config: ShellConfig, bridge: Arc<dyn BridgeSink>) -> Self {
        Self {
            config,
            bridge,
            inner: Arc::new(Mutex::new(SupervisorInner {
                state: WorkerState::Stopped,
                mode: None,
                worker: None,
            })),
        }
    }

    /// Starts the worker in the given mode. A start while the worker is
    /// already Starting, Running, or Stopping is a no-op that reports the
    /// current state. The launch configuration is recomputed fresh for
    /// every run.
    pub async fn start(&self, mode: RunMode) -> AppResult<WorkerState> {
        let mut inner = self.inner.lock().await;
        if inner.state != WorkerState::Stopped {
            tracing::debug!(state = inner.state.as_str(), "start ignored, worker already active");
            return Ok(inner.state);
        }

        inner.state = WorkerState::Starting;
        let launch = LaunchConfig::for_mode(&self.config, mode);
        tracing::info!(
            mode = mode.as_str(),
            program = %launch.program.display(),
            "starting worker"
        );

        match WorkerHandle::spawn(&launch, self.bridge.clone(), self.config.stop_grace) {
            Ok((worker, exit_rx)) => {
                inner.worker = Some(worker);
                inner.mode = Some(mode);
                inner.state = WorkerState::Running;
                self.bridge.backend_status(BackendStatus::running());
                self.watch_exit(exit_rx);
                Ok(WorkerState::Running)
            }
            Err(error) => {
                inner.worker = None;
                inner.state = WorkerState::Stopped;
                tracing::error!(error = %error, "worker spawn failed");
                self.bridge.backend_status(BackendStatus::stopped(None));
                Err(error)
            }
        }
    }

    /// Requests termination. This is a signal, not a synchronous guarantee;
    /// the Stopped transition arrives with the exit notification. Stopping
    /// an already-stopped worker is a no-op.
    pub async fn stop(&self) -> WorkerState {
        let mut inner = self.inner.lock().await;
        match inner.state {
            WorkerState::Stopped => WorkerState::Stopped,
            WorkerState::Stopping => WorkerState::Stopping,
            WorkerState::Starting | WorkerState::Running => {
                if let Some(worker) = inner.worker.as_ref() {
                    worker.terminate();
                }
                inner.state = WorkerState::Stopping;
                tracing::info!("worker stop requested");
                WorkerState::Stopping
            }
        }
    }

    /// Mode selected for the current (or most recent) run.
    pub async fn mode(&self) -> Option<RunMode> {
        self.inner.lock().await.mode
    }

    /// The running/stopped projection the front end sees. Stopping still
    /// reports running; the stopped event follows the actual exit.
    pub async fn status(&self) -> BackendStatus {
        match self.inner.lock().await.state {
            WorkerState::Stopped => BackendStatus::stopped(None),
            WorkerState::Starting | WorkerState::Running | WorkerState::Stopping => {
                BackendStatus::running()
            }
        }
    }

    pub async fn state(&self) -> WorkerState {
        self.inner.lock().await.state
    }

    fn watch_exit(&self, exit_rx: oneshot::Receiver<Option<i32>>) {
        let inner = self.inner.clone();
        let bridge = self.bridge.clone();
        tokio::spawn(async move {
            let code = exit_rx.await.unwrap_or(None);
            let mut inner = inner.lock().await;
            inner.worker = None;
            inner.state = WorkerState::Stopped;
            match code {
                Some(0) => tracing::info!("worker exited cleanly"),
                Some(code) => tracing::warn!(exit_code = code, "worker exited with failure"),
                None => tracing::warn!("worker terminated by signal"),
            }
            // Emitted under the state lock; a restart cannot publish its
            // running event ahead of this stop transition.
            bridge.backend_status(BackendStatus::stopped(code));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::Supervisor;
    use crate::bridge::BridgeSink;
    use crate::config::ShellConfig;
    use crate::models::{BackendState, BackendStatus, RunMode, WorkerState};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        statuses: StdMutex<Vec<BackendStatus>>,
    }

    impl RecordingSink {
        fn statuses(&self) -> Vec<BackendStatus> {
            self.statuses.lock().expect("statuses lock").clone()
        }

        async fn wait_for_statuses(&self, count: usize) -> Vec<BackendStatus> {
            for _ in 0..200 {
                let statuses = self.statuses();
                if statuses.len() >= count {
                    return statuses;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("timed out waiting for {} status events", count);
        }
    }

    impl BridgeSink for RecordingSink {
        fn terminal_output(&self, _chunk: String) {}

        fn backend_status(&self, status: BackendStatus) {
            self.statuses.lock().expect("statuses lock").push(status);
        }
    }

    fn supervisor_with_script(
        dir: &std::path::Path,
        script: &str,
    ) -> (Supervisor, Arc<RecordingSink>) {
        let entry = dir.join("worker.sh");
        std::fs::write(&entry, script).expect("write worker script");
        let config = ShellConfig {
            worker_program: "sh".into(),
            worker_entry: entry,
            worker_dir: dir.to_path_buf(),
            dashboard_url: "http://127.0.0.1:5000".to_string(),
            stop_grace: Duration::from_millis(200),
        };
        let sink = Arc::new(RecordingSink::default());
        (Supervisor::new(config, sink.clone()), sink)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_while_running_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (supervisor, sink) = supervisor_with_script(dir.path(), "exec sleep 30\n");

        let first = supervisor.start(RunMode::Demo).await.expect("first start");
        assert_eq!(first, WorkerState::Running);

        let second = supervisor.start(RunMode::Live).await.expect("second start");
        assert_eq!(second, WorkerState::Running);

        // Single running event; the mode of the first start is the one that
        // sticks for the run.
        assert_eq!(sink.statuses().len(), 1);
        assert_eq!(supervisor.mode().await, Some(RunMode::Demo));

        supervisor.stop().await;
        let statuses = sink.wait_for_statuses(2).await;
        assert_eq!(statuses[1].state, BackendState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_while_stopped_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (supervisor, sink) = supervisor_with_script(dir.path(), "exit 0\n");

        assert_eq!(supervisor.stop().await, WorkerState::Stopped);
        assert_eq!(supervisor.stop().await, WorkerState::Stopped);
        assert!(sink.statuses().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn self_exit_with_failure_code_reaches_the_bridge() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (supervisor, sink) = supervisor_with_script(dir.path(), "exit 1\n");

        supervisor.start(RunMode::Demo).await.expect("start");
        let statuses = sink.wait_for_statuses(2).await;

        assert_eq!(statuses[0], BackendStatus::running());
        assert_eq!(statuses[1], BackendStatus::stopped(Some(1)));
        assert_eq!(supervisor.state().await, WorkerState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn worker_can_be_restarted_after_exit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (supervisor, sink) = supervisor_with_script(dir.path(), "exit 0\n");

        supervisor.start(RunMode::Demo).await.expect("first run");
        sink.wait_for_statuses(2).await;

        let state = supervisor.start(RunMode::Live).await.expect("second run");
        assert_eq!(state, WorkerState::Running);
        assert_eq!(supervisor.mode().await, Some(RunMode::Live));
        sink.wait_for_statuses(4).await;
    }

    /// Sink that dawdles before recording stop events, widening any window
    /// in which a restart's running event could jump the queue.
    #[derive(Default)]
    struct SlowStopSink {
        statuses: StdMutex<Vec<BackendStatus>>,
    }

    impl SlowStopSink {
        fn statuses(&self) -> Vec<BackendStatus> {
            self.statuses.lock().expect("statuses lock").clone()
        }
    }

    impl BridgeSink for SlowStopSink {
        fn terminal_output(&self, _chunk: String) {}

        fn backend_status(&self, status: BackendStatus) {
            if status.state == BackendState::Stopped {
                std::thread::sleep(Duration::from_millis(50));
            }
            self.statuses.lock().expect("statuses lock").push(status);
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn status_events_keep_transition_order_across_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let entry = dir.path().join("worker.sh");
        std::fs::write(&entry, "exit 0\n").expect("write worker script");
        let config = ShellConfig {
            worker_program: "sh".into(),
            worker_entry: entry,
            worker_dir: dir.path().to_path_buf(),
            dashboard_url: "http://127.0.0.1:5000".to_string(),
            stop_grace: Duration::from_millis(200),
        };
        let sink = Arc::new(SlowStopSink::default());
        let supervisor = Supervisor::new(config, sink.clone());

        supervisor.start(RunMode::Demo).await.expect("first run");

        // Restart the moment the supervisor reads back Stopped.
        for _ in 0..200 {
            if supervisor.state().await == WorkerState::Stopped {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let state = supervisor.start(RunMode::Demo).await.expect("second run");
        assert_eq!(state, WorkerState::Running);

        for _ in 0..200 {
            if sink.statuses().len() >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let states: Vec<BackendState> = sink
            .statuses()
            .iter()
            .take(3)
            .map(|status| status.state)
            .collect();
        assert_eq!(
            states,
            vec![
                BackendState::Running,
                BackendState::Stopped,
                BackendState::Running
            ]
        );
    }

    #[tokio::test]
    async fn spawn_failure_reverts_to_stopped_and_reports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (supervisor, sink) = supervisor_with_script(dir.path(), "exit 0\n");
        let config = ShellConfig {
            worker_program: "/nonexistent/trading-worker".into(),
            ..supervisor.config.clone()
        };
        let supervisor = Supervisor::new(config, sink.clone());

        let result = supervisor.start(RunMode::Demo).await;
        assert!(result.is_err());
        assert_eq!(supervisor.state().await, WorkerState::Stopped);
        let statuses = sink.statuses();
        assert_eq!(statuses, vec![BackendStatus::stopped(None)]);
    }
}
