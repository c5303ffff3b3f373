use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trading_desk_lib::bridge::BridgeSink;
use trading_desk_lib::config::ShellConfig;
use trading_desk_lib::models::{BackendState, BackendStatus, RunMode, WorkerState};
use trading_desk_lib::supervisor::Supervisor;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("mock-worker.sh")
}

#[derive(Default)]
struct RecordingBridge {
    chunks: Mutex<Vec<String>>,
    statuses: Mutex<Vec<BackendStatus>>,
}

impl RecordingBridge {
    fn output(&self) -> String {
        self.chunks.lock().expect("chunks lock").join("")
    }

    fn statuses(&self) -> Vec<BackendStatus> {
        self.statuses.lock().expect("statuses lock").clone()
    }

    async fn wait_until(&self, predicate: impl Fn(&RecordingBridge) -> bool, what: &str) {
        for _ in 0..300 {
            if predicate(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {}", what);
    }
}

impl BridgeSink for RecordingBridge {
    fn terminal_output(&self, chunk: String) {
        self.chunks.lock().expect("chunks lock").push(chunk);
    }

    fn backend_status(&self, status: BackendStatus) {
        self.statuses.lock().expect("statuses lock").push(status);
    }
}

fn fixture_supervisor(dir: &std::path::Path) -> (Supervisor, Arc<RecordingBridge>) {
    let config = ShellConfig {
        worker_program: "bash".into(),
        worker_entry: fixture_path(),
        worker_dir: dir.to_path_buf(),
        dashboard_url: "http://127.0.0.1:5000".to_string(),
        stop_grace: Duration::from_secs(2),
    };
    let bridge = Arc::new(RecordingBridge::default());
    (Supervisor::new(config, bridge.clone()), bridge)
}

#[test]
fn fixture_script_exists() {
    assert!(fixture_path().exists());
}

#[cfg(unix)]
#[tokio::test]
async fn full_lifecycle_start_stream_stop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (supervisor, bridge) = fixture_supervisor(dir.path());

    let state = supervisor.start(RunMode::Demo).await.expect("start");
    assert_eq!(state, WorkerState::Running);
    assert_eq!(bridge.statuses()[0], BackendStatus::running());

    // The mode flag from the launch environment shows up in the stream.
    bridge
        .wait_until(|b| b.output().contains("mode=demo"), "mode banner")
        .await;

    supervisor.stop().await;
    bridge
        .wait_until(
            |b| b.statuses().last().map(|s| s.state) == Some(BackendState::Stopped),
            "stopped status",
        )
        .await;

    let statuses = bridge.statuses();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[1], BackendStatus::stopped(Some(0)));
    assert!(bridge.output().contains("shutting down"));
    assert_eq!(supervisor.state().await, WorkerState::Stopped);
}

#[cfg(unix)]
#[tokio::test]
async fn detach_and_requery_sees_current_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (supervisor, bridge) = fixture_supervisor(dir.path());

    supervisor.start(RunMode::Live).await.expect("start");
    // A surface that missed the running event can always re-query.
    assert_eq!(supervisor.status().await.state, BackendState::Running);
    assert_eq!(supervisor.mode().await, Some(RunMode::Live));

    supervisor.stop().await;
    bridge
        .wait_until(
            |b| b.statuses().last().map(|s| s.state) == Some(BackendState::Stopped),
            "stopped status",
        )
        .await;
    assert_eq!(supervisor.status().await.state, BackendState::Stopped);
}
