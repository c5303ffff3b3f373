use crate::bridge::BridgeSink;
use crate::config::LaunchConfig;
use crate::errors::{AppError, AppResult};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const STREAM_CHUNK_BYTES: usize = 4096;

/// One spawned worker process. Output streaming and exit supervision run in
/// background tasks owned by the spawn; the handle itself only carries the
/// termination signal.
pub struct WorkerHandle {
    term_tx: StdMutex<Option<oneshot::Sender<()>>>,
}

impl WorkerHandle {
    /// Spawns the worker described by `config` with its environment overlay
    /// merged on top of the shell's environment. Both output streams are
    /// forwarded chunk-by-chunk, verbatim and in arrival order, to `sink`.
    /// The returned receiver fires exactly once with the exit code when the
    /// process ends, for any cause.
    pub fn spawn(
        config: &LaunchConfig,
        sink: Arc<dyn BridgeSink>,
        stop_grace: Duration,
    ) -> AppResult<(Self, oneshot::Receiver<Option<i32>>)> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .current_dir(&config.cwd)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|error| {
            AppError::Spawn(format!("{}: {}", config.program.display(), error))
        })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|stream| spawn_chunk_forwarder(stream, sink.clone()));
        let stderr_task = child
            .stderr
            .take()
            .map(|stream| spawn_chunk_forwarder(stream, sink.clone()));

        let (term_tx, term_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(supervise(
            child,
            term_rx,
            exit_tx,
            stdout_task,
            stderr_task,
            stop_grace,
        ));

        Ok((
            Self {
                term_tx: StdMutex::new(Some(term_tx)),
            },
            exit_rx,
        ))
    }

    /// Signals the process to terminate. Idempotent; calling it on an
    /// already-exited worker is a no-op.
    pub fn terminate(&self) {
        let sender = self.term_tx.lock().expect("worker terminate lock").take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

fn spawn_chunk_forwarder<R>(mut stream: R, sink: Arc<dyn BridgeSink>) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0_u8; STREAM_CHUNK_BYTES];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(size) => {
                    // No line buffering here: chunks may split or merge
                    // mid-line and the front end renders them as-is.
                    sink.terminal_output(String::from_utf8_lossy(&chunk[..size]).to_string());
                }
                Err(error) => {
                    tracing::debug!(error = %error, "worker stream read failed");
                    break;
                }
            }
        }
    })
}

async fn supervise(
    mut child: Child,
    term_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<Option<i32>>,
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    stop_grace: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => status.ok(),
        requested = term_rx => {
            if requested.is_ok() {
                terminate_then_kill(&mut child, stop_grace).await
            } else {
                child.wait().await.ok()
            }
        }
    };

    // Drain trailing output before announcing the exit.
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    let code = status.and_then(|status| status.code());
    let _ = exit_tx.send(code);
}

async fn terminate_then_kill(child: &mut Child, grace: Duration) -> Option<std::process::ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    #[cfg(windows)]
    {
        if let Some(pid) = child.id() {
            let _ = Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/T", "/F"])
                .spawn();
        }
    }

    if let Ok(status) = timeout(grace, child.wait()).await {
        return status.ok();
    }

    let _ = child.start_kill();
    child.wait().await.ok()
}
