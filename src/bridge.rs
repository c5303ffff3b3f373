use crate::models::BackendStatus;
use std::sync::{Arc, RwLock};
use tauri::{AppHandle, Emitter};

pub const TERMINAL_OUTPUT_EVENT: &str = "terminal-output";
pub const BACKEND_STATUS_EVENT: &str = "backend-status";

/// The shell-to-front-end half of the bridge. Events are fire-and-forget
/// and ordered per kind; the supervisor only ever talks to this trait, so
/// it can run under test with no window system present.
pub trait BridgeSink: Send + Sync + 'static {
    fn terminal_output(&self, chunk: String);
    fn backend_status(&self, status: BackendStatus);
}

/// Forwards bridge events to every attached webview via Tauri's event
/// system. The app handle arrives after setup, so emits before attachment
/// are dropped; the front end re-queries current status on attach.
#[derive(Clone, Default)]
pub struct TauriBridge {
    app_handle: Arc<RwLock<Option<AppHandle>>>,
}

impl TauriBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, app_handle: AppHandle) {
        let mut writer = self.app_handle.write().expect("bridge app handle lock");
        *writer = Some(app_handle);
    }

    fn emit(&self, event: &str, payload: impl serde::Serialize + Clone) {
        let reader = self.app_handle.read().expect("bridge app handle lock");
        if let Some(handle) = reader.as_ref() {
            if let Err(error) = handle.emit(event, payload) {
                tracing::warn!(event, error = %error, "failed to emit bridge event");
            }
        }
    }
}

impl BridgeSink for TauriBridge {
    fn terminal_output(&self, chunk: String) {
        self.emit(TERMINAL_OUTPUT_EVENT, chunk);
    }

    fn backend_status(&self, status: BackendStatus) {
        self.emit(BACKEND_STATUS_EVENT, status);
    }
}
