use crate::errors::{AppError, AppResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tauri::{AppHandle, Emitter};

pub const UPDATE_AVAILABLE_EVENT: &str = "update-available";
pub const UPDATE_DOWNLOADED_EVENT: &str = "update-downloaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateNotice {
    Available,
    Downloaded,
}

/// External update collaborator. The shell only asks it to look for updates
/// and, once one is downloaded and accepted, to restart and install.
pub trait UpdateChannel: Send + Sync + 'static {
    fn check_for_updates(&self);
    fn restart_and_install(&self);
}

/// Stand-in used when no update channel is wired up (dev builds).
pub struct DisabledUpdateChannel;

impl UpdateChannel for DisabledUpdateChannel {
    fn check_for_updates(&self) {
        tracing::debug!("update channel disabled, skipping check");
    }

    fn restart_and_install(&self) {
        tracing::debug!("update channel disabled, ignoring install request");
    }
}

/// Relays collaborator notices to the front end and gates the install
/// request on a download actually having completed.
pub struct UpdateCoordinator {
    channel: Arc<dyn UpdateChannel>,
    app_handle: RwLock<Option<AppHandle>>,
    downloaded: AtomicBool,
}

impl UpdateCoordinator {
    pub fn new(channel: Arc<dyn UpdateChannel>) -> Self {
        Self {
            channel,
            app_handle: RwLock::new(None),
            downloaded: AtomicBool::new(false),
        }
    }

    pub fn attach(&self, app_handle: AppHandle) {
        let mut writer = self.app_handle.write().expect("updater app handle lock");
        *writer = Some(app_handle);
    }

    pub fn check(&self) {
        self.channel.check_for_updates();
    }

    pub fn notify(&self, notice: UpdateNotice) {
        let event = match notice {
            UpdateNotice::Available => UPDATE_AVAILABLE_EVENT,
            UpdateNotice::Downloaded => {
                self.downloaded.store(true, Ordering::SeqCst);
                UPDATE_DOWNLOADED_EVENT
            }
        };
        tracing::info!(event, "update notice received");

        let reader = self.app_handle.read().expect("updater app handle lock");
        if let Some(handle) = reader.as_ref() {
            if let Err(error) = handle.emit(event, ()) {
                tracing::warn!(event, error = %error, "failed to emit update notice");
            }
        }
    }

    /// User accepted the downloaded update; hand control to the channel.
    pub fn install(&self) -> AppResult<()> {
        if !self.downloaded.load(Ordering::SeqCst) {
            return Err(AppError::NotFound("no update has been downloaded".to_string()));
        }
        self.channel.restart_and_install();
        Ok(())
    }
}
