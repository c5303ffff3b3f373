use crate::models::RunMode;
use std::sync::atomic::{AtomicBool, Ordering};

/// What to do with a close intent on the main window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Hide the window, keep the worker running.
    Hide,
    /// Let the close proceed; the app is quitting.
    Proceed,
}

/// Visibility projection for the main window and tray. The window system
/// wiring lives in `lib.rs`; everything here is decidable without one.
#[derive(Default)]
pub struct ShellLifecycle {
    is_quitting: AtomicBool,
    main_window_visible: AtomicBool,
    tray_present: AtomicBool,
}

impl ShellLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close never terminates the worker implicitly: unless a quit is in
    /// flight, the intent is converted to a hide.
    pub fn close_requested(&self) -> CloseDisposition {
        if self.is_quitting() {
            CloseDisposition::Proceed
        } else {
            CloseDisposition::Hide
        }
    }

    /// Marks the app as quitting. Irreversible for the rest of the process
    /// lifetime. Returns true only for the call that flipped the flag, so
    /// quit teardown runs once.
    pub fn begin_quit(&self) -> bool {
        !self.is_quitting.swap(true, Ordering::SeqCst)
    }

    pub fn is_quitting(&self) -> bool {
        self.is_quitting.load(Ordering::SeqCst)
    }

    pub fn set_main_window_visible(&self, visible: bool) {
        self.main_window_visible.store(visible, Ordering::SeqCst);
    }

    pub fn main_window_visible(&self) -> bool {
        self.main_window_visible.load(Ordering::SeqCst)
    }

    pub fn set_tray_present(&self, present: bool) {
        self.tray_present.store(present, Ordering::SeqCst);
    }

    pub fn tray_present(&self) -> bool {
        self.tray_present.load(Ordering::SeqCst)
    }
}

/// Label for the tray's disabled mode indicator.
pub fn tray_mode_label(mode: Option<RunMode>) -> String {
    match mode {
        Some(RunMode::Demo) => "Mode: Demo Trading".to_string(),
        Some(RunMode::Live) => "Mode: Live Trading".to_string(),
        None => "Mode: Not Selected".to_string(),
    }
}
