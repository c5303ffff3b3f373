pub mod bridge;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod models;
pub mod shell;
pub mod supervisor;
pub mod updater;
pub mod worker;

use crate::bridge::TauriBridge;
use crate::config::ShellConfig;
use crate::credentials::CredentialsStore;
use crate::models::{
    AcceptedResponse, BackendStatus, BooleanResponse, CredentialFields, RunMode,
    StartBackendPayload,
};
use crate::shell::{tray_mode_label, CloseDisposition, ShellLifecycle};
use crate::supervisor::Supervisor;
use crate::updater::{DisabledUpdateChannel, UpdateCoordinator};
use std::path::Path;
use std::sync::Arc;
use tauri::menu::{MenuBuilder, MenuItem, MenuItemBuilder};
use tauri::tray::{TrayIconBuilder, TrayIconEvent};
use tauri::{AppHandle, Manager};
use tauri_plugin_shell::ShellExt;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

const MAIN_WINDOW_LABEL: &str = "main";

struct TrayState {
    mode_item: MenuItem<tauri::Wry>,
}

#[derive(Clone)]
struct AppState {
    supervisor: Supervisor,
    lifecycle: Arc<ShellLifecycle>,
    credentials: CredentialsStore,
    config: ShellConfig,
    updater: Arc<UpdateCoordinator>,
}

#[tauri::command]
async fn start_backend(
    app: AppHandle,
    state: tauri::State<'_, AppState>,
    payload: StartBackendPayload,
) -> Result<AcceptedResponse, String> {
    match state.supervisor.start(payload.mode).await {
        Ok(_) => {
            update_tray_mode(&app, state.supervisor.mode().await);
            Ok(AcceptedResponse { accepted: true })
        }
        Err(error) => Err(to_client_error(error)),
    }
}

#[tauri::command]
async fn stop_backend(state: tauri::State<'_, AppState>) -> Result<AcceptedResponse, String> {
    state.supervisor.stop().await;
    Ok(AcceptedResponse { accepted: true })
}

#[tauri::command]
async fn get_mode(state: tauri::State<'_, AppState>) -> Result<Option<RunMode>, String> {
    Ok(state.supervisor.mode().await)
}

#[tauri::command]
async fn get_backend_status(state: tauri::State<'_, AppState>) -> Result<BackendStatus, String> {
    Ok(state.supervisor.status().await)
}

#[tauri::command]
fn minimize_window(window: tauri::Window) -> Result<(), String> {
    window.minimize().map_err(to_client_error)
}

#[tauri::command]
fn toggle_maximize_window(window: tauri::Window) -> Result<(), String> {
    if window.is_maximized().map_err(to_client_error)? {
        window.unmaximize().map_err(to_client_error)
    } else {
        window.maximize().map_err(to_client_error)
    }
}

#[tauri::command]
fn close_window(window: tauri::Window, state: tauri::State<'_, AppState>) -> Result<(), String> {
    // The front end's close button hides the surface; only an explicit quit
    // tears anything down.
    window.hide().map_err(to_client_error)?;
    state.lifecycle.set_main_window_visible(false);
    Ok(())
}

#[tauri::command]
fn open_dashboard(app: AppHandle, state: tauri::State<'_, AppState>) -> Result<(), String> {
    app.shell()
        .open(state.config.dashboard_url.clone(), None)
        .map_err(to_client_error)
}

#[tauri::command]
fn check_credentials_present(state: tauri::State<'_, AppState>) -> Result<BooleanResponse, String> {
    Ok(BooleanResponse {
        success: state.credentials.exists(),
    })
}

#[tauri::command]
async fn save_credentials(
    state: tauri::State<'_, AppState>,
    payload: CredentialFields,
) -> Result<AcceptedResponse, String> {
    let demo = state
        .supervisor
        .mode()
        .await
        .map(RunMode::is_demo)
        .unwrap_or(false);
    state
        .credentials
        .write(&payload, demo)
        .map(|_| AcceptedResponse { accepted: true })
        .map_err(to_client_error)
}

#[tauri::command]
fn check_for_updates(state: tauri::State<'_, AppState>) -> Result<AcceptedResponse, String> {
    state.updater.check();
    Ok(AcceptedResponse { accepted: true })
}

#[tauri::command]
fn install_update(state: tauri::State<'_, AppState>) -> Result<AcceptedResponse, String> {
    state
        .updater
        .install()
        .map(|_| AcceptedResponse { accepted: true })
        .map_err(to_client_error)
}

#[tauri::command]
async fn quit_app(app: AppHandle, state: tauri::State<'_, AppState>) -> Result<(), String> {
    if state.lifecycle.begin_quit() {
        state.supervisor.stop().await;
    }
    app.exit(0);
    Ok(())
}

pub fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .setup(|app| {
            let app_data_dir = app.path().app_data_dir().map_err(|error| error.to_string())?;
            std::fs::create_dir_all(&app_data_dir).map_err(|error| error.to_string())?;
            init_tracing(&app_data_dir).map_err(|error| error.to_string())?;

            let resource_dir = app.path().resource_dir().unwrap_or_else(|_| {
                std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."))
            });
            let config = ShellConfig::resolve(&resource_dir);
            tracing::info!(worker_dir = %config.worker_dir.display(), "shell configuration resolved");

            let bridge = TauriBridge::new();
            bridge.attach(app.handle().clone());

            let supervisor = Supervisor::new(config.clone(), Arc::new(bridge));
            let lifecycle = Arc::new(ShellLifecycle::new());
            lifecycle.set_main_window_visible(true);

            let updater = Arc::new(UpdateCoordinator::new(Arc::new(DisabledUpdateChannel)));
            updater.attach(app.handle().clone());
            updater.check();

            let state = AppState {
                supervisor,
                lifecycle: lifecycle.clone(),
                credentials: CredentialsStore::new(config.credentials_path()),
                config,
                updater,
            };
            app.manage(state);

            let mode_item = build_tray(app.handle())?;
            app.manage(TrayState { mode_item });
            lifecycle.set_tray_present(true);
            Ok(())
        })
        .on_window_event(|window, event| {
            if window.label() != MAIN_WINDOW_LABEL {
                return;
            }
            if let tauri::WindowEvent::CloseRequested { api, .. } = event {
                let state = window.state::<AppState>();
                match state.lifecycle.close_requested() {
                    CloseDisposition::Hide => {
                        api.prevent_close();
                        let _ = window.hide();
                        state.lifecycle.set_main_window_visible(false);
                    }
                    CloseDisposition::Proceed => {}
                }
            }
        })
        .invoke_handler(tauri::generate_handler![
            start_backend,
            stop_backend,
            get_mode,
            get_backend_status,
            minimize_window,
            toggle_maximize_window,
            close_window,
            open_dashboard,
            check_credentials_present,
            save_credentials,
            check_for_updates,
            install_update,
            quit_app
        ])
        .build(tauri::generate_context!())
        .expect("failed to build tauri app")
        .run(|app_handle, event| match event {
            tauri::RunEvent::ExitRequested { .. } => {
                // OS-level quit: best-effort stop, not awaited. kill_on_drop
                // on the child covers the case where exit wins the race.
                let state = app_handle.state::<AppState>();
                if state.lifecycle.begin_quit() {
                    let supervisor = state.supervisor.clone();
                    tauri::async_runtime::spawn(async move {
                        supervisor.stop().await;
                    });
                }
            }
            #[cfg(target_os = "macos")]
            tauri::RunEvent::Reopen { .. } => {
                show_main_window(app_handle);
            }
            _ => {}
        });
}

fn build_tray(app: &AppHandle) -> tauri::Result<MenuItem<tauri::Wry>> {
    let show = MenuItemBuilder::with_id("show", "Show Application").build(app)?;
    let mode_item = MenuItemBuilder::with_id("mode", tray_mode_label(None))
        .enabled(false)
        .build(app)?;
    let start = MenuItemBuilder::with_id("start", "Start Bot").build(app)?;
    let stop = MenuItemBuilder::with_id("stop", "Stop Bot").build(app)?;
    let updates = MenuItemBuilder::with_id("check-updates", "Check for Updates").build(app)?;
    let quit = MenuItemBuilder::with_id("quit", "Quit").build(app)?;
    let menu = MenuBuilder::new(app)
        .item(&show)
        .item(&mode_item)
        .separator()
        .item(&start)
        .item(&stop)
        .separator()
        .item(&updates)
        .separator()
        .item(&quit)
        .build()?;

    let mut tray = TrayIconBuilder::with_id("main-tray")
        .menu(&menu)
        .tooltip("Trading Desk")
        .on_menu_event(|app, event| match event.id().as_ref() {
            "show" => show_main_window(app),
            "start" => {
                let state = app.state::<AppState>();
                let supervisor = state.supervisor.clone();
                let app = app.clone();
                tauri::async_runtime::spawn(async move {
                    let mode = supervisor.mode().await.unwrap_or(RunMode::Demo);
                    match supervisor.start(mode).await {
                        Ok(_) => update_tray_mode(&app, supervisor.mode().await),
                        Err(error) => tracing::error!(error = %error, "tray start failed"),
                    }
                });
            }
            "stop" => {
                let state = app.state::<AppState>();
                let supervisor = state.supervisor.clone();
                tauri::async_runtime::spawn(async move {
                    supervisor.stop().await;
                });
            }
            "check-updates" => {
                let state = app.state::<AppState>();
                state.updater.check();
            }
            "quit" => {
                let state = app.state::<AppState>().inner().clone();
                let app = app.clone();
                tauri::async_runtime::spawn(async move {
                    if state.lifecycle.begin_quit() {
                        state.supervisor.stop().await;
                    }
                    app.exit(0);
                });
            }
            other => tracing::debug!(id = other, "unhandled tray menu item"),
        })
        .on_tray_icon_event(|tray, event| {
            if let TrayIconEvent::DoubleClick { .. } = event {
                show_main_window(tray.app_handle());
            }
        });

    if let Some(icon) = app.default_window_icon() {
        tray = tray.icon(icon.clone());
    }

    tray.build(app)?;
    Ok(mode_item)
}

fn update_tray_mode(app: &AppHandle, mode: Option<RunMode>) {
    if let Some(tray) = app.try_state::<TrayState>() {
        if let Err(error) = tray.mode_item.set_text(tray_mode_label(mode)) {
            tracing::warn!(error = %error, "failed to update tray mode label");
        }
    }
}

/// Restores the main window if it exists, or recreates it after a destroy.
fn show_main_window(app: &AppHandle) {
    let state = app.state::<AppState>();
    if let Some(window) = app.get_webview_window(MAIN_WINDOW_LABEL) {
        let _ = window.show();
        let _ = window.set_focus();
        state.lifecycle.set_main_window_visible(true);
        return;
    }

    match tauri::WebviewWindowBuilder::new(
        app,
        MAIN_WINDOW_LABEL,
        tauri::WebviewUrl::default(),
    )
    .title("Trading Desk")
    .build()
    {
        Ok(_) => state.lifecycle.set_main_window_visible(true),
        Err(error) => tracing::error!(error = %error, "failed to recreate main window"),
    }
}

fn init_tracing(app_data_dir: &Path) -> Result<(), String> {
    let log_dir = app_data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "shell.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
