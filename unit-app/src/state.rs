use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tauri::AppHandle;
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use tauri_plugin_opener::OpenerExt;
use tauri_specta::Event;
use unit_logic::{
    HostSignals, StatusSubmissionCoordinator, TelemetryPipeline, TrackerKind, TrackingConfig,
    prelude::*,
};
use unit_remote::HttpRemoteSync;

use crate::{background::TauriBackgroundWatcher, location::TauriLocation, settings::TauriSettings};

/// A status was committed, the UI should reload the unit's current status
#[derive(Serialize, Deserialize, Clone, Default, Debug, specta::Type, tauri_specta::Event)]
pub struct CurrentStatusRefresh;

/// The status submission workflow moved to another step
#[derive(Serialize, Deserialize, Clone, Default, Debug, specta::Type, tauri_specta::Event)]
pub struct SubmissionStateUpdate;

/// A status submission failed, contains the reason
#[derive(Serialize, Deserialize, Clone, Debug, specta::Type, tauri_specta::Event)]
pub struct StatusSubmissionFailed(String);

/// Location access was denied for a tracker
#[derive(Serialize, Deserialize, Clone, Debug, specta::Type, tauri_specta::Event)]
pub struct LocationPermissionDenied(TrackerKind);

/// URL that takes the user to this app's page in the system settings
const APP_SETTINGS_URL: &str = "app-settings:";

fn error_dialog(app: &AppHandle, msg: &str) {
    app.dialog()
        .message(msg)
        .kind(MessageDialogKind::Error)
        .show(|_| {});
}

fn emit<E: Event + Serialize + Clone>(app: &AppHandle, event: E) {
    if let Err(why) = event.emit(app) {
        error!("Error sending event to UI: {why:?}");
    }
}

/// Tracks whether the permission dialog is up. The dialog takes window focus on some
/// platforms, which must not read as the app going to the background.
#[derive(Default)]
pub struct DialogGate(AtomicBool);

impl DialogGate {
    /// Mark the dialog as open, `false` if it already was
    pub fn try_open(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn close(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// [HostSignals] that go to the webview as events, and to native dialogs where the user needs
/// to act
pub struct TauriHostSignals {
    app: AppHandle,
    prompt: Arc<DialogGate>,
}

impl TauriHostSignals {
    pub fn new(app: AppHandle) -> Self {
        Self {
            app,
            prompt: Arc::new(DialogGate::default()),
        }
    }

    pub fn prompting(&self) -> bool {
        self.prompt.is_open()
    }
}

impl HostSignals for TauriHostSignals {
    fn refresh_current_status(&self) {
        emit(&self.app, CurrentStatusRefresh);
    }

    fn location_permission_denied(&self, tracker: TrackerKind) {
        emit(&self.app, LocationPermissionDenied(tracker));

        if !self.prompt.try_open() {
            debug!("Location permission dialog already open");
            return;
        }

        let app = self.app.clone();
        let prompt = self.prompt.clone();
        self.app
            .dialog()
            .message(
                "Location access is needed to report your unit's position. Open settings to allow it?",
            )
            .title("Location Permission")
            .kind(MessageDialogKind::Warning)
            .buttons(MessageDialogButtons::OkCancelCustom(
                "Open Settings".to_string(),
                "Not Now".to_string(),
            ))
            .show(move |open| {
                prompt.close();
                if !open {
                    info!("User declined to open location settings");
                    return;
                }
                if let Err(why) = app.opener().open_url(APP_SETTINGS_URL, None::<&str>) {
                    warn!("Couldn't open app settings: {why:?}");
                }
            });
    }

    fn status_submission_failed(&self, reason: &str) {
        emit(&self.app, StatusSubmissionFailed(reason.to_string()));
        error_dialog(&self.app, &format!("Couldn't set your status\n\n{reason}"));
    }

    fn submission_state_changed(&self) {
        emit(&self.app, SubmissionStateUpdate);
    }
}

pub type Pipeline = TelemetryPipeline<
    TauriLocation,
    TauriBackgroundWatcher,
    TauriSettings,
    HttpRemoteSync,
    TauriHostSignals,
>;

pub type Coordinator = StatusSubmissionCoordinator<HttpRemoteSync, TauriSettings, TauriHostSignals>;

/// Everything the commands need, managed by Tauri
pub struct AppServices {
    pub pipeline: Arc<Pipeline>,
    pub coordinator: Coordinator,
    pub remote: Arc<HttpRemoteSync>,
    pub settings: Arc<TauriSettings>,
    host: Arc<TauriHostSignals>,
}

impl AppServices {
    pub fn new(app: &AppHandle) -> Result<Self> {
        let remote = Arc::new(HttpRemoteSync::new().context("Failed to set up dispatch API")?);
        let settings = Arc::new(TauriSettings::new(app.clone()));
        let host = Arc::new(TauriHostSignals::new(app.clone()));

        let pipeline = Arc::new(Pipeline::new(
            TrackingConfig::default(),
            Arc::new(TauriLocation::new(app.clone())),
            Arc::new(TauriBackgroundWatcher::new(app.clone())),
            settings.clone(),
            remote.clone(),
            host.clone(),
        ));

        info!("Dispatch API at {}", remote.base_url());

        Ok(Self {
            coordinator: pipeline.status_coordinator(),
            pipeline,
            remote,
            settings,
            host,
        })
    }

    /// Window focus stands in for the app being active, except while our own dialog has it
    pub fn focus_changed(&self, focused: bool) {
        if self.host.prompting() {
            debug!("Ignoring focus change while the permission dialog is open");
            return;
        }
        self.pipeline.set_app_active(focused);
    }

    /// Run the pipeline's main loop on the async runtime
    pub fn spawn_pipeline(&self) {
        let pipeline = self.pipeline.clone();
        tauri::async_runtime::spawn(async move {
            if let Err(why) = pipeline.main_loop().await {
                error!("Telemetry pipeline error: {why:?}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_gate_opens_once() {
        let gate = DialogGate::default();
        assert!(!gate.is_open());
        assert!(gate.try_open());
        assert!(!gate.try_open(), "Second dialog opened over the first");
        assert!(gate.is_open());

        gate.close();
        assert!(!gate.is_open());
        assert!(gate.try_open(), "Dialog couldn't reopen after closing");
    }
}
