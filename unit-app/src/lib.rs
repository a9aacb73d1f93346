mod background;
mod location;
mod settings;
mod state;

use log::LevelFilter;
use tauri::{Manager, RunEvent, State, WindowEvent};
use tauri_specta::{ErrorHandlingMode, collect_commands, collect_events};
use unit_logic::{
    GeoLocation, KnownDestinations, SubmissionState, TrackingSession, UnitStatusDefinition,
};

use std::result::Result as StdResult;

use crate::{
    settings::UnitSettings,
    state::{
        AppServices, CurrentStatusRefresh, LocationPermissionDenied, StatusSubmissionFailed,
        SubmissionStateUpdate,
    },
};

type Result<T = (), E = String> = StdResult<T, E>;

// == TRACKING COMMANDS ==

#[tauri::command]
#[specta::specta]
/// Tell the backend the app came to the foreground (`true`) or went to the background (`false`).
/// Window focus changes already do this, call it when the UI knows better.
fn set_app_active(active: bool, services: State<'_, AppServices>) {
    services.pipeline.set_app_active(active);
}

#[tauri::command]
#[specta::specta]
/// Get a single fix from the device, `null` if there is no usable position
async fn get_current_position(services: State<'_, AppServices>) -> Result<Option<GeoLocation>> {
    Ok(services.pipeline.current_position().await)
}

#[tauri::command]
#[specta::specta]
/// Which tracker is running and when a foreground location was last sent
async fn get_tracking_session(services: State<'_, AppServices>) -> Result<TrackingSession> {
    Ok(services.pipeline.session().await)
}

// == SETTINGS COMMANDS ==

#[tauri::command]
#[specta::specta]
/// Get the persisted tracking settings
fn get_unit_settings(services: State<'_, AppServices>) -> UnitSettings {
    services.settings.snapshot()
}

#[tauri::command]
#[specta::specta]
/// Turn tracking while in the background on or off, applies the next time the app is backgrounded
fn set_background_tracking(enabled: bool, services: State<'_, AppServices>) -> Result {
    services
        .settings
        .set_background_tracking(enabled)
        .map_err(|err| err.to_string())
}

#[tauri::command]
#[specta::specta]
/// Set the unit this device reports for, `null` to stop reporting
fn set_active_unit(unit_id: Option<String>, services: State<'_, AppServices>) -> Result {
    services
        .settings
        .set_active_unit(unit_id)
        .map_err(|err| err.to_string())
}

#[tauri::command]
#[specta::specta]
/// Set the bearer token used for dispatch API calls, `null` after logging out
fn set_access_token(token: Option<String>, services: State<'_, AppServices>) {
    services.remote.set_access_token(token);
}

// == STATUS COMMANDS ==

#[tauri::command]
#[specta::specta]
/// Start setting the unit's status. `known` are the stations and calls that can be picked as a
/// destination. Replaces any submission that's still in progress, returns the new
/// [SubmissionState].
async fn begin_status_submission(
    status: UnitStatusDefinition,
    known: KnownDestinations,
    services: State<'_, AppServices>,
) -> Result<SubmissionState> {
    Ok(services.coordinator.submit_status(status, &known).await)
}

#[tauri::command]
#[specta::specta]
/// (Step: DestinationPending) Pick a destination by id, `null` to respond to nothing in particular
async fn select_status_destination(
    id: Option<String>,
    services: State<'_, AppServices>,
) -> Result<SubmissionState> {
    services
        .coordinator
        .select_destination(id.as_deref())
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
#[specta::specta]
/// (Step: NotePending) Submit the note, may be empty unless the status requires one
async fn submit_status_note(
    note: String,
    services: State<'_, AppServices>,
) -> Result<SubmissionState> {
    services
        .coordinator
        .submit_note(&note)
        .await
        .map_err(|err| err.to_string())
}

#[tauri::command]
#[specta::specta]
/// Drop the submission in progress
async fn cancel_status_submission(services: State<'_, AppServices>) -> Result {
    services.coordinator.cancel().await;
    Ok(())
}

#[tauri::command]
#[specta::specta]
/// Get the current state of the status submission, call after receiving an update event
async fn get_submission_state(services: State<'_, AppServices>) -> Result<SubmissionState> {
    Ok(services.coordinator.state().await)
}

pub fn mk_specta() -> tauri_specta::Builder {
    tauri_specta::Builder::<tauri::Wry>::new()
        .error_handling(ErrorHandlingMode::Throw)
        .commands(collect_commands![
            set_app_active,
            get_current_position,
            get_tracking_session,
            get_unit_settings,
            set_background_tracking,
            set_active_unit,
            set_access_token,
            begin_status_submission,
            select_status_destination,
            submit_status_note,
            cancel_status_submission,
            get_submission_state,
        ])
        .events(collect_events![
            CurrentStatusRefresh,
            SubmissionStateUpdate,
            StatusSubmissionFailed,
            LocationPermissionDenied
        ])
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let builder = mk_specta();

    tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_notification::init())
        .plugin(
            tauri_plugin_log::Builder::new()
                .level(LevelFilter::Debug)
                .build(),
        )
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_geolocation::init())
        .plugin(tauri_plugin_store::Builder::default().build())
        .invoke_handler(builder.invoke_handler())
        .setup(move |app| {
            builder.mount_events(app);

            let services = AppServices::new(app.handle())?;
            services.spawn_pipeline();
            // The app launches in the foreground
            services.pipeline.set_app_active(true);
            app.manage(services);

            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Focused(focused) = event
                && let Some(services) = window.try_state::<AppServices>()
            {
                services.focus_changed(*focused);
            }
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let RunEvent::Exit = event
                && let Some(services) = app.try_state::<AppServices>()
            {
                services.pipeline.quit();
            }
        });
}
