use chrono::{DateTime, Utc};
use tauri::{AppHandle, plugin::PermissionState};
use tauri_plugin_geolocation::{
    GeolocationExt, PermissionType, Position, PositionOptions as PluginPositionOptions,
    WatchEvent as PluginWatchEvent,
};
use unit_logic::{
    GeoLocation, LocationError, PositionOptions, PositionSource, WatchCallback, WatchEvent,
    WatchId,
};

/// Options for one-shot reads, a cached fix up to 10s old is fine
const CURRENT_OPTIONS: PluginPositionOptions = PluginPositionOptions {
    enable_high_accuracy: true,
    timeout: 10000,
    maximum_age: 10000,
};

pub fn plugin_options(options: PositionOptions) -> PluginPositionOptions {
    PluginPositionOptions {
        enable_high_accuracy: options.enable_high_accuracy,
        timeout: options.timeout,
        maximum_age: options.maximum_age,
    }
}

pub fn to_location(pos: Position) -> GeoLocation {
    let coords = pos.coords;
    let timestamp = i64::try_from(pos.timestamp)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    GeoLocation {
        accuracy: Some(coords.accuracy),
        altitude: coords.altitude,
        altitude_accuracy: coords.altitude_accuracy,
        heading: coords.heading,
        speed: coords.speed,
        ..GeoLocation::new(coords.latitude, coords.longitude, timestamp)
    }
}

pub fn to_watch_event(event: PluginWatchEvent) -> WatchEvent {
    match event {
        PluginWatchEvent::Position(pos) => Ok(to_location(pos)),
        PluginWatchEvent::Error(msg) => Err(LocationError::from_platform_message(&msg)),
    }
}

fn platform_error(why: impl ToString) -> LocationError {
    LocationError::from_platform_message(&why.to_string())
}

/// Check for location permission and ask the OS for it when it isn't granted yet
pub fn ensure_permission(app: &AppHandle) -> Result<(), LocationError> {
    let geo = app.geolocation();
    let status = geo
        .check_permissions()
        .map_err(|why| LocationError::Unavailable(why.to_string()))?;

    if status.location == PermissionState::Granted {
        return Ok(());
    }

    let status = geo
        .request_permissions(Some(vec![PermissionType::Location]))
        .map_err(platform_error)?;

    if status.location == PermissionState::Granted {
        Ok(())
    } else {
        Err(LocationError::PermissionDenied)
    }
}

/// [PositionSource] backed by the geolocation plugin
pub struct TauriLocation(AppHandle);

impl TauriLocation {
    pub fn new(app: AppHandle) -> Self {
        Self(app)
    }
}

impl PositionSource for TauriLocation {
    async fn get_current_position(&self) -> Result<GeoLocation, LocationError> {
        let app = self.0.clone();
        tauri::async_runtime::spawn_blocking(move || {
            app.geolocation()
                .get_current_position(Some(CURRENT_OPTIONS))
        })
        .await
        .map_err(|why| LocationError::Unavailable(why.to_string()))?
        .map(to_location)
        .map_err(platform_error)
    }

    fn watch_position(
        &self,
        options: PositionOptions,
        callback: WatchCallback,
    ) -> Result<WatchId, LocationError> {
        ensure_permission(&self.0)?;

        self.0
            .geolocation()
            .watch_position(plugin_options(options), move |event| {
                callback(to_watch_event(event))
            })
            .map_err(platform_error)
    }

    fn clear_watch(&self, id: WatchId) -> Result<(), LocationError> {
        self.0.geolocation().clear_watch(id).map_err(platform_error)
    }
}
