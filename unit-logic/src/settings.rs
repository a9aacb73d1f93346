use serde::{Deserialize, Serialize};

use crate::location::PositionOptions;

/// Persisted user settings the trackers depend on
pub trait SettingsStore: Send + Sync + 'static {
    /// Whether the user opted into tracking while the app is in the background
    fn background_tracking_enabled(&self) -> bool;
    /// The unit this device currently reports for, if one is assigned
    fn active_unit_id(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// How the OS-level background watcher gets registered
pub struct BackgroundWatchOptions {
    /// Title of the persistent notification on platforms that require one
    pub background_title: String,
    /// Body of that notification
    pub background_message: String,
    /// Ask for permissions on registration if they haven't been granted yet
    pub request_permissions: bool,
    /// Whether readings may be stale while the device is acquiring a fix
    pub stale: bool,
    /// Minimum number of meters between subsequent readings
    pub distance_filter_m: f64,
}

impl Default for BackgroundWatchOptions {
    fn default() -> Self {
        Self {
            background_title: "Unit is using your location.".to_string(),
            background_message: "Cancel to prevent battery drain and stop tracking.".to_string(),
            request_permissions: true,
            stale: false,
            distance_filter_m: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// Tunables for the telemetry pipeline
pub struct TrackingConfig {
    /// Options for the continuous foreground watch
    pub foreground: PositionOptions,
    /// Length of one throttle window in milliseconds
    pub throttle_window_ms: u32,
    /// Number of throttle windows that must pass between two foreground sends
    pub throttle_windows: u32,
    /// Background watcher registration
    pub background: BackgroundWatchOptions,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            foreground: PositionOptions::default(),
            throttle_window_ms: 30_000,
            throttle_windows: 2,
            background: BackgroundWatchOptions::default(),
        }
    }
}
