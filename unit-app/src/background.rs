use std::sync::Mutex;

use log::{info, warn};
use tauri::AppHandle;
use tauri_plugin_geolocation::{GeolocationExt, PositionOptions};
use tauri_plugin_notification::NotificationExt;
use unit_logic::{
    BackgroundWatchOptions, BackgroundWatcher, DistanceFilter, LocationError, WatchCallback,
    WatchId,
};

use crate::location::{ensure_permission, to_watch_event};

const NOTIFICATION_ID: i32 = 8801;

/// Background watcher built on a plain geolocation watch. The plugin has no distance filter so
/// readings go through a [DistanceFilter] first, and a notification stays up while it runs.
pub struct TauriBackgroundWatcher(AppHandle);

impl TauriBackgroundWatcher {
    pub fn new(app: AppHandle) -> Self {
        Self(app)
    }

    fn show_notification(&self, options: &BackgroundWatchOptions) {
        let res = self
            .0
            .notification()
            .builder()
            .id(NOTIFICATION_ID)
            .title(&options.background_title)
            .body(&options.background_message)
            .show();

        if let Err(why) = res {
            warn!("Couldn't show background tracking notification: {why:?}");
        }
    }

    #[cfg(mobile)]
    fn hide_notification(&self) {
        if let Err(why) = self.0.notification().cancel(vec![NOTIFICATION_ID]) {
            warn!("Couldn't remove background tracking notification: {why:?}");
        }
    }

    /// Desktop notifications can't be withdrawn
    #[cfg(not(mobile))]
    fn hide_notification(&self) {}
}

impl BackgroundWatcher for TauriBackgroundWatcher {
    fn is_supported(&self) -> bool {
        cfg!(mobile)
    }

    fn add_watcher(
        &self,
        options: &BackgroundWatchOptions,
        callback: WatchCallback,
    ) -> Result<WatchId, LocationError> {
        if options.request_permissions {
            ensure_permission(&self.0)?;
        }

        let watch_options = PositionOptions {
            enable_high_accuracy: true,
            timeout: 10000,
            // A stale watcher may hand out cached fixes
            maximum_age: if options.stale { 10000 } else { 0 },
        };

        let filter = Mutex::new(DistanceFilter::new(options.distance_filter_m));

        let id = self
            .0
            .geolocation()
            .watch_position(watch_options, move |event| {
                let event = to_watch_event(event);
                let pass = match &event {
                    Ok(location) if location.has_fix() => filter
                        .lock()
                        .map(|mut f| f.accept(location))
                        .unwrap_or(true),
                    _ => true,
                };
                if pass {
                    callback(event);
                }
            })
            .map_err(|why| LocationError::from_platform_message(&why.to_string()))?;

        self.show_notification(options);

        info!("Registered background watcher {id}");

        Ok(id)
    }

    fn remove_watcher(&self, id: WatchId) -> Result<(), LocationError> {
        self.hide_notification();
        self.0
            .geolocation()
            .clear_watch(id)
            .map_err(|why| LocationError::Unavailable(why.to_string()))
    }
}
