use std::sync::Arc;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    bus::{EventBus, PipelineEvent, TrackerKind},
    location::{GeoLocation, LocationError, WatchCallback, WatchId, guard_callback},
    remote::UnitLocationReport,
    settings::{BackgroundWatchOptions, SettingsStore},
};

/// OS-level watcher that keeps delivering readings while the app is suspended
pub trait BackgroundWatcher: Send + Sync + 'static {
    /// Only handheld platforms can watch in the background
    fn is_supported(&self) -> bool;
    /// Register a watcher, the OS applies the distance filter before calling back
    fn add_watcher(
        &self,
        options: &BackgroundWatchOptions,
        callback: WatchCallback,
    ) -> Result<WatchId, LocationError>;
    /// Deregister a watcher by its id
    fn remove_watcher(&self, id: WatchId) -> Result<(), LocationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of [BackgroundTracker::start]
pub enum BackgroundStart {
    Started,
    AlreadyRunning,
    Unsupported,
    /// The user hasn't enabled background tracking
    Disabled,
    NoActiveUnit,
    /// Registration failed, published as [PipelineEvent::WatchFailed]
    Failed,
}

#[derive(Debug)]
struct ActiveWatch {
    id: WatchId,
    cancel: CancellationToken,
    unit_id: String,
}

/// Tracks the unit while the app is in the background. Readings skip the throttled reporter,
/// the watcher's distance filter already bounds how often they come.
pub struct BackgroundTracker<W: BackgroundWatcher, S: SettingsStore> {
    watcher: Arc<W>,
    settings: Arc<S>,
    bus: EventBus,
    options: BackgroundWatchOptions,
    active: Option<ActiveWatch>,
    generation: u64,
}

impl<W: BackgroundWatcher, S: SettingsStore> BackgroundTracker<W, S> {
    pub fn new(
        watcher: Arc<W>,
        settings: Arc<S>,
        bus: EventBus,
        options: BackgroundWatchOptions,
    ) -> Self {
        Self {
            watcher,
            settings,
            bus,
            options,
            active: None,
            generation: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn accepts(&self, generation: u64) -> bool {
        self.is_running() && self.generation == generation
    }

    /// Unit the running watcher reports for, captured when it was started
    pub fn unit_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.unit_id.as_str())
    }

    pub fn start(&mut self) -> BackgroundStart {
        if !self.watcher.is_supported() {
            return BackgroundStart::Unsupported;
        }

        if self.is_running() {
            return BackgroundStart::AlreadyRunning;
        }

        if !self.settings.background_tracking_enabled() {
            info!("Background tracking is disabled, not starting");
            return BackgroundStart::Disabled;
        }

        let Some(unit_id) = self.settings.active_unit_id() else {
            info!("No active unit, not starting background tracking");
            return BackgroundStart::NoActiveUnit;
        };

        self.generation += 1;
        let cancel = CancellationToken::new();
        let sink = self.bus.watch_sink(TrackerKind::Background, self.generation);
        let callback = guard_callback(cancel.clone(), sink);

        match self.watcher.add_watcher(&self.options, callback) {
            Ok(id) => {
                info!("Started background tracking for unit {unit_id} (watcher {id})");
                self.active = Some(ActiveWatch {
                    id,
                    cancel,
                    unit_id,
                });
                BackgroundStart::Started
            }
            Err(error) => {
                warn!("Couldn't register background watcher: {error}");
                self.bus.publish(PipelineEvent::WatchFailed {
                    tracker: TrackerKind::Background,
                    generation: self.generation,
                    error,
                });
                BackgroundStart::Failed
            }
        }
    }

    /// Deregister the watcher, safe to call when nothing is running
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            if let Err(why) = self.watcher.remove_watcher(active.id) {
                warn!("Failed to remove background watcher {}: {why}", active.id);
            }
            info!("Stopped background tracking (watcher {})", active.id);
        }
    }

    /// Build the status-free report for a reading of the running watcher
    pub fn location_report(&self, reading: &GeoLocation) -> Option<UnitLocationReport> {
        self.unit_id()
            .map(|unit_id| UnitLocationReport::from_reading(unit_id, reading))
    }
}
