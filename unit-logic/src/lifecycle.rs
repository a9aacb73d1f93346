use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    background::{BackgroundStart, BackgroundTracker, BackgroundWatcher},
    bus::TrackerKind,
    foreground::ForegroundTracker,
    location::{PositionSource, UtcDT},
    settings::SettingsStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, specta::Type)]
/// Which tracker is currently running
pub enum TrackingMode {
    #[default]
    None,
    Foreground,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// Snapshot of the tracking state
pub struct TrackingSession {
    pub active_mode: TrackingMode,
    pub last_sent_at: Option<UtcDT>,
}

/// Follows the app's active/inactive signal and keeps exactly one tracker running
pub struct LifecycleController<P: PositionSource, W: BackgroundWatcher, S: SettingsStore> {
    foreground: ForegroundTracker<P>,
    background: BackgroundTracker<W, S>,
    mode: TrackingMode,
}

impl<P: PositionSource, W: BackgroundWatcher, S: SettingsStore> LifecycleController<P, W, S> {
    pub fn new(foreground: ForegroundTracker<P>, background: BackgroundTracker<W, S>) -> Self {
        Self {
            foreground,
            background,
            mode: TrackingMode::None,
        }
    }

    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn foreground(&self) -> &ForegroundTracker<P> {
        &self.foreground
    }

    pub fn background(&self) -> &BackgroundTracker<W, S> {
        &self.background
    }

    /// Apply an app state change. Both actions of a transition always run, stop first, so two
    /// trackers are never watching at the same time.
    pub fn on_app_state(&mut self, active: bool) -> TrackingMode {
        self.mode = if active {
            self.background.stop();
            self.foreground.start();
            if self.foreground.is_watching() {
                TrackingMode::Foreground
            } else {
                TrackingMode::None
            }
        } else {
            self.foreground.stop();
            match self.background.start() {
                BackgroundStart::Started | BackgroundStart::AlreadyRunning => {
                    TrackingMode::Background
                }
                _ => TrackingMode::None,
            }
        };

        info!("App active: {active}, tracking mode now {:?}", self.mode);

        self.mode
    }

    /// Whether an event from `tracker`'s watch under `generation` should still be applied
    pub fn accepts(&self, tracker: TrackerKind, generation: u64) -> bool {
        match tracker {
            TrackerKind::Foreground => self.foreground.accepts(generation),
            TrackerKind::Background => self.background.accepts(generation),
        }
    }

    /// Whether `generation` is the latest watch `tracker` has attempted, running or not
    pub fn is_current(&self, tracker: TrackerKind, generation: u64) -> bool {
        match tracker {
            TrackerKind::Foreground => self.foreground.generation() == generation,
            TrackerKind::Background => self.background.generation() == generation,
        }
    }

    pub fn stop_all(&mut self) {
        self.foreground.stop();
        self.background.stop();
        self.mode = TrackingMode::None;
    }
}
