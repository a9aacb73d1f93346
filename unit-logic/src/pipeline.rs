use std::sync::Arc;

use log::{debug, info, warn};
use tokio::{
    sync::{Mutex, watch},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    background::{BackgroundTracker, BackgroundWatcher},
    bus::{EventBus, EventReceiver, PipelineEvent, TrackerKind},
    coordinator::StatusSubmissionCoordinator,
    foreground::ForegroundTracker,
    host::HostSignals,
    lifecycle::{LifecycleController, TrackingMode, TrackingSession},
    location::{self, GeoLocation, LocationError, PositionSource},
    prelude::*,
    remote::{RemoteSync, UnitLocationReport},
    settings::{SettingsStore, TrackingConfig},
    throttle::{ThrottledReporter, send_location},
};

/// Owns the trackers and the reporter and applies every [PipelineEvent] on one logical thread.
/// Platform callbacks and the host only publish to the [EventBus], [TelemetryPipeline::main_loop]
/// is what acts on it. Location sends run on their own tasks so a slow request never holds up a
/// tracker switch.
pub struct TelemetryPipeline<
    P: PositionSource,
    W: BackgroundWatcher,
    S: SettingsStore,
    R: RemoteSync,
    H: HostSignals,
> {
    source: Arc<P>,
    settings: Arc<S>,
    remote: Arc<R>,
    host: Arc<H>,
    lifecycle: Mutex<LifecycleController<P, W, S>>,
    reporter: Mutex<ThrottledReporter<S>>,
    sends: Mutex<JoinSet<()>>,
    bus: EventBus,
    events: Mutex<EventReceiver>,
    position: watch::Sender<Option<GeoLocation>>,
    cancel: CancellationToken,
}

impl<P: PositionSource, W: BackgroundWatcher, S: SettingsStore, R: RemoteSync, H: HostSignals>
    TelemetryPipeline<P, W, S, R, H>
{
    pub fn new(
        config: TrackingConfig,
        source: Arc<P>,
        watcher: Arc<W>,
        settings: Arc<S>,
        remote: Arc<R>,
        host: Arc<H>,
    ) -> Self {
        let (bus, events) = EventBus::channel();

        let foreground = ForegroundTracker::new(source.clone(), bus.clone(), config.foreground);
        let background = BackgroundTracker::new(
            watcher,
            settings.clone(),
            bus.clone(),
            config.background.clone(),
        );
        let reporter = ThrottledReporter::new(&config, settings.clone());

        Self {
            source,
            settings,
            remote,
            host,
            lifecycle: Mutex::new(LifecycleController::new(foreground, background)),
            reporter: Mutex::new(reporter),
            sends: Mutex::new(JoinSet::new()),
            bus,
            events: Mutex::new(events),
            position: watch::Sender::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Tell the pipeline the host app became active or inactive
    pub fn set_app_active(&self, active: bool) {
        self.bus.publish(PipelineEvent::AppStateChanged(active));
    }

    /// Most recent usable reading from any source
    pub fn latest_position(&self) -> Option<GeoLocation> {
        *self.position.borrow()
    }

    pub fn position_updates(&self) -> watch::Receiver<Option<GeoLocation>> {
        self.position.subscribe()
    }

    /// One-shot read outside of any watch, also updates [Self::latest_position]
    pub async fn current_position(&self) -> Option<GeoLocation> {
        let location = location::current_position(self.source.as_ref()).await;
        if let Some(location) = location {
            self.position.send_replace(Some(location));
        }
        location
    }

    pub async fn session(&self) -> TrackingSession {
        let active_mode = self.lifecycle.lock().await.mode();
        let last_sent_at = self.reporter.lock().await.last_sent_at();
        TrackingSession {
            active_mode,
            last_sent_at,
        }
    }

    /// Create a status coordinator that shares this pipeline's remote, settings and positions
    pub fn status_coordinator(&self) -> StatusSubmissionCoordinator<R, S, H> {
        StatusSubmissionCoordinator::new(
            self.remote.clone(),
            self.settings.clone(),
            self.host.clone(),
            self.position_updates(),
        )
    }

    /// Stop the main loop, which stops whatever tracker is running on its way out
    pub fn quit(&self) {
        self.cancel.cancel();
    }

    async fn spawn_send(&self, tracker: TrackerKind, report: UnitLocationReport) {
        let remote = self.remote.clone();
        let mut sends = self.sends.lock().await;
        while sends.try_join_next().is_some() {}
        sends.spawn(async move {
            let outcome = send_location(remote.as_ref(), tracker, report).await;
            debug!("{tracker:?} location send finished: {outcome:?}");
        });
    }

    /// Wait for every location send started so far to finish
    #[cfg(test)]
    pub(crate) async fn settle_sends(&self) {
        let mut sends = self.sends.lock().await;
        while sends.join_next().await.is_some() {}
    }

    pub(crate) async fn handle_event(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::AppStateChanged(active) => {
                let mut lifecycle = self.lifecycle.lock().await;
                let before = lifecycle.mode();
                let after = lifecycle.on_app_state(active);
                drop(lifecycle);

                if after == TrackingMode::Foreground && before != TrackingMode::Foreground {
                    self.reporter.lock().await.reset();
                }
            }
            PipelineEvent::Reading {
                tracker,
                generation,
                reading,
            } => {
                let lifecycle = self.lifecycle.lock().await;
                if !lifecycle.accepts(tracker, generation) {
                    debug!("Ignoring {tracker:?} reading from stale watch {generation}");
                    return;
                }
                let background_report = match tracker {
                    TrackerKind::Foreground => None,
                    TrackerKind::Background => lifecycle.background().location_report(&reading),
                };
                drop(lifecycle);

                self.position.send_replace(Some(reading));

                let report = match tracker {
                    TrackerKind::Foreground => {
                        let admitted = self.reporter.lock().await.admit(&reading);
                        admitted
                            .inspect_err(|outcome| {
                                debug!("Foreground reading at {}: {outcome:?}", reading.timestamp)
                            })
                            .ok()
                    }
                    TrackerKind::Background => background_report,
                };

                if let Some(report) = report {
                    self.spawn_send(tracker, report).await;
                }
            }
            PipelineEvent::WatchFailed {
                tracker,
                generation,
                error,
            } => {
                if !self.lifecycle.lock().await.is_current(tracker, generation) {
                    debug!("Ignoring error from stale {tracker:?} watch {generation}: {error}");
                    return;
                }
                match error {
                    LocationError::PermissionDenied => {
                        warn!("Location permission denied for {tracker:?} tracking");
                        self.host.location_permission_denied(tracker);
                    }
                    error => warn!("{tracker:?} watch reported: {error}"),
                }
            }
        }
    }

    /// Main loop of the pipeline, applies events from the [EventBus] until [Self::quit] is called
    pub async fn main_loop(&self) -> Result {
        let mut events = self.events.lock().await;

        info!("Telemetry pipeline started");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    break;
                }

                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    self.handle_event(event).await;
                }
            }
        }

        self.lifecycle.lock().await.stop_all();

        info!("Telemetry pipeline stopped");

        Ok(())
    }
}
