use std::sync::Arc;

use log::{info, warn};

use crate::{
    bus::{EventBus, PipelineEvent, TrackerKind},
    location::{PositionOptions, PositionSource, Subscription},
};

/// Continuous watch on a [PositionSource] while the app is visible. Every reading is published
/// to the [EventBus], deciding whether to send it is not this tracker's job.
pub struct ForegroundTracker<P: PositionSource> {
    source: Arc<P>,
    bus: EventBus,
    options: PositionOptions,
    subscription: Option<Subscription>,
    generation: u64,
}

impl<P: PositionSource> ForegroundTracker<P> {
    pub fn new(source: Arc<P>, bus: EventBus, options: PositionOptions) -> Self {
        Self {
            source,
            bus,
            options,
            subscription: None,
            generation: 0,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether an event tagged with `generation` comes from the watch we still hold
    pub fn accepts(&self, generation: u64) -> bool {
        self.is_watching() && self.generation == generation
    }

    /// Start watching, does nothing if already watching. A watch that fails to register is
    /// published as [PipelineEvent::WatchFailed] and leaves the tracker stopped.
    pub fn start(&mut self) {
        if self.is_watching() {
            return;
        }

        self.generation += 1;
        let sink = self.bus.watch_sink(TrackerKind::Foreground, self.generation);

        match Subscription::watch(self.source.as_ref(), self.options, sink) {
            Ok(subscription) => {
                info!("Started foreground tracking (watch {})", subscription.id());
                self.subscription = Some(subscription);
            }
            Err(error) => {
                warn!("Couldn't start foreground tracking: {error}");
                self.bus.publish(PipelineEvent::WatchFailed {
                    tracker: TrackerKind::Foreground,
                    generation: self.generation,
                    error,
                });
            }
        }
    }

    /// Stop watching, safe to call when already stopped
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unwatch(self.source.as_ref());
            info!("Stopped foreground tracking (watch {})", subscription.id());
        }
    }
}
