use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::location::{GeoLocation, LocationError, WatchEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
/// One of the two mutually exclusive position watching strategies
pub enum TrackerKind {
    Foreground,
    Background,
}

#[derive(Debug, Clone, PartialEq)]
/// Everything that flows into the pipeline's main loop
pub enum PipelineEvent {
    /// The host app became active (`true`) or went to the background (`false`)
    AppStateChanged(bool),
    /// A reading from the watch of `tracker` started under `generation`
    Reading {
        tracker: TrackerKind,
        generation: u64,
        reading: GeoLocation,
    },
    /// The watch of `tracker` started under `generation` reported an error, or failed to start
    WatchFailed {
        tracker: TrackerKind,
        generation: u64,
        error: LocationError,
    },
}

pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Sending half of the pipeline's event channel. Platform callbacks only ever publish here, the
/// main loop is the one place events get applied.
#[derive(Debug, Clone)]
pub struct EventBus(mpsc::UnboundedSender<PipelineEvent>);

impl EventBus {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn publish(&self, event: PipelineEvent) {
        if self.0.send(event).is_err() {
            debug!("Pipeline is not running, dropping event");
        }
    }

    /// Build a watch consumer that tags everything it sees with `tracker` and `generation`
    pub fn watch_sink(
        &self,
        tracker: TrackerKind,
        generation: u64,
    ) -> impl Fn(WatchEvent) + Send + Sync + 'static {
        let bus = self.clone();
        move |event| {
            let event = match event {
                Ok(reading) => PipelineEvent::Reading {
                    tracker,
                    generation,
                    reading,
                },
                Err(error) => PipelineEvent::WatchFailed {
                    tracker,
                    generation,
                    error,
                },
            };
            bus.publish(event);
        }
    }
}
