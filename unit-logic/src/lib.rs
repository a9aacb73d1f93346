mod background;
mod bus;
mod coordinator;
mod foreground;
mod host;
mod lifecycle;
mod location;
mod pipeline;
mod remote;
mod settings;
mod status;
mod throttle;

pub use background::{BackgroundStart, BackgroundTracker, BackgroundWatcher};
pub use bus::{EventBus, PipelineEvent, TrackerKind};
pub use coordinator::StatusSubmissionCoordinator;
pub use foreground::ForegroundTracker;
pub use host::HostSignals;
pub use lifecycle::{LifecycleController, TrackingMode, TrackingSession};
pub use location::{
    DistanceFilter, GeoLocation, LocationComponent, LocationError, PositionOptions,
    PositionSource, Subscription, UtcDT, WatchCallback, WatchEvent, WatchId, current_position,
};
pub use pipeline::TelemetryPipeline;
pub use remote::{RemoteSync, UnitLocationReport, UnitStatusReport};
pub use settings::{BackgroundWatchOptions, SettingsStore, TrackingConfig};
pub use status::{
    Destination, DestinationKind, DetailRequirement, KnownDestinations, NoteRequirement,
    OpenCall, STATION_GROUP_TYPE, StationGroup, StatusDraft, StatusWorkflow, SubmissionState,
    UnitStatusDefinition, WorkflowError,
};
pub use throttle::{ReportOutcome, SendGate, ThrottledReporter, send_location};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
