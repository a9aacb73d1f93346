use std::{fmt, future::Future};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

/// A "part" of a location
pub type LocationComponent = f64;

/// Identifier the platform hands out for a running watch
pub type WatchId = u32;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, specta::Type)]
#[serde(rename_all = "camelCase")]
/// A single normalized position sample as gotten from a Geolocation API
pub struct GeoLocation {
    pub latitude: LocationComponent,
    pub longitude: LocationComponent,
    /// Horizontal accuracy in meters
    pub accuracy: Option<LocationComponent>,
    pub altitude: Option<LocationComponent>,
    pub altitude_accuracy: Option<LocationComponent>,
    /// Degrees clockwise from true north, optional as GPS can't always determine
    pub heading: Option<LocationComponent>,
    /// Meters per second
    pub speed: Option<LocationComponent>,
    /// When the platform took the fix
    pub timestamp: UtcDT,
}

impl GeoLocation {
    pub fn new(latitude: LocationComponent, longitude: LocationComponent, timestamp: UtcDT) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
            timestamp,
        }
    }

    /// Platforms report (0, 0) when they have no fix yet, such a reading is never usable.
    pub fn has_fix(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Great-circle distance to `other` in meters (haversine)
    pub fn distance_m(&self, other: &GeoLocation) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_long = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_long / 2.0).sin().powi(2);

        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
/// Why the platform couldn't give us a position
pub enum LocationError {
    /// The user (or OS policy) has not granted location access
    PermissionDenied,
    /// No fix arrived within the configured timeout
    Timeout,
    /// Anything else the platform reported
    Unavailable(String),
}

impl LocationError {
    /// Classify a free-form error message from a platform bridge
    pub fn from_platform_message(msg: &str) -> Self {
        let lower = msg.to_ascii_lowercase();
        if lower.contains("not_authorized")
            || lower.contains("permission")
            || lower.contains("denied")
        {
            Self::PermissionDenied
        } else if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout
        } else {
            Self::Unavailable(msg.to_string())
        }
    }
}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "location permission denied"),
            Self::Timeout => write!(f, "timed out waiting for a position"),
            Self::Unavailable(why) => write!(f, "position unavailable: {why}"),
        }
    }
}

impl std::error::Error for LocationError {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, specta::Type)]
#[serde(rename_all = "camelCase")]
/// Options for a continuous foreground watch
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    /// Milliseconds
    pub timeout: u32,
    /// Milliseconds, how old a cached fix may be
    pub maximum_age: u32,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: 10000,
            maximum_age: 10000,
        }
    }
}

pub type WatchEvent = Result<GeoLocation, LocationError>;

/// Callback the platform invokes for every reading or error of a watch
pub type WatchCallback = Box<dyn Fn(WatchEvent) + Send + Sync + 'static>;

/// The platform's one-shot and continuous location APIs
pub trait PositionSource: Send + Sync + 'static {
    /// Get a single fix
    fn get_current_position(
        &self,
    ) -> impl Future<Output = Result<GeoLocation, LocationError>> + Send;
    /// Start a continuous watch, errors after registration go to the callback
    fn watch_position(
        &self,
        options: PositionOptions,
        callback: WatchCallback,
    ) -> Result<WatchId, LocationError>;
    /// Stop a watch previously started with [PositionSource::watch_position]
    fn clear_watch(&self, id: WatchId) -> Result<(), LocationError>;
}

/// One-shot read. Never fails: permission problems, timeouts and (0, 0) fixes all come back as
/// `None` and get logged.
pub async fn current_position<P: PositionSource>(source: &P) -> Option<GeoLocation> {
    match source.get_current_position().await {
        Ok(location) if location.has_fix() => Some(location),
        Ok(_) => {
            debug!("Current position has no fix, ignoring");
            None
        }
        Err(why) => {
            warn!("Failed to get current position: {why}");
            None
        }
    }
}

/// Wrap a consumer so it stops seeing events once `token` is cancelled and never sees a reading
/// without a fix.
pub(crate) fn guard_callback(
    token: CancellationToken,
    on_event: impl Fn(WatchEvent) + Send + Sync + 'static,
) -> WatchCallback {
    Box::new(move |event| {
        if token.is_cancelled() {
            return;
        }
        match event {
            Ok(location) if !location.has_fix() => {
                debug!("Dropping reading without a fix");
            }
            event => on_event(event),
        }
    })
}

/// A running watch on a [PositionSource]
#[derive(Debug)]
pub struct Subscription {
    id: WatchId,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn watch<P: PositionSource>(
        source: &P,
        options: PositionOptions,
        on_event: impl Fn(WatchEvent) + Send + Sync + 'static,
    ) -> Result<Self, LocationError> {
        let cancel = CancellationToken::new();
        let callback = guard_callback(cancel.clone(), on_event);
        let id = source.watch_position(options, callback)?;
        Ok(Self { id, cancel })
    }

    pub fn id(&self) -> WatchId {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the watch. Late callbacks from the platform are swallowed from here on, calling
    /// this again is a no-op.
    pub fn unwatch<P: PositionSource>(&self, source: &P) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Err(why) = source.clear_watch(self.id) {
            warn!("Failed to clear position watch {}: {why}", self.id);
        }
    }
}

/// Passes a reading only when it is at least `min_distance_m` away from the last one passed
#[derive(Debug, Clone)]
pub struct DistanceFilter {
    min_distance_m: f64,
    last: Option<GeoLocation>,
}

impl DistanceFilter {
    pub fn new(min_distance_m: f64) -> Self {
        Self {
            min_distance_m,
            last: None,
        }
    }

    pub fn accept(&mut self, location: &GeoLocation) -> bool {
        let pass = self
            .last
            .is_none_or(|last| last.distance_m(location) >= self.min_distance_m);

        if pass {
            self.last = Some(*location);
        }

        pass
    }
}
