use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
    location::{GeoLocation, LocationComponent, UtcDT},
    prelude::*,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// A status-free position ping for a unit
pub struct UnitLocationReport {
    pub unit_id: String,
    pub timestamp: UtcDT,
    pub latitude: LocationComponent,
    pub longitude: LocationComponent,
    pub accuracy: Option<LocationComponent>,
    pub altitude: Option<LocationComponent>,
    pub altitude_accuracy: Option<LocationComponent>,
    pub speed: Option<LocationComponent>,
    pub heading: Option<LocationComponent>,
}

impl UnitLocationReport {
    pub fn from_reading(unit_id: impl Into<String>, reading: &GeoLocation) -> Self {
        Self {
            unit_id: unit_id.into(),
            timestamp: reading.timestamp,
            latitude: reading.latitude,
            longitude: reading.longitude,
            accuracy: reading.accuracy,
            altitude: reading.altitude,
            altitude_accuracy: reading.altitude_accuracy,
            speed: reading.speed,
            heading: reading.heading,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// A fully populated status change for a unit
pub struct UnitStatusReport {
    pub unit_id: String,
    pub status_type_id: u32,
    /// When the user committed the status
    pub timestamp: UtcDT,
    pub note: Option<String>,
    /// Most recent known position at commit time, each of its optional fields is sent only when
    /// present
    pub location: Option<GeoLocation>,
    /// Station or call the unit is responding to
    pub responding_to_id: Option<String>,
}

/// Remote operations the pipeline needs from the dispatch API
pub trait RemoteSync: Send + Sync + 'static {
    /// Save a position ping for a unit
    fn save_unit_location(&self, report: UnitLocationReport)
    -> impl Future<Output = Result> + Send;
    /// Save a status change for a unit
    fn save_unit_status(&self, report: UnitStatusReport) -> impl Future<Output = Result> + Send;
}
