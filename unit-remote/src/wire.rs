use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use unit_logic::{GeoLocation, LocationComponent, UnitLocationReport, UnitStatusReport, UtcDT};

/// Sent when a status isn't responding to anything in particular
const NO_DESTINATION: &str = "0";

/// `Mon, 01 Jan 2024 00:00:00 GMT`
pub fn gmt_timestamp(dt: &UtcDT) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// RFC 3339 with milliseconds in the device's local time
pub fn iso_timestamp(dt: &UtcDT) -> String {
    dt.with_timezone(&Local)
        .to_rfc3339_opts(SecondsFormat::Millis, false)
}

fn component(c: Option<LocationComponent>) -> Option<String> {
    c.map(|c| c.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
/// Body of `UnitLocation/SetUnitLocation`, the API wants every value as a string
pub struct SaveUnitLocationInput {
    pub unit_id: String,
    pub timestamp: String,
    pub latitude: String,
    pub longitude: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_accuracy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
}

impl From<UnitLocationReport> for SaveUnitLocationInput {
    fn from(report: UnitLocationReport) -> Self {
        Self {
            unit_id: report.unit_id,
            timestamp: gmt_timestamp(&report.timestamp),
            latitude: report.latitude.to_string(),
            longitude: report.longitude.to_string(),
            accuracy: component(report.accuracy),
            altitude: component(report.altitude),
            altitude_accuracy: component(report.altitude_accuracy),
            speed: component(report.speed),
            heading: component(report.heading),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
/// Body of `UnitStatus/SaveUnitStatus`
pub struct SaveUnitStatusInput {
    /// Unit id
    pub id: String,
    /// Status id
    #[serde(rename = "Type")]
    pub status_type: String,
    pub timestamp: String,
    pub timestamp_utc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub responding_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_accuracy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
}

impl From<UnitStatusReport> for SaveUnitStatusInput {
    fn from(report: UnitStatusReport) -> Self {
        let loc = report.location.as_ref();
        let part = |f: fn(&GeoLocation) -> Option<LocationComponent>| component(loc.and_then(f));

        Self {
            id: report.unit_id,
            status_type: report.status_type_id.to_string(),
            timestamp: iso_timestamp(&report.timestamp),
            timestamp_utc: gmt_timestamp(&report.timestamp),
            note: report.note,
            responding_to: report
                .responding_to_id
                .unwrap_or_else(|| NO_DESTINATION.to_string()),
            latitude: part(|l| Some(l.latitude)),
            longitude: part(|l| Some(l.longitude)),
            accuracy: part(|l| l.accuracy),
            altitude: part(|l| l.altitude),
            altitude_accuracy: part(|l| l.altitude_accuracy),
            speed: part(|l| l.speed),
            heading: part(|l| l.heading),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serde_json::{Value, json};

    use super::*;

    fn new_year() -> UtcDT {
        DateTime::from_timestamp(1_704_067_200, 0).unwrap()
    }

    #[test]
    fn test_gmt_format() {
        assert_eq!(gmt_timestamp(&new_year()), "Mon, 01 Jan 2024 00:00:00 GMT");
    }

    #[test]
    fn test_iso_is_same_instant() {
        let iso = iso_timestamp(&new_year());
        let parsed = DateTime::parse_from_rfc3339(&iso).expect("Not RFC 3339");
        assert_eq!(parsed, new_year());
        assert!(iso.contains(".000"), "Missing milliseconds in {iso}");
    }

    #[test]
    fn test_location_payload() {
        let report = UnitLocationReport {
            unit_id: "7".to_string(),
            timestamp: new_year(),
            latitude: 40.5,
            longitude: -74.25,
            accuracy: Some(5.0),
            altitude: None,
            altitude_accuracy: None,
            speed: Some(1.5),
            heading: None,
        };

        let value = serde_json::to_value(SaveUnitLocationInput::from(report)).unwrap();

        assert_eq!(
            value,
            json!({
                "UnitId": "7",
                "Timestamp": "Mon, 01 Jan 2024 00:00:00 GMT",
                "Latitude": "40.5",
                "Longitude": "-74.25",
                "Accuracy": "5",
                "Speed": "1.5",
            })
        );
    }

    #[test]
    fn test_status_payload_with_location() {
        let location = GeoLocation {
            heading: Some(270.0),
            altitude: Some(12.0),
            ..GeoLocation::new(40.5, -74.25, new_year())
        };
        let report = UnitStatusReport {
            unit_id: "7".to_string(),
            status_type_id: 3,
            timestamp: new_year(),
            note: Some("On scene".to_string()),
            location: Some(location),
            responding_to_id: Some("500".to_string()),
        };

        let value = serde_json::to_value(SaveUnitStatusInput::from(report)).unwrap();

        assert_eq!(value["Id"], "7");
        assert_eq!(value["Type"], "3");
        assert_eq!(value["TimestampUtc"], "Mon, 01 Jan 2024 00:00:00 GMT");
        assert_eq!(value["Note"], "On scene");
        assert_eq!(value["RespondingTo"], "500");
        assert_eq!(value["Latitude"], "40.5");
        assert_eq!(value["Heading"], "270");
        assert_eq!(value["Altitude"], "12");
        assert_eq!(value.get("Speed"), None);
        assert_eq!(value.get("AltitudeAccuracy"), None);
    }

    #[test]
    fn test_status_payload_bare() {
        let report = UnitStatusReport {
            unit_id: "7".to_string(),
            status_type_id: 1,
            timestamp: new_year(),
            note: None,
            location: None,
            responding_to_id: None,
        };

        let value = serde_json::to_value(SaveUnitStatusInput::from(report)).unwrap();
        let Value::Object(fields) = value else {
            panic!("Payload is not an object");
        };

        let mut keys = fields.keys().map(String::as_str).collect::<Vec<_>>();
        keys.sort();
        assert_eq!(keys, vec!["Id", "RespondingTo", "Timestamp", "TimestampUtc", "Type"]);
        assert_eq!(fields["RespondingTo"], "0");
    }
}
