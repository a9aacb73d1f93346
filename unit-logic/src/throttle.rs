use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    bus::TrackerKind,
    location::{GeoLocation, UtcDT},
    remote::{RemoteSync, UnitLocationReport},
    settings::{SettingsStore, TrackingConfig},
};

/// Minimum-interval gate driven by reading arrival rather than a clock tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendGate {
    window_ms: f64,
    windows: f64,
    last_sent_at: Option<UtcDT>,
}

impl SendGate {
    pub fn new(window_ms: u32, windows: u32) -> Self {
        Self {
            window_ms: window_ms as f64,
            windows: windows as f64,
            last_sent_at: None,
        }
    }

    pub fn last_sent_at(&self) -> Option<UtcDT> {
        self.last_sent_at
    }

    /// Forget the last send, the next reading is admitted unconditionally
    pub fn reset(&mut self) {
        self.last_sent_at = None;
    }

    /// Decide whether a reading taken at `at` may be sent, recording `at` if so
    pub fn admit(&mut self, at: UtcDT) -> bool {
        let admit = match self.last_sent_at {
            None => true,
            Some(last) => {
                let elapsed_windows = (at - last).num_milliseconds() as f64 / self.window_ms;
                debug!("{elapsed_windows:.2} throttle windows since last location send");
                elapsed_windows >= self.windows
            }
        };

        if admit {
            self.last_sent_at = Some(at);
        }

        admit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What happened to a reading handed to the [ThrottledReporter]
pub enum ReportOutcome {
    Sent,
    /// Admitted by the gate, but the transport failed. Not retried.
    SendFailed,
    Throttled,
    NoFix,
    NoActiveUnit,
}

/// Holds back foreground readings so they reach [RemoteSync] no more often than the [SendGate]
/// allows. Only decides, the send itself is done with [send_location] so the caller can run it
/// off its own task.
pub struct ThrottledReporter<S: SettingsStore> {
    settings: Arc<S>,
    gate: SendGate,
}

impl<S: SettingsStore> ThrottledReporter<S> {
    pub fn new(config: &TrackingConfig, settings: Arc<S>) -> Self {
        Self {
            settings,
            gate: SendGate::new(config.throttle_window_ms, config.throttle_windows),
        }
    }

    pub fn last_sent_at(&self) -> Option<UtcDT> {
        self.gate.last_sent_at()
    }

    pub fn reset(&mut self) {
        self.gate.reset();
    }

    /// Run a reading through the fix, unit and gate checks. Returns the report to send, or why
    /// nothing should be sent.
    pub fn admit(&mut self, reading: &GeoLocation) -> Result<UnitLocationReport, ReportOutcome> {
        if !reading.has_fix() {
            debug!("Not reporting reading without a fix");
            return Err(ReportOutcome::NoFix);
        }

        let Some(unit_id) = self.settings.active_unit_id() else {
            debug!("No active unit, not reporting location");
            return Err(ReportOutcome::NoActiveUnit);
        };

        if !self.gate.admit(reading.timestamp) {
            return Err(ReportOutcome::Throttled);
        }

        Ok(UnitLocationReport::from_reading(unit_id, reading))
    }
}

/// Send a location report once, failures are logged and dropped
pub async fn send_location<R: RemoteSync>(
    remote: &R,
    tracker: TrackerKind,
    report: UnitLocationReport,
) -> ReportOutcome {
    match remote.save_unit_location(report).await {
        Ok(_) => {
            info!("Sent {tracker:?} location");
            ReportOutcome::Sent
        }
        Err(why) => {
            warn!("Failed to send {tracker:?} location: {why:?}");
            ReportOutcome::SendFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{MockRemote, MockSettings, at_ms};
    use tokio::test;

    fn mk_reporter() -> (ThrottledReporter<MockSettings>, Arc<MockRemote>) {
        let remote = Arc::new(MockRemote::default());
        let settings = Arc::new(MockSettings::new(false, Some("12")));
        let reporter = ThrottledReporter::new(&TrackingConfig::default(), settings);
        (reporter, remote)
    }

    async fn report(
        reporter: &mut ThrottledReporter<MockSettings>,
        remote: &MockRemote,
        reading: GeoLocation,
    ) -> ReportOutcome {
        match reporter.admit(&reading) {
            Ok(report) => send_location(remote, TrackerKind::Foreground, report).await,
            Err(outcome) => outcome,
        }
    }

    #[test]
    async fn test_gate_cold_start() {
        let mut gate = SendGate::new(30_000, 2);
        assert!(gate.admit(at_ms(123_456)), "First reading must always pass");
        assert_eq!(gate.last_sent_at(), Some(at_ms(123_456)));
    }

    #[test]
    async fn test_gate_boundary() {
        let mut gate = SendGate::new(30_000, 2);
        assert!(gate.admit(at_ms(0)));
        assert!(!gate.admit(at_ms(59_999)));
        assert_eq!(gate.last_sent_at(), Some(at_ms(0)), "Dropped reading moved lastSentAt");
        assert!(gate.admit(at_ms(60_000)), "Exactly two windows should pass");
        assert_eq!(gate.last_sent_at(), Some(at_ms(60_000)));
    }

    #[test]
    async fn test_gate_measures_from_last_send() {
        let mut gate = SendGate::new(30_000, 2);
        let mut sent = Vec::new();
        for t in (0..=200_000).step_by(15_000) {
            if gate.admit(at_ms(t)) {
                sent.push(t);
            }
        }
        assert_eq!(sent, vec![0, 60_000, 120_000, 180_000]);
    }

    #[test]
    async fn test_gate_reset() {
        let mut gate = SendGate::new(30_000, 2);
        assert!(gate.admit(at_ms(0)));
        gate.reset();
        assert!(gate.admit(at_ms(1)), "Reading after reset was delayed");
    }

    #[test]
    async fn test_sends_after_two_windows() {
        let (mut reporter, remote) = mk_reporter();

        let readings = [
            GeoLocation::new(40.0, -74.0, at_ms(0)),
            GeoLocation::new(40.001, -74.001, at_ms(10_000)),
            GeoLocation::new(40.002, -74.002, at_ms(65_000)),
        ];

        let mut outcomes = Vec::new();
        for reading in readings {
            outcomes.push(report(&mut reporter, &remote, reading).await);
        }

        assert_eq!(
            outcomes,
            vec![
                ReportOutcome::Sent,
                ReportOutcome::Throttled,
                ReportOutcome::Sent
            ]
        );
        let sent = remote.locations();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].timestamp, at_ms(0));
        assert_eq!(sent[1].timestamp, at_ms(65_000));
        assert_eq!(sent[1].latitude, 40.002);
        assert_eq!(sent[1].unit_id, "12");
    }

    #[test]
    async fn test_zero_reading_never_sent() {
        let (mut reporter, remote) = mk_reporter();

        let outcome = report(&mut reporter, &remote, GeoLocation::new(0.0, 0.0, at_ms(0))).await;

        assert_eq!(outcome, ReportOutcome::NoFix);
        assert!(remote.locations().is_empty());
        assert_eq!(reporter.last_sent_at(), None);
    }

    #[test]
    async fn test_no_unit_leaves_gate_alone() {
        let remote = Arc::new(MockRemote::default());
        let settings = Arc::new(MockSettings::new(false, None));
        let mut reporter = ThrottledReporter::new(&TrackingConfig::default(), settings.clone());

        let outcome = report(&mut reporter, &remote, GeoLocation::new(40.0, -74.0, at_ms(0))).await;
        assert_eq!(outcome, ReportOutcome::NoActiveUnit);
        assert_eq!(reporter.last_sent_at(), None);

        settings.set_unit(Some("4"));
        let outcome = report(&mut reporter, &remote, GeoLocation::new(40.0, -74.0, at_ms(1_000))).await;
        assert_eq!(outcome, ReportOutcome::Sent);
    }

    #[test]
    async fn test_transport_failure_is_dropped() {
        let (mut reporter, remote) = mk_reporter();
        remote.set_failing(true);

        let outcome = report(&mut reporter, &remote, GeoLocation::new(40.0, -74.0, at_ms(0))).await;
        assert_eq!(outcome, ReportOutcome::SendFailed);
        assert_eq!(reporter.last_sent_at(), Some(at_ms(0)));

        remote.set_failing(false);
        let outcome = report(&mut reporter, &remote, GeoLocation::new(40.0, -74.0, at_ms(5_000))).await;
        assert_eq!(outcome, ReportOutcome::Throttled, "Failed send should not be retried early");
    }

    #[test]
    async fn test_optional_fields_carried() {
        let (mut reporter, remote) = mk_reporter();
        let reading = GeoLocation {
            accuracy: Some(5.0),
            speed: Some(12.5),
            heading: Some(90.0),
            ..GeoLocation::new(40.0, -74.0, at_ms(0))
        };

        report(&mut reporter, &remote, reading).await;

        let sent = &remote.locations()[0];
        assert_eq!(sent.accuracy, Some(5.0));
        assert_eq!(sent.speed, Some(12.5));
        assert_eq!(sent.heading, Some(90.0));
        assert_eq!(sent.altitude, None);
    }
}
