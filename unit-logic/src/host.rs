use crate::bus::TrackerKind;

/// Signals the pipeline raises towards the host application
pub trait HostSignals: Send + Sync + 'static {
    /// A status was committed, the host should reload the unit's current status
    fn refresh_current_status(&self);
    /// Location access was denied, the host should offer a way to the platform's settings
    fn location_permission_denied(&self, tracker: TrackerKind);
    /// A status submission failed and was discarded
    fn status_submission_failed(&self, reason: &str);
    /// The status workflow moved to another step
    fn submission_state_changed(&self) {}
}
