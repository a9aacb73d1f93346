use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use log::{error, info};
use tokio::sync::{Mutex, watch};

use crate::{
    host::HostSignals,
    location::GeoLocation,
    prelude::*,
    remote::RemoteSync,
    settings::SettingsStore,
    status::{
        KnownDestinations, StatusWorkflow, SubmissionState, UnitStatusDefinition, WorkflowError,
    },
};

/// Drives a [StatusWorkflow] and commits finished drafts through [RemoteSync]
pub struct StatusSubmissionCoordinator<R: RemoteSync, S: SettingsStore, H: HostSignals> {
    workflow: Mutex<StatusWorkflow>,
    remote: Arc<R>,
    settings: Arc<S>,
    host: Arc<H>,
    position: watch::Receiver<Option<GeoLocation>>,
}

impl<R: RemoteSync, S: SettingsStore, H: HostSignals> StatusSubmissionCoordinator<R, S, H> {
    pub fn new(
        remote: Arc<R>,
        settings: Arc<S>,
        host: Arc<H>,
        position: watch::Receiver<Option<GeoLocation>>,
    ) -> Self {
        Self {
            workflow: Mutex::new(StatusWorkflow::default()),
            remote,
            settings,
            host,
            position,
        }
    }

    pub async fn state(&self) -> SubmissionState {
        self.workflow.lock().await.state().clone()
    }

    /// Start submitting `status`. Any draft already in flight is discarded. If the status needs
    /// neither a destination nor a note this commits right away.
    pub async fn submit_status(
        &self,
        status: UnitStatusDefinition,
        known: &KnownDestinations,
    ) -> SubmissionState {
        self.workflow.lock().await.begin(status, known);
        self.host.submission_state_changed();
        self.commit_if_ready().await;
        self.state().await
    }

    pub async fn select_destination(
        &self,
        id: Option<&str>,
    ) -> Result<SubmissionState, WorkflowError> {
        self.workflow.lock().await.select_destination(id)?;
        self.host.submission_state_changed();
        self.commit_if_ready().await;
        Ok(self.state().await)
    }

    pub async fn submit_note(&self, note: &str) -> Result<SubmissionState, WorkflowError> {
        self.workflow.lock().await.submit_note(note)?;
        self.host.submission_state_changed();
        self.commit_if_ready().await;
        Ok(self.state().await)
    }

    pub async fn cancel(&self) {
        self.workflow.lock().await.cancel();
        self.host.submission_state_changed();
    }

    async fn commit_if_ready(&self) {
        let location = *self.position.borrow();

        let draft = self.workflow.lock().await.prepare_commit(location);
        let Some(draft) = draft else {
            return;
        };

        let draft_id = draft.id;
        let status_id = draft.status.id;

        // The lock is released while sending so a new submission can supersede this one
        let res = match self.settings.active_unit_id() {
            Some(unit_id) => {
                let report = draft.into_report(unit_id, Utc::now());
                self.remote
                    .save_unit_status(report)
                    .await
                    .context("Failed to save unit status")
            }
            None => Err(anyhow!("No active unit to set the status for")),
        };

        let outcome = res.as_ref().map(|_| ()).map_err(|why| format!("{why:#}"));
        let current = self.workflow.lock().await.finish(draft_id, outcome);

        match res {
            Ok(_) => {
                info!("Committed status {status_id} (draft {draft_id})");
                self.host.refresh_current_status();
            }
            Err(why) => {
                error!("Status {status_id} (draft {draft_id}) failed: {why:?}");
                if current {
                    self.host.status_submission_failed(&format!("{why:#}"));
                }
            }
        }

        if current {
            self.host.submission_state_changed();
        } else {
            info!("Draft {draft_id} was superseded while committing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        status::{DetailRequirement, NoteRequirement, STATION_GROUP_TYPE, StationGroup},
        tests::{MockRemote, MockSettings, RecordingHost, at_ms, mk_status},
    };
    use crate::remote::{UnitLocationReport, UnitStatusReport};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::{sync::Notify, task::yield_now, test};

    type TestCoordinator = StatusSubmissionCoordinator<MockRemote, MockSettings, RecordingHost>;

    struct Harness {
        coordinator: TestCoordinator,
        remote: Arc<MockRemote>,
        host: Arc<RecordingHost>,
        position: watch::Sender<Option<GeoLocation>>,
    }

    impl Harness {
        fn new(unit: Option<&str>) -> Self {
            let remote = Arc::new(MockRemote::default());
            let host = Arc::new(RecordingHost::default());
            let settings = Arc::new(MockSettings::new(false, unit));
            let (position, rx) = watch::channel(None);
            Self {
                coordinator: StatusSubmissionCoordinator::new(
                    remote.clone(),
                    settings,
                    host.clone(),
                    rx,
                ),
                remote,
                host,
                position,
            }
        }
    }

    fn one_station() -> KnownDestinations {
        KnownDestinations {
            groups: vec![StationGroup {
                id: "10".to_string(),
                name: "Station 1".to_string(),
                type_id: STATION_GROUP_TYPE,
            }],
            calls: vec![],
        }
    }

    #[test]
    async fn test_immediate_commit() {
        let h = Harness::new(Some("u1"));

        let state = h
            .coordinator
            .submit_status(
                mk_status(DetailRequirement::None, NoteRequirement::None),
                &KnownDestinations::default(),
            )
            .await;

        assert_eq!(state, SubmissionState::Committed);
        let sent = h.remote.statuses();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].unit_id, "u1");
        assert_eq!(sent[0].status_type_id, 1);
        assert_eq!(sent[0].responding_to_id, None);
        assert_eq!(h.host.refreshes(), 1);
    }

    #[test]
    async fn test_station_optional_note() {
        let h = Harness::new(Some("u1"));

        let state = h
            .coordinator
            .submit_status(
                mk_status(DetailRequirement::Stations, NoteRequirement::Optional),
                &one_station(),
            )
            .await;
        let SubmissionState::DestinationPending { candidates, .. } = state else {
            panic!("Expected DestinationPending, got {state:?}");
        };
        assert_eq!(candidates.len(), 1);

        let state = h.coordinator.select_destination(Some("10")).await.unwrap();
        assert!(matches!(state, SubmissionState::NotePending { .. }));
        assert!(h.remote.statuses().is_empty(), "Committed before the note step");

        let state = h.coordinator.submit_note("").await.unwrap();
        assert_eq!(state, SubmissionState::Committed);

        let sent = h.remote.statuses();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].responding_to_id.as_deref(), Some("10"));
        assert_eq!(sent[0].note, None);
    }

    #[test]
    async fn test_required_note_blocks_commit() {
        let h = Harness::new(Some("u1"));
        h.coordinator
            .submit_status(
                mk_status(DetailRequirement::None, NoteRequirement::Required),
                &KnownDestinations::default(),
            )
            .await;

        let res = h.coordinator.submit_note("").await;
        assert_eq!(res, Err(WorkflowError::NoteRequired));
        assert!(matches!(
            h.coordinator.state().await,
            SubmissionState::NotePending { .. }
        ));
        assert!(h.remote.statuses().is_empty());
    }

    #[test]
    async fn test_second_submission_wins() {
        let h = Harness::new(Some("u1"));

        let mut first = mk_status(DetailRequirement::Stations, NoteRequirement::Required);
        first.id = 5;
        h.coordinator.submit_status(first, &one_station()).await;
        h.coordinator.select_destination(Some("10")).await.unwrap();

        let mut second = mk_status(DetailRequirement::None, NoteRequirement::Optional);
        second.id = 6;
        h.coordinator
            .submit_status(second, &KnownDestinations::default())
            .await;
        h.coordinator.submit_note("second").await.unwrap();

        let sent = h.remote.statuses();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status_type_id, 6);
        assert_eq!(sent[0].note.as_deref(), Some("second"));
        assert_eq!(sent[0].responding_to_id, None, "First draft's destination leaked");
    }

    #[test]
    async fn test_location_snapshot() {
        let h = Harness::new(Some("u1"));
        let location = GeoLocation {
            heading: Some(180.0),
            ..GeoLocation::new(40.0, -74.0, at_ms(0))
        };
        h.position.send_replace(Some(location));

        h.coordinator
            .submit_status(
                mk_status(DetailRequirement::None, NoteRequirement::None),
                &KnownDestinations::default(),
            )
            .await;

        let sent = h.remote.statuses();
        assert_eq!(sent[0].location, Some(location));
    }

    #[test]
    async fn test_no_position_omits_location() {
        let h = Harness::new(Some("u1"));
        h.coordinator
            .submit_status(
                mk_status(DetailRequirement::None, NoteRequirement::None),
                &KnownDestinations::default(),
            )
            .await;
        assert_eq!(h.remote.statuses()[0].location, None);
    }

    #[test]
    async fn test_transport_failure() {
        let h = Harness::new(Some("u1"));
        h.remote.set_failing(true);

        let state = h
            .coordinator
            .submit_status(
                mk_status(DetailRequirement::None, NoteRequirement::None),
                &KnownDestinations::default(),
            )
            .await;

        assert!(matches!(state, SubmissionState::Failed { .. }));
        assert!(state.draft().is_none());
        assert_eq!(h.host.failures().len(), 1);
        assert_eq!(h.host.refreshes(), 0);
        assert_eq!(h.remote.status_attempts(), 1, "Failed commit was retried");
    }

    #[test]
    async fn test_no_unit_fails() {
        let h = Harness::new(None);
        let state = h
            .coordinator
            .submit_status(
                mk_status(DetailRequirement::None, NoteRequirement::None),
                &KnownDestinations::default(),
            )
            .await;
        assert!(matches!(state, SubmissionState::Failed { .. }));
        assert_eq!(h.remote.status_attempts(), 0);
        assert_eq!(h.host.failures().len(), 1);
    }

    #[test]
    async fn test_cancel_then_steps_rejected() {
        let h = Harness::new(Some("u1"));
        h.coordinator
            .submit_status(
                mk_status(DetailRequirement::Calls, NoteRequirement::None),
                &KnownDestinations::default(),
            )
            .await;
        h.coordinator.cancel().await;

        assert_eq!(h.coordinator.state().await, SubmissionState::Idle);
        assert_eq!(
            h.coordinator.select_destination(None).await,
            Err(WorkflowError::NoSubmission)
        );
        assert!(h.remote.statuses().is_empty());
    }

    /// Holds every status save until released
    #[derive(Default)]
    struct GatedRemote {
        gate: Notify,
        waiting: AtomicBool,
        sent: std::sync::Mutex<Vec<UnitStatusReport>>,
    }

    impl RemoteSync for GatedRemote {
        async fn save_unit_location(&self, _report: UnitLocationReport) -> Result {
            Ok(())
        }

        async fn save_unit_status(&self, report: UnitStatusReport) -> Result {
            self.waiting.store(true, Ordering::SeqCst);
            self.gate.notified().await;
            self.sent.lock().unwrap().push(report);
            Ok(())
        }
    }

    #[test]
    async fn test_superseded_commit_keeps_new_draft() {
        let remote = Arc::new(GatedRemote::default());
        let host = Arc::new(RecordingHost::default());
        let settings = Arc::new(MockSettings::new(false, Some("u1")));
        let (_position, rx) = watch::channel(None);
        let coordinator = Arc::new(StatusSubmissionCoordinator::new(
            remote.clone(),
            settings,
            host.clone(),
            rx,
        ));

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .submit_status(
                        mk_status(DetailRequirement::None, NoteRequirement::None),
                        &KnownDestinations::default(),
                    )
                    .await
            })
        };

        while !remote.waiting.load(Ordering::SeqCst) {
            yield_now().await;
        }

        let state = coordinator
            .submit_status(
                mk_status(DetailRequirement::Stations, NoteRequirement::Optional),
                &one_station(),
            )
            .await;
        assert!(matches!(state, SubmissionState::DestinationPending { .. }));

        remote.gate.notify_one();
        let state = first.await.expect("Failed to join");

        assert!(
            matches!(state, SubmissionState::DestinationPending { .. }),
            "Old commit overwrote the new draft: {state:?}"
        );
        assert_eq!(remote.sent.lock().unwrap().len(), 1);
        assert_eq!(host.refreshes(), 1, "Successful commit should still refresh");
    }

    #[test]
    async fn test_state_change_signals() {
        let h = Harness::new(Some("u1"));
        h.coordinator
            .submit_status(
                mk_status(DetailRequirement::Calls, NoteRequirement::None),
                &KnownDestinations::default(),
            )
            .await;
        assert_eq!(h.host.state_changes(), 1);

        h.coordinator.select_destination(None).await.unwrap();
        // One for the destination step, one for the commit result
        assert_eq!(h.host.state_changes(), 3);
    }
}
