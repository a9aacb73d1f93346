use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    location::{GeoLocation, UtcDT},
    remote::UnitStatusReport,
};

/// Group type id the server uses for stations
pub const STATION_GROUP_TYPE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
/// What kind of destination a status asks the user to pick
pub enum DetailRequirement {
    None,
    Stations,
    Calls,
    StationsAndCalls,
}

impl TryFrom<u8> for DetailRequirement {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Stations),
            2 => Ok(Self::Calls),
            3 => Ok(Self::StationsAndCalls),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
/// Whether a status asks the user for a note
pub enum NoteRequirement {
    None,
    Optional,
    Required,
}

impl TryFrom<u8> for NoteRequirement {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Optional),
            2 => Ok(Self::Required),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// A status the server lets this unit set, read-only to us
pub struct UnitStatusDefinition {
    pub id: u32,
    pub name: String,
    pub detail: DetailRequirement,
    pub note: NoteRequirement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
pub enum DestinationKind {
    Station,
    Call,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// A station or open call a status report can be responding to
pub struct Destination {
    pub id: String,
    pub name: String,
    pub kind: DestinationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct StationGroup {
    pub id: String,
    pub name: String,
    pub type_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct OpenCall {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// Groups and calls known at the moment a submission starts
pub struct KnownDestinations {
    pub groups: Vec<StationGroup>,
    pub calls: Vec<OpenCall>,
}

impl KnownDestinations {
    fn stations(&self) -> impl Iterator<Item = Destination> + '_ {
        self.groups
            .iter()
            .filter(|g| g.type_id == STATION_GROUP_TYPE)
            .map(|g| Destination {
                id: g.id.clone(),
                name: g.name.clone(),
                kind: DestinationKind::Station,
            })
    }

    fn calls(&self) -> impl Iterator<Item = Destination> + '_ {
        self.calls.iter().map(|c| Destination {
            id: c.id.clone(),
            name: c.name.clone(),
            kind: DestinationKind::Call,
        })
    }

    /// Destinations the user may choose from for a status with `detail`
    pub fn candidates(&self, detail: DetailRequirement) -> Vec<Destination> {
        match detail {
            DetailRequirement::None => vec![],
            DetailRequirement::Stations => self.stations().collect(),
            DetailRequirement::Calls => self.calls().collect(),
            DetailRequirement::StationsAndCalls => self.stations().chain(self.calls()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
/// The in-progress, uncommitted state of a status submission
pub struct StatusDraft {
    pub id: Uuid,
    pub status: UnitStatusDefinition,
    pub destination: Option<Destination>,
    pub note: Option<String>,
    pub location_snapshot: Option<GeoLocation>,
}

impl StatusDraft {
    fn new(status: UnitStatusDefinition) -> Self {
        Self {
            id: Uuid::new_v4(),
            status,
            destination: None,
            note: None,
            location_snapshot: None,
        }
    }

    pub fn into_report(self, unit_id: impl Into<String>, timestamp: UtcDT) -> UnitStatusReport {
        UnitStatusReport {
            unit_id: unit_id.into(),
            status_type_id: self.status.id,
            timestamp,
            note: self.note,
            location: self.location_snapshot,
            responding_to_id: self.destination.map(|d| d.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, specta::Type)]
#[serde(tag = "step", rename_all = "camelCase")]
/// Where the status submission workflow currently is
pub enum SubmissionState {
    #[default]
    Idle,
    DestinationPending {
        draft: StatusDraft,
        candidates: Vec<Destination>,
    },
    NotePending {
        draft: StatusDraft,
    },
    Committing {
        draft: StatusDraft,
    },
    Committed,
    Failed {
        reason: String,
    },
}

impl SubmissionState {
    pub fn draft(&self) -> Option<&StatusDraft> {
        match self {
            Self::DestinationPending { draft, .. }
            | Self::NotePending { draft }
            | Self::Committing { draft } => Some(draft),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::DestinationPending { .. } => "DestinationPending",
            Self::NotePending { .. } => "NotePending",
            Self::Committing { .. } => "Committing",
            Self::Committed => "Committed",
            Self::Failed { .. } => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A workflow step was requested that the current state doesn't allow
pub enum WorkflowError {
    /// Nothing is being submitted
    NoSubmission,
    /// The workflow is waiting on a different step
    UnexpectedStep(&'static str),
    /// The chosen destination is not among the candidates
    UnknownDestination(String),
    /// The status requires a non-empty note
    NoteRequired,
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSubmission => write!(f, "no status submission in progress"),
            Self::UnexpectedStep(step) => write!(f, "status submission is at step {step}"),
            Self::UnknownDestination(id) => write!(f, "{id} is not a valid destination"),
            Self::NoteRequired => write!(f, "this status requires a note"),
        }
    }
}

impl std::error::Error for WorkflowError {}

/// Guarded transitions of a status submission. Holds at most one draft.
#[derive(Debug, Default)]
pub struct StatusWorkflow {
    state: SubmissionState,
}

impl StatusWorkflow {
    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Start submitting `status`, discarding any draft still in flight
    pub fn begin(&mut self, status: UnitStatusDefinition, known: &KnownDestinations) {
        if let Some(old) = self.state.draft() {
            info!(
                "Discarding status draft {} ({}) for a new submission",
                old.id,
                self.state.name()
            );
        }

        let draft = StatusDraft::new(status);

        self.state = if draft.status.detail == DetailRequirement::None {
            Self::after_destination(draft)
        } else {
            let candidates = known.candidates(draft.status.detail);
            SubmissionState::DestinationPending { draft, candidates }
        };
    }

    fn after_destination(draft: StatusDraft) -> SubmissionState {
        if draft.status.note == NoteRequirement::None {
            SubmissionState::Committing { draft }
        } else {
            SubmissionState::NotePending { draft }
        }
    }

    fn unexpected(&self) -> WorkflowError {
        match self.state {
            SubmissionState::Idle | SubmissionState::Committed | SubmissionState::Failed { .. } => {
                WorkflowError::NoSubmission
            }
            _ => WorkflowError::UnexpectedStep(self.state.name()),
        }
    }

    /// Complete the destination step, `None` responds to nothing in particular
    pub fn select_destination(&mut self, id: Option<&str>) -> Result<(), WorkflowError> {
        let SubmissionState::DestinationPending { candidates, .. } = &self.state else {
            return Err(self.unexpected());
        };

        let destination = match id {
            Some(id) => Some(
                candidates
                    .iter()
                    .find(|c| c.id == id)
                    .cloned()
                    .ok_or_else(|| WorkflowError::UnknownDestination(id.to_string()))?,
            ),
            None => None,
        };

        if let SubmissionState::DestinationPending { mut draft, .. } = std::mem::take(&mut self.state) {
            draft.destination = destination;
            self.state = Self::after_destination(draft);
        }

        Ok(())
    }

    /// Complete the note step. An empty note is only accepted when the note is optional.
    pub fn submit_note(&mut self, note: &str) -> Result<(), WorkflowError> {
        let SubmissionState::NotePending { draft } = &self.state else {
            return Err(self.unexpected());
        };

        let note = note.trim();
        if note.is_empty() && draft.status.note == NoteRequirement::Required {
            return Err(WorkflowError::NoteRequired);
        }

        if let SubmissionState::NotePending { mut draft } = std::mem::take(&mut self.state) {
            draft.note = (!note.is_empty()).then(|| note.to_string());
            self.state = SubmissionState::Committing { draft };
        }

        Ok(())
    }

    /// Drop the current draft, if any, and go back to idle
    pub fn cancel(&mut self) {
        if let Some(draft) = self.state.draft() {
            info!("Status draft {} cancelled", draft.id);
        }
        self.state = SubmissionState::Idle;
    }

    /// If committing, snapshot `location` into the draft and hand out a copy to send
    pub fn prepare_commit(&mut self, location: Option<GeoLocation>) -> Option<StatusDraft> {
        if let SubmissionState::Committing { draft } = &mut self.state {
            if draft.location_snapshot.is_none() {
                draft.location_snapshot = location;
            }
            Some(draft.clone())
        } else {
            None
        }
    }

    /// Record the commit result for `draft_id`. Returns false (and changes nothing) if that
    /// draft was superseded while it was being sent.
    pub fn finish(&mut self, draft_id: Uuid, outcome: Result<(), String>) -> bool {
        let current = matches!(&self.state, SubmissionState::Committing { draft } if draft.id == draft_id);

        if current {
            self.state = match outcome {
                Ok(_) => SubmissionState::Committed,
                Err(reason) => SubmissionState::Failed { reason },
            };
        }

        current
    }
}
