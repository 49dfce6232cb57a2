//! Core data types for the `trunkr` monitor

use serde::{Deserialize, Serialize};
use std::fmt;

/// Talkgroup identifier type
pub type TalkgroupId = i32;

/// Radio unit identifier type
pub type RadioId = i64;

/// Seconds since the Unix epoch
pub type UnixSeconds = i64;

/// Action reported by a radio unit
///
/// Unknown actions coming from the trunking system are preserved verbatim
/// in [`UnitAction::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UnitAction {
    /// Voice call initiation
    Call,
    /// Unit joining a call
    Join,
    /// Unit power on / login
    On,
    /// Unit power off / logout
    Off,
    /// Answer request
    AnsReq,
    /// Location update
    Location,
    /// Data transmission
    Data,
    /// Acknowledgment response
    AckResp,
    /// Any other action string
    Other(String),
}

impl UnitAction {
    /// Wire name of the action
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Call => "call",
            Self::Join => "join",
            Self::On => "on",
            Self::Off => "off",
            Self::AnsReq => "ans_req",
            Self::Location => "location",
            Self::Data => "data",
            Self::AckResp => "ackresp",
            Self::Other(other) => other,
        }
    }

    /// Whether this action starts a voice call
    #[must_use]
    pub const fn is_call(&self) -> bool {
        matches!(self, Self::Call)
    }
}

impl From<&str> for UnitAction {
    fn from(value: &str) -> Self {
        match value {
            "call" => Self::Call,
            "join" => Self::Join,
            "on" => Self::On,
            "off" => Self::Off,
            "ans_req" => Self::AnsReq,
            "location" => Self::Location,
            "data" => Self::Data,
            "ackresp" => Self::AckResp,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for UnitAction {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<UnitAction> for String {
    fn from(value: UnitAction) -> Self {
        match value {
            UnitAction::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two logical change streams the monitor follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Unit activity events
    Units,
    /// Completed call records
    Calls,
}

impl StreamKind {
    /// Both streams, units first
    pub const ALL: [Self; 2] = [Self::Units, Self::Calls];

    /// Stream name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Units => "units",
            Self::Calls => "calls",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single radio unit action appended by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitActivityEvent {
    /// Store-assigned identifier
    #[serde(default)]
    pub id: Option<i64>,

    /// When the action happened
    pub timestamp: UnixSeconds,

    /// Radio unit that performed the action
    pub radio_id: RadioId,

    /// What the unit did
    pub action: UnitAction,

    /// Talkgroup the action relates to
    #[serde(default)]
    pub talkgroup: Option<TalkgroupId>,

    /// Source reported for non-talkgroup actions
    #[serde(default)]
    pub source: Option<i64>,
}

/// Authoritative record of a finished transmission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedCallRecord {
    /// Store-assigned identifier
    #[serde(default)]
    pub id: Option<i64>,

    /// Talkgroup the call was on
    pub talkgroup: TalkgroupId,

    /// Call start
    pub start_time: UnixSeconds,

    /// Call length in seconds
    #[serde(default)]
    pub call_length: Option<i64>,

    /// Transcribed text; absent for encrypted calls
    #[serde(default)]
    pub transcription: Option<String>,

    /// Talkgroup description copied at ingestion time
    #[serde(default)]
    pub talkgroup_description: Option<String>,

    /// Units that keyed up during the call, in order
    #[serde(default)]
    pub src_list: Vec<RadioId>,
}

impl CompletedCallRecord {
    /// `start_time + call_length`, counting a missing length as zero
    ///
    /// Saturates at the bounds of [`UnixSeconds`] for corrupt rows.
    #[must_use]
    pub const fn end_time(&self) -> UnixSeconds {
        let call_length = match self.call_length {
            Some(length) => length,
            None => 0,
        };
        self.start_time.saturating_add(call_length)
    }

    /// Calls without a transcription are encrypted
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.transcription.is_none()
    }
}

/// Talkgroup reference data keyed by its decimal code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalkgroupInfo {
    /// Decimal talkgroup code
    pub decimal: TalkgroupId,

    /// Short display tag
    pub alpha_tag: Option<String>,

    /// Long description
    pub description: Option<String>,
}

/// A talkgroup currently inferred to be transmitting
///
/// Sessions are derived from the trailing window of unit activity and rebuilt
/// from scratch on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCallSession {
    /// Talkgroup
    pub talkgroup: TalkgroupId,

    /// Earliest call event for the talkgroup inside the window
    pub start_time: UnixSeconds,

    /// Latest call event for the talkgroup inside the window
    pub latest_time: UnixSeconds,

    /// Unit behind the earliest call event
    pub initiating_unit: RadioId,

    /// Alpha tag from talkgroup reference data
    pub alpha_tag: Option<String>,
}

/// Read-only copy of the derived views handed to observers and renderers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Active sessions sorted by talkgroup
    pub active_calls: Vec<ActiveCallSession>,

    /// Completed calls, newest first
    pub recent_calls: Vec<CompletedCallRecord>,

    /// Unit activity, newest first
    pub recent_units: Vec<UnitActivityEvent>,

    /// Wall-clock time of the last committed refresh
    pub refreshed_at: Option<UnixSeconds>,
}
