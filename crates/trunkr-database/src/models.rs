//! Database models for the `trunkr` event store

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use trunkr_core::{
    CompletedCallRecord, StreamKind, TalkgroupInfo, UnitAction, UnitActivityEvent,
};

/// Database model for unit activity rows
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UnitActivityRow {
    /// Unique identifier
    pub id: i64,

    /// Unix seconds
    pub timestamp: i64,

    /// Radio unit
    pub radio_id: i64,

    /// Raw action string
    pub action: String,

    /// Talkgroup
    pub talkgroup: Option<i32>,

    /// Source
    pub source: Option<i64>,
}

impl From<UnitActivityRow> for UnitActivityEvent {
    fn from(row: UnitActivityRow) -> Self {
        Self {
            id: Some(row.id),
            timestamp: row.timestamp,
            radio_id: row.radio_id,
            action: UnitAction::from(row.action),
            talkgroup: row.talkgroup,
            source: row.source,
        }
    }
}

/// Database model for completed call rows
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompletedCallRow {
    /// Unique identifier
    pub id: i64,

    /// Talkgroup
    pub talkgroup: i32,

    /// Unix seconds
    pub start_time: i64,

    /// Length in seconds
    pub call_length: Option<i64>,

    /// Transcription text
    pub transcription: Option<String>,

    /// Talkgroup description
    pub talkgroup_description: Option<String>,

    /// Contributing units
    pub src_list: Option<Vec<i64>>,
}

impl From<CompletedCallRow> for CompletedCallRecord {
    fn from(row: CompletedCallRow) -> Self {
        Self {
            id: Some(row.id),
            talkgroup: row.talkgroup,
            start_time: row.start_time,
            call_length: row.call_length,
            transcription: row.transcription,
            talkgroup_description: row.talkgroup_description,
            src_list: row.src_list.unwrap_or_default(),
        }
    }
}

/// Database model for talkgroup reference rows
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TalkgroupRow {
    /// Decimal talkgroup code
    pub decimal: i32,

    /// Alpha tag
    pub alpha_tag: Option<String>,

    /// Description
    pub description: Option<String>,
}

impl From<TalkgroupRow> for TalkgroupInfo {
    fn from(row: TalkgroupRow) -> Self {
        Self {
            decimal: row.decimal,
            alpha_tag: row.alpha_tag,
            description: row.description,
        }
    }
}

/// Body of a `pg_notify` message published by the change triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyPayload {
    /// `TG_OP` of the trigger (`INSERT`, `UPDATE`, ...)
    pub operation: String,

    /// The new row as JSON
    #[serde(default)]
    pub document: Option<serde_json::Value>,
}

/// Kind of write a change event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Row inserted
    Insert,
    /// Row updated
    Update,
    /// Row deleted
    Delete,
    /// Anything else the store reports
    Other,
}

impl OperationType {
    /// Map a trigger `TG_OP` value
    #[must_use]
    pub fn from_trigger_op(op: &str) -> Self {
        match op.to_ascii_uppercase().as_str() {
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }

    /// Only inserts and updates mean new data for the monitor
    #[must_use]
    pub const fn is_insert_or_update(self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }
}

/// The changed document carried by a change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDocument {
    /// A unit activity row
    Unit(UnitActivityEvent),
    /// A completed call row
    Call(CompletedCallRecord),
}

impl ChangeDocument {
    /// Decode a JSON row for the given stream
    ///
    /// # Errors
    ///
    /// Returns the serde error when the row does not match the stream's type.
    pub fn from_json(
        stream: StreamKind,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        match stream {
            StreamKind::Units => serde_json::from_value(value).map(Self::Unit),
            StreamKind::Calls => serde_json::from_value(value).map(Self::Call),
        }
    }

    /// Action of a unit document
    #[must_use]
    pub const fn unit_action(&self) -> Option<&UnitAction> {
        match self {
            Self::Unit(event) => Some(&event.action),
            Self::Call(_) => None,
        }
    }
}

/// One notification from a live subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Stream the change belongs to
    pub stream: StreamKind,

    /// What kind of write happened
    pub operation: OperationType,

    /// The written document, when the store delivered a decodable one
    pub full_document: Option<ChangeDocument>,
}

impl ChangeEvent {
    /// Decode a notification payload
    ///
    /// A payload that is not valid JSON still counts as a change signal, just
    /// without a document.
    #[must_use]
    pub fn from_payload(stream: StreamKind, payload: &str) -> Self {
        match serde_json::from_str::<NotifyPayload>(payload) {
            Ok(NotifyPayload {
                operation,
                document,
            }) => {
                let full_document = document.and_then(|doc| {
                    ChangeDocument::from_json(stream, doc)
                        .map_err(|e| {
                            tracing::warn!(%stream, error = %e, "Undecodable change document");
                        })
                        .ok()
                });
                Self {
                    stream,
                    operation: OperationType::from_trigger_op(&operation),
                    full_document,
                }
            }
            Err(e) => {
                tracing::warn!(%stream, error = %e, "Malformed change notification payload");
                Self {
                    stream,
                    operation: OperationType::Other,
                    full_document: None,
                }
            }
        }
    }

    /// Whether this change is a unit `call` action
    #[must_use]
    pub fn is_call_action(&self) -> bool {
        self.full_document
            .as_ref()
            .and_then(ChangeDocument::unit_action)
            .is_some_and(UnitAction::is_call)
    }
}
