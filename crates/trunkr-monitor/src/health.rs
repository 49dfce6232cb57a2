//! Health reporting

use crate::notifier::StreamMode;
use crate::service::ServiceStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trunkr_core::{StreamKind, UnixSeconds};

/// Point-in-time health of the monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Lifecycle state of the service
    pub status: ServiceStatus,

    /// Whether any stream is still served by push
    pub push_mode: bool,

    /// Mode of each stream
    pub streams: Vec<StreamHealth>,

    /// Time since the last change signal or polling pass
    #[serde(with = "optional_millis")]
    pub last_refresh_age: Option<Duration>,

    /// Newest unit activity timestamp in the store
    pub newest_unit_timestamp: Option<UnixSeconds>,

    /// Whether the newest unit activity is within the freshness threshold
    pub data_fresh: bool,

    /// Wall-clock time of the last committed refresh
    pub refreshed_at: Option<UnixSeconds>,
}

/// Mode of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHealth {
    /// Stream
    pub stream: StreamKind,
    /// Current mode
    pub mode: StreamMode,
}

impl HealthStatus {
    /// Healthy means running with fresh data
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Running && self.data_fresh
    }
}

/// Whether `newest` is less than `threshold` seconds older than `now`
///
/// A missing timestamp is never fresh.
#[must_use]
pub fn is_data_fresh(newest: Option<UnixSeconds>, now: UnixSeconds, threshold: i64) -> bool {
    newest.is_some_and(|newest| now.saturating_sub(newest) < threshold)
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => {
                serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
