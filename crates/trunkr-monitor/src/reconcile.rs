//! Cross-reference active sessions against completed calls
//!
//! A session is dropped once a completed record for the same talkgroup ends
//! at or after the session start. Only records still in the recent calls
//! cache are consulted, so a session whose closing record has already aged
//! out of that cache stays visible until it leaves the active window itself.

use std::collections::HashMap;
use trunkr_core::{ActiveCallSession, CompletedCallRecord, TalkgroupId, UnixSeconds};

/// Latest end time per talkgroup among `recent_calls`
fn latest_end_times(recent_calls: &[CompletedCallRecord]) -> HashMap<TalkgroupId, UnixSeconds> {
    let mut latest: HashMap<TalkgroupId, UnixSeconds> = HashMap::new();
    for record in recent_calls {
        let end = record.end_time();
        latest
            .entry(record.talkgroup)
            .and_modify(|current| *current = (*current).max(end))
            .or_insert(end);
    }
    latest
}

/// Sessions not yet superseded by a completed record, in input order
#[must_use]
pub fn reconcile_active(
    active: &[ActiveCallSession],
    recent_calls: &[CompletedCallRecord],
) -> Vec<ActiveCallSession> {
    let latest = latest_end_times(recent_calls);
    active
        .iter()
        .filter(|session| {
            latest
                .get(&session.talkgroup)
                .is_none_or(|end| *end < session.start_time)
        })
        .cloned()
        .collect()
}
