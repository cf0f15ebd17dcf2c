//! Kubernetes-side model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The object an event refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventObject {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// A cluster event, normalised from the core/v1 shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct K8sEvent {
    pub reason: String,
    pub message: String,
    /// `Normal` or `Warning`.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub first_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_time: Option<DateTime<Utc>>,
    pub object: EventObject,
}

impl K8sEvent {
    pub fn is_warning(&self) -> bool {
        self.event_type == "Warning"
    }
}

/// Sort events most-recent-first by their last-seen timestamp.
pub fn sort_events_newest_first(events: &mut [K8sEvent]) {
    events.sort_by(|a, b| b.last_time.cmp(&a.last_time));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(reason: &str, ts: Option<DateTime<Utc>>) -> K8sEvent {
        K8sEvent {
            reason: reason.into(),
            message: String::new(),
            event_type: "Normal".into(),
            count: 1,
            first_time: ts,
            last_time: ts,
            object: EventObject::default(),
        }
    }

    #[test]
    fn sorts_newest_first_with_missing_timestamps_last() {
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let mut events = vec![event("old", Some(t1)), event("untimed", None), event("new", Some(t2))];
        sort_events_newest_first(&mut events);
        assert_eq!(events[0].reason, "new");
        assert_eq!(events[1].reason, "old");
        assert_eq!(events[2].reason, "untimed");
    }
}
