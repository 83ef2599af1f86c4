use chrono::{DateTime, Utc};

/// One calendar window and the replica count it asks for while it is open.
///
/// `start_time <= end_time` is expected but not checked; a reversed window
/// simply never contains "now" when the store filters on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub desired_replicas: i64,
}

impl Event {
    pub fn new(start_time: DateTime<Utc>, end_time: DateTime<Utc>, desired_replicas: i64) -> Self {
        Event {
            start_time,
            end_time,
            desired_replicas,
        }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start_time <= instant && instant <= self.end_time
    }
}

/// What the scaler tells KEDA for one tenant at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Decision {
    pub is_active: bool,
    pub desired_replicas: i64,
}

impl Decision {
    pub fn from_events(events: &[Event]) -> Self {
        Decision {
            is_active: !events.is_empty(),
            desired_replicas: events
                .iter()
                .map(|event| event.desired_replicas)
                .max()
                .unwrap_or(0),
        }
    }
}

impl From<&[Event]> for Decision {
    fn from(events: &[Event]) -> Self {
        Decision::from_events(events)
    }
}
