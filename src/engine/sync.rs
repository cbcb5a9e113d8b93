//! Status synchronization
//!
//! Turns the device's polled status into edge events. The device reports a
//! sustained status value; the tracker remembers the previous one and
//! reports outcomes and round starts only when the value changes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::state::Level;

/// Device-reported game status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Device idle.
    #[default]
    Idle,
    /// Player input accepted.
    Playing,
    /// Pattern being shown.
    Memorizing,
    /// Player reproduced the pattern.
    Success,
    /// Player made a mistake.
    Failed,
    /// Anything else the device may report.
    #[serde(other)]
    Unknown,
}

impl DeviceStatus {
    const fn is_outcome(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    const fn is_active_round(self) -> bool {
        matches!(self, Self::Playing | Self::Memorizing)
    }
}

/// One `GET status` response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSnapshot {
    /// Game status.
    pub status: DeviceStatus,
    /// Level the device is playing.
    pub level: i64,
    /// Streak as tracked by the device.
    pub streak: i64,
    /// Errors in the current round.
    pub errors: u32,
    /// Buttons pressed so far in the current round.
    pub user_input: Vec<i64>,
}

impl StatusSnapshot {
    /// Hits in the current round.
    #[must_use]
    pub fn hits(&self) -> u32 {
        u32::try_from(self.user_input.len()).unwrap_or(u32::MAX)
    }
}

/// Edge event derived from consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Status changed to `success`.
    RoundWon {
        /// Hits reported with the edge.
        hits: u32,
    },
    /// Status changed to `failed`.
    RoundLost {
        /// Errors reported with the edge.
        errors: u32,
    },
    /// Status moved from an outcome back into an active round.
    NewRoundDetected {
        /// Level the device reported.
        level: Level,
    },
}

/// Remembers the last known device status and reports edges.
#[derive(Debug, Default)]
pub struct StatusTracker {
    previous: DeviceStatus,
}

impl StatusTracker {
    /// Creates a tracker starting from `idle`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last status that advanced the tracker.
    #[must_use]
    pub const fn previous(&self) -> DeviceStatus {
        self.previous
    }

    /// Forgets the previous status at round start.
    pub const fn reset(&mut self) {
        self.previous = DeviceStatus::Idle;
    }

    /// Compares `snapshot` with the previous status.
    ///
    /// Outcome edges come before the new-round edge. An `Unknown` status
    /// does not advance the tracker.
    pub fn observe(&mut self, snapshot: &StatusSnapshot) -> Vec<SyncEvent> {
        let current = snapshot.status;
        if current == DeviceStatus::Unknown {
            debug!("ignoring unknown device status");
            return Vec::new();
        }

        let previous = self.previous;
        let mut events = Vec::new();

        if current != previous {
            match current {
                DeviceStatus::Success => events.push(SyncEvent::RoundWon {
                    hits: snapshot.hits(),
                }),
                DeviceStatus::Failed => events.push(SyncEvent::RoundLost {
                    errors: snapshot.errors,
                }),
                _ => {}
            }
            if previous.is_outcome() && current.is_active_round() {
                events.push(SyncEvent::NewRoundDetected {
                    level: Level::from_wire(snapshot.level),
                });
            }
        }

        self.previous = current;
        events
    }
}

/// Single-slot latch for a new-round transition deferred by a hold.
///
/// Latching while already set replaces the stored level; a replay
/// happens at most once per latch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingRound {
    level: Option<Level>,
}

impl PendingRound {
    /// Records a deferred transition. Returns `true` if one was already
    /// held and got coalesced.
    pub const fn latch(&mut self, level: Level) -> bool {
        let coalesced = self.level.is_some();
        self.level = Some(level);
        coalesced
    }

    /// Takes the deferred transition, clearing the latch.
    pub const fn take(&mut self) -> Option<Level> {
        self.level.take()
    }

    /// Whether a transition is waiting.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.level.is_some()
    }

    /// Drops any waiting transition.
    pub const fn clear(&mut self) {
        self.level = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(status: DeviceStatus, level: i64) -> StatusSnapshot {
        StatusSnapshot {
            status,
            level,
            ..StatusSnapshot::default()
        }
    }

    #[test]
    fn parses_device_payload() {
        let json = r#"{"status":"success","level":2,"streak":4,"errors":0,"user_input":[1,3,2]}"#;
        let snapshot: StatusSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.status, DeviceStatus::Success);
        assert_eq!(snapshot.hits(), 3);

        let odd: StatusSnapshot = serde_json::from_str(r#"{"status":"rebooting"}"#).unwrap();
        assert_eq!(odd.status, DeviceStatus::Unknown);
        assert_eq!(odd.level, 0);
    }

    #[test]
    fn success_is_reported_on_edge_only() {
        let mut tracker = StatusTracker::new();
        let mut won = snap(DeviceStatus::Success, 2);
        won.user_input = vec![1, 2, 3];

        assert_eq!(tracker.observe(&won), vec![SyncEvent::RoundWon { hits: 3 }]);
        assert!(tracker.observe(&won).is_empty());
    }

    #[test]
    fn failure_carries_errors() {
        let mut tracker = StatusTracker::new();
        tracker.observe(&snap(DeviceStatus::Playing, 1));
        let mut lost = snap(DeviceStatus::Failed, 1);
        lost.errors = 2;
        assert_eq!(tracker.observe(&lost), vec![SyncEvent::RoundLost { errors: 2 }]);
    }

    #[test]
    fn outcome_to_playing_is_new_round() {
        let mut tracker = StatusTracker::new();
        tracker.observe(&snap(DeviceStatus::Success, 2));
        assert_eq!(
            tracker.observe(&snap(DeviceStatus::Playing, 3)),
            vec![SyncEvent::NewRoundDetected {
                level: Level::new(3)
            }]
        );

        tracker.observe(&snap(DeviceStatus::Failed, 3));
        assert_eq!(
            tracker.observe(&snap(DeviceStatus::Memorizing, 3)),
            vec![SyncEvent::NewRoundDetected {
                level: Level::new(3)
            }]
        );
    }

    #[test]
    fn idle_to_playing_is_not_new_round() {
        let mut tracker = StatusTracker::new();
        assert!(tracker.observe(&snap(DeviceStatus::Playing, 1)).is_empty());
    }

    #[test]
    fn success_straight_to_failed_reports_loss_only() {
        let mut tracker = StatusTracker::new();
        tracker.observe(&snap(DeviceStatus::Success, 1));
        let events = tracker.observe(&snap(DeviceStatus::Failed, 1));
        assert_eq!(events, vec![SyncEvent::RoundLost { errors: 0 }]);
    }

    #[test]
    fn unknown_status_does_not_break_edges() {
        let mut tracker = StatusTracker::new();
        tracker.observe(&snap(DeviceStatus::Success, 1));
        assert!(tracker.observe(&snap(DeviceStatus::Unknown, 1)).is_empty());
        assert_eq!(tracker.previous(), DeviceStatus::Success);
        assert_eq!(tracker.observe(&snap(DeviceStatus::Playing, 1)).len(), 1);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut tracker = StatusTracker::new();
        tracker.observe(&snap(DeviceStatus::Success, 1));
        tracker.reset();
        assert!(tracker.observe(&snap(DeviceStatus::Playing, 1)).is_empty());
    }

    #[test]
    fn pending_round_coalesces_latest_level() {
        let mut pending = PendingRound::default();
        assert!(!pending.latch(Level::new(2)));
        assert!(pending.latch(Level::new(4)));
        assert!(pending.is_set());
        assert_eq!(pending.take(), Some(Level::new(4)));
        assert_eq!(pending.take(), None);
    }
}
