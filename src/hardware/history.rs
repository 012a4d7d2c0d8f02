//! Relation history: a fixed-capacity ring of timestamped 6-DoF poses with
//! interpolation and extrapolation (C9, spec §4.9).

use std::collections::VecDeque;
use std::sync::Mutex;

use log::warn;

use crate::math::{Quaternion, Vector3};

/// Default ring capacity (spec §3: "implementation-chosen, e.g. 32").
pub const DEFAULT_CAPACITY: usize = 32;

/// A 6-DoF pose plus validity flags and instantaneous velocities, as
/// returned to pose consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceRelation {
    pub position: Vector3,
    pub orientation: Quaternion,
    pub linear_velocity: Vector3,
    pub angular_velocity: Vector3,
    pub position_valid: bool,
    pub orientation_valid: bool,
}

impl SpaceRelation {
    pub fn zero() -> Self {
        Self {
            position: Vector3::zero(),
            orientation: Quaternion::identity(),
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            position_valid: false,
            orientation_valid: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    timestamp_ns: u64,
    relation: SpaceRelation,
}

fn lerp(a: &SpaceRelation, b: &Entry, t: f64, flags_and: (bool, bool)) -> SpaceRelation {
    SpaceRelation {
        position: a.position.lerp(&b.relation.position, t),
        orientation: a.orientation.slerp(&b.relation.orientation, t),
        linear_velocity: a.linear_velocity.lerp(&b.relation.linear_velocity, t),
        angular_velocity: a.angular_velocity.lerp(&b.relation.angular_velocity, t),
        position_valid: flags_and.0,
        orientation_valid: flags_and.1,
    }
}

fn extrapolate(newest: &Entry, target_ns: u64) -> SpaceRelation {
    let dt = (target_ns.saturating_sub(newest.timestamp_ns)) as f64 * 1e-9;
    let r = &newest.relation;

    let position = r.position + r.linear_velocity.scale(dt);

    let angle = r.angular_velocity.magnitude() * dt;
    let orientation = if angle > 1e-12 {
        Quaternion::from_axis_angle(r.angular_velocity, angle)
            .mul(&r.orientation)
            .normalize()
    } else {
        r.orientation
    };

    SpaceRelation {
        position,
        orientation,
        linear_velocity: r.linear_velocity,
        angular_velocity: r.angular_velocity,
        position_valid: r.position_valid,
        orientation_valid: r.orientation_valid,
    }
}

struct HistoryState {
    capacity: usize,
    entries: VecDeque<Entry>,
}

/// Ring buffer of timestamped poses, guarded by a single mutex shared by
/// `push` (the IMU reader thread) and `get` (pose consumers).
pub struct RelationHistory {
    state: Mutex<HistoryState>,
}

impl RelationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(HistoryState {
                capacity,
                entries: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Append a new relation. If the ring is full, the oldest entry is
    /// overwritten.
    pub fn push(&self, timestamp_ns: u64, relation: SpaceRelation) {
        let mut state = self.state.lock().unwrap();
        if let Some(last) = state.entries.back() {
            if timestamp_ns < last.timestamp_ns {
                warn!(
                    "relation history received an out-of-order timestamp ({timestamp_ns} < {})",
                    last.timestamp_ns
                );
            }
        }
        if state.entries.len() == state.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(Entry {
            timestamp_ns,
            relation,
        });
    }

    /// Resolve the relation at `target_timestamp_ns`: interpolated if it
    /// falls between two recorded entries, extrapolated from the newest
    /// entry's velocities if it is newer than everything recorded, or a
    /// zero-flagged relation if the history is empty.
    pub fn get(&self, target_timestamp_ns: u64) -> SpaceRelation {
        let state = self.state.lock().unwrap();
        let entries = &state.entries;

        let Some(newest) = entries.back() else {
            return SpaceRelation::zero();
        };

        if target_timestamp_ns >= newest.timestamp_ns {
            return extrapolate(newest, target_timestamp_ns);
        }

        for window in entries.iter().collect::<Vec<_>>().windows(2) {
            let (older, newer) = (window[0], window[1]);
            if target_timestamp_ns >= older.timestamp_ns && target_timestamp_ns <= newer.timestamp_ns
            {
                let span = (newer.timestamp_ns - older.timestamp_ns).max(1) as f64;
                let t = (target_timestamp_ns - older.timestamp_ns) as f64 / span;
                return lerp(
                    &older.relation,
                    newer,
                    t,
                    (
                        older.relation.position_valid && newer.relation.position_valid,
                        older.relation.orientation_valid && newer.relation.orientation_valid,
                    ),
                );
            }
        }

        // Older than everything recorded: clamp to the oldest entry.
        entries.front().unwrap().relation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation_at(x: f64) -> SpaceRelation {
        SpaceRelation {
            position: Vector3::new(x, 0.0, 0.0),
            orientation: Quaternion::identity(),
            linear_velocity: Vector3::new(1.0, 0.0, 0.0),
            angular_velocity: Vector3::zero(),
            position_valid: true,
            orientation_valid: true,
        }
    }

    #[test]
    fn empty_history_returns_zero_flagged_relation() {
        let history = RelationHistory::new(4);
        let relation = history.get(100);
        assert!(!relation.position_valid);
        assert!(!relation.orientation_valid);
    }

    #[test]
    fn interpolates_position_between_two_entries() {
        let history = RelationHistory::new(4);
        history.push(0, relation_at(0.0));
        history.push(1_000_000_000, relation_at(10.0));
        let mid = history.get(500_000_000);
        assert!((mid.position.x - 5.0).abs() < 1e-6);
        assert!(mid.position_valid);
    }

    #[test]
    fn extrapolates_past_the_newest_entry_using_linear_velocity() {
        let history = RelationHistory::new(4);
        history.push(0, relation_at(0.0));
        let future = history.get(2_000_000_000);
        assert!((future.position.x - 2.0).abs() < 1e-6);
    }

    #[test]
    fn ring_overwrites_oldest_when_full() {
        let history = RelationHistory::new(2);
        history.push(0, relation_at(0.0));
        history.push(1, relation_at(1.0));
        history.push(2, relation_at(2.0));
        // The entry at timestamp 0 should have been evicted.
        let oldest = history.get(0);
        assert!((oldest.position.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn validity_flags_are_the_and_of_bracketing_entries() {
        let history = RelationHistory::new(4);
        let mut invalid = relation_at(0.0);
        invalid.position_valid = false;
        history.push(0, invalid);
        history.push(1_000_000_000, relation_at(10.0));
        let mid = history.get(500_000_000);
        assert!(!mid.position_valid);
    }
}
