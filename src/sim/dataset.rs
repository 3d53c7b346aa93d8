//! Long-format gaze table: two rows per trial millisecond, Target first.

use std::fmt;

use super::effects::Ms;
use super::fixation::GazeState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LookObject {
    Target,
    Distractor,
}

impl LookObject {
    pub const ALL: [LookObject; 2] = [LookObject::Target, LookObject::Distractor];

    pub fn as_str(self) -> &'static str {
        match self {
            LookObject::Target => "Target",
            LookObject::Distractor => "Distractor",
        }
    }

    /// `1` when `state` is a look at this object. Away looks are `0` for both.
    #[inline]
    pub fn indicator(self, state: GazeState) -> u8 {
        let hit = matches!(
            (self, state),
            (LookObject::Target, GazeState::Target) | (LookObject::Distractor, GazeState::Distractor)
        );
        u8::from(hit)
    }
}

impl fmt::Display for LookObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Row {
    pub participant: u32,
    /// Zero-based condition index.
    pub condition: u32,
    pub trial: u32,
    pub time: Ms,
    pub object: LookObject,
    pub is_looking: u8,
}

impl Row {
    pub fn participant_label(&self) -> String {
        format!("P{}", self.participant)
    }

    pub fn trial_label(&self) -> String {
        format!("T{}", self.trial)
    }
}

/// Recorded gaze of one trial, pretrial buffer already removed. `gaze[i]`
/// is the state at trial time `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrialRecord {
    pub participant: u32,
    pub condition: u32,
    pub trial: u32,
    pub gaze: Vec<GazeState>,
}

impl TrialRecord {
    /// Append the rows of this trial shifted by `offset`, keeping `0 <= time < trial_len`.
    pub fn push_rows(&self, rows: &mut Vec<Row>, offset: Ms, trial_len: usize) {
        let window = 0..trial_len as Ms;
        for (ms, &state) in self.gaze.iter().enumerate() {
            let time = ms as Ms + offset;
            if !window.contains(&time) {
                continue;
            }
            for object in LookObject::ALL {
                rows.push(Row {
                    participant: self.participant,
                    condition: self.condition,
                    trial: self.trial,
                    time,
                    object,
                    is_looking: object.indicator(state),
                });
            }
        }
    }
}

/// Rows in (participant, condition, trial, time, object) order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    pub rows: Vec<Row>,
    /// Recorded trial length; correction trims to `[0, trial_len)`.
    pub trial_len: usize,
}

impl Dataset {
    pub fn new(trial_len: usize) -> Self {
        Self {
            rows: Vec::new(),
            trial_len,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct participant ids in row order.
    pub fn participants(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = Vec::new();
        for row in &self.rows {
            if ids.last() != Some(&row.participant) {
                ids.push(row.participant);
            }
        }
        ids
    }

    /// Keep only the participants in `keep` (sorted ascending) and renumber
    /// them `0..keep.len()` in that order.
    pub fn retain_participants(&mut self, keep: &[u32]) {
        self.rows.retain_mut(|row| match keep.binary_search(&row.participant) {
            Ok(new_id) => {
                row.participant = new_id as u32;
                true
            }
            Err(_) => false,
        });
    }
}
