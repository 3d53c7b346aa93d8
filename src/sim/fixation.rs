//! Fixation onsets and the gaze state held between them.

use rand::Rng;

use super::effects::gauss;

/// Typical fixations last 180..250 ms; 215 is the midpoint and 35 the half-width.
pub const FIXATION_LEN_MEAN_MS: f64 = 215.0;
pub const FIXATION_LEN_SD_MS: f64 = 35.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GazeState {
    Target,
    Distractor,
    Away,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fixation {
    pub onset: usize,
    /// Sampled length in ms. The last fixation of a trial may run past its end.
    pub length: usize,
}

/// Lazy fixation sequence over `[0, duration)`. The first onset is 0 and each
/// following onset is the previous onset plus its sampled length; the sequence
/// ends at the first onset that would fall at or past `duration`.
pub struct FixationEvents<'r, R: Rng + ?Sized> {
    rng: &'r mut R,
    next_onset: usize,
    duration: usize,
}

impl<R: Rng + ?Sized> Iterator for FixationEvents<'_, R> {
    type Item = Fixation;

    fn next(&mut self) -> Option<Fixation> {
        if self.next_onset >= self.duration {
            return None;
        }
        let onset = self.next_onset;
        let length = gauss(&mut *self.rng, FIXATION_LEN_MEAN_MS, FIXATION_LEN_SD_MS)
            .trunc()
            .max(0.0) as usize;
        self.next_onset = onset + length;
        Some(Fixation { onset, length })
    }
}

pub fn generate_fixations<R: Rng + ?Sized>(rng: &mut R, duration_ms: usize) -> FixationEvents<'_, R> {
    FixationEvents {
        rng,
        next_onset: 0,
        duration: duration_ms,
    }
}

#[inline]
fn decide_look<R: Rng + ?Sized>(rng: &mut R, p_target: f64) -> GazeState {
    if rng.random::<f64>() < p_target {
        GazeState::Target
    } else {
        GazeState::Distractor
    }
}

/// Gaze state per millisecond of `curve`. At each distinct onset an away-look
/// trial runs first, then a target-vs-distractor trial against the curve at
/// that millisecond. The state is held until the next onset.
pub fn sample_gaze<R: Rng + ?Sized>(
    rng: &mut R,
    curve: &[f64],
    fixations: &[Fixation],
    away_probability: f64,
) -> Vec<GazeState> {
    let mut out = Vec::with_capacity(curve.len());
    let Some(&first) = curve.first() else {
        return out;
    };
    // Drawn before any onset; the onset at 0 replaces it.
    let mut state = decide_look(rng, first);
    let mut pending = fixations.iter().map(|f| f.onset).peekable();
    for (ms, &p_target) in curve.iter().enumerate() {
        let mut is_onset = false;
        while pending.next_if(|&onset| onset <= ms).is_some() {
            is_onset = true;
        }
        if is_onset {
            state = if rng.random::<f64>() < away_probability {
                GazeState::Away
            } else {
                decide_look(rng, p_target)
            };
        }
        out.push(state);
    }
    out
}
