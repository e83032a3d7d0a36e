use serde::{Deserialize, Serialize};

/// One speaker-attributed time interval as reported directly by diarization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTurn {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

impl RawTurn {
    pub fn new(speaker: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            speaker: speaker.into(),
            start,
            end,
        }
    }
}

/// A maximal run of consecutive same-speaker turns, merged into one interval.
///
/// Segments are the unit of work for every downstream stage: one segment
/// yields one video clip, one audio clip, up to two stems and optionally one
/// transcript, all named from [`Segment::artifact_stem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Base filename for every artifact derived from this segment. The
    /// ordinal index disambiguates repeated speakers, so names are unique
    /// across a run and identical across re-runs of the same input.
    pub fn artifact_stem(&self, index: usize) -> String {
        format!("{}_segment_{}", self.speaker, index)
    }
}

impl From<&RawTurn> for Segment {
    fn from(turn: &RawTurn) -> Self {
        Self {
            speaker: turn.speaker.clone(),
            start: turn.start,
            end: turn.end,
        }
    }
}

/// Defensive normalization at the diarization boundary: drop degenerate
/// turns and sort chronologically. The merger assumes sorted input; the
/// collaborator does not guarantee it during cross-talk.
pub fn normalize_turns(mut turns: Vec<RawTurn>) -> Vec<RawTurn> {
    turns.retain(|t| t.end > t.start);
    turns.sort_by(|a, b| a.start.total_cmp(&b.start));
    turns
}

/// Collapse consecutive same-speaker turns into maximal contiguous segments.
///
/// Single left-to-right pass: a turn with the same speaker as the accumulator
/// extends the accumulator's `end` to the turn's `end` (the latest turn wins,
/// even if it ends earlier); a speaker change emits the accumulator and starts
/// a new one. The final accumulator is always emitted. Empty input yields
/// empty output. Pure and side-effect free.
pub fn merge_turns(turns: &[RawTurn]) -> Vec<Segment> {
    let mut iter = turns.iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    let mut current = Segment::from(first);

    for turn in iter {
        if turn.speaker == current.speaker {
            current.end = turn.end;
        } else {
            segments.push(current);
            current = Segment::from(turn);
        }
    }
    segments.push(current);

    segments
}
