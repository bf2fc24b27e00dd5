//! First-fit, collision-free placement on a single track.

/// Tolerance for touching intervals (`a.end == b.start` never collides)
pub const EPSILON: f64 = 1e-9;

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, end: start + duration }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end - EPSILON && other.start < self.end - EPSILON
    }
}

/// Where a clip of `duration` ends up when dropped at `desired`
///
/// The desired start (clamped to 0) is kept when it collides with nothing.
/// Otherwise the occupied intervals are scanned in start order and the first
/// slot that fits wins: before the first clip, in a gap, or after the last.
pub fn resolve_start(occupied: &[Interval], desired: f64, duration: f64) -> f64 {
    let desired = desired.max(0.0);
    let candidate = Interval::new(desired, duration);

    if !occupied.iter().any(|other| candidate.overlaps(other)) {
        return desired;
    }

    let mut sorted = occupied.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut cursor = 0.0_f64;
    for interval in &sorted {
        if interval.start - cursor >= duration - EPSILON {
            return cursor;
        }
        cursor = cursor.max(interval.end);
    }

    cursor
}
