use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TimelineConfig;
use crate::error::TimelineError;
use crate::timeline::placement::{resolve_start, Interval};
use crate::timeline::types::{Clip, ClipKind, Track, TrackType};

type TimelineResult<T> = std::result::Result<T, TimelineError>;

/// Serializable snapshot of a timeline, shared with editor clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineState {
    pub clips: Vec<Clip>,
    #[serde(default)]
    pub current_time: f64,
    pub default_duration: f64,
}

/// The full clip set plus derived duration and playhead
///
/// Every mutation goes through the placement rule, so clips on the same
/// track never overlap, and the duration is recomputed before it returns.
#[derive(Debug, Clone)]
pub struct Timeline {
    clips: Vec<Clip>,
    duration: f64,
    current_time: f64,
    default_duration: f64,
}

impl Timeline {
    /// Create an empty timeline that reports `default_duration` until clips arrive
    pub fn new(default_duration: f64) -> Self {
        Self {
            clips: Vec::new(),
            duration: default_duration,
            current_time: 0.0,
            default_duration,
        }
    }

    pub fn from_config(config: &TimelineConfig) -> Self {
        Self::new(config.default_duration)
    }

    /// Rebuild a timeline from a snapshot, re-applying placement to every clip
    ///
    /// Clips are inserted in their stored order, so a snapshot that already
    /// satisfies the no-overlap rule comes back unchanged.
    pub fn restore(state: TimelineState) -> TimelineResult<Self> {
        let mut timeline = Self::new(state.default_duration);
        for clip in state.clips {
            let start = clip.start_time;
            timeline.place(clip, start)?;
        }
        timeline.seek(state.current_time);
        Ok(timeline)
    }

    pub fn state(&self) -> TimelineState {
        TimelineState {
            clips: self.clips.clone(),
            current_time: self.current_time,
            default_duration: self.default_duration,
        }
    }

    // ==========================================
    // QUERIES
    // ==========================================

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn get(&self, id: &str) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Derived lanes, each sorted by start time
    pub fn tracks(&self) -> BTreeMap<TrackType, Track<'_>> {
        let mut tracks: BTreeMap<TrackType, Track<'_>> = BTreeMap::new();
        for clip in &self.clips {
            tracks
                .entry(clip.track_type())
                .or_insert_with(|| Track {
                    track_type: clip.track_type(),
                    clips: Vec::new(),
                })
                .clips
                .push(clip);
        }
        for track in tracks.values_mut() {
            track.clips.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        }
        tracks
    }

    /// End of the last clip on `track_type` (0 when the lane is empty)
    pub fn track_end(&self, track_type: TrackType) -> f64 {
        self.clips
            .iter()
            .filter(|c| c.track_type() == track_type)
            .map(Clip::end_time)
            .fold(0.0, f64::max)
    }

    /// Clips under the playhead position `time`, in track order
    pub fn clips_at(&self, time: f64) -> Vec<&Clip> {
        let mut active: Vec<&Clip> = self.clips.iter().filter(|c| c.contains(time)).collect();
        active.sort_by_key(|c| c.track_type());
        active
    }

    // ==========================================
    // MUTATIONS
    // ==========================================

    /// Insert `clip` as close to `desired_start` as the track allows
    ///
    /// Returns the start the clip actually got.
    pub fn place(&mut self, mut clip: Clip, desired_start: f64) -> TimelineResult<f64> {
        validate_duration(clip.duration)?;
        validate_start(desired_start)?;
        if self.get(&clip.id).is_some() {
            return Err(TimelineError::DuplicateClipId { id: clip.id });
        }

        let start = resolve_start(
            &self.occupied(clip.track_type(), None),
            desired_start,
            clip.duration,
        );
        debug!("Placing {} clip '{}' at {:.3}s (asked {:.3}s)", clip.kind, clip.id, start, desired_start);

        clip.start_time = start;
        self.clips.push(clip);
        self.after_mutation();
        Ok(start)
    }

    /// Insert `clip` at the current end of its track
    pub fn append(&mut self, clip: Clip) -> TimelineResult<f64> {
        let end = self.track_end(clip.track_type());
        self.place(clip, end)
    }

    pub fn remove_clip(&mut self, id: &str) -> TimelineResult<Clip> {
        let position = self.position(id)?;
        let clip = self.clips.remove(position);
        self.after_mutation();
        Ok(clip)
    }

    /// Drag a clip to `new_start`; collisions resolve by first-fit
    pub fn move_clip(&mut self, id: &str, new_start: f64) -> TimelineResult<f64> {
        validate_start(new_start)?;
        let position = self.position(id)?;
        let track_type = self.clips[position].track_type();
        let duration = self.clips[position].duration;

        let start = resolve_start(&self.occupied(track_type, Some(id)), new_start, duration);
        self.clips[position].start_time = start;
        self.after_mutation();
        Ok(start)
    }

    /// Change a clip's length, re-placing it if the new extent collides
    pub fn resize_clip(&mut self, id: &str, new_duration: f64) -> TimelineResult<f64> {
        validate_duration(new_duration)?;
        let position = self.position(id)?;
        let track_type = self.clips[position].track_type();
        let current = self.clips[position].start_time;

        let start = resolve_start(&self.occupied(track_type, Some(id)), current, new_duration);
        let clip = &mut self.clips[position];
        clip.duration = new_duration;
        clip.start_time = start;
        self.after_mutation();
        Ok(start)
    }

    /// Reclassify a clip, moving it onto the new kind's track
    pub fn retarget_clip(&mut self, id: &str, new_kind: ClipKind) -> TimelineResult<f64> {
        let position = self.position(id)?;
        let current_kind = self.clips[position].kind;
        if !current_kind.can_retarget_to(new_kind) {
            return Err(TimelineError::IncompatibleRetarget {
                from: current_kind.to_string(),
                to: new_kind.track_type().to_string(),
            });
        }

        let clip = &self.clips[position];
        let start = resolve_start(
            &self.occupied(new_kind.track_type(), Some(id)),
            clip.start_time,
            clip.duration,
        );
        let clip = &mut self.clips[position];
        clip.kind = new_kind;
        clip.start_time = start;
        self.after_mutation();
        Ok(start)
    }

    /// Move the playhead, clamped to the timeline
    pub fn seek(&mut self, time: f64) -> f64 {
        self.current_time = if time.is_finite() {
            time.clamp(0.0, self.duration)
        } else {
            0.0
        };
        self.current_time
    }

    /// Recompute the duration from the current clip set
    pub fn recompute_duration(&mut self) -> f64 {
        self.duration = compute_duration(&self.clips, self.default_duration);
        self.duration
    }

    // ==========================================
    // HELPERS
    // ==========================================

    fn after_mutation(&mut self) {
        self.recompute_duration();
        self.current_time = self.current_time.clamp(0.0, self.duration);
    }

    fn position(&self, id: &str) -> TimelineResult<usize> {
        self.clips
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| TimelineError::ClipNotFound { id: id.to_string() })
    }

    fn occupied(&self, track_type: TrackType, except: Option<&str>) -> Vec<Interval> {
        self.clips
            .iter()
            .filter(|c| c.track_type() == track_type && Some(c.id.as_str()) != except)
            .map(|c| Interval::new(c.start_time, c.duration))
            .collect()
    }
}

/// `max(start + duration)` over all clips, or `default` for an empty set
pub fn compute_duration(clips: &[Clip], default: f64) -> f64 {
    if clips.is_empty() {
        return default;
    }
    clips.iter().map(Clip::end_time).fold(0.0, f64::max)
}

fn validate_duration(duration: f64) -> TimelineResult<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(TimelineError::InvalidDuration { duration });
    }
    Ok(())
}

fn validate_start(start: f64) -> TimelineResult<()> {
    if !start.is_finite() {
        return Err(TimelineError::InvalidStart { start });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn clip(id: &str, kind: ClipKind, duration: f64) -> Clip {
        Clip::new(kind, format!("{id}.src"), id, duration).with_id(id)
    }

    fn assert_no_overlaps(timeline: &Timeline) {
        for track in timeline.tracks().values() {
            for pair in track.clips.windows(2) {
                assert!(
                    pair[0].end_time() <= pair[1].start_time + 1e-9,
                    "{} [{}, {}) overlaps {} [{}, {})",
                    pair[0].id, pair[0].start_time, pair[0].end_time(),
                    pair[1].id, pair[1].start_time, pair[1].end_time(),
                );
            }
        }
    }

    fn expected_duration(timeline: &Timeline, default: f64) -> f64 {
        compute_duration(timeline.clips(), default)
    }

    #[test]
    fn test_empty_timeline_uses_default_duration() {
        let timeline = Timeline::new(30.0);
        assert_eq!(timeline.duration(), 30.0);
        assert!(timeline.is_empty());
    }

    #[test]
    fn test_collision_resolves_after_existing_clip() {
        let mut timeline = Timeline::new(30.0);
        timeline.place(clip("a", ClipKind::PrimaryVisual, 5.0), 0.0).unwrap();
        let start = timeline.place(clip("b", ClipKind::PrimaryVisual, 4.0), 3.0).unwrap();

        assert_eq!(start, 5.0);
        assert_eq!(timeline.duration(), 9.0);
    }

    #[test]
    fn test_different_tracks_do_not_collide() {
        let mut timeline = Timeline::new(0.0);
        timeline.place(clip("v", ClipKind::PrimaryVisual, 5.0), 0.0).unwrap();
        let start = timeline.place(clip("s", ClipKind::SpeechAudio, 5.0), 0.0).unwrap();

        assert_eq!(start, 0.0);
        assert_eq!(timeline.tracks().len(), 2);
    }

    #[test]
    fn test_append_stacks_per_track() {
        let mut timeline = Timeline::new(0.0);
        timeline.append(clip("v1", ClipKind::PrimaryVisual, 4.0)).unwrap();
        timeline.append(clip("s1", ClipKind::SpeechAudio, 4.0)).unwrap();
        let v2 = timeline.append(clip("v2", ClipKind::PrimaryVisual, 6.0)).unwrap();
        let s2 = timeline.append(clip("s2", ClipKind::SpeechAudio, 6.0)).unwrap();

        assert_eq!((v2, s2), (4.0, 4.0));
        assert_eq!(timeline.duration(), 10.0);
    }

    #[test]
    fn test_remove_recomputes_duration() {
        let mut timeline = Timeline::new(12.0);
        timeline.append(clip("a", ClipKind::PrimaryVisual, 5.0)).unwrap();
        timeline.append(clip("b", ClipKind::PrimaryVisual, 5.0)).unwrap();
        timeline.seek(9.0);

        timeline.remove_clip("b").unwrap();
        assert_eq!(timeline.duration(), 5.0);
        assert_eq!(timeline.current_time(), 5.0);

        timeline.remove_clip("a").unwrap();
        assert_eq!(timeline.duration(), 12.0);
        assert!(matches!(
            timeline.remove_clip("a"),
            Err(TimelineError::ClipNotFound { .. })
        ));
    }

    #[test]
    fn test_move_into_occupied_slot_uses_first_fit() {
        let mut timeline = Timeline::new(0.0);
        timeline.place(clip("a", ClipKind::PrimaryVisual, 2.0), 0.0).unwrap();
        timeline.place(clip("b", ClipKind::PrimaryVisual, 2.0), 5.0).unwrap();
        timeline.place(clip("c", ClipKind::PrimaryVisual, 3.0), 10.0).unwrap();

        // dropping c onto b: the [2, 5) gap fits 3s
        let start = timeline.move_clip("c", 5.5).unwrap();
        assert_eq!(start, 2.0);
        assert_eq!(timeline.duration(), 7.0);
        assert_no_overlaps(&timeline);
    }

    #[test]
    fn test_move_to_own_position_is_stable() {
        let mut timeline = Timeline::new(0.0);
        timeline.place(clip("a", ClipKind::PrimaryVisual, 2.0), 1.0).unwrap();
        assert_eq!(timeline.move_clip("a", 1.0).unwrap(), 1.0);
    }

    #[test]
    fn test_resize_collision_replaces_clip() {
        let mut timeline = Timeline::new(0.0);
        timeline.place(clip("a", ClipKind::SpeechAudio, 2.0), 0.0).unwrap();
        timeline.place(clip("b", ClipKind::SpeechAudio, 2.0), 3.0).unwrap();

        let start = timeline.resize_clip("a", 4.0).unwrap();
        assert_eq!(start, 5.0);
        assert_eq!(timeline.duration(), 9.0);
        assert_no_overlaps(&timeline);

        assert!(matches!(
            timeline.resize_clip("b", 0.0),
            Err(TimelineError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn test_retarget_rules() {
        let mut timeline = Timeline::new(0.0);
        timeline.place(clip("v", ClipKind::PrimaryVisual, 3.0), 0.0).unwrap();
        timeline.place(clip("m", ClipKind::BackgroundMusic, 3.0), 0.0).unwrap();
        timeline.place(clip("t", ClipKind::TextOverlay, 3.0), 0.0).unwrap();

        // the music lane is taken at 0, so the reclassified clip moves after it
        let start = timeline.retarget_clip("v", ClipKind::BackgroundMusic).unwrap();
        assert_eq!(start, 3.0);
        assert_eq!(timeline.get("v").unwrap().track_type(), TrackType::Music);

        let err = timeline.retarget_clip("t", ClipKind::SpeechAudio).unwrap_err();
        assert!(matches!(err, TimelineError::IncompatibleRetarget { .. }));
        assert_eq!(timeline.get("t").unwrap().kind, ClipKind::TextOverlay);
    }

    #[test]
    fn test_invalid_clips_are_rejected() {
        let mut timeline = Timeline::new(0.0);
        assert!(timeline.place(clip("a", ClipKind::PrimaryVisual, 0.0), 0.0).is_err());
        assert!(timeline.place(clip("a", ClipKind::PrimaryVisual, f64::NAN), 0.0).is_err());
        assert!(timeline.place(clip("a", ClipKind::PrimaryVisual, 1.0), f64::INFINITY).is_err());

        timeline.place(clip("a", ClipKind::PrimaryVisual, 1.0), 0.0).unwrap();
        assert!(matches!(
            timeline.place(clip("a", ClipKind::SpeechAudio, 1.0), 0.0),
            Err(TimelineError::DuplicateClipId { .. })
        ));
    }

    #[test]
    fn test_seek_is_clamped() {
        let mut timeline = Timeline::new(10.0);
        assert_eq!(timeline.seek(25.0), 10.0);
        assert_eq!(timeline.seek(-1.0), 0.0);
        assert_eq!(timeline.seek(f64::NAN), 0.0);
    }

    #[test]
    fn test_clips_at_playhead() {
        let mut timeline = Timeline::new(0.0);
        timeline.append(clip("s", ClipKind::SpeechAudio, 4.0)).unwrap();
        timeline.append(clip("v", ClipKind::PrimaryVisual, 4.0)).unwrap();
        timeline.append(clip("v2", ClipKind::PrimaryVisual, 4.0)).unwrap();

        let ids: Vec<_> = timeline.clips_at(2.0).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["v", "s"]);
        let ids: Vec<_> = timeline.clips_at(4.0).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["v2"]);
    }

    #[test]
    fn test_restore_roundtrip() {
        let mut timeline = Timeline::new(0.0);
        timeline.append(clip("a", ClipKind::PrimaryVisual, 2.0)).unwrap();
        timeline.append(clip("b", ClipKind::PrimaryVisual, 3.0)).unwrap();
        timeline.seek(1.5);

        let json = serde_json::to_string(&timeline.state()).unwrap();
        let restored = Timeline::restore(serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored.clips(), timeline.clips());
        assert_eq!(restored.duration(), 5.0);
        assert_eq!(restored.current_time(), 1.5);
    }

    #[test]
    fn test_restore_repairs_overlapping_snapshot() {
        let mut a = clip("a", ClipKind::PrimaryVisual, 5.0);
        let mut b = clip("b", ClipKind::PrimaryVisual, 4.0);
        a.start_time = 0.0;
        b.start_time = 3.0;

        let restored = Timeline::restore(TimelineState {
            clips: vec![a, b],
            current_time: 0.0,
            default_duration: 0.0,
        })
        .unwrap();

        assert_eq!(restored.get("b").unwrap().start_time, 5.0);
    }

    #[test]
    fn test_random_drags_never_overlap() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        let kinds = [ClipKind::PrimaryVisual, ClipKind::SpeechAudio, ClipKind::OverlayImage];
        let mut timeline = Timeline::new(7.0);

        for i in 0..40 {
            let kind = kinds[i % kinds.len()];
            let duration = rng.gen_range(0.5..4.5);
            timeline.place(clip(&format!("c{i}"), kind, duration), rng.gen_range(0.0..30.0)).unwrap();
            assert_no_overlaps(&timeline);
            assert_eq!(timeline.duration(), expected_duration(&timeline, 7.0));
        }

        for round in 0..200 {
            let id = format!("c{}", rng.gen_range(0..40));
            match round % 3 {
                0 => {
                    timeline.move_clip(&id, rng.gen_range(-5.0..35.0)).unwrap();
                }
                1 => {
                    timeline.resize_clip(&id, rng.gen_range(0.25..5.25)).unwrap();
                }
                _ => {
                    let _ = timeline.retarget_clip(&id, kinds[rng.gen_range(0..kinds.len())]);
                }
            }
            assert_no_overlaps(&timeline);
            assert_eq!(timeline.duration(), expected_duration(&timeline, 7.0));
        }
    }
}
