use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// One subtitle entry, times in seconds from the start of the composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// 1-based position in the cue list
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Cue {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Build back-to-back cues from `(duration, text)` pairs in playback order
///
/// Entries without a usable duration get no cue and do not advance the clock.
pub fn build_cues<'a, I>(timed: I) -> Vec<Cue>
where
    I: IntoIterator<Item = (f64, &'a str)>,
{
    let mut cues = Vec::new();
    let mut clock = 0.0;

    for (duration, text) in timed {
        if !duration.is_finite() || duration <= 0.0 {
            continue;
        }
        let start = clock;
        clock += duration;
        cues.push(Cue {
            index: cues.len() + 1,
            start,
            end: clock,
            text: text.trim().to_string(),
        });
    }

    cues
}

/// Render cues as SubRip text
pub fn to_srt(cues: &[Cue]) -> String {
    let mut srt = String::new();
    for cue in cues {
        // Writing to a String cannot fail
        let _ = write!(
            srt,
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            srt_timestamp(cue.start),
            srt_timestamp(cue.end),
            cue.text
        );
    }
    srt
}

/// `HH:MM:SS,mmm`
pub fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (secs, millis) = (rest / 1000, rest % 1000);
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_cues() {
        let cues = build_cues(vec![(4.0, "one"), (6.0, "two"), (2.5, "three")]);
        let spans: Vec<_> = cues.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0.0, 4.0), (4.0, 10.0), (10.0, 12.5)]);
        assert_eq!(cues[2].index, 3);
    }

    #[test]
    fn test_unknown_durations_do_not_advance_clock() {
        let cues = build_cues(vec![(2.0, "a"), (0.0, "b"), (f64::NAN, "c"), (-1.0, "d"), (3.0, "e")]);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].text, "e");
        assert_eq!((cues[1].start, cues[1].end), (2.0, 5.0));
        for pair in cues.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_srt_output() {
        let srt = to_srt(&build_cues(vec![(4.0, "Hello"), (61.25, "Bye")]));
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:04,000\nHello\n\n2\n00:00:04,000 --> 00:01:05,250\nBye\n\n"
        );
    }

    #[test]
    fn test_timestamp_hours() {
        assert_eq!(srt_timestamp(3723.0456), "01:02:03,046");
        assert_eq!(srt_timestamp(-1.0), "00:00:00,000");
    }
}
