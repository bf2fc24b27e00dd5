use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::script::types::Part;

/// Phrase that marks topic-suggestion output rather than a narration script
const MENU_SENTINEL: &str = "choose a topic";

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t]*(?:#{1,6}[ \t]*)?[*_]*[ \t]*(?:part|section|scene)[ \t]+(?:final|\d+)[ \t]*[*_]*[ \t]*(?:[:.(\-–—][^\n]*)?$",
        )
        .expect("section header pattern is valid")
    })
}

fn speech_label() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t]*[*_]*[ \t]*(?:dialogue|narration|voice[ -]?over|speech)[ \t]*[*_]*[ \t]*:[ \t]*[*_]*[ \t]*",
        )
        .expect("speech label pattern is valid")
    })
}

fn visual_label() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t]*[*_]*[ \t]*(?:visuals?|imagery|image)(?:[ \t]+(?:description|prompt))?[ \t]*[*_]*[ \t]*:[ \t]*[*_]*[ \t]*",
        )
        .expect("visual label pattern is valid")
    })
}

/// Splits raw narration scripts into ordered [`Part`]s
///
/// A script is a sequence of sections. Each section starts with a header line
/// such as `## PART 1`, `**Part Final**` or `Section 2: The Hook` (a title
/// after the number needs a `:`, `-`, `.` or `(`), and holds a
/// speech subsection (`Dialogue:`) and optionally an imagery subsection
/// (`Visual:`). Anything before the first header is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptParser;

impl ScriptParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw script. Zero recognized sections yields an empty list.
    pub fn parse(&self, raw: &str) -> Vec<Part> {
        let text = normalize_newlines(raw);
        let headers: Vec<_> = header_pattern().find_iter(&text).collect();

        debug!("Found {} section headers", headers.len());

        let mut parts = Vec::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            let body_end = headers.get(i + 1).map(|next| next.start()).unwrap_or(text.len());
            let body = &text[header.end()..body_end];

            let (speech, visual) = split_section(body);
            if speech.is_empty() {
                warn!("Section '{}' has no speech text, skipping", header.as_str().trim());
                continue;
            }

            parts.push(Part::new(parts.len(), speech, visual));
        }

        parts
    }

    /// Whether the text is a topic menu rather than narration
    pub fn is_menu_text(&self, raw: &str) -> bool {
        raw.to_lowercase().contains(MENU_SENTINEL)
    }
}

/// Parse a raw script with the default parser
pub fn parse(raw: &str) -> Vec<Part> {
    ScriptParser::new().parse(raw)
}

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Returns `(speech, visual)` for one section body
fn split_section(body: &str) -> (String, String) {
    let speech = speech_label().find(body);
    let visual = visual_label().find(body);

    let speech_text = match (speech, visual) {
        (Some(s), Some(v)) if v.start() > s.start() => &body[s.end()..v.start()],
        (Some(s), _) => &body[s.end()..],
        // No label: whatever precedes the imagery subsection is the narration
        (None, Some(v)) => &body[..v.start()],
        (None, None) => body,
    };

    let visual_text = match (visual, speech) {
        (Some(v), Some(s)) if s.start() > v.start() => &body[v.end()..s.start()],
        (Some(v), _) => &body[v.end()..],
        (None, _) => "",
    };

    (clean(speech_text), clean(visual_text))
}

/// Collapse line breaks and strip leftover emphasis markers at the edges
fn clean(text: &str) -> String {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    joined
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(parts: &[Part]) -> Vec<(usize, &str, &str)> {
        parts
            .iter()
            .map(|p| (p.index, p.speech_text.as_str(), p.image_description.as_str()))
            .collect()
    }

    #[test]
    fn test_basic_script() {
        let script = "## PART 1\n**Dialogue:** Hello\n**Visual:** sunrise\n## PART FINAL\n**Dialogue:** Bye";
        let parts = parse(script);

        assert_eq!(summary(&parts), vec![(0, "Hello", "sunrise"), (1, "Bye", "")]);
    }

    #[test]
    fn test_mixed_header_styles() {
        let script = "\
Title: My Video

### Part 1: Hook
Dialogue: Did you know?
Visual: a question mark

**PART 2**
**Narration**: It gets stranger.
**Visual**: a foggy forest

part final
dialogue: That's all.
";
        let parts = parse(script);

        assert_eq!(
            summary(&parts),
            vec![
                (0, "Did you know?", "a question mark"),
                (1, "It gets stranger.", "a foggy forest"),
                (2, "That's all.", ""),
            ]
        );
    }

    #[test]
    fn test_windows_and_old_mac_newlines() {
        let script = "PART 1\r\nDialogue: one\r\nVisual: cat\rPART 2\rDialogue: two";
        let parts = parse(script);

        assert_eq!(summary(&parts), vec![(0, "one", "cat"), (1, "two", "")]);
    }

    #[test]
    fn test_visual_before_dialogue() {
        let script = "PART 1\nVisual: mountains\nDialogue: Climb on.";
        let parts = parse(script);

        assert_eq!(summary(&parts), vec![(0, "Climb on.", "mountains")]);
    }

    #[test]
    fn test_multiline_speech_is_joined() {
        let script = "PART 1\nDialogue:\nFirst line\n\nsecond line\nVisual: x";
        let parts = parse(script);

        assert_eq!(parts[0].speech_text, "First line second line");
    }

    #[test]
    fn test_no_sections() {
        assert!(parse("Just some text without any headers").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_section_without_speech_is_dropped() {
        let script = "PART 1\nVisual: only a picture\nPART 2\nDialogue: words";
        let parts = parse(script);

        assert_eq!(summary(&parts), vec![(0, "words", "")]);
    }

    #[test]
    fn test_unlabeled_section_uses_body_as_speech() {
        let script = "PART 1\nJust narration here.\nVisual: a lamp";
        let parts = parse(script);

        assert_eq!(summary(&parts), vec![(0, "Just narration here.", "a lamp")]);
    }

    #[test]
    fn test_narration_starting_with_part_is_not_a_header() {
        let script = "PART 1\nPart 2 of my life began in Ohio.\nScene 3 was the worst.\nVisual: a farm\nSection 2 - The Move\nDialogue: We left.";
        let parts = parse(script);

        assert_eq!(
            summary(&parts),
            vec![
                (0, "Part 2 of my life began in Ohio. Scene 3 was the worst.", "a farm"),
                (1, "We left.", ""),
            ]
        );
    }

    #[test]
    fn test_part_ids_are_unique() {
        let parts = parse("PART 1\nDialogue: a\nPART 2\nDialogue: b");
        assert_ne!(parts[0].id, parts[1].id);
    }

    #[test]
    fn test_menu_detection() {
        let parser = ScriptParser::new();
        assert!(parser.is_menu_text("Here are some ideas. Choose a topic:\n1. Space\n2. Sea"));
        assert!(!parser.is_menu_text("PART 1\nDialogue: Space is big."));
    }
}
