//! Markdown stripping and sentence-boundary segmentation.
//!
//! Two passes: `strip_markdown` removes markdown constructs while keeping a
//! per-character map back to source byte offsets, then `parse_with_options`
//! walks the stripped stream looking for terminal punctuation, applying the
//! decimal/acronym/URL/abbreviation exceptions described alongside each check.

use std::time::Duration;

use crate::cache_key::compute_key;
use crate::duration::estimate_duration;
use crate::queue_types::Priority;

/// A speakable unit extracted from a source document.
///
/// Created once per document load; immutable thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub id: u64,
    pub text: String,
    /// Byte offset range in the original source document.
    pub start: usize,
    pub end: usize,
    /// Position in the ordered sentence list.
    pub index: usize,
    pub estimated_duration: Duration,
    pub priority: Priority,
}

impl Sentence {
    /// Cache key for this sentence at a given voice/speed. Not stored on the
    /// sentence itself since voice and speed can change after parsing.
    pub fn cache_key(&self, voice: &str, speed: f64) -> String {
        compute_key(&self.text, voice, speed)
    }
}

pub const DEFAULT_MIN_LENGTH: usize = 3;

/// Parses `markdown` into sentences using default settings.
///
/// Returns an empty list for empty or whitespace-only input. Never panics;
/// unrecognized constructs are passed through as literal text.
pub fn parse(markdown: &str) -> Vec<Sentence> {
    parse_with_options(markdown, DEFAULT_MIN_LENGTH, crate::duration::DEFAULT_WPM)
}

pub fn parse_with_options(markdown: &str, min_length: usize, wpm: f64) -> Vec<Sentence> {
    if markdown.trim().is_empty() {
        return Vec::new();
    }

    let (stripped, map) = strip_markdown(markdown);
    let chars: Vec<char> = stripped.chars().collect();
    let src_len = markdown.len();

    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut id: u64 = 0;
    let mut index = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\n' {
            if has_nonspace(&chars, start, i) {
                push_sentence(
                    &mut sentences, &chars, &map, start, i, src_len, &mut id, &mut index, min_length, wpm,
                );
            }
            i += 1;
            start = i;
            continue;
        }

        if is_terminator(ch) {
            let group_end = consume_terminator_group(&chars, i);
            if should_split(&chars, i, group_end) {
                push_sentence(
                    &mut sentences, &chars, &map, start, group_end, src_len, &mut id, &mut index, min_length, wpm,
                );
                let mut j = group_end;
                while j < chars.len() && chars[j].is_whitespace() && chars[j] != '\n' {
                    j += 1;
                }
                i = j;
                start = i;
                continue;
            }
            i = group_end;
            continue;
        }

        i += 1;
    }

    if has_nonspace(&chars, start, chars.len()) {
        push_sentence(
            &mut sentences, &chars, &map, start, chars.len(), src_len, &mut id, &mut index, min_length, wpm,
        );
    }

    sentences
}

#[allow(clippy::too_many_arguments)]
fn push_sentence(
    sentences: &mut Vec<Sentence>,
    chars: &[char],
    map: &[usize],
    a: usize,
    b: usize,
    src_len: usize,
    id: &mut u64,
    index: &mut usize,
    min_length: usize,
    wpm: f64,
) {
    let mut ta = a;
    while ta < b && chars[ta].is_whitespace() {
        ta += 1;
    }
    let mut tb = b;
    while tb > ta && chars[tb - 1].is_whitespace() {
        tb -= 1;
    }
    if tb <= ta {
        return;
    }

    let text = collapse_whitespace(&chars[ta..tb].iter().collect::<String>());
    if text.len() < min_length {
        return;
    }

    let src_start = map[ta];
    let src_end = if tb < map.len() { map[tb] } else { src_len };
    let estimated_duration = estimate_duration(&text, wpm);

    sentences.push(Sentence {
        id: *id,
        text,
        start: src_start,
        end: src_end,
        index: *index,
        estimated_duration,
        priority: Priority::Normal,
    });
    *id += 1;
    *index += 1;
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn has_nonspace(chars: &[char], a: usize, b: usize) -> bool {
    chars[a..b].iter().any(|c| !c.is_whitespace())
}

fn is_terminator(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '…')
}

fn consume_terminator_group(chars: &[char], i: usize) -> usize {
    let mut j = i;
    while j < chars.len() && is_terminator(chars[j]) {
        j += 1;
    }
    j
}

/// A period/bang/question-mark group is a real sentence boundary unless one
/// of the documented exceptions applies.
fn should_split(chars: &[char], term_start: usize, term_end: usize) -> bool {
    let followed_by_space_or_eof = term_end == chars.len() || chars[term_end].is_whitespace();
    if !followed_by_space_or_eof {
        // Embedded in a longer token: a decimal, an acronym's internal dot, a URL, etc.
        return false;
    }

    if is_inside_url(chars, term_start, term_end) {
        return false;
    }

    if term_end - term_start == 1 && chars[term_start] == '.' {
        if let Some(word_start) = preceding_word_start(chars, term_start) {
            let word: String = chars[word_start..term_start].iter().collect();
            if is_known_abbreviation(&word) {
                let next = following_word(chars, term_end);
                if !is_sentence_starter(&next) {
                    return false;
                }
            }
        }
    }

    true
}

fn preceding_word_start(chars: &[char], term_start: usize) -> Option<usize> {
    if term_start == 0 {
        return None;
    }
    let mut j = term_start;
    while j > 0 {
        let c = chars[j - 1];
        if c.is_alphanumeric() || c == '.' {
            j -= 1;
        } else {
            break;
        }
    }
    if j == term_start {
        None
    } else {
        Some(j)
    }
}

fn following_word(chars: &[char], term_end: usize) -> String {
    let mut j = term_end;
    while j < chars.len() && chars[j].is_whitespace() {
        j += 1;
    }
    let word_start = j;
    while j < chars.len() && chars[j].is_alphanumeric() {
        j += 1;
    }
    chars[word_start..j].iter().collect()
}

const ABBREVIATIONS: &[&str] = &[
    "Dr", "Mr", "Mrs", "Ms", "Ph.D", "B.S", "M.A", "Inc", "Corp", "Ltd", "e.g", "i.e", "etc",
    "Jan", "Feb", "Mar", "Apr", "Jun", "Jul", "Aug", "Sep", "Sept", "Oct", "Nov", "Dec", "St",
    "Ave", "Blvd", "ft", "lbs",
];

/// Matches the catalog above, plus short all-caps acronym fragments like
/// "U", "U.S", or "U.S.A" (dots stripped, 1-4 uppercase letters remain).
fn is_known_abbreviation(word: &str) -> bool {
    if ABBREVIATIONS.contains(&word) {
        return true;
    }
    let stripped: String = word.chars().filter(|c| *c != '.').collect();
    !stripped.is_empty() && stripped.len() <= 4 && stripped.chars().all(|c| c.is_ascii_uppercase())
}

const SENTENCE_STARTERS: &[&str] = &[
    "He", "She", "It", "They", "We", "I", "You", "This", "That", "These", "Those", "The", "A",
    "An", "There", "Here",
];

fn is_sentence_starter(word: &str) -> bool {
    !word.is_empty() && SENTENCE_STARTERS.contains(&word)
}

fn is_inside_url(chars: &[char], term_start: usize, term_end: usize) -> bool {
    let mut lo = term_start;
    while lo > 0 && !chars[lo - 1].is_whitespace() {
        lo -= 1;
    }
    let mut hi = term_end;
    while hi < chars.len() && !chars[hi].is_whitespace() {
        hi += 1;
    }
    let token: String = chars[lo..hi].iter().collect::<String>().to_lowercase();
    token.contains("://") || token.starts_with("www.") || looks_like_domain(&token)
}

fn looks_like_domain(token: &str) -> bool {
    const TLDS: &[&str] = &["com", "org", "net", "io", "dev", "edu", "gov", "co"];
    match token.rfind('.') {
        Some(last_dot) if last_dot > 0 => {
            let tld: String = token[last_dot + 1..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();
            TLDS.contains(&tld.as_str())
        }
        _ => false,
    }
}

/// Strips markdown constructs from `src`, returning the stripped text plus a
/// per-character map back to the originating byte offset in `src`.
///
/// Fenced code blocks are dropped entirely. Blank lines, list items, and
/// horizontal rules collapse into a single paragraph-break marker (`\n`) in
/// the output; everything else on a line joins the previous line with a
/// single space, mirroring normal markdown soft-wrap behavior.
fn strip_markdown(src: &str) -> (String, Vec<usize>) {
    let mut out = String::new();
    let mut map: Vec<usize> = Vec::new();
    let mut in_fence = false;
    let mut pending_break = false;
    let mut any_emitted = false;
    let mut offset = 0usize;

    for raw_line in src.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();
        let line = raw_line.strip_suffix('\n').unwrap_or(raw_line);
        let trimmed = line.trim();

        if is_fence_marker(trimmed) {
            in_fence = !in_fence;
            pending_break = true;
            continue;
        }
        if in_fence {
            pending_break = true;
            continue;
        }
        if trimmed.is_empty() {
            pending_break = true;
            continue;
        }
        if is_horizontal_rule(trimmed) {
            pending_break = true;
            continue;
        }

        if any_emitted {
            if pending_break {
                out.push('\n');
            } else {
                out.push(' ');
            }
            map.push(line_start);
        }
        pending_break = false;

        let (content, content_offset, is_list_item) = strip_line_prefix(line, line_start);
        if emit_inline(content, content_offset, &mut out, &mut map) {
            any_emitted = true;
        }
        if is_list_item {
            pending_break = true;
        }
    }

    (out, map)
}

fn is_fence_marker(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn is_horizontal_rule(trimmed: &str) -> bool {
    if trimmed.len() < 3 {
        return false;
    }
    let first = trimmed.chars().next().unwrap();
    if first != '-' && first != '*' && first != '_' {
        return false;
    }
    trimmed.chars().all(|c| c == first || c.is_whitespace())
        && trimmed.chars().filter(|&c| c == first).count() >= 3
}

fn count_leading_spaces(s: &str) -> usize {
    s.bytes().take_while(|&b| b == b' ').count()
}

/// Strips blockquote markers, a heading's `#` run, and a bullet/numbered
/// marker from the front of a line. Returns the remaining content, its
/// absolute byte offset in the source, and whether this was a list item.
fn strip_line_prefix(line: &str, line_start: usize) -> (&str, usize, bool) {
    let bytes = line.as_bytes();
    let len = bytes.len();
    let mut pos = 0usize;

    loop {
        let ws = count_leading_spaces(&line[pos..]);
        let p = pos + ws;
        if p < len && bytes[p] == b'>' {
            pos = p + 1;
            if pos < len && bytes[pos] == b' ' {
                pos += 1;
            }
        } else {
            break;
        }
    }

    let ws = count_leading_spaces(&line[pos..]);
    let p = pos + ws;

    let mut hashes = 0usize;
    while p + hashes < len && bytes[p + hashes] == b'#' && hashes < 6 {
        hashes += 1;
    }
    if hashes > 0 && (p + hashes == len || bytes[p + hashes] == b' ') {
        let mut np = p + hashes;
        if np < len && bytes[np] == b' ' {
            np += 1;
        }
        return (&line[np..], line_start + np, false);
    }

    if p < len && matches!(bytes[p], b'-' | b'*' | b'+') && p + 1 < len && bytes[p + 1] == b' ' {
        let np = p + 2;
        return (&line[np..], line_start + np, true);
    }

    let mut d = p;
    while d < len && bytes[d].is_ascii_digit() {
        d += 1;
    }
    if d > p && d < len && bytes[d] == b'.' && d + 1 < len && bytes[d + 1] == b' ' {
        let np = d + 2;
        return (&line[np..], line_start + np, true);
    }

    (&line[pos..], line_start + pos, false)
}

fn parse_link(content: &str, bracket_pos: usize) -> Option<(std::ops::Range<usize>, usize)> {
    let rest = &content[bracket_pos + 1..];
    let close = rest.find(']')?;
    let text_start = bracket_pos + 1;
    let text_end = text_start + close;
    let after_bracket = text_end + 1;
    if content.as_bytes().get(after_bracket) != Some(&b'(') {
        return None;
    }
    let paren_rest = &content[after_bracket + 1..];
    let close_paren = paren_rest.find(')')?;
    let after = after_bracket + 1 + close_paren + 1;
    Some((text_start..text_end, after))
}

fn emit_plain_inline(s: &str, base: usize, out: &mut String, map: &mut Vec<usize>, emitted_any: &mut bool) {
    for (off, ch) in s.char_indices() {
        out.push(ch);
        map.push(base + off);
        if !ch.is_whitespace() {
            *emitted_any = true;
        }
    }
}

/// Scans a line's content for inline markdown (code spans, emphasis, links,
/// images), emitting the speakable text into `out`/`map`. Returns whether
/// any non-whitespace character was emitted.
fn emit_inline(content: &str, base_offset: usize, out: &mut String, map: &mut Vec<usize>) -> bool {
    let bytes = content.as_bytes();
    let len = bytes.len();
    let mut i = 0usize;
    let mut emitted_any = false;

    while i < len {
        if bytes[i] == b'!' && i + 1 < len && bytes[i + 1] == b'[' {
            if let Some((_, after)) = parse_link(content, i + 1) {
                i = after;
                continue;
            }
        }

        if bytes[i] == b'[' {
            if let Some((text_range, after)) = parse_link(content, i) {
                emit_plain_inline(&content[text_range.clone()], base_offset + text_range.start, out, map, &mut emitted_any);
                i = after;
                continue;
            }
        }

        if bytes[i] == b'`' {
            if let Some(rel_end) = content[i + 1..].find('`') {
                let inner_start = i + 1;
                let inner_end = inner_start + rel_end;
                emit_plain_inline(&content[inner_start..inner_end], base_offset + inner_start, out, map, &mut emitted_any);
                i = inner_end + 1;
                continue;
            }
        }

        if bytes[i] == b'*' && i + 1 < len && bytes[i + 1] == b'*' {
            if let Some(rel_end) = content[i + 2..].find("**") {
                let inner_start = i + 2;
                let inner_end = inner_start + rel_end;
                emit_plain_inline(&content[inner_start..inner_end], base_offset + inner_start, out, map, &mut emitted_any);
                i = inner_end + 2;
                continue;
            }
        }
        if bytes[i] == b'_' && i + 1 < len && bytes[i + 1] == b'_' {
            if let Some(rel_end) = content[i + 2..].find("__") {
                let inner_start = i + 2;
                let inner_end = inner_start + rel_end;
                emit_plain_inline(&content[inner_start..inner_end], base_offset + inner_start, out, map, &mut emitted_any);
                i = inner_end + 2;
                continue;
            }
        }
        if bytes[i] == b'*' {
            if let Some(rel_end) = content[i + 1..].find('*') {
                let inner_start = i + 1;
                let inner_end = inner_start + rel_end;
                emit_plain_inline(&content[inner_start..inner_end], base_offset + inner_start, out, map, &mut emitted_any);
                i = inner_end + 1;
                continue;
            }
        }
        if bytes[i] == b'_' {
            if let Some(rel_end) = content[i + 1..].find('_') {
                let inner_start = i + 1;
                let inner_end = inner_start + rel_end;
                emit_plain_inline(&content[inner_start..inner_end], base_offset + inner_start, out, map, &mut emitted_any);
                i = inner_end + 1;
                continue;
            }
        }

        let ch = content[i..].chars().next().unwrap();
        out.push(ch);
        map.push(base_offset + i);
        if !ch.is_whitespace() {
            emitted_any = true;
        }
        i += ch.len_utf8();
    }

    emitted_any
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(markdown: &str) -> Vec<String> {
        parse(markdown).into_iter().map(|s| s.text).collect()
    }

    #[test]
    fn empty_input_yields_no_sentences() {
        assert!(texts("").is_empty());
        assert!(texts("   \n\n  ").is_empty());
    }

    #[test]
    fn basic_terminal_punctuation_splits() {
        assert_eq!(texts("First. Second. Third."), vec!["First.", "Second.", "Third."]);
    }

    #[test]
    fn title_abbreviation_does_not_split_before_a_name() {
        let sentences = texts("Dr. Smith works at U.S.A. Inc. He is great.");
        assert_eq!(sentences, vec!["Dr. Smith works at U.S.A. Inc.", "He is great."]);
    }

    #[test]
    fn fenced_code_block_is_excluded_entirely() {
        let md = "Before.\n\n```\ncode\n```\n\nAfter.";
        assert_eq!(texts(md), vec!["Before.", "After."]);
    }

    #[test]
    fn decimal_numbers_do_not_split() {
        assert_eq!(texts("Pi is 3.14 and that is fun."), vec!["Pi is 3.14 and that is fun."]);
    }

    #[test]
    fn urls_do_not_split() {
        assert_eq!(
            texts("Visit https://example.com/page.html for more info."),
            vec!["Visit https://example.com/page.html for more info."]
        );
    }

    #[test]
    fn headings_emphasis_links_and_images_are_stripped() {
        let md = "# Title\n\nThis is **bold** and *italic* with `code` and a [link](https://x.com) and ![alt](img.png) done.";
        let result = texts(md);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], "Title");
        assert_eq!(result[1], "This is bold and italic with code and a link and done.");
    }

    #[test]
    fn bullet_items_are_kept_and_separated() {
        let result = texts("Items:\n- first\n- second");
        assert_eq!(result, vec!["Items: first", "second"]);
    }

    #[test]
    fn min_length_drops_short_fragments() {
        let result = parse_with_options("Ok. A. A longer sentence here.", DEFAULT_MIN_LENGTH, crate::duration::DEFAULT_WPM);
        let texts: Vec<&str> = result.iter().map(|s| s.text.as_str()).collect();
        assert!(!texts.contains(&"A."));
    }

    #[test]
    fn sentence_indices_and_ids_are_sequential() {
        let sentences = parse("First. Second. Third.");
        for (i, s) in sentences.iter().enumerate() {
            assert_eq!(s.index, i);
            assert_eq!(s.id, i as u64);
        }
    }

    #[test]
    fn start_end_offsets_are_monotonic_and_within_source() {
        let src = "First. Second. Third.";
        let sentences = parse(src);
        let mut last_end = 0;
        for s in &sentences {
            assert!(s.start >= last_end);
            assert!(s.end <= src.len());
            assert!(s.start < s.end);
            last_end = s.end;
        }
    }

    #[test]
    fn malformed_markdown_never_panics_and_is_passed_through() {
        let md = "[unclosed link (broken **bold *italic `code";
        let result = parse(md);
        assert!(!result.is_empty());
    }

    #[test]
    fn cache_key_changes_with_voice_and_speed() {
        let sentences = parse("Hello there.");
        let s = &sentences[0];
        assert_ne!(s.cache_key("a", 1.0), s.cache_key("b", 1.0));
        assert_ne!(s.cache_key("a", 1.0), s.cache_key("a", 1.5));
    }

    #[test]
    fn ellipsis_and_mixed_punctuation_are_treated_as_one_boundary() {
        assert_eq!(texts("Wait... what?! Really."), vec!["Wait...", "what?!", "Really."]);
    }

    #[test]
    fn horizontal_rule_is_dropped() {
        assert_eq!(texts("Above.\n\n---\n\nBelow."), vec!["Above.", "Below."]);
    }
}
