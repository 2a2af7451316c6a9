//! Turns a raw completion into ordered, offset-checked detections
//!
//! Parsing is pure: the same completion and input always give the same result.
//! Offsets are never taken on trust from the model. Every reported span is
//! located in the original input, and entries that cannot be located are
//! skipped and counted.

use serde_json::Value;

use super::prompt::{INPUT_OPEN, OUTPUT_CONTRACT_VERSION};
use crate::types::{
    Detection, ParseError, ParseFailure, ParseWarning, Transcript, WarningKind, CATEGORY_SSN,
    CATEGORY_SSN_LIKE,
};

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const DELIMITER_KEYWORD: &str = "DETECTIONS";

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub detections: Vec<Detection>,
    pub warnings: Vec<ParseWarning>,
    pub transcript: Transcript,
}

/// One finding as the model reported it, before it is located in the input
#[derive(Debug, Clone, Default, PartialEq)]
struct ReportedEntry {
    text: Option<String>,
    category: Option<String>,
    /// Character index, if the model volunteered one
    start: Option<usize>,
}

/// Stateless parser for `ssn-detect/v1` completions
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    /// Parse `raw` (the completion) against `input` (the text that was examined).
    pub fn parse(raw: &str, input: &str) -> Result<ParsedResponse, ParseError> {
        let (visible, mut reasoning, open_reasoning) = split_reasoning(raw);
        let visible = strip_echoed_input(&visible);
        let mut warnings = Vec::new();

        let delimiter = find_last_delimiter(visible);
        let open_reasoning = open_reasoning.filter(|&open| open <= visible.len());
        let (visible, trailing) = match (open_reasoning, delimiter) {
            (Some(_), None) => {
                return Err(ParseError::new(ParseFailure::UnfinishedReasoning, raw));
            }
            // Answered, then started reasoning again and was cut off.
            (Some(open), Some((line_start, _))) if line_start < open => {
                (&visible[..open], &visible[open..])
            }
            _ => (visible, ""),
        };
        let answer = match delimiter {
            Some((line_start, answer_start)) => {
                push_reasoning(&mut reasoning, &visible[..line_start]);
                visible[answer_start..].trim()
            }
            None => {
                warnings.push(ParseWarning::new(WarningKind::MissingDelimiter, 1));
                visible.trim()
            }
        };
        push_reasoning(&mut reasoning, trailing);

        let entries = match delimiter {
            Some(_) => read_delimited_answer(answer)
                .ok_or_else(|| ParseError::new(ParseFailure::MalformedAnswer, raw))?,
            None => read_json_answer(answer)
                .ok_or_else(|| ParseError::new(ParseFailure::NoRecognizableAnswer, raw))?,
        };

        let reported = entries.len();
        let (located, skipped) = locate_entries(entries, input);
        if skipped > 0 {
            warnings.push(ParseWarning::new(WarningKind::SkippedEntries, skipped));
        }

        if reported > 0 && located.is_empty() {
            if delimiter.is_none() {
                return Err(ParseError::new(ParseFailure::NoUsableEntries, raw));
            }
            warnings.push(ParseWarning::new(WarningKind::PartialResult, reported));
        }

        let (detections, dropped) = dedup_spans(located);
        if dropped > 0 {
            warnings.push(ParseWarning::new(WarningKind::DuplicateSpans, dropped));
        }

        let reasoning = if reasoning.is_empty() {
            None
        } else {
            Some(reasoning.join("\n\n"))
        };

        Ok(ParsedResponse {
            detections,
            warnings,
            transcript: Transcript {
                contract: OUTPUT_CONTRACT_VERSION.to_string(),
                raw: raw.to_string(),
                reasoning,
                answer: answer.to_string(),
            },
        })
    }
}

fn push_reasoning(parts: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
}

/// Separate `<think>` blocks from the rest of the completion.
///
/// A `</think>` with no opening tag closes an implicit block that started at
/// the beginning. An unterminated `<think>` loses only its tag, so a delimiter
/// written inside it can still be found; its offset in the visible text is
/// returned so the caller can tell whether any delimiter follows it.
fn split_reasoning(raw: &str) -> (String, Vec<String>, Option<usize>) {
    let mut visible = String::with_capacity(raw.len());
    let mut reasoning = Vec::new();
    let mut open_reasoning = None;
    let mut rest = raw;

    if let Some(close) = rest.find(THINK_CLOSE) {
        if rest.find(THINK_OPEN).map_or(true, |open| open > close) {
            push_reasoning(&mut reasoning, &rest[..close]);
            rest = &rest[close + THINK_CLOSE.len()..];
        }
    }

    loop {
        let Some(open) = rest.find(THINK_OPEN) else {
            visible.push_str(rest);
            break;
        };
        visible.push_str(&rest[..open]);
        let inner = &rest[open + THINK_OPEN.len()..];
        match inner.find(THINK_CLOSE) {
            Some(close) => {
                push_reasoning(&mut reasoning, &inner[..close]);
                rest = &inner[close + THINK_CLOSE.len()..];
            }
            None => {
                open_reasoning = Some(visible.len());
                visible.push_str(inner);
                break;
            }
        }
    }

    (visible, reasoning, open_reasoning)
}

/// Drop everything from the first `<input>` after the first delimiter.
///
/// A model that keeps going after answering tends to replay the few-shot
/// pattern, and the replayed delimiter must not replace the real answer.
fn strip_echoed_input(text: &str) -> &str {
    let Some((_, answer_start)) = delimiters(text).next() else {
        return text;
    };
    match text[answer_start..].find(INPUT_OPEN) {
        Some(echo) => &text[..answer_start + echo],
        None => text,
    }
}

/// Byte offsets of the last delimiter line and of the answer that follows it.
fn find_last_delimiter(text: &str) -> Option<(usize, usize)> {
    delimiters(text).last()
}

/// Every delimiter line in `text`, as (line start, answer start) byte offsets.
///
/// Accepts any number of leading `#`, any case, and an optional trailing `:`.
/// Text on the same line after the keyword belongs to the answer.
fn delimiters(text: &str) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut offset = 0;

    text.split_inclusive('\n').filter_map(move |line| {
        let line_start = offset;
        offset += line.len();

        let leading_ws = line.len() - line.trim_start().len();
        let trimmed = &line[leading_ws..];
        if !trimmed.starts_with('#') {
            return None;
        }
        let after_hashes = trimmed.trim_start_matches('#');
        let gap = after_hashes.len() - after_hashes.trim_start().len();
        let keyword = &after_hashes[gap..];
        let matches = keyword
            .get(..DELIMITER_KEYWORD.len())
            .is_some_and(|k| k.eq_ignore_ascii_case(DELIMITER_KEYWORD));
        if !matches {
            return None;
        }

        let mut tail = &keyword[DELIMITER_KEYWORD.len()..];
        if tail.starts_with(|c: char| c.is_alphanumeric()) {
            return None;
        }
        if let Some(stripped) = tail.strip_prefix(':') {
            tail = stripped;
        }
        Some((line_start, line_start + line.len() - tail.len()))
    })
}

/// Answer after a delimiter: JSON, `NONE`, or bullet lines.
fn read_delimited_answer(answer: &str) -> Option<Vec<ReportedEntry>> {
    if let Some(entries) = read_json_answer(answer) {
        return Some(entries);
    }
    if is_none_sentinel(answer) {
        return Some(Vec::new());
    }
    read_bullet_answer(answer)
}

/// JSON array, object with `detections`, or a single entry object, optionally fenced.
fn read_json_answer(answer: &str) -> Option<Vec<ReportedEntry>> {
    let body = fenced_body(answer).unwrap_or(answer);
    let value = first_json_value(body)?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("detections") {
            Some(Value::Array(items)) => items,
            Some(_) => return None,
            None if map.contains_key("text") => vec![Value::Object(map)],
            None => return None,
        },
        _ => return None,
    };

    Some(items.into_iter().map(entry_from_value).collect())
}

/// Content of the first markdown code fence, if any.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map(|i| i + 1)?;
    let body = &after[body_start..];
    Some(match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    })
}

/// Deserialize the first JSON array or object, ignoring anything around it.
fn first_json_value(text: &str) -> Option<Value> {
    let start = text.find(['[', '{'])?;
    let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    stream.next()?.ok()
}

fn entry_from_value(value: Value) -> ReportedEntry {
    match value {
        Value::String(text) => ReportedEntry {
            text: Some(text),
            ..Default::default()
        },
        Value::Object(map) => ReportedEntry {
            text: map
                .get("text")
                .or_else(|| map.get("value"))
                .and_then(Value::as_str)
                .map(str::to_string),
            category: map
                .get("category")
                .or_else(|| map.get("label"))
                .and_then(Value::as_str)
                .map(str::to_string),
            start: map
                .get("start")
                .and_then(Value::as_u64)
                .and_then(|s| usize::try_from(s).ok()),
        },
        _ => ReportedEntry::default(),
    }
}

fn is_none_sentinel(answer: &str) -> bool {
    let normalized = answer
        .trim()
        .trim_matches(|c: char| c == '.' || c == '*' || c == '`' || c == '"')
        .to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "none" | "no detections" | "nothing found" | "no ssn found" | "n/a"
    )
}

/// `- <text> | <category>` lines; other lines are ignored.
fn read_bullet_answer(answer: &str) -> Option<Vec<ReportedEntry>> {
    let entries: Vec<ReportedEntry> = answer
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let item = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix("• "))?;
            let (text, category) = match item.split_once('|') {
                Some((text, category)) => (text, Some(category)),
                None => (item, None),
            };
            Some(ReportedEntry {
                text: Some(unquote(text).to_string()),
                category: category.map(|c| unquote(c).to_string()).filter(|c| !c.is_empty()),
                start: None,
            })
        })
        .collect();

    if entries.is_empty() {
        None
    } else {
        Some(entries)
    }
}

fn unquote(text: &str) -> &str {
    text.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim()
}

/// Canonical category label. An entry without one came from the SSN detector
/// with no qualification, so it counts as an SSN.
fn normalize_category(category: Option<String>) -> String {
    let Some(category) = category else {
        return CATEGORY_SSN.to_string();
    };
    let key: String = category
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    match key.as_str() {
        "" | "ssn" => CATEGORY_SSN.to_string(),
        "notssnbutsimilar" | "ssnlike" | "similar" => CATEGORY_SSN_LIKE.to_string(),
        _ => category.trim().to_string(),
    }
}

/// Resolve reported entries to spans of `input`; returns the spans and the
/// number of entries that could not be placed.
fn locate_entries(entries: Vec<ReportedEntry>, input: &str) -> (Vec<Detection>, usize) {
    let mut located: Vec<Detection> = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for entry in entries {
        let text = entry.text.as_deref().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            skipped += 1;
            continue;
        }

        let start = entry
            .start
            .and_then(|hint| char_to_byte(input, hint))
            .filter(|&byte| input[byte..].starts_with(text))
            .or_else(|| first_unclaimed(input, text, &located));

        match start {
            Some(start) => {
                let end = start + text.len();
                located.push(Detection {
                    text: input[start..end].to_string(),
                    start,
                    end,
                    category: Some(normalize_category(entry.category)),
                });
            }
            None => skipped += 1,
        }
    }

    (located, skipped)
}

fn char_to_byte(input: &str, char_index: usize) -> Option<usize> {
    input
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(input.len()))
        .nth(char_index)
}

/// First occurrence of `text` not already taken by an identical span, falling
/// back to the very first occurrence.
fn first_unclaimed(input: &str, text: &str, claimed: &[Detection]) -> Option<usize> {
    let mut first = None;
    for (start, _) in input.match_indices(text) {
        first.get_or_insert(start);
        let taken = claimed
            .iter()
            .any(|d| d.start == start && d.end == start + text.len());
        if !taken {
            return Some(start);
        }
    }
    first
}

/// Order by start offset and drop spans that repeat or overlap an earlier one.
fn dedup_spans(mut spans: Vec<Detection>) -> (Vec<Detection>, usize) {
    spans.sort_by_key(|d| d.start);

    let mut kept: Vec<Detection> = Vec::with_capacity(spans.len());
    let mut dropped = 0;
    for span in spans {
        if kept.last().is_some_and(|prev| prev.overlaps(&span) || prev == &span) {
            dropped += 1;
        } else {
            kept.push(span);
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str, input: &str) -> ParsedResponse {
        ResponseParser::parse(raw, input).unwrap()
    }

    fn has_warning(parsed: &ParsedResponse, kind: WarningKind) -> bool {
        parsed.warnings.iter().any(|w| w.kind == kind)
    }

    #[test]
    fn test_nothink_single_ssn() {
        let input = "My SSN is 123-45-6789.";
        let raw = "### DETECTIONS\n[{\"text\": \"123-45-6789\", \"category\": \"SSN\"}]";
        let parsed = parse(raw, input);

        assert_eq!(parsed.detections.len(), 1);
        let d = &parsed.detections[0];
        assert_eq!(d.text, "123-45-6789");
        assert_eq!(d.category.as_deref(), Some("SSN"));
        assert_eq!((d.start, d.end), (10, 21));
        assert_eq!(&input[d.start..d.end], d.text);
        assert!(parsed.warnings.is_empty());
        assert!(parsed.transcript.reasoning.is_none());
        assert_eq!(parsed.transcript.contract, "ssn-detect/v1");
    }

    #[test]
    fn test_no_sensitive_data_is_empty_not_error() {
        let parsed = parse("### DETECTIONS\n[]", "No sensitive data here.");
        assert!(parsed.detections.is_empty());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_malformed_without_delimiter_is_parse_error() {
        let raw = "I could not really tell, sorry about that.";
        let err = ResponseParser::parse(raw, "whatever").unwrap_err();
        assert_eq!(err.reason, ParseFailure::NoRecognizableAnswer);
        assert_eq!(err.raw_transcript, raw);
    }

    #[test]
    fn test_malformed_after_delimiter_is_parse_error() {
        let err = ResponseParser::parse("### DETECTIONS\nwell, hmm", "x").unwrap_err();
        assert_eq!(err.reason, ParseFailure::MalformedAnswer);
    }

    #[test]
    fn test_think_block_is_stripped() {
        let input = "ID 123-45-6789 and phone 555-867-5309";
        let raw = "<think>\nThe user wrote 555-867-5309 which is a phone number. \
                   ### DETECTIONS [{\"text\": \"555-867-5309\"}]\n</think>\n\n\
                   ### DETECTIONS\n[{\"text\": \"123-45-6789\", \"category\": \"SSN\"}]";
        let parsed = parse(raw, input);

        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].text, "123-45-6789");
        assert!(parsed
            .transcript
            .reasoning
            .as_deref()
            .unwrap()
            .contains("phone number"));
    }

    #[test]
    fn test_pre_delimiter_text_never_becomes_a_detection() {
        let input = "Call 555-867-5309 or use 123-45-6789";
        let raw = "Let me see: [\"555-867-5309\"] looks like a phone.\n### DETECTIONS\n[\"123-45-6789\"]";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].text, "123-45-6789");
        assert_eq!(parsed.detections[0].category.as_deref(), Some(CATEGORY_SSN));
        assert!(parsed.transcript.reasoning.unwrap().contains("looks like a phone"));
    }

    #[test]
    fn test_last_delimiter_wins() {
        let input = "a 123-45-6789 b 987 65 4321";
        let raw = "### DETECTIONS\n[]\nWait, I missed one.\n### DETECTIONS\n[\"123-45-6789\", \"987 65 4321\"]";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections.len(), 2);
    }

    #[test]
    fn test_orphan_think_close() {
        let input = "SSN 123456789";
        let raw = "thinking without an opening tag</think>\n### DETECTIONS\n[\"123456789\"]";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections[0].start, 4);
        assert_eq!(
            parsed.transcript.reasoning.as_deref(),
            Some("thinking without an opening tag")
        );
    }

    #[test]
    fn test_unterminated_think_with_delimiter() {
        let input = "SSN 123-45-6789";
        let raw = "<think>\nhmm, that looks like one\n### DETECTIONS\n[\"123-45-6789\"]";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections.len(), 1);
    }

    #[test]
    fn test_cut_off_reasoning_is_parse_error() {
        let raw = "<think>\nCandidates so far: [\"555-867-5309\"] hmm, is that";
        let err = ResponseParser::parse(raw, "Call 555-867-5309 about SSN 123-45-6789").unwrap_err();
        assert_eq!(err.reason, ParseFailure::UnfinishedReasoning);
        assert_eq!(err.raw_transcript, raw);
    }

    #[test]
    fn test_reasoning_after_answer_is_not_parsed() {
        let input = "Call 555-867-5309 about SSN 123-45-6789";
        let raw = "### DETECTIONS\n[\"123-45-6789\"]\n<think>\nalso [\"555-867-5309\"] maybe";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].text, "123-45-6789");
        assert!(!parsed.transcript.answer.contains("555-867-5309"));
        assert!(parsed.transcript.reasoning.unwrap().contains("maybe"));
    }

    #[test]
    fn test_echoed_example_does_not_replace_answer() {
        let input = "My SSN is 123-45-6789.";
        let raw = "### DETECTIONS\n[{\"text\":\"123-45-6789\",\"category\":\"SSN\"}]\n\n\
                   <input>\nWhat is the capital of France?\n</input>\n### DETECTIONS\n[]";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].text, "123-45-6789");
        assert!(!parsed.transcript.answer.contains("France"));
        assert_eq!(parsed.transcript.raw, raw);
    }

    #[test]
    fn test_uncategorized_entries_count_as_ssn() {
        let input = "My SSN is 123-45-6789, or 987 65 4321.";
        let parsed = parse(
            "### DETECTIONS\n[\"123-45-6789\", {\"text\": \"987 65 4321\", \"category\": \"\"}]",
            input,
        );
        assert_eq!(parsed.detections.len(), 2);
        assert!(parsed.detections.iter().all(Detection::is_ssn));

        let parsed = parse("### DETECTIONS\n- 123-45-6789", input);
        assert!(parsed.detections[0].is_ssn());
    }

    #[test]
    fn test_fenced_json_and_object_form() {
        let input = "mine: 123-45-6789";
        let raw = "### DETECTIONS\n```json\n{\"detections\": [{\"text\": \"123-45-6789\", \"category\": \"ssn\"}]}\n```";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections[0].category.as_deref(), Some(CATEGORY_SSN));
    }

    #[test]
    fn test_none_sentinel_and_bullets() {
        assert!(parse("### DETECTIONS\nNONE", "hi").detections.is_empty());

        let input = "SSN 123-45-6789, phone 555-867-5309";
        let raw = "### DETECTIONS\n- 123-45-6789 | SSN\n- \"555-867-5309\" | not SSN but similar";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections.len(), 2);
        assert_eq!(
            parsed.detections[1].category.as_deref(),
            Some(CATEGORY_SSN_LIKE)
        );
    }

    #[test]
    fn test_missing_delimiter_json_best_effort() {
        let input = "SSN 123-45-6789";
        let parsed = parse("Sure! [{\"text\": \"123-45-6789\", \"category\": \"SSN\"}]", input);
        assert_eq!(parsed.detections.len(), 1);
        assert!(has_warning(&parsed, WarningKind::MissingDelimiter));
    }

    #[test]
    fn test_missing_delimiter_no_usable_entries() {
        let err = ResponseParser::parse("[{\"text\": \"000-00-0000\"}]", "no numbers").unwrap_err();
        assert_eq!(err.reason, ParseFailure::NoUsableEntries);
    }

    #[test]
    fn test_unresolvable_entries_give_partial_result() {
        let parsed = parse(
            "### DETECTIONS\n[{\"text\": \"999-99-9999\", \"category\": \"SSN\"}]",
            "nothing like that here",
        );
        assert!(parsed.detections.is_empty());
        assert!(has_warning(&parsed, WarningKind::PartialResult));
        assert!(has_warning(&parsed, WarningKind::SkippedEntries));
    }

    #[test]
    fn test_malformed_entries_skipped_not_fatal() {
        let input = "SSN 123-45-6789";
        let raw = "### DETECTIONS\n[42, {\"category\": \"SSN\"}, {\"text\": \"\"}, \"123-45-6789\"]";
        let parsed = parse(raw, input);
        assert_eq!(parsed.detections.len(), 1);
        let skipped = parsed
            .warnings
            .iter()
            .find(|w| w.kind == WarningKind::SkippedEntries)
            .unwrap();
        assert_eq!(skipped.count, 3);
    }

    #[test]
    fn test_duplicates_and_overlaps_keep_first_by_offset() {
        let input = "x 123-45-6789 y";
        let raw = "### DETECTIONS\n[\"45-6789\", \"123-45-6789\", \"123-45-6789\"]";
        let parsed = parse(raw, input);
        // The repeated full number has no second occurrence, so it maps to the
        // same span and is dropped along with the overlapping suffix.
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].text, "123-45-6789");
        assert!(has_warning(&parsed, WarningKind::DuplicateSpans));
    }

    #[test]
    fn test_repeated_number_maps_to_each_occurrence() {
        let input = "first 123-45-6789 then again 123-45-6789";
        let parsed = parse("### DETECTIONS\n[\"123-45-6789\", \"123-45-6789\"]", input);
        assert_eq!(parsed.detections.len(), 2);
        assert_eq!(parsed.detections[0].start, 6);
        assert_eq!(parsed.detections[1].start, 29);
    }

    #[test]
    fn test_start_hint_is_char_index_and_verified() {
        let input = "né 123-45-6789 and 123-45-6789";
        // Char index 19 is the second occurrence (byte 20 because of 'é').
        let parsed = parse(
            "### DETECTIONS\n[{\"text\": \"123-45-6789\", \"start\": 19}]",
            input,
        );
        assert_eq!(parsed.detections[0].start, 20);

        // A wrong hint falls back to searching.
        let parsed = parse(
            "### DETECTIONS\n[{\"text\": \"123-45-6789\", \"start\": 2}]",
            input,
        );
        assert_eq!(parsed.detections[0].start, 4);
    }

    #[test]
    fn test_offsets_on_multibyte_input() {
        let input = "日本語のテキスト 987 65 4321 です";
        let parsed = parse("### DETECTIONS\n[\"987 65 4321\"]", input);
        let d = &parsed.detections[0];
        assert!(input.is_char_boundary(d.start) && input.is_char_boundary(d.end));
        assert_eq!(&input[d.start..d.end], "987 65 4321");
    }

    #[test]
    fn test_delimiter_variants() {
        let input = "123-45-6789";
        for raw in [
            "## Detections:\n[\"123-45-6789\"]",
            "   ### DETECTIONS   \n[\"123-45-6789\"]",
            "### DETECTIONS [\"123-45-6789\"]",
        ] {
            let parsed = parse(raw, input);
            assert_eq!(parsed.detections.len(), 1, "raw: {raw}");
            assert!(!has_warning(&parsed, WarningKind::MissingDelimiter));
        }
        // "DETECTIONSX" is not the delimiter.
        assert!(find_last_delimiter("### DETECTIONSX\n[]").is_none());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let input = "a 123-45-6789 b 555-867-5309";
        let raw = "<think>ok</think>### DETECTIONS\n[\"555-867-5309\", \"123-45-6789\"]";
        assert_eq!(parse(raw, input), parse(raw, input));
    }
}
