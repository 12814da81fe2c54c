//! String-aware, single-pass scanners over JSON-ish text.
//!
//! All scanners work on bytes. Structural JSON characters are ASCII, and every
//! index returned here sits on an ASCII byte or at the end of the text, so the
//! results are always valid `str` slice boundaries.

/// Byte index of the first `{` not preceded by a backslash.
pub fn find_object_start(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .find(|&(idx, &b)| b == b'{' && (idx == 0 || bytes[idx - 1] != b'\\'))
        .map(|(idx, _)| idx)
}

/// Byte index of the bracket closing the one at `start`.
///
/// Braces and brackets inside string literals are ignored. Gives up (returns
/// `None`) when the text ends first, when nesting exceeds `max_depth`, or when
/// more than `max_scan` bytes would have to be examined.
pub fn find_matching_close(
    text: &str,
    start: usize,
    max_depth: usize,
    max_scan: usize,
) -> Option<usize> {
    let bytes = text.as_bytes();
    match bytes.get(start) {
        Some(b'{') | Some(b'[') => {}
        _ => return None,
    }

    let end = bytes.len().min(start.saturating_add(max_scan));
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &b) in bytes.iter().enumerate().take(end).skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > max_depth {
                    return None;
                }
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }

    None
}

/// Byte offset at which bracket nesting first exceeds `max_depth`, if ever.
///
/// Used to cut adversarially deep input before any decoder sees it.
pub fn depth_overflow_offset(text: &str, max_depth: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                if depth > max_depth {
                    return Some(idx);
                }
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    None
}

/// Bracket depth just before each of `offsets`, which must be ascending.
///
/// Brackets inside string literals are not counted. Offsets past the end of
/// the text get the depth at the end.
pub fn depths_at(text: &str, offsets: &[usize]) -> Vec<usize> {
    let bytes = text.as_bytes();
    let mut depths = Vec::with_capacity(offsets.len());
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut idx = 0usize;

    for &offset in offsets {
        let stop = offset.min(bytes.len());
        while idx < stop {
            let b = bytes[idx];
            idx += 1;
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        depths.push(depth);
    }

    depths
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Object: a key or `}`
    Key,
    /// Object: `:` after a key
    Colon,
    /// Object or array: a value (array also accepts `]`)
    Value,
    /// Object or array: `,` or the closer
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object(Expect),
    Array(Expect),
}

impl Frame {
    fn closer(&self) -> char {
        match self {
            Frame::Object(_) => '}',
            Frame::Array(_) => ']',
        }
    }

    fn expect(&self) -> Expect {
        match self {
            Frame::Object(e) | Frame::Array(e) => *e,
        }
    }

    fn set(&mut self, next: Expect) {
        match self {
            Frame::Object(e) | Frame::Array(e) => *e = next,
        }
    }
}

/// Where a truncated JSON object stopped and what it takes to close it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncationState {
    /// Open containers, outermost first, as their closing characters
    closers: Vec<char>,
    /// End of the usable prefix when an open value string is closed in place
    open_value_string_end: Option<usize>,
    /// End of the prefix after which closers alone yield valid JSON
    safe_end: usize,
}

impl TruncationState {
    fn closing_sequence(&self) -> String {
        self.closers.iter().rev().collect()
    }

    /// Repairs to try, most faithful first.
    ///
    /// The first closes a dangling value string in place and keeps all of its
    /// text. The second rolls back to the last complete value.
    pub fn candidates(&self, text: &str) -> Vec<String> {
        let closing = self.closing_sequence();
        let mut out = Vec::with_capacity(2);

        if let Some(end) = self.open_value_string_end {
            let mut repaired = String::with_capacity(end + closing.len() + 1);
            repaired.push_str(&text[..end]);
            repaired.push('"');
            repaired.push_str(&closing);
            out.push(repaired);
        }

        let mut rolled_back = String::with_capacity(self.safe_end + closing.len());
        rolled_back.push_str(&text[..self.safe_end]);
        rolled_back.push_str(&closing);
        if !out.contains(&rolled_back) {
            out.push(rolled_back);
        }

        out
    }
}

/// Scan an object that starts at byte 0 and report how it was cut off.
///
/// Scanning stops at end of text or at the first byte that cannot continue
/// valid JSON; that point is treated as the truncation point. Returns `None`
/// when the object actually closes (nothing to complete), when the text does
/// not start with `{`, or when nesting exceeds `max_depth`.
pub fn scan_truncation(text: &str, max_depth: usize) -> Option<TruncationState> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'{') {
        return None;
    }

    let mut stack: Vec<Frame> = vec![Frame::Object(Expect::Key)];
    let mut safe_end = 1usize;
    let mut in_string = false;
    let mut string_is_key = false;
    let mut escape_start: Option<usize> = None;
    let mut unicode_digits_left = 0u8;
    let mut scalar_start: Option<usize> = None;
    let mut stop = bytes.len();

    let mut idx = 1usize;
    while idx < bytes.len() {
        let b = bytes[idx];

        if in_string {
            if unicode_digits_left > 0 {
                if b.is_ascii_hexdigit() {
                    unicode_digits_left -= 1;
                    if unicode_digits_left == 0 {
                        escape_start = None;
                    }
                } else {
                    stop = escape_start.unwrap_or(idx);
                    break;
                }
            } else if escape_start.is_some() {
                if b == b'u' {
                    unicode_digits_left = 4;
                } else {
                    escape_start = None;
                }
            } else if b == b'\\' {
                escape_start = Some(idx);
            } else if b == b'"' {
                in_string = false;
                if let Some(frame) = stack.last_mut() {
                    if string_is_key {
                        frame.set(Expect::Colon);
                    } else {
                        frame.set(Expect::Comma);
                        safe_end = idx + 1;
                    }
                }
            }
            idx += 1;
            continue;
        }

        if let Some(start) = scalar_start {
            if matches!(b, b',' | b'}' | b']') || b.is_ascii_whitespace() {
                if !is_complete_scalar(&text[start..idx]) {
                    stop = start;
                    break;
                }
                scalar_start = None;
                if let Some(frame) = stack.last_mut() {
                    frame.set(Expect::Comma);
                }
                safe_end = idx;
                // Reprocess the delimiter as structure.
                continue;
            }
            if !is_scalar_byte(b) {
                stop = start;
                break;
            }
            idx += 1;
            continue;
        }

        if b.is_ascii_whitespace() {
            idx += 1;
            continue;
        }

        let Some(frame) = stack.last_mut() else {
            break;
        };
        let expect = frame.expect();
        let is_object = matches!(frame, Frame::Object(_));

        match (b, expect) {
            (b'"', Expect::Key) if is_object => {
                in_string = true;
                string_is_key = true;
            }
            (b'"', Expect::Value) => {
                in_string = true;
                string_is_key = false;
            }
            (b':', Expect::Colon) => frame.set(Expect::Value),
            (b',', Expect::Comma) => {
                frame.set(if is_object { Expect::Key } else { Expect::Value });
            }
            (b'{', Expect::Value) | (b'[', Expect::Value) => {
                if stack.len() >= max_depth {
                    return None;
                }
                stack.push(if b == b'{' {
                    Frame::Object(Expect::Key)
                } else {
                    Frame::Array(Expect::Value)
                });
                safe_end = idx + 1;
            }
            (b'}', Expect::Key) | (b'}', Expect::Comma) if is_object => {
                stack.pop();
                match stack.last_mut() {
                    Some(parent) => parent.set(Expect::Comma),
                    None => return None,
                }
                safe_end = idx + 1;
            }
            (b']', Expect::Value) | (b']', Expect::Comma) if !is_object => {
                stack.pop();
                match stack.last_mut() {
                    Some(parent) => parent.set(Expect::Comma),
                    None => return None,
                }
                safe_end = idx + 1;
            }
            (_, Expect::Value) if is_scalar_byte(b) => scalar_start = Some(idx),
            _ => {
                stop = idx;
                break;
            }
        }
        idx += 1;
    }

    // A scalar running to the cut point still counts when it is already whole.
    if let Some(start) = scalar_start {
        let end = stop.max(start);
        if end == bytes.len() && is_complete_scalar(&text[start..end]) {
            safe_end = end;
        }
    }

    let open_value_string_end = if in_string && !string_is_key {
        Some(escape_start.map_or(stop, |esc| esc.min(stop)))
    } else {
        None
    };

    Some(TruncationState {
        closers: stack.iter().map(Frame::closer).collect(),
        open_value_string_end,
        safe_end: safe_end.min(stop),
    })
}

fn is_scalar_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'+' | b'.')
}

fn is_complete_scalar(token: &str) -> bool {
    matches!(token, "true" | "false" | "null") || token.parse::<f64>().is_ok_and(f64::is_finite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_object_start_skips_escaped_brace() {
        assert_eq!(find_object_start(r#"text \{ not this { this"#), Some(17));
        assert_eq!(find_object_start("no braces"), None);
    }

    #[test]
    fn test_matching_close_ignores_braces_in_strings() {
        let text = r#"{"narrative": "The sign reads: {Beware}", "debug_info": {}} trailing"#;
        let end = find_matching_close(text, 0, 64, usize::MAX).unwrap();
        assert_eq!(&text[end..end + 1], "}");
        assert_eq!(&text[end + 1..], " trailing");
    }

    #[test]
    fn test_matching_close_handles_escaped_quotes() {
        let text = r#"{"a": "she said \"}\" loudly"}"#;
        assert_eq!(find_matching_close(text, 0, 64, usize::MAX), Some(text.len() - 1));
    }

    #[test]
    fn test_matching_close_respects_limits() {
        let deep = format!("{}{}", "[".repeat(10), "]".repeat(10));
        assert!(find_matching_close(&deep, 0, 4, usize::MAX).is_none());
        assert!(find_matching_close(&deep, 0, 16, 5).is_none());
        assert_eq!(find_matching_close(&deep, 0, 16, usize::MAX), Some(19));
    }

    #[test]
    fn test_depth_overflow_offset() {
        let text = format!("{}x", "{".repeat(5));
        assert_eq!(depth_overflow_offset(&text, 3), Some(3));
        assert_eq!(depth_overflow_offset(&text, 5), None);
        assert_eq!(depth_overflow_offset(r#"{"s": "{{{{{{"}"#, 2), None);
    }

    #[test]
    fn test_depths_ignore_brackets_in_strings() {
        let text = r#"{"a": "{[", "b": {"c": 1}, "d": 2}"#;
        let offsets = [0, 1, 12, 18, 27, text.len()];
        assert_eq!(depths_at(text, &offsets), vec![0, 1, 1, 2, 1, 0]);
    }

    #[test]
    fn test_truncated_mid_value_string() {
        let text = r#"{"narrative": "You enter the hall."#;
        let state = scan_truncation(text, 64).unwrap();
        let candidates = state.candidates(text);
        assert_eq!(candidates[0], r#"{"narrative": "You enter the hall."}"#);
        assert_eq!(candidates[1], "{}");
    }

    #[test]
    fn test_truncated_mid_key_rolls_back() {
        let text = r#"{"narrative": "Done.", "plann"#;
        let state = scan_truncation(text, 64).unwrap();
        let candidates = state.candidates(text);
        assert_eq!(candidates, vec![r#"{"narrative": "Done."}"#.to_string()]);
    }

    #[test]
    fn test_truncated_after_colon_and_in_nested_object() {
        let text = r#"{"narrative": "Hi", "state_updates": {"hp": 12, "gold": "#;
        let state = scan_truncation(text, 64).unwrap();
        let candidates = state.candidates(text);
        assert_eq!(
            candidates,
            vec![r#"{"narrative": "Hi", "state_updates": {"hp": 12}}"#.to_string()]
        );
    }

    #[test]
    fn test_truncated_inside_array() {
        let text = r#"{"narrative": "Hi", "entities_mentioned": ["Aria", "Tho"#;
        let state = scan_truncation(text, 64).unwrap();
        let candidates = state.candidates(text);
        assert_eq!(
            candidates[0],
            r#"{"narrative": "Hi", "entities_mentioned": ["Aria", "Tho"]}"#
        );
    }

    #[test]
    fn test_dangling_escape_is_dropped() {
        let text = r#"{"narrative": "He said \"hi\" and \"#;
        let state = scan_truncation(text, 64).unwrap();
        let repaired = &state.candidates(text)[0];
        assert_eq!(repaired, r#"{"narrative": "He said \"hi\" and "}"#);

        let text = r#"{"narrative": "caf\u00"#;
        let state = scan_truncation(text, 64).unwrap();
        assert_eq!(state.candidates(text)[0], r#"{"narrative": "caf"}"#);
    }

    #[test]
    fn test_trailing_complete_scalar_is_kept() {
        let text = r#"{"narrative": "Hi", "turn": 12"#;
        let state = scan_truncation(text, 64).unwrap();
        assert_eq!(state.candidates(text), vec![format!("{}}}", text)]);

        let text = r#"{"narrative": "Hi", "flag": tru"#;
        let state = scan_truncation(text, 64).unwrap();
        assert_eq!(state.candidates(text), vec![r#"{"narrative": "Hi"}"#.to_string()]);
    }

    #[test]
    fn test_garbage_is_treated_as_cut_point() {
        let text = r#"{"narrative": "Hi", "planning_block": "Go" <<garbage>> more"#;
        let state = scan_truncation(text, 64).unwrap();
        assert_eq!(
            state.candidates(text),
            vec![r#"{"narrative": "Hi", "planning_block": "Go"}"#.to_string()]
        );
    }

    #[test]
    fn test_complete_object_has_nothing_to_complete() {
        assert!(scan_truncation(r#"{"narrative": "Hi"}"#, 64).is_none());
        assert!(scan_truncation("not an object", 64).is_none());
    }
}
