//! Partial JSON assembly for streamed structured output.
//!
//! Providers stream a JSON document as text deltas. [`parse_partial`] turns
//! any prefix of that document into the most complete valid JSON value it
//! can: unterminated strings in value position are closed, dangling keys,
//! commas and unfinished numbers or literals are dropped, and open containers
//! are closed. [`PartialObjectAssembler`] layers a monotonic merge on top so
//! a field that has shown a value never reverts to empty.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Key,
    Colon,
    Value,
    Next,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object(Expect),
    Array(Expect),
}

/// Parse a possibly-truncated JSON object or array.
///
/// Leading prose or a code fence before the first `{`/`[` is skipped.
/// Returns `None` until the opening bracket has arrived.
pub fn parse_partial(input: &str) -> Option<Value> {
    let start = input.find(['{', '['])?;
    let text = &input[start..];
    if let Ok(value) = serde_json::from_str(text.trim_end()) {
        return Some(value);
    }
    serde_json::from_str(&repair(text)?).ok()
}

/// Strictly parse a complete document, tolerating surrounding prose or fences.
pub fn parse_complete(input: &str) -> Option<Value> {
    let start = input.find(['{', '['])?;
    let end = input.rfind(['}', ']'])?;
    if end < start {
        return None;
    }
    serde_json::from_str(&input[start..=end]).ok()
}

fn repair(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut stack: Vec<Frame> = Vec::new();
    let mut safe: Option<(usize, Vec<Frame>)> = None;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\n' | b'\r' | b'\t' => i += 1,
            open @ (b'{' | b'[') => {
                if !stack.is_empty() && !expects_value(&stack) {
                    break;
                }
                stack.push(if open == b'{' {
                    Frame::Object(Expect::Key)
                } else {
                    Frame::Array(Expect::Value)
                });
                i += 1;
                safe = Some((i, stack.clone()));
            }
            b'}' | b']' => {
                stack.pop();
                i += 1;
                if stack.is_empty() {
                    return Some(text[..i].to_string());
                }
                value_done(&mut stack);
                safe = Some((i, stack.clone()));
            }
            b':' => {
                if let Some(Frame::Object(expect)) = stack.last_mut() {
                    *expect = Expect::Value;
                }
                i += 1;
            }
            b',' => {
                match stack.last_mut() {
                    Some(Frame::Object(expect)) => *expect = Expect::Key,
                    Some(Frame::Array(expect)) => *expect = Expect::Value,
                    None => {}
                }
                i += 1;
            }
            b'"' => match string_end(bytes, i + 1) {
                Some(end) => {
                    i = end;
                    match stack.last_mut() {
                        Some(Frame::Object(expect)) if *expect == Expect::Key => {
                            *expect = Expect::Colon;
                        }
                        _ => {
                            value_done(&mut stack);
                            safe = Some((i, stack.clone()));
                        }
                    }
                }
                None => {
                    if expects_value(&stack) {
                        let body = trim_incomplete_escape(&text[i..]);
                        return Some(format!("{}{body}\"{}", &text[..i], closers(&stack)));
                    }
                    break;
                }
            },
            _ => {
                let end = bytes[i..]
                    .iter()
                    .position(|b| matches!(b, b',' | b'}' | b']' | b' ' | b'\n' | b'\r' | b'\t' | b':'))
                    .map(|offset| i + offset);
                // A number or literal running to the end may still be growing.
                let Some(end) = end else { break };
                i = end;
                value_done(&mut stack);
                safe = Some((i, stack.clone()));
            }
        }
    }

    let (at, stack) = safe?;
    Some(format!("{}{}", &text[..at], closers(&stack)))
}

fn expects_value(stack: &[Frame]) -> bool {
    matches!(
        stack.last(),
        Some(Frame::Object(Expect::Value)) | Some(Frame::Array(Expect::Value))
    )
}

fn value_done(stack: &mut [Frame]) {
    match stack.last_mut() {
        Some(Frame::Object(expect)) | Some(Frame::Array(expect)) => *expect = Expect::Next,
        None => {}
    }
}

/// Index just past the closing quote of a string whose body starts at `from`.
fn string_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut escaped = false;
    for (offset, b) in bytes[from..].iter().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'"' => return Some(from + offset + 1),
            _ => {}
        }
    }
    None
}

/// Drop a trailing escape sequence that has not fully arrived.
fn trim_incomplete_escape(s: &str) -> &str {
    let mut s = s;
    if let Some(pos) = s.rfind("\\u") {
        let backslashes = s[..=pos].bytes().rev().take_while(|b| *b == b'\\').count();
        if backslashes % 2 == 1 && s.len() < pos + 6 {
            s = &s[..pos];
        }
    }
    let trailing = s.bytes().rev().take_while(|b| *b == b'\\').count();
    if trailing % 2 == 1 {
        s = &s[..s.len() - 1];
    }
    s
}

fn closers(stack: &[Frame]) -> String {
    stack
        .iter()
        .rev()
        .map(|frame| match frame {
            Frame::Object(_) => '}',
            Frame::Array(_) => ']',
        })
        .collect()
}

/// Merge `next` over `previous` without losing anything `previous` showed.
pub fn merge_monotonic(previous: &Value, next: Value) -> Value {
    match (previous, next) {
        (Value::Object(prev), Value::Object(mut next)) => {
            for (key, prev_value) in prev {
                let merged = match next.remove(key) {
                    Some(next_value) => merge_monotonic(prev_value, next_value),
                    None => prev_value.clone(),
                };
                next.insert(key.clone(), merged);
            }
            Value::Object(next)
        }
        (Value::Array(prev), Value::Array(next)) => {
            let mut next = next.into_iter();
            let mut merged: Vec<Value> = prev
                .iter()
                .map(|p| match next.next() {
                    Some(n) => merge_monotonic(p, n),
                    None => p.clone(),
                })
                .collect();
            merged.extend(next);
            Value::Array(merged)
        }
        (Value::String(prev), Value::String(next))
            if next.len() < prev.len() && prev.starts_with(next.as_str()) =>
        {
            Value::String(prev.clone())
        }
        (prev, Value::Null) if !prev.is_null() => prev.clone(),
        (_, next) => next,
    }
}

/// Accumulates streamed text and yields progressively more complete values.
#[derive(Debug, Default)]
pub struct PartialObjectAssembler {
    buffer: String,
    current: Option<Value>,
}

impl PartialObjectAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta. Returns the new snapshot when it differs from the last.
    pub fn push(&mut self, delta: &str) -> Option<Value> {
        self.buffer.push_str(delta);
        let parsed = parse_partial(&self.buffer)?;
        let next = match &self.current {
            Some(previous) => merge_monotonic(previous, parsed),
            None => parsed,
        };
        if self.current.as_ref() == Some(&next) {
            return None;
        }
        self.current = Some(next.clone());
        Some(next)
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn current(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    /// The final document, parsed strictly.
    pub fn finish(&self) -> Option<Value> {
        parse_complete(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nothing_before_the_opening_brace() {
        assert_eq!(parse_partial(""), None);
        assert_eq!(parse_partial("Sure, here it is:"), None);
    }

    #[test]
    fn closes_open_containers() {
        assert_eq!(parse_partial("{"), Some(json!({})));
        assert_eq!(parse_partial(r#"{"cards": ["#), Some(json!({"cards": []})));
        assert_eq!(
            parse_partial(r#"{"cards": [{"front": "a", "back": "b"}, {"#),
            Some(json!({"cards": [{"front": "a", "back": "b"}, {}]}))
        );
    }

    #[test]
    fn unterminated_value_string_is_kept() {
        assert_eq!(
            parse_partial(r#"{"title": "Binary sea"#),
            Some(json!({"title": "Binary sea"}))
        );
        assert_eq!(parse_partial(r#"["ab"#), Some(json!(["ab"])));
    }

    #[test]
    fn dangling_keys_and_commas_are_dropped() {
        assert_eq!(parse_partial(r#"{"a": "x", "ti"#), Some(json!({"a": "x"})));
        assert_eq!(parse_partial(r#"{"a": "x", "title""#), Some(json!({"a": "x"})));
        assert_eq!(parse_partial(r#"{"a": "x", "title": "#), Some(json!({"a": "x"})));
        assert_eq!(parse_partial(r#"{"a": "x","#), Some(json!({"a": "x"})));
    }

    #[test]
    fn growing_numbers_and_literals_wait() {
        assert_eq!(parse_partial(r#"{"answer_index": 1"#), Some(json!({})));
        assert_eq!(parse_partial(r#"{"answer_index": 12,"#), Some(json!({"answer_index": 12})));
        assert_eq!(parse_partial(r#"{"ok": tr"#), Some(json!({})));
        assert_eq!(parse_partial("[1, 2"), Some(json!([1])));
    }

    #[test]
    fn incomplete_escapes_are_trimmed() {
        assert_eq!(parse_partial(r#"{"a": "line\"#), Some(json!({"a": "line"})));
        assert_eq!(parse_partial(r#"{"a": "x\u00"#), Some(json!({"a": "x"})));
        assert_eq!(parse_partial(r#"{"a": "q\"uote"#), Some(json!({"a": "q\"uote"})));
    }

    #[test]
    fn code_fences_are_tolerated() {
        let text = "```json\n{\"title\": \"Graphs\"}\n```";
        assert_eq!(parse_partial(text), Some(json!({"title": "Graphs"})));
        assert_eq!(parse_complete(text), Some(json!({"title": "Graphs"})));
    }

    #[test]
    fn every_prefix_parses_and_only_grows() {
        let document = r#"{"type": "flashcards", "title": "Rust ownership", "cards": [{"front": "What is a borrow?", "back": "A reference \"without\" ownership"}, {"front": "Move", "back": "Transfer"}]}"#;
        let mut assembler = PartialObjectAssembler::new();
        let mut snapshots = Vec::new();
        for ch in document.chars() {
            if let Some(snapshot) = assembler.push(&ch.to_string()) {
                snapshots.push(snapshot);
            }
        }

        assert_eq!(assembler.finish(), serde_json::from_str::<Value>(document).ok());
        assert_eq!(snapshots.last(), assembler.finish().as_ref());
        for pair in snapshots.windows(2) {
            assert_eq!(merge_monotonic(&pair[0], pair[1].clone()), pair[1]);
        }
    }

    #[test]
    fn merge_never_reverts_fields() {
        let previous = json!({"title": "Graph traversal", "cards": [{"front": "BFS"}]});
        let next = json!({"title": "Graph", "cards": [], "summary": null});
        assert_eq!(
            merge_monotonic(&previous, next),
            json!({"title": "Graph traversal", "cards": [{"front": "BFS"}], "summary": null})
        );
    }

    #[test]
    fn push_reports_only_changes() {
        let mut assembler = PartialObjectAssembler::new();
        assert_eq!(assembler.push(r#"{"title": "A"#), Some(json!({"title": "A"})));
        assert_eq!(assembler.push(r#"B", "#), Some(json!({"title": "AB"})));
        assert_eq!(assembler.push(r#""cou"#), None);
        assert!(assembler.finish().is_none());
        assert_eq!(
            assembler.push(r#"nt": 2}"#),
            Some(json!({"title": "AB", "count": 2}))
        );
        assert_eq!(assembler.finish(), Some(json!({"title": "AB", "count": 2})));
    }
}
