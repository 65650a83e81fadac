//! Lenient parsing of JSON that is still arriving.
//!
//! DESIGN
//! ======
//! Tool input streams in as raw JSON text fragments. To render something
//! useful before the document is complete, the accumulated text is repaired
//! into the longest syntactically valid document it is a prefix of:
//!
//! - unterminated strings, objects and arrays are closed
//! - dangling keys, colons and commas are dropped
//! - partial literals (`tr`, `fals`, `nu`) are completed
//! - partial numbers (`1.`, `2e-`, `-`) and partial escapes are trimmed
//!
//! The repair is a single pass of a small pushdown state machine. It tracks
//! the byte offset up to which the input is a valid prefix, then appends the
//! closers implied by the open states. Anything it cannot make sense of
//! stops the scan; the prefix before it is still repaired.
//!
//! Feeding a valid document one character at a time therefore yields, at the
//! final character, the same value as parsing the whole document.

use serde_json::{Map, Value};

const LITERALS: [&str; 3] = ["true", "false", "null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Root,
    Finish,
    InString,
    InStringEscape,
    InStringUnicode { digits: u8, code: u16 },
    InLiteral,
    InNumber,
    ObjectStart,
    ObjectKey,
    ObjectKeyEscape,
    ObjectAfterKey,
    ObjectBeforeValue,
    ObjectAfterValue,
    ObjectAfterComma,
    ArrayStart,
    ArrayAfterValue,
    ArrayAfterComma,
}

enum Step {
    Consumed,
    /// The current state ended before this char; feed it to the parent.
    Reprocess,
    Stop,
}

fn is_json_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

struct Repairer<'a> {
    text: &'a str,
    stack: Vec<State>,
    valid_end: usize,
    literal_start: usize,
}

impl<'a> Repairer<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, stack: vec![State::Root], valid_end: 0, literal_start: 0 }
    }

    fn replace(&mut self, state: State) {
        self.stack.pop();
        self.stack.push(state);
    }

    fn close(&mut self, end: usize) -> Step {
        self.stack.pop();
        self.valid_end = end;
        Step::Consumed
    }

    fn whitespace_or_stop(c: char) -> Step {
        if is_json_whitespace(c) { Step::Consumed } else { Step::Stop }
    }

    fn value_start(&mut self, c: char, start: usize, end: usize, after: State) -> Step {
        let (inner, valid) = match c {
            '"' => (State::InString, true),
            't' | 'f' | 'n' => {
                self.literal_start = start;
                (State::InLiteral, true)
            }
            '-' => (State::InNumber, false),
            '0'..='9' => (State::InNumber, true),
            '{' => (State::ObjectStart, true),
            '[' => (State::ArrayStart, true),
            _ => return Self::whitespace_or_stop(c),
        };
        self.replace(after);
        self.stack.push(inner);
        if valid {
            self.valid_end = end;
        }
        Step::Consumed
    }

    fn step(&mut self, c: char, start: usize, end: usize) -> Step {
        let Some(&state) = self.stack.last() else {
            return Step::Stop;
        };
        match state {
            State::Root => self.value_start(c, start, end, State::Finish),
            State::Finish => Self::whitespace_or_stop(c),

            State::ObjectStart => match c {
                '"' => {
                    self.replace(State::ObjectKey);
                    Step::Consumed
                }
                '}' => self.close(end),
                _ => Self::whitespace_or_stop(c),
            },
            State::ObjectAfterComma => match c {
                '"' => {
                    self.replace(State::ObjectKey);
                    Step::Consumed
                }
                _ => Self::whitespace_or_stop(c),
            },
            State::ObjectKey => {
                match c {
                    '"' => self.replace(State::ObjectAfterKey),
                    '\\' => self.stack.push(State::ObjectKeyEscape),
                    _ => {}
                }
                Step::Consumed
            }
            State::ObjectKeyEscape => {
                self.stack.pop();
                Step::Consumed
            }
            State::ObjectAfterKey => match c {
                ':' => {
                    self.replace(State::ObjectBeforeValue);
                    Step::Consumed
                }
                _ => Self::whitespace_or_stop(c),
            },
            State::ObjectBeforeValue => self.value_start(c, start, end, State::ObjectAfterValue),
            State::ObjectAfterValue => match c {
                ',' => {
                    self.replace(State::ObjectAfterComma);
                    Step::Consumed
                }
                '}' => self.close(end),
                _ => Self::whitespace_or_stop(c),
            },

            State::ArrayStart => match c {
                ']' => self.close(end),
                _ => self.value_start(c, start, end, State::ArrayAfterValue),
            },
            State::ArrayAfterValue => match c {
                ',' => {
                    self.replace(State::ArrayAfterComma);
                    Step::Consumed
                }
                ']' => self.close(end),
                _ => Self::whitespace_or_stop(c),
            },
            State::ArrayAfterComma => self.value_start(c, start, end, State::ArrayAfterValue),

            State::InString => {
                match c {
                    '"' => {
                        self.stack.pop();
                        self.valid_end = end;
                    }
                    '\\' => self.stack.push(State::InStringEscape),
                    _ => self.valid_end = end,
                }
                Step::Consumed
            }
            State::InStringEscape => {
                if c == 'u' {
                    self.replace(State::InStringUnicode { digits: 0, code: 0 });
                } else {
                    self.stack.pop();
                    self.valid_end = end;
                }
                Step::Consumed
            }
            State::InStringUnicode { digits, code } => {
                let Some(digit) = c.to_digit(16) else {
                    return Step::Stop;
                };
                #[allow(clippy::cast_possible_truncation)]
                let code = (code << 4) | digit as u16;
                if digits == 3 {
                    self.stack.pop();
                    // A high surrogate only becomes valid with its low half.
                    if !(0xD800..=0xDBFF).contains(&code) {
                        self.valid_end = end;
                    }
                } else {
                    self.replace(State::InStringUnicode { digits: digits + 1, code });
                }
                Step::Consumed
            }

            State::InNumber => match c {
                '0'..='9' => {
                    self.valid_end = end;
                    Step::Consumed
                }
                'e' | 'E' | '+' | '-' | '.' => Step::Consumed,
                _ => {
                    self.stack.pop();
                    Step::Reprocess
                }
            },
            State::InLiteral => {
                let candidate = &self.text[self.literal_start..end];
                if LITERALS.iter().any(|literal| literal.starts_with(candidate)) {
                    self.valid_end = end;
                    Step::Consumed
                } else {
                    self.stack.pop();
                    Step::Reprocess
                }
            }
        }
    }

    fn run(mut self) -> String {
        'chars: for (start, c) in self.text.char_indices() {
            let end = start + c.len_utf8();
            loop {
                match self.step(c, start, end) {
                    Step::Consumed => break,
                    Step::Reprocess => {}
                    Step::Stop => break 'chars,
                }
            }
        }
        self.finish()
    }

    fn finish(self) -> String {
        let mut out = String::with_capacity(self.valid_end + self.stack.len() + 4);
        out.push_str(&self.text[..self.valid_end]);
        for state in self.stack.iter().rev() {
            match state {
                State::InString => out.push('"'),
                State::ObjectStart
                | State::ObjectKey
                | State::ObjectAfterKey
                | State::ObjectBeforeValue
                | State::ObjectAfterValue
                | State::ObjectAfterComma => out.push('}'),
                State::ArrayStart | State::ArrayAfterValue | State::ArrayAfterComma => out.push(']'),
                State::InLiteral => {
                    let partial = &self.text[self.literal_start..self.valid_end];
                    if let Some(literal) = LITERALS.iter().find(|literal| literal.starts_with(partial)) {
                        out.push_str(&literal[partial.len()..]);
                    }
                }
                // The enclosing `ObjectKey` closes the object.
                State::Root
                | State::Finish
                | State::ObjectKeyEscape
                | State::InStringEscape
                | State::InStringUnicode { .. }
                | State::InNumber => {}
            }
        }
        out
    }
}

/// Repair a JSON prefix into the smallest valid document that extends it.
///
/// Returns an empty string when no value has started yet.
#[must_use]
pub fn repair(text: &str) -> String {
    Repairer::new(text).run()
}

/// Result of a lenient parse.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The text was already valid JSON.
    Complete(Value),
    /// The text needed repair before it parsed.
    Repaired(Value),
    Failed,
}

impl ParseOutcome {
    #[must_use]
    pub fn value(self) -> Option<Value> {
        match self {
            Self::Complete(value) | Self::Repaired(value) => Some(value),
            Self::Failed => None,
        }
    }
}

/// Parse `text` strictly, falling back to a repaired parse.
#[must_use]
pub fn parse_partial(text: &str) -> ParseOutcome {
    if let Ok(value) = serde_json::from_str(text) {
        return ParseOutcome::Complete(value);
    }
    match serde_json::from_str(&repair(text)) {
        Ok(value) => ParseOutcome::Repaired(value),
        Err(_) => ParseOutcome::Failed,
    }
}

/// Accumulates streamed JSON text and exposes a best-effort value.
#[derive(Debug, Clone, Default)]
pub struct PartialJson {
    buffer: String,
    last: Option<Value>,
}

impl PartialJson {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the current best-effort value, if any.
    pub fn push(&mut self, delta: &str) -> Option<Value> {
        self.buffer.push_str(delta);
        let value = parse_partial(&self.buffer).value()?;
        self.last = Some(value.clone());
        Some(value)
    }

    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Most recent successful parse.
    #[must_use]
    pub fn last(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    /// Strict parse of the complete buffer. Empty input is an empty object,
    /// which is what providers send for argument-less tool calls.
    ///
    /// # Errors
    ///
    /// Returns the parser error when the buffer is not a complete document.
    pub fn finish(&self) -> Result<Value, serde_json::Error> {
        if self.buffer.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&self.buffer)
    }
}

#[cfg(test)]
#[path = "partial_json_test.rs"]
mod tests;
