//! Event-driven consumers for the push parser.
//!
//! An [`EventSink`] receives the token stream of a Bencode document in wire
//! order. The parser guarantees well-formed event sequences: every
//! `list_begin` is matched by a `list_end`, dict keys arrive strictly
//! ascending, and each key is followed by a `dict_value_begin`/`dict_value_end`
//! bracketed value.

use crate::value::{Dict, Value};
use serde_json::{Map, Value as JsonValue};
use std::fmt::Write;

/// Receiver for Bencode parse events.
pub trait EventSink {
    fn integer(&mut self, value: i64);
    fn string(&mut self, value: &[u8]);
    fn list_begin(&mut self);
    fn list_end(&mut self);
    fn dict_begin(&mut self);
    fn dict_key(&mut self, key: &[u8]);
    fn dict_value_begin(&mut self) {}
    fn dict_value_end(&mut self) {}
    fn dict_end(&mut self);
}

enum Frame {
    List(Vec<Value>),
    Dict(Dict, Option<Vec<u8>>),
}

/// Builds an owning [`Value`] tree from parse events.
#[derive(Default)]
pub struct ValueBuilder {
    stack: Vec<Frame>,
    finished: Option<Value>,
}

impl ValueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The completed root value, if a full document was consumed.
    pub fn into_value(self) -> Option<Value> {
        self.finished
    }

    fn complete(&mut self, value: Value) {
        match self.stack.last_mut() {
            Some(Frame::List(items)) => items.push(value),
            Some(Frame::Dict(dict, key)) => {
                let key = key.take().unwrap_or_default();
                dict.push_sorted(key, value);
            }
            None => self.finished = Some(value),
        }
    }
}

impl EventSink for ValueBuilder {
    fn integer(&mut self, value: i64) {
        self.complete(Value::Integer(value));
    }

    fn string(&mut self, value: &[u8]) {
        self.complete(Value::Bytes(value.to_vec()));
    }

    fn list_begin(&mut self) {
        self.stack.push(Frame::List(Vec::new()));
    }

    fn list_end(&mut self) {
        if let Some(Frame::List(items)) = self.stack.pop() {
            self.complete(Value::List(items));
        }
    }

    fn dict_begin(&mut self) {
        self.stack.push(Frame::Dict(Dict::new(), None));
    }

    fn dict_key(&mut self, key: &[u8]) {
        if let Some(Frame::Dict(_, pending)) = self.stack.last_mut() {
            *pending = Some(key.to_vec());
        }
    }

    fn dict_end(&mut self) {
        if let Some(Frame::Dict(dict, _)) = self.stack.pop() {
            self.complete(Value::Dict(dict));
        }
    }
}

enum JsonFrame {
    Array(Vec<JsonValue>),
    Object(Map<String, JsonValue>, Option<String>),
}

/// Renders parse events as JSON.
///
/// Byte strings that are not valid UTF-8 are hex-encoded, the same
/// convention most torrent inspectors use for `pieces` and infohashes.
///
/// ```
/// use squall_bencode::{JsonWriter, PushParser};
///
/// let mut sink = JsonWriter::new();
/// PushParser::new().parse(b"d3:fooi1ee", &mut sink)?;
/// assert_eq!(sink.render().unwrap(), r#"{"foo":1}"#);
/// # Ok::<(), squall_bencode::BencodeError>(())
/// ```
#[derive(Default)]
pub struct JsonWriter {
    stack: Vec<JsonFrame>,
    finished: Option<JsonValue>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_json(self) -> Option<JsonValue> {
        self.finished
    }

    /// Render the completed document as a compact JSON string.
    pub fn render(&self) -> Option<String> {
        self.finished.as_ref().map(|v| v.to_string())
    }

    fn complete(&mut self, value: JsonValue) {
        match self.stack.last_mut() {
            Some(JsonFrame::Array(items)) => items.push(value),
            Some(JsonFrame::Object(map, key)) => {
                map.insert(key.take().unwrap_or_default(), value);
            }
            None => self.finished = Some(value),
        }
    }

    fn text(bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(s) => s.to_owned(),
            Err(_) => bytes.iter().fold(
                String::with_capacity(bytes.len() * 2),
                |mut out, b| {
                    let _ = write!(out, "{b:02x}");
                    out
                },
            ),
        }
    }
}

impl EventSink for JsonWriter {
    fn integer(&mut self, value: i64) {
        self.complete(JsonValue::from(value));
    }

    fn string(&mut self, value: &[u8]) {
        self.complete(JsonValue::String(Self::text(value)));
    }

    fn list_begin(&mut self) {
        self.stack.push(JsonFrame::Array(Vec::new()));
    }

    fn list_end(&mut self) {
        if let Some(JsonFrame::Array(items)) = self.stack.pop() {
            self.complete(JsonValue::Array(items));
        }
    }

    fn dict_begin(&mut self) {
        self.stack.push(JsonFrame::Object(Map::new(), None));
    }

    fn dict_key(&mut self, key: &[u8]) {
        if let Some(JsonFrame::Object(_, pending)) = self.stack.last_mut() {
            *pending = Some(Self::text(key));
        }
    }

    fn dict_end(&mut self) {
        if let Some(JsonFrame::Object(map, _)) = self.stack.pop() {
            self.complete(JsonValue::Object(map));
        }
    }
}

/// Writes one indented line per event. Debugging aid.
#[derive(Default)]
pub struct DebugWriter {
    out: String,
    depth: usize,
}

impl DebugWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

impl EventSink for DebugWriter {
    fn integer(&mut self, value: i64) {
        self.line(&format!("integer {value}"));
    }

    fn string(&mut self, value: &[u8]) {
        match std::str::from_utf8(value) {
            Ok(s) => self.line(&format!("string {s:?}")),
            Err(_) => self.line(&format!("string <{} bytes>", value.len())),
        }
    }

    fn list_begin(&mut self) {
        self.line("list");
        self.depth += 1;
    }

    fn list_end(&mut self) {
        self.depth -= 1;
        self.line("end");
    }

    fn dict_begin(&mut self) {
        self.line("dict");
        self.depth += 1;
    }

    fn dict_key(&mut self, key: &[u8]) {
        match std::str::from_utf8(key) {
            Ok(s) => self.line(&format!("key {s:?}")),
            Err(_) => self.line(&format!("key <{} bytes>", key.len())),
        }
    }

    fn dict_end(&mut self) {
        self.depth -= 1;
        self.line("end");
    }
}
