//! JSON Pointers (RFC 6901) in both their plain and URL-fragment forms.
//!
//! Pointers address locations in schemas and instances. The evaluator
//! builds them segment by segment while it walks, and the result tree
//! serializes them back out; `$ref` fragments parse into them.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::errors::SchemaError;

/// Characters escaped in the URL-fragment form of a pointer.
const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}')
    .add(b'\\');

/// One step of a pointer: an object key or an array index.
///
/// The literal `-` (the RFC 6901 "append" position) is carried as a key;
/// it never resolves to an existing element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn encode(&self) -> String {
        match self {
            Segment::Key(key) => key.replace('~', "~0").replace('/', "~1"),
            Segment::Index(index) => index.to_string(),
        }
    }

    fn decode(token: &str) -> Segment {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            // Indices with leading zeros are not indices per RFC 6901.
            if token == "0" || !token.starts_with('0') {
                if let Ok(index) = token.parse() {
                    return Segment::Index(index);
                }
            }
        }
        Segment::Key(token.replace("~1", "/").replace("~0", "~"))
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Segment {
        Segment::Key(key.to_owned())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Segment {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Segment {
        Segment::Index(index)
    }
}

/// An ordered sequence of [`Segment`]s addressing a location in a JSON
/// document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JsonPointer {
    segments: Vec<Segment>,
}

impl JsonPointer {
    /// The empty pointer, addressing a whole document.
    pub fn root() -> JsonPointer {
        JsonPointer::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// A new pointer with `segment` appended.
    pub fn child<S: Into<Segment>>(&self, segment: S) -> JsonPointer {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        JsonPointer { segments }
    }

    /// A new pointer with every segment of `tail` appended.
    pub fn combine(&self, tail: &JsonPointer) -> JsonPointer {
        let mut segments = self.segments.clone();
        segments.extend(tail.segments.iter().cloned());
        JsonPointer { segments }
    }

    /// Whether `prefix` is a leading run of this pointer.
    pub fn starts_with(&self, prefix: &JsonPointer) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Walk a JSON value along this pointer.
    ///
    /// Numeric segments index arrays; against objects they fall back to
    /// key lookup by their decimal spelling. The `-` append position
    /// never resolves.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key)?,
                (Segment::Key(key), Value::Array(items)) => {
                    if key == "-" {
                        return None;
                    }
                    items.get(key.parse::<usize>().ok()?)?
                }
                (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
                (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// The URL-fragment form, e.g. `#/properties/a~1b`.
    pub fn to_fragment(&self) -> String {
        let mut out = String::from("#");
        for segment in &self.segments {
            out.push('/');
            out.push_str(&utf8_percent_encode(&segment.encode(), FRAGMENT).to_string());
        }
        out
    }
}

impl fmt::Display for JsonPointer {
    /// The plain RFC 6901 form, e.g. `/properties/a~1b`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment.encode())?;
        }
        Ok(())
    }
}

impl FromStr for JsonPointer {
    type Err = SchemaError;

    /// Parses both encodings: `""` / `"/a/b"` and `"#"` / `"#/a/b"` (the
    /// latter percent-decoded).
    fn from_str(s: &str) -> Result<JsonPointer, SchemaError> {
        let (body, fragment) = match s.strip_prefix('#') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        if body.is_empty() {
            return Ok(JsonPointer::root());
        }
        if !body.starts_with('/') {
            return Err(SchemaError::InvalidSchema {
                location: String::new(),
                reason: format!("\"{}\" is not a JSON pointer", s),
            });
        }
        let mut segments = Vec::new();
        for token in body[1..].split('/') {
            let token = if fragment {
                percent_decode_str(token)
                    .decode_utf8()
                    .map_err(|_| SchemaError::InvalidSchema {
                        location: String::new(),
                        reason: format!("\"{}\" is not valid percent-encoding", s),
                    })?
                    .into_owned()
            } else {
                token.to_owned()
            };
            segments.push(Segment::decode(&token));
        }
        Ok(JsonPointer { segments })
    }
}
