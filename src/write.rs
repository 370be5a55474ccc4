//! Write task: encodes a typed tag-update request into the worker's
//! argument dialect and checks its confirmation line.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use serde_json::Value;

use crate::error::ExifPipeError;
use crate::value::ExifDateTime;

/// Charset prelude emitted before every write so textual encoding does
/// not depend on the platform locale: UTF-8 filenames, UTF-8 coded
/// character set, structured output, HTML-entity decoding.
const CHARSET_ARGS: &[&str] = &[
    "-charset",
    "filename=utf8",
    "-codedcharacterset=utf8",
    "-struct",
    "-E",
];

fn success_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+) image files? updated").expect("success pattern"))
}

/// A value that can be written to a tag. Classification happens at
/// construction; there is exactly one encode rule per variant and no
/// fallback stringification.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteValue {
    /// Clears the tag.
    Null,
    Number(serde_json::Number),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(ExifDateTime),
    List(Vec<WriteValue>),
    Struct(Vec<(String, WriteValue)>),
}

impl WriteValue {
    /// Classifies a raw JSON value. Anything without a write rule
    /// (booleans, in particular) is a caller bug and fails fast.
    pub fn from_json(tag: &str, value: &Value) -> Result<Self, ExifPipeError> {
        match value {
            Value::Null => Ok(WriteValue::Null),
            Value::Number(n) => Ok(WriteValue::Number(n.clone())),
            Value::String(s) => Ok(WriteValue::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| Self::from_json(tag, item))
                .collect::<Result<_, _>>()
                .map(WriteValue::List),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), Self::from_json(tag, v)?)))
                .collect::<Result<_, _>>()
                .map(WriteValue::Struct),
            Value::Bool(_) => Err(ExifPipeError::InvalidWriteValue {
                tag: tag.to_string(),
                reason: "booleans have no tag encoding".to_string(),
            }),
        }
    }

    /// Renders the value for a `-Tag=value` argument.
    fn encode(&self) -> String {
        match self {
            WriteValue::Null => String::new(),
            WriteValue::Number(n) => n.to_string(),
            WriteValue::Text(s) => escape_entities(s),
            WriteValue::Date(d) => d.format("%Y:%m:%d").to_string(),
            WriteValue::Time(t) => t.format("%H:%M:%S%.f").to_string(),
            WriteValue::DateTime(dt) => dt.format_exiftool(),
            WriteValue::List(items) => {
                let inner: Vec<String> = items.iter().map(WriteValue::encode).collect();
                format!("[{}]", inner.join(","))
            }
            WriteValue::Struct(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k} = {}", v.encode()))
                    .collect();
                format!("{{{}}}", inner.join(","))
            }
        }
    }
}

impl From<&str> for WriteValue {
    fn from(s: &str) -> Self {
        WriteValue::Text(s.to_string())
    }
}

impl From<String> for WriteValue {
    fn from(s: String) -> Self {
        WriteValue::Text(s)
    }
}

impl From<i64> for WriteValue {
    fn from(n: i64) -> Self {
        WriteValue::Number(n.into())
    }
}

impl From<ExifDateTime> for WriteValue {
    fn from(dt: ExifDateTime) -> Self {
        WriteValue::DateTime(dt)
    }
}

/// The worker is driven with `-E`, so metacharacters in text values
/// travel as HTML entities.
fn escape_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// One tag-update command: tags to set, verbatim extra arguments, and
/// the target file. Immutable once built; a [`WriteTask`] is a one-shot
/// command over it.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    path: PathBuf,
    tags: Vec<(String, WriteValue)>,
    extra_args: Vec<String>,
}

impl WriteRequest {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            tags: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    pub fn tag(mut self, name: &str, value: impl Into<WriteValue>) -> Self {
        self.tags.push((name.to_string(), value.into()));
        self
    }

    /// Appends an argument passed to the worker verbatim, after the tag
    /// arguments (e.g. `-overwrite_original`).
    pub fn arg(mut self, arg: &str) -> Self {
        self.extra_args.push(arg.to_string());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct WriteTask<'a> {
    request: &'a WriteRequest,
}

impl<'a> WriteTask<'a> {
    pub fn new(request: &'a WriteRequest) -> Self {
        Self { request }
    }

    /// The full worker argument list: charset prelude, tag arguments
    /// (one per element for list values, preserving order), verbatim
    /// extras, target path last.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = CHARSET_ARGS.iter().map(|s| s.to_string()).collect();
        for (name, value) in &self.request.tags {
            match value {
                WriteValue::List(items) => {
                    for item in items {
                        args.push(format!("-{name}={}", item.encode()));
                    }
                }
                other => args.push(format!("-{name}={}", other.encode())),
            }
        }
        args.extend(self.request.extra_args.iter().cloned());
        args.push(self.request.path.to_string_lossy().into_owned());
        args
    }

    /// Checks the worker's confirmation. All-or-nothing: anything but
    /// the update pattern with a non-zero count, or any accumulated
    /// diagnostics, rejects the write with the reply verbatim.
    pub fn decode(&self, reply: &str, warnings: &[String]) -> Result<(), ExifPipeError> {
        if !warnings.is_empty() {
            return Err(ExifPipeError::WriteRejected {
                output: format!("{}\n{}", warnings.join("\n"), reply.trim()),
            });
        }
        let updated = success_re()
            .captures(reply.trim())
            .and_then(|caps| caps[1].parse::<u64>().ok())
            .unwrap_or(0);
        if updated >= 1 {
            Ok(())
        } else {
            Err(ExifPipeError::WriteRejected {
                output: reply.trim().to_string(),
            })
        }
    }
}
