//! The `io`, `csv`, `json` and `re` handles visible to scripts.
//!
//! Each is a closed table of functions. `io.StringIO` is the identity on
//! strings so that `csv.reader(io.StringIO(text))` reads the way it would
//! in the scripts the model is used to writing.

use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::{Captures, Regex, RegexBuilder};
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};

use super::builtins::Args;
use super::value::{Key, MatchData, Value};
use super::{ScriptError, ScriptLimits, ScriptResult};

const FLAG_IGNORECASE: i64 = 2;
const FLAG_MULTILINE: i64 = 8;
const FLAG_DOTALL: i64 = 16;
const FLAG_VERBOSE: i64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    Io,
    Csv,
    Json,
    Re,
}

impl Facility {
    pub const ALL: [Facility; 4] = [Facility::Io, Facility::Csv, Facility::Json, Facility::Re];

    pub fn name(self) -> &'static str {
        match self {
            Facility::Io => "io",
            Facility::Csv => "csv",
            Facility::Json => "json",
            Facility::Re => "re",
        }
    }

    /// `facility.name`, either a callable or one of the `re` flag constants.
    pub fn attribute(self, name: &str) -> ScriptResult<Value> {
        let function = match (self, name) {
            (Facility::Io, "StringIO") => FacilityFn::StringIo,
            (Facility::Csv, "reader") => FacilityFn::CsvReader,
            (Facility::Csv, "DictReader") => FacilityFn::CsvDictReader,
            (Facility::Json, "loads") => FacilityFn::JsonLoads,
            (Facility::Json, "dumps") => FacilityFn::JsonDumps,
            (Facility::Re, "findall") => FacilityFn::ReFindall,
            (Facility::Re, "search") => FacilityFn::ReSearch,
            (Facility::Re, "match") => FacilityFn::ReMatch,
            (Facility::Re, "fullmatch") => FacilityFn::ReFullmatch,
            (Facility::Re, "sub") => FacilityFn::ReSub,
            (Facility::Re, "split") => FacilityFn::ReSplit,
            (Facility::Re, "I" | "IGNORECASE") => return Ok(Value::Int(FLAG_IGNORECASE)),
            (Facility::Re, "M" | "MULTILINE") => return Ok(Value::Int(FLAG_MULTILINE)),
            (Facility::Re, "S" | "DOTALL") => return Ok(Value::Int(FLAG_DOTALL)),
            (Facility::Re, "X" | "VERBOSE") => return Ok(Value::Int(FLAG_VERBOSE)),
            _ => {
                return Err(ScriptError::runtime(format!(
                    "module '{}' has no attribute '{name}'",
                    self.name()
                )))
            }
        };
        Ok(Value::FacilityFn(function))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacilityFn {
    StringIo,
    CsvReader,
    CsvDictReader,
    JsonLoads,
    JsonDumps,
    ReFindall,
    ReSearch,
    ReMatch,
    ReFullmatch,
    ReSub,
    ReSplit,
}

impl FacilityFn {
    pub fn name(self) -> &'static str {
        match self {
            FacilityFn::StringIo => "io.StringIO",
            FacilityFn::CsvReader => "csv.reader",
            FacilityFn::CsvDictReader => "csv.DictReader",
            FacilityFn::JsonLoads => "json.loads",
            FacilityFn::JsonDumps => "json.dumps",
            FacilityFn::ReFindall => "re.findall",
            FacilityFn::ReSearch => "re.search",
            FacilityFn::ReMatch => "re.match",
            FacilityFn::ReFullmatch => "re.fullmatch",
            FacilityFn::ReSub => "re.sub",
            FacilityFn::ReSplit => "re.split",
        }
    }
}

/// Compiled patterns, keyed by source and flags.
#[derive(Default)]
pub struct RegexCache {
    compiled: HashMap<(String, i64), Regex>,
}

impl RegexCache {
    const CAPACITY: usize = 64;

    fn get(&mut self, pattern: &str, flags: i64) -> ScriptResult<Regex> {
        let key = (pattern.to_string(), flags);
        if let Some(re) = self.compiled.get(&key) {
            return Ok(re.clone());
        }
        let re = RegexBuilder::new(pattern)
            .case_insensitive(flags & FLAG_IGNORECASE != 0)
            .multi_line(flags & FLAG_MULTILINE != 0)
            .dot_matches_new_line(flags & FLAG_DOTALL != 0)
            .ignore_whitespace(flags & FLAG_VERBOSE != 0)
            .build()
            .map_err(|e| ScriptError::runtime(format!("invalid pattern: {e}")))?;
        if self.compiled.len() >= Self::CAPACITY {
            self.compiled.clear();
        }
        self.compiled.insert(key, re.clone());
        Ok(re)
    }
}

fn check_len(len: usize, limits: &ScriptLimits) -> ScriptResult<()> {
    if len > limits.max_collection_len {
        return Err(ScriptError::runtime(format!(
            "result would hold {len} elements, the limit is {}",
            limits.max_collection_len
        )));
    }
    Ok(())
}

pub fn call(
    function: FacilityFn,
    mut args: Args,
    limits: &ScriptLimits,
    regexes: &mut RegexCache,
) -> ScriptResult<Value> {
    match function {
        FacilityFn::StringIo => {
            args.expect(0, 1)?;
            match args.get(0) {
                None => Ok(Value::from("")),
                Some(v) => Ok(Value::from(v.as_str("io.StringIO()")?)),
            }
        }
        FacilityFn::CsvReader | FacilityFn::CsvDictReader => {
            let dialect = Dialect::from_args(&mut args)?;
            args.expect(1, 1)?;
            let text = csv_source(&args.get(0).cloned().unwrap_or(Value::None))?;
            if function == FacilityFn::CsvReader {
                csv_rows(&text, dialect, limits)
            } else {
                csv_records(&text, dialect, limits)
            }
        }
        FacilityFn::JsonLoads => {
            args.expect(1, 1)?;
            let text = args.get(0).map(|v| v.as_str("json.loads()")).transpose()?.unwrap_or("");
            let json = serde_json::from_str::<serde_json::Value>(text)
                .map_err(|e| ScriptError::runtime(format!("JSON decode error: {e}")))?;
            if let Some(literal) = wide_integer(text) {
                return Err(ScriptError::runtime(format!(
                    "JSON decode error: integer {literal} does not fit in 64 bits"
                )));
            }
            Ok(Value::from_json(&json))
        }
        FacilityFn::JsonDumps => {
            let indent = match args.keyword("indent") {
                None | Some(Value::None) => None,
                Some(v) => Some(v.as_int("json.dumps() indent")?.clamp(0, 16) as usize),
            };
            args.expect(1, 1)?;
            let json = args.positional_json(0)?;
            let text = dumps(&json, indent)?;
            check_len(text.len(), limits)?;
            Ok(Value::from(text))
        }
        FacilityFn::ReFindall => {
            let flags = flags(args.take(2, "flags"))?;
            args.expect(2, 3)?;
            let (re, text) = pattern_and_text(&args, 0, 1, flags, regexes)?;
            let groups = re.captures_len() - 1;
            let mut found = Vec::new();
            for caps in re.captures_iter(text) {
                let group = |i: usize| Value::from(caps.get(i).map(|m| m.as_str()).unwrap_or(""));
                found.push(match groups {
                    0 => group(0),
                    1 => group(1),
                    n => Value::list((1..=n).map(group).collect()),
                });
                check_len(found.len(), limits)?;
            }
            Ok(Value::list(found))
        }
        FacilityFn::ReSearch | FacilityFn::ReMatch | FacilityFn::ReFullmatch => {
            let flags = flags(args.take(2, "flags"))?;
            args.expect(2, 3)?;
            let pattern = args.get(0).map(|v| v.as_str("pattern")).transpose()?.unwrap_or("");
            let anchored = match function {
                FacilityFn::ReMatch => format!(r"\A(?:{pattern})"),
                FacilityFn::ReFullmatch => format!(r"\A(?:{pattern})\z"),
                _ => pattern.to_string(),
            };
            let re = regexes.get(&anchored, flags)?;
            let text = args.get(1).map(|v| v.as_str("string")).transpose()?.unwrap_or("");
            Ok(re
                .captures(text)
                .map(|caps| match_value(&re, &caps, text))
                .unwrap_or(Value::None))
        }
        FacilityFn::ReSub => {
            let count = args.take(3, "count");
            let flags = flags(args.take(4, "flags"))?;
            args.expect(3, 5)?;
            let re = regexes.get(args.positional_str(0, "pattern")?, flags)?;
            let replacement = translate_replacement(args.positional_str(1, "repl")?);
            let text = args.positional_str(2, "string")?;
            let count = match count {
                Some(v) => v.as_int("count")?.max(0) as usize,
                None => 0,
            };
            let out = re.replacen(text, count, replacement.as_str());
            check_len(out.len(), limits)?;
            Ok(Value::from(out.into_owned()))
        }
        FacilityFn::ReSplit => {
            let maxsplit = match args.take(2, "maxsplit") {
                Some(v) => v.as_int("maxsplit")?,
                None => 0,
            };
            let flags = flags(args.take(3, "flags"))?;
            args.expect(2, 4)?;
            let (re, text) = pattern_and_text(&args, 0, 1, flags, regexes)?;
            let mut parts = Vec::new();
            let mut last = 0;
            for (n, caps) in re.captures_iter(text).enumerate() {
                if maxsplit > 0 && n as i64 >= maxsplit {
                    break;
                }
                let Some(whole) = caps.get(0) else { continue };
                parts.push(Value::from(&text[last..whole.start()]));
                for group in caps.iter().skip(1) {
                    parts.push(group.map(|g| Value::from(g.as_str())).unwrap_or(Value::None));
                }
                last = whole.end();
                check_len(parts.len(), limits)?;
            }
            parts.push(Value::from(&text[last..]));
            Ok(Value::list(parts))
        }
    }
}

impl Args {
    fn positional_str(&self, index: usize, what: &str) -> ScriptResult<&str> {
        match self.get(index) {
            Some(v) => v.as_str(what),
            None => Err(ScriptError::runtime(format!(
                "{}() missing argument '{what}'",
                self.func()
            ))),
        }
    }

    fn positional_json(&self, index: usize) -> ScriptResult<serde_json::Value> {
        let value = self.get(index).cloned().unwrap_or(Value::None);
        value.to_json().map_err(ScriptError::runtime)
    }
}

fn flags(value: Option<Value>) -> ScriptResult<i64> {
    match value {
        None => Ok(0),
        Some(v) => v.as_int("flags"),
    }
}

fn pattern_and_text<'a>(
    args: &'a Args,
    pattern_at: usize,
    text_at: usize,
    flags: i64,
    regexes: &mut RegexCache,
) -> ScriptResult<(Regex, &'a str)> {
    let re = regexes.get(args.positional_str(pattern_at, "pattern")?, flags)?;
    let text = args.positional_str(text_at, "string")?;
    Ok((re, text))
}

fn match_value(re: &Regex, caps: &Captures<'_>, text: &str) -> Value {
    let chars_before = |byte: usize| text[..byte].chars().count();
    let span = caps
        .get(0)
        .map(|m| (chars_before(m.start()), chars_before(m.end())))
        .unwrap_or((0, 0));
    let names = re
        .capture_names()
        .enumerate()
        .filter_map(|(i, name)| name.map(|n| (n.to_string(), i)))
        .collect();
    let groups = caps
        .iter()
        .map(|g| g.map(|m| m.as_str().to_string()))
        .collect();
    Value::Match(Rc::new(MatchData { groups, names, span }))
}

/// Rewrite `\1` and `\g<name>` references into the `${1}` form and escape
/// literal dollars.
fn translate_replacement(repl: &str) -> String {
    let mut out = String::with_capacity(repl.len());
    let mut chars = repl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '$' => out.push_str("$$"),
            '\\' => match chars.peek().copied() {
                Some(d) if d.is_ascii_digit() => {
                    let mut group = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        if group.len() == 2 {
                            break;
                        }
                        group.push(d);
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                Some('g') => {
                    chars.next();
                    if chars.peek() == Some(&'<') {
                        chars.next();
                        let name: String = chars.by_ref().take_while(|&c| c != '>').collect();
                        out.push_str(&format!("${{{name}}}"));
                    } else {
                        out.push_str("\\g");
                    }
                }
                Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('t') => {
                    chars.next();
                    out.push('\t');
                }
                Some('\\') => {
                    chars.next();
                    out.push('\\');
                }
                _ => out.push('\\'),
            },
            c => out.push(c),
        }
    }
    out
}

// ── csv ──

#[derive(Debug, Clone, Copy)]
struct Dialect {
    delimiter: u8,
    quote: u8,
}

impl Dialect {
    fn from_args(args: &mut Args) -> ScriptResult<Self> {
        Ok(Self {
            delimiter: single_byte(args.keyword("delimiter"), "delimiter", b',')?,
            quote: single_byte(args.keyword("quotechar"), "quotechar", b'"')?,
        })
    }

    fn reader(self, text: &str, has_headers: bool) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .from_reader(text.as_bytes())
    }
}

fn single_byte(value: Option<Value>, name: &str, default: u8) -> ScriptResult<u8> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.as_str(name)?.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(ScriptError::runtime(format!(
            "\"{name}\" must be a 1-character string"
        ))),
    }
}

/// `csv.reader` accepts the text itself or a list of its lines.
fn csv_source(value: &Value) -> ScriptResult<String> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        Value::List(lines) => {
            let lines = lines.borrow();
            let mut text = String::new();
            for line in lines.iter() {
                text.push_str(line.as_str("csv line")?);
                text.push('\n');
            }
            Ok(text)
        }
        other => Err(ScriptError::runtime(format!(
            "csv input must be a string or a list of lines, not '{}'",
            other.type_name()
        ))),
    }
}

fn csv_error(e: csv::Error) -> ScriptError {
    ScriptError::runtime(format!("csv error: {e}"))
}

fn csv_rows(text: &str, dialect: Dialect, limits: &ScriptLimits) -> ScriptResult<Value> {
    let mut reader = dialect.reader(text, false);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        rows.push(Value::list(record.iter().map(Value::from).collect()));
        check_len(rows.len(), limits)?;
    }
    Ok(Value::list(rows))
}

fn csv_records(text: &str, dialect: Dialect, limits: &ScriptLimits) -> ScriptResult<Value> {
    let mut reader = dialect.reader(text, true);
    let headers: Vec<Rc<str>> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(Rc::from)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let mut row = IndexMap::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            let field = record.get(i).map(Value::from).unwrap_or(Value::None);
            row.insert(Key::Str(header.clone()), field);
        }
        rows.push(Value::dict(row));
        check_len(rows.len(), limits)?;
    }
    Ok(Value::list(rows))
}

// ── json ──

/// `", "` and `": "` separators, as `json.dumps` writes by default.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// First integer literal in well-formed JSON `text` that an `i64` cannot
/// hold. Such literals would otherwise decode as lossy floats.
fn wide_integer(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let (mut i, mut in_string) = (0, false);
    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            match b {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }
        if b == b'"' {
            in_string = true;
            i += 1;
            continue;
        }
        if b == b'-' || b.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && matches!(bytes[i], b'-' | b'+' | b'.' | b'e' | b'E' | b'0'..=b'9') {
                i += 1;
            }
            let literal = &text[start..i];
            let integral = !literal.contains(['.', 'e', 'E']);
            if integral && literal.parse::<i64>().is_err() {
                return Some(literal);
            }
            continue;
        }
        i += 1;
    }
    None
}

fn dumps(json: &serde_json::Value, indent: Option<usize>) -> ScriptResult<String> {
    let mut buf = Vec::new();
    let written = match indent {
        Some(width) => {
            let pad = " ".repeat(width);
            let mut ser =
                serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(pad.as_bytes()));
            json.serialize(&mut ser)
        }
        None => {
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
            json.serialize(&mut ser)
        }
    };
    written.map_err(|e| ScriptError::runtime(format!("json.dumps() failed: {e}")))?;
    String::from_utf8(buf).map_err(|e| ScriptError::runtime(format!("json.dumps() failed: {e}")))
}
