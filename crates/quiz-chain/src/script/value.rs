//! Runtime values and the operators defined on them.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::ast::BinOp;
use super::builtins::Builtin;
use super::facilities::{Facility, FacilityFn};
use super::{ScriptError, ScriptLimits, ScriptResult};

/// Nesting depth past which containers are not walked.
const MAX_NESTING: usize = 100;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictRef = Rc<RefCell<IndexMap<Key, Value>>>;

/// A dictionary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Str(Rc<str>),
}

impl Key {
    pub fn to_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// Captured groups of a regex match. Group 0 is the whole match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    pub groups: Vec<Option<String>>,
    pub names: Vec<(String, usize)>,
    pub span: (usize, usize),
}

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(ListRef),
    Dict(DictRef),
    Match(Rc<MatchData>),
    Builtin(Builtin),
    Facility(Facility),
    FacilityFn(FacilityFn),
}

/// A number after bool promotion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(entries: IndexMap<Key, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Match(_) => "re.Match",
            Value::Builtin(_) | Value::FacilityFn(_) => "builtin_function_or_method",
            Value::Facility(_) => "module",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Match(_) | Value::Builtin(_) | Value::Facility(_) | Value::FacilityFn(_) => {
                true
            }
        }
    }

    pub fn as_num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    pub fn as_str(&self, context: &str) -> ScriptResult<&str> {
        match self {
            Value::Str(s) => Ok(&**s),
            other => Err(ScriptError::runtime(format!(
                "{context} expects a str, got '{}'",
                other.type_name()
            ))),
        }
    }

    pub fn as_int(&self, context: &str) -> ScriptResult<i64> {
        match self {
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Int(i) => Ok(*i),
            other => Err(ScriptError::runtime(format!(
                "{context} expects an int, got '{}'",
                other.type_name()
            ))),
        }
    }

    pub fn to_key(&self) -> ScriptResult<Key> {
        match self {
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Int(i) => Ok(Key::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Key::Int(*f as i64)),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            other => Err(ScriptError::runtime(format!(
                "unhashable type: '{}'",
                other.type_name()
            ))),
        }
    }

    /// Python `repr()`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        write_repr(self, &mut out, 0);
        out
    }

    /// Convert to JSON for submission.
    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        to_json(self, 0)
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::dict(
                map.iter()
                    .map(|(k, v)| (Key::Str(Rc::from(k.as_str())), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.repr()),
        }
    }
}

pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let s = format!("{f:e}");
        if let Some((mantissa, exp)) = s.split_once('e') {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            return format!("{mantissa}e{sign}{digits:0>2}");
        }
        return s;
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn repr_str(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn write_repr(value: &Value, out: &mut String, depth: usize) {
    if depth > MAX_NESTING {
        out.push_str("...");
        return;
    }
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&format_float(*f)),
        Value::Str(s) => repr_str(s, out),
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(item, out, depth + 1);
            }
            out.push(']');
        }
        Value::Dict(entries) => {
            out.push('{');
            for (i, (k, v)) in entries.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(&k.to_value(), out, depth + 1);
                out.push_str(": ");
                write_repr(v, out, depth + 1);
            }
            out.push('}');
        }
        Value::Match(m) => {
            out.push_str(&format!("<re.Match object; span=({}, {}), match=", m.span.0, m.span.1));
            repr_str(m.groups[0].as_deref().unwrap_or(""), out);
            out.push('>');
        }
        Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name())),
        Value::FacilityFn(f) => out.push_str(&format!("<built-in function {}>", f.name())),
        Value::Facility(m) => out.push_str(&format!("<module '{}'>", m.name())),
    }
}

fn to_json(value: &Value, depth: usize) -> Result<serde_json::Value, String> {
    if depth > MAX_NESTING {
        return Err("value is nested too deeply".to_string());
    }
    Ok(match value {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| format!("{} is not a JSON number", format_float(*f)))?,
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::List(items) => serde_json::Value::Array(
            items
                .borrow()
                .iter()
                .map(|v| to_json(v, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Value::Dict(entries) => {
            let mut map = serde_json::Map::new();
            for (k, v) in entries.borrow().iter() {
                let key = match k {
                    Key::Str(s) => s.to_string(),
                    Key::Int(i) => i.to_string(),
                    Key::Bool(b) => b.to_string(),
                };
                map.insert(key, to_json(v, depth + 1)?);
            }
            serde_json::Value::Object(map)
        }
        other => return Err(format!("a '{}' value is not JSON", other.type_name())),
    })
}

// ── Comparison ──

/// Python `==`.
pub fn equals(a: &Value, b: &Value) -> bool {
    equals_at(a, b, 0)
}

fn equals_at(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_NESTING {
        return false;
    }
    if let (Some(x), Some(y)) = (a.as_num(), b.as_num()) {
        return match (x, y) {
            (Num::Int(x), Num::Int(y)) => x == y,
            (x, y) => x.to_f64() == y.to_f64(),
        };
    }
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|(p, q)| equals_at(p, q, depth + 1))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.get(k)
                        .is_some_and(|other| equals_at(v, other, depth + 1))
                })
        }
        (Value::Match(x), Value::Match(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Facility(x), Value::Facility(y)) => x == y,
        (Value::FacilityFn(x), Value::FacilityFn(y)) => x == y,
        _ => false,
    }
}

/// Python ordering. `None` means unordered (a NaN was involved).
pub fn compare(a: &Value, b: &Value, symbol: &str) -> ScriptResult<Option<Ordering>> {
    compare_at(a, b, symbol, 0)
}

fn compare_at(a: &Value, b: &Value, symbol: &str, depth: usize) -> ScriptResult<Option<Ordering>> {
    if depth > MAX_NESTING {
        return Err(ScriptError::runtime("comparison nested too deeply"));
    }
    if let (Some(x), Some(y)) = (a.as_num(), b.as_num()) {
        return Ok(match (x, y) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            (x, y) => x.to_f64().partial_cmp(&y.to_f64()),
        });
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow().clone(), y.borrow().clone());
            for (p, q) in x.iter().zip(y.iter()) {
                if !equals_at(p, q, depth + 1) {
                    return compare_at(p, q, symbol, depth + 1);
                }
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => Err(ScriptError::runtime(format!(
            "'{symbol}' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Python `in`.
pub fn contains(container: &Value, item: &Value) -> ScriptResult<bool> {
    match container {
        Value::Str(haystack) => Ok(haystack.contains(item.as_str("'in <string>'")?)),
        Value::List(items) => Ok(items.borrow().iter().any(|v| equals(v, item))),
        Value::Dict(entries) => Ok(entries.borrow().contains_key(&item.to_key()?)),
        other => Err(ScriptError::runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

// ── Iteration and indexing ──

/// The items a `for` loop visits, snapshotted.
pub fn iterate(value: &Value) -> ScriptResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Dict(entries) => Ok(entries.borrow().keys().map(Key::to_value).collect()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        other => Err(ScriptError::runtime(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

fn normalize_index(index: i64, len: usize, what: &str) -> ScriptResult<usize> {
    let len_i = len as i64;
    let resolved = if index < 0 { index + len_i } else { index };
    if (0..len_i).contains(&resolved) {
        Ok(resolved as usize)
    } else {
        Err(ScriptError::runtime(format!("{what} index out of range")))
    }
}

pub fn get_item(object: &Value, index: &Value) -> ScriptResult<Value> {
    match object {
        Value::List(items) => {
            let items = items.borrow();
            let i = normalize_index(index.as_int("list index")?, items.len(), "list")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let count = s.chars().count();
            let i = normalize_index(index.as_int("string index")?, count, "string")?;
            Ok(s.chars().nth(i).map(|c| Value::from(c.to_string())).unwrap_or(Value::None))
        }
        Value::Dict(entries) => {
            let key = index.to_key()?;
            entries
                .borrow()
                .get(&key)
                .cloned()
                .ok_or_else(|| ScriptError::runtime(format!("KeyError: {}", index.repr())))
        }
        Value::Match(m) => match_group(m, index),
        other => Err(ScriptError::runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub fn set_item(object: &Value, index: &Value, value: Value) -> ScriptResult<()> {
    match object {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index.as_int("list index")?, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(entries) => {
            entries.borrow_mut().insert(index.to_key()?, value);
            Ok(())
        }
        other => Err(ScriptError::runtime(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `m.group(n)` / `m[n]`, by number or by name.
pub fn match_group(m: &MatchData, which: &Value) -> ScriptResult<Value> {
    let index = match which {
        Value::Str(name) => m
            .names
            .iter()
            .find(|(n, _)| n.as_str() == &**name)
            .map(|(_, i)| *i)
            .ok_or_else(|| ScriptError::runtime(format!("no such group: {}", which.repr())))?,
        other => {
            let i = other.as_int("group")?;
            usize::try_from(i)
                .ok()
                .filter(|&i| i < m.groups.len())
                .ok_or_else(|| ScriptError::runtime(format!("no such group: {i}")))?
        }
    };
    Ok(m.groups[index]
        .as_ref()
        .map(|s| Value::from(s.as_str()))
        .unwrap_or(Value::None))
}

fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi);
    let resolve = |v: i64| if v < 0 { v + len } else { v };

    let mut out = Vec::new();
    if step > 0 {
        let start = clamp(lower.map(resolve).unwrap_or(0), 0, len);
        let stop = clamp(upper.map(resolve).unwrap_or(len), 0, len);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    } else {
        let start = clamp(lower.map(resolve).unwrap_or(len - 1), -1, len - 1);
        let stop = clamp(upper.map(resolve).unwrap_or(-1), -1, len - 1);
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
    }
    out
}

pub fn slice(
    object: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
    step: Option<&Value>,
) -> ScriptResult<Value> {
    let bound = |v: Option<&Value>| -> ScriptResult<Option<i64>> {
        match v {
            None | Some(Value::None) => Ok(None),
            Some(v) => v.as_int("slice").map(Some),
        }
    };
    let step = bound(step)?.unwrap_or(1);
    if step == 0 {
        return Err(ScriptError::runtime("slice step cannot be zero"));
    }
    let (lower, upper) = (bound(lower)?, bound(upper)?);

    match object {
        Value::List(items) => {
            let items = items.borrow();
            Ok(Value::list(
                slice_indices(items.len(), lower, upper, step)
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect(),
            ))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::from(
                slice_indices(chars.len(), lower, upper, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect::<String>(),
            ))
        }
        other => Err(ScriptError::runtime(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

// ── Arithmetic ──

fn overflow() -> ScriptError {
    ScriptError::runtime("integer overflow")
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

fn repeat_count(n: &Value) -> Option<usize> {
    match n {
        Value::Int(_) | Value::Bool(_) => n.as_int("").ok().map(|i| i.max(0) as usize),
        _ => None,
    }
}

pub fn unary_neg(value: &Value) -> ScriptResult<Value> {
    match value.as_num() {
        Some(Num::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        Some(Num::Float(f)) => Ok(Value::Float(-f)),
        None => Err(ScriptError::runtime(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

pub fn unary_pos(value: &Value) -> ScriptResult<Value> {
    match value.as_num() {
        Some(Num::Int(i)) => Ok(Value::Int(i)),
        Some(Num::Float(f)) => Ok(Value::Float(f)),
        None => Err(ScriptError::runtime(format!(
            "bad operand type for unary +: '{}'",
            value.type_name()
        ))),
    }
}

pub fn binary(op: BinOp, left: &Value, right: &Value, limits: &ScriptLimits) -> ScriptResult<Value> {
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_len(a.len() + b.len(), limits)?;
            Ok(Value::from(format!("{a}{b}")))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut joined = a.borrow().clone();
            joined.extend(b.borrow().iter().cloned());
            check_len(joined.len(), limits)?;
            Ok(Value::list(joined))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s))
            if repeat_count(n).is_some() =>
        {
            let count = repeat_count(n).unwrap_or(0);
            check_len(s.len().saturating_mul(count), limits)?;
            Ok(Value::from(s.repeat(count)))
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if repeat_count(n).is_some() =>
        {
            let count = repeat_count(n).unwrap_or(0);
            let items = items.borrow();
            check_len(items.len().saturating_mul(count), limits)?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::list(out))
        }
        _ => numeric(op, left, right),
    }
}

fn numeric(op: BinOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    let (Some(a), Some(b)) = (left.as_num(), right.as_num()) else {
        return Err(ScriptError::runtime(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )));
    };

    match (a, b) {
        (Num::Int(a), Num::Int(b)) => int_op(op, a, b),
        (a, b) => float_op(op, a.to_f64(), b.to_f64()),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> ScriptResult<Value> {
    let zero = || ScriptError::runtime("integer division or modulo by zero");
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(ScriptError::runtime("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(zero());
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(zero());
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ScriptError::runtime(
                        "zero cannot be raised to a negative power",
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(value))
}

fn float_op(op: BinOp, a: f64, b: f64) -> ScriptResult<Value> {
    let zero = || ScriptError::runtime("float division by zero");
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(zero());
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero());
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ScriptError::runtime("float modulo by zero"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ScriptError::runtime(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            if a == 0.0 && b < 0.0 {
                return Err(ScriptError::runtime(
                    "zero cannot be raised to a negative power",
                ));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ScriptLimits {
        ScriptLimits::default()
    }

    #[test]
    fn test_python_division_semantics() {
        let l = limits();
        let v = |op, a: i64, b: i64| binary(op, &Value::Int(a), &Value::Int(b), &l).unwrap().repr();
        assert_eq!(v(BinOp::Div, 7, 2), "3.5");
        assert_eq!(v(BinOp::FloorDiv, -7, 2), "-4");
        assert_eq!(v(BinOp::Mod, -7, 2), "1");
        assert_eq!(v(BinOp::Mod, 7, -2), "-1");
        assert_eq!(v(BinOp::Pow, 2, 10), "1024");
        assert_eq!(v(BinOp::Pow, 2, -1), "0.5");
    }

    #[test]
    fn test_overflow_and_zero_division_are_faults() {
        let l = limits();
        assert!(binary(BinOp::Mul, &Value::Int(i64::MAX), &Value::Int(2), &l).is_err());
        assert!(binary(BinOp::Pow, &Value::Int(10), &Value::Int(100), &l).is_err());
        assert!(binary(BinOp::Div, &Value::Int(1), &Value::Int(0), &l).is_err());
        assert!(binary(BinOp::Mod, &Value::Float(1.0), &Value::Float(0.0), &l).is_err());
    }

    #[test]
    fn test_bool_promotes_to_int() {
        let v = binary(BinOp::Add, &Value::Bool(true), &Value::Int(1), &limits()).unwrap();
        assert!(matches!(v, Value::Int(2)));
        assert!(equals(&Value::Bool(true), &Value::Int(1)));
        assert!(equals(&Value::Int(2), &Value::Float(2.0)));
    }

    #[test]
    fn test_mixed_operands_rejected() {
        let err = binary(BinOp::Add, &Value::from("a"), &Value::Int(1), &limits()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported operand type(s) for +: 'str' and 'int'"
        );
    }

    #[test]
    fn test_repr_and_display() {
        let list = Value::list(vec![
            Value::Int(1),
            Value::Float(2.0),
            Value::from("it's"),
            Value::None,
            Value::Bool(true),
        ]);
        assert_eq!(list.repr(), r#"[1, 2.0, "it's", None, True]"#);
        assert_eq!(Value::from("plain").to_string(), "plain");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
    }

    #[test]
    fn test_slices() {
        let s = Value::from("abcdef");
        let sl = |a: Option<i64>, b: Option<i64>, c: Option<i64>| {
            let (a, b, c) = (a.map(Value::Int), b.map(Value::Int), c.map(Value::Int));
            slice(&s, a.as_ref(), b.as_ref(), c.as_ref()).unwrap().to_string()
        };
        assert_eq!(sl(Some(1), Some(3), None), "bc");
        assert_eq!(sl(None, None, Some(-1)), "fedcba");
        assert_eq!(sl(Some(-2), None, None), "ef");
        assert_eq!(sl(None, Some(100), Some(2)), "ace");
        assert_eq!(sl(Some(4), Some(1), Some(-1)), "edc");
        assert_eq!(sl(Some(1), None, Some(i64::MAX)), "b");
        assert_eq!(sl(None, None, Some(i64::MIN)), "f");
    }

    #[test]
    fn test_negative_index_and_key_error() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(get_item(&list, &Value::Int(-1)).unwrap(), Value::Int(2)));
        assert!(get_item(&list, &Value::Int(2)).is_err());

        let dict = Value::dict(IndexMap::new());
        let err = get_item(&dict, &Value::from("k")).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'k'");
    }

    #[test]
    fn test_self_referential_list_is_safe() {
        let list = Value::list(Vec::new());
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert!(list.repr().contains("..."));
        assert!(list.to_json().is_err());
        assert!(equals(&list, &list));
        if let Value::List(items) = &list {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn test_json_round_trip_keeps_ints() {
        let json = serde_json::json!({"a": [1, 2.5, "x", null, true]});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_list_ordering() {
        let a = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::list(vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(compare(&a, &b, "<").unwrap(), Some(Ordering::Less));
        assert!(compare(&a, &Value::Int(1), "<").is_err());
        assert_eq!(
            compare(&Value::Float(f64::NAN), &Value::Int(1), "<").unwrap(),
            None
        );
    }
}
