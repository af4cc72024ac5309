//! The builtin whitelist and the methods of builtin types.

use std::cmp::Ordering;

use indexmap::IndexMap;

use super::ast::BinOp;
use super::value::{self, Key, ListRef, MatchData, Value};
use super::{ScriptError, ScriptLimits, ScriptResult};

/// Every function a script can call by bare name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Int,
    Float,
    Str,
    Len,
    Print,
    Sum,
    Max,
    Min,
    Range,
    List,
    Dict,
    Tuple,
    Abs,
    Round,
}

impl Builtin {
    pub const ALL: [Builtin; 14] = [
        Builtin::Int,
        Builtin::Float,
        Builtin::Str,
        Builtin::Len,
        Builtin::Print,
        Builtin::Sum,
        Builtin::Max,
        Builtin::Min,
        Builtin::Range,
        Builtin::List,
        Builtin::Dict,
        Builtin::Tuple,
        Builtin::Abs,
        Builtin::Round,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Str => "str",
            Builtin::Len => "len",
            Builtin::Print => "print",
            Builtin::Sum => "sum",
            Builtin::Max => "max",
            Builtin::Min => "min",
            Builtin::Range => "range",
            Builtin::List => "list",
            Builtin::Dict => "dict",
            Builtin::Tuple => "tuple",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

/// Evaluated call arguments.
pub struct Args {
    func: String,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(func: impl Into<String>, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            func: func.into(),
            positional,
            keywords,
        }
    }

    pub fn func(&self) -> &str {
        &self.func
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Remove and return a keyword argument.
    pub fn keyword(&mut self, name: &str) -> Option<Value> {
        let at = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(at).1)
    }

    /// Positional argument `index`, or the keyword `name` if it was not
    /// given positionally.
    pub fn take(&mut self, index: usize, name: &str) -> Option<Value> {
        match self.positional.get(index) {
            Some(v) => Some(v.clone()),
            None => self.keyword(name),
        }
    }

    fn take_keywords(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.keywords)
    }

    /// Check the positional count and that no unknown keyword remains.
    pub fn expect(&self, min: usize, max: usize) -> ScriptResult<()> {
        if let Some((k, _)) = self.keywords.first() {
            return Err(ScriptError::runtime(format!(
                "{}() got an unexpected keyword argument '{k}'",
                self.func
            )));
        }
        let n = self.positional.len();
        if n < min || n > max {
            let wanted = if min == max {
                format!("{min}")
            } else {
                format!("from {min} to {max}")
            };
            return Err(ScriptError::runtime(format!(
                "{}() takes {wanted} argument(s) ({n} given)",
                self.func
            )));
        }
        Ok(())
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

// ── Builtin functions ──

pub fn call(builtin: Builtin, mut args: Args, limits: &ScriptLimits) -> ScriptResult<Value> {
    match builtin {
        Builtin::Int => {
            args.expect(0, 2)?;
            match (args.get(0), args.get(1)) {
                (None, _) => Ok(Value::Int(0)),
                (Some(v), None) => to_int(v),
                (Some(v), Some(base)) => {
                    let text = v.as_str("int() with a base")?;
                    let base = base.as_int("int() base")?;
                    if !(2..=36).contains(&base) {
                        return Err(ScriptError::runtime("int() base must be >= 2 and <= 36"));
                    }
                    i64::from_str_radix(text.trim(), base as u32)
                        .map(Value::Int)
                        .map_err(|_| {
                            ScriptError::runtime(format!(
                                "invalid literal for int() with base {base}: {}",
                                v.repr()
                            ))
                        })
                }
            }
        }
        Builtin::Float => {
            args.expect(0, 1)?;
            match args.get(0) {
                None => Ok(Value::Float(0.0)),
                Some(v) => to_float(v),
            }
        }
        Builtin::Str => {
            args.expect(0, 1)?;
            Ok(Value::from(
                args.get(0).map(|v| v.to_string()).unwrap_or_default(),
            ))
        }
        Builtin::Len => {
            args.expect(1, 1)?;
            let n = match &args.positional[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.borrow().len(),
                Value::Dict(entries) => entries.borrow().len(),
                other => {
                    return Err(ScriptError::runtime(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(n as i64))
        }
        Builtin::Print => {
            let sep = match args.keyword("sep") {
                Some(v @ Value::Str(_)) => v.to_string(),
                _ => " ".to_string(),
            };
            args.keyword("end");
            args.expect(0, usize::MAX)?;
            let line = args
                .positional
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(&sep);
            tracing::info!(target: "quiz_chain::script", "{line}");
            Ok(Value::None)
        }
        Builtin::Sum => {
            let start = args.take(1, "start").unwrap_or(Value::Int(0));
            args.expect(1, 2)?;
            let mut total = start;
            for item in value::iterate(&args.positional[0])? {
                total = value::binary(BinOp::Add, &total, &item, limits)?;
            }
            Ok(total)
        }
        Builtin::Max => extremum(args, Ordering::Greater),
        Builtin::Min => extremum(args, Ordering::Less),
        Builtin::Range => {
            args.expect(1, 3)?;
            let ints = args
                .positional
                .iter()
                .map(|v| v.as_int("range()"))
                .collect::<ScriptResult<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked"),
            };
            if step == 0 {
                return Err(ScriptError::runtime("range() arg 3 must not be zero"));
            }
            let span = if step > 0 {
                i128::from(stop) - i128::from(start)
            } else {
                i128::from(start) - i128::from(stop)
            };
            let step_abs = i128::from(step).abs();
            let len = if span <= 0 { 0 } else { (span + step_abs - 1) / step_abs };
            let len = usize::try_from(len).unwrap_or(usize::MAX);
            check_len(len, limits)?;

            let items = (0..len)
                .map(|i| Value::Int((i128::from(start) + i as i128 * i128::from(step)) as i64))
                .collect();
            Ok(Value::list(items))
        }
        Builtin::List | Builtin::Tuple => {
            args.expect(0, 1)?;
            match args.get(0) {
                None => Ok(Value::list(Vec::new())),
                Some(v) => Ok(Value::list(value::iterate(v)?)),
            }
        }
        Builtin::Dict => {
            let keywords = args.take_keywords();
            args.expect(0, 1)?;
            let mut entries = IndexMap::new();
            match args.get(0) {
                None => {}
                Some(Value::Dict(d)) => entries = d.borrow().clone(),
                Some(pairs) => {
                    for pair in value::iterate(pairs)? {
                        let kv = value::iterate(&pair)?;
                        let [k, v] = <[Value; 2]>::try_from(kv).map_err(|kv| {
                            ScriptError::runtime(format!(
                                "dictionary update sequence element has length {}; 2 is required",
                                kv.len()
                            ))
                        })?;
                        entries.insert(k.to_key()?, v);
                    }
                }
            }
            for (k, v) in keywords {
                entries.insert(Key::Str(k.into()), v);
            }
            Ok(Value::dict(entries))
        }
        Builtin::Abs => {
            args.expect(1, 1)?;
            match &args.positional[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                v => {
                    let i = v.as_int("abs()")?;
                    i.checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| ScriptError::runtime("integer overflow"))
                }
            }
        }
        Builtin::Round => {
            let digits = args.take(1, "ndigits");
            args.expect(1, 2)?;
            round(&args.positional[0], digits.as_ref())
        }
    }
}

fn to_int(v: &Value) -> ScriptResult<Value> {
    match v {
        Value::Bool(_) | Value::Int(_) => Ok(Value::Int(v.as_int("int()")?)),
        Value::Float(f) => float_to_int(*f),
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| {
                ScriptError::runtime(format!(
                    "invalid literal for int() with base 10: {}",
                    v.repr()
                ))
            }),
        other => Err(ScriptError::runtime(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float_to_int(f: f64) -> ScriptResult<Value> {
    if !f.is_finite() {
        return Err(ScriptError::runtime(format!(
            "cannot convert float {} to integer",
            value::format_float(f)
        )));
    }
    let t = f.trunc();
    if t < -9.223_372_036_854_775e18 || t >= 9.223_372_036_854_775e18 {
        return Err(ScriptError::runtime("integer overflow"));
    }
    Ok(Value::Int(t as i64))
}

fn to_float(v: &Value) -> ScriptResult<Value> {
    match v {
        Value::Str(s) => s
            .trim()
            .replace('_', "")
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| {
                ScriptError::runtime(format!("could not convert string to float: {}", v.repr()))
            }),
        other => match other.as_num() {
            Some(n) => Ok(Value::Float(n.to_f64())),
            None => Err(ScriptError::runtime(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))),
        },
    }
}

fn round_half_even(x: f64) -> f64 {
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        x.round()
    }
}

/// Round to `digits` decimal places from the exact binary value, so
/// `2.675` (stored just below) rounds down.
fn round_decimal(f: f64, digits: i64) -> ScriptResult<f64> {
    if !f.is_finite() || digits > 330 {
        return Ok(f);
    }
    format!("{:.*}", digits as usize, f)
        .parse::<f64>()
        .map_err(|e| ScriptError::runtime(format!("round(): {e}")))
}

fn round(x: &Value, digits: Option<&Value>) -> ScriptResult<Value> {
    let digits = match digits {
        None | Some(Value::None) => None,
        Some(d) => Some(d.as_int("round() ndigits")?),
    };

    match (x, digits) {
        (Value::Float(f), None) => float_to_int(round_half_even(*f)),
        (Value::Float(f), Some(n)) if n >= 0 => round_decimal(*f, n).map(Value::Float),
        (Value::Float(f), Some(n)) => {
            let factor = 10f64.powi((-n).min(308) as i32);
            Ok(Value::Float(round_half_even(f / factor) * factor))
        }
        (v, None) => Ok(Value::Int(v.as_int("round()")?)),
        (v, Some(n)) => {
            let i = v.as_int("round()")?;
            if n >= 0 {
                return Ok(Value::Int(i));
            }
            let factor = 10f64.powi((-n).min(308) as i32);
            float_to_int(round_half_even(i as f64 / factor) * factor)
        }
    }
}

fn extremum(mut args: Args, want: Ordering) -> ScriptResult<Value> {
    let default = args.keyword("default");
    args.expect(1, usize::MAX)?;

    let candidates = if args.positional.len() == 1 {
        value::iterate(&args.positional[0])?
    } else {
        args.positional.clone()
    };

    let mut best: Option<Value> = None;
    for item in candidates {
        best = match best {
            None => Some(item),
            Some(current) => {
                let symbol = if want == Ordering::Greater { ">" } else { "<" };
                if value::compare(&item, &current, symbol)? == Some(want) {
                    Some(item)
                } else {
                    Some(current)
                }
            }
        };
    }

    best.or(default).ok_or_else(|| {
        ScriptError::runtime(format!("{}() arg is an empty sequence", args.func()))
    })
}

// ── Methods ──

fn no_attribute(object: &Value, name: &str) -> ScriptError {
    ScriptError::runtime(format!(
        "'{}' object has no attribute '{name}'",
        object.type_name()
    ))
}

/// Call `object.name(args)`.
pub fn call_method(object: &Value, name: &str, args: Args, limits: &ScriptLimits) -> ScriptResult<Value> {
    match object {
        Value::Str(s) => str_method(s, object, name, args, limits),
        Value::List(items) => list_method(items, object, name, args, limits),
        Value::Dict(_) => dict_method(object, name, args),
        Value::Match(m) => match_method(m, object, name, args),
        other => Err(no_attribute(other, name)),
    }
}

fn str_method(
    s: &str,
    object: &Value,
    name: &str,
    mut args: Args,
    limits: &ScriptLimits,
) -> ScriptResult<Value> {
    let strip_set = |args: &Args| -> ScriptResult<Option<Vec<char>>> {
        match args.get(0) {
            None | Some(Value::None) => Ok(None),
            Some(v) => Ok(Some(v.as_str("strip()")?.chars().collect())),
        }
    };

    match name {
        "strip" | "lstrip" | "rstrip" => {
            args.expect(0, 1)?;
            let set = strip_set(&args)?;
            let matches = |c: char| match &set {
                Some(chars) => chars.contains(&c),
                None => c.is_whitespace(),
            };
            let out = match name {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            Ok(Value::from(out))
        }
        "split" => {
            let sep = args.take(0, "sep");
            let maxsplit = args.take(1, "maxsplit");
            args.expect(0, 2)?;
            let maxsplit = match maxsplit {
                Some(v) => v.as_int("split() maxsplit")?,
                None => -1,
            };
            let parts: Vec<Value> = match sep {
                None | Some(Value::None) => split_whitespace(s, maxsplit),
                Some(sep) => {
                    let sep = sep.as_str("split() separator")?;
                    if sep.is_empty() {
                        return Err(ScriptError::runtime("empty separator"));
                    }
                    if maxsplit < 0 {
                        s.split(sep).map(Value::from).collect()
                    } else {
                        s.splitn(maxsplit as usize + 1, sep).map(Value::from).collect()
                    }
                }
            };
            Ok(Value::list(parts))
        }
        "splitlines" => {
            args.expect(0, 0)?;
            Ok(Value::list(s.lines().map(Value::from).collect()))
        }
        "lower" => {
            args.expect(0, 0)?;
            Ok(Value::from(s.to_lowercase()))
        }
        "upper" => {
            args.expect(0, 0)?;
            Ok(Value::from(s.to_uppercase()))
        }
        "replace" => {
            args.expect(2, 3)?;
            let old = args.positional[0].as_str("replace()")?;
            let new = args.positional[1].as_str("replace()")?;
            let count = match args.get(2) {
                Some(v) => v.as_int("replace() count")?,
                None => -1,
            };
            let out = if count < 0 {
                s.replace(old, new)
            } else {
                s.replacen(old, new, count as usize)
            };
            check_len(out.len(), limits)?;
            Ok(Value::from(out))
        }
        "startswith" | "endswith" => {
            args.expect(1, 1)?;
            let candidates = match &args.positional[0] {
                Value::List(items) => items.borrow().clone(),
                v => vec![v.clone()],
            };
            for candidate in &candidates {
                let affix = candidate.as_str(name)?;
                let hit = if name == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" => {
            args.expect(1, 1)?;
            let needle = args.positional[0].as_str("find()")?;
            let at = s
                .find(needle)
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::Int(at))
        }
        "count" => {
            args.expect(1, 1)?;
            let needle = args.positional[0].as_str("count()")?;
            let n = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(n as i64))
        }
        "join" => {
            args.expect(1, 1)?;
            let items = value::iterate(&args.positional[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(ScriptError::runtime(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            let out = parts.join(s);
            check_len(out.len(), limits)?;
            Ok(Value::from(out))
        }
        "isdigit" => {
            args.expect(0, 0)?;
            Ok(Value::Bool(
                !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
            ))
        }
        _ => Err(no_attribute(object, name)),
    }
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
            parts.push(Value::from(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(i) => {
                parts.push(Value::from(&rest[..i]));
                rest = rest[i..].trim_start();
            }
            None => {
                parts.push(Value::from(rest));
                break;
            }
        }
    }
    parts
}

fn list_method(
    items: &ListRef,
    object: &Value,
    name: &str,
    mut args: Args,
    limits: &ScriptLimits,
) -> ScriptResult<Value> {
    match name {
        "append" => {
            args.expect(1, 1)?;
            let mut list = items.borrow_mut();
            check_len(list.len() + 1, limits)?;
            list.push(args.positional[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            args.expect(1, 1)?;
            let more = value::iterate(&args.positional[0])?;
            let mut list = items.borrow_mut();
            check_len(list.len() + more.len(), limits)?;
            list.extend(more);
            Ok(Value::None)
        }
        "pop" => {
            args.expect(0, 1)?;
            let mut list = items.borrow_mut();
            if list.is_empty() {
                return Err(ScriptError::runtime("pop from empty list"));
            }
            let len = list.len() as i64;
            let index = match args.get(0) {
                Some(v) => v.as_int("pop()")?,
                None => -1,
            };
            let resolved = if index < 0 { index + len } else { index };
            if !(0..len).contains(&resolved) {
                return Err(ScriptError::runtime("pop index out of range"));
            }
            Ok(list.remove(resolved as usize))
        }
        "index" => {
            args.expect(1, 1)?;
            let needle = &args.positional[0];
            items
                .borrow()
                .iter()
                .position(|v| value::equals(v, needle))
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| ScriptError::runtime(format!("{} is not in list", needle.repr())))
        }
        "count" => {
            args.expect(1, 1)?;
            let needle = &args.positional[0];
            let n = items
                .borrow()
                .iter()
                .filter(|v| value::equals(v, needle))
                .count();
            Ok(Value::Int(n as i64))
        }
        "sort" => {
            let reverse = args.keyword("reverse").is_some_and(|v| v.truthy());
            args.expect(0, 0)?;
            let mut sorted = std::mem::take(&mut *items.borrow_mut());
            let mut failure = None;
            sorted.sort_by(|a, b| {
                let ord = match value::compare(a, b, "<") {
                    Ok(Some(o)) => o,
                    Ok(None) => Ordering::Equal,
                    Err(e) => {
                        failure.get_or_insert(e);
                        Ordering::Equal
                    }
                };
                if reverse {
                    ord.reverse()
                } else {
                    ord
                }
            });
            *items.borrow_mut() = sorted;
            match failure {
                Some(e) => Err(e),
                None => Ok(Value::None),
            }
        }
        "reverse" => {
            args.expect(0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        _ => Err(no_attribute(object, name)),
    }
}

fn dict_method(object: &Value, name: &str, args: Args) -> ScriptResult<Value> {
    let Value::Dict(entries) = object else {
        return Err(no_attribute(object, name));
    };

    match name {
        "get" => {
            args.expect(1, 2)?;
            let key = args.positional[0].to_key()?;
            Ok(entries
                .borrow()
                .get(&key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            args.expect(0, 0)?;
            Ok(Value::list(entries.borrow().keys().map(Key::to_value).collect()))
        }
        "values" => {
            args.expect(0, 0)?;
            Ok(Value::list(entries.borrow().values().cloned().collect()))
        }
        "items" => {
            args.expect(0, 0)?;
            Ok(Value::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::list(vec![k.to_value(), v.clone()]))
                    .collect(),
            ))
        }
        _ => Err(no_attribute(object, name)),
    }
}

fn match_method(m: &MatchData, object: &Value, name: &str, args: Args) -> ScriptResult<Value> {
    match name {
        "group" => {
            args.expect(0, usize::MAX)?;
            match args.positional.as_slice() {
                [] => value::match_group(m, &Value::Int(0)),
                [one] => value::match_group(m, one),
                many => Ok(Value::list(
                    many.iter()
                        .map(|g| value::match_group(m, g))
                        .collect::<ScriptResult<_>>()?,
                )),
            }
        }
        "groups" => {
            args.expect(0, 0)?;
            Ok(Value::list(
                m.groups
                    .iter()
                    .skip(1)
                    .map(|g| g.as_deref().map(Value::from).unwrap_or(Value::None))
                    .collect(),
            ))
        }
        _ => Err(no_attribute(object, name)),
    }
}
