//! Builtin functions, methods and properties available to rule code.
//!
//! Everything here is pure: no clock, no I/O, no randomness.

use std::fmt::{self, Write};

use regex::Regex;

use super::value::Value;
use crate::event::EventTime;

type BuiltinResult = Result<Value, String>;

fn type_error(message: impl AsRef<str>) -> String {
    format!("TypeError: {}", message.as_ref())
}

fn arg<'a>(args: &'a [Value], i: usize) -> &'a Value {
    args.get(i).unwrap_or(&Value::Null)
}

fn arg_str<'a>(args: &'a [Value], i: usize, func: &str) -> Result<&'a str, String> {
    match arg(args, i) {
        Value::Str(s) => Ok(s),
        other => Err(type_error(format!(
            "{}() expects a string as argument {}, got {}",
            func,
            i + 1,
            other.type_name()
        ))),
    }
}

fn arg_num(args: &[Value], i: usize, func: &str) -> Result<f64, String> {
    match arg(args, i) {
        Value::Number(n) => Ok(*n),
        other => Err(type_error(format!(
            "{}() expects a number as argument {}, got {}",
            func,
            i + 1,
            other.type_name()
        ))),
    }
}

fn arg_time(args: &[Value], func: &str) -> Result<EventTime, String> {
    let s = arg_str(args, 0, func)?;
    EventTime::parse(s).map_err(type_error)
}

fn check_len(len: usize, max_len: usize) -> Result<(), String> {
    if len > max_len {
        Err(size_error(max_len))
    } else {
        Ok(())
    }
}

fn size_error(max_len: usize) -> String {
    format!("RangeError: value exceeds the maximum size of {}", max_len)
}

/// A string builder that refuses to grow past `max_len` bytes.
pub(super) struct CappedString {
    out: String,
    max_len: usize,
}

impl CappedString {
    pub(super) fn new(max_len: usize) -> Self {
        CappedString {
            out: String::new(),
            max_len,
        }
    }

    pub(super) fn push_display(&mut self, value: &impl fmt::Display) -> Result<(), String> {
        write!(self, "{}", value).map_err(|_| size_error(self.max_len))
    }

    pub(super) fn into_string(self) -> String {
        self.out
    }
}

impl fmt::Write for CappedString {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.out.len().saturating_add(s.len()) > self.max_len {
            return Err(fmt::Error);
        }
        self.out.push_str(s);
        Ok(())
    }
}

/// Read `value.name`.
pub(super) fn get_property(value: &Value, name: &str) -> BuiltinResult {
    match value {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Str(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Null => Err(type_error(format!("cannot read property '{}' of null", name))),
        _ => Ok(Value::Null),
    }
}

/// Read `value[index]`.
pub(super) fn get_index(value: &Value, index: &Value) -> BuiltinResult {
    match (value, index) {
        (Value::Array(items), Value::Number(n)) => Ok(as_index(*n)
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null)),
        (Value::Object(map), Value::Str(key)) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        (Value::Str(s), Value::Number(n)) => Ok(as_index(*n)
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or(Value::Null)),
        (Value::Null, _) => Err(type_error(format!("cannot read index {} of null", index))),
        _ => Ok(Value::Null),
    }
}

pub(super) fn as_index(n: f64) -> Option<usize> {
    if n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}

/// Call a global builtin function.
pub(super) fn call_function(name: &str, args: &[Value], max_len: usize) -> BuiltinResult {
    match name {
        "hour" => Ok(Value::Number(arg_time(args, name)?.hour() as f64)),
        "minute" => Ok(Value::Number(arg_time(args, name)?.minute() as f64)),
        "weekday" => Ok(Value::Number(arg_time(args, name)?.weekday() as f64)),
        "date" => Ok(Value::Str(arg_time(args, name)?.date().format("%Y-%m-%d").to_string())),
        "len" => match arg(args, 0) {
            Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
            Value::Array(items) => Ok(Value::Number(items.len() as f64)),
            Value::Object(map) => Ok(Value::Number(map.len() as f64)),
            Value::Null => Ok(Value::Number(0.0)),
            other => Err(type_error(format!("len() of {}", other.type_name()))),
        },
        "lower" => Ok(Value::Str(arg_str(args, 0, name)?.to_lowercase())),
        "upper" => Ok(Value::Str(arg_str(args, 0, name)?.to_uppercase())),
        "str" => {
            let mut s = CappedString::new(max_len);
            s.push_display(arg(args, 0))?;
            Ok(Value::Str(s.into_string()))
        }
        "num" => Ok(Value::Number(match arg(args, 0) {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
            Value::Null => 0.0,
            _ => f64::NAN,
        })),
        "min" => Ok(Value::Number(arg_num(args, 0, name)?.min(arg_num(args, 1, name)?))),
        "max" => Ok(Value::Number(arg_num(args, 0, name)?.max(arg_num(args, 1, name)?))),
        "abs" => Ok(Value::Number(arg_num(args, 0, name)?.abs())),
        "floor" => Ok(Value::Number(arg_num(args, 0, name)?.floor())),
        "matches" => {
            let text = arg_str(args, 0, name)?;
            let pattern = arg_str(args, 1, name)?;
            let re = Regex::new(pattern).map_err(|e| format!("SyntaxError: invalid regex: {}", e))?;
            Ok(Value::Bool(re.is_match(text)))
        }
        _ => Err(format!("ReferenceError: {} is not defined", name)),
    }
}

/// Call `receiver.name(args)`.
pub(super) fn call_method(receiver: &Value, name: &str, args: &[Value], max_len: usize) -> BuiltinResult {
    match receiver {
        Value::Str(s) => string_method(s, name, args, max_len),
        Value::Array(items) => array_method(items, name, args, max_len),
        Value::Null => Err(type_error(format!("cannot read property '{}' of null", name))),
        other => Err(type_error(format!("{}.{} is not a function", other.type_name(), name))),
    }
}

fn string_method(s: &str, name: &str, args: &[Value], max_len: usize) -> BuiltinResult {
    let result = match name {
        "startsWith" => Value::Bool(s.starts_with(arg_str(args, 0, name)?)),
        "endsWith" => Value::Bool(s.ends_with(arg_str(args, 0, name)?)),
        "includes" => Value::Bool(s.contains(arg_str(args, 0, name)?)),
        "indexOf" => {
            let needle = arg_str(args, 0, name)?;
            Value::Number(match s.find(needle) {
                Some(byte_idx) => s[..byte_idx].chars().count() as f64,
                None => -1.0,
            })
        }
        "toLowerCase" => Value::Str(s.to_lowercase()),
        "toUpperCase" => Value::Str(s.to_uppercase()),
        "trim" => Value::Str(s.trim().to_string()),
        "replace" => {
            let (from, to) = (arg_str(args, 0, name)?, arg_str(args, 1, name)?);
            if s.contains(from) {
                check_len((s.len() - from.len()).saturating_add(to.len()), max_len)?;
            }
            Value::Str(s.replacen(from, to, 1))
        }
        "replaceAll" => {
            let (from, to) = (arg_str(args, 0, name)?, arg_str(args, 1, name)?);
            if from.is_empty() {
                return Err(type_error("replaceAll() needs a non-empty pattern"));
            }
            let hits = s.matches(from).count();
            check_len((s.len() - hits * from.len()).saturating_add(hits.saturating_mul(to.len())), max_len)?;
            Value::Str(s.replace(from, to))
        }
        "split" => {
            let sep = arg_str(args, 0, name)?;
            let parts: Vec<Value> = if sep.is_empty() {
                s.chars().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(sep).map(Value::str).collect()
            };
            check_len(parts.len(), max_len)?;
            Value::Array(parts)
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(args, chars.len(), name)?;
            Value::Str(chars[start..end].iter().collect())
        }
        _ => return Err(type_error(format!("string.{} is not a function", name))),
    };

    if let Value::Str(out) = &result {
        check_len(out.len(), max_len)?;
    }
    Ok(result)
}

fn array_method(items: &[Value], name: &str, args: &[Value], max_len: usize) -> BuiltinResult {
    match name {
        "includes" => Ok(Value::Bool(items.contains(arg(args, 0)))),
        "indexOf" => Ok(Value::Number(
            items
                .iter()
                .position(|v| v == arg(args, 0))
                .map(|i| i as f64)
                .unwrap_or(-1.0),
        )),
        "join" => {
            let sep = match arg(args, 0) {
                Value::Null => ",",
                _ => arg_str(args, 0, name)?,
            };
            let mut joined = CappedString::new(max_len);
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    joined.push_display(&sep)?;
                }
                joined.push_display(item)?;
            }
            Ok(Value::Str(joined.into_string()))
        }
        _ => Err(type_error(format!("array.{} is not a function", name))),
    }
}

/// JavaScript `slice` bounds: negative values count from the end.
fn slice_bounds(args: &[Value], len: usize, func: &str) -> Result<(usize, usize), String> {
    let resolve = |n: f64| -> usize {
        let n = n.trunc();
        if n < 0.0 {
            len.saturating_sub((-n) as usize)
        } else {
            (n as usize).min(len)
        }
    };

    let start = match arg(args, 0) {
        Value::Null => 0,
        _ => resolve(arg_num(args, 0, func)?),
    };
    let end = match arg(args, 1) {
        Value::Null => len,
        _ => resolve(arg_num(args, 1, func)?),
    };
    Ok((start, end.max(start)))
}
