// SPDX-License-Identifier: MIT

//! Whitelisted helper functions callable from policy expressions
//!
//! Expressions cannot reach any host function that is not listed in
//! [`Helper`]. Every helper is pure except `ak_message` and `ak_logger`,
//! whose effects are confined to the per-call [`Effects`].

use regex::RegexBuilder;

use crate::policy::context::Value;
use crate::policy::error::EvaluationError;

/// Compiled regex size cap for `regex_match` / `regex_replace`
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// The fixed set of capabilities exposed to expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Helper {
    /// ak_message(msg) - emit a user-facing message
    AkMessage,
    /// ak_logger(msg) - write to the log sink
    AkLogger,
    /// regex_match(value, pattern)
    RegexMatch,
    /// regex_replace(value, pattern, replacement)
    RegexReplace,
    /// list_flatten(value)
    ListFlatten,
    Len,
    Str,
    Int,
    Bool,
}

/// Side effects collected during one evaluation
#[derive(Debug, Default)]
pub struct Effects {
    /// Name of the evaluator, used to tag log lines
    pub evaluator: String,
    /// Messages emitted through `ak_message`, in call order
    pub messages: Vec<String>,
}

impl Helper {
    pub const ALL: [Helper; 9] = [
        Helper::AkMessage,
        Helper::AkLogger,
        Helper::RegexMatch,
        Helper::RegexReplace,
        Helper::ListFlatten,
        Helper::Len,
        Helper::Str,
        Helper::Int,
        Helper::Bool,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Helper::AkMessage => "ak_message",
            Helper::AkLogger => "ak_logger",
            Helper::RegexMatch => "regex_match",
            Helper::RegexReplace => "regex_replace",
            Helper::ListFlatten => "list_flatten",
            Helper::Len => "len",
            Helper::Str => "str",
            Helper::Int => "int",
            Helper::Bool => "bool",
        }
    }

    /// Resolve a helper by the name an expression uses
    pub fn lookup(name: &str) -> Option<Helper> {
        Helper::ALL.into_iter().find(|h| h.name() == name)
    }

    fn arity(&self) -> usize {
        match self {
            Helper::RegexReplace => 3,
            Helper::RegexMatch => 2,
            _ => 1,
        }
    }

    /// Invoke the helper with already-evaluated arguments
    pub fn call(&self, args: Vec<Value>, effects: &mut Effects) -> Result<Value, EvaluationError> {
        if args.len() != self.arity() {
            return Err(EvaluationError::runtime(format!(
                "{}() takes {} argument(s), {} given",
                self.name(),
                self.arity(),
                args.len()
            )));
        }
        let mut args = args.into_iter();
        let first = args.next().unwrap_or_default();

        match self {
            Helper::AkMessage => {
                effects.messages.push(first.to_string());
                Ok(Value::None)
            }
            Helper::AkLogger => {
                log::info!("[policy:{}] {}", effects.evaluator, first);
                Ok(Value::None)
            }
            Helper::RegexMatch => {
                let pattern = args.next().unwrap_or_default();
                let re = build_regex(&pattern)?;
                Ok(Value::Bool(re.is_match(&first.to_string())))
            }
            Helper::RegexReplace => {
                let pattern = args.next().unwrap_or_default();
                let replacement = args.next().unwrap_or_default();
                let re = build_regex(&pattern)?;
                let haystack = first.to_string();
                let replacement = replacement.to_string();
                Ok(Value::Str(
                    re.replace_all(&haystack, replacement.as_str()).into_owned(),
                ))
            }
            Helper::ListFlatten => Ok(match first {
                Value::List(mut items) if items.len() <= 1 => items.pop().unwrap_or_default(),
                other => other,
            }),
            Helper::Len => match &first {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(l) => Ok(Value::Int(l.len() as i64)),
                Value::Map(m) => Ok(Value::Int(m.len() as i64)),
                other => Err(EvaluationError::runtime(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            },
            Helper::Str => Ok(Value::Str(first.to_string())),
            Helper::Bool => Ok(Value::Bool(first.is_truthy())),
            Helper::Int => to_int(first),
        }
    }
}

impl std::fmt::Display for Helper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn build_regex(pattern: &Value) -> Result<regex::Regex, EvaluationError> {
    let Value::Str(pattern) = pattern else {
        return Err(EvaluationError::runtime(format!(
            "regex pattern must be str, not '{}'",
            pattern.type_name()
        )));
    };
    RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| EvaluationError::runtime(format!("invalid regex '{}': {}", pattern, e)))
}

fn to_int(value: Value) -> Result<Value, EvaluationError> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(b as i64)),
        Value::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => {
            Ok(Value::Int(f.trunc() as i64))
        }
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| {
            EvaluationError::runtime(format!("invalid literal for int(): '{}'", s))
        }),
        other => Err(EvaluationError::runtime(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}
