// SPDX-License-Identifier: MIT

//! Tree-walking interpreter for compiled policy programs
//!
//! Every evaluated node costs one step against the budget in [`Limits`].
//! Every value copied out of a binding or built by an operator is charged by
//! [`Value::size`] against a per-evaluation allocation budget.
//! Names resolve against the call-local scope first, then the read-only
//! [`Context`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use super::ast::{BinaryOp, CompareOp, Expression, Literal, Program, Statement, UnaryOp};
use crate::policy::context::{Context, Value};
use crate::policy::error::EvaluationError;
use crate::policy::evaluator::Limits;
use crate::policy::helpers::{Effects, Helper};

/// How often the wall clock is consulted, in steps
const CLOCK_CHECK_INTERVAL: u64 = 64;

/// Largest single value an expression may build, in elements
const MAX_VALUE_SIZE: usize = 1 << 16;

/// Total elements one evaluation may copy or build
const MAX_ALLOCATED: usize = 1 << 20;

/// One execution of one program; never reused across calls
pub struct Interpreter<'a> {
    context: &'a Context,
    locals: HashMap<String, Value>,
    effects: Effects,
    limits: &'a Limits,
    steps: u64,
    depth: usize,
    allocated: usize,
    started: Instant,
}

/// What a statement did to control flow
enum Flow {
    Next(Option<Value>),
    Return(Value),
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a Context, limits: &'a Limits, evaluator: &str) -> Self {
        Self {
            context,
            locals: HashMap::new(),
            effects: Effects {
                evaluator: evaluator.to_string(),
                messages: Vec::new(),
            },
            limits,
            steps: 0,
            depth: 0,
            allocated: 0,
            started: Instant::now(),
        }
    }

    /// Run `program`, returning its value and collected effects
    ///
    /// The value is that of the first `return` executed, else that of the
    /// last expression statement, else `None`.
    pub fn run(mut self, program: &Program) -> (Result<Value, EvaluationError>, Effects) {
        let result = self.run_statements(program);
        (result, self.effects)
    }

    fn run_statements(&mut self, program: &Program) -> Result<Value, EvaluationError> {
        let mut last = Value::None;
        for statement in &program.statements {
            match self.statement(statement)? {
                Flow::Return(value) => return Ok(value),
                Flow::Next(Some(value)) => last = value,
                Flow::Next(None) => {}
            }
        }
        Ok(last)
    }

    fn tick(&mut self) -> Result<(), EvaluationError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(EvaluationError::budget(format!(
                "step limit of {} exceeded",
                self.limits.max_steps
            )));
        }
        if self.steps % CLOCK_CHECK_INTERVAL == 0 {
            self.check_deadline()?;
        }
        Ok(())
    }

    /// Charge a freshly built value and enforce the single-value cap
    fn produce(&mut self, value: Value) -> Result<Value, EvaluationError> {
        let size = value.size();
        if size > MAX_VALUE_SIZE {
            return Err(EvaluationError::budget(format!(
                "value larger than {} elements",
                MAX_VALUE_SIZE
            )));
        }
        allocate(&mut self.allocated, size)?;
        Ok(value)
    }

    fn check_deadline(&self) -> Result<(), EvaluationError> {
        if let Some(timeout) = self.limits.timeout {
            if self.started.elapsed() > timeout {
                return Err(EvaluationError::budget(format!(
                    "time limit of {}ms exceeded",
                    timeout.as_millis()
                )));
            }
        }
        Ok(())
    }

    fn statement(&mut self, statement: &Statement) -> Result<Flow, EvaluationError> {
        self.tick()?;
        match statement {
            Statement::Expr(expr) => Ok(Flow::Next(Some(self.eval(expr)?))),
            Statement::Assign { name, value } => {
                let value = self.eval(value)?;
                self.locals.insert(name.clone(), value);
                Ok(Flow::Next(None))
            }
            Statement::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Statement::Raise(expr) => {
                let value = self.eval(expr)?;
                Err(EvaluationError::runtime(value.to_string()))
            }
            Statement::Pass => Ok(Flow::Next(None)),
        }
    }

    fn eval(&mut self, expr: &Expression) -> Result<Value, EvaluationError> {
        self.tick()?;
        self.depth += 1;
        if self.depth > self.limits.max_depth {
            return Err(EvaluationError::budget(format!(
                "depth limit of {} exceeded",
                self.limits.max_depth
            )));
        }
        let result = self.eval_inner(expr);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expression) -> Result<Value, EvaluationError> {
        match expr {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::Name(name) => self.lookup(name),
            Expression::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                self.produce(Value::List(values))
            }
            Expression::Dict(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(EvaluationError::runtime(format!(
                                "dict keys must be str, not '{}'",
                                other.type_name()
                            )))
                        }
                    };
                    let value = self.eval(value)?;
                    map.insert(key, value);
                }
                self.produce(Value::Map(map))
            }
            Expression::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expression::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let value = binary(*op, left, right)?;
                self.produce(value)
            }
            Expression::Compare { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                compare(*op, &left, &right).map(Value::Bool)
            }
            Expression::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expression::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expression::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expression::Attribute { object, name } => {
                let object = self.eval(object)?;
                attribute(object, name)
            }
            Expression::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                subscript(object, &index)
            }
            Expression::Call { function, args } => self.call(function, args),
        }
    }

    fn lookup(&mut self, name: &str) -> Result<Value, EvaluationError> {
        let context = self.context;
        if let Some(value) = self.locals.get(name).or_else(|| context.get(name)) {
            allocate(&mut self.allocated, value.size())?;
            return Ok(value.clone());
        }
        if Helper::lookup(name).is_some() {
            return Err(EvaluationError::runtime(format!(
                "helper '{}' can only be called",
                name
            )));
        }
        Err(EvaluationError::reference(name))
    }

    fn call(&mut self, function: &str, args: &[Expression]) -> Result<Value, EvaluationError> {
        let Some(helper) = Helper::lookup(function) else {
            let value = self.lookup(function)?;
            return Err(EvaluationError::runtime(format!(
                "'{}' object is not callable",
                value.type_name()
            )));
        };
        let args = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let value = helper.call(args, &mut self.effects)?;
        self.produce(value)
    }
}

/// Charge `size` elements against the allocation budget
fn allocate(allocated: &mut usize, size: usize) -> Result<(), EvaluationError> {
    *allocated = allocated.saturating_add(size);
    if *allocated > MAX_ALLOCATED {
        return Err(EvaluationError::budget(format!(
            "allocation limit of {} elements exceeded",
            MAX_ALLOCATED
        )));
    }
    Ok(())
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::None => Value::None,
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::Str(s.clone()),
    }
}

/// Numeric operand; bools take part in arithmetic as 0 and 1
#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Bool(b) => Some(Number::Int(*b as i64)),
        Value::Float(f) => Some(Number::Float(*f)),
        _ => None,
    }
}

fn overflow() -> EvaluationError {
    EvaluationError::runtime("integer overflow")
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, EvaluationError> {
    match (op, number(&value)) {
        (UnaryOp::Neg, Some(Number::Int(i))) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        (UnaryOp::Neg, Some(Number::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Number::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Number::Float(f))) => Ok(Value::Float(f)),
        (_, None) => Err(EvaluationError::runtime(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            value.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvaluationError> {
    match (op, &left, &right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            return Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (number(&left), number(&right)) else {
        return Err(EvaluationError::runtime(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        )));
    };

    match (a, b) {
        (Number::Int(a), Number::Int(b)) => int_binary(op, a, b),
        (a, b) => float_binary(op, to_f64(a), to_f64(b)),
    }
}

fn to_f64(n: Number) -> f64 {
    match n {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    }
}

fn int_binary(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinaryOp::Div => {
            if b == 0 {
                return Err(EvaluationError::runtime("division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(EvaluationError::runtime("integer division by zero"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let floored = if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q };
            Ok(Value::Int(floored))
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvaluationError::runtime("integer modulo by zero"));
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            let floored = if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r };
            Ok(Value::Int(floored))
        }
    }
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvaluationError> {
    let zero_check = |what: &str| {
        if b == 0.0 {
            Err(EvaluationError::runtime(format!("float {} by zero", what)))
        } else {
            Ok(())
        }
    };
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            zero_check("division")?;
            a / b
        }
        BinaryOp::FloorDiv => {
            zero_check("floor division")?;
            (a / b).floor()
        }
        BinaryOp::Mod => {
            zero_check("modulo")?;
            a - b * (a / b).floor()
        }
    };
    Ok(Value::Float(value))
}

/// Equality with numeric cross-type comparison (`1 == 1.0 == True`)
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => match (number(left), number(right)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => a == b,
            (Some(a), Some(b)) => to_f64(a) == to_f64(b),
            _ => false,
        },
    }
}

fn ordering(op: CompareOp, left: &Value, right: &Value) -> Result<Ordering, EvaluationError> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (number(left), number(right)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => Some(a.cmp(&b)),
            (Some(a), Some(b)) => to_f64(a).partial_cmp(&to_f64(b)),
            _ => {
                return Err(EvaluationError::runtime(format!(
                    "'{}' not supported between instances of '{}' and '{}'",
                    op,
                    left.type_name(),
                    right.type_name()
                )))
            }
        },
    };
    // NaN compares false on every side
    Ok(ordering.unwrap_or(Ordering::Equal))
}

fn contains(container: &Value, item: &Value) -> Result<bool, EvaluationError> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(EvaluationError::runtime(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Map(map) => Ok(item.as_str().is_some_and(|key| map.contains_key(key))),
        other => Err(EvaluationError::runtime(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvaluationError> {
    let is_nan = |v: &Value| matches!(v, Value::Float(f) if f.is_nan());
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::NotEq => Ok(!values_equal(left, right)),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            let ord = ordering(op, left, right)?;
            if is_nan(left) || is_nan(right) {
                return Ok(false);
            }
            Ok(match op {
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
    }
}

fn attribute(object: Value, name: &str) -> Result<Value, EvaluationError> {
    match object {
        Value::Map(mut map) => map.remove(name).ok_or_else(|| {
            EvaluationError::runtime(format!("'dict' object has no attribute '{}'", name))
        }),
        other => Err(EvaluationError::runtime(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            name
        ))),
    }
}

fn subscript(object: Value, index: &Value) -> Result<Value, EvaluationError> {
    match (object, index) {
        (Value::List(mut items), Value::Int(i)) => {
            let idx = resolve_index(*i, items.len())
                .ok_or_else(|| EvaluationError::runtime("list index out of range"))?;
            Ok(items.swap_remove(idx))
        }
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = resolve_index(*i, chars.len())
                .ok_or_else(|| EvaluationError::runtime("string index out of range"))?;
            Ok(Value::Str(chars[idx].to_string()))
        }
        (Value::Map(mut map), Value::Str(key)) => map
            .remove(key)
            .ok_or_else(|| EvaluationError::runtime(format!("KeyError: '{}'", key))),
        (object, index) => Err(EvaluationError::runtime(format!(
            "'{}' object cannot be indexed by '{}'",
            object.type_name(),
            index.type_name()
        ))),
    }
}

/// Python-style index resolution, negative counting from the end
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if index < 0 { index + len } else { index };
    if (0..len).contains(&resolved) {
        usize::try_from(resolved).ok()
    } else {
        None
    }
}
