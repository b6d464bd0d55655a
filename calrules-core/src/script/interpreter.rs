//! Tree-walking interpreter for parsed rule programs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use super::ast::{AssignOp, BinaryOp, Block, Callee, Expr, Function, LogicalOp, PathSegment, Place, Program, Stmt, UnaryOp};
use super::builtins;
use super::value::Value;

/// Resource limits for a single run.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Execution stops with [`Fault::Timeout`] once this instant passes.
    /// `None` runs without a deadline.
    pub deadline: Option<Instant>,
    pub max_call_depth: usize,
    /// Maximum number of statements and expressions being evaluated at once,
    /// across all active calls.
    pub max_nesting: usize,
    /// Maximum length of any string (in bytes) or array the program builds.
    pub max_len: usize,
}

impl Limits {
    pub const DEFAULT_CALL_DEPTH: usize = 64;
    pub const DEFAULT_MAX_NESTING: usize = 512;
    pub const DEFAULT_MAX_LEN: usize = 1 << 20;

    /// A timeout too large to represent as an instant means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::until(Instant::now().checked_add(timeout))
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self::until(Some(deadline))
    }

    pub fn until(deadline: Option<Instant>) -> Self {
        Limits {
            deadline,
            max_call_depth: Self::DEFAULT_CALL_DEPTH,
            max_nesting: Self::DEFAULT_MAX_NESTING,
            max_len: Self::DEFAULT_MAX_LEN,
        }
    }
}

/// Why a run did not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// The program threw, either explicitly or through a runtime error.
    Throw(String),
    /// The deadline passed before the program finished.
    Timeout,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fault::Throw(message) => f.write_str(message),
            Fault::Timeout => f.write_str("execution timed out"),
        }
    }
}

/// Non-local exits while evaluating an expression.
enum Signal {
    Throw(String),
    Timeout,
    /// A `?.` link met null; caught by the enclosing [`Expr::OptionalChain`].
    ShortCircuit,
}

type Eval<T> = Result<T, Signal>;

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

enum Key {
    Field(String),
    Index(Value),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, "'{}'", name),
            Key::Index(v) => write!(f, "[{}]", v),
        }
    }
}

fn throw<T>(message: impl Into<String>) -> Eval<T> {
    Err(Signal::Throw(message.into()))
}

type Scope = HashMap<String, Value>;

struct Interpreter<'p> {
    program: &'p Program,
    limits: Limits,
    /// One entry per active call; frame 0 is the top level and its first
    /// scope holds the globals.
    frames: Vec<Vec<Scope>>,
    nesting: usize,
}

/// Run a program against the given globals.
///
/// The result is the value of a top-level `return`, or else the value of the
/// last top-level expression statement, or null.
pub fn run(program: &Program, globals: Vec<(String, Value)>, limits: Limits) -> Result<Value, Fault> {
    let mut interpreter = Interpreter {
        program,
        limits,
        frames: vec![vec![globals.into_iter().collect()]],
        nesting: 0,
    };

    interpreter.run_top_level().map_err(|signal| match signal {
        Signal::Throw(message) => Fault::Throw(message),
        Signal::Timeout => Fault::Timeout,
        // Every `?.` sits inside an OptionalChain, so this cannot escape.
        Signal::ShortCircuit => Fault::Throw("unexpected optional chain".into()),
    })
}

impl<'p> Interpreter<'p> {
    fn run_top_level(&mut self) -> Eval<Value> {
        let mut last = Value::Null;
        self.push_scope();
        for stmt in &self.program.body {
            match stmt {
                Stmt::Expr(expr) => {
                    self.tick()?;
                    last = self.eval(expr)?;
                }
                _ => match self.exec(stmt)? {
                    Flow::Return(value) => return Ok(value),
                    Flow::Normal | Flow::Break | Flow::Continue => {}
                },
            }
        }
        Ok(last)
    }

    fn tick(&self) -> Eval<()> {
        match self.limits.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Signal::Timeout),
            _ => Ok(()),
        }
    }

    /// Run `step` one nesting level deeper.
    fn nested<T>(&mut self, step: impl FnOnce(&mut Self) -> Eval<T>) -> Eval<T> {
        if self.nesting >= self.limits.max_nesting {
            return throw("RangeError: maximum nesting depth exceeded");
        }
        self.nesting += 1;
        let result = step(self);
        self.nesting -= 1;
        result
    }

    fn check_depth(&self, value: &Value, below: usize) -> Eval<()> {
        if value.deeper_than(Value::MAX_DEPTH.saturating_sub(below)) {
            throw(format!("RangeError: values may nest at most {} levels deep", Value::MAX_DEPTH))
        } else {
            Ok(())
        }
    }

    fn check_len(&self, len: usize) -> Eval<()> {
        if len > self.limits.max_len {
            throw(format!("RangeError: value exceeds the maximum size of {}", self.limits.max_len))
        } else {
            Ok(())
        }
    }

    // Scopes

    fn frame(&mut self) -> &mut Vec<Scope> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn push_scope(&mut self) {
        self.frame().push(Scope::new());
    }

    fn pop_scope(&mut self) {
        self.frame().pop();
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.frame().last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// Find the (frame, scope) holding `name`: the current frame innermost
    /// first, then the globals.
    fn locate(&self, name: &str) -> Option<(usize, usize)> {
        let current = self.frames.len() - 1;
        let found = self.frames[current]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, scope)| scope.contains_key(name))
            .map(|(i, _)| (current, i));

        found.or_else(|| {
            let globals = self.frames.first()?.first()?;
            globals.contains_key(name).then_some((0, 0))
        })
    }

    fn lookup(&self, name: &str) -> Eval<Value> {
        match self.locate(name) {
            Some((f, s)) => Ok(self.frames[f][s].get(name).cloned().unwrap_or(Value::Null)),
            None => throw(format!("ReferenceError: {} is not defined", name)),
        }
    }

    // Statements

    fn exec_block(&mut self, block: &Block) -> Eval<Flow> {
        self.push_scope();
        let flow = self.exec_stmts(block);
        self.pop_scope();
        flow
    }

    fn exec_stmts(&mut self, stmts: &[Stmt]) -> Eval<Flow> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Eval<Flow> {
        self.nested(|this| this.exec_stmt(stmt))
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Eval<Flow> {
        self.tick()?;
        match stmt {
            Stmt::Let { name, init } => {
                let value = match init {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                self.declare(name, value);
            }
            Stmt::Assign { target, op, value } => self.assign(target, *op, value)?,
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Block(block) => return self.exec_block(block),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond)?.is_truthy() {
                    return self.exec_block(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.exec_block(else_branch);
                }
            }
            Stmt::While { cond, body } => loop {
                self.tick()?;
                if !self.eval(cond)?.is_truthy() {
                    break;
                }
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                }
            },
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr)?;
                return throw(value.to_string());
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, place: &Place, op: AssignOp, value: &Expr) -> Eval<()> {
        let mut keys = Vec::with_capacity(place.path.len());
        for segment in &place.path {
            keys.push(match segment {
                PathSegment::Field(name) => Key::Field(name.clone()),
                PathSegment::Index(expr) => Key::Index(self.eval(expr)?),
            });
        }

        let rhs = self.eval(value)?;
        self.check_depth(&rhs, keys.len())?;
        let new_value = match op {
            AssignOp::Set => rhs,
            AssignOp::Add | AssignOp::Sub => {
                let mut current = self.lookup(&place.root)?;
                for key in &keys {
                    current = match key {
                        Key::Field(name) => builtins::get_property(&current, name),
                        Key::Index(index) => builtins::get_index(&current, index),
                    }
                    .map_err(Signal::Throw)?;
                }
                let bop = if op == AssignOp::Add { BinaryOp::Add } else { BinaryOp::Sub };
                self.binary(bop, current, rhs)?
            }
        };

        let Some((f, s)) = self.locate(&place.root) else {
            return throw(format!("ReferenceError: {} is not defined", place.root));
        };
        let max_len = self.limits.max_len;
        match self.frames[f][s].get_mut(&place.root) {
            Some(slot) => write_path(slot, &keys, new_value, max_len),
            None => throw(format!("ReferenceError: {} is not defined", place.root)),
        }
    }

    // Expressions

    fn eval(&mut self, expr: &Expr) -> Eval<Value> {
        self.nested(|this| this.eval_expr(expr))
    }

    fn eval_expr(&mut self, expr: &Expr) -> Eval<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self.lookup(name),
            Expr::Array(items) => {
                self.check_len(items.len())?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.eval(item)?;
                    self.check_depth(&value, 1)?;
                    out.push(value);
                }
                Ok(Value::Array(out))
            }
            Expr::Object(fields) => {
                let mut map = BTreeMap::new();
                for (key, value) in fields {
                    let value = self.eval(value)?;
                    self.check_depth(&value, 1)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Object(map))
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let object = self.eval(object)?;
                if *optional && object.is_null() {
                    return Err(Signal::ShortCircuit);
                }
                builtins::get_property(&object, property).map_err(Signal::Throw)
            }
            Expr::Index {
                object,
                index,
                optional,
            } => {
                let object = self.eval(object)?;
                if *optional && object.is_null() {
                    return Err(Signal::ShortCircuit);
                }
                let index = self.eval(index)?;
                builtins::get_index(&object, &index).map_err(Signal::Throw)
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::OptionalChain(inner) => match self.eval(inner) {
                Err(Signal::ShortCircuit) => Ok(Value::Null),
                other => other,
            },
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Neg, other) => throw(format!("TypeError: cannot negate {}", other.type_name())),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                self.binary(*op, lhs, rhs)
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let take_lhs = match op {
                    LogicalOp::And => !lhs.is_truthy(),
                    LogicalOp::Or => lhs.is_truthy(),
                    LogicalOp::Coalesce => !lhs.is_null(),
                };
                if take_lhs { Ok(lhs) } else { self.eval(rhs) }
            }
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }
        }
    }

    fn call(&mut self, callee: &Callee, args: &[Expr]) -> Eval<Value> {
        match callee {
            Callee::Function(name) => {
                let values = self.eval_args(args)?;
                match self.program.functions.get(name) {
                    Some(function) => self.call_user(function, values),
                    None => builtins::call_function(name, &values, self.limits.max_len).map_err(Signal::Throw),
                }
            }
            Callee::Method {
                receiver,
                name,
                optional,
            } => {
                let receiver = self.eval(receiver)?;
                if *optional && receiver.is_null() {
                    return Err(Signal::ShortCircuit);
                }
                let values = self.eval_args(args)?;
                builtins::call_method(&receiver, name, &values, self.limits.max_len).map_err(Signal::Throw)
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Eval<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    fn call_user(&mut self, function: &Function, args: Vec<Value>) -> Eval<Value> {
        self.tick()?;
        if self.frames.len() > self.limits.max_call_depth {
            return throw("RangeError: maximum call depth exceeded");
        }

        let mut args = args.into_iter();
        let scope: Scope = function
            .params
            .iter()
            .map(|param| (param.clone(), args.next().unwrap_or(Value::Null)))
            .collect();

        self.frames.push(vec![scope]);
        let flow = self.exec_stmts(&function.body);
        self.frames.pop();

        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }

    fn binary(&self, op: BinaryOp, lhs: Value, rhs: Value) -> Eval<Value> {
        use Value::{Number, Str};

        match op {
            BinaryOp::Add => match (lhs, rhs) {
                (Number(a), Number(b)) => Ok(Number(a + b)),
                (lhs @ Str(_), rhs) | (lhs, rhs @ Str(_)) => {
                    let mut joined = builtins::CappedString::new(self.limits.max_len);
                    joined.push_display(&lhs).map_err(Signal::Throw)?;
                    joined.push_display(&rhs).map_err(Signal::Throw)?;
                    Ok(Str(joined.into_string()))
                }
                (lhs, rhs) => throw(format!(
                    "TypeError: cannot add {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                )),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let (a, b) = match (&lhs, &rhs) {
                    (Number(a), Number(b)) => (*a, *b),
                    _ => {
                        return throw(format!(
                            "TypeError: arithmetic on {} and {}",
                            lhs.type_name(),
                            rhs.type_name()
                        ));
                    }
                };
                if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0.0 {
                    return throw("RangeError: division by zero");
                }
                Ok(Number(match op {
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    _ => a % b,
                }))
            }
            BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinaryOp::NotEq => Ok(Value::Bool(lhs != rhs)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = match (&lhs, &rhs) {
                    (Number(a), Number(b)) => a.partial_cmp(b),
                    (Str(a), Str(b)) => Some(a.cmp(b)),
                    _ => {
                        return throw(format!(
                            "TypeError: cannot compare {} with {}",
                            lhs.type_name(),
                            rhs.type_name()
                        ));
                    }
                };
                let Some(ordering) = ordering else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
        }
    }
}

fn write_path(target: &mut Value, keys: &[Key], value: Value, max_len: usize) -> Eval<()> {
    let Some((first, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };

    match (target, first) {
        (Value::Object(map), Key::Field(name)) | (Value::Object(map), Key::Index(Value::Str(name))) => {
            if rest.is_empty() {
                map.insert(name.clone(), value);
                return Ok(());
            }
            match map.get_mut(name.as_str()) {
                Some(child) => write_path(child, rest, value, max_len),
                None => throw(format!("TypeError: cannot set property of undefined '{}'", name)),
            }
        }
        (Value::Array(items), Key::Index(Value::Number(n))) => {
            let Some(index) = builtins::as_index(*n) else {
                return throw(format!("RangeError: invalid array index {}", n));
            };
            if index == items.len() && rest.is_empty() {
                if items.len() >= max_len {
                    return throw(format!("RangeError: value exceeds the maximum size of {}", max_len));
                }
                items.push(value);
                return Ok(());
            }
            match items.get_mut(index) {
                Some(slot) => write_path(slot, rest, value, max_len),
                None => throw(format!("RangeError: array index {} out of bounds", index)),
            }
        }
        (target, key) => throw(format!("TypeError: cannot set {} on {}", key, target.type_name())),
    }
}
