//! Tree-walking evaluator.

use std::cmp::Ordering;
use std::collections::HashMap;

use indexmap::IndexMap;

use super::ast::{BinOp, CmpOp, CompClause, Const, Expr, Stmt, StmtKind, Target, UnaryOp};
use super::builtins::{self, Args, Builtin};
use super::facilities::{self, Facility, RegexCache};
use super::value::{self, Value};
use super::{ScriptError, ScriptLimits, ScriptResult};

enum Flow {
    Normal,
    Break,
    Continue,
}

pub struct Interpreter {
    limits: ScriptLimits,
    globals: HashMap<String, Value>,
    regexes: RegexCache,
    steps: u64,
    line: usize,
}

impl Interpreter {
    pub fn new(limits: ScriptLimits) -> Self {
        let mut globals: HashMap<String, Value> = Facility::ALL
            .into_iter()
            .map(|f| (f.name().to_string(), Value::Facility(f)))
            .collect();
        globals.insert("answer".to_string(), Value::None);
        Self {
            limits,
            globals,
            regexes: RegexCache::default(),
            steps: 0,
            line: 0,
        }
    }

    /// Line of the statement being executed, or of the last one run.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn answer(&self) -> Value {
        self.globals.get("answer").cloned().unwrap_or(Value::None)
    }

    pub fn run(&mut self, program: &[Stmt]) -> ScriptResult<()> {
        match self.exec_block(program)? {
            Flow::Normal => Ok(()),
            Flow::Break => Err(ScriptError::runtime("'break' outside loop")),
            Flow::Continue => Err(ScriptError::runtime("'continue' not properly in loop")),
        }
    }

    fn tick(&mut self) -> ScriptResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(ScriptError::StepBudget);
        }
        Ok(())
    }

    fn exec_block(&mut self, body: &[Stmt]) -> ScriptResult<Flow> {
        for stmt in body {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> ScriptResult<Flow> {
        self.line = stmt.line;
        self.tick()?;

        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::For { target, iter, body } => {
                let items = value::iterate(&self.eval(iter)?)?;
                for item in items {
                    self.line = stmt.line;
                    self.tick()?;
                    self.assign(target, item)?;
                    if let Flow::Break = self.exec_block(body)? {
                        break;
                    }
                }
            }
            StmtKind::While { cond, body } => loop {
                self.line = stmt.line;
                self.tick()?;
                if !self.eval(cond)?.truthy() {
                    break;
                }
                if let Flow::Break = self.exec_block(body)? {
                    break;
                }
            },
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Target, bound: Value) -> ScriptResult<()> {
        match target {
            Target::Name(name) => {
                self.globals.insert(name.clone(), bound);
            }
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                value::set_item(&object, &index, bound)?;
            }
            Target::Unpack(targets) => {
                let items = value::iterate(&bound)?;
                match items.len().cmp(&targets.len()) {
                    Ordering::Less => {
                        return Err(ScriptError::runtime(format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        )))
                    }
                    Ordering::Greater => {
                        return Err(ScriptError::runtime(format!(
                            "too many values to unpack (expected {})",
                            targets.len()
                        )))
                    }
                    Ordering::Equal => {}
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
        }
        Ok(())
    }

    /// `+=` on a list extends it in place; every other operator rebinds.
    fn aug_assign(&mut self, target: &Target, op: BinOp, operand: &Expr) -> ScriptResult<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(operand)?;
                let updated = self.combine(op, current, &rhs)?;
                self.globals.insert(name.clone(), updated);
            }
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let current = value::get_item(&object, &index)?;
                let rhs = self.eval(operand)?;
                let updated = self.combine(op, current, &rhs)?;
                value::set_item(&object, &index, updated)?;
            }
            Target::Unpack(_) => {
                return Err(ScriptError::runtime(
                    "illegal expression for augmented assignment",
                ))
            }
        }
        Ok(())
    }

    fn combine(&self, op: BinOp, current: Value, rhs: &Value) -> ScriptResult<Value> {
        if let (BinOp::Add, Value::List(items)) = (op, &current) {
            let items = items.clone();
            let more = value::iterate(rhs)?;
            let mut list = items.borrow_mut();
            if list.len() + more.len() > self.limits.max_collection_len {
                return Err(ScriptError::runtime(format!(
                    "result would hold {} elements, the limit is {}",
                    list.len() + more.len(),
                    self.limits.max_collection_len
                )));
            }
            list.extend(more);
            drop(list);
            return Ok(Value::List(items));
        }
        value::binary(op, &current, rhs, &self.limits)
    }

    fn lookup(&self, name: &str) -> ScriptResult<Value> {
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        Builtin::from_name(name)
            .map(Value::Builtin)
            .ok_or_else(|| ScriptError::runtime(format!("name '{name}' is not defined")))
    }

    fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Const(c) => Ok(match c {
                Const::None => Value::None,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(i) => Value::Int(*i),
                Const::Float(f) => Value::Float(*f),
                Const::Str(s) => Value::from(s.as_str()),
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|e| self.eval(e))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            Expr::Dict(pairs) => {
                let mut entries = IndexMap::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = self.eval(k)?.to_key()?;
                    entries.insert(key, self.eval(v)?);
                }
                Ok(Value::dict(entries))
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Neg => value::unary_neg(&v),
                    UnaryOp::Pos => value::unary_pos(&v),
                }
            }
            Expr::Binary(left, op, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                value::binary(*op, &l, &r, &self.limits)
            }
            Expr::Compare(first, links) => {
                let mut left = self.eval(first)?;
                for (op, operand) in links {
                    let right = self.eval(operand)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(a, b) => {
                let l = self.eval(a)?;
                if !l.truthy() {
                    return Ok(l);
                }
                self.eval(b)
            }
            Expr::Or(a, b) => {
                let l = self.eval(a)?;
                if l.truthy() {
                    return Ok(l);
                }
                self.eval(b)
            }
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand)?.truthy())),
            Expr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { func, args, kwargs } => self.call(func, args, kwargs),
            Expr::Attribute { object, name } => match self.eval(object)? {
                Value::Facility(f) => f.attribute(name),
                other => Err(ScriptError::runtime(format!(
                    "'{}' object attribute '{name}' can only be called",
                    other.type_name()
                ))),
            },
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                value::get_item(&object, &index)
            }
            Expr::Slice {
                object,
                lower,
                upper,
                step,
            } => {
                let object = self.eval(object)?;
                let lower = self.eval_opt(lower.as_deref())?;
                let upper = self.eval_opt(upper.as_deref())?;
                let step = self.eval_opt(step.as_deref())?;
                value::slice(&object, lower.as_ref(), upper.as_ref(), step.as_ref())
            }
            Expr::ListComp { element, clauses } => {
                let mut out = Vec::new();
                self.scoped(clauses, |interp| {
                    interp.comprehend(clauses, &mut |interp: &mut Interpreter| {
                        let item = interp.eval(element)?;
                        out.push(item);
                        interp.check_len(out.len())
                    })
                })?;
                Ok(Value::list(out))
            }
            Expr::DictComp {
                key,
                value,
                clauses,
            } => {
                let mut out = IndexMap::new();
                self.scoped(clauses, |interp| {
                    interp.comprehend(clauses, &mut |interp: &mut Interpreter| {
                        let k = interp.eval(key)?.to_key()?;
                        let v = interp.eval(value)?;
                        out.insert(k, v);
                        interp.check_len(out.len())
                    })
                })?;
                Ok(Value::dict(out))
            }
        }
    }

    fn eval_opt(&mut self, expr: Option<&Expr>) -> ScriptResult<Option<Value>> {
        expr.map(|e| self.eval(e)).transpose()
    }

    fn check_len(&self, len: usize) -> ScriptResult<()> {
        if len > self.limits.max_collection_len {
            return Err(ScriptError::runtime(format!(
                "result would hold {len} elements, the limit is {}",
                self.limits.max_collection_len
            )));
        }
        Ok(())
    }

    fn call(&mut self, func: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> ScriptResult<Value> {
        // Method calls dispatch on the receiver without materializing a
        // bound method.
        if let Expr::Attribute { object, name } = func {
            let receiver = self.eval(object)?;
            if let Value::Facility(f) = receiver {
                let callee = f.attribute(name)?;
                let (positional, keywords) = self.eval_args(args, kwargs)?;
                return self.invoke(callee, positional, keywords);
            }
            let (positional, keywords) = self.eval_args(args, kwargs)?;
            let label = format!("{}.{name}", receiver.type_name());
            return builtins::call_method(
                &receiver,
                name,
                Args::new(label, positional, keywords),
                &self.limits,
            );
        }

        let callee = self.eval(func)?;
        let (positional, keywords) = self.eval_args(args, kwargs)?;
        self.invoke(callee, positional, keywords)
    }

    fn eval_args(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> ScriptResult<(Vec<Value>, Vec<(String, Value)>)> {
        let positional = args
            .iter()
            .map(|e| self.eval(e))
            .collect::<ScriptResult<Vec<_>>>()?;
        let keywords = kwargs
            .iter()
            .map(|(k, e)| -> ScriptResult<(String, Value)> { Ok((k.clone(), self.eval(e)?)) })
            .collect::<ScriptResult<Vec<_>>>()?;
        Ok((positional, keywords))
    }

    fn invoke(
        &mut self,
        callee: Value,
        positional: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        match callee {
            Value::Builtin(b) => builtins::call(b, Args::new(b.name(), positional, keywords), &self.limits),
            Value::FacilityFn(f) => facilities::call(
                f,
                Args::new(f.name(), positional, keywords),
                &self.limits,
                &mut self.regexes,
            ),
            other => Err(ScriptError::runtime(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Run `body` with the comprehension's loop variables restored
    /// afterwards, whether or not it succeeds.
    fn scoped<T>(
        &mut self,
        clauses: &[CompClause],
        body: impl FnOnce(&mut Self) -> ScriptResult<T>,
    ) -> ScriptResult<T> {
        let saved: Vec<(String, Option<Value>)> = clauses
            .iter()
            .filter_map(|c| match c {
                CompClause::For { target, .. } => Some(target.names()),
                CompClause::If(_) => None,
            })
            .flatten()
            .map(|name| (name.to_string(), self.globals.get(name).cloned()))
            .collect();

        let result = body(self);

        for (name, previous) in saved.into_iter().rev() {
            match previous {
                Some(v) => {
                    self.globals.insert(name, v);
                }
                None => {
                    self.globals.remove(&name);
                }
            }
        }
        result
    }

    fn comprehend(
        &mut self,
        clauses: &[CompClause],
        emit: &mut dyn FnMut(&mut Self) -> ScriptResult<()>,
    ) -> ScriptResult<()> {
        match clauses.split_first() {
            None => {
                self.tick()?;
                emit(self)
            }
            Some((CompClause::For { target, iter }, rest)) => {
                for item in value::iterate(&self.eval(iter)?)? {
                    self.assign(target, item)?;
                    self.comprehend(rest, emit)?;
                }
                Ok(())
            }
            Some((CompClause::If(cond), rest)) => {
                if self.eval(cond)?.truthy() {
                    self.comprehend(rest, emit)
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> ScriptResult<bool> {
    let ordered = |symbol: &str, accept: &[Ordering]| -> ScriptResult<bool> {
        Ok(value::compare(left, right, symbol)?.is_some_and(|o| accept.contains(&o)))
    };
    match op {
        CmpOp::Eq => Ok(value::equals(left, right)),
        CmpOp::Ne => Ok(!value::equals(left, right)),
        CmpOp::Lt => ordered("<", &[Ordering::Less]),
        CmpOp::Le => ordered("<=", &[Ordering::Less, Ordering::Equal]),
        CmpOp::Gt => ordered(">", &[Ordering::Greater]),
        CmpOp::Ge => ordered(">=", &[Ordering::Greater, Ordering::Equal]),
        CmpOp::In => value::contains(right, left),
        CmpOp::NotIn => Ok(!value::contains(right, left)?),
    }
}
