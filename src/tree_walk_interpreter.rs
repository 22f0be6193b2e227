mod callable;
mod scope;

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use crate::ast::{Block, Expression, InfixOperator, PrefixOperator, Program, Statement};

pub use self::callable::{Builtin, Callable, CallableFunction};
use self::{callable::BUILTINS, scope::Scope};

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Closure(Rc<Callable>),
    Null,
}

pub const TRUE: Value = Value::Boolean(true);
pub const FALSE: Value = Value::Boolean(false);
pub const NULL: Value = Value::Null;

/// Nested calls allowed before evaluation fails instead of exhausting the
/// native stack.
pub const MAX_CALL_DEPTH: usize = 256;

impl Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            _ => true,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Integer(_) => ValueType::Integer,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Closure(callable) => match callable.as_ref() {
                Callable::Function(_) => ValueType::Function,
                Callable::Builtin(_) => ValueType::Builtin,
            },
            Value::Null => ValueType::Null,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        if value {
            TRUE
        } else {
            FALSE
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Closure(c) => write!(f, "{}", c),
            Value::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Boolean,
    Function,
    Builtin,
    Null,
}

impl Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::Integer => write!(f, "INTEGER"),
            ValueType::Boolean => write!(f, "BOOLEAN"),
            ValueType::Function => write!(f, "FUNCTION"),
            ValueType::Builtin => write!(f, "BUILTIN"),
            ValueType::Null => write!(f, "NULL"),
        }
    }
}

#[derive(Clone)]
pub struct Interpreter {
    scope: Rc<RefCell<Scope>>,
    stdout: Rc<RefCell<dyn std::io::Write>>,
    depth: usize,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("scope", &self.scope)
            .field("depth", &self.depth)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{kind} (in `{current_statement}`)")]
    Execution {
        kind: ExecutionErrorKind,
        current_statement: Statement,
    },
}

impl ExecutionError {
    pub fn kind(&self) -> &ExecutionErrorKind {
        match self {
            ExecutionError::Execution { kind, .. } => kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("identifier not found: {0}")]
    UnknownIdentifier(String),
    #[error("type mismatch: {0} {1} {2}")]
    TypeMismatch(ValueType, InfixOperator, ValueType),
    #[error("unknown operator: {0}{1}")]
    UnknownPrefixOperator(PrefixOperator, ValueType),
    #[error("unknown operator: {0} {1} {2}")]
    UnknownInfixOperator(ValueType, InfixOperator, ValueType),
    #[error("integer overflow: {0} {1} {2}")]
    IntegerOverflow(i64, InfixOperator, i64),
    #[error("integer overflow: -{0}")]
    NegateOverflow(i64),
    #[error("division by zero: {0} / 0")]
    DivisionByZero(i64),
    #[error("not a function: {0}")]
    NotAFunction(ValueType),
    #[error("wrong number of arguments: {0} called with {1} arguments, expected {2}")]
    WrongArity(String, usize, usize),
    #[error("maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),
}

/// Non-local exits while walking the tree. `Return` unwinds to the nearest
/// function call, or to the program when raised at the top level.
enum ControlFlow {
    Return(Value),
    Error(ExecutionErrorKind),
}

impl From<ExecutionErrorKind> for ControlFlow {
    fn from(kind: ExecutionErrorKind) -> Self {
        ControlFlow::Error(kind)
    }
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn std::io::Write>>) -> Self {
        let scope = Scope::boxed(None);

        for builtin in BUILTINS {
            scope.borrow_mut().declare(
                builtin.name.to_string(),
                Value::Closure(Rc::new(Callable::Builtin(*builtin))),
            );
        }

        Self {
            scope,
            stdout,
            depth: 0,
        }
    }

    /// Evaluates every statement in order and yields the value of the last
    /// one. Bindings made by `let` stay visible to later calls.
    pub fn interpret(&mut self, program: &Program) -> Result<Option<Value>, ExecutionError> {
        let mut result = None;

        for stmt in program.0.iter() {
            match self.execute(stmt) {
                Ok(value) => result = value,
                Err(ControlFlow::Return(value)) => return Ok(Some(value)),
                Err(ControlFlow::Error(kind)) => {
                    return Err(ExecutionError::Execution {
                        kind,
                        current_statement: stmt.clone(),
                    })
                }
            }
        }

        Ok(result)
    }

    fn execute(&mut self, stmt: &Statement) -> Result<Option<Value>, ControlFlow> {
        let result = match stmt {
            Statement::Let { name, value, .. } => {
                let value = self.evaluate(value)?;
                self.scope.borrow_mut().declare(name.name.clone(), value);
                None
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => NULL,
                };
                return Err(ControlFlow::Return(value));
            }
            Statement::Expression { expression, .. } => Some(self.evaluate(expression)?),
        };

        Ok(result)
    }

    fn execute_block(&mut self, block: &Block) -> Result<Option<Value>, ControlFlow> {
        let mut result = None;
        for statement in block.statements.iter() {
            result = self.execute(statement)?;
        }
        Ok(result)
    }

    fn execute_in_scope<T>(
        &mut self,
        scope: Rc<RefCell<Scope>>,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let prev = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = prev;
        result
    }

    fn evaluate(&mut self, expression: &Expression) -> Result<Value, ControlFlow> {
        let value = match expression {
            Expression::Identifier(identifier) => self
                .scope
                .borrow()
                .get(&identifier.name)
                .ok_or_else(|| ExecutionErrorKind::UnknownIdentifier(identifier.name.clone()))?,
            Expression::Integer { value, .. } => Value::Integer(*value),
            Expression::Boolean { value, .. } => Value::from(*value),
            Expression::Prefix {
                operator, right, ..
            } => {
                let right = self.evaluate(right)?;
                prefix(*operator, right)?
            }
            Expression::Infix {
                left,
                operator,
                right,
                ..
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                infix(*operator, left, right)?
            }
            Expression::If {
                condition,
                consequence,
                alternative,
                ..
            } => {
                let branch = if self.evaluate(condition)?.is_truthy() {
                    Some(consequence)
                } else {
                    alternative.as_ref()
                };
                match branch {
                    Some(block) => self.execute_block(block)?.unwrap_or(NULL),
                    None => NULL,
                }
            }
            Expression::Function {
                parameters, body, ..
            } => Value::Closure(Rc::new(Callable::Function(CallableFunction {
                scope: self.scope.clone(),
                parameters: parameters.clone(),
                body: body.clone(),
            }))),
            Expression::Call {
                function,
                arguments,
                ..
            } => {
                let callable = match self.evaluate(function)? {
                    Value::Closure(callable) => callable,
                    value => {
                        return Err(ExecutionErrorKind::NotAFunction(value.value_type()).into())
                    }
                };

                if let Some(arity) = callable.arity() {
                    if arguments.len() != arity {
                        return Err(ExecutionErrorKind::WrongArity(
                            callable.to_string(),
                            arguments.len(),
                            arity,
                        )
                        .into());
                    }
                }

                let args = arguments
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;

                if self.depth >= MAX_CALL_DEPTH {
                    return Err(ExecutionErrorKind::CallDepthExceeded(MAX_CALL_DEPTH).into());
                }
                self.depth += 1;
                let result = callable.call(self, args);
                self.depth -= 1;
                result?
            }
        };

        Ok(value)
    }
}

fn prefix(operator: PrefixOperator, right: Value) -> Result<Value, ExecutionErrorKind> {
    match operator {
        PrefixOperator::Not => Ok(Value::from(!right.is_truthy())),
        PrefixOperator::Negate => match right {
            Value::Integer(n) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or(ExecutionErrorKind::NegateOverflow(n)),
            right => Err(ExecutionErrorKind::UnknownPrefixOperator(
                operator,
                right.value_type(),
            )),
        },
    }
}

fn infix(operator: InfixOperator, left: Value, right: Value) -> Result<Value, ExecutionErrorKind> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => integer_infix(operator, a, b),
        (left, right) if left.value_type() != right.value_type() => Err(
            ExecutionErrorKind::TypeMismatch(left.value_type(), operator, right.value_type()),
        ),
        (left, right) => match operator {
            InfixOperator::Equal => Ok(Value::from(left == right)),
            InfixOperator::NotEqual => Ok(Value::from(left != right)),
            _ => Err(ExecutionErrorKind::UnknownInfixOperator(
                left.value_type(),
                operator,
                right.value_type(),
            )),
        },
    }
}

fn integer_infix(operator: InfixOperator, a: i64, b: i64) -> Result<Value, ExecutionErrorKind> {
    let overflow = || ExecutionErrorKind::IntegerOverflow(a, operator, b);
    match operator {
        InfixOperator::Plus => a.checked_add(b).map(Value::Integer).ok_or_else(overflow),
        InfixOperator::Minus => a.checked_sub(b).map(Value::Integer).ok_or_else(overflow),
        InfixOperator::Multiply => a.checked_mul(b).map(Value::Integer).ok_or_else(overflow),
        InfixOperator::Divide => {
            if b == 0 {
                return Err(ExecutionErrorKind::DivisionByZero(a));
            }
            a.checked_div(b).map(Value::Integer).ok_or_else(overflow)
        }
        InfixOperator::LessThan => Ok(Value::from(a < b)),
        InfixOperator::GreaterThan => Ok(Value::from(a > b)),
        InfixOperator::Equal => Ok(Value::from(a == b)),
        InfixOperator::NotEqual => Ok(Value::from(a != b)),
    }
}
