use std::{cell::RefCell, fmt::Display, rc::Rc};

use crate::ast::{Block, Identifier};

use super::{scope::Scope, ControlFlow, ExecutionErrorKind, Interpreter, Value, NULL};

/// A function literal closed over the scope it was evaluated in.
#[derive(Clone)]
pub struct CallableFunction {
    pub scope: Rc<RefCell<Scope>>,
    pub parameters: Vec<Identifier>,
    pub body: Block,
}

impl std::fmt::Debug for CallableFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableFunction")
            .field("scope", &self.scope.as_ptr())
            .field("parameters", &self.parameters)
            .field("body", &self.body.to_string())
            .finish()
    }
}

impl CallableFunction {
    fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionErrorKind> {
        let scope = Scope::boxed(Some(self.scope.clone()));
        for (parameter, value) in self.parameters.iter().zip(args) {
            scope.borrow_mut().declare(parameter.name.clone(), value);
        }

        interpreter.execute_in_scope(scope, |interpreter| {
            match interpreter.execute_block(&self.body) {
                Ok(value) => Ok(value.unwrap_or(NULL)),
                Err(ControlFlow::Return(value)) => Ok(value),
                Err(ControlFlow::Error(kind)) => Err(kind),
            }
        })
    }
}

pub type BuiltinFunction = fn(&mut Interpreter, &[Value]) -> Result<Value, ExecutionErrorKind>;

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    /// `None` accepts any number of arguments.
    pub arity: Option<usize>,
    pub function: BuiltinFunction,
}

pub const BUILTINS: &[Builtin] = &[Builtin {
    name: "puts",
    arity: None,
    function: puts,
}];

fn puts(interpreter: &mut Interpreter, args: &[Value]) -> Result<Value, ExecutionErrorKind> {
    let mut stdout = interpreter.stdout.borrow_mut();
    for arg in args {
        writeln!(stdout, "{}", arg)?;
    }
    Ok(NULL)
}

#[derive(Debug, Clone)]
pub enum Callable {
    Function(CallableFunction),
    Builtin(Builtin),
}

impl Callable {
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
    ) -> Result<Value, ExecutionErrorKind> {
        match self {
            Callable::Function(callable_function) => callable_function.call(interpreter, args),
            Callable::Builtin(builtin) => (builtin.function)(interpreter, &args),
        }
    }

    pub fn arity(&self) -> Option<usize> {
        match self {
            Callable::Function(callable_function) => Some(callable_function.parameters.len()),
            Callable::Builtin(builtin) => builtin.arity,
        }
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(callable_function) => {
                write!(f, "fn(")?;
                for (i, parameter) in callable_function.parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", parameter)?;
                }
                write!(f, ") {}", callable_function.body)
            }
            Callable::Builtin(builtin) => write!(f, "builtin function {}", builtin.name),
        }
    }
}
