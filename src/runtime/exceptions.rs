use core::fmt::{self, Display};

use crate::values::{List, Var};
use crate::values::error::Error;

/// A raised exception: error kind, short message, an auxiliary value
/// (INT 0 unless a builtin filled it), and the traceback accumulated
/// while unwinding. MOO code sees it as the 4-element list shape.
#[derive(Debug, Clone)]
pub struct Exception {
    pub code: Error,
    pub message: String,
    pub value: Var,
    pub traceback: List,
}

impl Exception {
    pub fn new(code: Error) -> Exception {
        Exception {
            code,
            message: code.message().to_string(),
            value: Var::Int(0),
            traceback: List::new(),
        }
    }

    pub fn with_message(code: Error, message: impl Into<String>) -> Exception {
        Exception {
            code,
            message: message.into(),
            value: Var::Int(0),
            traceback: List::new(),
        }
    }

    pub fn with_value(
        code: Error,
        message: impl Into<String>,
        value: Var,
    ) -> Exception {
        Exception {
            code,
            message: message.into(),
            value,
            traceback: List::new(),
        }
    }

    /// The `{code, message, value, traceback}` list bound by handlers.
    pub fn as_list(&self) -> Var {
        Var::List(List::from_vec(vec![
            Var::Err(self.code),
            Var::str(&self.message),
            self.value.clone(),
            Var::List(self.traceback.clone()),
        ]))
    }

    /// Record an activation in the traceback, innermost first.
    pub fn push_frame(&mut self, frame: Var) {
        self.traceback = self.traceback.push(frame);
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<Error> for Exception {
    fn from(code: Error) -> Self {
        Exception::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_shape() {
        let exc = Exception::new(Error::E_DIV);
        let Var::List(list) = exc.as_list() else { panic!() };
        assert_eq!(list.len(), 4);
        assert_eq!(list.get(1), Some(&Var::Err(Error::E_DIV)));
        assert_eq!(list.get(2), Some(&Var::str("Division by zero")));
        assert_eq!(list.get(3), Some(&Var::Int(0)));
    }
}
