use strum::Display;
use strum_macros::{EnumIter, EnumString};

/// The closed error taxonomy. Error values are first-class: they can be
/// stored in collections, compared, and matched by `except` clauses.
#[allow(non_camel_case_types)]
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumIter, EnumString,
)]
#[repr(u8)]
pub enum Error {
    E_NONE = 0,
    E_TYPE,
    E_DIV,
    E_PERM,
    E_PROPNF,
    E_VERBNF,
    E_INVIND,
    E_RECMOVE,
    E_MAXREC,
    E_RANGE,
    E_ARGS,
    E_INVARG,
    E_QUOTA,
    E_FLOAT,
    E_TICKS,
    E_KILLED,
}

impl Error {
    /// Short human description, used as the default exception message.
    pub fn message(self) -> &'static str {
        match self {
            Error::E_NONE => "No error",
            Error::E_TYPE => "Type mismatch",
            Error::E_DIV => "Division by zero",
            Error::E_PERM => "Permission denied",
            Error::E_PROPNF => "Property not found",
            Error::E_VERBNF => "Verb not found",
            Error::E_INVIND => "Invalid indirection",
            Error::E_RECMOVE => "Recursive move",
            Error::E_MAXREC => "Too many verb calls",
            Error::E_RANGE => "Range error",
            Error::E_ARGS => "Incorrect number of arguments",
            Error::E_INVARG => "Invalid argument",
            Error::E_QUOTA => "Resource limit exceeded",
            Error::E_FLOAT => "Floating-point arithmetic error",
            Error::E_TICKS => "Task ran out of ticks",
            Error::E_KILLED => "Task killed",
        }
    }

    /// A forced kill is matched by no `except` clause, not even catch-any.
    pub fn is_catchable(self) -> bool {
        self != Error::E_KILLED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn spelling_round_trip() {
        assert_eq!(Error::E_TYPE.to_string(), "E_TYPE");
        assert_eq!(Error::from_str("E_DIV").unwrap(), Error::E_DIV);
        assert!(Error::from_str("E_BOGUS").is_err());
    }

    #[test]
    fn killed_is_uncatchable() {
        assert!(Error::E_TYPE.is_catchable());
        assert!(!Error::E_KILLED.is_catchable());
    }
}
