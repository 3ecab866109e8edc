use core::cmp::Ordering;
use core::fmt::{self, Display};
use std::rc::Rc;

use itertools::Itertools;

use crate::values::error::Error;
use crate::values::list::List;
use crate::values::map::Map;
use crate::values::objid::Objid;
use crate::values::waif::Waif;

/// A MOO value. Scalars are stored inline; collection and string bodies are
/// shared behind `Rc` and rebuilt copy-on-write on every update.
#[derive(Debug, Clone)]
pub enum Var {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
    Obj(Objid),
    Err(Error),
    List(List),
    Map(Map),
    Waif(Waif),
}

impl Var {
    pub fn str(s: impl AsRef<str>) -> Var {
        Var::Str(Rc::from(s.as_ref()))
    }

    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Var::Int(_) => "int",
            Var::Float(_) => "float",
            Var::Bool(_) => "bool",
            Var::Str(_) => "str",
            Var::Obj(_) => "obj",
            Var::Err(_) => "err",
            Var::List(_) => "list",
            Var::Map(_) => "map",
            Var::Waif(_) => "waif",
        }
    }

    /// Numeric type code as reported by `typeof()`.
    pub fn type_code(&self) -> i64 {
        match self {
            Var::Int(_) => 0,
            Var::Obj(o) if o.anonymous => 12,
            Var::Obj(_) => 1,
            Var::Str(_) => 2,
            Var::Err(_) => 3,
            Var::List(_) => 4,
            Var::Float(_) => 9,
            Var::Map(_) => 10,
            Var::Waif(_) => 13,
            Var::Bool(_) => 14,
        }
    }

    /// MOO truthiness: nonzero numbers, nonempty strings and collections.
    /// Objects, errors and waifs are always false.
    pub fn is_true(&self) -> bool {
        match self {
            Var::Int(i) => *i != 0,
            Var::Float(f) => *f != 0.0,
            Var::Bool(b) => *b,
            Var::Str(s) => !s.is_empty(),
            Var::List(l) => !l.is_empty(),
            Var::Map(m) => !m.is_empty(),
            Var::Obj(_) | Var::Err(_) | Var::Waif(_) => false,
        }
    }

    /// Value equality. Strings compare ASCII-case-insensitively; INT and
    /// BOOL compare equal when the bool maps to 0/1; any other type pair is
    /// unequal without raising.
    pub fn equals(&self, other: &Var) -> bool {
        match (self, other) {
            (Var::Int(a), Var::Int(b)) => a == b,
            (Var::Float(a), Var::Float(b)) => a == b,
            (Var::Bool(a), Var::Bool(b)) => a == b,
            (Var::Int(a), Var::Bool(b)) | (Var::Bool(b), Var::Int(a)) => {
                *a == *b as i64
            }
            (Var::Str(a), Var::Str(b)) => a.eq_ignore_ascii_case(b),
            (Var::Obj(a), Var::Obj(b)) => a == b,
            (Var::Err(a), Var::Err(b)) => a == b,
            (Var::List(a), Var::List(b)) => a.equals(b),
            (Var::Map(a), Var::Map(b)) => a.equals(b),
            (Var::Waif(a), Var::Waif(b)) => a.identical(b),
            _ => false,
        }
    }

    /// Reference identity: shared-body pointer equality for reference
    /// kinds, value equality for inline scalars. Used to skip no-op
    /// write-backs in assignment chains.
    pub fn identical(&self, other: &Var) -> bool {
        match (self, other) {
            (Var::Str(a), Var::Str(b)) => Rc::ptr_eq(a, b),
            (Var::List(a), Var::List(b)) => a.identical(b),
            (Var::Map(a), Var::Map(b)) => a.identical(b),
            (Var::Waif(a), Var::Waif(b)) => a.identical(b),
            _ => self.equals(other),
        }
    }

    /// Whether this value may be used as a map key.
    pub fn valid_map_key(&self) -> bool {
        !matches!(self, Var::List(_) | Var::Map(_) | Var::Waif(_))
    }

    /// Total order over valid map keys: INT < OBJ < FLOAT < ERR < STR,
    /// natural order within a type, case-insensitive for strings. BOOL
    /// sorts through its integer image. Invalid key kinds sort last so the
    /// comparison is total.
    pub fn canonical_cmp(&self, other: &Var) -> Ordering {
        fn rank(v: &Var) -> u8 {
            match v {
                Var::Int(_) | Var::Bool(_) => 0,
                Var::Obj(_) => 1,
                Var::Float(_) => 2,
                Var::Err(_) => 3,
                Var::Str(_) => 4,
                Var::List(_) => 5,
                Var::Map(_) => 6,
                Var::Waif(_) => 7,
            }
        }
        fn int_image(v: &Var) -> i64 {
            match v {
                Var::Int(i) => *i,
                Var::Bool(b) => *b as i64,
                _ => unreachable!(),
            }
        }
        match rank(self).cmp(&rank(other)) {
            Ordering::Equal => match (self, other) {
                (Var::Int(_) | Var::Bool(_), Var::Int(_) | Var::Bool(_)) => {
                    int_image(self).cmp(&int_image(other))
                }
                (Var::Obj(a), Var::Obj(b)) => a.cmp(b),
                (Var::Float(a), Var::Float(b)) => a.total_cmp(b),
                (Var::Err(a), Var::Err(b)) => (*a as u8).cmp(&(*b as u8)),
                (Var::Str(a), Var::Str(b)) => {
                    cmp_str_ci(a, b)
                }
                _ => Ordering::Equal,
            },
            other_rank => other_rank,
        }
    }

    /// Canonical literal form: parses back to an equal value for INT,
    /// FLOAT, BOOL, STR, OBJ and ERR.
    pub fn to_literal(&self) -> String {
        match self {
            Var::Int(i) => i.to_string(),
            Var::Float(f) => format_float(*f),
            Var::Bool(b) => b.to_string(),
            Var::Str(s) => quote_string(s),
            Var::Obj(o) => o.to_string(),
            Var::Err(e) => e.to_string(),
            Var::List(l) => format!(
                "{{{}}}",
                l.iter().map(Var::to_literal).join(", ")
            ),
            Var::Map(m) => {
                if m.is_empty() {
                    "[]".to_string()
                } else {
                    format!(
                        "[{}]",
                        m.iter()
                            .map(|(k, v)| format!(
                                "{} -> {}",
                                k.to_literal(),
                                v.to_literal()
                            ))
                            .join(", ")
                    )
                }
            }
            Var::Waif(w) => format!("[waif {}]", w.class()),
        }
    }

    /// Display form as produced by `tostr()`: strings unquoted, errors as
    /// their message, collections abbreviated.
    pub fn to_display(&self) -> String {
        match self {
            Var::Str(s) => s.to_string(),
            Var::Err(e) => e.message().to_string(),
            Var::List(_) => "{list}".to_string(),
            Var::Map(_) => "[map]".to_string(),
            Var::Waif(_) => "[waif]".to_string(),
            other => other.to_literal(),
        }
    }
}

/// ASCII-case-insensitive string order.
pub fn cmp_str_ci(a: &str, b: &str) -> Ordering {
    let la = a.bytes().map(|c| c.to_ascii_lowercase());
    let lb = b.bytes().map(|c| c.to_ascii_lowercase());
    la.cmp(lb)
}

/// 1-based byte position of the case-insensitive first occurrence of
/// `needle` in `haystack`, or 0. The empty needle matches at position 1.
pub fn str_index_of_ci(haystack: &str, needle: &str) -> i64 {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() {
        return 1;
    }
    if n.len() > h.len() {
        return 0;
    }
    for start in 0..=(h.len() - n.len()) {
        if h[start..start + n.len()].eq_ignore_ascii_case(n) {
            return (start + 1) as i64;
        }
    }
    0
}

fn format_float(f: f64) -> String {
    if f.is_finite() {
        // {:?} is the shortest representation that round-trips and keeps
        // a decimal point or exponent marker
        format!("{f:?}")
    } else if f.is_nan() {
        "nan".to_string()
    } else if f > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_literal())
    }
}

impl From<i64> for Var {
    fn from(i: i64) -> Self {
        Var::Int(i)
    }
}

impl From<f64> for Var {
    fn from(f: f64) -> Self {
        Var::Float(f)
    }
}

impl From<bool> for Var {
    fn from(b: bool) -> Self {
        Var::Bool(b)
    }
}

impl From<&str> for Var {
    fn from(s: &str) -> Self {
        Var::str(s)
    }
}

impl From<String> for Var {
    fn from(s: String) -> Self {
        Var::str(s)
    }
}

impl From<Objid> for Var {
    fn from(o: Objid) -> Self {
        Var::Obj(o)
    }
}

impl From<Error> for Var {
    fn from(e: Error) -> Self {
        Var::Err(e)
    }
}

impl From<List> for Var {
    fn from(l: List) -> Self {
        Var::List(l)
    }
}

impl From<Map> for Var {
    fn from(m: Map) -> Self {
        Var::Map(m)
    }
}

impl From<Waif> for Var {
    fn from(w: Waif) -> Self {
        Var::Waif(w)
    }
}

impl From<Vec<Var>> for Var {
    fn from(v: Vec<Var>) -> Self {
        Var::List(List::from_vec(v))
    }
}
