//! Operator semantics over `Var`: wrapping integer arithmetic, floored
//! modulo, exact integer exponentiation, quota-checked string and
//! collection rebuilds, membership, 1-based indexing and total range
//! rewrites, the iteration protocol, and `^`/`$` marker resolution.

use std::rc::Rc;

use crate::global::limits::{MAX_COLLECTION_SIZE, MAX_STRING_BYTES};
use crate::runtime::exceptions::Exception;
use crate::values::error::Error;
use crate::values::var::str_index_of_ci;
use crate::values::{List, Map, Var};

type OpResult = Result<Var, Exception>;

fn type_error(op: &str, a: &Var, b: &Var) -> Exception {
    Exception::with_message(
        Error::E_TYPE,
        format!("`{op}` cannot combine {} and {}", a.type_name(), b.type_name()),
    )
}

/// NaN or infinite results poison float arithmetic.
fn check_float(f: f64) -> OpResult {
    if f.is_finite() {
        Ok(Var::Float(f))
    } else {
        Err(Exception::new(Error::E_FLOAT))
    }
}

pub fn add(a: &Var, b: &Var) -> OpResult {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_add(*y))),
        (Var::Float(x), Var::Float(y)) => check_float(x + y),
        (Var::Str(x), Var::Str(y)) => {
            if x.len() + y.len() > MAX_STRING_BYTES {
                return Err(Exception::new(Error::E_QUOTA));
            }
            let mut out = String::with_capacity(x.len() + y.len());
            out.push_str(x);
            out.push_str(y);
            Ok(Var::Str(Rc::from(out.as_str())))
        }
        (Var::List(x), Var::List(y)) => {
            if x.len() + y.len() > MAX_COLLECTION_SIZE {
                return Err(Exception::new(Error::E_QUOTA));
            }
            Ok(Var::List(x.concat(y)))
        }
        _ => Err(type_error("+", a, b)),
    }
}

pub fn sub(a: &Var, b: &Var) -> OpResult {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_sub(*y))),
        (Var::Float(x), Var::Float(y)) => check_float(x - y),
        _ => Err(type_error("-", a, b)),
    }
}

pub fn mul(a: &Var, b: &Var) -> OpResult {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_mul(*y))),
        (Var::Float(x), Var::Float(y)) => check_float(x * y),
        _ => Err(type_error("*", a, b)),
    }
}

pub fn div(a: &Var, b: &Var) -> OpResult {
    match (a, b) {
        (Var::Int(_), Var::Int(0)) => Err(Exception::new(Error::E_DIV)),
        // the one overflowing quotient wraps back to itself
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_div(*y))),
        (Var::Float(x), Var::Float(y)) => {
            if *y == 0.0 {
                Err(Exception::new(Error::E_DIV))
            } else {
                check_float(x / y)
            }
        }
        _ => Err(type_error("/", a, b)),
    }
}

/// Floored modulo: the result takes the divisor's sign.
pub fn rem(a: &Var, b: &Var) -> OpResult {
    match (a, b) {
        (Var::Int(_), Var::Int(0)) => Err(Exception::new(Error::E_DIV)),
        (Var::Int(x), Var::Int(y)) => {
            let r = x.wrapping_rem(*y);
            if r != 0 && (r < 0) != (*y < 0) {
                Ok(Var::Int(r + y))
            } else {
                Ok(Var::Int(r))
            }
        }
        (Var::Float(x), Var::Float(y)) => {
            if *y == 0.0 {
                return Err(Exception::new(Error::E_DIV));
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (*y < 0.0) {
                check_float(r + y)
            } else {
                check_float(r)
            }
        }
        _ => Err(type_error("%", a, b)),
    }
}

pub fn pow(a: &Var, b: &Var) -> OpResult {
    match (a, b) {
        (Var::Int(base), Var::Int(exp)) => {
            if *exp >= 0 {
                Ok(Var::Int(int_pow(*base, *exp as u64)))
            } else if *base == 0 {
                Err(Exception::new(Error::E_DIV))
            } else {
                // negative exponent truncates toward zero
                Ok(Var::Int(match base {
                    1 => 1,
                    -1 => {
                        if exp % 2 == 0 {
                            1
                        } else {
                            -1
                        }
                    }
                    _ => 0,
                }))
            }
        }
        (Var::Float(base), Var::Float(exp)) => check_float(base.powf(*exp)),
        (Var::Float(base), Var::Int(exp)) => {
            check_float(base.powf(*exp as f64))
        }
        _ => Err(type_error("^", a, b)),
    }
}

/// Exact wrapping integer exponentiation by squaring.
fn int_pow(mut base: i64, mut exp: u64) -> i64 {
    let mut acc: i64 = 1;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    acc
}

pub fn negate(a: &Var) -> OpResult {
    match a {
        Var::Int(x) => Ok(Var::Int(x.wrapping_neg())),
        Var::Float(x) => Ok(Var::Float(-x)),
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("cannot negate {}", a.type_name()),
        )),
    }
}

pub fn compare(op_name: &str, a: &Var, b: &Var) -> Result<core::cmp::Ordering, Exception> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(x.cmp(y)),
        (Var::Float(x), Var::Float(y)) => Ok(x.total_cmp(y)),
        (Var::Str(x), Var::Str(y)) => {
            Ok(crate::values::var::cmp_str_ci(x, y))
        }
        (Var::Err(x), Var::Err(y)) => Ok((*x as u8).cmp(&(*y as u8))),
        (Var::Bool(x), Var::Bool(y)) => Ok(x.cmp(y)),
        _ => Err(type_error(op_name, a, b)),
    }
}

/// `element in container` membership: 1-based position or 0.
pub fn membership(element: &Var, container: &Var) -> OpResult {
    match container {
        Var::List(list) => Ok(Var::Int(list.index_of(element))),
        Var::Str(haystack) => match element {
            Var::Str(needle) => {
                Ok(Var::Int(str_index_of_ci(haystack, needle)))
            }
            _ => Err(type_error("in", element, container)),
        },
        Var::Map(map) => Ok(Var::Int(map.position_of_value(element))),
        _ => Err(type_error("in", element, container)),
    }
}

fn int_operand(v: &Var, op: &str) -> Result<i64, Exception> {
    match v {
        Var::Int(i) => Ok(*i),
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("`{op}` requires int operands, got {}", v.type_name()),
        )),
    }
}

fn shift_amount(v: &Var, op: &str) -> Result<u32, Exception> {
    let amount = int_operand(v, op)?;
    if (0..64).contains(&amount) {
        Ok(amount as u32)
    } else {
        Err(Exception::with_message(
            Error::E_INVARG,
            format!("shift amount {amount} out of range"),
        ))
    }
}

pub fn bit_or(a: &Var, b: &Var) -> OpResult {
    Ok(Var::Int(int_operand(a, "|.")? | int_operand(b, "|.")?))
}

pub fn bit_and(a: &Var, b: &Var) -> OpResult {
    Ok(Var::Int(int_operand(a, "&.")? & int_operand(b, "&.")?))
}

pub fn bit_xor(a: &Var, b: &Var) -> OpResult {
    Ok(Var::Int(int_operand(a, "^.")? ^ int_operand(b, "^.")?))
}

pub fn bit_not(a: &Var) -> OpResult {
    Ok(Var::Int(!int_operand(a, "~")?))
}

pub fn shl(a: &Var, b: &Var) -> OpResult {
    let amount = shift_amount(b, "<<")?;
    Ok(Var::Int(
        ((int_operand(a, "<<")? as u64) << amount) as i64,
    ))
}

/// Logical (zero-fill) right shift.
pub fn shr(a: &Var, b: &Var) -> OpResult {
    let amount = shift_amount(b, ">>")?;
    Ok(Var::Int(
        ((int_operand(a, ">>")? as u64) >> amount) as i64,
    ))
}

pub fn length(v: &Var) -> OpResult {
    match v {
        Var::Str(s) => Ok(Var::Int(s.len() as i64)),
        Var::List(l) => Ok(Var::Int(l.len() as i64)),
        Var::Map(m) => Ok(Var::Int(m.len() as i64)),
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("{} has no length", v.type_name()),
        )),
    }
}

fn index_int(v: &Var) -> Result<i64, Exception> {
    match v {
        Var::Int(i) => Ok(*i),
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("index must be an int, got {}", v.type_name()),
        )),
    }
}

fn range_error(index: i64, len: usize) -> Exception {
    Exception::with_message(
        Error::E_RANGE,
        format!("index {index} outside 1..{len}"),
    )
}

/// One byte of a string as a 1-character string.
fn str_byte(s: &str, index: i64) -> Var {
    let byte = s.as_bytes()[index as usize - 1];
    Var::str(char::from(byte).to_string())
}

pub fn index_get(coll: &Var, index: &Var) -> OpResult {
    match coll {
        Var::List(list) => {
            let i = index_int(index)?;
            list.get(i)
                .cloned()
                .ok_or_else(|| range_error(i, list.len()))
        }
        Var::Str(s) => {
            let i = index_int(index)?;
            if i < 1 || i as usize > s.len() {
                return Err(range_error(i, s.len()));
            }
            Ok(str_byte(s, i))
        }
        Var::Map(map) => {
            if !index.valid_map_key() {
                return Err(Exception::with_message(
                    Error::E_TYPE,
                    format!("{} is not a valid map key", index.type_name()),
                ));
            }
            map.get(index).cloned().ok_or_else(|| {
                Exception::with_message(
                    Error::E_RANGE,
                    format!("key {} not found", index.to_literal()),
                )
            })
        }
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("cannot index {}", coll.type_name()),
        )),
    }
}

pub fn index_set(coll: &Var, index: &Var, value: &Var) -> OpResult {
    match coll {
        Var::List(list) => {
            let i = index_int(index)?;
            list.set(i, value.clone())
                .map(Var::List)
                .ok_or_else(|| range_error(i, list.len()))
        }
        Var::Str(s) => {
            let i = index_int(index)?;
            if i < 1 || i as usize > s.len() {
                return Err(range_error(i, s.len()));
            }
            let Var::Str(replacement) = value else {
                return Err(type_error("[]=", coll, value));
            };
            if replacement.len() != 1 {
                return Err(Exception::with_message(
                    Error::E_INVARG,
                    "string element assignment needs a 1-character string",
                ));
            }
            let mut bytes = s.as_bytes().to_vec();
            bytes[i as usize - 1] = replacement.as_bytes()[0];
            Ok(Var::str(String::from_utf8_lossy(&bytes)))
        }
        Var::Map(map) => {
            if !index.valid_map_key() {
                return Err(Exception::with_message(
                    Error::E_TYPE,
                    format!("{} is not a valid map key", index.type_name()),
                ));
            }
            Ok(Var::Map(map.insert(index.clone(), value.clone())))
        }
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("cannot index {}", coll.type_name()),
        )),
    }
}

/// Resolve a map range endpoint: an INT is a canonical position, any
/// other scalar is looked up as a key.
fn map_position(map: &Map, endpoint: &Var) -> Result<i64, Exception> {
    match endpoint {
        Var::Int(i) => Ok(*i),
        key if key.valid_map_key() => {
            map.position_of_key(key).ok_or_else(|| {
                Exception::with_message(
                    Error::E_RANGE,
                    format!("key {} not found", key.to_literal()),
                )
            })
        }
        other => Err(Exception::with_message(
            Error::E_TYPE,
            format!("{} is not a valid map key", other.type_name()),
        )),
    }
}

pub fn range_get(coll: &Var, from: &Var, to: &Var) -> OpResult {
    match coll {
        Var::List(list) => {
            let (from, to) = (index_int(from)?, index_int(to)?);
            if from > to {
                return Ok(Var::List(List::new()));
            }
            let len = list.len() as i64;
            if from < 1 || to > len {
                return Err(range_error(if from < 1 { from } else { to }, list.len()));
            }
            Ok(Var::List(list.slice(from, to)))
        }
        Var::Str(s) => {
            let (from, to) = (index_int(from)?, index_int(to)?);
            if from > to {
                return Ok(Var::str(""));
            }
            let len = s.len() as i64;
            if from < 1 || to > len {
                return Err(range_error(if from < 1 { from } else { to }, s.len()));
            }
            let bytes = &s.as_bytes()[from as usize - 1..to as usize];
            Ok(Var::str(String::from_utf8_lossy(bytes)))
        }
        Var::Map(map) => {
            let (from, to) = (map_position(map, from)?, map_position(map, to)?);
            if from > to {
                return Ok(Var::Map(Map::new()));
            }
            let len = map.len() as i64;
            if from < 1 || to > len {
                return Err(range_error(if from < 1 { from } else { to }, map.len()));
            }
            Ok(Var::Map(map.slice_positions(from, to)))
        }
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("cannot take a range of {}", coll.type_name()),
        )),
    }
}

/// Total range rewrite `coll[1..from-1] + value + coll[to+1..]`. The
/// inverted form `from > to + 1` is accepted and duplicates the overlap.
pub fn range_set(coll: &Var, from: &Var, to: &Var, value: &Var) -> OpResult {
    match coll {
        Var::List(list) => {
            let (from, to) = (index_int(from)?, index_int(to)?);
            let Var::List(replacement) = value else {
                return Err(type_error("[..]=", coll, value));
            };
            let len = list.len() as i64;
            if from < 1 || from > len + 1 || to < 0 || to > len {
                return Err(range_error(from.clamp(0, len + 1), list.len()));
            }
            let out = list.splice_range(from, to, replacement);
            if out.len() > MAX_COLLECTION_SIZE {
                return Err(Exception::new(Error::E_QUOTA));
            }
            Ok(Var::List(out))
        }
        Var::Str(s) => {
            let (from, to) = (index_int(from)?, index_int(to)?);
            let Var::Str(replacement) = value else {
                return Err(type_error("[..]=", coll, value));
            };
            let len = s.len() as i64;
            if from < 1 || from > len + 1 || to < 0 || to > len {
                return Err(range_error(from.clamp(0, len + 1), s.len()));
            }
            let bytes = s.as_bytes();
            let mut out =
                Vec::with_capacity(bytes.len() + replacement.len());
            out.extend_from_slice(&bytes[..(from - 1) as usize]);
            out.extend_from_slice(replacement.as_bytes());
            if to < len {
                out.extend_from_slice(&bytes[to as usize..]);
            }
            if out.len() > MAX_STRING_BYTES {
                return Err(Exception::new(Error::E_QUOTA));
            }
            Ok(Var::str(String::from_utf8_lossy(&out)))
        }
        Var::Map(map) => {
            let (from, to) = (map_position(map, from)?, map_position(map, to)?);
            let Var::Map(replacement) = value else {
                return Err(type_error("[..]=", coll, value));
            };
            let len = map.len() as i64;
            if from < 1 || from > len + 1 || to < 0 || to > len {
                return Err(range_error(from.clamp(0, len + 1), map.len()));
            }
            let out = map.splice_positions(from, to, replacement);
            if out.len() > MAX_COLLECTION_SIZE {
                return Err(Exception::new(Error::E_QUOTA));
            }
            Ok(Var::Map(out))
        }
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("cannot range-assign {}", coll.type_name()),
        )),
    }
}

/// Inclusive integer range list, ascending or descending.
pub fn list_range(from: &Var, to: &Var) -> OpResult {
    let (from, to) = (index_int(from)?, index_int(to)?);
    let count = from.abs_diff(to) as usize + 1;
    if count > MAX_COLLECTION_SIZE {
        return Err(Exception::new(Error::E_QUOTA));
    }
    let values: Vec<Var> = if from <= to {
        (from..=to).map(Var::Int).collect()
    } else {
        (to..=from).rev().map(Var::Int).collect()
    };
    Ok(Var::List(List::from_vec(values)))
}

/// Normalize a container for iteration: a traversal list plus a flag
/// saying whether each element is a `{value, key_or_index}` pair.
pub fn iter_prep(coll: &Var, want_index: bool) -> Result<(List, bool), Exception> {
    match coll {
        Var::List(list) if !want_index => Ok((list.clone(), false)),
        Var::List(list) => {
            let wrapped = list
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    Var::List(List::from_vec(vec![
                        v.clone(),
                        Var::Int(i as i64 + 1),
                    ]))
                })
                .collect();
            Ok((wrapped, true))
        }
        Var::Map(map) => {
            let pairs = map
                .sorted_pairs()
                .into_iter()
                .map(|(k, v)| Var::List(List::from_vec(vec![v, k])))
                .collect();
            Ok((pairs, true))
        }
        Var::Str(s) if !want_index => {
            let chars = s
                .chars()
                .map(|c| Var::str(c.to_string()))
                .collect();
            Ok((chars, false))
        }
        Var::Str(s) => {
            let pairs = s
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    Var::List(List::from_vec(vec![
                        Var::str(c.to_string()),
                        Var::Int(i as i64 + 1),
                    ]))
                })
                .collect();
            Ok((pairs, true))
        }
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("cannot iterate over {}", coll.type_name()),
        )),
    }
}

/// Resolve a `^`/`$` marker against the compiler-parked collection.
pub fn resolve_marker(last: bool, context: &Var) -> OpResult {
    match context {
        Var::List(l) => Ok(Var::Int(if last { l.len() as i64 } else { 1 })),
        Var::Str(s) => Ok(Var::Int(if last { s.len() as i64 } else { 1 })),
        Var::Map(m) => {
            if m.is_empty() {
                return Ok(Var::Int(if last { 0 } else { 1 }));
            }
            Ok(if last {
                m.last_key().unwrap()
            } else {
                m.first_key().unwrap()
            })
        }
        _ => Err(Exception::with_message(
            Error::E_TYPE,
            format!("cannot index {}", context.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Var {
        Var::List(values.iter().map(|&i| Var::Int(i)).collect())
    }

    #[test]
    fn int_arithmetic_wraps() {
        assert_eq!(
            add(&Var::Int(i64::MAX), &Var::Int(1)).unwrap(),
            Var::Int(i64::MIN)
        );
        assert_eq!(
            div(&Var::Int(i64::MIN), &Var::Int(-1)).unwrap(),
            Var::Int(i64::MIN)
        );
        assert_eq!(
            negate(&Var::Int(i64::MIN)).unwrap(),
            Var::Int(i64::MIN)
        );
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(
            div(&Var::Int(1), &Var::Int(0)).unwrap_err().code,
            Error::E_DIV
        );
        assert_eq!(
            rem(&Var::Int(1), &Var::Int(0)).unwrap_err().code,
            Error::E_DIV
        );
        assert_eq!(
            div(&Var::Float(1.0), &Var::Float(0.0)).unwrap_err().code,
            Error::E_DIV
        );
    }

    #[test]
    fn floored_modulo_follows_divisor() {
        assert_eq!(rem(&Var::Int(7), &Var::Int(3)).unwrap(), Var::Int(1));
        assert_eq!(rem(&Var::Int(-7), &Var::Int(3)).unwrap(), Var::Int(2));
        assert_eq!(rem(&Var::Int(7), &Var::Int(-3)).unwrap(), Var::Int(-2));
        assert_eq!(rem(&Var::Int(-7), &Var::Int(-3)).unwrap(), Var::Int(-1));
        assert_eq!(
            rem(&Var::Int(i64::MIN), &Var::Int(-1)).unwrap(),
            Var::Int(0)
        );
    }

    #[test]
    fn integer_exponentiation() {
        assert_eq!(pow(&Var::Int(3), &Var::Int(4)).unwrap(), Var::Int(81));
        assert_eq!(pow(&Var::Int(2), &Var::Int(0)).unwrap(), Var::Int(1));
        assert_eq!(pow(&Var::Int(2), &Var::Int(-1)).unwrap(), Var::Int(0));
        assert_eq!(pow(&Var::Int(-1), &Var::Int(-3)).unwrap(), Var::Int(-1));
        assert_eq!(
            pow(&Var::Int(0), &Var::Int(-2)).unwrap_err().code,
            Error::E_DIV
        );
        assert_eq!(
            pow(&Var::Int(2), &Var::Float(2.0)).unwrap_err().code,
            Error::E_TYPE
        );
    }

    #[test]
    fn float_overflow_is_an_error() {
        assert_eq!(
            mul(&Var::Float(1e308), &Var::Float(1e308))
                .unwrap_err()
                .code,
            Error::E_FLOAT
        );
    }

    #[test]
    fn mixed_numeric_arithmetic_is_a_type_error() {
        assert_eq!(
            add(&Var::Int(1), &Var::Float(1.0)).unwrap_err().code,
            Error::E_TYPE
        );
    }

    #[test]
    fn empty_concatenations() {
        assert_eq!(add(&Var::str(""), &Var::str("")).unwrap(), Var::str(""));
        assert_eq!(add(&ints(&[]), &ints(&[])).unwrap(), ints(&[]));
    }

    #[test]
    fn shifts_are_logical() {
        assert_eq!(
            shr(&Var::Int(-1), &Var::Int(60)).unwrap(),
            Var::Int(15)
        );
        assert_eq!(
            shl(&Var::Int(1), &Var::Int(63)).unwrap(),
            Var::Int(i64::MIN)
        );
        assert_eq!(
            shl(&Var::Int(1), &Var::Int(64)).unwrap_err().code,
            Error::E_INVARG
        );
    }

    #[test]
    fn list_index_bounds() {
        let l = ints(&[1, 2, 3]);
        assert_eq!(
            index_get(&l, &Var::Int(0)).unwrap_err().code,
            Error::E_RANGE
        );
        assert_eq!(
            index_get(&l, &Var::Int(4)).unwrap_err().code,
            Error::E_RANGE
        );
        assert_eq!(index_get(&l, &Var::Int(3)).unwrap(), Var::Int(3));
    }

    #[test]
    fn map_index_errors() {
        let m = Var::Map(Map::from_pairs(vec![(Var::str("a"), Var::Int(1))]));
        assert_eq!(
            index_get(&m, &Var::str("b")).unwrap_err().code,
            Error::E_RANGE
        );
        assert_eq!(
            index_get(&m, &ints(&[1])).unwrap_err().code,
            Error::E_TYPE
        );
    }

    #[test]
    fn inverted_ranges_are_empty() {
        assert_eq!(
            range_get(&ints(&[1, 2, 3]), &Var::Int(3), &Var::Int(1)).unwrap(),
            ints(&[])
        );
        assert_eq!(
            range_get(&Var::str("abc"), &Var::Int(2), &Var::Int(1)).unwrap(),
            Var::str("")
        );
    }

    #[test]
    fn string_range_set_resizes() {
        let out = range_set(
            &Var::str("abcdef"),
            &Var::Int(2),
            &Var::Int(4),
            &Var::str("XYZ123"),
        )
        .unwrap();
        assert_eq!(out, Var::str("aXYZ123ef"));
    }

    #[test]
    fn range_lists_run_both_ways() {
        assert_eq!(
            list_range(&Var::Int(1), &Var::Int(4)).unwrap(),
            ints(&[1, 2, 3, 4])
        );
        assert_eq!(
            list_range(&Var::Int(3), &Var::Int(1)).unwrap(),
            ints(&[3, 2, 1])
        );
    }

    #[test]
    fn markers_resolve_by_type() {
        assert_eq!(
            resolve_marker(false, &ints(&[9, 8])).unwrap(),
            Var::Int(1)
        );
        assert_eq!(
            resolve_marker(true, &ints(&[9, 8])).unwrap(),
            Var::Int(2)
        );
        let m = Var::Map(Map::from_pairs(vec![
            (Var::str("b"), Var::Int(2)),
            (Var::str("a"), Var::Int(1)),
        ]));
        assert_eq!(resolve_marker(false, &m).unwrap(), Var::str("a"));
        assert_eq!(resolve_marker(true, &m).unwrap(), Var::str("b"));
        let empty = Var::Map(Map::new());
        assert_eq!(resolve_marker(false, &empty).unwrap(), Var::Int(1));
        assert_eq!(resolve_marker(true, &empty).unwrap(), Var::Int(0));
    }

    #[test]
    fn iteration_protocol() {
        let (list, flag) = iter_prep(&ints(&[5, 6]), false).unwrap();
        assert_eq!(list.len(), 2);
        assert!(!flag);
        let (pairs, flag) = iter_prep(&ints(&[5, 6]), true).unwrap();
        assert!(flag);
        assert_eq!(
            pairs.get(2).unwrap(),
            &Var::List(List::from_vec(vec![Var::Int(6), Var::Int(2)]))
        );
        let (chars, flag) = iter_prep(&Var::str("ab"), false).unwrap();
        assert!(!flag);
        assert_eq!(chars.get(1).unwrap(), &Var::str("a"));
        assert!(iter_prep(&Var::Int(1), false).is_err());
    }
}
