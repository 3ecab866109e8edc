use num_enum::TryFromPrimitive;
use strum::Display;
use strum_macros::EnumIter;

use crate::global::limits::{IMM_INT_MIN, IMM_INT_START};

/// One-byte opcodes of the verb bytecode format.
///
/// Operands follow the opcode in-line; two-byte operands are big-endian.
/// Bytes at `IMM_INT_START` and above are not opcodes but immediate
/// integer pushes (see [`imm_int_value`]).
#[allow(non_camel_case_types)]
#[derive(
    EnumIter,
    Debug,
    Eq,
    PartialEq,
    TryFromPrimitive,
    Copy,
    Clone,
    Display,
    num_enum::IntoPrimitive,
)]
#[repr(u8)]
pub enum Opcode {
    // stack 0x00 - 0x0f
    POP = 0x00,
    DUP,
    PUSH_CONST, // u8 pool index
    PUSH_VAR,   // u8 slot
    PUT_VAR,    // u8 slot; value stays on the stack

    // arithmetic / comparison / bitwise 0x05 - 0x1f
    ADD,
    SUB,
    MUL,
    DIV,
    MOD,
    POW,
    EQ,
    NE,
    LT,
    LE,
    GT,
    GE,
    IN,
    BIT_OR,
    BIT_AND,
    BIT_XOR,
    BIT_NOT,
    SHL,
    SHR,
    NOT,
    NEG,

    // short-circuit logic; u16 forward target, decided value stays pushed
    AND,
    OR,

    // control flow
    JUMP,          // u16 absolute
    IF_FALSE_JUMP, // u16 absolute; pops the condition
    LOOP_JUMP,     // u16 absolute, backward; tick-counted
    RETURN,        // pops the return value
    RETURN0,

    // collections
    MAKE_LIST,   // u16 element count
    MAKE_MAP,    // u16 pair count
    LENGTH,
    INDEX_GET,
    INDEX_SET,   // coll index value -> rebuilt coll
    RANGE_GET,   // coll from to -> slice
    RANGE_SET,   // coll from to value -> rebuilt coll
    LIST_APPEND, // list value -> list
    LIST_EXTEND, // list list -> list
    LIST_RANGE,  // from to -> integer range list
    SPLICE,      // asserts the top of stack is a list
    ITER_PREP,   // u8 want-index flag; coll -> normalized list, pair flag

    // dispatch
    CALL_BUILTIN, // u8 builtin id, u8 arg count or 0xFF = args list on stack
    CALL_VERB,    // u8 name pool index or 0xFF = name on stack
    PASS,         // args list on stack; parent dispatch from verb_loc

    // properties
    GET_PROP,        // u8 name pool index or 0xFF = name on stack
    SET_PROP_YIELD,  // u8 name or 0xFF, u8 holder flag; target value -> updated target
    WRITE_BACK_PROP, // u8 name or 0xFF; base old new -> (nothing)

    // exceptions
    TRY_EXCEPT,       // u8 clause count, per clause: u8 ncodes, ncodes * u8,
                      // u8 bind slot + 1 (0 = none), u16 handler address
    END_EXCEPT,       // u16 done address; pops the handler, jumps past bodies
    TRY_FINALLY,      // u16 handler address
    END_FINALLY,      // end of protected body; enters the finally block
    FINALLY_CONTINUE, // end of finally block; re-raises / resumes as pending
    EXIT,             // u8 handler count, u16 target; break/continue across
                      // try regions, running crossed finally blocks

    // fork, scatter, index markers
    FORK,       // u8 target slot + 1 (0 = unnamed), u16 body length
    SCATTER,    // u8 required, u8 optional, u8 has-rest; list -> list, avail
    MARK_FIRST, // u8 context slot; pushes the first index/key
    MARK_LAST,  // u8 context slot; pushes the last index/key
}

impl Opcode {
    /// Opcodes that consume a tick when executed. Everything else is free,
    /// including returns.
    pub fn counts_tick(self) -> bool {
        matches!(
            self,
            Opcode::CALL_BUILTIN | Opcode::CALL_VERB | Opcode::LOOP_JUMP
        )
    }
}

/// Decode an immediate-integer byte, or None if the byte is an opcode.
pub fn imm_int_value(byte: u8) -> Option<i64> {
    if byte >= IMM_INT_START {
        Some((byte - IMM_INT_START) as i64 + IMM_INT_MIN)
    } else {
        None
    }
}

/// Encode a small integer as an immediate byte if it is in range.
pub fn imm_int_byte(value: i64) -> Option<u8> {
    if (IMM_INT_MIN..=crate::global::limits::IMM_INT_MAX).contains(&value) {
        Some((value - IMM_INT_MIN) as u8 + IMM_INT_START)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn opcodes_stay_below_immediate_range() {
        for op in Opcode::iter() {
            assert!(u8::from(op) < IMM_INT_START, "{op} collides with immediates");
        }
    }

    #[test]
    fn immediate_round_trip() {
        for value in IMM_INT_MIN..=crate::global::limits::IMM_INT_MAX {
            let byte = imm_int_byte(value).unwrap();
            assert_eq!(imm_int_value(byte), Some(value));
        }
        assert_eq!(imm_int_byte(IMM_INT_MIN - 1), None);
        assert_eq!(imm_int_byte(crate::global::limits::IMM_INT_MAX + 1), None);
    }

    #[test]
    fn tick_counted_opcodes() {
        assert!(Opcode::CALL_VERB.counts_tick());
        assert!(Opcode::CALL_BUILTIN.counts_tick());
        assert!(Opcode::LOOP_JUMP.counts_tick());
        assert!(!Opcode::RETURN.counts_tick());
        assert!(!Opcode::JUMP.counts_tick());
    }
}
