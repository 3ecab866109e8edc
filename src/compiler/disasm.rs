//! Human-readable bytecode listings, for debugging compiler output and
//! asserting lowering shapes in tests.

use core::fmt::Write as _;

use crate::compiler::program::Program;
use crate::global::opcodes::{imm_int_value, Opcode};

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub offset: usize,
    pub text: String,
}

/// Decode a whole program into printable instructions. Operands are
/// rendered symbolically: constants by literal, slots by name, jump
/// targets as absolute offsets.
pub fn disassemble(program: &Program) -> Vec<Decoded> {
    let mut out = Vec::new();
    let mut reader = Reader {
        program,
        offset: 0,
    };
    while reader.offset < program.code.len() {
        let offset = reader.offset;
        let text = reader.decode_one();
        out.push(Decoded { offset, text });
    }
    out
}

/// The listing as one string, one instruction per line.
pub fn listing(program: &Program) -> String {
    let mut out = String::new();
    for ins in disassemble(program) {
        let _ = writeln!(out, "{:5}  {}", ins.offset, ins.text);
    }
    out
}

struct Reader<'a> {
    program: &'a Program,
    offset: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> u8 {
        let byte = self.program.code.get(self.offset).copied().unwrap_or(0);
        self.offset += 1;
        byte
    }

    fn u16(&mut self) -> u16 {
        u16::from_be_bytes([self.u8(), self.u8()])
    }

    fn constant(&mut self) -> String {
        let index = self.u8();
        match self.program.constants.get(index as usize) {
            Some(value) => value.to_literal(),
            None => format!("const#{index}"),
        }
    }

    fn slot(&mut self) -> String {
        let index = self.u8();
        match self.program.var_names.get(index as usize) {
            Some(name) => name.clone(),
            None => format!("slot#{index}"),
        }
    }

    fn name_operand(&mut self) -> String {
        let index = self.u8();
        if index == 0xFF {
            "<stack>".to_string()
        } else {
            match self.program.constants.get(index as usize) {
                Some(value) => value.to_literal(),
                None => format!("const#{index}"),
            }
        }
    }

    fn decode_one(&mut self) -> String {
        let byte = self.u8();
        if let Some(value) = imm_int_value(byte) {
            return format!("PUSH_IMM {value}");
        }
        let Ok(op) = Opcode::try_from(byte) else {
            return format!("?? 0x{byte:02x}");
        };
        match op {
            Opcode::PUSH_CONST => format!("{op} {}", self.constant()),
            Opcode::PUSH_VAR | Opcode::PUT_VAR => {
                format!("{op} {}", self.slot())
            }
            Opcode::AND
            | Opcode::OR
            | Opcode::JUMP
            | Opcode::IF_FALSE_JUMP
            | Opcode::LOOP_JUMP
            | Opcode::END_EXCEPT
            | Opcode::TRY_FINALLY => format!("{op} -> {}", self.u16()),
            Opcode::MAKE_LIST | Opcode::MAKE_MAP => {
                format!("{op} {}", self.u16())
            }
            Opcode::ITER_PREP => format!("{op} want_index={}", self.u8()),
            Opcode::CALL_BUILTIN => {
                let id = self.u8();
                let argc = self.u8();
                if argc == 0xFF {
                    format!("{op} #{id} @list")
                } else {
                    format!("{op} #{id} argc={argc}")
                }
            }
            Opcode::CALL_VERB => format!("{op} {}", self.name_operand()),
            Opcode::GET_PROP | Opcode::WRITE_BACK_PROP => {
                format!("{op} {}", self.name_operand())
            }
            Opcode::SET_PROP_YIELD => {
                let name = self.name_operand();
                let holder = self.u8();
                format!("{op} {name} holder={holder}")
            }
            Opcode::TRY_EXCEPT => {
                let count = self.u8();
                let mut text = format!("{op} clauses={count}");
                for _ in 0..count {
                    let ncodes = self.u8();
                    let codes = if ncodes == 0 {
                        "ANY".to_string()
                    } else {
                        (0..ncodes)
                            .map(|_| self.constant())
                            .collect::<Vec<_>>()
                            .join(",")
                    };
                    let bind = self.u8();
                    let handler = self.u16();
                    let _ = write!(
                        text,
                        " [{codes} bind={bind} -> {handler}]"
                    );
                }
                text
            }
            Opcode::EXIT => {
                let count = self.u8();
                format!("{op} handlers={count} -> {}", self.u16())
            }
            Opcode::FORK => {
                let slot = self.u8();
                let len = self.u16();
                format!("{op} slot={slot} body_len={len}")
            }
            Opcode::SCATTER => {
                let required = self.u8();
                let optional = self.u8();
                let rest = self.u8();
                format!("{op} req={required} opt={optional} rest={rest}")
            }
            Opcode::MARK_FIRST | Opcode::MARK_LAST => {
                format!("{op} ctx={}", self.slot())
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::parse_program;
    use crate::runtime::builtins::BuiltinRegistry;

    fn listing_of(src: &str) -> String {
        let stmts = parse_program(src).unwrap();
        let program =
            compile(&stmts, &BuiltinRegistry::core(), None).unwrap();
        listing(&program)
    }

    #[test]
    fn immediates_and_returns() {
        let text = listing_of("return 5;");
        assert!(text.contains("PUSH_IMM 5"));
        assert!(text.contains("RETURN"));
    }

    #[test]
    fn digit_build_for_large_ints() {
        let text = listing_of("return 1234;");
        // 1234 = ((12 * 10) + 3) * 10 + 4, built from immediates
        assert!(text.contains("PUSH_IMM 12"));
        assert!(text.contains("MUL"));
        assert!(!text.contains("PUSH_CONST"));
    }

    #[test]
    fn loops_use_backward_jumps() {
        let text = listing_of("while (1) endwhile");
        assert!(text.contains("LOOP_JUMP"));
        assert!(text.contains("IF_FALSE_JUMP"));
    }

    #[test]
    fn builtin_calls_show_arg_counts() {
        let text = listing_of("return typeof(1);");
        assert!(text.contains("argc=1"));
        let text = listing_of("l = {1}; return typeof(@l);");
        assert!(text.contains("@list"));
    }

    #[test]
    fn try_except_clause_table_renders() {
        let text =
            listing_of("try x = 1; except (E_DIV) x = 2; endtry");
        assert!(text.contains("TRY_EXCEPT clauses=1"));
        assert!(text.contains("E_DIV"));
        assert!(text.contains("END_EXCEPT"));
    }

    #[test]
    fn decoding_tiles_the_code_vector() {
        let stmts = parse_program(
            "for x in [1..3] y = {x, x}; endfor return y;",
        )
        .unwrap();
        let program =
            compile(&stmts, &BuiltinRegistry::core(), None).unwrap();
        let decoded = disassemble(&program);
        assert_eq!(decoded.first().map(|i| i.offset), Some(0));
        // strictly increasing offsets, no instruction decoded twice
        for pair in decoded.windows(2) {
            assert!(pair[0].offset < pair[1].offset);
        }
        assert!(decoded.last().unwrap().offset < program.code.len());
    }
}
