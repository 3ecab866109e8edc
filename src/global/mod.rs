pub mod limits;
pub mod opcodes;
