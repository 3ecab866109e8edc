use std::rc::Rc;

use crate::values::Var;

/// The compiled, immutable form of a verb body or eval snippet.
#[derive(Debug, Clone)]
pub struct Program {
    /// Flat opcode/operand byte vector.
    pub code: Vec<u8>,
    /// Deduplicated constants, addressed by one-byte pool index.
    pub constants: Vec<Var>,
    /// Local slot names, addressed by one-byte slot index. Identifiers
    /// are case-insensitive; compiler temporaries carry unlexable names.
    pub var_names: Vec<String>,
    /// High-water mark of local slots.
    pub num_locals: usize,
    /// Ascending (first instruction offset, source line) pairs.
    pub line_info: Vec<(usize, usize)>,
    /// Raw source lines, kept for tracebacks and fork-body extraction.
    pub source: Option<Vec<String>>,
}

impl Program {
    /// Source line for a code offset, by binary descent over the line map.
    pub fn line_for_offset(&self, offset: usize) -> usize {
        match self
            .line_info
            .binary_search_by(|(start, _)| start.cmp(&offset))
        {
            Ok(i) => self.line_info[i].1,
            Err(0) => 1,
            Err(i) => self.line_info[i - 1].1,
        }
    }

    /// Case-insensitive slot lookup.
    pub fn find_var(&self, name: &str) -> Option<usize> {
        self.var_names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn into_shared(self) -> Rc<Program> {
        Rc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program_with_lines(line_info: Vec<(usize, usize)>) -> Program {
        Program {
            code: Vec::new(),
            constants: Vec::new(),
            var_names: Vec::new(),
            num_locals: 0,
            line_info,
            source: None,
        }
    }

    #[test]
    fn line_lookup_descends() {
        let p = program_with_lines(vec![(0, 1), (10, 2), (25, 5)]);
        assert_eq!(p.line_for_offset(0), 1);
        assert_eq!(p.line_for_offset(9), 1);
        assert_eq!(p.line_for_offset(10), 2);
        assert_eq!(p.line_for_offset(24), 2);
        assert_eq!(p.line_for_offset(400), 5);
    }

    #[test]
    fn var_lookup_ignores_case() {
        let mut p = program_with_lines(Vec::new());
        p.var_names = vec!["this".into(), "Count".into()];
        assert_eq!(p.find_var("COUNT"), Some(1));
        assert_eq!(p.find_var("missing"), None);
    }
}
