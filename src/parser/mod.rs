//! MOO surface-syntax parser: a thin recursive-descent layer for
//! statements over a precedence-climbing expression core. Produces the
//! AST the compiler consumes; every node is tagged with its source line.

pub mod errors;
pub mod lexer;

use crate::ast::{
    Arg, BinaryOp, CondArm, ExceptArm, ExceptCodes, Expr, ExprKind, PropName,
    ScatterItem, ScatterKind, Stmt, StmtKind, UnaryOp,
};
use crate::parser::errors::SyntaxError;
use crate::parser::lexer::{tokenize, SpannedToken, Token};
use crate::values::{Objid, Var};

const KEYWORDS: &[&str] = &[
    "if", "elseif", "else", "endif", "while", "endwhile", "for", "endfor",
    "fork", "endfork", "return", "try", "except", "finally", "endtry",
    "break", "continue", "in", "any", "true", "false",
];

/// Parse a full verb body (or eval snippet) into a statement list.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let stmts = parser.parse_stmts(&[])?;
    if let Some(tok) = parser.peek_opt() {
        return Err(SyntaxError::new(
            tok.line,
            format!("unexpected `{:?}`", tok.token),
        ));
    }
    Ok(stmts)
}

/// Parse a single scalar literal (optionally negated); the reader side of
/// the canonical string form.
pub fn parse_literal(source: &str) -> Result<Var, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let negate = parser.take_token(&Token::Minus);
    let value = match parser.next()? {
        SpannedToken {
            token: Token::Int(raw),
            line,
        } => {
            let raw = if negate {
                (raw as i128).checked_neg().unwrap()
            } else {
                raw as i128
            };
            i64::try_from(raw)
                .map(Var::Int)
                .map_err(|_| SyntaxError::new(line, "integer literal out of range"))?
        }
        SpannedToken {
            token: Token::Float(f),
            ..
        } => Var::Float(if negate { -f } else { f }),
        tok if negate => {
            return Err(SyntaxError::new(tok.line, "expected a number"));
        }
        SpannedToken {
            token: Token::Str(s),
            ..
        } => Var::str(s),
        SpannedToken {
            token: Token::ObjLit(id),
            ..
        } => Var::Obj(Objid::new(id)),
        SpannedToken {
            token: Token::ErrLit(e),
            ..
        } => Var::Err(e),
        SpannedToken {
            token: Token::Ident(name),
            line,
        } => match name.to_ascii_lowercase().as_str() {
            "true" => Var::Bool(true),
            "false" => Var::Bool(false),
            _ => return Err(SyntaxError::new(line, "expected a literal")),
        },
        tok => {
            return Err(SyntaxError::new(tok.line, "expected a literal"));
        }
    };
    if let Some(tok) = parser.peek_opt() {
        return Err(SyntaxError::new(tok.line, "trailing input after literal"));
    }
    Ok(value)
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    /// Nesting depth of `[...]` index brackets; `^` and `$` markers are
    /// only meaningful inside.
    index_depth: usize,
}

/// Brace-list element, before we know whether the braces are a list
/// literal or a scatter pattern.
enum BraceItem {
    Plain(Expr),
    Splice(Expr),
    Optional(usize, String, Option<Expr>),
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Parser {
        Parser {
            tokens,
            pos: 0,
            index_depth: 0,
        }
    }

    fn peek_opt(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn peek2_opt(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos + 1)
    }

    fn last_line(&self) -> usize {
        self.tokens.last().map(|t| t.line).unwrap_or(1)
    }

    fn line(&self) -> usize {
        self.peek_opt().map(|t| t.line).unwrap_or_else(|| self.last_line())
    }

    fn next(&mut self) -> Result<SpannedToken, SyntaxError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| SyntaxError::new(self.last_line(), "unexpected end of input"))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<usize, SyntaxError> {
        let line = match self.peek_opt() {
            Some(tok) if &tok.token == token => tok.line,
            Some(tok) => {
                return Err(SyntaxError::new(
                    tok.line,
                    format!("expected {what}, found `{:?}`", tok.token),
                ));
            }
            None => {
                return Err(SyntaxError::new(
                    self.last_line(),
                    format!("expected {what}, found end of input"),
                ));
            }
        };
        self.pos += 1;
        Ok(line)
    }

    fn take_token(&mut self, token: &Token) -> bool {
        if matches!(self.peek_opt(), Some(tok) if &tok.token == token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek_opt(),
            Some(SpannedToken {
                token: Token::Ident(name),
                ..
            }) if name.eq_ignore_ascii_case(keyword)
        )
    }

    fn peek_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| self.peek_keyword(kw))
    }

    fn take_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<usize, SyntaxError> {
        if self.peek_keyword(keyword) {
            let line = self.line();
            self.pos += 1;
            Ok(line)
        } else {
            Err(SyntaxError::new(
                self.line(),
                format!("expected `{keyword}`"),
            ))
        }
    }

    /// A plain (non-keyword) identifier.
    fn ident(&mut self) -> Result<(usize, String), SyntaxError> {
        let out = match self.peek_opt() {
            Some(SpannedToken {
                token: Token::Ident(name),
                line,
            }) => {
                if is_keyword(name) {
                    return Err(SyntaxError::new(
                        *line,
                        format!("`{name}` is a reserved word"),
                    ));
                }
                (*line, name.clone())
            }
            _ => {
                return Err(SyntaxError::new(
                    self.line(),
                    "expected an identifier",
                ));
            }
        };
        self.pos += 1;
        Ok(out)
    }

    fn peek_plain_ident(&self) -> bool {
        matches!(
            self.peek_opt(),
            Some(SpannedToken {
                token: Token::Ident(name),
                ..
            }) if !is_keyword(name)
        )
    }

    // ---- statements ----

    /// Parse statements until one of the terminator keywords (left in
    /// place) or, with no terminators, until end of input.
    fn parse_stmts(&mut self, terminators: &[&str]) -> Result<Vec<Stmt>, SyntaxError> {
        let mut out = Vec::new();
        loop {
            if terminators.is_empty() {
                if self.peek_opt().is_none() {
                    return Ok(out);
                }
            } else {
                if self.peek_any_keyword(terminators) {
                    return Ok(out);
                }
                if self.peek_opt().is_none() {
                    return Err(SyntaxError::new(
                        self.last_line(),
                        format!("missing `{}`", terminators.last().unwrap()),
                    ));
                }
            }
            out.push(self.parse_stmt()?);
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        if self.take_token(&Token::Semicolon) {
            return Ok(Stmt {
                line,
                kind: StmtKind::Empty,
            });
        }
        if self.take_keyword("if") {
            return self.parse_if(line);
        }
        if self.take_keyword("while") {
            return self.parse_while(line);
        }
        if self.take_keyword("for") {
            return self.parse_for(line);
        }
        if self.take_keyword("fork") {
            return self.parse_fork(line);
        }
        if self.take_keyword("try") {
            return self.parse_try(line);
        }
        if self.take_keyword("return") {
            let expr = if self.take_token(&Token::Semicolon) {
                None
            } else {
                let e = self.parse_expression(0)?;
                self.expect(&Token::Semicolon, "`;`")?;
                Some(e)
            };
            return Ok(Stmt {
                line,
                kind: StmtKind::Return(expr),
            });
        }
        if self.take_keyword("break") {
            let arg = self.parse_loop_exit_arg()?;
            return Ok(Stmt {
                line,
                kind: StmtKind::Break { arg },
            });
        }
        if self.take_keyword("continue") {
            let arg = self.parse_loop_exit_arg()?;
            return Ok(Stmt {
                line,
                kind: StmtKind::Continue { arg },
            });
        }
        let expr = self.parse_expression(0)?;
        self.expect(&Token::Semicolon, "`;`")?;
        Ok(Stmt {
            line,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_loop_exit_arg(&mut self) -> Result<Option<Expr>, SyntaxError> {
        if self.take_token(&Token::Semicolon) {
            return Ok(None);
        }
        let expr = self.parse_expression(0)?;
        self.expect(&Token::Semicolon, "`;`")?;
        Ok(Some(expr))
    }

    fn parse_if(&mut self, line: usize) -> Result<Stmt, SyntaxError> {
        self.expect(&Token::LParen, "`(`")?;
        let cond = self.parse_expression(0)?;
        self.expect(&Token::RParen, "`)`")?;
        let body = self.parse_stmts(&["elseif", "else", "endif"])?;
        let mut arms = vec![CondArm { line, cond, body }];
        while self.peek_keyword("elseif") {
            let arm_line = self.line();
            self.pos += 1;
            self.expect(&Token::LParen, "`(`")?;
            let cond = self.parse_expression(0)?;
            self.expect(&Token::RParen, "`)`")?;
            let body = self.parse_stmts(&["elseif", "else", "endif"])?;
            arms.push(CondArm {
                line: arm_line,
                cond,
                body,
            });
        }
        let otherwise = if self.take_keyword("else") {
            self.parse_stmts(&["endif"])?
        } else {
            Vec::new()
        };
        self.expect_keyword("endif")?;
        Ok(Stmt {
            line,
            kind: StmtKind::If { arms, otherwise },
        })
    }

    fn parse_while(&mut self, line: usize) -> Result<Stmt, SyntaxError> {
        let label = if self.peek_plain_ident() {
            Some(self.ident()?.1)
        } else {
            None
        };
        self.expect(&Token::LParen, "`(`")?;
        let cond = self.parse_expression(0)?;
        self.expect(&Token::RParen, "`)`")?;
        let body = self.parse_stmts(&["endwhile"])?;
        self.expect_keyword("endwhile")?;
        Ok(Stmt {
            line,
            kind: StmtKind::While { label, cond, body },
        })
    }

    fn parse_for(&mut self, line: usize) -> Result<Stmt, SyntaxError> {
        let (_, value) = self.ident()?;
        let index = if self.take_token(&Token::Comma) {
            Some(self.ident()?.1)
        } else {
            None
        };
        self.expect_keyword("in")?;
        if self.take_token(&Token::LBracket) {
            if let Some(index) = index {
                return Err(SyntaxError::new(
                    line,
                    format!("index variable `{index}` is not allowed over a range"),
                ));
            }
            let from = self.parse_expression(0)?;
            self.expect(&Token::DotDot, "`..`")?;
            let to = self.parse_expression(0)?;
            self.expect(&Token::RBracket, "`]`")?;
            let body = self.parse_stmts(&["endfor"])?;
            self.expect_keyword("endfor")?;
            return Ok(Stmt {
                line,
                kind: StmtKind::ForRange {
                    var: value,
                    from,
                    to,
                    body,
                },
            });
        }
        self.expect(&Token::LParen, "`(`")?;
        let expr = self.parse_expression(0)?;
        self.expect(&Token::RParen, "`)`")?;
        let body = self.parse_stmts(&["endfor"])?;
        self.expect_keyword("endfor")?;
        Ok(Stmt {
            line,
            kind: StmtKind::ForList {
                value,
                index,
                expr,
                body,
            },
        })
    }

    fn parse_fork(&mut self, line: usize) -> Result<Stmt, SyntaxError> {
        let var = if self.peek_plain_ident() {
            Some(self.ident()?.1)
        } else {
            None
        };
        self.expect(&Token::LParen, "`(`")?;
        let delay = self.parse_expression(0)?;
        self.expect(&Token::RParen, "`)`")?;
        let body = self.parse_stmts(&["endfork"])?;
        self.expect_keyword("endfork")?;
        Ok(Stmt {
            line,
            kind: StmtKind::Fork { var, delay, body },
        })
    }

    fn parse_try(&mut self, line: usize) -> Result<Stmt, SyntaxError> {
        let body = self.parse_stmts(&["except", "finally", "endtry"])?;
        let mut arms = Vec::new();
        while self.peek_keyword("except") {
            let arm_line = self.line();
            self.pos += 1;
            let var = if self.peek_plain_ident() {
                Some(self.ident()?.1)
            } else {
                None
            };
            self.expect(&Token::LParen, "`(`")?;
            let codes = self.parse_except_codes()?;
            self.expect(&Token::RParen, "`)`")?;
            let arm_body = self.parse_stmts(&["except", "finally", "endtry"])?;
            arms.push(ExceptArm {
                line: arm_line,
                var,
                codes,
                body: arm_body,
            });
        }
        let finally = if self.take_keyword("finally") {
            Some(self.parse_stmts(&["endtry"])?)
        } else {
            None
        };
        self.expect_keyword("endtry")?;
        let except = if arms.is_empty() {
            None
        } else {
            Some(StmtKind::TryExcept { body: body.clone(), arms })
        };
        match (except, finally) {
            (Some(kind), None) => Ok(Stmt { line, kind }),
            (None, Some(handler)) => Ok(Stmt {
                line,
                kind: StmtKind::TryFinally { body, handler },
            }),
            // except arms and a finally: the finally wraps the handled body
            (Some(kind), Some(handler)) => Ok(Stmt {
                line,
                kind: StmtKind::TryFinally {
                    body: vec![Stmt { line, kind }],
                    handler,
                },
            }),
            (None, None) => Err(SyntaxError::new(
                line,
                "`try` needs at least one `except` or a `finally`",
            )),
        }
    }

    fn parse_except_codes(&mut self) -> Result<ExceptCodes, SyntaxError> {
        if self.take_keyword("any") {
            return Ok(ExceptCodes::Any);
        }
        let mut codes = Vec::new();
        loop {
            match self.next()? {
                SpannedToken {
                    token: Token::ErrLit(e),
                    ..
                } => codes.push(e),
                tok => {
                    return Err(SyntaxError::new(
                        tok.line,
                        "expected an error code or `ANY`",
                    ));
                }
            }
            if !self.take_token(&Token::Comma) {
                return Ok(ExceptCodes::Codes(codes));
            }
        }
    }

    // ---- expressions ----

    fn parse_expression(&mut self, min_bp: u8) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let Some(tok) = self.peek_opt().cloned() else { break };
            let line = tok.line;
            match &tok.token {
                Token::Assign if min_bp <= 2 => {
                    self.pos += 1;
                    check_assign_target(&lhs)?;
                    let rhs = self.parse_expression(1)?;
                    lhs = Expr {
                        line,
                        kind: ExprKind::Assign {
                            target: Box::new(lhs),
                            value: Box::new(rhs),
                        },
                    };
                }
                Token::Question if min_bp <= 4 => {
                    self.pos += 1;
                    let yes = self.parse_expression(0)?;
                    self.expect(&Token::Pipe, "`|`")?;
                    let no = self.parse_expression(3)?;
                    lhs = Expr {
                        line,
                        kind: ExprKind::Cond {
                            cond: Box::new(lhs),
                            yes: Box::new(yes),
                            no: Box::new(no),
                        },
                    };
                }
                Token::OrOr if min_bp <= 5 => {
                    self.pos += 1;
                    let rhs = self.parse_expression(6)?;
                    lhs = Expr {
                        line,
                        kind: ExprKind::Or(Box::new(lhs), Box::new(rhs)),
                    };
                }
                Token::AndAnd if min_bp <= 7 => {
                    self.pos += 1;
                    let rhs = self.parse_expression(8)?;
                    lhs = Expr {
                        line,
                        kind: ExprKind::And(Box::new(lhs), Box::new(rhs)),
                    };
                }
                token => {
                    let Some((op, l_bp, r_bp)) = binary_op(token) else {
                        break;
                    };
                    if l_bp < min_bp {
                        break;
                    }
                    self.pos += 1;
                    let rhs = self.parse_expression(r_bp)?;
                    lhs = Expr {
                        line,
                        kind: ExprKind::Binary {
                            op,
                            left: Box::new(lhs),
                            right: Box::new(rhs),
                        },
                    };
                }
            }
        }
        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, SyntaxError> {
        let atom = self.parse_atom()?;
        self.parse_postfix(atom)
    }

    fn parse_atom(&mut self) -> Result<Expr, SyntaxError> {
        let tok = self.next()?;
        let line = tok.line;
        let kind = match tok.token {
            Token::Int(raw) => {
                let value = i64::try_from(raw).map_err(|_| {
                    SyntaxError::new(line, "integer literal out of range")
                })?;
                ExprKind::Literal(Var::Int(value))
            }
            Token::Float(f) => ExprKind::Literal(Var::Float(f)),
            Token::Str(s) => ExprKind::Literal(Var::str(s)),
            Token::ObjLit(id) => ExprKind::Literal(Var::Obj(Objid::new(id))),
            Token::ErrLit(e) => ExprKind::Literal(Var::Err(e)),
            Token::Ident(name) => {
                if name.eq_ignore_ascii_case("true") {
                    ExprKind::Literal(Var::Bool(true))
                } else if name.eq_ignore_ascii_case("false") {
                    ExprKind::Literal(Var::Bool(false))
                } else if is_keyword(&name) {
                    return Err(SyntaxError::new(
                        line,
                        format!("`{name}` is a reserved word"),
                    ));
                } else if self.take_token(&Token::LParen) {
                    let args = self.parse_arglist()?;
                    if name.eq_ignore_ascii_case("pass") {
                        ExprKind::Pass { args }
                    } else {
                        ExprKind::Call { func: name, args }
                    }
                } else {
                    ExprKind::Id(name)
                }
            }
            Token::Minus => {
                // fold a directly-negated numeric literal so MinInt64 has
                // a spelling
                enum Folded {
                    Int(u64),
                    Float(f64),
                    No,
                }
                let folded = match self.peek_opt() {
                    Some(SpannedToken {
                        token: Token::Int(raw),
                        ..
                    }) => Folded::Int(*raw),
                    Some(SpannedToken {
                        token: Token::Float(f),
                        ..
                    }) => Folded::Float(*f),
                    _ => Folded::No,
                };
                match folded {
                    Folded::Int(raw) => {
                        self.pos += 1;
                        let value =
                            i64::try_from(-(raw as i128)).map_err(|_| {
                                SyntaxError::new(
                                    line,
                                    "integer literal out of range",
                                )
                            })?;
                        ExprKind::Literal(Var::Int(value))
                    }
                    Folded::Float(f) => {
                        self.pos += 1;
                        ExprKind::Literal(Var::Float(-f))
                    }
                    Folded::No => {
                        let operand = self.parse_expression(25)?;
                        ExprKind::Unary {
                            op: UnaryOp::Neg,
                            operand: Box::new(operand),
                        }
                    }
                }
            }
            Token::Bang => {
                let operand = self.parse_expression(25)?;
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                }
            }
            Token::Tilde => {
                let operand = self.parse_expression(25)?;
                ExprKind::Unary {
                    op: UnaryOp::BitNot,
                    operand: Box::new(operand),
                }
            }
            Token::LParen => {
                let inner = self.parse_expression(0)?;
                self.expect(&Token::RParen, "`)`")?;
                inner.kind
            }
            Token::LBrace => return self.parse_braces(line),
            Token::LBracket => return self.parse_map_literal(line),
            Token::Dollar => {
                if self.peek_plain_ident() {
                    let (_, name) = self.ident()?;
                    ExprKind::SysProp(name)
                } else if self.index_depth > 0 {
                    ExprKind::LastMarker
                } else {
                    return Err(SyntaxError::new(
                        line,
                        "`$` is only valid inside an index",
                    ));
                }
            }
            Token::Caret => {
                if self.index_depth > 0 {
                    ExprKind::FirstMarker
                } else {
                    return Err(SyntaxError::new(
                        line,
                        "`^` is only valid inside an index",
                    ));
                }
            }
            Token::Backquote => return self.parse_catch(line),
            other => {
                return Err(SyntaxError::new(
                    line,
                    format!("unexpected `{other:?}`"),
                ));
            }
        };
        Ok(Expr { line, kind })
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, SyntaxError> {
        loop {
            let Some(tok) = self.peek_opt().cloned() else {
                return Ok(expr);
            };
            let line = tok.line;
            match tok.token {
                Token::Dot => {
                    self.pos += 1;
                    let name = self.parse_member_name()?;
                    expr = Expr {
                        line,
                        kind: ExprKind::Prop {
                            base: Box::new(expr),
                            name,
                        },
                    };
                }
                Token::Colon => {
                    self.pos += 1;
                    let name = self.parse_member_name()?;
                    self.expect(&Token::LParen, "`(`")?;
                    let args = self.parse_arglist()?;
                    expr = Expr {
                        line,
                        kind: ExprKind::Verb {
                            base: Box::new(expr),
                            name,
                            args,
                        },
                    };
                }
                Token::LBracket => {
                    self.pos += 1;
                    self.index_depth += 1;
                    let first = self.parse_expression(0)?;
                    let kind = if self.take_token(&Token::DotDot) {
                        let to = self.parse_expression(0)?;
                        ExprKind::RangeIndex {
                            base: Box::new(expr),
                            from: Box::new(first),
                            to: Box::new(to),
                        }
                    } else {
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(first),
                        }
                    };
                    self.index_depth -= 1;
                    self.expect(&Token::RBracket, "`]`")?;
                    expr = Expr { line, kind };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_member_name(&mut self) -> Result<PropName, SyntaxError> {
        if self.take_token(&Token::LParen) {
            let name = self.parse_expression(0)?;
            self.expect(&Token::RParen, "`)`")?;
            Ok(PropName::Dynamic(Box::new(name)))
        } else {
            let (_, name) = self.ident()?;
            Ok(PropName::Static(name))
        }
    }

    /// Argument list after a consumed `(`.
    fn parse_arglist(&mut self) -> Result<Vec<Arg>, SyntaxError> {
        let mut args = Vec::new();
        if self.take_token(&Token::RParen) {
            return Ok(args);
        }
        loop {
            if self.take_token(&Token::At) {
                args.push(Arg::Splice(self.parse_expression(0)?));
            } else {
                args.push(Arg::Normal(self.parse_expression(0)?));
            }
            if !self.take_token(&Token::Comma) {
                self.expect(&Token::RParen, "`)`")?;
                return Ok(args);
            }
        }
    }

    /// Brace expression after a consumed `{`: a list literal, an integer
    /// range list, or a scatter pattern when `= value` follows.
    fn parse_braces(&mut self, line: usize) -> Result<Expr, SyntaxError> {
        if self.take_token(&Token::RBrace) {
            return self.finish_braces(line, Vec::new());
        }
        let mut items = Vec::new();
        loop {
            if self.take_token(&Token::At) {
                items.push(BraceItem::Splice(self.parse_expression(0)?));
            } else if self.take_token(&Token::Question) {
                let (item_line, name) = self.ident()?;
                let default = if self.take_token(&Token::Assign) {
                    Some(self.parse_expression(3)?)
                } else {
                    None
                };
                items.push(BraceItem::Optional(item_line, name, default));
            } else {
                let first = self.parse_expression(0)?;
                if items.is_empty() && self.take_token(&Token::DotDot) {
                    let to = self.parse_expression(0)?;
                    self.expect(&Token::RBrace, "`}`")?;
                    return Ok(Expr {
                        line,
                        kind: ExprKind::RangeList {
                            from: Box::new(first),
                            to: Box::new(to),
                        },
                    });
                }
                items.push(BraceItem::Plain(first));
            }
            if !self.take_token(&Token::Comma) {
                self.expect(&Token::RBrace, "`}`")?;
                return self.finish_braces(line, items);
            }
        }
    }

    fn finish_braces(
        &mut self,
        line: usize,
        items: Vec<BraceItem>,
    ) -> Result<Expr, SyntaxError> {
        // `{...} =` (but not `==`) makes the braces a scatter pattern
        let is_scatter = matches!(
            self.peek_opt(),
            Some(SpannedToken {
                token: Token::Assign,
                ..
            })
        );
        if is_scatter {
            self.pos += 1;
            let targets = scatter_items(line, items)?;
            let value = self.parse_expression(1)?;
            return Ok(Expr {
                line,
                kind: ExprKind::Scatter {
                    items: targets,
                    value: Box::new(value),
                },
            });
        }
        let mut args = Vec::with_capacity(items.len());
        for item in items {
            match item {
                BraceItem::Plain(e) => args.push(Arg::Normal(e)),
                BraceItem::Splice(e) => args.push(Arg::Splice(e)),
                BraceItem::Optional(item_line, ..) => {
                    return Err(SyntaxError::new(
                        item_line,
                        "`?` targets are only valid in a scatter assignment",
                    ));
                }
            }
        }
        Ok(Expr {
            line,
            kind: ExprKind::List(args),
        })
    }

    /// `[a -> 1, "b" -> 2]` after a consumed `[`.
    fn parse_map_literal(&mut self, line: usize) -> Result<Expr, SyntaxError> {
        let mut pairs = Vec::new();
        if self.take_token(&Token::RBracket) {
            return Ok(Expr {
                line,
                kind: ExprKind::Map(pairs),
            });
        }
        loop {
            let key = self.parse_expression(0)?;
            self.expect(&Token::Arrow, "`->`")?;
            let value = self.parse_expression(0)?;
            pairs.push((key, value));
            if !self.take_token(&Token::Comma) {
                self.expect(&Token::RBracket, "`]`")?;
                return Ok(Expr {
                    line,
                    kind: ExprKind::Map(pairs),
                });
            }
        }
    }

    /// `` `expr ! codes => default' `` after a consumed backquote.
    fn parse_catch(&mut self, line: usize) -> Result<Expr, SyntaxError> {
        let expr = self.parse_expression(0)?;
        self.expect(&Token::Bang, "`!`")?;
        let codes = self.parse_except_codes()?;
        let default = if self.take_token(&Token::FatArrow) {
            Some(Box::new(self.parse_expression(0)?))
        } else {
            None
        };
        self.expect(&Token::Quote, "`'`")?;
        let expr = Expr {
            line,
            kind: ExprKind::Catch {
                expr: Box::new(expr),
                codes,
                default,
            },
        };
        self.parse_postfix(expr)
    }
}

fn scatter_items(
    line: usize,
    items: Vec<BraceItem>,
) -> Result<Vec<ScatterItem>, SyntaxError> {
    let mut out = Vec::with_capacity(items.len());
    let mut have_rest = false;
    for item in items {
        match item {
            BraceItem::Plain(Expr {
                kind: ExprKind::Id(name),
                ..
            }) => out.push(ScatterItem {
                name,
                kind: ScatterKind::Required,
            }),
            BraceItem::Splice(Expr {
                kind: ExprKind::Id(name),
                line: item_line,
            }) => {
                if have_rest {
                    return Err(SyntaxError::new(
                        item_line,
                        "only one `@` target is allowed",
                    ));
                }
                have_rest = true;
                out.push(ScatterItem {
                    name,
                    kind: ScatterKind::Rest,
                });
            }
            BraceItem::Optional(_, name, default) => out.push(ScatterItem {
                name,
                kind: ScatterKind::Optional(default),
            }),
            BraceItem::Plain(e) | BraceItem::Splice(e) => {
                return Err(SyntaxError::new(
                    e.line,
                    "scatter targets must be variables",
                ));
            }
        }
    }
    if out.is_empty() {
        return Err(SyntaxError::new(line, "empty scatter pattern"));
    }
    Ok(out)
}

fn check_assign_target(expr: &Expr) -> Result<(), SyntaxError> {
    match &expr.kind {
        ExprKind::Id(_)
        | ExprKind::SysProp(_)
        | ExprKind::Prop { .. }
        | ExprKind::Index { .. }
        | ExprKind::RangeIndex { .. } => Ok(()),
        _ => Err(SyntaxError::new(expr.line, "invalid assignment target")),
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8, u8)> {
    Some(match token {
        Token::EqEq => (BinaryOp::Eq, 9, 10),
        Token::NotEq => (BinaryOp::Ne, 9, 10),
        Token::Less => (BinaryOp::Lt, 9, 10),
        Token::LessEq => (BinaryOp::Le, 9, 10),
        Token::Greater => (BinaryOp::Gt, 9, 10),
        Token::GreaterEq => (BinaryOp::Ge, 9, 10),
        Token::Ident(name) if name.eq_ignore_ascii_case("in") => {
            (BinaryOp::In, 9, 10)
        }
        Token::PipeDot => (BinaryOp::BitOr, 11, 12),
        Token::CaretDot => (BinaryOp::BitXor, 13, 14),
        Token::AmpDot => (BinaryOp::BitAnd, 15, 16),
        Token::ShiftLeft => (BinaryOp::Shl, 17, 18),
        Token::ShiftRight => (BinaryOp::Shr, 17, 18),
        Token::Plus => (BinaryOp::Add, 19, 20),
        Token::Minus => (BinaryOp::Sub, 19, 20),
        Token::Star => (BinaryOp::Mul, 21, 22),
        Token::Slash => (BinaryOp::Div, 21, 22),
        Token::Percent => (BinaryOp::Mod, 21, 22),
        Token::Caret => (BinaryOp::Pow, 24, 23),
        _ => return None,
    })
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS
        .iter()
        .any(|kw| kw.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_stmt(src: &str) -> Stmt {
        let mut stmts = parse_program(src).unwrap();
        assert_eq!(stmts.len(), 1, "expected one statement in {src:?}");
        stmts.remove(0)
    }

    #[test]
    fn precedence_shapes() {
        let stmt = one_stmt("x = 1 + 2 * 3;");
        let StmtKind::Expr(expr) = stmt.kind else { panic!() };
        let ExprKind::Assign { value, .. } = expr.kind else { panic!() };
        let ExprKind::Binary { op, right, .. } = value.kind else { panic!() };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn power_is_right_associative() {
        let stmt = one_stmt("return 2 ^ 3 ^ 2;");
        let StmtKind::Return(Some(expr)) = stmt.kind else { panic!() };
        let ExprKind::Binary { op, right, .. } = expr.kind else { panic!() };
        assert_eq!(op, BinaryOp::Pow);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Pow,
                ..
            }
        ));
    }

    #[test]
    fn scatter_pattern() {
        let stmt = one_stmt("{a, ?b = 7, @r} = {1, 2};");
        let StmtKind::Expr(expr) = stmt.kind else { panic!() };
        let ExprKind::Scatter { items, .. } = expr.kind else { panic!() };
        assert_eq!(items.len(), 3);
        assert!(matches!(items[0].kind, ScatterKind::Required));
        assert!(matches!(items[1].kind, ScatterKind::Optional(Some(_))));
        assert!(matches!(items[2].kind, ScatterKind::Rest));
    }

    #[test]
    fn optionals_outside_scatter_are_rejected() {
        assert!(parse_program("x = {?a};").is_err());
    }

    #[test]
    fn markers_only_inside_indexes() {
        assert!(parse_program("return l[$];").is_ok());
        assert!(parse_program("return l[^ + 1];").is_ok());
        assert!(parse_program("return $;").is_err());
    }

    #[test]
    fn sysprop_shorthand() {
        let stmt = one_stmt("return $foo;");
        let StmtKind::Return(Some(expr)) = stmt.kind else { panic!() };
        assert!(matches!(expr.kind, ExprKind::SysProp(ref n) if n == "foo"));
    }

    #[test]
    fn catch_expression() {
        let stmt = one_stmt("return `1 / 0 ! E_DIV => 99';");
        let StmtKind::Return(Some(expr)) = stmt.kind else { panic!() };
        let ExprKind::Catch { codes, default, .. } = expr.kind else {
            panic!()
        };
        assert_eq!(codes, ExceptCodes::Codes(vec![crate::values::Error::E_DIV]));
        assert!(default.is_some());
    }

    #[test]
    fn try_except_finally_combination_nests() {
        let stmt = one_stmt(
            "try x = 1; except (ANY) x = 2; finally x = 3; endtry",
        );
        let StmtKind::TryFinally { body, .. } = stmt.kind else { panic!() };
        assert!(matches!(body[0].kind, StmtKind::TryExcept { .. }));
    }

    #[test]
    fn for_range_and_list() {
        assert!(parse_program("for x in [1..10] endfor").is_ok());
        assert!(parse_program("for v, k in (m) endfor").is_ok());
        assert!(parse_program("for v, k in [1..2] endfor").is_err());
    }

    #[test]
    fn min_int_literal() {
        let stmt = one_stmt("return -9223372036854775808;");
        let StmtKind::Return(Some(expr)) = stmt.kind else { panic!() };
        assert!(matches!(
            expr.kind,
            ExprKind::Literal(Var::Int(i64::MIN))
        ));
    }

    #[test]
    fn literal_round_trip_reader() {
        assert_eq!(parse_literal("42").unwrap(), Var::Int(42));
        assert_eq!(parse_literal("-1.5").unwrap(), Var::Float(-1.5));
        assert_eq!(parse_literal("#7").unwrap(), Var::Obj(Objid::new(7)));
        assert_eq!(
            parse_literal("\"hi\"").unwrap(),
            Var::str("hi")
        );
        assert!(parse_literal("{1}").is_err());
    }
}
