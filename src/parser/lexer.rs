use core::str::FromStr;

use logos::{Lexer, Logos};

use crate::parser::errors::SyntaxError;
use crate::values::Error;

fn unescape_string(lex: &mut Lexer<Token>) -> String {
    let raw = &lex.slice()[1..lex.slice().len() - 1];
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_err_literal(lex: &mut Lexer<Token>) -> Option<Error> {
    Error::from_str(lex.slice()).ok()
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    Int(u64),
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r#""([^"\\\n]|\\.)*""#, unescape_string)]
    Str(String),
    #[regex(r"#-?[0-9]+", |lex| lex.slice()[1..].parse::<i64>().ok())]
    ObjLit(i64),
    #[regex(r"E_[A-Z]+", parse_err_literal, priority = 5)]
    ErrLit(Error),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // multi-character operators
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("|.")]
    PipeDot,
    #[token("&.")]
    AmpDot,
    #[token("^.")]
    CaretDot,
    #[token("<<")]
    ShiftLeft,
    #[token(">>")]
    ShiftRight,
    #[token("..")]
    DotDot,
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,

    // single-character operators and delimiters
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("?")]
    Question,
    #[token("|")]
    Pipe,
    #[token("=")]
    Assign,
    #[token("@")]
    At,
    #[token("$")]
    Dollar,
    #[token("`")]
    Backquote,
    #[token("'")]
    Quote,
    #[token(".")]
    Dot,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
}

/// Tokenize a whole source, tagging each token with its 1-based line.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, SyntaxError> {
    let line_starts = line_starts(source);
    let mut out = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let line = line_of(&line_starts, lexer.span().start);
        match result {
            Ok(token) => out.push(SpannedToken { token, line }),
            Err(()) => {
                return Err(SyntaxError::new(
                    line,
                    format!("invalid token `{}`", lexer.slice()),
                ));
            }
        }
    }
    Ok(out)
}

fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (offset, byte) in source.bytes().enumerate() {
        if byte == b'\n' {
            starts.push(offset + 1);
        }
    }
    starts
}

fn line_of(starts: &[usize], offset: usize) -> usize {
    starts.partition_point(|&s| s <= offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn numbers_and_ranges() {
        assert_eq!(
            kinds("1..5"),
            vec![Token::Int(1), Token::DotDot, Token::Int(5)]
        );
        assert_eq!(kinds("1.5"), vec![Token::Float(1.5)]);
        assert_eq!(kinds("2e3"), vec![Token::Float(2000.0)]);
    }

    #[test]
    fn strings_unescape() {
        assert_eq!(
            kinds(r#""a\"b\\c""#),
            vec![Token::Str("a\"b\\c".to_string())]
        );
    }

    #[test]
    fn object_and_error_literals() {
        assert_eq!(kinds("#-1"), vec![Token::ObjLit(-1)]);
        assert_eq!(kinds("E_TYPE"), vec![Token::ErrLit(Error::E_TYPE)]);
        assert!(tokenize("E_NOPE").is_err());
    }

    #[test]
    fn operator_maximal_munch() {
        assert_eq!(
            kinds("a |. b || c | d"),
            vec![
                Token::Ident("a".into()),
                Token::PipeDot,
                Token::Ident("b".into()),
                Token::OrOr,
                Token::Ident("c".into()),
                Token::Pipe,
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn lines_are_tracked() {
        let toks = tokenize("x;\ny;").unwrap();
        assert_eq!(toks[0].line, 1);
        assert_eq!(toks[2].line, 2);
    }
}
