mod raw_token;
pub mod token;

use logos::{Lexer as LogosLexer, Logos};
use raw_token::RawToken;
use std::ops::Range;
pub use token::Token;

pub struct Lexer<'source> {
    inner: LogosLexer<'source, RawToken>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Lexer {
            inner: RawToken::lexer(source),
        }
    }

    pub fn next_token(&mut self) -> Token {
        let (tok, _) = self.next_token_with_span();
        tok
    }

    pub fn next_token_with_span(&mut self) -> (Token, Range<usize>) {
        match self.inner.next() {
            Some(Ok(raw_token)) => {
                let span = self.inner.span();
                (Self::convert_token(raw_token), span)
            }
            Some(Err(_)) => {
                let span = self.inner.span();
                let msg = format!("Invalid token '{}'", self.inner.slice());
                (Token::Error(msg, span.clone()), span)
            }
            None => {
                let pos = self.inner.span().end;
                (Token::Eof, pos..pos)
            }
        }
    }

    fn convert_token(raw: RawToken) -> Token {
        match raw {
            RawToken::Let => Token::Let,
            RawToken::Func => Token::Func,
            RawToken::If => Token::If,
            RawToken::Then => Token::Then,
            RawToken::Elseif => Token::Elseif,
            RawToken::Else => Token::Else,
            RawToken::End => Token::End,
            RawToken::While => Token::While,
            RawToken::For => Token::For,
            RawToken::In => Token::In,
            RawToken::Do => Token::Do,
            RawToken::Return => Token::Return,
            RawToken::Break => Token::Break,
            RawToken::And => Token::And,
            RawToken::Or => Token::Or,
            RawToken::Not => Token::Not,

            RawToken::Nil => Token::Nil,
            RawToken::Bool(b) => Token::Bool(b),
            RawToken::Number(n) => Token::Number(n),
            RawToken::Str(s) => Token::Str(s),
            RawToken::Identifier(name) => Token::Identifier(name),

            RawToken::Plus => Token::Plus,
            RawToken::Minus => Token::Minus,
            RawToken::Star => Token::Star,
            RawToken::Slash => Token::Slash,
            RawToken::EqualEqual => Token::EqualEqual,
            RawToken::NotEqual => Token::NotEqual,
            RawToken::Less => Token::Less,
            RawToken::LessEqual => Token::LessEqual,
            RawToken::Greater => Token::Greater,
            RawToken::GreaterEqual => Token::GreaterEqual,
            RawToken::Equal => Token::Equal,
            RawToken::LParen => Token::LParen,
            RawToken::RParen => Token::RParen,
            RawToken::LBracket => Token::LBracket,
            RawToken::RBracket => Token::RBracket,
            RawToken::LBrace => Token::LBrace,
            RawToken::RBrace => Token::RBrace,
            RawToken::Colon => Token::Colon,
            RawToken::Comma => Token::Comma,
            RawToken::Semicolon => Token::Semicolon,

            RawToken::Newline => Token::Newline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            if token == Token::Eof {
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    #[test]
    fn test_let_statement() {
        let tokens = collect_tokens("let x = 1 + 2\n");
        assert_eq!(
            tokens,
            vec![
                Token::Let,
                Token::Identifier("x".to_string()),
                Token::Equal,
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.0),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn test_function_definition() {
        let tokens = collect_tokens("func add(a, b) return a + b end");
        assert_eq!(
            tokens,
            vec![
                Token::Func,
                Token::Identifier("add".to_string()),
                Token::LParen,
                Token::Identifier("a".to_string()),
                Token::Comma,
                Token::Identifier("b".to_string()),
                Token::RParen,
                Token::Return,
                Token::Identifier("a".to_string()),
                Token::Plus,
                Token::Identifier("b".to_string()),
                Token::End,
            ]
        );
    }

    #[test]
    fn test_keywords_vs_identifiers() {
        let tokens = collect_tokens("iff lets ender");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("iff".to_string()),
                Token::Identifier("lets".to_string()),
                Token::Identifier("ender".to_string()),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = collect_tokens(r#""a\nb\t\"c\\""#);
        assert_eq!(tokens, vec![Token::Str("a\nb\t\"c\\".to_string())]);
    }

    #[test]
    fn test_number_forms() {
        let tokens = collect_tokens("0 42 3.14");
        assert_eq!(
            tokens,
            vec![Token::Number(0.0), Token::Number(42.0), Token::Number(3.14)]
        );
    }

    #[test]
    fn test_comparison_operators() {
        let tokens = collect_tokens("== != <= >= < > =");
        assert_eq!(
            tokens,
            vec![
                Token::EqualEqual,
                Token::NotEqual,
                Token::LessEqual,
                Token::GreaterEqual,
                Token::Less,
                Token::Greater,
                Token::Equal,
            ]
        );
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = collect_tokens("let x = 1 # trailing comment\n# full line\nx");
        assert_eq!(
            tokens,
            vec![
                Token::Let,
                Token::Identifier("x".to_string()),
                Token::Equal,
                Token::Number(1.0),
                Token::Newline,
                Token::Newline,
                Token::Identifier("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_bool_and_nil_literals() {
        let tokens = collect_tokens("true false nil");
        assert_eq!(
            tokens,
            vec![Token::Bool(true), Token::Bool(false), Token::Nil]
        );
    }

    #[test]
    fn test_invalid_token() {
        let tokens = collect_tokens("let x = @");
        assert!(matches!(tokens.last(), Some(Token::Error(_, _))));
    }
}
