use std::fmt::Display;
use std::ops::Range;

use logos::Logos;

/// Character classes of the template grammar. Every character of the input
/// becomes exactly one token, so token spans double as cursor positions.
#[derive(Debug, Logos, PartialEq, Eq, Clone, Copy)]
pub enum Token {
    // Escape delimiter
    #[token("`")]
    Backtick,

    // Delimiters
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[regex(r"[^`,()]")]
    Char,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Backtick => write!(f, "`"),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Char => write!(f, "<char>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    pub span: Range<usize>,
}

pub struct Lexer<'a> {
    inner: logos::SpannedIter<'a, Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: Token::lexer(input).spanned(),
        }
    }

    pub fn collect_lexemes(self) -> Vec<Lexeme> {
        self.collect()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Lexeme;

    fn next(&mut self) -> Option<Self::Item> {
        // The grammar has no invalid input; anything unexpected is literal text.
        self.inner.next().map(|(result, span)| Lexeme {
            token: result.unwrap_or(Token::Char),
            span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer() {
        let lexemes = Lexer::new("A(`b`,c)").collect_lexemes();
        let tokens: Vec<Token> = lexemes.iter().map(|l| l.token).collect();

        assert_eq!(
            tokens,
            vec![
                Token::Char,
                Token::LParen,
                Token::Backtick,
                Token::Char,
                Token::Backtick,
                Token::Comma,
                Token::Char,
                Token::RParen,
            ]
        );
        assert_eq!(lexemes[7].span, 7..8);
    }

    #[test]
    fn test_multibyte_chars_keep_byte_spans() {
        let lexemes = Lexer::new("é,\n").collect_lexemes();

        assert_eq!(lexemes.len(), 3);
        assert_eq!(lexemes[0].span, 0..2);
        assert_eq!(lexemes[1].token, Token::Comma);
        assert_eq!(lexemes[2].token, Token::Char);
        assert_eq!(lexemes[2].span, 3..4);
    }
}
