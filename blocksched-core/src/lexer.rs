//! Lexer for block listing sources.

use crate::error::CoreError;

/// Kind of a token produced by the lexer.
///
/// The lexer only recognizes keywords, labels and literals; the parser
/// decides what a sequence of them means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Identifiers and literals
    Ident(String),
    /// `bbN` block label, carrying `N`.
    Label(usize),
    Int(u64),

    // Punctuation
    LBrace, // {
    RBrace, // }
    Colon,  // :
    Comma,  // ,

    // Keywords
    Fn,
    Defer,
    Jump,
    Return,

    Eof,
}

impl TokenKind {
    /// Short description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Label(index) => format!("label `bb{index}`"),
            TokenKind::Int(value) => format!("integer `{value}`"),
            TokenKind::LBrace => "`{`".to_string(),
            TokenKind::RBrace => "`}`".to_string(),
            TokenKind::Colon => "`:`".to_string(),
            TokenKind::Comma => "`,`".to_string(),
            TokenKind::Fn => "`fn`".to_string(),
            TokenKind::Defer => "`defer`".to_string(),
            TokenKind::Jump => "`jump`".to_string(),
            TokenKind::Return => "`return`".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

/// A single token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Lex a source string into tokens, always ending with [`TokenKind::Eof`].
pub fn lex(source: &str) -> Result<Vec<Token>, CoreError> {
    let mut lexer = Lexer {
        source,
        chars: source.as_bytes(),
        index: 0,
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    index: usize,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }

            let start = self.index;
            let kind = match ch {
                b'#' => {
                    self.skip_line();
                    continue;
                }
                b'/' if self.peek_next() == Some(b'/') => {
                    self.skip_line();
                    continue;
                }
                b'{' => {
                    self.consume_char();
                    TokenKind::LBrace
                }
                b'}' => {
                    self.consume_char();
                    TokenKind::RBrace
                }
                b':' => {
                    self.consume_char();
                    TokenKind::Colon
                }
                b',' => {
                    self.consume_char();
                    TokenKind::Comma
                }
                b'0'..=b'9' => self.lex_number(start)?,
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(start)?,
                _ => {
                    return Err(CoreError::LexError {
                        position: start,
                        message: format!("unexpected character {:?}", ch as char),
                    });
                }
            };
            tokens.push(Token {
                kind,
                position: start,
            });
        }

        tokens.push(Token {
            kind: TokenKind::Eof,
            position: self.chars.len(),
        });
        Ok(tokens)
    }

    fn lex_number(&mut self, start: usize) -> Result<TokenKind, CoreError> {
        while let Some(ch) = self.peek_char() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.consume_char();
            } else {
                break;
            }
        }

        let digits: String = self.source[start..self.index]
            .chars()
            .filter(|ch| *ch != '_')
            .collect();
        digits
            .parse::<u64>()
            .map(TokenKind::Int)
            .map_err(|_| CoreError::LexError {
                position: start,
                message: format!("integer literal `{digits}` is out of range"),
            })
    }

    fn lex_ident_or_keyword(&mut self, start: usize) -> Result<TokenKind, CoreError> {
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.index];
        let kind = match text {
            "fn" => TokenKind::Fn,
            "defer" => TokenKind::Defer,
            "jump" => TokenKind::Jump,
            "return" => TokenKind::Return,
            _ => match label_index(text) {
                Some(digits) => {
                    let index = digits.parse::<usize>().map_err(|_| CoreError::LexError {
                        position: start,
                        message: format!("block label `{text}` is out of range"),
                    })?;
                    TokenKind::Label(index)
                }
                None => TokenKind::Ident(text.to_string()),
            },
        };
        Ok(kind)
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.chars.len() {
            self.index += 1;
        }
    }
}

/// Digits of a `bbN` label, if `text` is one.
fn label_index(text: &str) -> Option<&str> {
    let digits = text.strip_prefix("bb")?;
    if !digits.is_empty() && digits.bytes().all(|ch| ch.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_block_header_and_terminator() {
        assert_eq!(
            kinds("bb0: defer 1_000 jump bb1, bb12"),
            vec![
                TokenKind::Label(0),
                TokenKind::Colon,
                TokenKind::Defer,
                TokenKind::Int(1000),
                TokenKind::Jump,
                TokenKind::Label(1),
                TokenKind::Comma,
                TokenKind::Label(12),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn labels_need_digits() {
        assert_eq!(
            kinds("bb bbx bb3y"),
            vec![
                TokenKind::Ident("bb".to_string()),
                TokenKind::Ident("bbx".to_string()),
                TokenKind::Ident("bb3y".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_both_comment_styles() {
        let tokens = lex("# header\nfn f { // trailing\n}").expect("lex");
        assert_eq!(tokens[0].kind, TokenKind::Fn);
        assert_eq!(tokens[0].position, 9);
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn reports_position_of_unexpected_character() {
        let err = lex("fn f { @ }").unwrap_err();
        assert!(matches!(err, CoreError::LexError { position: 7, .. }));
    }
}
