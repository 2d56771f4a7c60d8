//! Pingclairfile lexer.
//!
//! Turns raw configuration text into a flat token sequence. The grammar is
//! newline-oriented: a directive ends at a newline, a `;`, or the closing
//! brace of its block, so newlines are real tokens here rather than skipped
//! whitespace. Comments start with `#` at a token boundary and run to end of
//! line. `{$NAME}` / `{$NAME:default}` words are captured whole as
//! environment templates; substitution is deferred to semantic analysis so
//! unset variables can be reported with full source context.

use std::fmt;

use thiserror::Error;

use crate::config::error::Span;

/// What went wrong while tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnexpectedChar(char),
    UnterminatedString,
    UnterminatedTemplate,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LexErrorKind::UnexpectedChar(c) => {
                write!(f, "unexpected character '{c}' ({})", self.span)
            }
            LexErrorKind::UnterminatedString => {
                write!(f, "unterminated string literal ({})", self.span)
            }
            LexErrorKind::UnterminatedTemplate => {
                write!(f, "unterminated environment template ({})", self.span)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: identifiers, addresses, paths, globs, numbers.
    Word(String),
    /// Quoted string with escapes already resolved.
    Str(String),
    /// `{$NAME}` or `{$NAME:default}` environment template.
    Env {
        name: String,
        default: Option<String>,
    },
    /// `@name` named-matcher reference or definition.
    MatcherName(String),
    /// `name!` macro reference (definition or invocation).
    MacroName(String),
    /// `=>` route-arm separator.
    Arrow,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Semi,
    Newline,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(w) => write!(f, "'{w}'"),
            TokenKind::Str(_) => write!(f, "string"),
            TokenKind::Env { name, .. } => write!(f, "{{${name}}}"),
            TokenKind::MatcherName(n) => write!(f, "'@{n}'"),
            TokenKind::MacroName(n) => write!(f, "'{n}!'"),
            TokenKind::Arrow => write!(f, "'=>'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Semi => write!(f, "';'"),
            TokenKind::Newline => write!(f, "newline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Tokenize a complete Pingclairfile source string.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

/// Characters that end a bare word.
fn is_word_break(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '(' | ')' | ',' | ';' | '#' | '"')
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(c) = self.peek() {
            let span = self.span();
            match c {
                '\n' => {
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::Newline,
                        span,
                    });
                }
                '\r' | ' ' | '\t' => {
                    self.bump();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '"' => {
                    let s = self.read_string(span)?;
                    tokens.push(Token {
                        kind: TokenKind::Str(s),
                        span,
                    });
                }
                '{' => {
                    if self.peek_at(1) == Some('$') {
                        let kind = self.read_template(span)?;
                        tokens.push(Token { kind, span });
                    } else {
                        self.bump();
                        tokens.push(Token {
                            kind: TokenKind::LBrace,
                            span,
                        });
                    }
                }
                '}' => {
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::RBrace,
                        span,
                    });
                }
                '(' => {
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::LParen,
                        span,
                    });
                }
                ')' => {
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::RParen,
                        span,
                    });
                }
                ',' => {
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::Comma,
                        span,
                    });
                }
                ';' => {
                    self.bump();
                    tokens.push(Token {
                        kind: TokenKind::Semi,
                        span,
                    });
                }
                _ => {
                    let kind = self.read_word();
                    tokens.push(Token { kind, span });
                }
            }
        }

        Ok(tokens)
    }

    fn read_word(&mut self) -> TokenKind {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_word_break(c) {
                break;
            }
            word.push(c);
            self.bump();
        }

        if word == "=>" {
            TokenKind::Arrow
        } else if let Some(name) = word.strip_prefix('@') {
            if name.is_empty() {
                TokenKind::Word(word)
            } else {
                TokenKind::MatcherName(name.to_string())
            }
        } else if let Some(name) = word.strip_suffix('!') {
            if name.is_empty() {
                TokenKind::Word(word)
            } else {
                TokenKind::MacroName(name.to_string())
            }
        } else {
            TokenKind::Word(word)
        }
    }

    fn read_string(&mut self, start: Span) -> Result<String, LexError> {
        self.bump(); // opening quote
        let mut out = String::new();

        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        // Unknown escapes pass through verbatim.
                        out.push('\\');
                        out.push(other);
                    }
                    None => {
                        return Err(LexError {
                            kind: LexErrorKind::UnterminatedString,
                            span: start,
                        });
                    }
                },
                Some('\n') | None => {
                    return Err(LexError {
                        kind: LexErrorKind::UnterminatedString,
                        span: start,
                    });
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn read_template(&mut self, start: Span) -> Result<TokenKind, LexError> {
        self.bump(); // '{'
        self.bump(); // '$'

        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if name.is_empty() {
            let c = self.peek().unwrap_or('}');
            return Err(LexError {
                kind: LexErrorKind::UnexpectedChar(c),
                span: self.span(),
            });
        }

        match self.peek() {
            Some('}') => {
                self.bump();
                Ok(TokenKind::Env {
                    name,
                    default: None,
                })
            }
            Some(':') => {
                self.bump();
                let mut default = String::new();
                loop {
                    match self.peek() {
                        Some('}') => {
                            self.bump();
                            return Ok(TokenKind::Env {
                                name,
                                default: Some(default),
                            });
                        }
                        Some('\n') | None => {
                            return Err(LexError {
                                kind: LexErrorKind::UnterminatedTemplate,
                                span: start,
                            });
                        }
                        Some(c) => {
                            default.push(c);
                            self.bump();
                        }
                    }
                }
            }
            Some(c) => Err(LexError {
                kind: LexErrorKind::UnexpectedChar(c),
                span: self.span(),
            }),
            None => Err(LexError {
                kind: LexErrorKind::UnterminatedTemplate,
                span: start,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn words_and_punctuation() {
        let toks = kinds("reverse_proxy http://10.0.0.1:3000 { }");
        assert_eq!(
            toks,
            vec![
                TokenKind::Word("reverse_proxy".into()),
                TokenKind::Word("http://10.0.0.1:3000".into()),
                TokenKind::LBrace,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn newline_is_a_token() {
        let toks = kinds("respond 404\nrespond 500");
        assert!(toks.contains(&TokenKind::Newline));
        assert_eq!(toks.len(), 5);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let toks = kinds("respond 404 # not found\nencode gzip");
        assert_eq!(
            toks,
            vec![
                TokenKind::Word("respond".into()),
                TokenKind::Word("404".into()),
                TokenKind::Newline,
                TokenKind::Word("encode".into()),
                TokenKind::Word("gzip".into()),
            ]
        );
    }

    #[test]
    fn quoted_strings_unescape() {
        let toks = kinds(r#"respond "not\nfound" 404"#);
        assert_eq!(toks[1], TokenKind::Str("not\nfound".into()));
    }

    #[test]
    fn unterminated_string_fails() {
        let err = tokenize("respond \"oops\n").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
    }

    #[test]
    fn matcher_and_macro_sigils() {
        let toks = kinds("handle @api\nuse security!");
        assert_eq!(toks[1], TokenKind::MatcherName("api".into()));
        assert_eq!(toks[4], TokenKind::MacroName("security".into()));
    }

    #[test]
    fn arrow_token() {
        let toks = kinds("@api => {");
        assert_eq!(toks[1], TokenKind::Arrow);
    }

    #[test]
    fn env_template_without_default() {
        let toks = kinds("listen {$LISTEN_ADDR}");
        assert_eq!(
            toks[1],
            TokenKind::Env {
                name: "LISTEN_ADDR".into(),
                default: None
            }
        );
    }

    #[test]
    fn env_template_with_default() {
        let toks = kinds("file_server {$WEB_ROOT:/var/www}");
        assert_eq!(
            toks[1],
            TokenKind::Env {
                name: "WEB_ROOT".into(),
                default: Some("/var/www".into())
            }
        );
    }

    #[test]
    fn unterminated_template_fails() {
        let err = tokenize("listen {$PORT").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedTemplate);
    }

    #[test]
    fn spans_track_lines_and_columns() {
        let toks = tokenize("a\n  b").unwrap();
        assert_eq!(toks[0].span, Span::new(1, 1));
        assert_eq!(toks[2].span, Span::new(2, 3));
    }
}
