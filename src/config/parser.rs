//! Pingclairfile parser.
//!
//! Recursive descent over the token stream, producing one [`Document`].
//! This stage is purely syntactic: matcher names are not resolved, macros
//! are not expanded, and directive arguments are not typed or validated.
//! All of that is deferred so syntax errors are reported independently of
//! semantic ones.

use std::fmt;

use thiserror::Error;

use crate::config::{
    ast::{
        Arg, ArgValue, DirectiveItem, DirectiveNode, Document, HandleBlock, MacroDef,
        MacroInvocation, MatcherDef, MatcherRef, RouteArm, RouteBlock, ServerBlock, ServerItem,
    },
    error::Span,
    lexer::{Token, TokenKind},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub struct ParseError {
    pub span: Span,
    pub expected: String,
    pub found: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {}, found {} ({})",
            self.expected, self.found, self.span
        )
    }
}

/// Parse a token stream into a raw [`Document`].
pub fn parse(tokens: &[Token]) -> Result<Document, ParseError> {
    Parser { tokens, pos: 0 }.document()
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Skip newline and `;` terminators.
    fn skip_breaks(&mut self) {
        while matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Newline | TokenKind::Semi)
        ) {
            self.pos += 1;
        }
    }

    fn here(&self) -> Span {
        self.peek()
            .map(|t| t.span)
            .or_else(|| self.tokens.last().map(|t| t.span))
            .unwrap_or_default()
    }

    fn err(&self, expected: impl Into<String>) -> ParseError {
        let (span, found) = match self.peek() {
            Some(tok) => (tok.span, tok.kind.to_string()),
            None => (self.here(), "end of file".to_string()),
        };
        ParseError {
            span,
            expected: expected.into(),
            found,
        }
    }

    fn expect_lbrace(&mut self) -> Result<(), ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::LBrace) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.err("'{'")),
        }
    }

    fn document(&mut self) -> Result<Document, ParseError> {
        let mut doc = Document::default();
        let mut first_item = true;

        loop {
            self.skip_breaks();
            let Some(tok) = self.peek() else { break };

            match &tok.kind {
                TokenKind::LBrace if first_item => {
                    self.pos += 1;
                    doc.options = self.directive_list()?;
                }
                TokenKind::LBrace => return Err(self.err("a top-level item")),
                TokenKind::Word(w) if w == "macro" => {
                    doc.macros.push(self.macro_def()?);
                }
                TokenKind::Word(w) if w == "server" => {
                    doc.servers.push(self.named_server()?);
                }
                TokenKind::Word(_) | TokenKind::Str(_) | TokenKind::Env { .. } => {
                    doc.servers.push(self.address_server()?);
                }
                _ => return Err(self.err("a top-level item")),
            }
            first_item = false;
        }

        Ok(doc)
    }

    /// `{` already consumed; parses generic directives until the matching `}`.
    fn directive_list(&mut self) -> Result<Vec<DirectiveNode>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_breaks();
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::RBrace) => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(_) => out.push(self.directive()?),
                None => return Err(self.err("'}'")),
            }
        }
    }

    fn directive(&mut self) -> Result<DirectiveNode, ParseError> {
        let (name, span) = match self.peek() {
            Some(Token {
                kind: TokenKind::Word(w),
                span,
            }) => (w.clone(), *span),
            _ => return Err(self.err("a directive name")),
        };
        self.pos += 1;

        let mut node = DirectiveNode {
            name,
            args: Vec::new(),
            block: None,
            span,
        };

        loop {
            match self.peek().map(|t| (&t.kind, t.span)) {
                Some((TokenKind::Word(w), span)) => {
                    node.args.push(Arg::word(w.clone(), span));
                    self.pos += 1;
                }
                Some((TokenKind::Str(s), span)) => {
                    node.args.push(Arg {
                        value: ArgValue::Str(s.clone()),
                        span,
                    });
                    self.pos += 1;
                }
                Some((TokenKind::Env { name, default }, span)) => {
                    node.args.push(Arg {
                        value: ArgValue::Env {
                            name: name.clone(),
                            default: default.clone(),
                        },
                        span,
                    });
                    self.pos += 1;
                }
                Some((TokenKind::LBrace, _)) => {
                    self.pos += 1;
                    node.block = Some(self.directive_list()?);
                    break;
                }
                Some((TokenKind::Newline | TokenKind::Semi, _)) => {
                    self.pos += 1;
                    break;
                }
                Some((TokenKind::RBrace, _)) | None => break,
                Some(_) => return Err(self.err("an argument or end of directive")),
            }
        }

        Ok(node)
    }

    fn directive_item(&mut self) -> Result<DirectiveItem, ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Word(w)) if w == "use" => Ok(DirectiveItem::Invoke(self.invocation()?)),
            _ => Ok(DirectiveItem::Plain(self.directive()?)),
        }
    }

    /// Directive items (plain or `use name!(...)`) until the closing `}`.
    fn item_list(&mut self) -> Result<Vec<DirectiveItem>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_breaks();
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::RBrace) => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(_) => out.push(self.directive_item()?),
                None => return Err(self.err("'}'")),
            }
        }
    }

    fn invocation(&mut self) -> Result<MacroInvocation, ParseError> {
        let use_span = self.here();
        self.pos += 1; // `use`

        let name = match self.peek() {
            Some(Token {
                kind: TokenKind::MacroName(n),
                ..
            }) => n.clone(),
            _ => return Err(self.err("a macro name ending in '!'")),
        };
        self.pos += 1;

        let mut args = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
            self.pos += 1;
            loop {
                self.skip_breaks();
                match self.peek().map(|t| (&t.kind, t.span)) {
                    Some((TokenKind::RParen, _)) => {
                        self.pos += 1;
                        break;
                    }
                    Some((TokenKind::Word(w), span)) => {
                        args.push(Arg::word(w.clone(), span));
                        self.pos += 1;
                    }
                    Some((TokenKind::Str(s), span)) => {
                        args.push(Arg {
                            value: ArgValue::Str(s.clone()),
                            span,
                        });
                        self.pos += 1;
                    }
                    Some((TokenKind::Env { name, default }, span)) => {
                        args.push(Arg {
                            value: ArgValue::Env {
                                name: name.clone(),
                                default: default.clone(),
                            },
                            span,
                        });
                        self.pos += 1;
                    }
                    _ => return Err(self.err("a macro argument or ')'")),
                }
                self.skip_breaks();
                match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::Comma) => {
                        self.pos += 1;
                    }
                    Some(TokenKind::RParen) => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.err("',' or ')'")),
                }
            }
        }

        Ok(MacroInvocation {
            name,
            args,
            span: use_span,
        })
    }

    fn macro_def(&mut self) -> Result<MacroDef, ParseError> {
        let span = self.here();
        self.pos += 1; // `macro`

        let name = match self.peek() {
            Some(Token {
                kind: TokenKind::MacroName(n),
                ..
            }) => n.clone(),
            _ => return Err(self.err("a macro name ending in '!'")),
        };
        self.pos += 1;

        let mut params = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
            self.pos += 1;
            loop {
                match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::RParen) => {
                        self.pos += 1;
                        break;
                    }
                    Some(TokenKind::Word(w)) => {
                        params.push(w.clone());
                        self.pos += 1;
                        match self.peek().map(|t| &t.kind) {
                            Some(TokenKind::Comma) => {
                                self.pos += 1;
                            }
                            Some(TokenKind::RParen) => {
                                self.pos += 1;
                                break;
                            }
                            _ => return Err(self.err("',' or ')'")),
                        }
                    }
                    _ => return Err(self.err("a parameter name or ')'")),
                }
            }
        }

        self.expect_lbrace()?;
        let body = self.item_list()?;

        Ok(MacroDef {
            name,
            params,
            body,
            span,
        })
    }

    fn named_server(&mut self) -> Result<ServerBlock, ParseError> {
        let span = self.here();
        self.pos += 1; // `server`

        let name = match self.peek() {
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => s.clone(),
            Some(Token {
                kind: TokenKind::Word(w),
                ..
            }) => w.clone(),
            _ => return Err(self.err("a server name")),
        };
        self.pos += 1;

        let addresses = self.address_list()?;
        self.expect_lbrace()?;
        let items = self.server_items()?;

        Ok(ServerBlock {
            name: Some(name),
            addresses,
            items,
            span,
        })
    }

    fn address_server(&mut self) -> Result<ServerBlock, ParseError> {
        let span = self.here();
        let addresses = self.address_list()?;
        if addresses.is_empty() {
            return Err(self.err("a listen address"));
        }
        self.expect_lbrace()?;
        let items = self.server_items()?;

        Ok(ServerBlock {
            name: None,
            addresses,
            items,
            span,
        })
    }

    /// Address words on the line introducing a server block, up to `{`.
    fn address_list(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut out = Vec::new();
        loop {
            match self.peek().map(|t| (&t.kind, t.span)) {
                Some((TokenKind::Word(w), span)) => {
                    out.push(Arg::word(w.clone(), span));
                    self.pos += 1;
                }
                Some((TokenKind::Str(s), span)) => {
                    out.push(Arg {
                        value: ArgValue::Str(s.clone()),
                        span,
                    });
                    self.pos += 1;
                }
                Some((TokenKind::Env { name, default }, span)) => {
                    out.push(Arg {
                        value: ArgValue::Env {
                            name: name.clone(),
                            default: default.clone(),
                        },
                        span,
                    });
                    self.pos += 1;
                }
                Some((TokenKind::LBrace, _)) | None => return Ok(out),
                Some(_) => return Err(self.err("a listen address or '{'")),
            }
        }
    }

    fn server_items(&mut self) -> Result<Vec<ServerItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_breaks();
            let Some(tok) = self.peek() else {
                return Err(self.err("'}'"));
            };

            match &tok.kind {
                TokenKind::RBrace => {
                    self.pos += 1;
                    return Ok(items);
                }
                TokenKind::MatcherName(_) => {
                    items.push(ServerItem::MatcherDef(self.matcher_def()?));
                }
                TokenKind::Word(w) => match w.as_str() {
                    "listen" => items.push(self.listen_item()?),
                    "route" => items.push(ServerItem::Route(self.route_block()?)),
                    "handle" => items.push(ServerItem::Handle(self.handle_block()?)),
                    "use" => items.push(ServerItem::Item(DirectiveItem::Invoke(
                        self.invocation()?,
                    ))),
                    "macro" | "server" => return Err(self.err("a server-scoped directive")),
                    _ => items.push(ServerItem::Item(DirectiveItem::Plain(self.directive()?))),
                },
                _ => return Err(self.err("a server-scoped directive")),
            }
        }
    }

    fn listen_item(&mut self) -> Result<ServerItem, ParseError> {
        let span = self.here();
        // Reuse generic directive parsing for the argument scan.
        let node = self.directive()?;
        if node.block.is_some() {
            return Err(ParseError {
                span,
                expected: "listen addresses".into(),
                found: "'{'".into(),
            });
        }
        Ok(ServerItem::Listen {
            args: node.args,
            span,
        })
    }

    fn matcher_def(&mut self) -> Result<MatcherDef, ParseError> {
        let (name, span) = match self.peek() {
            Some(Token {
                kind: TokenKind::MatcherName(n),
                span,
            }) => (n.clone(), *span),
            _ => return Err(self.err("'@name'")),
        };
        self.pos += 1;

        let predicates = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::LBrace) => {
                self.pos += 1;
                self.directive_list()?
            }
            Some(TokenKind::Word(_)) => vec![self.directive()?],
            _ => return Err(self.err("a matcher predicate or '{'")),
        };

        Ok(MatcherDef {
            name,
            predicates,
            span,
        })
    }

    fn route_block(&mut self) -> Result<RouteBlock, ParseError> {
        let span = self.here();
        self.pos += 1; // `route`
        self.expect_lbrace()?;

        let mut arms = Vec::new();
        loop {
            self.skip_breaks();
            let Some(tok) = self.peek() else {
                return Err(self.err("'}'"));
            };

            match &tok.kind {
                TokenKind::RBrace => {
                    self.pos += 1;
                    return Ok(RouteBlock { arms, span });
                }
                _ => {
                    let matcher = self.matcher_ref()?;
                    match self.peek().map(|t| &t.kind) {
                        Some(TokenKind::Arrow) => {
                            self.pos += 1;
                        }
                        _ => return Err(self.err("'=>'")),
                    }
                    self.expect_lbrace()?;
                    let body = self.item_list()?;
                    let arm_span = matcher.span();
                    arms.push(RouteArm {
                        matcher,
                        body,
                        span: arm_span,
                    });
                }
            }
        }
    }

    fn matcher_ref(&mut self) -> Result<MatcherRef, ParseError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::MatcherName(n),
                span,
            }) => {
                let m = MatcherRef::Named {
                    name: n.clone(),
                    span: *span,
                };
                self.pos += 1;
                Ok(m)
            }
            Some(Token {
                kind: TokenKind::Word(w),
                span,
            }) if w == "_" => {
                let m = MatcherRef::Fallback { span: *span };
                self.pos += 1;
                Ok(m)
            }
            Some(Token {
                kind: TokenKind::Word(w),
                span,
            }) if w.starts_with('/') => {
                let m = MatcherRef::Path {
                    glob: w.clone(),
                    span: *span,
                };
                self.pos += 1;
                Ok(m)
            }
            _ => Err(self.err("a route matcher ('@name', '/path', or '_')")),
        }
    }

    fn handle_block(&mut self) -> Result<HandleBlock, ParseError> {
        let span = self.here();
        self.pos += 1; // `handle`

        let matcher = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::LBrace) => None,
            _ => Some(self.matcher_ref()?),
        };

        self.expect_lbrace()?;
        let body = self.item_list()?;

        Ok(HandleBlock {
            matcher,
            body,
            span,
        })
    }
}
