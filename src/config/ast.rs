//! Raw syntax tree for the Pingclairfile DSL.
//!
//! The parser produces these nodes without resolving anything: matcher names
//! are unresolved references, macros are still definitions plus invocation
//! sites, directive arguments are uninterpreted words. The macro expander
//! rewrites the tree to a macro-free form and the semantic analyzer lowers
//! it into [`RuntimeConfig`].
//!
//! Ownership is strictly tree-shaped: children belong to their parent node,
//! nothing is shared or cyclic.
//!
//! [`RuntimeConfig`]: crate::config::runtime::RuntimeConfig

use crate::config::error::Span;

/// One parsed Pingclairfile.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    /// Directives of the leading unnamed global options block, raw.
    pub options: Vec<DirectiveNode>,
    /// Macro definitions, consumed and discarded by expansion.
    pub macros: Vec<MacroDef>,
    pub servers: Vec<ServerBlock>,
}

/// A directive argument value. Environment templates stay symbolic until
/// the analyzer substitutes them.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Word(String),
    Str(String),
    Env {
        name: String,
        default: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: ArgValue,
    pub span: Span,
}

impl Arg {
    pub fn word(text: impl Into<String>, span: Span) -> Self {
        Self {
            value: ArgValue::Word(text.into()),
            span,
        }
    }
}

/// Generic directive: a name, its arguments, and an optional `{ ... }`
/// block of nested directives.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveNode {
    pub name: String,
    pub args: Vec<Arg>,
    pub block: Option<Vec<DirectiveNode>>,
    pub span: Span,
}

/// A directive position that may also hold a macro invocation. After
/// expansion only `Plain` items remain.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveItem {
    Plain(DirectiveNode),
    Invoke(MacroInvocation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    /// Ordered parameter names; arguments bind positionally.
    pub params: Vec<String>,
    pub body: Vec<DirectiveItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroInvocation {
    pub name: String,
    pub args: Vec<Arg>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerBlock {
    /// Explicit `server "name"` form; bare address blocks derive their
    /// identity from the first listen address during analysis.
    pub name: Option<String>,
    /// Raw address words preceding the block, unparsed.
    pub addresses: Vec<Arg>,
    pub items: Vec<ServerItem>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerItem {
    /// `listen addr...` directive form, equivalent to block addresses.
    Listen { args: Vec<Arg>, span: Span },
    MatcherDef(MatcherDef),
    Route(RouteBlock),
    Handle(HandleBlock),
    /// Any other directive or a macro invocation.
    Item(DirectiveItem),
}

/// `@name { predicates }` or one-line `@name predicate args...`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherDef {
    pub name: String,
    /// Predicate lines, kept raw; the analyzer interprets them.
    pub predicates: Vec<DirectiveNode>,
    pub span: Span,
}

/// Reference to a matcher in route-arm or `handle` position.
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherRef {
    /// `@name`, resolved against the enclosing server block's scope.
    Named { name: String, span: Span },
    /// Inline path glob, e.g. `/api/*`.
    Path { glob: String, span: Span },
    /// The `_` fallback sigil.
    Fallback { span: Span },
}

impl MatcherRef {
    pub fn span(&self) -> Span {
        match self {
            MatcherRef::Named { span, .. }
            | MatcherRef::Path { span, .. }
            | MatcherRef::Fallback { span } => *span,
        }
    }
}

/// `route { matcher => { handlers } ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteBlock {
    pub arms: Vec<RouteArm>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteArm {
    pub matcher: MatcherRef,
    pub body: Vec<DirectiveItem>,
    pub span: Span,
}

/// `handle [@name | /glob] { handlers }`; no matcher means catch-all.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleBlock {
    pub matcher: Option<MatcherRef>,
    pub body: Vec<DirectiveItem>,
    pub span: Span,
}
