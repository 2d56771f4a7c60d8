//! Macro expansion.
//!
//! A pure tree-rewrite pass: every [`MacroInvocation`] is replaced by a
//! fresh copy of the referenced definition's body with each declared
//! parameter substituted by the corresponding argument (positional
//! binding). Expansion recurses through nested invocations; the chain of
//! in-progress macro names doubles as the cycle detector. Substitution is
//! purely structural — no identifiers leak between the invocation site and
//! the body beyond the declared parameters.
//!
//! The returned [`Document`] contains no macro nodes: definitions are
//! consumed here and invocation sites are spliced away.

use std::collections::HashMap;

use crate::config::{
    ast::{
        Arg, ArgValue, DirectiveItem, DirectiveNode, Document, MacroDef, MacroInvocation,
        ServerItem,
    },
    error::CompileError,
};

/// Expand all macros in `doc`, consuming the definitions.
pub fn expand(mut doc: Document) -> Result<Document, CompileError> {
    let mut defs: HashMap<String, MacroDef> = HashMap::new();
    for def in doc.macros.drain(..) {
        if defs.contains_key(&def.name) {
            return Err(CompileError::DuplicateMacro {
                name: def.name,
                span: def.span,
            });
        }
        defs.insert(def.name.clone(), def);
    }

    let expander = Expander { defs };
    for server in &mut doc.servers {
        let items = std::mem::take(&mut server.items);
        let mut expanded = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ServerItem::Item(di) => {
                    for out in expander.expand_item(di, &mut Vec::new())? {
                        expanded.push(ServerItem::Item(out));
                    }
                }
                ServerItem::Route(mut route) => {
                    for arm in &mut route.arms {
                        arm.body = expander.expand_items(std::mem::take(&mut arm.body))?;
                    }
                    expanded.push(ServerItem::Route(route));
                }
                ServerItem::Handle(mut handle) => {
                    handle.body = expander.expand_items(std::mem::take(&mut handle.body))?;
                    expanded.push(ServerItem::Handle(handle));
                }
                other => expanded.push(other),
            }
        }
        server.items = expanded;
    }

    Ok(doc)
}

struct Expander {
    defs: HashMap<String, MacroDef>,
}

impl Expander {
    fn expand_items(&self, items: Vec<DirectiveItem>) -> Result<Vec<DirectiveItem>, CompileError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.extend(self.expand_item(item, &mut Vec::new())?);
        }
        Ok(out)
    }

    /// Expand one item; `chain` holds the macro names currently being
    /// expanded, outermost first.
    fn expand_item(
        &self,
        item: DirectiveItem,
        chain: &mut Vec<String>,
    ) -> Result<Vec<DirectiveItem>, CompileError> {
        match item {
            DirectiveItem::Plain(node) => Ok(vec![DirectiveItem::Plain(node)]),
            DirectiveItem::Invoke(inv) => self.splice(inv, chain),
        }
    }

    fn splice(
        &self,
        inv: MacroInvocation,
        chain: &mut Vec<String>,
    ) -> Result<Vec<DirectiveItem>, CompileError> {
        let def = self
            .defs
            .get(&inv.name)
            .ok_or_else(|| CompileError::UndefinedMacro {
                name: inv.name.clone(),
                span: inv.span,
            })?;

        if def.params.len() != inv.args.len() {
            return Err(CompileError::MacroArity {
                name: inv.name.clone(),
                expected: def.params.len(),
                got: inv.args.len(),
                span: inv.span,
            });
        }

        if chain.iter().any(|n| n == &inv.name) {
            let mut cycle = chain.clone();
            cycle.push(inv.name.clone());
            return Err(CompileError::MacroCycle {
                chain: cycle,
                span: inv.span,
            });
        }

        let bindings: HashMap<&str, &ArgValue> = def
            .params
            .iter()
            .map(String::as_str)
            .zip(inv.args.iter().map(|a| &a.value))
            .collect();

        chain.push(inv.name.clone());
        let mut out = Vec::new();
        for body_item in &def.body {
            match body_item {
                DirectiveItem::Plain(node) => {
                    out.push(DirectiveItem::Plain(substitute_node(node, &bindings)));
                }
                DirectiveItem::Invoke(nested) => {
                    let nested = MacroInvocation {
                        name: nested.name.clone(),
                        args: nested
                            .args
                            .iter()
                            .map(|a| substitute_arg(a, &bindings))
                            .collect(),
                        span: nested.span,
                    };
                    out.extend(self.splice(nested, chain)?);
                }
            }
        }
        chain.pop();

        Ok(out)
    }
}

fn substitute_node(node: &DirectiveNode, bindings: &HashMap<&str, &ArgValue>) -> DirectiveNode {
    DirectiveNode {
        name: node.name.clone(),
        args: node
            .args
            .iter()
            .map(|a| substitute_arg(a, bindings))
            .collect(),
        block: node
            .block
            .as_ref()
            .map(|b| b.iter().map(|d| substitute_node(d, bindings)).collect()),
        span: node.span,
    }
}

/// A bare word equal to a declared parameter name is replaced by the bound
/// argument; everything else passes through untouched.
fn substitute_arg(arg: &Arg, bindings: &HashMap<&str, &ArgValue>) -> Arg {
    if let ArgValue::Word(w) = &arg.value {
        if let Some(replacement) = bindings.get(w.as_str()) {
            return Arg {
                value: (*replacement).clone(),
                span: arg.span,
            };
        }
    }
    arg.clone()
}
