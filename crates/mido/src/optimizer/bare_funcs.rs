//! Turns bare references to zero-argument functions into calls.

use super::OptimizeError;
use crate::{
    ast::{Invoke, Node, RewriteCx, Rewriter},
    symbols::{SymbolId, SymbolKind},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct InvokeBareFuncs;

impl Rewriter for InvokeBareFuncs {
    fn name(&self) -> &'static str {
        "bare_funcs"
    }

    /// A callee is already a call; its arguments are left alone.
    fn rewrite_invoke(&mut self, invoke: Invoke, _cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        Ok(Node::Invoke(invoke))
    }

    fn rewrite_identifier(&mut self, id: SymbolId, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let symbol = cx.symbols.get(id).ok_or(OptimizeError::UnknownSymbol(id))?;
        match symbol.kind {
            SymbolKind::BuiltInFunction | SymbolKind::CompilerFunction => Ok(Node::invoke(id, Vec::new())),
            SymbolKind::Function | SymbolKind::ScriptedFunc => {
                let script = cx.scripts.get(&symbol.name).ok_or_else(|| OptimizeError::MissingScript {
                    name: symbol.name.clone(),
                })?;
                if script.params.is_empty() {
                    Ok(Node::invoke(id, Vec::new()))
                } else {
                    Err(OptimizeError::BareFunction {
                        name: symbol.name.clone(),
                        params: script.params.len(),
                    })
                }
            }
            _ => Ok(Node::Identifier(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        ast::render,
        optimizer::{Context, ScriptedFunctions},
        symbols::SymbolTable,
        table::ObjectBuilder,
    };

    fn run(symbols: &mut SymbolTable, scripts: &ScriptedFunctions, node: Node) -> Result<String, OptimizeError> {
        let mut objects = ObjectBuilder::new();
        let mut context = Context::new();
        let mut cx = RewriteCx {
            symbols,
            objects: &mut objects,
            scripts,
            context: &mut context,
        };
        let out = InvokeBareFuncs.rewrite(node, &mut cx)?;
        Ok(render(&out, Some(&*cx.symbols)))
    }

    #[test]
    fn test_builtin_reference_becomes_call() {
        let mut symbols = SymbolTable::new();
        let is_adult = symbols.declare("is_adult", SymbolKind::BuiltInFunction).unwrap();
        let bow = symbols.declare("Bow", SymbolKind::Token).unwrap();
        let node = Node::every(vec![Node::Identifier(is_adult), Node::Identifier(bow)]);
        let out = run(&mut symbols, &ScriptedFunctions::default(), node).unwrap();
        assert_eq!(out, r#"(every (invoke ($0000 "is_adult")) ($0001 "Bow"))"#);
    }

    #[test]
    fn test_scripted_reference_becomes_call() {
        let mut symbols = SymbolTable::new();
        let scripts = ScriptedFunctions::build(&mut symbols, [("can_dive", "True")]).unwrap();
        let id = symbols.lookup("can_dive").unwrap().id;
        let out = run(&mut symbols, &scripts, Node::Identifier(id)).unwrap();
        assert_eq!(out, r#"(invoke ($0000 "can_dive"))"#);
    }

    #[test]
    fn test_reference_to_function_with_params() {
        let mut symbols = SymbolTable::new();
        let scripts = ScriptedFunctions::build(&mut symbols, [("can_use(item)", "item")]).unwrap();
        let id = symbols.lookup("can_use").unwrap().id;
        let err = run(&mut symbols, &scripts, Node::Identifier(id)).unwrap_err();
        assert_eq!(
            err,
            OptimizeError::BareFunction {
                name: "can_use".to_owned(),
                params: 1
            }
        );
    }

    #[test]
    fn test_function_without_script() {
        let mut symbols = SymbolTable::new();
        let id = symbols.declare("mystery", SymbolKind::Function).unwrap();
        let err = run(&mut symbols, &ScriptedFunctions::default(), Node::Identifier(id)).unwrap_err();
        assert_eq!(err.to_string(), r#"fn "mystery" was declared but not available in table"#);
    }

    #[test]
    fn test_call_arguments_are_not_touched() {
        let mut symbols = SymbolTable::new();
        let has = symbols.declare("has", SymbolKind::BuiltInFunction).unwrap();
        let is_child = symbols.declare("is_child", SymbolKind::BuiltInFunction).unwrap();
        let node = Node::invoke(has, vec![Node::Identifier(is_child)]);
        let out = run(&mut symbols, &ScriptedFunctions::default(), node).unwrap();
        assert_eq!(out, r#"(invoke ($0000 "has") ($0001 "is_child"))"#);
    }
}
