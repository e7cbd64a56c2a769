//! Scripted functions: rule-language helpers declared as `(header, body)` text.

use indexmap::IndexMap;

use crate::{
    ast::Node,
    error::RuleError,
    lower::{LowerError, lower},
    parse::{ParseTree, parse},
    symbols::{SymbolId, SymbolKind, SymbolTable},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedFunction {
    pub symbol: SymbolId,
    /// Parameters, declared `LOCAL`.
    pub params: Vec<SymbolId>,
    pub body: Node,
}

/// Scripted functions by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptedFunctions {
    fns: IndexMap<String, ScriptedFunction>,
}

impl ScriptedFunctions {
    /// Declares every header, then lowers every body.
    ///
    /// A header is `name` or `name(a, b, ..)`. Headers naming a built-in are
    /// skipped, and the first declaration of a name wins. Bodies are lowered
    /// only after all headers are declared, so functions may call each other
    /// regardless of order.
    pub fn build<'a>(
        symbols: &mut SymbolTable,
        decls: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, RuleError> {
        let mut headers = Vec::new();
        for (header, body) in decls {
            let (name, params) = match parse(header)? {
                ParseTree::Identifier(name) => (name, Vec::new()),
                ParseTree::Call { callee, args } => {
                    let ParseTree::Identifier(name) = *callee else {
                        return Err(header_error(header).into());
                    };
                    let params = args
                        .into_iter()
                        .map(|arg| match arg {
                            ParseTree::Identifier(param) => Ok(param),
                            _ => Err(header_error(header)),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    (name, params)
                }
                _ => return Err(header_error(header).into()),
            };
            if symbols
                .lookup(&name)
                .is_some_and(|s| s.kind == SymbolKind::BuiltInFunction)
            {
                continue;
            }
            let symbol = symbols.declare(&name, SymbolKind::ScriptedFunc)?;
            let params = params
                .iter()
                .map(|param| symbols.declare(param, SymbolKind::Local))
                .collect::<Result<Vec<_>, _>>()?;
            headers.push((name, symbol, params, body));
        }

        let mut fns = IndexMap::with_capacity(headers.len());
        for (name, symbol, params, body) in headers {
            if fns.contains_key(&name) {
                continue;
            }
            let body = lower(symbols, &parse(body)?)?;
            fns.insert(name, ScriptedFunction { symbol, params, body });
        }
        Ok(Self { fns })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScriptedFunction> {
        self.fns.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, function: ScriptedFunction) {
        self.fns.entry(name.into()).or_insert(function);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScriptedFunction)> {
        self.fns.iter().map(|(name, f)| (name.as_str(), f))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }
}

fn header_error(header: &str) -> LowerError {
    LowerError::Invalid {
        construct: "function header",
        msg: format!("expected `name` or `name(params..)`, found {header:?}").into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_declares_params_and_function() {
        let mut symbols = SymbolTable::new();
        let scripts = ScriptedFunctions::build(
            &mut symbols,
            [
                ("has_explosives", "Bombs or Bombchus"),
                ("can_use(item)", "is_adult and has(item, 1)"),
            ],
        )
        .unwrap();
        assert_eq!(scripts.len(), 2);
        let can_use = scripts.get("can_use").unwrap();
        assert_eq!(symbols.kind_of(can_use.symbol), Some(SymbolKind::ScriptedFunc));
        assert_eq!(can_use.params.len(), 1);
        assert_eq!(symbols.kind_of(can_use.params[0]), Some(SymbolKind::Local));
        assert!(scripts.get("has_explosives").unwrap().params.is_empty());
    }

    #[test]
    fn test_builtin_headers_are_skipped() {
        let mut symbols = SymbolTable::new();
        symbols.declare("is_adult", SymbolKind::BuiltInFunction).unwrap();
        let scripts = ScriptedFunctions::build(&mut symbols, [("is_adult", "age == adult")]).unwrap();
        assert!(scripts.is_empty());
        assert_eq!(symbols.lookup("is_adult").unwrap().kind, SymbolKind::BuiltInFunction);
    }

    #[test]
    fn test_functions_may_reference_later_declarations() {
        let mut symbols = SymbolTable::new();
        let scripts = ScriptedFunctions::build(&mut symbols, [("a", "b()"), ("b", "True")]).unwrap();
        assert_eq!(scripts.len(), 2);
        assert_eq!(symbols.lookup("b").unwrap().kind, SymbolKind::ScriptedFunc);
    }

    #[test]
    fn test_bad_header() {
        let mut symbols = SymbolTable::new();
        let err = ScriptedFunctions::build(&mut symbols, [("f(1)", "True")]).unwrap_err();
        assert!(err.to_string().contains("function header"));
    }
}
