use std::fmt;

use crate::{
    bytecode::CompileError, lower::LowerError, optimizer::OptimizeError, parse::ParseError, symbols::SymbolError,
    table::BuilderError,
};

/// Any failure while turning rule text into bytecode, tagged by stage.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    Parse(ParseError),
    Lower(LowerError),
    Optimize(OptimizeError),
    Compile(CompileError),
    Symbol(SymbolError),
    Builder(BuilderError),
}

impl RuleError {
    /// Name of the failing stage.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parsing",
            Self::Lower(_) => "lowering",
            Self::Optimize(_) => "optimization",
            Self::Compile(_) => "compile",
            Self::Symbol(_) => "symbols",
            Self::Builder(_) => "objects",
        }
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = self.stage();
        match self {
            Self::Parse(err) => write!(f, "{stage}: {err}"),
            Self::Lower(err) => write!(f, "{stage}: {err}"),
            Self::Optimize(err) => write!(f, "{stage}: {err}"),
            Self::Compile(err) => write!(f, "{stage}: {err}"),
            Self::Symbol(err) => write!(f, "{stage}: {err}"),
            Self::Builder(err) => write!(f, "{stage}: {err}"),
        }
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(match self {
            Self::Parse(err) => err,
            Self::Lower(err) => err,
            Self::Optimize(err) => err,
            Self::Compile(err) => err,
            Self::Symbol(err) => err,
            Self::Builder(err) => err,
        })
    }
}

impl From<ParseError> for RuleError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<LowerError> for RuleError {
    fn from(err: LowerError) -> Self {
        Self::Lower(err)
    }
}

impl From<OptimizeError> for RuleError {
    fn from(err: OptimizeError) -> Self {
        Self::Optimize(err)
    }
}

impl From<CompileError> for RuleError {
    fn from(err: CompileError) -> Self {
        Self::Compile(err)
    }
}

impl From<SymbolError> for RuleError {
    fn from(err: SymbolError) -> Self {
        Self::Symbol(err)
    }
}

impl From<BuilderError> for RuleError {
    fn from(err: BuilderError) -> Self {
        Self::Builder(err)
    }
}
