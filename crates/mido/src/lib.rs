#![doc = include_str!("../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "narrowing casts are range checked first")]
#![expect(clippy::cast_sign_loss, reason = "quantities are checked to be non-negative")]
#![expect(clippy::float_cmp, reason = "rule literals compare exactly")]

mod ast;
mod bytecode;
mod config;
mod env;
mod error;
mod lexer;
mod lower;
mod object;
mod optimizer;
mod parse;
mod symbols;
mod table;
pub mod tracer;

pub use crate::{
    ast::{
        Compare, CompareOp, FNV1_OFFSET_BASIS_64, FNV1_PRIME_64, Invoke, Node, Render, RewriteCx, Rewriter,
        fnv1_64_mix, hash, render, walk, walk_invoke,
    },
    bytecode::{
        BuiltInError, BuiltInFn, BuiltIns, Bytecode, CodeBuilder, CompileError, Compiler, DecodeError, Disassembly,
        FastOp, FastOps, Instruction, Opcode, Operands, QuantityCheck, RuntimeError, STACK_LIMIT, VM, VmError,
        compile, decode, disassemble, fast_has,
    },
    config::{CompilerConfig, DEFAULT_MAX_INLINE_DEPTH, DEFAULT_ROUNDS, PassKind, PassToggles},
    env::{
        CompilationSource, CompileEnv, CompiledSource, GLOBAL_NAMES, SourceKind, escape_name, standard_builtins,
    },
    error::RuleError,
    lexer::{Lexer, Token, TokenKind, tokenize},
    lower::{LowerError, lower},
    object::{Category, Object, ObjectError, Ptr, PtrTag, QNAN, StrRef, Value},
    optimizer::{
        CollapseHas, CompilerFunction, CompilerFunctionTable, CompilerFuncs, ConnectionGeneration, Context,
        ContextCheckpoint,
        FoldConstants, GeneratedConnection, GeneratedConnections, InlineCalls, InlineSettings, InvokeBareFuncs,
        JsonSettings, OptimizeError, Pipeline, PromoteTokens, SETTINGS_SCHEMA, ScriptedFunction, ScriptedFunctions,
        SettingError, SettingReader, SettingType, compare_setting, const_compile_func, schema_type,
    },
    parse::{BinOp, BoolOp, Literal, ParseError, ParseTree, Parser, Precedence, UnaryOp, parse},
    symbols::{Symbol, SymbolCheckpoint, SymbolError, SymbolId, SymbolKind, SymbolTable},
    table::{BuiltInDef, BuilderError, ObjectBuilder, ObjectCheckpoint, ObjectIndex, Table},
};
