//! Compiler configuration.
//!
//! [`CompilerConfig`] is plain data: it serializes with serde, so a host can
//! keep it next to its other settings and load it with
//! [`CompilerConfig::from_json`].

use strum::{EnumString, IntoStaticStr};

/// Rounds the optimizer runs when not configured otherwise.
pub const DEFAULT_ROUNDS: usize = 10;

/// Deepest chain of nested scripted-function calls the inliner expands.
pub const DEFAULT_MAX_INLINE_DEPTH: usize = 16;

/// One optimizer pass, in the order passes run within a round.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr, serde::Serialize, serde::Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Connections,
    Inline,
    Fold,
    BareFuncs,
    CollapseHas,
    PromoteTokens,
    Settings,
    CompilerFuncs,
}

impl PassKind {
    pub const ALL: [Self; 8] = [
        Self::Connections,
        Self::Inline,
        Self::Fold,
        Self::BareFuncs,
        Self::CollapseHas,
        Self::PromoteTokens,
        Self::Settings,
        Self::CompilerFuncs,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Which passes run. Every pass is enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
#[expect(clippy::struct_excessive_bools, reason = "one switch per pass")]
pub struct PassToggles {
    pub connections: bool,
    pub inline: bool,
    pub fold: bool,
    pub bare_funcs: bool,
    pub collapse_has: bool,
    pub promote_tokens: bool,
    pub settings: bool,
    pub compiler_funcs: bool,
}

impl Default for PassToggles {
    fn default() -> Self {
        Self::all()
    }
}

impl PassToggles {
    #[must_use]
    pub fn all() -> Self {
        Self {
            connections: true,
            inline: true,
            fold: true,
            bare_funcs: true,
            collapse_has: true,
            promote_tokens: true,
            settings: true,
            compiler_funcs: true,
        }
    }

    #[must_use]
    pub fn none() -> Self {
        Self {
            connections: false,
            inline: false,
            fold: false,
            bare_funcs: false,
            collapse_has: false,
            promote_tokens: false,
            settings: false,
            compiler_funcs: false,
        }
    }

    /// Only the given passes.
    #[must_use]
    pub fn only(kinds: &[PassKind]) -> Self {
        let mut toggles = Self::none();
        for &kind in kinds {
            toggles.set(kind, true);
        }
        toggles
    }

    fn slot(&mut self, kind: PassKind) -> &mut bool {
        match kind {
            PassKind::Connections => &mut self.connections,
            PassKind::Inline => &mut self.inline,
            PassKind::Fold => &mut self.fold,
            PassKind::BareFuncs => &mut self.bare_funcs,
            PassKind::CollapseHas => &mut self.collapse_has,
            PassKind::PromoteTokens => &mut self.promote_tokens,
            PassKind::Settings => &mut self.settings,
            PassKind::CompilerFuncs => &mut self.compiler_funcs,
        }
    }

    pub fn set(&mut self, kind: PassKind, enabled: bool) {
        *self.slot(kind) = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self, kind: PassKind) -> bool {
        match kind {
            PassKind::Connections => self.connections,
            PassKind::Inline => self.inline,
            PassKind::Fold => self.fold,
            PassKind::BareFuncs => self.bare_funcs,
            PassKind::CollapseHas => self.collapse_has,
            PassKind::PromoteTokens => self.promote_tokens,
            PassKind::Settings => self.settings,
            PassKind::CompilerFuncs => self.compiler_funcs,
        }
    }

    /// Enabled passes in run order.
    pub fn enabled(&self) -> impl Iterator<Item = PassKind> + '_ {
        PassKind::ALL.into_iter().filter(|&kind| self.is_enabled(kind))
    }
}

/// Settings for a [`CompileEnv`](crate::CompileEnv).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// How many times the pass list runs over each rule.
    pub rounds: usize,
    pub passes: PassToggles,
    /// Whether calls may be replaced by specialized instructions.
    pub fast_ops: bool,
    pub max_inline_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            passes: PassToggles::all(),
            fast_ops: true,
            max_inline_depth: DEFAULT_MAX_INLINE_DEPTH,
        }
    }
}

impl CompilerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    #[must_use]
    pub fn rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    #[must_use]
    pub fn passes(mut self, passes: PassToggles) -> Self {
        self.passes = passes;
        self
    }

    #[must_use]
    pub fn disable(mut self, kind: PassKind) -> Self {
        self.passes.set(kind, false);
        self
    }

    #[must_use]
    pub fn fast_ops(mut self, enabled: bool) -> Self {
        self.fast_ops = enabled;
        self
    }

    #[must_use]
    pub fn max_inline_depth(mut self, depth: usize) -> Self {
        self.max_inline_depth = depth;
        self
    }
}
