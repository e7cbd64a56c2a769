//! Inlining of world settings.
//!
//! `SETTING` identifiers named in [`SETTINGS_SCHEMA`] are replaced by the
//! literal a [`SettingReader`] returns for them, which lets later folding
//! passes decide setting-dependent branches at compile time.

use std::{fmt, sync::Arc};

use serde_json::{Map, Value};
use strum::IntoStaticStr;

use super::OptimizeError;
use crate::{
    ast::{Node, RewriteCx, Rewriter},
    symbols::{SymbolId, SymbolKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum SettingType {
    String,
    Number,
    Boolean,
}

impl fmt::Display for SettingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    /// The reader has no value for this setting.
    Unknown { name: String },
    /// The reader has a value, but not of the requested type.
    WrongType { name: String, expected: SettingType },
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { name } => write!(f, "unknown setting '{name}'"),
            Self::WrongType { name, expected } => write!(f, "setting '{name}' is not a {expected}"),
        }
    }
}

impl std::error::Error for SettingError {}

/// Typed access to the settings of one world.
pub trait SettingReader {
    fn string(&self, name: &str) -> Result<String, SettingError>;
    fn number(&self, name: &str) -> Result<f64, SettingError>;
    fn boolean(&self, name: &str) -> Result<bool, SettingError>;
}

impl<T: SettingReader + ?Sized> SettingReader for Arc<T> {
    fn string(&self, name: &str) -> Result<String, SettingError> {
        (**self).string(name)
    }

    fn number(&self, name: &str) -> Result<f64, SettingError> {
        (**self).number(name)
    }

    fn boolean(&self, name: &str) -> Result<bool, SettingError> {
        (**self).boolean(name)
    }
}

/// Settings held in a JSON object, e.g. the `settings` section of a spoiler log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonSettings {
    values: Map<String, Value>,
}

impl JsonSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object of settings.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            values: serde_json::from_str(json)?,
        })
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_owned(), value.into());
        self
    }

    fn get(&self, name: &str) -> Result<&Value, SettingError> {
        self.values.get(name).ok_or_else(|| SettingError::Unknown { name: name.to_owned() })
    }
}

impl From<Map<String, Value>> for JsonSettings {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

impl SettingReader for JsonSettings {
    fn string(&self, name: &str) -> Result<String, SettingError> {
        self.get(name)?
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| wrong_type(name, SettingType::String))
    }

    fn number(&self, name: &str) -> Result<f64, SettingError> {
        self.get(name)?
            .as_f64()
            .ok_or_else(|| wrong_type(name, SettingType::Number))
    }

    fn boolean(&self, name: &str) -> Result<bool, SettingError> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| wrong_type(name, SettingType::Boolean))
    }
}

fn wrong_type(name: &str, expected: SettingType) -> SettingError {
    SettingError::WrongType {
        name: name.to_owned(),
        expected,
    }
}

/// Settings read at compile time, with the type each one is read as.
pub const SETTINGS_SCHEMA: &[(&str, SettingType)] = &[
    ("logic_rules", SettingType::String),
    ("reachable_locations", SettingType::String),
    ("lacs_condition", SettingType::String),
    ("bridge", SettingType::String),
    ("shuffle_ganon_bosskey", SettingType::String),
    ("open_forest", SettingType::String),
    ("open_kakariko", SettingType::String),
    ("zora_fountain", SettingType::String),
    ("gerudo_fortress", SettingType::String),
    ("shuffle_scrubs", SettingType::String),
    ("shuffle_pots", SettingType::String),
    ("shuffle_crates", SettingType::String),
    ("shuffle_dungeon_rewards", SettingType::String),
    ("shuffle_tcgkeys", SettingType::String),
    ("hints", SettingType::String),
    ("damage_multiplier", SettingType::String),
    ("deadly_bonks", SettingType::String),
    ("shuffle_gerudo_fortress_heart_piece", SettingType::String),
    ("triforce_count_per_world", SettingType::Number),
    ("triforce_goal_per_world", SettingType::Number),
    ("lacs_medallions", SettingType::Number),
    ("lacs_stones", SettingType::Number),
    ("lacs_rewards", SettingType::Number),
    ("lacs_tokens", SettingType::Number),
    ("lacs_hearts", SettingType::Number),
    ("bridge_medallions", SettingType::Number),
    ("bridge_stones", SettingType::Number),
    ("bridge_rewards", SettingType::Number),
    ("bridge_tokens", SettingType::Number),
    ("bridge_hearts", SettingType::Number),
    ("trials", SettingType::Number),
    ("ganon_bosskey_medallions", SettingType::Number),
    ("ganon_bosskey_stones", SettingType::Number),
    ("ganon_bosskey_rewards", SettingType::Number),
    ("ganon_bosskey_tokens", SettingType::Number),
    ("ganon_bosskey_hearts", SettingType::Number),
    ("chicken_count", SettingType::Number),
    ("big_poe_count", SettingType::Number),
    ("adult_trade_shuffle", SettingType::Boolean),
    ("blue_fire_arrows", SettingType::Boolean),
    ("chicken_count_random", SettingType::Boolean),
    ("clearer_hints", SettingType::Boolean),
    ("complete_mask_quest", SettingType::Boolean),
    ("disable_trade_revert", SettingType::Boolean),
    ("easier_fire_arrow_entry", SettingType::Boolean),
    ("enhance_map_compass", SettingType::Boolean),
    ("fast_chests", SettingType::Boolean),
    ("fix_broken_drops", SettingType::Boolean),
    ("free_bombchu_drops", SettingType::Boolean),
    ("free_scarecrow", SettingType::Boolean),
    ("keyring_give_bk", SettingType::Boolean),
    ("no_collectible_hearts", SettingType::Boolean),
    ("no_epona_race", SettingType::Boolean),
    ("no_escape_sequence", SettingType::Boolean),
    ("no_guard_stealth", SettingType::Boolean),
    ("one_item_per_dungeon", SettingType::Boolean),
    ("open_door_of_time", SettingType::Boolean),
    ("owl_drops", SettingType::Boolean),
    ("plant_beans", SettingType::Boolean),
    ("ruto_already_f1_jabu", SettingType::Boolean),
    ("shuffle_beans", SettingType::Boolean),
    ("shuffle_beehives", SettingType::Boolean),
    ("shuffle_cows", SettingType::Boolean),
    ("shuffle_empty_crates", SettingType::Boolean),
    ("shuffle_empty_pots", SettingType::Boolean),
    ("shuffle_expensive_merchants", SettingType::Boolean),
    ("shuffle_frog_song_rupees", SettingType::Boolean),
    ("shuffle_ganon_tower", SettingType::Boolean),
    ("shuffle_gerudo_card", SettingType::Boolean),
    ("shuffle_gerudo_valley_river_exit", SettingType::Boolean),
    ("shuffle_grotto_entrances", SettingType::Boolean),
    ("shuffle_hideout_entrances", SettingType::Boolean),
    ("shuffle_individual_ocarina_notes", SettingType::Boolean),
    ("shuffle_interior_entrances", SettingType::Boolean),
    ("shuffle_kokiri_sword", SettingType::Boolean),
    ("shuffle_ocarinas", SettingType::Boolean),
    ("shuffle_overworld_entrances", SettingType::Boolean),
    ("shuffle_silver_rupees", SettingType::Boolean),
    ("shuffle_wonderitems", SettingType::Boolean),
    ("skip_child_zelda", SettingType::Boolean),
    ("skip_reward_from_rauru", SettingType::Boolean),
    ("skip_some_minigame_phases", SettingType::Boolean),
    ("start_with_consumables", SettingType::Boolean),
    ("start_with_rupees", SettingType::Boolean),
    ("tcg_requires_lens", SettingType::Boolean),
    ("trials_random", SettingType::Boolean),
    ("triforce_hunt", SettingType::Boolean),
    ("useful_cutscenes", SettingType::Boolean),
    ("warp_songs", SettingType::Boolean),
];

/// Type a setting is inlined as, if it is inlined at all.
#[must_use]
pub fn schema_type(name: &str) -> Option<SettingType> {
    SETTINGS_SCHEMA
        .iter()
        .find_map(|&(setting, kind)| (setting == name).then_some(kind))
}

#[derive(Debug, Clone)]
pub struct InlineSettings<R> {
    reader: R,
}

impl<R: SettingReader> InlineSettings<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: SettingReader> Rewriter for InlineSettings<R> {
    fn name(&self) -> &'static str {
        "settings"
    }

    fn rewrite_identifier(&mut self, id: SymbolId, cx: &mut RewriteCx<'_>) -> Result<Node, OptimizeError> {
        let Some(symbol) = cx.symbols.get(id) else {
            return Ok(Node::Identifier(id));
        };
        let Some(kind) = schema_type(&symbol.name) else {
            return Ok(Node::Identifier(id));
        };
        if symbol.kind != SymbolKind::Setting {
            return Err(OptimizeError::NotASetting {
                name: symbol.name.clone(),
                kind: symbol.kind,
            });
        }
        Ok(match kind {
            SettingType::String => Node::String(self.reader.string(&symbol.name)?),
            SettingType::Number => Node::Number(self.reader.number(&symbol.name)?),
            SettingType::Boolean => Node::Boolean(self.reader.boolean(&symbol.name)?),
        })
    }
}
