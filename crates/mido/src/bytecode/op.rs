//! Opcode definitions.
//!
//! Every opcode has a fixed operand layout ([`Operands`]); two-byte operands
//! are little-endian. Persisted tapes depend on both the byte values and the
//! layouts, so neither may change.

use strum::{FromRepr, IntoStaticStr};

/// Operand layout following an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    None,
    /// One little-endian `u16`.
    U16,
    /// A little-endian `u16` followed by a `u8`.
    U16U8,
}

impl Operands {
    /// Number of operand bytes.
    #[must_use]
    pub fn width(self) -> usize {
        match self {
            Self::None => 0,
            Self::U16 => 2,
            Self::U16U8 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    Nop = 0x00,
    /// Halt with an error.
    Err = 0xFF,

    PushT = 0x21,
    PushF = 0x22,
    /// Push `table[idx]`.
    PushConst = 0x23,
    PushPtr = 0x24,
    PushStr = 0x25,
    PushFunc = 0x26,

    /// Replace the top of the stack with its logical negation.
    Invert = 0x31,
    /// Replace the top `n` values with whether all of them are truthy.
    NeedAll = 0x32,
    /// Replace the top `n` values with whether any of them is truthy.
    NeedAny = 0x33,

    /// `CHK_QTY idx qty`: pop the subject and push whether at least `qty` of
    /// `table[idx]` is held.
    ChkQty = 0x41,

    /// `INVOKE argc`: pop the callee, then call it with the top `argc` values.
    Invoke = 0x51,
    /// `INVOKE_0 idx`: call `table[idx]` without arguments.
    #[strum(serialize = "INVOKE_0")]
    Invoke0 = 0x52,

    CmpEq = 0x61,
    CmpNq = 0x62,
    CmpLt = 0x63,
}

impl Opcode {
    #[must_use]
    pub fn operands(self) -> Operands {
        match self {
            Self::PushConst
            | Self::PushPtr
            | Self::PushStr
            | Self::PushFunc
            | Self::NeedAll
            | Self::NeedAny
            | Self::Invoke
            | Self::Invoke0 => Operands::U16,
            Self::ChkQty => Operands::U16U8,
            _ => Operands::None,
        }
    }

    /// Net stack effect, or `None` when it depends on the operand.
    #[must_use]
    pub fn stack_effect(self) -> Option<i16> {
        match self {
            Self::Nop | Self::Err | Self::Invert | Self::ChkQty => Some(0),
            Self::PushT
            | Self::PushF
            | Self::PushConst
            | Self::PushPtr
            | Self::PushStr
            | Self::PushFunc
            | Self::Invoke0 => Some(1),
            Self::CmpEq | Self::CmpNq | Self::CmpLt => Some(-1),
            Self::NeedAll | Self::NeedAny | Self::Invoke => None,
        }
    }

    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }
}
