//! NaN-boxed 64-bit run-time values.
//!
//! An [`Object`] is either a plain IEEE-754 double, or a quiet NaN whose sign
//! bit and bits 49 and 48 select one of seven boxed categories:
//!
//! | b63 b49 b48 | category | payload (bits 0..48) |
//! |-------------|----------|----------------------|
//! | 0 0 1 | [`Category::Ptr`] | tag:16, addr:32 |
//! | 0 1 0 | [`Category::Str`] | len:16, offset:32 |
//! | 0 1 1 | [`Category::Bytes`] | 6 bytes, little-endian |
//! | 1 0 0 | [`Category::I32`] | low 32 bits |
//! | 1 0 1 | [`Category::U32`] | low 32 bits |
//! | 1 1 0 | [`Category::Bool`] | 0 or 1 |
//! | 1 1 1 | [`Category::Null`] | 0 |
//!
//! Pattern `0 0 0` is reserved. The only doubles that overlap the boxed space
//! are NaNs, so packing refuses NaN and every other double round-trips.
//!
//! The packed form is meant for tables and tapes. Code that inspects values
//! should [`Object::unpack`] into a [`Value`] and match on that.

use std::fmt;

use strum::{FromRepr, IntoStaticStr};

/// Bits that are all set for every boxed (non-double) object.
pub const QNAN: u64 = 0x7FFC_0000_0000_0000;
const SIGN_BIT: u64 = 1 << 63;
const TAG_HI_BIT: u64 = 1 << 49;
const TAG_LO_BIT: u64 = 1 << 48;
const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// Kind of a packed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Category {
    Number,
    Ptr,
    Str,
    Bytes,
    I32,
    U32,
    Bool,
    Null,
    Reserved,
}

impl Category {
    /// High bits shared by every object of this category.
    const fn discriminant(self) -> u64 {
        let code: u64 = match self {
            Self::Ptr => 0b001,
            Self::Str => 0b010,
            Self::Bytes => 0b011,
            Self::I32 => 0b100,
            Self::U32 => 0b101,
            Self::Bool => 0b110,
            Self::Null => 0b111,
            Self::Number | Self::Reserved => 0,
        };
        QNAN | ((code >> 2) << 63) | (((code >> 1) & 1) << 49) | ((code & 1) << 48)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.into())
    }
}

/// What a pointer object points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, IntoStaticStr)]
#[repr(u16)]
pub enum PtrTag {
    Token = 0x0A,
    Setting = 0x0B,
    Func = 0x0C,
    Region = 0x0D,
    Transit = 0x0E,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ptr {
    pub tag: PtrTag,
    pub addr: u32,
}

/// Location of a string in a table's string arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrRef {
    pub offset: u32,
    pub len: u16,
}

/// Decoded form of an [`Object`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Number(f64),
    Ptr(Ptr),
    Str(StrRef),
    Bytes([u8; 6]),
    I32(i32),
    U32(u32),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// Accessor used on an object of another category.
    WrongType { expected: Category, found: Category },
    /// NaN doubles cannot be packed.
    NotANumber,
    /// A pointer object carries a tag no [`PtrTag`] uses.
    UnknownPtrTag(u16),
    /// A string reference reaches outside its table's arena.
    DanglingString(StrRef),
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongType { expected, found } => write!(f, "expected {expected} object but found {found}"),
            Self::NotANumber => f.write_str("NaN cannot be packed into an object"),
            Self::UnknownPtrTag(tag) => write!(f, "unknown pointer tag {tag:#06x}"),
            Self::DanglingString(s) => write!(f, "string reference {}+{} is outside the arena", s.offset, s.len),
        }
    }
}

impl std::error::Error for ObjectError {}

/// A packed 64-bit value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Object(u64);

impl Object {
    pub const TRUE: Self = Self(Category::Bool.discriminant() | 1);
    pub const FALSE: Self = Self(Category::Bool.discriminant());
    pub const NULL: Self = Self(Category::Null.discriminant());

    /// Packs a decoded value.
    pub fn pack(value: Value) -> Result<Self, ObjectError> {
        Ok(match value {
            Value::Number(n) => return Self::number(n),
            Value::Ptr(ptr) => Self::ptr(ptr.tag, ptr.addr),
            Value::Str(s) => Self::str_ref(s),
            Value::Bytes(bytes) => Self::bytes(bytes),
            Value::I32(n) => Self::boxed(Category::I32, u64::from(n.cast_unsigned())),
            Value::U32(n) => Self::boxed(Category::U32, u64::from(n)),
            Value::Bool(b) => Self::bool(b),
            Value::Null => Self::NULL,
        })
    }

    pub fn number(n: f64) -> Result<Self, ObjectError> {
        if n.is_nan() {
            return Err(ObjectError::NotANumber);
        }
        Ok(Self(n.to_bits()))
    }

    #[must_use]
    pub fn bool(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    #[must_use]
    pub fn ptr(tag: PtrTag, addr: u32) -> Self {
        Self::boxed(Category::Ptr, (u64::from(tag as u16) << 32) | u64::from(addr))
    }

    #[must_use]
    pub fn str_ref(s: StrRef) -> Self {
        Self::boxed(Category::Str, (u64::from(s.len) << 32) | u64::from(s.offset))
    }

    #[must_use]
    pub fn bytes(bytes: [u8; 6]) -> Self {
        let mut wide = [0u8; 8];
        wide[..6].copy_from_slice(&bytes);
        Self::boxed(Category::Bytes, u64::from_le_bytes(wide))
    }

    #[must_use]
    pub fn i32(n: i32) -> Self {
        Self::boxed(Category::I32, u64::from(n.cast_unsigned()))
    }

    #[must_use]
    pub fn u32(n: u32) -> Self {
        Self::boxed(Category::U32, u64::from(n))
    }

    fn boxed(category: Category, payload: u64) -> Self {
        Self(category.discriminant() | (payload & PAYLOAD_MASK))
    }

    #[must_use]
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Reinterprets raw bits. No validation happens until the object is read.
    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    #[must_use]
    pub fn category(self) -> Category {
        if self.0 & QNAN != QNAN {
            return Category::Number;
        }
        let code = (u8::from(self.0 & SIGN_BIT != 0) << 2)
            | (u8::from(self.0 & TAG_HI_BIT != 0) << 1)
            | u8::from(self.0 & TAG_LO_BIT != 0);
        match code {
            0b001 => Category::Ptr,
            0b010 => Category::Str,
            0b011 => Category::Bytes,
            0b100 => Category::I32,
            0b101 => Category::U32,
            0b110 => Category::Bool,
            0b111 => Category::Null,
            _ => Category::Reserved,
        }
    }

    /// Decodes the object.
    pub fn unpack(self) -> Result<Value, ObjectError> {
        Ok(match self.category() {
            Category::Number => Value::Number(f64::from_bits(self.0)),
            Category::Ptr => Value::Ptr(self.as_ptr()?),
            Category::Str => Value::Str(self.as_str_ref()?),
            Category::Bytes => Value::Bytes(self.as_bytes()?),
            Category::I32 => Value::I32(self.as_i32()?),
            Category::U32 => Value::U32(self.as_u32()?),
            Category::Bool => Value::Bool(self.as_bool()?),
            Category::Null => Value::Null,
            Category::Reserved => {
                return Err(ObjectError::WrongType {
                    expected: Category::Number,
                    found: Category::Reserved,
                });
            }
        })
    }

    fn expect(self, expected: Category) -> Result<(), ObjectError> {
        let found = self.category();
        if found == expected {
            Ok(())
        } else {
            Err(ObjectError::WrongType { expected, found })
        }
    }

    pub fn as_number(self) -> Result<f64, ObjectError> {
        self.expect(Category::Number)?;
        Ok(f64::from_bits(self.0))
    }

    pub fn as_bool(self) -> Result<bool, ObjectError> {
        self.expect(Category::Bool)?;
        Ok(self.payload() != 0)
    }

    pub fn as_ptr(self) -> Result<Ptr, ObjectError> {
        self.expect(Category::Ptr)?;
        let raw_tag = ((self.payload() >> 32) & 0xFFFF) as u16;
        let tag = PtrTag::from_repr(raw_tag).ok_or(ObjectError::UnknownPtrTag(raw_tag))?;
        Ok(Ptr {
            tag,
            addr: (self.payload() & 0xFFFF_FFFF) as u32,
        })
    }

    pub fn as_str_ref(self) -> Result<StrRef, ObjectError> {
        self.expect(Category::Str)?;
        Ok(StrRef {
            offset: (self.payload() & 0xFFFF_FFFF) as u32,
            len: ((self.payload() >> 32) & 0xFFFF) as u16,
        })
    }

    pub fn as_bytes(self) -> Result<[u8; 6], ObjectError> {
        self.expect(Category::Bytes)?;
        let wide = self.payload().to_le_bytes();
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&wide[..6]);
        Ok(bytes)
    }

    pub fn as_i32(self) -> Result<i32, ObjectError> {
        self.expect(Category::I32)?;
        Ok(((self.payload() & 0xFFFF_FFFF) as u32).cast_signed())
    }

    pub fn as_u32(self) -> Result<u32, ObjectError> {
        self.expect(Category::U32)?;
        Ok((self.payload() & 0xFFFF_FFFF) as u32)
    }

    /// Only `false` and null are falsy.
    #[must_use]
    pub fn is_truthy(self) -> bool {
        self != Self::FALSE && self != Self::NULL
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unpack() {
            Ok(value) => write!(f, "Object({value:?})"),
            Err(_) => write!(f, "Object({:#018x})", self.0),
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Self::bool(b)
    }
}

impl TryFrom<f64> for Object {
    type Error = ObjectError;

    fn try_from(n: f64) -> Result<Self, Self::Error> {
        Self::number(n)
    }
}
