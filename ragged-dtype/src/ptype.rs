//! Physical type definitions and behavior.

use std::fmt::{Debug, Display, Formatter};

use num_traits::{Bounded, FromPrimitive, NumCast, ToPrimitive};

/// Physical type enum; names the in-memory layout of one element of a flat buffer.
///
/// `Bool` is stored one byte per element (zero = false); everything else is stored as
/// the matching native type in little-endian order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PType {
    /// A boolean, stored as one byte
    Bool,
    /// An 8-bit unsigned integer
    U8,
    /// A 16-bit unsigned integer
    U16,
    /// A 32-bit unsigned integer
    U32,
    /// A 64-bit unsigned integer
    U64,
    /// An 8-bit signed integer
    I8,
    /// A 16-bit signed integer
    I16,
    /// A 32-bit signed integer
    I32,
    /// A 64-bit signed integer
    I64,
    /// A 32-bit floating point number
    F32,
    /// A 64-bit floating point number
    F64,
}

/// A trait for native Rust types that correspond 1:1 to a PType.
///
/// `Bool` is represented by its storage type `u8`, so every `PType` has exactly one
/// `NativePType` storage type and `match_each_native_ptype!` is total.
pub trait NativePType:
    Send
    + Sync
    + Clone
    + Copy
    + Debug
    + Display
    + PartialEq
    + PartialOrd
    + Default
    + NumCast
    + ToPrimitive
    + FromPrimitive
    + Bounded
{
    /// The PType that corresponds to this native type
    const PTYPE: PType;
}

macro_rules! native_ptype {
    ($T:ty, $ptype:tt) => {
        impl NativePType for $T {
            const PTYPE: PType = PType::$ptype;
        }
    };
}

native_ptype!(u8, U8);
native_ptype!(u16, U16);
native_ptype!(u32, U32);
native_ptype!(u64, U64);
native_ptype!(i8, I8);
native_ptype!(i16, I16);
native_ptype!(i32, I32);
native_ptype!(i64, I64);
native_ptype!(f32, F32);
native_ptype!(f64, F64);

/// Macro to match over each PType, binding the corresponding native storage type (from
/// `NativePType`). `Bool` binds `u8`, its storage type.
#[macro_export]
macro_rules! match_each_native_ptype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::PType;
        match $self {
            PType::Bool => __with__! { u8 },
            PType::I8 => __with__! { i8 },
            PType::I16 => __with__! { i16 },
            PType::I32 => __with__! { i32 },
            PType::I64 => __with__! { i64 },
            PType::U8 => __with__! { u8 },
            PType::U16 => __with__! { u16 },
            PType::U32 => __with__! { u32 },
            PType::U64 => __with__! { u64 },
            PType::F32 => __with__! { f32 },
            PType::F64 => __with__! { f64 },
        }
    })
}

/// Macro to match over each integer PType, binding the corresponding native type (from
/// `NativePType`).
#[macro_export]
macro_rules! match_each_integer_ptype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::PType;
        match $self {
            PType::I8 => __with__! { i8 },
            PType::I16 => __with__! { i16 },
            PType::I32 => __with__! { i32 },
            PType::I64 => __with__! { i64 },
            PType::U8 => __with__! { u8 },
            PType::U16 => __with__! { u16 },
            PType::U32 => __with__! { u32 },
            PType::U64 => __with__! { u64 },
            other => panic!("Unsupported ptype {other}"),
        }
    })
}

/// Macro to match over each floating point PType, binding the corresponding native type
/// (from `NativePType`).
#[macro_export]
macro_rules! match_each_float_ptype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        use $crate::PType;
        match $self {
            PType::F32 => __with__! { f32 },
            PType::F64 => __with__! { f64 },
            other => panic!("Unsupported ptype {other}"),
        }
    })
}

impl PType {
    /// Returns `true` iff this PType is an unsigned integer type
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// Returns `true` iff this PType is a signed integer type
    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Returns `true` iff this PType is an integer type
    pub const fn is_int(self) -> bool {
        self.is_unsigned_int() || self.is_signed_int()
    }

    /// Returns `true` iff this PType is a floating point type
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Returns `true` iff this PType is `Bool`
    pub const fn is_bool(self) -> bool {
        matches!(self, Self::Bool)
    }

    /// Returns the number of bytes one element occupies
    pub const fn byte_width(&self) -> usize {
        match_each_native_ptype!(self, |$T| std::mem::size_of::<$T>())
    }

    /// Returns the number of bits one element occupies
    pub const fn bit_width(&self) -> usize {
        self.byte_width() * 8
    }

    /// The smallest type that can represent every value of both `self` and `other`,
    /// saturating at 64 bits.
    ///
    /// Mixing a float with any integer widens to `F64`; mixing signednesses widens to
    /// the smallest signed type that contains the unsigned side, capped at `I64`. `Bool`
    /// promotes through its `U8` storage when `allow_bool` permits mixing it with
    /// numbers at all; the caller enforces that rule.
    pub fn promote(self, other: PType) -> PType {
        if self == other {
            return self;
        }
        let a = if self == PType::Bool { PType::U8 } else { self };
        let b = if other == PType::Bool { PType::U8 } else { other };
        if a == b {
            return a;
        }

        if a.is_float() || b.is_float() {
            return if a == PType::F32 && b == PType::F32 {
                PType::F32
            } else {
                PType::F64
            };
        }

        let width = a.byte_width().max(b.byte_width());
        match (a.is_signed_int(), b.is_signed_int()) {
            (true, true) => signed_of_width(width),
            (false, false) => unsigned_of_width(width),
            // Mixed signedness: the unsigned side needs one extra bit, so jump to the
            // next wider signed type, capped at i64.
            (true, false) => {
                let unsigned_width = b.byte_width();
                signed_of_width(width.max((unsigned_width * 2).min(8)))
            }
            (false, true) => {
                let unsigned_width = a.byte_width();
                signed_of_width(width.max((unsigned_width * 2).min(8)))
            }
        }
    }
}

const fn signed_of_width(bytes: usize) -> PType {
    match bytes {
        1 => PType::I8,
        2 => PType::I16,
        4 => PType::I32,
        _ => PType::I64,
    }
}

const fn unsigned_of_width(bytes: usize) -> PType {
    match bytes {
        1 => PType::U8,
        2 => PType::U16,
        4 => PType::U32,
        _ => PType::U64,
    }
}

impl Display for PType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::U8 => write!(f, "u8"),
            Self::U16 => write!(f, "u16"),
            Self::U32 => write!(f, "u32"),
            Self::U64 => write!(f, "u64"),
            Self::I8 => write!(f, "i8"),
            Self::I16 => write!(f, "i16"),
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(PType::Bool.byte_width(), 1);
        assert_eq!(PType::U8.byte_width(), 1);
        assert_eq!(PType::I32.byte_width(), 4);
        assert_eq!(PType::F64.byte_width(), 8);
        assert_eq!(PType::U16.bit_width(), 16);
    }

    #[test]
    fn promote_same() {
        assert_eq!(PType::I32.promote(PType::I32), PType::I32);
        assert_eq!(PType::Bool.promote(PType::Bool), PType::Bool);
    }

    #[test]
    fn promote_int_float() {
        assert_eq!(PType::I64.promote(PType::F64), PType::F64);
        assert_eq!(PType::I8.promote(PType::F32), PType::F64);
        assert_eq!(PType::F32.promote(PType::F32), PType::F32);
        assert_eq!(PType::F32.promote(PType::F64), PType::F64);
    }

    #[test]
    fn promote_mixed_signedness() {
        assert_eq!(PType::U8.promote(PType::I8), PType::I16);
        assert_eq!(PType::U32.promote(PType::I16), PType::I64);
        assert_eq!(PType::U64.promote(PType::I64), PType::I64);
        assert_eq!(PType::U16.promote(PType::U32), PType::U32);
        assert_eq!(PType::I16.promote(PType::I64), PType::I64);
    }

    #[test]
    fn promote_bool_through_storage() {
        assert_eq!(PType::Bool.promote(PType::I32), PType::I32);
        assert_eq!(PType::Bool.promote(PType::U8), PType::U8);
    }
}
