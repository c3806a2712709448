use std::fmt::{Display, Formatter};

use num_traits::NumCast;
use ragged_error::{RaggedResult, ragged_err};

use crate::PType;

/// One primitive value extracted from a flat buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PValue {
    /// A boolean value
    Bool(bool),
    /// An 8-bit unsigned integer
    U8(u8),
    /// A 16-bit unsigned integer
    U16(u16),
    /// A 32-bit unsigned integer
    U32(u32),
    /// A 64-bit unsigned integer
    U64(u64),
    /// An 8-bit signed integer
    I8(i8),
    /// A 16-bit signed integer
    I16(i16),
    /// A 32-bit signed integer
    I32(i32),
    /// A 64-bit signed integer
    I64(i64),
    /// A 32-bit floating point number
    F32(f32),
    /// A 64-bit floating point number
    F64(f64),
}

impl PValue {
    /// The physical type of this value.
    pub fn ptype(&self) -> PType {
        match self {
            Self::Bool(_) => PType::Bool,
            Self::U8(_) => PType::U8,
            Self::U16(_) => PType::U16,
            Self::U32(_) => PType::U32,
            Self::U64(_) => PType::U64,
            Self::I8(_) => PType::I8,
            Self::I16(_) => PType::I16,
            Self::I32(_) => PType::I32,
            Self::I64(_) => PType::I64,
            Self::F32(_) => PType::F32,
            Self::F64(_) => PType::F64,
        }
    }

    /// Whether this value is an integer (signed or unsigned).
    pub fn is_int(&self) -> bool {
        self.ptype().is_int()
    }

    /// The value as an `i64`, if it is an integer that fits.
    pub fn as_i64(&self) -> RaggedResult<i64> {
        let out: Option<i64> = match *self {
            Self::Bool(v) => Some(v as i64),
            Self::U8(v) => NumCast::from(v),
            Self::U16(v) => NumCast::from(v),
            Self::U32(v) => NumCast::from(v),
            Self::U64(v) => NumCast::from(v),
            Self::I8(v) => NumCast::from(v),
            Self::I16(v) => NumCast::from(v),
            Self::I32(v) => NumCast::from(v),
            Self::I64(v) => Some(v),
            Self::F32(_) | Self::F64(_) => None,
        };
        out.ok_or_else(|| ragged_err!(TypeMismatch: "{self} is not representable as i64"))
    }

    /// The value as an `f64`, converting integers exactly where possible.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Bool(v) => v as u8 as f64,
            Self::U8(v) => v as f64,
            Self::U16(v) => v as f64,
            Self::U32(v) => v as f64,
            Self::U64(v) => v as f64,
            Self::I8(v) => v as f64,
            Self::I16(v) => v as f64,
            Self::I32(v) => v as f64,
            Self::I64(v) => v as f64,
            Self::F32(v) => v as f64,
            Self::F64(v) => v,
        }
    }

    /// The value as a `bool`, if it is one.
    pub fn as_bool(&self) -> RaggedResult<bool> {
        match *self {
            Self::Bool(v) => Ok(v),
            _ => Err(ragged_err!(TypeMismatch: "{self} is not a bool")),
        }
    }
}

impl Display for PValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}u8"),
            Self::U16(v) => write!(f, "{v}u16"),
            Self::U32(v) => write!(f, "{v}u32"),
            Self::U64(v) => write!(f, "{v}u64"),
            Self::I8(v) => write!(f, "{v}i8"),
            Self::I16(v) => write!(f, "{v}i16"),
            Self::I32(v) => write!(f, "{v}i32"),
            Self::I64(v) => write!(f, "{v}i64"),
            Self::F32(v) => write!(f, "{v}f32"),
            Self::F64(v) => write!(f, "{v}f64"),
        }
    }
}

macro_rules! pvalue_from {
    ($T:ty, $variant:tt) => {
        impl From<$T> for PValue {
            fn from(value: $T) -> Self {
                PValue::$variant(value)
            }
        }
    };
}

pvalue_from!(bool, Bool);
pvalue_from!(u8, U8);
pvalue_from!(u16, U16);
pvalue_from!(u32, U32);
pvalue_from!(u64, U64);
pvalue_from!(i8, I8);
pvalue_from!(i16, I16);
pvalue_from!(i32, I32);
pvalue_from!(i64, I64);
pvalue_from!(f32, F32);
pvalue_from!(f64, F64);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips() {
        assert_eq!(PValue::from(42i32).as_i64().unwrap(), 42);
        assert_eq!(PValue::from(42u64).as_i64().unwrap(), 42);
        assert_eq!(PValue::from(2.5f64).as_f64(), 2.5);
        assert!(PValue::from(true).as_bool().unwrap());
    }

    #[test]
    fn float_is_not_i64() {
        assert!(PValue::from(1.5f32).as_i64().is_err());
    }

    #[test]
    fn ptype_of() {
        assert_eq!(PValue::from(1i8).ptype(), PType::I8);
        assert_eq!(PValue::from(false).ptype(), PType::Bool);
    }
}
