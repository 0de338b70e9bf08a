use half::f16;
use std::convert::TryFrom;
use std::fmt;

/// # Typed data value
///
/// This enum supports all the data types that can be exchanged with the Crazyflie
/// parameter and log subsystems.
///
/// The [TryFrom] trait is implemented for all matching rust primitive type. There
/// is only direct conversion implemented. For example the following is OK:
/// ```
/// # use std::convert::TryInto;
/// # use crazyflie_fleet::Value;
/// let v: u8 = Value::U8(1).try_into().unwrap();
/// ```
///
/// However the following **will panic**:
/// ``` should_panic
/// # use std::convert::TryInto;
/// # use crazyflie_fleet::Value;
/// let v: u32 = Value::U8(1).try_into().unwrap();
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F16(f16),
    F32(f32),
    F64(f64),
}

/// # Value type
///
/// This enum contains all the possible type of a [Value]
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl From<Value> for ValueType {
    fn from(value: Value) -> Self {
        match value {
            Value::U8(_) => ValueType::U8,
            Value::U16(_) => ValueType::U16,
            Value::U32(_) => ValueType::U32,
            Value::U64(_) => ValueType::U64,
            Value::I8(_) => ValueType::I8,
            Value::I16(_) => ValueType::I16,
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F16(_) => ValueType::F16,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
        }
    }
}

macro_rules! primitive_impl {
    ($ty:ident, $name:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$name(v)
            }
        }

        impl TryFrom<Value> for $ty {
            type Error = crate::Error;

            fn try_from(value: Value) -> Result<$ty, Self::Error> {
                match value {
                    Value::$name(v) => Ok(v),
                    _ => Err(Self::Error::ConversionError(format!(
                        "Cannot convert {:?} to {}",
                        value,
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

primitive_impl!(u8, U8);
primitive_impl!(u16, U16);
primitive_impl!(u32, U32);
primitive_impl!(u64, U64);
primitive_impl!(i8, I8);
primitive_impl!(i16, I16);
primitive_impl!(i32, I32);
primitive_impl!(i64, I64);
primitive_impl!(f16, F16);
primitive_impl!(f32, F32);
primitive_impl!(f64, F64);

impl Value {
    /// Convert a [Value] to a [f64].
    ///
    /// This conversion is lossless in most case but can be lossy if the value
    /// is a u64: a f64 cannot accurately store large values of a u64.
    pub fn to_f64_lossy(&self) -> f64 {
        match *self {
            Value::U8(v) => v as f64,
            Value::U16(v) => v as f64,
            Value::U32(v) => v as f64,
            Value::U64(v) => v as f64,
            Value::I8(v) => v as f64,
            Value::I16(v) => v as f64,
            Value::I32(v) => v as f64,
            Value::I64(v) => v as f64,
            Value::F16(v) => v.to_f64(),
            Value::F32(v) => v as f64,
            Value::F64(v) => v,
        }
    }

    /// True for any non-zero value
    ///
    /// Deck presence parameters are reported as integers where anything else
    /// than 0 means the deck is attached.
    pub fn is_truthy(&self) -> bool {
        self.to_f64_lossy() != 0.0
    }

    /// Parse a [Value] of a given [ValueType] from its textual representation
    ///
    /// ```
    /// # use crazyflie_fleet::{Value, ValueType};
    /// assert_eq!(Value::parse(ValueType::U8, "2").unwrap(), Value::U8(2));
    /// assert!(Value::parse(ValueType::U8, "-1").is_err());
    /// ```
    pub fn parse(value_type: ValueType, text: &str) -> Result<Value, crate::Error> {
        let text = text.trim();
        let error = |e: String| {
            crate::Error::ConversionError(format!("Cannot parse '{}' as {:?}: {}", text, value_type, e))
        };

        Ok(match value_type {
            ValueType::U8 => Value::U8(text.parse::<u8>().map_err(|e| error(e.to_string()))?),
            ValueType::U16 => Value::U16(text.parse::<u16>().map_err(|e| error(e.to_string()))?),
            ValueType::U32 => Value::U32(text.parse::<u32>().map_err(|e| error(e.to_string()))?),
            ValueType::U64 => Value::U64(text.parse::<u64>().map_err(|e| error(e.to_string()))?),
            ValueType::I8 => Value::I8(text.parse::<i8>().map_err(|e| error(e.to_string()))?),
            ValueType::I16 => Value::I16(text.parse::<i16>().map_err(|e| error(e.to_string()))?),
            ValueType::I32 => Value::I32(text.parse::<i32>().map_err(|e| error(e.to_string()))?),
            ValueType::I64 => Value::I64(text.parse::<i64>().map_err(|e| error(e.to_string()))?),
            ValueType::F16 => Value::F16(f16::from_f32(text.parse::<f32>().map_err(|e| error(e.to_string()))?)),
            ValueType::F32 => Value::F32(text.parse::<f32>().map_err(|e| error(e.to_string()))?),
            ValueType::F64 => Value::F64(text.parse::<f64>().map_err(|e| error(e.to_string()))?),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F16(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
        }
    }
}
