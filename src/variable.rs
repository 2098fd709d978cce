use std::fmt;

use thiserror::Error;

use crate::arch::Word;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("variable `{0}` has not been resolved")]
    Unresolved(String),
    #[error("variable `{name}` is {size} bytes wide; requested {requested} bytes")]
    WidthMismatch {
        name: String,
        size: usize,
        requested: usize,
    },
}

/// A decoded snapshot, tagged by width and signedness.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
}

impl Value {
    pub fn size(&self) -> usize {
        match self {
            Value::I8(_) | Value::U8(_) => 1,
            Value::I16(_) | Value::U16(_) => 2,
            Value::I32(_) | Value::U32(_) => 4,
            Value::I64(_) | Value::U64(_) => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Value::I8(_) | Value::I16(_) | Value::I32(_) | Value::I64(_)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I8(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// Primitive integers a [`Variable`] can be extracted as.
pub trait Scalar: private::Sealed + Copy {
    const SIZE: usize;

    fn from_le(bytes: [u8; 8]) -> Self;
}

macro_rules! scalar {
    ($($t:ty),*) => {
        $(
            impl private::Sealed for $t {}

            impl Scalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le(bytes: [u8; 8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }
            }
        )*
    };
}

scalar!(i8, u8, i16, u16, i32, u32, i64, u64);

/// The traced global: its client-declared name and signedness, plus the
/// address, width and latest payload filled in by the tracer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    name: String,
    signed: bool,
    address: Word,
    size: usize,
    bytes: [u8; 8],
}

impl Variable {
    pub fn new<S: Into<String>>(name: S, signed: bool) -> Self {
        Self {
            name: name.into(),
            signed,
            address: 0,
            size: 0,
            bytes: [0; 8],
        }
    }

    pub fn unsigned<S: Into<String>>(name: S) -> Self {
        Self::new(name, false)
    }

    pub fn signed<S: Into<String>>(name: S) -> Self {
        Self::new(name, true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Runtime address; `0` until resolved.
    pub fn address(&self) -> Word {
        self.address
    }

    /// Width in bytes; `0` until resolved.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_resolved(&self) -> bool {
        self.address != 0
    }

    /// Raw little-endian payload, `size()` bytes long.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.size]
    }

    pub(crate) fn resolve(&mut self, address: Word, size: usize) {
        debug_assert!(!self.is_resolved(), "variable resolved twice");
        self.address = address;
        self.size = size;
        self.bytes = [0; 8];
    }

    pub(crate) fn unresolve(&mut self) {
        self.address = 0;
        self.size = 0;
        self.bytes = [0; 8];
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        let len = bytes.len().min(self.size);
        self.bytes = [0; 8];
        self.bytes[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn value(&self) -> Result<Value, Error> {
        let value = match (self.size, self.signed) {
            (1, true) => Value::I8(self.raw()),
            (1, false) => Value::U8(self.raw()),
            (2, true) => Value::I16(self.raw()),
            (2, false) => Value::U16(self.raw()),
            (4, true) => Value::I32(self.raw()),
            (4, false) => Value::U32(self.raw()),
            (8, true) => Value::I64(self.raw()),
            (8, false) => Value::U64(self.raw()),
            _ => return Err(Error::Unresolved(self.name.clone())),
        };
        Ok(value)
    }

    /// Reinterprets the payload as `T`, which must be exactly as wide as the
    /// variable. Signedness follows `T`.
    pub fn get<T: Scalar>(&self) -> Result<T, Error> {
        if self.size == 0 {
            return Err(Error::Unresolved(self.name.clone()));
        }

        if T::SIZE != self.size {
            return Err(Error::WidthMismatch {
                name: self.name.clone(),
                size: self.size,
                requested: T::SIZE,
            });
        }

        Ok(self.raw())
    }

    fn raw<T: Scalar>(&self) -> T {
        T::from_le(self.bytes)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Ok(value) => fmt::Display::fmt(&value, f),
            Err(_) => f.write_str("undefined"),
        }
    }
}
