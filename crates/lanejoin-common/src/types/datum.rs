//! Datum and tuple types for lanejoin.
//!
//! Tuples are what relations hold and what projection writes into the
//! destination buffer. The serialized image is:
//!
//! ```text
//! +-----------+--------+-----------+--------+-----------+-----+
//! | natts (2) | tag(1) | payload.. | tag(1) | payload.. | ... |
//! +-----------+--------+-----------+--------+-----------+-----+
//! ```
//!
//! Payloads: bool 1 byte, int/float 8 bytes, text u32 length + bytes.
//! All integers are little endian.

use bytes::{Buf, BufMut};
use std::fmt;

use crate::error::{JoinError, JoinResult};

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_TEXT: u8 = 4;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
}

impl Datum {
    /// Creates a text datum.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Returns true for NULL.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer value, if any.
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text value, if any.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the bytes fed to the checksum table when hashing this value.
    ///
    /// NULL has no image.
    #[must_use]
    pub fn hash_image(&self) -> Option<Vec<u8>> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(vec![u8::from(*b)]),
            Self::Int(v) => Some(v.to_le_bytes().to_vec()),
            Self::Float(v) => Some(v.to_bits().to_le_bytes().to_vec()),
            Self::Text(s) => Some(s.as_bytes().to_vec()),
        }
    }

    /// Returns the exact serialized size of this datum.
    #[inline]
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 8,
            Self::Text(s) => 4 + s.len(),
        }
    }

    fn encode_into<B: BufMut>(&self, buf: &mut B) {
        match self {
            Self::Null => buf.put_u8(TAG_NULL),
            Self::Bool(b) => {
                buf.put_u8(TAG_BOOL);
                buf.put_u8(u8::from(*b));
            }
            Self::Int(v) => {
                buf.put_u8(TAG_INT);
                buf.put_i64_le(*v);
            }
            Self::Float(v) => {
                buf.put_u8(TAG_FLOAT);
                buf.put_f64_le(*v);
            }
            Self::Text(s) => {
                buf.put_u8(TAG_TEXT);
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
        }
    }

    fn decode_from(buf: &mut &[u8]) -> JoinResult<Self> {
        ensure(buf, 1)?;
        match buf.get_u8() {
            TAG_NULL => Ok(Self::Null),
            TAG_BOOL => {
                ensure(buf, 1)?;
                Ok(Self::Bool(buf.get_u8() != 0))
            }
            TAG_INT => {
                ensure(buf, 8)?;
                Ok(Self::Int(buf.get_i64_le()))
            }
            TAG_FLOAT => {
                ensure(buf, 8)?;
                Ok(Self::Float(buf.get_f64_le()))
            }
            TAG_TEXT => {
                ensure(buf, 4)?;
                let len = buf.get_u32_le() as usize;
                ensure(buf, len)?;
                let bytes = buf.copy_to_bytes(len);
                String::from_utf8(bytes.to_vec())
                    .map(Self::Text)
                    .map_err(|e| JoinError::internal(format!("invalid text datum: {e}")))
            }
            tag => Err(JoinError::internal(format!("unknown datum tag {tag}"))),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

fn ensure(buf: &&[u8], len: usize) -> JoinResult<()> {
    if buf.remaining() < len {
        return Err(JoinError::internal(format!(
            "truncated tuple image: need {} bytes, {} left",
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

/// An ordered list of datums.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::types::{Datum, Tuple};
///
/// let tuple = Tuple::new(vec![Datum::Int(1), Datum::text("a")]);
/// let mut image = Vec::new();
/// tuple.encode_into(&mut image);
/// assert_eq!(image.len(), tuple.encoded_len());
/// assert_eq!(Tuple::decode(&image).unwrap(), tuple);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuple {
    values: Vec<Datum>,
}

impl Tuple {
    /// Creates a tuple from its values.
    #[must_use]
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    /// Creates a tuple of integers, `None` becoming NULL.
    #[must_use]
    pub fn ints<I: IntoIterator<Item = Option<i64>>>(values: I) -> Self {
        Self::new(values.into_iter().map(Datum::from).collect())
    }

    /// Returns the number of fields.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the tuple has no fields.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the field at `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.values.get(index)
    }

    /// Returns all fields.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    /// Consumes the tuple, returning its fields.
    #[must_use]
    pub fn into_values(self) -> Vec<Datum> {
        self.values
    }

    /// Returns the exact serialized size of this tuple.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        2 + self.values.iter().map(Datum::encoded_len).sum::<usize>()
    }

    /// Serializes the tuple.
    ///
    /// # Panics
    ///
    /// Panics if the tuple has more than [`MAX_TUPLE_FIELDS`] fields.
    ///
    /// [`MAX_TUPLE_FIELDS`]: crate::constants::MAX_TUPLE_FIELDS
    pub fn encode_into<B: BufMut>(&self, buf: &mut B) {
        let natts = u16::try_from(self.values.len()).expect("too many tuple fields");
        buf.put_u16_le(natts);
        for value in &self.values {
            value.encode_into(buf);
        }
    }

    /// Deserializes a tuple image.
    pub fn decode(mut image: &[u8]) -> JoinResult<Self> {
        ensure(&image, 2)?;
        let natts = image.get_u16_le() as usize;
        let mut values = Vec::with_capacity(natts);
        for _ in 0..natts {
            values.push(Datum::decode_from(&mut image)?);
        }
        Ok(Self { values })
    }
}

impl From<Vec<Datum>> for Tuple {
    fn from(values: Vec<Datum>) -> Self {
        Self::new(values)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_len_is_exact() {
        let tuple = Tuple::new(vec![
            Datum::Null,
            Datum::Bool(true),
            Datum::Int(-5),
            Datum::Float(1.5),
            Datum::text("hello"),
        ]);
        let mut image = Vec::new();
        tuple.encode_into(&mut image);
        assert_eq!(image.len(), tuple.encoded_len());
        assert_eq!(tuple.encoded_len(), 2 + 1 + 2 + 9 + 9 + 10);
        assert_eq!(Tuple::decode(&image).unwrap(), tuple);
    }

    #[test]
    fn test_truncated_image() {
        let tuple = Tuple::ints([Some(1), Some(2)]);
        let mut image = Vec::new();
        tuple.encode_into(&mut image);
        assert!(Tuple::decode(&image[..image.len() - 1]).is_err());
    }

    #[test]
    fn test_ints_helper() {
        let tuple = Tuple::ints([Some(3), None]);
        assert_eq!(tuple.get(0), Some(&Datum::Int(3)));
        assert!(tuple.get(1).unwrap().is_null());
        assert_eq!(tuple.to_string(), "(3, NULL)");
    }

    #[test]
    fn test_hash_image() {
        assert_eq!(Datum::Null.hash_image(), None);
        assert_eq!(Datum::Int(1).hash_image().unwrap(), 1i64.to_le_bytes().to_vec());
        assert_eq!(Datum::text("ab").hash_image().unwrap(), b"ab".to_vec());
    }
}
