//! Checksum table shared by every hash computation of a join.

use lanejoin_common::constants::CHECKSUM_TABLE_SIZE;
use lanejoin_common::types::Datum;

/// Reflected CRC-32 polynomial.
const CRC32_POLY: u32 = 0xEDB8_8320;

/// 256-entry table driving the join-key hash function.
///
/// Hashes are the standard reflected CRC-32 of the key byte image, so
/// a table built with [`ChecksumTable::crc32`] agrees with any other
/// CRC-32 implementation.
///
/// # Example
///
/// ```rust
/// use lanejoin_exec::relation::ChecksumTable;
///
/// let table = ChecksumTable::crc32();
/// assert_eq!(table.hash_bytes(b"123456789"), 0xCBF4_3926);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ChecksumTable {
    table: [u32; CHECKSUM_TABLE_SIZE],
}

impl ChecksumTable {
    /// Builds the reflected CRC-32 table.
    #[must_use]
    pub fn crc32() -> Self {
        let mut table = [0u32; CHECKSUM_TABLE_SIZE];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u32;
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ CRC32_POLY
                } else {
                    crc >> 1
                };
            }
            *entry = crc;
        }
        Self { table }
    }

    /// Wraps a table built elsewhere.
    #[must_use]
    pub fn from_table(table: [u32; CHECKSUM_TABLE_SIZE]) -> Self {
        Self { table }
    }

    /// Returns entry `index` of the table.
    #[inline]
    #[must_use]
    pub fn entry(&self, index: u8) -> u32 {
        self.table[index as usize]
    }

    /// Folds `bytes` into a running checksum state.
    #[inline]
    #[must_use]
    pub fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        for &b in bytes {
            crc = self.table[((crc ^ u32::from(b)) & 0xff) as usize] ^ (crc >> 8);
        }
        crc
    }

    /// Hashes a byte image.
    #[must_use]
    pub fn hash_bytes(&self, bytes: &[u8]) -> u32 {
        !self.update(!0, bytes)
    }

    /// Hashes a sequence of join keys.
    ///
    /// Returns `None` if any key is NULL: such keys can never satisfy an
    /// equality join and must not probe a hash table.
    #[must_use]
    pub fn hash_datums<'a, I>(&self, keys: I) -> Option<u32>
    where
        I: IntoIterator<Item = &'a Datum>,
    {
        let mut crc = !0;
        for key in keys {
            crc = self.update(crc, &key.hash_image()?);
        }
        Some(!crc)
    }
}

impl Default for ChecksumTable {
    fn default() -> Self {
        Self::crc32()
    }
}

impl std::fmt::Debug for ChecksumTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumTable")
            .field("entry1", &format_args!("{:#010x}", self.table[1]))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        let table = ChecksumTable::crc32();
        assert_eq!(table.entry(1), 0x7707_3096);
        assert_eq!(table.hash_bytes(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_matches_crc32fast() {
        let table = ChecksumTable::crc32();
        for input in [&b""[..], b"a", b"lanejoin", &[0u8, 255, 17, 42][..]] {
            assert_eq!(table.hash_bytes(input), crc32fast::hash(input));
        }
    }

    #[test]
    fn test_hash_datums() {
        let table = ChecksumTable::crc32();
        let a = Datum::Int(7);
        let b = Datum::text("x");

        let mut image = 7i64.to_le_bytes().to_vec();
        image.extend_from_slice(b"x");
        assert_eq!(table.hash_datums([&a, &b]), Some(crc32fast::hash(&image)));

        assert_eq!(table.hash_datums([&a, &Datum::Null]), None);
        assert_eq!(table.hash_datums([&Datum::Int(7)]), table.hash_datums([&a]));
    }
}
