//! Destination buffer.
//!
//! A fixed-capacity row-format buffer shared by every group of a run:
//!
//! ```text
//! +------+---------------------+ ... free ... +-----------+-----------+
//! | head | row index (u32 x n) |              | tuple n-1 | tuple 0.. |
//! +------+---------------------+ ... free ... +-----------+-----------+
//! 0      HEAD                  grows ->          <- grows        length
//! ```
//!
//! Row count and byte usage live in one packed atomic word, so a group
//! reserves room for its whole batch with a single compare-and-swap that
//! is refused when the batch would not fit. A refused batch writes nothing.
//!
//! Tuple items are 8-byte aligned from the end of the buffer and stored as
//! atomic words; reserved ranges are disjoint, so writers never wait on
//! each other.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bytes::BufMut;

use lanejoin_common::constants::{
    max_align, DESTINATION_HEAD_LENGTH, ROW_INDEX_ENTRY_SIZE, TUPLE_ITEM_HEADER_SIZE,
};
use lanejoin_common::error::{JoinError, JoinResult};
use lanejoin_common::types::Tuple;

/// Row-format destination of a join.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::types::Tuple;
/// use lanejoin_exec::destination::DestinationBuffer;
///
/// let tuple = Tuple::ints([Some(1), Some(2)]);
/// let length = DestinationBuffer::required_length([tuple.encoded_len()]);
/// let dest = DestinationBuffer::new(length).unwrap();
///
/// let (row, usage) = dest.reserve(1, DestinationBuffer::item_size(&tuple) as u32).unwrap();
/// dest.write_tuple(row, usage, &tuple);
/// assert_eq!(dest.tuple(0).unwrap(), tuple);
/// assert!(dest.reserve(1, 8).is_none());
/// ```
pub struct DestinationBuffer {
    length: u32,
    /// `nitems << 32 | usage`
    state: AtomicU64,
    row_index: Box<[AtomicU32]>,
    /// Item words; word `w` covers bytes `pad + 8w..pad + 8w + 8`, where
    /// `pad = length % 8`.
    data: Box<[AtomicU64]>,
}

impl DestinationBuffer {
    /// Allocates a buffer of `length` bytes.
    pub fn new(length: usize) -> JoinResult<Self> {
        if length < DESTINATION_HEAD_LENGTH {
            return Err(JoinError::invalid_config(format!(
                "destination length {length} is below the {DESTINATION_HEAD_LENGTH}-byte head"
            )));
        }
        let length32 = u32::try_from(length).map_err(|_| {
            JoinError::invalid_config(format!("destination length {length} exceeds u32"))
        })?;
        let max_rows = (length - DESTINATION_HEAD_LENGTH) / ROW_INDEX_ENTRY_SIZE;
        let row_index = (0..max_rows)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            length: length32,
            state: AtomicU64::new(0),
            row_index,
            data: (0..length / WORD_SIZE)
                .map(|_| AtomicU64::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        })
    }

    /// Returns the bytes a buffer needs to hold tuples of the given
    /// encoded lengths.
    #[must_use]
    pub fn required_length<I>(encoded_lens: I) -> usize
    where
        I: IntoIterator<Item = usize>,
    {
        let (rows, usage) = encoded_lens
            .into_iter()
            .fold((0usize, 0usize), |(rows, usage), len| {
                (rows + 1, usage + max_align(TUPLE_ITEM_HEADER_SIZE + len))
            });
        DESTINATION_HEAD_LENGTH + max_align(ROW_INDEX_ENTRY_SIZE * rows) + usage
    }

    /// Returns the bytes one tuple occupies in the data area.
    #[inline]
    #[must_use]
    pub fn item_size(tuple: &Tuple) -> usize {
        max_align(TUPLE_ITEM_HEADER_SIZE + tuple.encoded_len())
    }

    /// Returns the total length.
    #[inline]
    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Returns the number of reserved tuples.
    #[inline]
    #[must_use]
    pub fn nitems(&self) -> u32 {
        unpack(self.state.load(Ordering::Acquire)).0
    }

    /// Returns the reserved data bytes.
    #[inline]
    #[must_use]
    pub fn usage(&self) -> u32 {
        unpack(self.state.load(Ordering::Acquire)).1
    }

    /// Returns the bytes neither reserved nor taken by the row index.
    #[must_use]
    pub fn free_space(&self) -> u64 {
        let (nitems, usage) = unpack(self.state.load(Ordering::Acquire));
        u64::from(self.length).saturating_sub(consumed(nitems, usage))
    }

    /// Reserves `rows` row-index entries and `bytes` data bytes at once.
    ///
    /// Returns the first row index and the usage before the reservation,
    /// or `None` if the batch does not fit; a refused batch changes nothing.
    pub fn reserve(&self, rows: u32, bytes: u32) -> Option<(u32, u32)> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let (nitems, usage) = unpack(current);
            let new_nitems = nitems.checked_add(rows)?;
            let new_usage = usage.checked_add(bytes)?;
            if consumed(new_nitems, new_usage) > u64::from(self.length) {
                return None;
            }
            match self.state.compare_exchange_weak(
                current,
                pack(new_nitems, new_usage),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some((nitems, usage)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Writes `tuple` as row `index`, its item ending `usage_offset` bytes
    /// from the end of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the row or byte range was not reserved.
    pub fn write_tuple(&self, index: u32, usage_offset: u32, tuple: &Tuple) {
        let (nitems, usage) = unpack(self.state.load(Ordering::Acquire));
        let required = Self::item_size(tuple);
        assert!(index < nitems, "row {index} not reserved ({nitems} rows)");
        assert!(
            usage_offset as usize + required <= usage as usize,
            "tuple bytes [{usage_offset}, +{required}) not reserved ({usage} bytes)"
        );

        let mut item = Vec::with_capacity(required);
        item.put_u32_le(tuple.encoded_len() as u32);
        item.put_u32_le(index);
        tuple.encode_into(&mut item);
        item.resize(required, 0);

        let offset = self.length as usize - (usage_offset as usize + required);
        let first = self.word_index(offset);
        for (word, bytes) in self.data[first..first + required / WORD_SIZE]
            .iter()
            .zip(item.chunks_exact(WORD_SIZE))
        {
            let mut image = [0u8; WORD_SIZE];
            image.copy_from_slice(bytes);
            word.store(u64::from_le_bytes(image), Ordering::Relaxed);
        }
        self.row_index[index as usize].store(offset as u32, Ordering::Release);
    }

    /// Decodes tuple `index`.
    pub fn tuple(&self, index: u32) -> JoinResult<Tuple> {
        if index >= self.nitems() {
            return Err(JoinError::internal(format!(
                "tuple {index} out of range ({} tuples)",
                self.nitems()
            )));
        }
        let offset = self.row_index[index as usize].load(Ordering::Acquire) as usize;
        let first = self.word_index(offset);
        let header = self
            .data
            .get(first)
            .ok_or_else(|| JoinError::internal(format!("tuple {index} has no header")))?
            .load(Ordering::Relaxed);
        let len = (header & u64::from(u32::MAX)) as usize;

        let nwords = max_align(TUPLE_ITEM_HEADER_SIZE + len) / WORD_SIZE;
        let words = self
            .data
            .get(first..first + nwords)
            .ok_or_else(|| JoinError::internal(format!("tuple {index} is truncated")))?;
        let mut item = Vec::with_capacity(nwords * WORD_SIZE);
        for word in words {
            item.put_u64_le(word.load(Ordering::Relaxed));
        }
        Tuple::decode(&item[TUPLE_ITEM_HEADER_SIZE..TUPLE_ITEM_HEADER_SIZE + len])
    }

    /// Maps an item byte offset to its first data word.
    #[inline]
    fn word_index(&self, offset: usize) -> usize {
        (offset - self.length as usize % WORD_SIZE) / WORD_SIZE
    }

    /// Decodes every tuple in row order.
    pub fn tuples(&self) -> JoinResult<Vec<Tuple>> {
        (0..self.nitems()).map(|i| self.tuple(i)).collect()
    }

    /// Empties the buffer for reuse.
    pub fn reset(&mut self) {
        *self.state.get_mut() = 0;
        for entry in self.row_index.iter_mut() {
            *entry.get_mut() = 0;
        }
        for word in self.data.iter_mut() {
            *word.get_mut() = 0;
        }
    }
}

impl std::fmt::Debug for DestinationBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationBuffer")
            .field("length", &self.length)
            .field("nitems", &self.nitems())
            .field("usage", &self.usage())
            .finish()
    }
}

const WORD_SIZE: usize = std::mem::size_of::<u64>();

#[inline]
fn pack(nitems: u32, usage: u32) -> u64 {
    (u64::from(nitems) << 32) | u64::from(usage)
}

#[inline]
fn unpack(word: u64) -> (u32, u32) {
    ((word >> 32) as u32, word as u32)
}

#[inline]
fn consumed(nitems: u32, usage: u32) -> u64 {
    (DESTINATION_HEAD_LENGTH + max_align(ROW_INDEX_ENTRY_SIZE * nitems as usize)) as u64
        + u64::from(usage)
}
