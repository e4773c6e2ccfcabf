//! Triple-slot batch buffer.
//!
//! ```text
//!          +------+------+------+
//! Send <-  | prev | next | work |  <- send()
//!          +------+------+------+
//! ```
//!
//! Three byte buffers are allocated once and play the `prev`, `work` and
//! `next` roles in turn. Rotation swaps role indices; bytes are never copied
//! and slots are never reallocated. Each slot keeps its first
//! [`WINDOW_FRAME_SIZE`] bytes free for the window header, which is only
//! written when the batch is sealed for transmission and its final count is
//! known.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    error::{CodecError, StateError},
    protocol::{WINDOW_FRAME_SIZE, encode_data, encode_window},
};

/// Byte storage of one slot, shared with the writer thread while in flight.
pub(crate) type SlotBytes = Arc<Mutex<Vec<u8>>>;

#[derive(Debug)]
struct Slot {
    bytes: SlotBytes,
    offset: usize,
    data_count: u32,
    last_sequence: u32,
}

impl Slot {
    fn new(capacity: usize) -> Self {
        Self {
            bytes: Arc::new(Mutex::new(vec![0; capacity])),
            offset: WINDOW_FRAME_SIZE,
            data_count: 0,
            last_sequence: 0,
        }
    }

    fn reset(&mut self) {
        self.offset = WINDOW_FRAME_SIZE;
        self.data_count = 0;
        self.last_sequence = 0;
    }

    fn is_empty(&self) -> bool {
        self.data_count == 0
    }
}

/// A sealed batch ready to be written to the socket.
#[derive(Clone, Debug)]
pub(crate) struct Batch {
    pub(crate) bytes: SlotBytes,
    pub(crate) len: usize,
    pub(crate) data_count: u32,
    pub(crate) last_sequence: u32,
}

/// Rotating set of three reusable batch slots.
#[derive(Debug)]
pub(crate) struct BatchBuffer {
    slots: [Slot; 3],
    prev: usize,
    work: usize,
    next: Option<usize>,
    capacity: usize,
}

impl BatchBuffer {
    /// Allocate three slots of `capacity` bytes each.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: [Slot::new(capacity), Slot::new(capacity), Slot::new(capacity)],
            prev: 0,
            work: 1,
            next: None,
            capacity,
        }
    }

    /// Capacity of each slot in bytes.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records in the `work` slot.
    pub(crate) fn work_count(&self) -> u32 {
        self.slots[self.work].data_count
    }

    /// True when `work` holds records or a pushed-back batch waits in `next`.
    pub(crate) fn has_unsent(&self) -> bool {
        self.next.is_some() || !self.slots[self.work].is_empty()
    }

    /// Append one record to `work` as a data frame.
    ///
    /// Nothing is committed when the record does not fit.
    pub(crate) fn append<K, V>(&mut self, sequence: u32, record: &[(K, V)]) -> Result<(), CodecError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let slot = &mut self.slots[self.work];
        let written = {
            let mut bytes = slot.bytes.lock();
            encode_data(&mut bytes[slot.offset..], sequence, record)?
        };
        slot.offset += written;
        slot.data_count += 1;
        slot.last_sequence = sequence;
        Ok(())
    }

    /// Retire `prev` and move the oldest unsent batch into its place.
    ///
    /// Without a pushed-back batch, `prev` and `work` swap roles and the
    /// vacated slot becomes an empty `work`. With one, `next` becomes `prev`
    /// and the vacated slot becomes the spare.
    pub(crate) fn pop_front(&mut self) {
        let vacated = self.prev;
        self.slots[vacated].reset();
        match self.next.take() {
            Some(next) => self.prev = next,
            None => {
                self.prev = self.work;
                self.work = vacated;
            }
        }
    }

    /// Queue the batch in `prev` to be sent again before anything in `work`.
    pub(crate) fn push_front(&mut self) -> Result<(), StateError> {
        if self.next.is_some() {
            return Err(StateError::InvalidState(
                "push_front requires an empty next slot",
            ));
        }
        let spare = self.spare();
        self.next = Some(self.prev);
        self.prev = spare;
        Ok(())
    }

    /// Write the window header into `prev` and return its bytes for sending.
    pub(crate) fn seal_front(&mut self) -> Option<Batch> {
        let slot = &self.slots[self.prev];
        if slot.is_empty() {
            return None;
        }
        {
            let mut bytes = slot.bytes.lock();
            // Every slot reserves its first WINDOW_FRAME_SIZE bytes.
            encode_window(&mut bytes[..WINDOW_FRAME_SIZE], slot.data_count).ok()?;
        }
        Some(Batch {
            bytes: Arc::clone(&slot.bytes),
            len: slot.offset,
            data_count: slot.data_count,
            last_sequence: slot.last_sequence,
        })
    }

    fn spare(&self) -> usize {
        // Slot indices are 0, 1 and 2.
        3 - self.prev - self.work
    }
}
