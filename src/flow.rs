//! Admission control and confirmation credits.
//!
//! The flow controller decides what happens to a record that does not fit
//! the `work` slot, keeps the FIFO queue of producers parked under the `Wait`
//! policy, owns the sequence counter, and tracks the credits a batch in
//! flight must collect before the next batch may be transmitted.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::{
    batch_buffer::BatchBuffer,
    config::{SendConfirmPolicy, SendFullPolicy},
    error::SendError,
    protocol::data_frame_len,
};

/// Outcome of a successful admission check.
#[derive(Debug)]
pub(crate) enum Admission {
    /// The record was encoded into `work` under the next sequence number.
    Accepted,
    /// The buffer was full and the `Drop` policy discarded the record.
    Dropped,
    /// The caller must block on the receiver until released.
    Queued(Receiver<Result<(), SendError>>),
}

#[derive(Debug)]
struct PendingRecord {
    pairs: Vec<(String, String)>,
    release: Sender<Result<(), SendError>>,
}

impl PendingRecord {
    fn release(self, outcome: Result<(), SendError>) {
        // The producer may have gone away; nothing is waiting then.
        let _ = self.release.send(outcome);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct InFlight {
    last_sequence: u32,
    credits: u8,
    acked: bool,
}

/// Counters of records released from the wait queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Released {
    pub(crate) admitted: usize,
    pub(crate) rejected: usize,
}

#[derive(Debug)]
pub(crate) struct FlowController {
    send_full: SendFullPolicy,
    send_confirm: SendConfirmPolicy,
    sequence: u32,
    pending: VecDeque<PendingRecord>,
    in_flight: Option<InFlight>,
}

impl FlowController {
    pub(crate) fn new(send_full: SendFullPolicy, send_confirm: SendConfirmPolicy) -> Self {
        Self {
            send_full,
            send_confirm,
            sequence: 0,
            pending: VecDeque::new(),
            in_flight: None,
        }
    }

    fn next_sequence(&self) -> u32 {
        match self.sequence.wrapping_add(1) {
            0 => 1,
            seq => seq,
        }
    }

    fn try_append<K, V>(&mut self, buffer: &mut BatchBuffer, record: &[(K, V)]) -> bool
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let sequence = self.next_sequence();
        if buffer.append(sequence, record).is_err() {
            return false;
        }
        self.sequence = sequence;
        true
    }

    /// Admit `record` into `work` or apply the configured `SendFull` policy.
    pub(crate) fn admit<K, V>(
        &mut self,
        buffer: &mut BatchBuffer,
        record: &[(K, V)],
    ) -> Result<Admission, SendError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.send_full == SendFullPolicy::Wait && !self.pending.is_empty() {
            return Ok(self.enqueue(record));
        }
        if self.try_append(buffer, record) {
            return Ok(Admission::Accepted);
        }
        if buffer.work_count() == 0 {
            return Err(SendError::RecordTooLarge {
                size: data_frame_len(record),
                capacity: buffer.capacity(),
            });
        }
        match self.send_full {
            SendFullPolicy::Drop => Ok(Admission::Dropped),
            SendFullPolicy::Throw => Err(SendError::BufferFull),
            SendFullPolicy::Wait => Ok(self.enqueue(record)),
        }
    }

    fn enqueue<K, V>(&mut self, record: &[(K, V)]) -> Admission
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (release, waiter) = bounded(1);
        let pairs = record
            .iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();
        self.pending.push_back(PendingRecord { pairs, release });
        Admission::Queued(waiter)
    }

    /// Move queued records into `work` in FIFO order until one does not fit.
    pub(crate) fn release_pending(&mut self, buffer: &mut BatchBuffer) -> Released {
        let mut released = Released::default();
        while let Some(front) = self.pending.front() {
            let sequence = self.next_sequence();
            if buffer.append(sequence, &front.pairs).is_ok() {
                self.sequence = sequence;
                if let Some(record) = self.pending.pop_front() {
                    record.release(Ok(()));
                }
                released.admitted += 1;
            } else if buffer.work_count() == 0 {
                let size = data_frame_len(&front.pairs);
                if let Some(record) = self.pending.pop_front() {
                    record.release(Err(SendError::RecordTooLarge {
                        size,
                        capacity: buffer.capacity(),
                    }));
                }
                released.rejected += 1;
            } else {
                break;
            }
        }
        released
    }

    /// Release every queued producer without admitting its record.
    pub(crate) fn abandon_pending(&mut self) -> usize {
        let count = self.pending.len();
        for record in self.pending.drain(..) {
            record.release(Ok(()));
        }
        count
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    #[cfg(test)]
    fn last_sequence(&self) -> u32 {
        self.sequence
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start tracking a batch ending at `last_sequence`.
    pub(crate) fn begin(&mut self, last_sequence: u32) {
        let credits = match self.send_confirm {
            SendConfirmPolicy::Send => 1,
            SendConfirmPolicy::Receive => 2,
        };
        self.in_flight = Some(InFlight {
            last_sequence,
            credits,
            acked: false,
        });
    }

    /// Grant the write-completion credit. Returns true when the batch is done.
    pub(crate) fn on_write_complete(&mut self) -> bool {
        let Some(flight) = self.in_flight.as_mut() else {
            return false;
        };
        flight.credits = flight.credits.saturating_sub(1);
        self.settle()
    }

    /// Grant the acknowledgement credit if `sequence` covers the batch.
    /// Returns true when the batch is done.
    pub(crate) fn on_ack(&mut self, sequence: u32) -> bool {
        if self.send_confirm != SendConfirmPolicy::Receive {
            return false;
        }
        let Some(flight) = self.in_flight.as_mut() else {
            return false;
        };
        if flight.acked || sequence < flight.last_sequence {
            return false;
        }
        flight.acked = true;
        flight.credits = flight.credits.saturating_sub(1);
        self.settle()
    }

    /// Forget the batch in flight after a failed connection.
    /// Returns true when one was in flight.
    pub(crate) fn abort(&mut self) -> bool {
        self.in_flight.take().is_some()
    }

    fn settle(&mut self) -> bool {
        match self.in_flight {
            Some(flight) if flight.credits == 0 => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }
}
