//! Incremental acknowledgement decoding.
//!
//! The pipeline owns a private buffer for one connection. Reads land in its
//! free tail; every complete ack frame is decoded and forwarded, and a
//! trailing partial frame is moved to the front before the next read.

use crate::{
    error::{LinkError, StateError},
    protocol::{ACK_FRAME_SIZE, decode_ack},
};

#[derive(Debug)]
pub(crate) struct ReceivePipeline {
    buf: Vec<u8>,
    filled: usize,
    outstanding: bool,
}

impl ReceivePipeline {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(ACK_FRAME_SIZE)],
            filled: 0,
            outstanding: false,
        }
    }

    /// Hand out the free tail of the buffer for the next read.
    pub(crate) fn issue(&mut self) -> Result<&mut [u8], StateError> {
        if self.outstanding {
            return Err(StateError::InvalidState(
                "a receive is already outstanding",
            ));
        }
        self.outstanding = true;
        Ok(&mut self.buf[self.filled..])
    }

    /// Account for `read` bytes and forward every complete ack.
    ///
    /// Returns the number of acks forwarded. A zero-length read means the
    /// remote closed the connection.
    pub(crate) fn complete(
        &mut self,
        read: usize,
        mut on_ack: impl FnMut(u32),
    ) -> Result<usize, LinkError> {
        if !self.outstanding {
            return Err(StateError::InvalidState("no receive is outstanding").into());
        }
        self.outstanding = false;
        if read == 0 {
            return Err(LinkError::RemoteClosed);
        }
        self.filled += read;

        let mut pos = 0;
        let mut acks = 0;
        while self.filled - pos >= ACK_FRAME_SIZE {
            let (sequence, used) = decode_ack(&self.buf[pos..self.filled])?;
            pos += used;
            acks += 1;
            on_ack(sequence);
        }

        self.buf.copy_within(pos..self.filled, 0);
        self.filled -= pos;
        Ok(acks)
    }
}
