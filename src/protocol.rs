//! Lumberjack v1 wire codec.
//!
//! Three frame types travel over the connection. All integers are unsigned
//! 32-bit big-endian; strings are UTF-8 prefixed by their byte length.
//!
//! ```text
//! Window  '1' 'W' count:u32
//! Data    '1' 'D' seq:u32 pairs:u32 { key_len:u32 key value_len:u32 value }*
//! Ack     '1' 'A' seq:u32
//! ```
//!
//! The encoders write into caller-owned slices and check capacity field by
//! field, so a failed encode tells the batch buffer that the record does not
//! fit without pre-computing its size.

use crate::error::CodecError;

/// Protocol version byte.
pub const VERSION: u8 = b'1';
/// Frame type of the window frame.
pub const FRAME_WINDOW: u8 = b'W';
/// Frame type of the data frame.
pub const FRAME_DATA: u8 = b'D';
/// Frame type of the acknowledgement frame.
pub const FRAME_ACK: u8 = b'A';

/// Encoded size of a window frame.
pub const WINDOW_FRAME_SIZE: usize = 6;
/// Encoded size of an acknowledgement frame.
pub const ACK_FRAME_SIZE: usize = 6;
/// Size of a data frame carrying no pairs.
pub const DATA_HEADER_SIZE: usize = 10;

/// A decoded data frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataFrame {
    pub sequence: u32,
    pub pairs: Vec<(String, String)>,
}

struct FrameWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FrameWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn reserve(&self, needed: usize) -> Result<(), CodecError> {
        let available = self.buf.len() - self.pos;
        if available < needed {
            return Err(CodecError::BufferTooSmall { needed, available });
        }
        Ok(())
    }

    fn put_header(&mut self, frame_type: u8) -> Result<(), CodecError> {
        self.reserve(2)?;
        self.buf[self.pos] = VERSION;
        self.buf[self.pos + 1] = frame_type;
        self.pos += 2;
        Ok(())
    }

    fn put_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.reserve(4)?;
        self.buf[self.pos..self.pos + 4].copy_from_slice(&value.to_be_bytes());
        self.pos += 4;
        Ok(())
    }

    fn put_str(&mut self, value: &str) -> Result<(), CodecError> {
        let bytes = value.as_bytes();
        let needed = bytes.len().saturating_add(4);
        self.reserve(needed)?;
        let len = u32::try_from(bytes.len()).map_err(|_| CodecError::BufferTooSmall {
            needed,
            available: self.buf.len() - self.pos,
        })?;
        self.put_u32(len)?;
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}

struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        let available = self.buf.len() - self.pos;
        if available < needed {
            return Err(CodecError::BufferTooSmall { needed, available });
        }
        let bytes = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(bytes)
    }

    fn expect_header(&mut self, frame_type: u8, frame_size: usize) -> Result<(), CodecError> {
        let available = self.buf.len() - self.pos;
        if available < frame_size {
            return Err(CodecError::BufferTooSmall {
                needed: frame_size,
                available,
            });
        }
        let header = self.take(2)?;
        if header[0] != VERSION || header[1] != frame_type {
            return Err(CodecError::ProtocolMismatch {
                version: header[0],
                frame_type: header[1],
            });
        }
        Ok(())
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Encode a window frame announcing `count` data frames.
pub fn encode_window(buf: &mut [u8], count: u32) -> Result<usize, CodecError> {
    let mut writer = FrameWriter::new(buf);
    writer.reserve(WINDOW_FRAME_SIZE)?;
    writer.put_header(FRAME_WINDOW)?;
    writer.put_u32(count)?;
    Ok(writer.pos)
}

/// Decode a window frame, returning the announced count and bytes consumed.
pub fn decode_window(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    let mut reader = FrameReader::new(buf);
    reader.expect_header(FRAME_WINDOW, WINDOW_FRAME_SIZE)?;
    let count = reader.u32()?;
    Ok((count, reader.pos))
}

/// Encode one record as a data frame.
///
/// Fails with [`CodecError::BufferTooSmall`] as soon as a field would overrun
/// `buf`; the bytes written before the failure are garbage and must not be
/// committed by the caller.
pub fn encode_data<K, V>(buf: &mut [u8], sequence: u32, record: &[(K, V)]) -> Result<usize, CodecError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut writer = FrameWriter::new(buf);
    writer.put_header(FRAME_DATA)?;
    writer.put_u32(sequence)?;
    let pairs = u32::try_from(record.len()).map_err(|_| CodecError::BufferTooSmall {
        needed: usize::MAX,
        available: writer.buf.len(),
    })?;
    writer.put_u32(pairs)?;
    for (key, value) in record {
        writer.put_str(key.as_ref())?;
        writer.put_str(value.as_ref())?;
    }
    Ok(writer.pos)
}

/// Decode a data frame, returning the frame and bytes consumed.
pub fn decode_data(buf: &[u8]) -> Result<(DataFrame, usize), CodecError> {
    let mut reader = FrameReader::new(buf);
    reader.expect_header(FRAME_DATA, DATA_HEADER_SIZE)?;
    let sequence = reader.u32()?;
    let count = reader.u32()?;
    // Cap the preallocation: the count comes off the wire.
    let mut pairs = Vec::with_capacity((count as usize).min(64));
    for _ in 0..count {
        let key = reader.string()?;
        let value = reader.string()?;
        pairs.push((key, value));
    }
    Ok((DataFrame { sequence, pairs }, reader.pos))
}

/// Encode an acknowledgement for `sequence`.
pub fn encode_ack(buf: &mut [u8], sequence: u32) -> Result<usize, CodecError> {
    let mut writer = FrameWriter::new(buf);
    writer.reserve(ACK_FRAME_SIZE)?;
    writer.put_header(FRAME_ACK)?;
    writer.put_u32(sequence)?;
    Ok(writer.pos)
}

/// Decode an acknowledgement, returning its sequence and bytes consumed.
pub fn decode_ack(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    let mut reader = FrameReader::new(buf);
    reader.expect_header(FRAME_ACK, ACK_FRAME_SIZE)?;
    let sequence = reader.u32()?;
    Ok((sequence, reader.pos))
}

/// Exact encoded length of `record` as a data frame.
pub fn data_frame_len<K, V>(record: &[(K, V)]) -> usize
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    record.iter().fold(DATA_HEADER_SIZE, |acc, (key, value)| {
        acc.saturating_add(8)
            .saturating_add(key.as_ref().len())
            .saturating_add(value.as_ref().len())
    })
}
