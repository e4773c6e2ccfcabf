//! In-memory [`Connector`] with scripted failures.
//!
//! Every connection records the batches written to it. Writes can be
//! truncated to provoke partial-write teardown, connect attempts can be
//! refused, and complete batches are acknowledged automatically unless
//! auto-ack is turned off.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::{
    protocol::{ACK_FRAME_SIZE, DataFrame, decode_data, decode_window, encode_ack},
    transport::{Connector, SocketHalves},
};

/// One `write` call observed by a scripted connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptedWrite {
    /// Index of the connection, starting at zero.
    pub connection: usize,
    /// Bytes accepted by the write.
    pub bytes: Vec<u8>,
    /// False when the write was truncated.
    pub complete: bool,
}

#[derive(Debug, Default)]
struct Script {
    refusals: u32,
    short_writes: VecDeque<usize>,
    connections: usize,
    writes: Vec<ScriptedWrite>,
    auto_ack: bool,
}

/// Connector producing in-memory connections driven by a script.
#[derive(Clone, Debug)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl Default for ScriptedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedConnector {
    /// Create a connector that accepts every attempt and acks every batch.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                auto_ack: true,
                ..Script::default()
            })),
        }
    }

    /// Refuse the next `count` connect attempts.
    pub fn refuse_next(&self, count: u32) {
        self.script.lock().refusals += count;
    }

    /// Accept at most `limit` bytes on the next write.
    pub fn short_write_next(&self, limit: usize) {
        self.script.lock().short_writes.push_back(limit);
    }

    /// Enable or disable automatic acknowledgement of complete batches.
    pub fn set_auto_ack(&self, enabled: bool) {
        self.script.lock().auto_ack = enabled;
    }

    /// Number of connections established so far.
    pub fn connections(&self) -> usize {
        self.script.lock().connections
    }

    /// All writes observed so far, in order.
    pub fn writes(&self) -> Vec<ScriptedWrite> {
        self.script.lock().writes.clone()
    }

    /// Data frames of every complete write, in order.
    pub fn frames(&self) -> Vec<DataFrame> {
        self.writes()
            .iter()
            .filter(|w| w.complete)
            .flat_map(|w| decode_batch(&w.bytes).unwrap_or_default())
            .collect()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self) -> io::Result<SocketHalves> {
        let connection = {
            let mut script = self.script.lock();
            if script.refusals > 0 {
                script.refusals -= 1;
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "scripted refusal",
                ));
            }
            script.connections += 1;
            script.connections - 1
        };
        let closed = Arc::new(AtomicBool::new(false));
        let (inbound_tx, inbound_rx) = unbounded();
        let closer_tx = inbound_tx.clone();
        let closer_flag = Arc::clone(&closed);
        Ok(SocketHalves {
            reader: Box::new(ScriptedReader {
                inbound: inbound_rx,
                pending: VecDeque::new(),
            }),
            writer: Box::new(ScriptedWriter {
                connection,
                script: Arc::clone(&self.script),
                closed,
                acks: inbound_tx,
            }),
            closer: Box::new(move || {
                closer_flag.store(true, Ordering::SeqCst);
                let _ = closer_tx.send(Vec::new());
            }),
        })
    }

    fn endpoint(&self) -> String {
        "scripted:0".into()
    }
}

fn decode_batch(bytes: &[u8]) -> Option<Vec<DataFrame>> {
    let (count, mut pos) = decode_window(bytes).ok()?;
    let mut frames = Vec::new();
    for _ in 0..count {
        let (frame, used) = decode_data(&bytes[pos..]).ok()?;
        pos += used;
        frames.push(frame);
    }
    Some(frames)
}

struct ScriptedReader {
    inbound: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.inbound.recv() {
                // An empty chunk is the closer's end-of-stream marker.
                Ok(chunk) if !chunk.is_empty() => self.pending.extend(chunk),
                _ => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

struct ScriptedWriter {
    connection: usize,
    script: Arc<Mutex<Script>>,
    closed: Arc<AtomicBool>,
    acks: Sender<Vec<u8>>,
}

impl Write for ScriptedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"));
        }
        let mut script = self.script.lock();
        let accepted = script
            .short_writes
            .pop_front()
            .map_or(buf.len(), |limit| limit.min(buf.len()));
        let complete = accepted == buf.len();
        script.writes.push(ScriptedWrite {
            connection: self.connection,
            bytes: buf[..accepted].to_vec(),
            complete,
        });
        if complete && script.auto_ack {
            if let Some(last) = decode_batch(buf).and_then(|frames| frames.last().map(|f| f.sequence)) {
                let mut ack = vec![0; ACK_FRAME_SIZE];
                if encode_ack(&mut ack, last).is_ok() {
                    let _ = self.acks.send(ack);
                }
            }
        }
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
