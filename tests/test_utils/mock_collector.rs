//! In-process Lumberjack collector for integration tests.
//!
//! Listens on an ephemeral loopback port, decodes each window with the
//! crate's own codec and acknowledges it with the last sequence number of
//! the window. The ack behaviour can be switched at runtime to stall a
//! connection or to drop it without acknowledging.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpListener, TcpStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use lumberjack_client::protocol::{
    ACK_FRAME_SIZE, DATA_HEADER_SIZE, DataFrame, WINDOW_FRAME_SIZE, decode_data, decode_window,
    encode_ack,
};

/// How the collector responds to a complete window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge every window.
    Ack,
    /// Read windows but never acknowledge them.
    Stall,
    /// Close the connection after the next window instead of acking it,
    /// then go back to acknowledging.
    DropNext,
}

#[derive(Debug)]
struct CollectorState {
    mode: Mutex<AckMode>,
    received: Mutex<Vec<DataFrame>>,
    acked: Mutex<Vec<DataFrame>>,
    connections: AtomicUsize,
    stop: AtomicBool,
}

/// Running mock collector; shut down on drop.
pub struct MockCollector {
    port: u16,
    state: Arc<CollectorState>,
    accept: Option<JoinHandle<()>>,
}

impl MockCollector {
    /// Bind to `127.0.0.1:0` and start accepting connections.
    pub fn start(mode: AckMode) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind mock collector");
        let port = listener.local_addr().expect("local addr").port();
        let state = Arc::new(CollectorState {
            mode: Mutex::new(mode),
            received: Mutex::new(Vec::new()),
            acked: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
        });
        let accept_state = Arc::clone(&state);
        let accept = thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_state.stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let conn_state = Arc::clone(&accept_state);
                thread::spawn(move || {
                    let _ = serve(stream, &conn_state);
                });
            }
        });
        Self {
            port,
            state,
            accept: Some(accept),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_mode(&self, mode: AckMode) {
        *self.state.mode.lock().expect("mode lock") = mode;
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Every data frame read, including windows that were never acked.
    pub fn received(&self) -> Vec<DataFrame> {
        self.state.received.lock().expect("received lock").clone()
    }

    /// Data frames of acknowledged windows, in order.
    pub fn acked(&self) -> Vec<DataFrame> {
        self.state.acked.lock().expect("acked lock").clone()
    }

    /// Value of `key` in every acknowledged frame.
    pub fn acked_values(&self, key: &str) -> Vec<String> {
        self.acked()
            .iter()
            .filter_map(|frame| {
                frame
                    .pairs
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
            })
            .collect()
    }

    /// Block until at least `count` frames were received.
    pub fn wait_for_received(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.received().len() < count {
            assert!(
                Instant::now() < deadline,
                "collector received {} of {count} frames",
                self.received().len()
            );
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.state.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop.
        let _ = TcpStream::connect(("127.0.0.1", self.port));
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
    }
}

fn serve(mut stream: TcpStream, state: &CollectorState) -> io::Result<()> {
    loop {
        let mut header = [0u8; WINDOW_FRAME_SIZE];
        stream.read_exact(&mut header)?;
        let (count, _) = decode_window(&header).map_err(io::Error::other)?;
        let mut frames = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let bytes = read_data_frame(&mut stream)?;
            let (frame, _) = decode_data(&bytes).map_err(io::Error::other)?;
            frames.push(frame);
        }
        state
            .received
            .lock()
            .expect("received lock")
            .extend(frames.iter().cloned());

        let mode = *state.mode.lock().expect("mode lock");
        match mode {
            AckMode::Ack => {
                let Some(last) = frames.last().map(|f| f.sequence) else {
                    continue;
                };
                state.acked.lock().expect("acked lock").extend(frames);
                let mut ack = [0u8; ACK_FRAME_SIZE];
                encode_ack(&mut ack, last).map_err(io::Error::other)?;
                stream.write_all(&ack)?;
            }
            AckMode::Stall => {}
            AckMode::DropNext => {
                *state.mode.lock().expect("mode lock") = AckMode::Ack;
                stream.shutdown(Shutdown::Both)?;
                return Ok(());
            }
        }
    }
}

fn read_data_frame(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut bytes = vec![0u8; DATA_HEADER_SIZE];
    stream.read_exact(&mut bytes)?;
    let pairs = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    for _ in 0..pairs * 2 {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len)?;
        bytes.extend_from_slice(&len);
        let start = bytes.len();
        bytes.resize(start + u32::from_be_bytes(len) as usize, 0);
        stream.read_exact(&mut bytes[start..])?;
    }
    Ok(bytes)
}
