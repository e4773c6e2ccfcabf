//! Per-connection worker threads.
//!
//! A connect cycle runs on its own thread. Once a socket is established the
//! same thread becomes the writer, draining the bounded transmit channel,
//! and a second thread reads acknowledgements. Both report back to the
//! engine tagged with the generation they were started for.

use std::{
    io::{Read, Write},
    sync::Arc,
    thread,
};

use crossbeam_channel::{Receiver, bounded};
use log::Level;

use crate::{
    backoff::BackoffState,
    batch_buffer::Batch,
    error::LinkError,
    receive::ReceivePipeline,
    transport::SocketHalves,
};

use super::engine::Shared;

/// Entry point of a connection thread started for `generation`.
pub(super) fn run(shared: Arc<Shared>, generation: u64) {
    let Some(SocketHalves {
        reader,
        writer,
        closer,
    }) = connect_with_retry(&shared, generation)
    else {
        return;
    };

    // Exactly one transmit may be outstanding.
    let (transmit_tx, transmit_rx) = bounded(1);
    let reader_shared = Arc::clone(&shared);
    let capacity = shared.settings.receive_buffer_size;
    let spawned = thread::Builder::new()
        .name("lumberjack-receive".into())
        .spawn(move || receive_loop(&reader_shared, generation, reader, capacity));
    if let Err(err) = spawned {
        closer();
        shared.on_link_error(generation, LinkError::Io(err));
        return;
    }

    if shared.on_connected(generation, transmit_tx, closer) {
        transmit_loop(&shared, generation, writer, &transmit_rx);
    }
}

fn connect_with_retry(shared: &Shared, generation: u64) -> Option<SocketHalves> {
    let attempts = shared.settings.connect_retry_count;
    let mut backoff = BackoffState::new(shared.settings.backoff.clone());
    for attempt in 1..=attempts {
        if !shared.is_current(generation) {
            return None;
        }
        match shared.connector.connect() {
            Ok(halves) => return Some(halves),
            Err(err) => {
                shared.diag(
                    Level::Warn,
                    &format!(
                        "connect attempt {attempt}/{attempts} to {} failed: {err}",
                        shared.connector.endpoint()
                    ),
                );
                if attempt < attempts {
                    thread::sleep(backoff.next_sleep());
                }
            }
        }
    }
    shared.on_connect_failed(generation, attempts);
    None
}

fn transmit_loop(
    shared: &Arc<Shared>,
    generation: u64,
    mut writer: Box<dyn Write + Send>,
    batches: &Receiver<Batch>,
) {
    // Ends when the engine drops the link and with it the sender.
    while let Ok(batch) = batches.recv() {
        let result = {
            let bytes = batch.bytes.lock();
            writer
                .write(&bytes[..batch.len])
                .and_then(|written| writer.flush().map(|()| written))
        };
        shared.on_transmit_complete(generation, batch.len, result);
    }
}

fn receive_loop(
    shared: &Arc<Shared>,
    generation: u64,
    mut reader: Box<dyn Read + Send>,
    capacity: usize,
) {
    let mut pipeline = ReceivePipeline::new(capacity);
    let mut acks = Vec::new();
    loop {
        let read = match pipeline.issue() {
            Ok(tail) => reader.read(tail).map_err(LinkError::from),
            Err(err) => Err(err.into()),
        };
        acks.clear();
        let outcome = read.and_then(|read| pipeline.complete(read, |seq| acks.push(seq)));
        match outcome {
            Ok(_) => {
                if !shared.on_acks(generation, &acks) {
                    return;
                }
            }
            Err(err) => {
                shared.on_link_error(generation, err);
                return;
            }
        }
    }
}
