//! Coordination state shared by producers and connection threads.
//!
//! One mutex guards the batch buffer, the flow controller and the link
//! state. Producers call in through [`Shared::send`] and [`Shared::close`];
//! connection threads report completions through the `on_*` methods, which
//! ignore anything tagged with a stale connection generation.

use std::{
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Sender, TrySendError};
use log::Level;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::{
    batch_buffer::{Batch, BatchBuffer},
    config::ClientSettings,
    diagnostics::Diagnostics,
    error::{LinkError, SendError},
    flow::{Admission, FlowController},
    rate_limited_warner::RateLimitedWarner,
    transport::{Closer, Connector},
};

use super::{ClientStats, ConnectionState, connection};

/// Upper bound on a single wait inside `close`.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct ActiveLink {
    generation: u64,
    transmit: Sender<Batch>,
    closer: Closer,
}

enum Link {
    Disconnected,
    Connecting(u64),
    Connected(ActiveLink),
    Closed,
}

impl Link {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Disconnected => ConnectionState::Disconnected,
            Self::Connecting(_) => ConnectionState::Connecting,
            Self::Connected(_) => ConnectionState::Connected,
            Self::Closed => ConnectionState::Closed,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        match self {
            Self::Connecting(g) => *g == generation,
            Self::Connected(active) => active.generation == generation,
            Self::Disconnected | Self::Closed => false,
        }
    }
}

pub(crate) struct Engine {
    buffer: BatchBuffer,
    flow: FlowController,
    link: Link,
    generation: u64,
    closing: bool,
    stats: ClientStats,
}

impl Engine {
    fn is_drained(&self) -> bool {
        !self.flow.in_flight() && !self.buffer.has_unsent() && !self.flow.has_pending()
    }
}

pub(crate) struct Shared {
    pub(crate) settings: ClientSettings,
    pub(crate) connector: Arc<dyn Connector>,
    diagnostics: Arc<dyn Diagnostics>,
    warner: RateLimitedWarner,
    state: Mutex<Engine>,
    changed: Condvar,
}

impl Shared {
    pub(crate) fn new(
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        let engine = Engine {
            buffer: BatchBuffer::new(settings.send_buffer_size),
            flow: FlowController::new(settings.send_full, settings.send_confirm),
            link: Link::Disconnected,
            generation: 0,
            closing: false,
            stats: ClientStats::default(),
        };
        Self {
            warner: RateLimitedWarner::new(settings.warn_interval),
            settings,
            connector,
            diagnostics,
            state: Mutex::new(engine),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Engine> {
        self.state.lock()
    }

    pub(crate) fn diag(&self, level: Level, line: &str) {
        self.diagnostics.write_line(level, line);
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.lock().link.state()
    }

    pub(crate) fn stats(&self) -> ClientStats {
        self.lock().stats
    }

    /// Admit one record, blocking under the `Wait` policy until released.
    pub(crate) fn send<K, V>(self: &Arc<Self>, record: &[(K, V)]) -> Result<(), SendError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let waiter = {
            let mut guard = self.lock();
            let engine = &mut *guard;
            if engine.closing {
                return Err(SendError::Closed);
            }
            match engine.flow.admit(&mut engine.buffer, record)? {
                Admission::Accepted => {
                    engine.stats.records_accepted += 1;
                    self.pump(engine);
                    return Ok(());
                }
                Admission::Dropped => {
                    engine.stats.records_dropped += 1;
                    self.warner.record_drop();
                    self.warner.warn_if_due(|count| {
                        self.diag(
                            Level::Warn,
                            &format!("send buffer full; dropped {count} records"),
                        );
                    });
                    return Ok(());
                }
                Admission::Queued(waiter) => {
                    self.pump(engine);
                    waiter
                }
            }
        };
        // A disconnected sender means the queue was torn down without a verdict.
        waiter.recv().unwrap_or(Ok(()))
    }

    /// Refuse new records, drain what is buffered, then shut the link.
    pub(crate) fn close(self: &Arc<Self>) {
        let mut engine = self.lock();
        if engine.closing {
            return;
        }
        engine.closing = true;
        self.diag(Level::Debug, "closing client");
        self.pump(&mut engine);

        let timeout = self.settings.close_timeout;
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        loop {
            if engine.is_drained() {
                break;
            }
            if matches!(engine.link, Link::Disconnected) {
                self.diag(
                    Level::Warn,
                    "closing while disconnected; buffered records are discarded",
                );
                break;
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.diag(
                            Level::Warn,
                            &format!(
                                "close timed out after {} ms with records unconfirmed",
                                timeout.as_millis()
                            ),
                        );
                        break;
                    }
                    (deadline - now).min(CLOSE_POLL_INTERVAL)
                }
                None => CLOSE_POLL_INTERVAL,
            };
            let _ = self.changed.wait_for(&mut engine, wait);
        }

        if let Link::Connected(active) = std::mem::replace(&mut engine.link, Link::Closed) {
            (active.closer)();
        }
        let abandoned = engine.flow.abandon_pending();
        if abandoned > 0 {
            self.diag(
                Level::Warn,
                &format!("released {abandoned} waiting producers without sending"),
            );
        }
        self.warner.flush(|count| {
            self.diag(
                Level::Warn,
                &format!("send buffer full; dropped {count} records"),
            );
        });
        self.changed.notify_all();
    }

    /// Transmit the oldest unsent batch if the link allows it.
    ///
    /// From `Disconnected` with unsent data this starts a connect cycle
    /// instead. Must be called with the lock held.
    fn pump(self: &Arc<Self>, engine: &mut Engine) {
        let transmit = match &engine.link {
            Link::Connected(active) => Some(active.transmit.clone()),
            Link::Disconnected => None,
            Link::Closed | Link::Connecting(_) => return,
        };
        let Some(transmit) = transmit else {
            if engine.buffer.has_unsent() || engine.flow.has_pending() {
                self.start_connect(engine);
            }
            return;
        };
        if engine.flow.in_flight() {
            return;
        }

        // Nothing is in flight, so `prev` holds a confirmed batch or nothing.
        engine.buffer.pop_front();
        let released = engine.flow.release_pending(&mut engine.buffer);
        engine.stats.records_accepted += released.admitted as u64;
        if released.rejected > 0 {
            self.diag(
                Level::Warn,
                &format!(
                    "rejected {} queued records larger than the send buffer",
                    released.rejected
                ),
            );
        }
        let Some(batch) = engine.buffer.seal_front() else {
            return;
        };
        engine.flow.begin(batch.last_sequence);
        self.diag(
            Level::Trace,
            &format!(
                "transmitting {} records up to sequence {}",
                batch.data_count, batch.last_sequence
            ),
        );
        match transmit.try_send(batch) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let err = LinkError::Io(io::Error::other("a transmit is already outstanding"));
                self.teardown(engine, &err);
            }
            Err(TrySendError::Disconnected(_)) => {
                let err = LinkError::Io(io::Error::other("transmit thread has exited"));
                self.teardown(engine, &err);
            }
        }
    }

    fn start_connect(self: &Arc<Self>, engine: &mut Engine) {
        engine.generation += 1;
        let generation = engine.generation;
        engine.link = Link::Connecting(generation);
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("lumberjack-connection".into())
            .spawn(move || connection::run(shared, generation));
        if let Err(err) = spawned {
            engine.link = Link::Disconnected;
            self.diag(
                Level::Error,
                &format!("failed to spawn connection thread: {err}"),
            );
        }
    }

    /// Drop the current link and push an unconfirmed batch back.
    fn teardown(&self, engine: &mut Engine, reason: &LinkError) {
        if let Link::Connected(active) = std::mem::replace(&mut engine.link, Link::Disconnected) {
            (active.closer)();
        }
        engine.stats.disconnects += 1;
        self.diag(
            Level::Warn,
            &format!(
                "connection to {} lost: {reason}",
                self.connector.endpoint()
            ),
        );
        if engine.flow.abort() {
            if let Err(err) = engine.buffer.push_front() {
                self.diag(Level::Error, &format!("failed to requeue batch: {err}"));
            }
        }
        self.changed.notify_all();
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.lock().link.is_current(generation)
    }

    /// Install a freshly connected link. Returns false when the connect
    /// cycle was superseded, in which case the socket is shut down.
    pub(crate) fn on_connected(
        self: &Arc<Self>,
        generation: u64,
        transmit: Sender<Batch>,
        closer: Closer,
    ) -> bool {
        let mut engine = self.lock();
        if !matches!(engine.link, Link::Connecting(g) if g == generation) {
            closer();
            return false;
        }
        engine.link = Link::Connected(ActiveLink {
            generation,
            transmit,
            closer,
        });
        engine.stats.connects += 1;
        self.diag(
            Level::Info,
            &format!("connected to {}", self.connector.endpoint()),
        );
        self.pump(&mut engine);
        self.changed.notify_all();
        true
    }

    pub(crate) fn on_connect_failed(&self, generation: u64, attempts: u32) {
        let mut engine = self.lock();
        if matches!(engine.link, Link::Connecting(g) if g == generation) {
            engine.link = Link::Disconnected;
            self.diag(
                Level::Warn,
                &format!(
                    "giving up on {} after {attempts} connect attempts",
                    self.connector.endpoint()
                ),
            );
        }
        self.changed.notify_all();
    }

    pub(crate) fn on_transmit_complete(
        self: &Arc<Self>,
        generation: u64,
        requested: usize,
        result: io::Result<usize>,
    ) {
        let mut engine = self.lock();
        if !engine.link.is_current(generation) {
            return;
        }
        match result {
            Err(err) => self.teardown(&mut engine, &LinkError::Io(err)),
            Ok(written) if written != requested => {
                self.teardown(
                    &mut engine,
                    &LinkError::PartialWrite { written, requested },
                );
            }
            Ok(_) => {
                engine.stats.batches_sent += 1;
                if engine.flow.on_write_complete() {
                    engine.stats.batches_confirmed += 1;
                    self.pump(&mut engine);
                }
                self.changed.notify_all();
            }
        }
    }

    /// Apply acknowledgements read from the link. Returns false once the
    /// link is stale and the reader should stop.
    pub(crate) fn on_acks(self: &Arc<Self>, generation: u64, sequences: &[u32]) -> bool {
        let mut engine = self.lock();
        if !engine.link.is_current(generation) {
            return false;
        }
        for &sequence in sequences {
            self.diag(Level::Trace, &format!("ack for sequence {sequence}"));
            if engine.flow.on_ack(sequence) {
                engine.stats.batches_confirmed += 1;
                self.pump(&mut engine);
            }
        }
        self.changed.notify_all();
        true
    }

    pub(crate) fn on_link_error(&self, generation: u64, reason: LinkError) {
        let mut engine = self.lock();
        if engine.link.is_current(generation) {
            self.teardown(&mut engine, &reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{SendConfirmPolicy, SendFullPolicy},
        protocol::WINDOW_FRAME_SIZE,
        test_utils::CollectingDiagnostics,
        transport::SocketHalves,
    };
    use rstest::rstest;

    struct Unreachable;

    impl Connector for Unreachable {
        fn connect(&self) -> io::Result<SocketHalves> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }

        fn endpoint(&self) -> String {
            "unreachable:5043".into()
        }
    }

    fn shared(settings: ClientSettings) -> (Arc<Shared>, Arc<CollectingDiagnostics>) {
        let diagnostics = Arc::new(CollectingDiagnostics::new());
        let shared = Arc::new(Shared::new(
            settings,
            Arc::new(Unreachable),
            diagnostics.clone(),
        ));
        (shared, diagnostics)
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            connect_retry_count: 2,
            backoff: crate::config::BackoffPolicy {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(1),
            },
            ..ClientSettings::default()
        }
    }

    fn wait_for_state(shared: &Shared, state: ConnectionState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while shared.connection_state() != state {
            assert!(Instant::now() < deadline, "timed out waiting for {state:?}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[rstest]
    fn exhausted_retries_return_to_disconnected() {
        let (shared, diagnostics) = shared(settings());
        shared.send(&[("message", "hello")]).expect("accepted");
        wait_for_state(&shared, ConnectionState::Disconnected);
        assert!(diagnostics.contains(Level::Warn, "giving up on unreachable:5043"));
        assert_eq!(
            diagnostics
                .lines()
                .iter()
                .filter(|(_, line)| line.starts_with("connect attempt"))
                .count(),
            2
        );
    }

    #[rstest]
    fn stale_generations_are_ignored() {
        let (shared, _) = shared(settings());
        assert!(!shared.is_current(0));
        assert!(!shared.on_acks(7, &[1]));
        shared.on_transmit_complete(7, 10, Ok(10));
        shared.on_link_error(7, LinkError::RemoteClosed);
        let stats = shared.stats();
        assert_eq!(stats.batches_sent, 0);
        assert_eq!(stats.disconnects, 0);
    }

    #[rstest]
    fn send_after_close_is_refused() {
        let (shared, _) = shared(settings());
        shared.close();
        assert_eq!(shared.send(&[("k", "v")]), Err(SendError::Closed));
        assert_eq!(shared.connection_state(), ConnectionState::Closed);
    }

    #[rstest]
    fn drops_are_counted_and_reported_on_close() {
        let (shared, diagnostics) = shared(ClientSettings {
            send_buffer_size: WINDOW_FRAME_SIZE + 28,
            send_full: SendFullPolicy::Drop,
            send_confirm: SendConfirmPolicy::Send,
            warn_interval: Duration::from_secs(3600),
            ..settings()
        });
        for _ in 0..3 {
            shared.send(&[("Key1", "Value1")]).expect("never fails");
        }
        let stats = shared.stats();
        assert_eq!(stats.records_accepted, 1);
        assert_eq!(stats.records_dropped, 2);
        shared.close();
        assert!(diagnostics.contains(Level::Warn, "dropped"));
    }
}
