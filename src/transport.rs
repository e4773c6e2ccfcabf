//! Transport primitives consumed by the connection manager.
//!
//! The engine only needs three capabilities from a socket: a blocking read
//! half, a blocking write half, and a way to abort both from another thread.
//! [`Connector`] produces those as [`SocketHalves`]; [`TcpConnector`] is the
//! production implementation and tests substitute their own.

use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
};

/// Aborts both halves of a connection, unblocking pending reads and writes.
pub type Closer = Box<dyn Fn() + Send + Sync>;

/// Independently owned halves of one established connection.
pub struct SocketHalves {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub closer: Closer,
}

impl fmt::Debug for SocketHalves {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHalves").finish_non_exhaustive()
    }
}

/// Establishes connections to the collector.
///
/// `connect` is called once per attempt from a connection thread and may
/// block.
pub trait Connector: Send + Sync {
    /// Open a fresh connection.
    fn connect(&self) -> io::Result<SocketHalves>;

    /// Human readable endpoint used in diagnostics.
    fn endpoint(&self) -> String;
}

/// TCP connector whose endpoint is resolved once, at construction.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    host: String,
    port: u16,
    addrs: Vec<SocketAddr>,
}

impl TcpConnector {
    /// Resolve `host:port` and keep the resulting addresses.
    pub fn resolve(host: &str, port: u16) -> io::Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host}:{port} did not resolve to any address"),
            ));
        }
        Ok(Self {
            host: host.to_owned(),
            port,
            addrs,
        })
    }

    /// Addresses tried, in order, on each attempt.
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    fn connect_stream(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in &self.addrs {
            match TcpStream::connect(addr) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("unable to connect to {}:{}", self.host, self.port),
            )
        }))
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> io::Result<SocketHalves> {
        let stream = self.connect_stream()?;
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(SocketHalves {
            reader: Box::new(reader),
            writer: Box::new(stream),
            closer: Box::new(move || {
                // The peer may already be gone.
                let _ = control.shutdown(Shutdown::Both);
            }),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
