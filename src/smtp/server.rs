//! SMTP server implementation

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::shutdown::Shutdown;
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::io::LineIo;
use crate::smtp::session::SmtpSession;
use crate::telegram::Deliver;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Accepts SMTP connections and relays every received message through `D`.
///
/// Each connection runs on its own thread. The accept loop stops once the
/// [`Shutdown`] handle is triggered, then waits for open sessions to finish.
pub struct SmtpServer<D: Deliver + ?Sized + 'static> {
    /// Name announced in the greeting and EHLO banner
    server_name: Arc<str>,
    delivery: Arc<D>,
    shutdown: Shutdown,
    read_timeout: Duration,
}

impl<D: Deliver + ?Sized + 'static> SmtpServer<D> {
    /// Create a new SMTP server
    pub fn new(server_name: &str, delivery: Arc<D>, shutdown: Shutdown) -> Self {
        Self {
            server_name: Arc::from(server_name),
            delivery,
            shutdown,
            read_timeout: Duration::from_secs(SmtpLimits::READ_TIMEOUT_SECS),
        }
    }

    /// Override how long a client may stay silent
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Bind `addr` and serve until shutdown (blocking)
    pub fn start(&self, addr: &str) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Serve on an existing listener until shutdown (blocking)
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        listener.set_nonblocking(true)?;
        info!("SMTP server listening on {}", listener.local_addr()?);

        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.is_shutdown_requested() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    info!("Connection from {peer}");
                    match self.spawn_session(stream, peer) {
                        Ok(handle) => sessions.push(handle),
                        Err(e) => error!("Failed to start session for {peer}: {e}"),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!("Error accepting connection: {e}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }

            sessions.retain(|handle| !handle.is_finished());
        }

        drop(listener);
        if !sessions.is_empty() {
            info!("Waiting for {} open session(s)", sessions.len());
        }
        for handle in sessions {
            if handle.join().is_err() {
                error!("Session thread panicked");
            }
        }

        info!("SMTP server stopped");
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<JoinHandle<()>> {
        // accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(self.read_timeout))?;

        let server_name = Arc::clone(&self.server_name);
        let delivery = Arc::clone(&self.delivery);
        let shutdown = self.shutdown.clone();

        thread::Builder::new()
            .name(format!("smtp-{peer}"))
            .spawn(move || {
                match handle_client(stream, &server_name, &*delivery, &shutdown) {
                    Ok(()) => debug!("Connection from {peer} closed"),
                    Err(SmtpError::Timeout) => warn!("Connection from {peer} timed out"),
                    Err(e) => warn!("Error handling client {peer}: {e}"),
                }
            })
    }
}

/// Handle a client connection
fn handle_client<D: Deliver + ?Sized>(
    stream: TcpStream,
    server_name: &str,
    delivery: &D,
    shutdown: &Shutdown,
) -> Result<(), SmtpError> {
    let mut io = LineIo::from_tcp(stream)?;
    SmtpSession::new(server_name, delivery)
        .with_shutdown(shutdown)
        .run(&mut io)
}
