// TCP server and main event loop for the lockstep relay.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread**: accepts connections and sends
//   `InternalEvent::NewConnection` to the main thread.
// - **Reader threads** (one per client): decode `ClientMessage` frames in a
//   loop and send `InternalEvent::MessageFrom`. EOF, read errors, and
//   protocol errors all end in `InternalEvent::Disconnected`.
// - **Main thread**: owns the `Session` and a `MonotonicClock`. Waits on the
//   channel with `recv_timeout(simulation_step)` and calls
//   `session.update(now)` after every wake-up, whether it was woken by an
//   event or by the timeout. The controller works out how many turns are due
//   from the timestamp, so an irregular wake-up cadence is harmless.
//
// There is no handshake to read on connect: the server speaks first with
// `SetLockstepConfig`, so a new connection is added to the session and gets
// its reader thread straight away.
//
// Shutdown: `RelayHandle::stop` clears `keep_running` and joins the main
// thread.

use std::io::BufReader;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use lockstep_core::SessionConfig;
use lockstep_protocol::{ClientId, ClientMessage, ProtocolError, recv_client_message};
use log::{debug, error, info, warn};

use crate::clock::MonotonicClock;
use crate::error::NetError;
use crate::session::Session;

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    NewConnection { stream: TcpStream },
    MessageFrom { client: ClientId, message: ClientMessage },
    Disconnected { client: ClientId },
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub port: u16,
    pub session: SessionConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 7878,
            session: SessionConfig::default(),
        }
    }
}

/// Start the relay on a background thread. Returns a handle for stopping it
/// and the bound address (useful with port 0).
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), NetError> {
    let session = Session::new(config.session)?;
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    let thread = thread::spawn(move || {
        run_relay(listener, session, keep_running_clone);
    });
    info!("relay: listening on {addr}");

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until `keep_running` is set to false.
fn run_relay(listener: TcpListener, mut session: Session, keep_running: Arc<AtomicBool>) {
    let clock = MonotonicClock::new();
    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Non-blocking so the accept thread can check keep_running.
    listener.set_nonblocking(true).ok();

    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    stream.set_nodelay(true).ok();
                    let _ = tx_listener.send(InternalEvent::NewConnection { stream });
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    error!("relay: accept failed: {e}");
                    break;
                }
            }
        }
    });

    let step_ms = u64::try_from(session.lockstep_config().simulation_step()).unwrap_or(1);
    let tick = Duration::from_millis(step_ms.max(1));

    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(tick) {
            Ok(event) => {
                handle_event(&mut session, event, &tx, &keep_running, clock.now());
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut session, event, &tx, &keep_running, clock.now());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        session.update(clock.now());
    }
    info!("relay: stopped");
}

fn handle_event(
    session: &mut Session,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
    now: i64,
) {
    match event {
        InternalEvent::NewConnection { stream } => {
            handle_new_connection(session, stream, tx, keep_running);
        }
        InternalEvent::MessageFrom { client, message } => {
            session.handle_message(client, message, now);
        }
        InternalEvent::Disconnected { client } => {
            session.remove_client(client);
        }
    }
}

/// Seat a new connection and spawn its reader thread. Refused connections
/// are dropped, which closes the socket.
fn handle_new_connection(
    session: &mut Session,
    stream: TcpStream,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    let peer = stream
        .peer_addr()
        .map_or_else(|_| "unknown peer".to_string(), |a| a.to_string());
    let read_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(e) => {
            warn!("relay: could not clone stream from {peer}: {e}");
            return;
        }
    };
    match session.add_client(stream) {
        Ok(client) => {
            debug!("relay: {peer} is {client}");
            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || {
                reader_loop(BufReader::new(read_stream), client, tx_reader, keep_running_reader);
            });
        }
        Err(e) => info!("relay: refused {peer}: {e}"),
    }
}

/// Reader loop for a single client. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    client: ClientId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match recv_client_message(&mut reader) {
            Ok(message) => {
                if tx.send(InternalEvent::MessageFrom { client, message }).is_err() {
                    return;
                }
            }
            Err(ProtocolError::Io(e)) => {
                debug!("relay: {client} read ended: {e}");
                break;
            }
            Err(e) => {
                warn!("relay: protocol desync from {client}: {e}");
                reader.get_ref().shutdown(Shutdown::Both).ok();
                break;
            }
        }
    }
    let _ = tx.send(InternalEvent::Disconnected { client });
}
