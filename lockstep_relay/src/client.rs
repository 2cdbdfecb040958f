// TCP client side of a lockstep session.
//
// `NetClient` is the raw connection, same shape as the relay's reader
// threads but pointed the other way:
// - `connect()` opens the socket and reads the server's `SetLockstepConfig`
//   on the calling thread (5 s timeout), then spawns a reader thread.
// - The reader thread decodes `ServerMessage` frames into an `mpsc` channel.
//   A frame that fails to decode (unknown kind, trailing bytes, ...) is a
//   desync: the thread shuts the socket down and forwards the error.
// - `poll()` drains the channel without blocking and returns that error;
//   `send()` writes and flushes synchronously, which is fine for messages
//   this small.
//
// `ClientSession<M>` glues a `NetClient` to a `ClientLockstepController<M>`:
// one `pump(now)` per host frame feeds incoming turns to the controller,
// updates it, and sends whatever its events ask for (pending commands,
// reception acknowledgements). The drained events are handed back so the
// host can still react to stalls or record applied commands.
//
// `now` is the host's own monotonic milliseconds; the session start
// arrives as a relative delay, so client and relay clocks never need to
// agree.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lockstep_core::{ClientEvent, ClientLockstepController, LockstepConfig, Simulateable};
use lockstep_protocol::{
    ClientMessage, Command, CommandAction, ProtocolError, ServerMessage, recv_server_message,
    send_client_message,
};
use log::{debug, info, warn};

use crate::error::NetError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP connection to a relay.
pub struct NetClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<Result<ServerMessage, ProtocolError>>,
    closed: bool,
    _reader_thread: Option<JoinHandle<()>>,
}

impl NetClient {
    /// Connect and wait for the session's lockstep config.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<(Self, LockstepConfig), NetError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let config = match recv_server_message(&mut reader)? {
            ServerMessage::SetLockstepConfig(config) => LockstepConfig::try_from(config)?,
            other => return Err(NetError::UnexpectedHandshake(other.message_type())),
        };
        stream.set_read_timeout(None)?;
        debug!("net client: received lockstep config {config:?}");

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(reader, tx);
        });

        Ok((
            Self {
                writer: BufWriter::new(stream),
                inbox: rx,
                closed: false,
                _reader_thread: Some(reader_thread),
            },
            config,
        ))
    }

    pub fn send(&mut self, message: &ClientMessage) -> Result<(), NetError> {
        send_client_message(&mut self.writer, message)?;
        Ok(())
    }

    /// Drain all queued server messages (non-blocking). A protocol desync
    /// seen by the reader thread is returned as an error; the connection is
    /// already closed by then.
    pub fn poll(&mut self) -> Result<Vec<ServerMessage>, NetError> {
        let mut messages = Vec::new();
        loop {
            match self.inbox.try_recv() {
                Ok(Ok(message)) => messages.push(message),
                Ok(Err(e)) => {
                    self.closed = true;
                    return Err(e.into());
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        Ok(messages)
    }

    /// True once the reader thread has stopped and every message it
    /// delivered has been polled.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn disconnect(&mut self) {
        self.writer.get_ref().shutdown(Shutdown::Both).ok();
    }
}

/// Reader thread: decode frames into the channel until the stream ends or a
/// frame fails to decode.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    tx: mpsc::Sender<Result<ServerMessage, ProtocolError>>,
) {
    loop {
        match recv_server_message(&mut reader) {
            Ok(message) => {
                if tx.send(Ok(message)).is_err() {
                    break;
                }
            }
            Err(ProtocolError::Io(e)) => {
                debug!("net client: reader stopped: {e}");
                break;
            }
            Err(e) => {
                warn!("net client: protocol desync from server: {e}");
                reader.get_ref().shutdown(Shutdown::Both).ok();
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

/// A client controller driven by a relay connection.
pub struct ClientSession<M> {
    net: NetClient,
    controller: ClientLockstepController<M>,
}

impl<M: Simulateable> ClientSession<M> {
    /// Connect, receive the config, and build the controller around `model`.
    pub fn connect(addr: impl ToSocketAddrs, model: M) -> Result<Self, NetError> {
        let (net, config) = NetClient::connect(addr)?;
        let controller = ClientLockstepController::new(model, config)?;
        Ok(Self { net, controller })
    }

    /// Tell the relay this client is ready for the session to start.
    pub fn send_ready(&mut self) -> Result<(), NetError> {
        self.net.send(&ClientMessage::ClientReady)
    }

    /// Queue a local command. It goes out on the next `pump`.
    pub fn issue(&mut self, action: CommandAction) -> Command {
        self.controller.issue(action)
    }

    /// Process incoming messages, advance the controller to `now`, and send
    /// what it produced. Returns the controller's events from this pump, or
    /// the protocol error that closed the connection.
    pub fn pump(&mut self, now: i64) -> Result<Vec<ClientEvent>, NetError> {
        for message in self.net.poll()? {
            match message {
                ServerMessage::ConfirmTurns { turns } => self.controller.confirm_turns(turns),
                ServerMessage::AllClientsReady {
                    remaining_ms_to_start,
                    ..
                } => {
                    if self.controller.is_started() {
                        warn!("net client: ignoring repeated AllClientsReady");
                    } else {
                        info!("net client: session starts in {remaining_ms_to_start} ms");
                        self.controller
                            .start(now + i64::from(remaining_ms_to_start));
                    }
                }
                ServerMessage::SetLockstepConfig(_) => {
                    warn!("net client: ignoring SetLockstepConfig after handshake");
                }
            }
        }

        self.controller.update(now);

        let events = self.controller.drain_events();
        for event in &events {
            match event {
                ClientEvent::PendingCommandAdded(command) => {
                    self.net.send(&ClientMessage::LockstepCommand {
                        command: command.clone(),
                    })?;
                }
                ClientEvent::TurnsConfirmed(turns) => {
                    for message in ClientMessage::confirm_reception_chunked(turns) {
                        self.net.send(&message)?;
                    }
                }
                _ => {}
            }
        }
        Ok(events)
    }

    pub fn controller(&self) -> &ClientLockstepController<M> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ClientLockstepController<M> {
        &mut self.controller
    }

    pub fn is_closed(&self) -> bool {
        self.net.is_closed()
    }

    pub fn disconnect(&mut self) {
        self.net.disconnect();
    }

    pub fn into_model(self) -> M {
        self.controller.into_model()
    }
}
