// lockstep_relay — TCP transport for lockstep sessions.
//
// The relay hosts a `ServerLockstepController` behind a TCP listener; game
// clients connect with `ClientSession`, which drives a local
// `ClientLockstepController` from the relay's messages. The relay never runs
// a model. It seals turns, forwards them, and tracks who has acknowledged
// what.
//
// Module overview:
// - `session.rs`: client slots, the ClientReady / AllClientsReady start
//                 barrier, and delivery of the server controller's events.
// - `server.rs`:  TCP listener, one reader thread per client, and the main
//                 loop that funnels everything through an `mpsc` channel
//                 into the single-threaded `Session`.
// - `client.rs`:  `NetClient` (connection + reader thread) and
//                 `ClientSession` (connection + client controller).
// - `clock.rs`:   `MonotonicClock`, millisecond timestamps for the
//                 controllers.
// - `error.rs`:   `NetError`.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded via
// `start_relay`.

pub mod client;
pub mod clock;
pub mod error;
pub mod server;
pub mod session;

pub use client::{ClientSession, NetClient};
pub use clock::MonotonicClock;
pub use error::NetError;
pub use server::{RelayConfig, RelayHandle, start_relay};
pub use session::Session;
