// Core ID types for the lockstep protocol.
//
// Turns are plain `i32` values because they travel as `int32` on the wire and
// the controllers do a lot of arithmetic on them (current turn + anticipation
// + retries). Client slots get a newtype so they can't be mixed up with turn
// numbers or counts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A command turn number. Turn 0 is the pre-start turn and is never
/// confirmed; the first real turn is 1.
pub type Turn = i32;

/// Server-assigned client slot (0-based, below the session's client count).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u8);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}
