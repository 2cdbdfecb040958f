// The simulation the client controller drives.
//
// The controller owns the model and calls into it from `update()`:
// `simulate` once per simulation step with the model time reached, and
// `apply_command` for each command of a consumed turn, in confirmed order.
// Everything the model does must be a pure function of those calls for
// peers to stay in sync.

use lockstep_protocol::Command;

/// A deterministic simulation stepped by a `ClientLockstepController`.
pub trait Simulateable {
    /// Advance the model to `time_ms`. Always called with increasing values,
    /// one simulation step apart.
    fn simulate(&mut self, time_ms: i64);

    /// Apply a confirmed command. Called between `simulate` calls, at the
    /// start of the command's turn.
    fn apply_command(&mut self, command: &Command);
}

/// A model that ignores everything. Useful for driving a controller purely
/// for its events, e.g. when rebuilding a replay trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullModel;

impl Simulateable for NullModel {
    fn simulate(&mut self, _time_ms: i64) {}

    fn apply_command(&mut self, _command: &Command) {}
}
