// Confirmed turn contents.
//
// `TurnData` is the server's verdict for one turn: the commands that execute
// on it, in the order the server aggregated them. Clients apply them in
// exactly this order and never re-sort. Once a turn has been distributed it
// is never edited; the server only appends to buckets of turns it has not
// advanced past yet (see `lockstep_core::server`).
//
// Wire layout: `turn:int32, commandCount:uint8`, then each command as kind
// byte + payload. The commands' own turn is implied by the enclosing turn.

use serde::{Deserialize, Serialize};

use crate::codec::{WireReader, WireWriter};
use crate::command::{Command, CommandAction};
use crate::error::ProtocolError;
use crate::types::Turn;

/// The ordered command list confirmed for one turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnData {
    turn: Turn,
    commands: Vec<Command>,
}

impl TurnData {
    /// An empty turn. Empty turns are still confirmed so clocks keep moving.
    pub fn new(turn: Turn) -> Self {
        Self {
            turn,
            commands: Vec::new(),
        }
    }

    /// Build a turn from already-ordered actions.
    pub fn with_actions(turn: Turn, actions: impl IntoIterator<Item = CommandAction>) -> Self {
        Self {
            turn,
            commands: actions
                .into_iter()
                .map(|action| Command::new(turn, action))
                .collect(),
        }
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Append a command. The command is re-targeted at this turn so that
    /// structural comparison against pending commands stays meaningful.
    pub fn push(&mut self, command: Command) {
        debug_assert_eq!(command.turn(), self.turn);
        self.commands.push(Command::new(self.turn, command.action().clone()));
    }

    pub fn write(&self, writer: &mut WireWriter) -> Result<(), ProtocolError> {
        writer.write_i32(self.turn);
        writer.write_count("commands", self.commands.len())?;
        for command in &self.commands {
            command.action().write(writer);
        }
        Ok(())
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let turn = reader.read_i32()?;
        let count = reader.read_u8()?;
        let mut commands = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            commands.push(Command::new(turn, CommandAction::read(reader)?));
        }
        Ok(Self { turn, commands })
    }
}
