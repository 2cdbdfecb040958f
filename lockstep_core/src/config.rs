// Lockstep timing configuration.
//
// `LockstepConfig` is created once at session setup, pushed by the server to
// every client in the `SetLockstepConfig` handshake, and never changed
// afterwards. Both controllers refuse configs that fail `validate()`:
//
// - `simulation_step_ms > 0`
// - `command_step_factor >= 1`
// - `0 < min_anticipation <= initial_anticipation <= max_anticipation`
//
// A command turn lasts `command_step() = command_step_factor *
// simulation_step_ms` milliseconds.
//
// `ServerConfig` holds the session-level knobs only the server uses (client
// count, start delay, stall limit). `SessionConfig` bundles both for JSON
// config files; every field has a default so a file only needs the values it
// overrides.
//
// **Critical constraint: determinism.** All peers must run with identical
// lockstep configs. Clients never use a locally loaded config once the
// server's handshake arrives.

use std::path::Path;

use lockstep_protocol::SetLockstepConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid or unloadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("simulation step must be positive, got {0} ms")]
    NonPositiveSimulationStep(i32),

    #[error("command step factor must be at least 1, got {0}")]
    InvalidCommandStepFactor(i32),

    #[error("minimum anticipation must be positive, got {0}")]
    NonPositiveMinAnticipation(i32),

    #[error("anticipation out of order: need min {min} <= initial {initial} <= max {max}")]
    AnticipationOutOfRange { min: i32, initial: i32, max: i32 },

    #[error("max retries must not be negative, got {0}")]
    NegativeMaxRetries(i32),

    #[error("command step of {factor} x {step} ms overflows")]
    CommandStepOverflow { factor: i32, step: i32 },

    #[error("max clients must be between 1 and 255, got {0}")]
    InvalidMaxClients(usize),

    #[error("start delay must not be negative, got {0} ms")]
    NegativeStartDelay(i32),

    #[error("max pending turns must be positive")]
    ZeroMaxPendingTurns,

    #[error("config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Turn timing and anticipation bounds shared by every peer in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockstepConfig {
    /// Model tick size in milliseconds. The model is always stepped in
    /// exact multiples of this.
    pub simulation_step_ms: i32,
    /// Simulation steps per command turn.
    pub command_step_factor: i32,
    /// Lower bound for adaptive anticipation, in turns.
    pub min_anticipation: i32,
    /// Upper bound for adaptive anticipation, in turns.
    pub max_anticipation: i32,
    /// Anticipation a client starts with.
    pub initial_anticipation: i32,
    /// How many times an unconfirmed command is rescheduled before it is
    /// discarded.
    pub max_retries: u32,
}

impl Default for LockstepConfig {
    fn default() -> Self {
        Self {
            simulation_step_ms: 10,
            command_step_factor: 10,
            min_anticipation: 1,
            max_anticipation: 20,
            initial_anticipation: 2,
            max_retries: 2,
        }
    }
}

impl LockstepConfig {
    /// Length of one command turn in milliseconds.
    pub fn command_step(&self) -> i64 {
        i64::from(self.command_step_factor) * i64::from(self.simulation_step_ms)
    }

    pub fn simulation_step(&self) -> i64 {
        i64::from(self.simulation_step_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation_step_ms <= 0 {
            return Err(ConfigError::NonPositiveSimulationStep(self.simulation_step_ms));
        }
        if self.command_step_factor < 1 {
            return Err(ConfigError::InvalidCommandStepFactor(self.command_step_factor));
        }
        if self
            .command_step_factor
            .checked_mul(self.simulation_step_ms)
            .is_none()
        {
            return Err(ConfigError::CommandStepOverflow {
                factor: self.command_step_factor,
                step: self.simulation_step_ms,
            });
        }
        if self.min_anticipation <= 0 {
            return Err(ConfigError::NonPositiveMinAnticipation(self.min_anticipation));
        }
        if !(self.min_anticipation <= self.initial_anticipation
            && self.initial_anticipation <= self.max_anticipation)
        {
            return Err(ConfigError::AnticipationOutOfRange {
                min: self.min_anticipation,
                initial: self.initial_anticipation,
                max: self.max_anticipation,
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl From<&LockstepConfig> for SetLockstepConfig {
    fn from(config: &LockstepConfig) -> Self {
        Self {
            command_step_factor: config.command_step_factor,
            simulation_step: config.simulation_step_ms,
            min_anticipation: config.min_anticipation,
            max_anticipation: config.max_anticipation,
            execution_anticipation: config.initial_anticipation,
            // Saturate rather than wrap; no sane config gets near this.
            max_retries: i32::try_from(config.max_retries).unwrap_or(i32::MAX),
        }
    }
}

impl TryFrom<SetLockstepConfig> for LockstepConfig {
    type Error = ConfigError;

    /// Accept a handshake config, rejecting anything that fails validation.
    fn try_from(msg: SetLockstepConfig) -> Result<Self, Self::Error> {
        let max_retries = u32::try_from(msg.max_retries)
            .map_err(|_| ConfigError::NegativeMaxRetries(msg.max_retries))?;
        let config = Self {
            simulation_step_ms: msg.simulation_step,
            command_step_factor: msg.command_step_factor,
            min_anticipation: msg.min_anticipation,
            max_anticipation: msg.max_anticipation,
            initial_anticipation: msg.execution_anticipation,
            max_retries,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Server-only session settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Client slots. The session starts once all of them are filled and ready.
    pub max_clients: usize,
    /// Delay between the start barrier releasing and turn 1, in milliseconds.
    pub start_delay_ms: i32,
    /// A client with more unacknowledged turns than this is reported as
    /// stalled.
    pub max_pending_turns: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 2,
            start_delay_ms: 3000,
            max_pending_turns: 600,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 || self.max_clients > usize::from(u8::MAX) {
            return Err(ConfigError::InvalidMaxClients(self.max_clients));
        }
        if self.start_delay_ms < 0 {
            return Err(ConfigError::NegativeStartDelay(self.start_delay_ms));
        }
        if self.max_pending_turns == 0 {
            return Err(ConfigError::ZeroMaxPendingTurns);
        }
        Ok(())
    }
}

/// Everything a server needs to host a session, as stored in a config file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub lockstep: LockstepConfig,
    pub server: ServerConfig,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lockstep.validate()?;
        self.server.validate()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
