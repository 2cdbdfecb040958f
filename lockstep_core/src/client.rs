// Client-side lockstep controller.
//
// `ClientLockstepController` owns the local model and decides when it may
// advance. Wall-clock time drives a turn clock (`simulation_time`); the model
// trails behind it, stepped in fixed `simulation_step` increments, and is
// never allowed past the end of the last confirmed turn. Commands are applied
// at turn boundaries in exactly the order the server confirmed them.
//
// Per `update(timestamp)`:
// 1. Advance `simulation_time` by the elapsed wall time scaled by
//    `desired_simulation_speed`. Non-positive elapsed time is ignored
//    entirely (the timestamp is not recorded either).
// 2. Advance `last_confirmed_turn` towards `current_turn()` while the next
//    turn has confirmed data (or confirmation is disabled). A gap stops the
//    advance and raises `MissingTurnConfirmation` once; closing it raises
//    `MissingTurnConfirmationReceived` once.
// 3. Step the model up to the safe time: the earliest of the turn clock, the
//    confirmed deadline (`last_confirmed_turn_time + command_step -
//    simulation_step`), and ten simulation steps past where the model is.
//    Whenever a step crosses a turn boundary, that turn is consumed.
// 4. Report `simulation_speed` as model time advanced / wall time elapsed.
//
// Local commands are issued at `execution_turn() = current_turn() +
// anticipation` and sit in the pending map until their turn is consumed. A
// pending command structurally equal to a confirmed one is a hit; one with
// no match is a miss and is rescheduled further out (or discarded after
// `max_retries`). Hits and misses feed a 4-sample window that nudges
// anticipation down on a healthy link and up on a lossy one.
//
// Confirmed turn data is never edited once stored. A confirmation for a turn
// already held or already consumed is dropped but still acknowledged so the
// server stops re-sending it.
//
// See also: `server.rs` for the authoritative side, `event.rs` for
// `ClientEvent`, `model.rs` for the `Simulateable` collaborator.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use lockstep_protocol::{Command, CommandAction, Turn, TurnData};

use crate::config::{ConfigError, LockstepConfig};
use crate::event::ClientEvent;
use crate::model::Simulateable;

/// Upper bound on model steps per `update()`, so a long stall doesn't turn
/// into one enormous catch-up frame.
pub const MAX_SIMULATION_STEPS_PER_UPDATE: i64 = 10;

/// Number of pending-command outcomes per anticipation adjustment.
const RESULT_WINDOW: usize = 4;

/// Default success-rate threshold for shrinking anticipation.
pub const DEFAULT_ANTICIPATION_ADJUSTMENT_FACTOR: f32 = 0.7;

pub struct ClientLockstepController<M> {
    model: M,
    config: LockstepConfig,
    simulation_step: i64,
    command_step: i64,

    started: bool,
    last_timestamp: i64,
    simulation_time: i64,
    last_model_simulation_time: i64,
    last_raw_model_simulation_time: i64,
    simulation_speed: f32,
    desired_simulation_speed: f32,

    last_confirmed_turn: Turn,
    last_confirmed_turn_time: i64,
    last_applied_turn: Turn,
    last_applied_turn_time: i64,
    missing_turn: bool,
    needs_turn_confirmation: bool,

    execution_turn_anticipation: i32,
    turn_anticipation_adjustment_factor: f32,
    pending_results: [bool; RESULT_WINDOW],
    pending_results_index: usize,

    pending_commands: BTreeMap<Turn, Vec<Command>>,
    confirmed_commands: BTreeMap<Turn, Vec<Command>>,
    events: Vec<ClientEvent>,
}

impl<M: Simulateable> ClientLockstepController<M> {
    pub fn new(model: M, config: LockstepConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            model,
            simulation_step: config.simulation_step(),
            command_step: config.command_step(),
            execution_turn_anticipation: config.initial_anticipation,
            config,
            started: false,
            last_timestamp: 0,
            simulation_time: 0,
            last_model_simulation_time: 0,
            last_raw_model_simulation_time: 0,
            simulation_speed: 0.0,
            desired_simulation_speed: 1.0,
            last_confirmed_turn: 0,
            last_confirmed_turn_time: 0,
            last_applied_turn: 0,
            last_applied_turn_time: 0,
            missing_turn: false,
            needs_turn_confirmation: true,
            turn_anticipation_adjustment_factor: DEFAULT_ANTICIPATION_ADJUSTMENT_FACTOR,
            pending_results: [false; RESULT_WINDOW],
            pending_results_index: 0,
            pending_commands: BTreeMap::new(),
            confirmed_commands: BTreeMap::new(),
            events: Vec::new(),
        })
    }

    /// Start the turn clock at `timestamp` (milliseconds, any monotonic
    /// origin). Updates before this are ignored.
    pub fn start(&mut self, timestamp: i64) {
        self.started = true;
        self.last_timestamp = timestamp;
        info!("lockstep client: simulation start scheduled at {timestamp}");
        self.events
            .push(ClientEvent::SimulationStartScheduled { timestamp });
    }

    pub fn update(&mut self, timestamp: i64) {
        if !self.started {
            return;
        }
        let wall_elapsed = timestamp.saturating_sub(self.last_timestamp);
        let elapsed = (f64::from(self.desired_simulation_speed) * wall_elapsed as f64) as i64;
        if elapsed <= 0 {
            return;
        }
        if self.simulation_time == 0 {
            self.events.push(ClientEvent::SimulationStarted);
        }
        self.simulation_time += elapsed;
        self.update_turn_confirmations();

        let max_confirmed_time = if self.needs_turn_confirmation {
            self.last_confirmed_turn_time + self.command_step - self.simulation_step
        } else {
            i64::MAX
        };

        if self.last_model_simulation_time <= max_confirmed_time {
            let next_model_time = max_confirmed_time
                .min(self.simulation_time)
                .min(
                    self.last_model_simulation_time
                        + MAX_SIMULATION_STEPS_PER_UPDATE * self.simulation_step,
                );
            let advanced = (next_model_time - self.last_raw_model_simulation_time).max(0);

            let mut step_time = self.last_model_simulation_time + self.simulation_step;
            while step_time <= next_model_time {
                self.last_model_simulation_time = step_time;
                self.model.simulate(step_time);
                if step_time >= self.last_applied_turn_time + self.command_step {
                    self.consume_turn(self.last_applied_turn + 1);
                }
                step_time += self.simulation_step;
            }
            self.last_raw_model_simulation_time = next_model_time;
            self.simulation_speed = advanced as f32 / elapsed as f32;
        } else {
            self.simulation_speed = 0.0;
        }
        self.last_timestamp = timestamp;
    }

    fn update_turn_confirmations(&mut self) {
        let current_turn = self.current_turn();
        while self.last_confirmed_turn < current_turn {
            let next_turn = self.last_confirmed_turn + 1;
            if !self.needs_turn_confirmation || self.confirmed_commands.contains_key(&next_turn) {
                self.last_confirmed_turn = next_turn;
                self.last_confirmed_turn_time += self.command_step;
            } else {
                if !self.missing_turn {
                    self.missing_turn = true;
                    warn!("lockstep client: waiting for confirmation of turn {next_turn}");
                    self.events
                        .push(ClientEvent::MissingTurnConfirmation { turn: next_turn });
                }
                return;
            }
        }

        if self.missing_turn {
            self.missing_turn = false;
            info!("lockstep client: turn confirmations caught up at turn {current_turn}");
            self.events
                .push(ClientEvent::MissingTurnConfirmationReceived { turn: current_turn });
        }
    }

    /// Issue a local command at the current execution turn.
    pub fn issue(&mut self, action: CommandAction) -> Command {
        let command = Command::new(self.execution_turn(), action);
        self.add_pending_command(command.clone());
        command
    }

    /// Queue a command as locally pending for its turn. A command for a turn
    /// that was already consumed counts as missed straight away and goes
    /// through the retry path.
    pub fn add_pending_command(&mut self, command: Command) {
        if command.turn() <= self.last_applied_turn {
            debug!(
                "lockstep client: {:?} for turn {} arrived after turn {} was applied",
                command.kind(),
                command.turn(),
                self.last_applied_turn
            );
            self.report_pending_command_result(false);
            self.reschedule_missed(command);
            return;
        }
        debug!(
            "lockstep client: pending {:?} for turn {} (current {})",
            command.kind(),
            command.turn(),
            self.current_turn()
        );
        self.pending_commands
            .entry(command.turn())
            .or_default()
            .push(command.clone());
        self.events.push(ClientEvent::PendingCommandAdded(command));
    }

    /// Store the server's command list for one turn.
    pub fn confirm_turn(&mut self, turn: Turn, commands: Vec<Command>) {
        self.store_confirmed_turn(turn, commands);
        self.events.push(ClientEvent::TurnsConfirmed(vec![turn]));
    }

    /// Store a batch of confirmed turns, acknowledging all of them at once.
    pub fn confirm_turns(&mut self, turns: Vec<TurnData>) {
        if turns.is_empty() {
            return;
        }
        let mut confirmed = Vec::with_capacity(turns.len());
        for data in turns {
            let turn = data.turn();
            self.store_confirmed_turn(turn, data.into_commands());
            confirmed.push(turn);
        }
        self.events.push(ClientEvent::TurnsConfirmed(confirmed));
    }

    fn store_confirmed_turn(&mut self, turn: Turn, commands: Vec<Command>) {
        if turn <= self.last_applied_turn || self.confirmed_commands.contains_key(&turn) {
            debug!("lockstep client: ignoring duplicate confirmation of turn {turn}");
            return;
        }
        let commands = commands
            .into_iter()
            .map(|command| {
                if command.turn() == turn {
                    command
                } else {
                    Command::new(turn, command.action().clone())
                }
            })
            .collect();
        self.confirmed_commands.insert(turn, commands);
    }

    /// Append one already-confirmed command to its turn. Used for replays,
    /// where there is no server and every command is known up front.
    pub fn add_confirmed_command(&mut self, command: Command) {
        self.confirmed_commands
            .entry(command.turn())
            .or_default()
            .push(command);
    }

    fn consume_turn(&mut self, turn: Turn) {
        let mut pending = self.pending_commands.remove(&turn).unwrap_or_default();

        if let Some(confirmed) = self.confirmed_commands.remove(&turn) {
            for command in confirmed {
                match pending.iter().position(|own| *own == command) {
                    Some(index) => {
                        let own = pending.remove(index);
                        self.report_pending_command_result(true);
                        self.apply_command(own);
                    }
                    None => self.apply_command(command),
                }
            }
        }

        for command in pending {
            self.report_pending_command_result(false);
            self.reschedule_missed(command);
        }

        if turn > self.last_applied_turn {
            self.last_applied_turn = turn;
            self.last_applied_turn_time = i64::from(turn) * self.command_step;
        }
    }

    /// Retry a command whose turn passed without it, or discard it once it
    /// has used up `max_retries`.
    fn reschedule_missed(&mut self, mut command: Command) {
        if command.retries() >= self.config.max_retries {
            warn!(
                "lockstep client: discarding {:?} after {} retries",
                command.kind(),
                command.retries()
            );
            self.events.push(ClientEvent::CommandDiscarded(command));
            return;
        }
        let retries = i32::try_from(command.retries()).unwrap_or(i32::MAX);
        let target = self
            .current_turn()
            .saturating_add(self.execution_turn_anticipation)
            .saturating_add(retries)
            .saturating_add(1);
        command.retry(target);
        self.add_pending_command(command);
    }

    fn apply_command(&mut self, command: Command) {
        self.model.apply_command(&command);
        self.events.push(ClientEvent::CommandApplied(command));
    }

    fn report_pending_command_result(&mut self, confirmed: bool) {
        self.pending_results[self.pending_results_index] = confirmed;
        self.pending_results_index = (self.pending_results_index + 1) % RESULT_WINDOW;
        if self.pending_results_index != 0 {
            return;
        }

        let hits = self.pending_results.iter().filter(|&&hit| hit).count();
        let success_rate = hits as f32 / RESULT_WINDOW as f32;
        let before = self.execution_turn_anticipation;
        if success_rate >= self.turn_anticipation_adjustment_factor {
            self.execution_turn_anticipation =
                (self.execution_turn_anticipation - 1).max(self.config.min_anticipation);
        }
        if success_rate <= 1.0 - self.turn_anticipation_adjustment_factor {
            self.execution_turn_anticipation =
                (self.execution_turn_anticipation + 1).min(self.config.max_anticipation);
        }
        if before != self.execution_turn_anticipation {
            debug!(
                "lockstep client: anticipation {before} -> {} (success rate {success_rate})",
                self.execution_turn_anticipation
            );
        }
    }

    /// Take every event raised since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }
}

impl<M> ClientLockstepController<M> {
    pub fn config(&self) -> &LockstepConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn current_turn(&self) -> Turn {
        Turn::try_from(self.simulation_time / self.command_step).unwrap_or(Turn::MAX)
    }

    /// Turn at which a command issued now is scheduled.
    pub fn execution_turn(&self) -> Turn {
        self.current_turn()
            .saturating_add(self.execution_turn_anticipation)
    }

    pub fn last_confirmed_turn(&self) -> Turn {
        self.last_confirmed_turn
    }

    pub fn last_applied_turn(&self) -> Turn {
        self.last_applied_turn
    }

    pub fn execution_turn_anticipation(&self) -> i32 {
        self.execution_turn_anticipation
    }

    pub fn simulation_time(&self) -> i64 {
        self.simulation_time
    }

    /// Model time reached so far.
    pub fn model_time(&self) -> i64 {
        self.last_model_simulation_time
    }

    /// Share of the last update's elapsed time the model actually advanced,
    /// scaled by the desired speed. Zero while blocked on a confirmation.
    pub fn simulation_speed(&self) -> f32 {
        self.simulation_speed * self.desired_simulation_speed
    }

    pub fn desired_simulation_speed(&self) -> f32 {
        self.desired_simulation_speed
    }

    pub fn set_desired_simulation_speed(&mut self, speed: f32) {
        self.desired_simulation_speed = speed;
    }

    pub fn needs_turn_confirmation(&self) -> bool {
        self.needs_turn_confirmation
    }

    /// Disable to run without a server (replays, local play).
    pub fn set_needs_turn_confirmation(&mut self, needs: bool) {
        self.needs_turn_confirmation = needs;
    }

    pub fn turn_anticipation_adjustment_factor(&self) -> f32 {
        self.turn_anticipation_adjustment_factor
    }

    pub fn set_turn_anticipation_adjustment_factor(&mut self, factor: f32) {
        self.turn_anticipation_adjustment_factor = factor;
    }

    pub fn is_waiting_for_confirmation(&self) -> bool {
        self.missing_turn
    }

    pub fn pending_commands(&self, turn: Turn) -> &[Command] {
        self.pending_commands
            .get(&turn)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn pending_command_count(&self) -> usize {
        self.pending_commands.values().map(Vec::len).sum()
    }

    pub fn is_turn_confirmed(&self, turn: Turn) -> bool {
        self.confirmed_commands.contains_key(&turn)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingModel {
        steps: Vec<i64>,
        applied: Vec<(i64, Command)>,
    }

    impl Simulateable for RecordingModel {
        fn simulate(&mut self, time_ms: i64) {
            self.steps.push(time_ms);
        }

        fn apply_command(&mut self, command: &Command) {
            let now = self.steps.last().copied().unwrap_or(0);
            self.applied.push((now, command.clone()));
        }
    }

    fn controller() -> ClientLockstepController<RecordingModel> {
        ClientLockstepController::new(RecordingModel::default(), LockstepConfig::default()).unwrap()
    }

    fn click(x: i32) -> CommandAction {
        CommandAction::Click { x, y: 0 }
    }

    fn count<F: Fn(&ClientEvent) -> bool>(events: &[ClientEvent], f: F) -> usize {
        events.iter().filter(|e| f(e)).count()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = LockstepConfig {
            min_anticipation: 5,
            ..LockstepConfig::default()
        };
        assert!(ClientLockstepController::new(RecordingModel::default(), config).is_err());
    }

    #[test]
    fn one_turn_after_one_command_step_without_confirmation() {
        let mut c = controller();
        c.set_needs_turn_confirmation(false);
        c.start(0);
        c.update(100);
        assert_eq!(c.current_turn(), 1);
        assert_eq!(c.last_confirmed_turn(), 1);
        assert_eq!(c.model_time(), 100);
        assert_eq!(c.model().steps, (1..=10).map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(c.last_applied_turn(), 1);
        assert!((c.simulation_speed() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn update_before_start_is_ignored() {
        let mut c = controller();
        c.update(500);
        assert_eq!(c.simulation_time(), 0);
        assert!(c.drain_events().is_empty());
    }

    #[test]
    fn clock_regression_is_a_no_op() {
        let mut c = controller();
        c.set_needs_turn_confirmation(false);
        c.start(1000);
        c.update(1050);
        c.update(1040);
        c.update(1050);
        assert_eq!(c.simulation_time(), 50);
        c.update(1100);
        assert_eq!(c.simulation_time(), 100);
    }

    #[test]
    fn start_events_fire_once() {
        let mut c = controller();
        c.set_needs_turn_confirmation(false);
        c.start(0);
        c.update(10);
        c.update(20);
        let events = c.drain_events();
        assert_eq!(events[0], ClientEvent::SimulationStartScheduled { timestamp: 0 });
        assert_eq!(count(&events, |e| *e == ClientEvent::SimulationStarted), 1);
    }

    #[test]
    fn desired_speed_scales_elapsed_time() {
        let mut c = controller();
        c.set_needs_turn_confirmation(false);
        c.set_desired_simulation_speed(2.0);
        c.start(0);
        c.update(50);
        assert_eq!(c.simulation_time(), 100);
        assert_eq!(c.current_turn(), 1);
    }

    #[test]
    fn missing_confirmation_blocks_model_and_signals_once() {
        let mut c = controller();
        c.start(0);
        c.update(100);
        // Deadline for unconfirmed turn 1 is 100 - 10.
        assert_eq!(c.model_time(), 90);
        c.update(200);
        assert_eq!(c.model_time(), 90);
        assert_eq!(c.simulation_speed(), 0.0);
        assert_eq!(c.last_confirmed_turn(), 0);

        let events = c.drain_events();
        assert_eq!(
            count(&events, |e| matches!(e, ClientEvent::MissingTurnConfirmation { turn: 1 })),
            1
        );
        assert!(c.is_waiting_for_confirmation());

        c.confirm_turn(1, Vec::new());
        c.confirm_turn(2, Vec::new());
        c.update(210);
        assert_eq!(c.last_confirmed_turn(), 2);
        let events = c.drain_events();
        assert!(events.contains(&ClientEvent::MissingTurnConfirmationReceived { turn: 2 }));
        assert!(!c.is_waiting_for_confirmation());
        // Catch-up is capped at ten steps per update.
        assert_eq!(c.model_time(), 190);
    }

    #[test]
    fn confirmed_commands_apply_in_server_order_at_turn_start() {
        let mut c = controller();
        c.start(0);
        c.confirm_turn(
            1,
            vec![
                Command::new(1, CommandAction::AdjustValue { delta: 2 }),
                Command::new(1, click(9)),
            ],
        );
        c.update(100);
        let applied = &c.model().applied;
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].0, 100);
        assert_eq!(applied[0].1.action(), &CommandAction::AdjustValue { delta: 2 });
        assert_eq!(applied[1].1.action(), &click(9));
    }

    #[test]
    fn own_command_is_matched_not_applied_twice() {
        let mut c = controller();
        c.start(0);
        let issued = c.issue(click(1));
        assert_eq!(issued.turn(), 2);
        c.confirm_turn(1, Vec::new());
        c.confirm_turn(2, vec![issued.clone()]);
        c.update(100);
        c.update(200);

        assert_eq!(c.model().applied.len(), 1);
        assert_eq!(c.pending_command_count(), 0);
        let events = c.drain_events();
        assert_eq!(
            count(&events, |e| matches!(e, ClientEvent::CommandApplied(_))),
            1
        );
        assert_eq!(
            count(&events, |e| matches!(e, ClientEvent::PendingCommandAdded(_))),
            1
        );
    }

    #[test]
    fn four_hits_shrink_anticipation_by_one() {
        let mut c = controller();
        c.start(0);
        let issued: Vec<Command> = (0..4).map(|i| c.issue(click(i))).collect();
        assert_eq!(c.execution_turn_anticipation(), 2);
        c.confirm_turn(1, Vec::new());
        c.confirm_turn(2, issued);
        c.update(100);
        c.update(200);
        assert_eq!(c.execution_turn_anticipation(), 1);
    }

    #[test]
    fn anticipation_never_drops_below_minimum() {
        let config = LockstepConfig {
            initial_anticipation: 1,
            ..LockstepConfig::default()
        };
        let mut c = ClientLockstepController::new(RecordingModel::default(), config).unwrap();
        c.start(0);
        let issued: Vec<Command> = (0..4).map(|i| c.issue(click(i))).collect();
        c.confirm_turn(1, issued);
        c.update(100);
        assert_eq!(c.execution_turn_anticipation(), 1);
    }

    #[test]
    fn four_misses_widen_anticipation_and_retry() {
        let mut c = controller();
        c.start(0);
        for i in 0..4 {
            c.issue(click(i));
        }
        c.drain_events();
        c.confirm_turn(1, Vec::new());
        c.confirm_turn(2, Vec::new());
        c.update(100);
        c.update(200);

        assert_eq!(c.execution_turn_anticipation(), 3);
        assert_eq!(c.pending_command_count(), 4);
        let retried: Vec<Command> = c
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::PendingCommandAdded(cmd) => Some(cmd),
                _ => None,
            })
            .collect();
        assert_eq!(retried.len(), 4);
        assert!(retried.iter().all(|cmd| cmd.retries() == 1));
        // current turn 2 + anticipation 2 + retries 0 + 1, except the last,
        // which sees the widened anticipation.
        assert_eq!(retried[0].turn(), 5);
        assert_eq!(retried[3].turn(), 6);
    }

    #[test]
    fn mixed_results_leave_anticipation_alone() {
        let mut c = controller();
        c.start(0);
        let issued: Vec<Command> = (0..4).map(|i| c.issue(click(i))).collect();
        c.confirm_turn(1, Vec::new());
        c.confirm_turn(2, issued[..2].to_vec());
        c.update(100);
        c.update(200);
        assert_eq!(c.execution_turn_anticipation(), 2);
    }

    #[test]
    fn unconfirmed_command_is_discarded_after_max_retries() {
        let mut c = controller();
        c.set_needs_turn_confirmation(false);
        c.start(0);
        c.issue(CommandAction::AdjustValue { delta: 1 });
        for step in 1..=40 {
            c.update(step * 100);
        }
        let events = c.drain_events();
        let added: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                ClientEvent::PendingCommandAdded(cmd) => Some(cmd.retries()),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec![0, 1, 2]);
        assert_eq!(
            count(&events, |e| matches!(e, ClientEvent::CommandDiscarded(cmd) if cmd.retries() == 2)),
            1
        );
        assert_eq!(c.pending_command_count(), 0);
        assert!(c.model().applied.is_empty());
    }

    #[test]
    fn pending_command_for_consumed_turn_is_retried_or_discarded() {
        let mut c = controller();
        c.set_needs_turn_confirmation(false);
        c.start(0);
        c.update(100);
        assert_eq!(c.last_applied_turn(), 1);
        c.drain_events();

        c.add_pending_command(Command::new(1, click(1)));
        let added: Vec<Command> = c
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                ClientEvent::PendingCommandAdded(cmd) => Some(cmd),
                _ => None,
            })
            .collect();
        assert_eq!(added.len(), 1);
        // current turn 1 + anticipation 2 + retries 0 + 1
        assert_eq!(added[0].turn(), 4);
        assert_eq!(added[0].retries(), 1);
        assert!(c.pending_commands(1).is_empty());
        assert_eq!(c.pending_command_count(), 1);

        let mut spent = Command::new(0, click(2));
        spent.retry(0);
        spent.retry(0);
        c.add_pending_command(spent);
        let events = c.drain_events();
        assert_eq!(count(&events, |e| matches!(e, ClientEvent::CommandDiscarded(_))), 1);
        assert_eq!(count(&events, |e| matches!(e, ClientEvent::PendingCommandAdded(_))), 0);
        assert_eq!(c.pending_command_count(), 1);
    }

    #[test]
    fn duplicate_confirmation_is_acked_but_not_stored_twice() {
        let mut c = controller();
        c.start(0);
        c.confirm_turns(vec![TurnData::with_actions(1, [click(1)])]);
        c.confirm_turns(vec![
            TurnData::with_actions(1, [click(2)]),
            TurnData::new(2),
        ]);
        let events = c.drain_events();
        assert!(events.contains(&ClientEvent::TurnsConfirmed(vec![1])));
        assert!(events.contains(&ClientEvent::TurnsConfirmed(vec![1, 2])));

        c.update(100);
        assert_eq!(c.model().applied.len(), 1);
        assert_eq!(c.model().applied[0].1.action(), &click(1));

        // Re-sent after consumption: still acked, never re-applied.
        c.confirm_turn(1, vec![Command::new(1, click(3))]);
        assert!(!c.is_turn_confirmed(1));
        c.update(200);
        assert_eq!(c.model().applied.len(), 1);
    }

    #[test]
    fn replay_style_preloaded_commands_apply_without_server() {
        let mut c = controller();
        c.set_needs_turn_confirmation(false);
        c.add_confirmed_command(Command::new(3, click(1)));
        c.add_confirmed_command(Command::new(3, click(2)));
        c.start(0);
        for step in 1..=3 {
            c.update(step * 100);
        }
        let applied: Vec<&CommandAction> = c.model().applied.iter().map(|(_, cmd)| cmd.action()).collect();
        assert_eq!(applied, vec![&click(1), &click(2)]);
        assert_eq!(c.model().applied[0].0, 300);
    }
}
