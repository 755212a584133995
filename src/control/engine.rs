//! The recoil engine: a three-state FSM driven by a fixed tick.
//!
//! ```text
//! Disarmed ◄──toggle──► ArmedIdle ──trigger press──► ArmedFiring
//!     ▲                     ▲                            │
//!     │                     └────────trigger release─────┘
//!     └───────────toggle edge / device loss──────────────┘
//! ```
//!
//! A toggle edge during a burst both stops the in-flight compensation and
//! disarms, so resuming takes a fresh toggle edge plus a fresh trigger press.
//! Everything time-based runs off monotonic [`Instant`]s captured at tick
//! time; profile edits land between ticks and never move the press timestamp.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use statum::{machine, state};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::{ButtonEdge, ButtonId, MouseTransport};
use crate::profile::Profile;

use super::{EngineCommand, HorizontalPhase, SharedState};

/// Engine cadence settings.
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Tick period in milliseconds. Constant and independent of system load;
    /// ten milliseconds tracks weapon fire rates closely enough that per-tick
    /// pixel amounts stay small integers.
    pub tick_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
        }
    }
}

/// Runtime firing state. `ArmedFiring` carries the press timestamp and the
/// derived horizontal phase; both vanish on release so every burst starts
/// from a clean window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FireState {
    Disarmed,
    ArmedIdle,
    ArmedFiring {
        fire_start: Instant,
        phase: HorizontalPhase,
    },
}

#[state]
#[derive(Debug, Clone)]
pub enum EngineState {
    Initializing,
    Running,
}

#[machine]
pub struct RecoilEngine<S: EngineState> {
    transport: Arc<dyn MouseTransport>,
    shared: Arc<SharedState>,
    commands: mpsc::Receiver<EngineCommand>,
    settings: EngineSettings,
    fire: FireState,
    // Snapshot of the shared profile, refreshed once per tick
    active: Profile,
}

impl RecoilEngine<Initializing> {
    pub fn create(
        transport: Arc<dyn MouseTransport>,
        shared: Arc<SharedState>,
        commands: mpsc::Receiver<EngineCommand>,
        settings: Option<EngineSettings>,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        debug!("Creating recoil engine with settings: {:?}", settings);
        Self::new(
            transport,
            shared,
            commands,
            settings,
            FireState::Disarmed,
            Profile::default(),
        )
    }

    /// Reports device availability and transitions to the running state. A
    /// missing device is not fatal: the loop simply refuses to arm until the
    /// transport reconnects.
    pub fn initialize(self) -> RecoilEngine<Running> {
        if self.transport.connected() {
            info!("Recoil engine starting with device connected");
        } else {
            warn!("Recoil engine starting without a device; it will arm once one appears");
        }
        self.transition()
    }
}

impl RecoilEngine<Running> {
    /// Drives the tick loop until cancelled. Missed ticks are skipped rather
    /// than bursted so a stalled host never replays stale compensation.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = Duration::from_millis(self.settings.tick_interval_ms);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Recoil loop running at {}ms cadence", self.settings.tick_interval_ms);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Recoil loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.refresh_profile();
                    self.tick(Instant::now());
                }
            }
        }

        // No emission after shutdown begins.
        self.fire = FireState::Disarmed;
        self.publish();
    }

    /// Non-blocking profile refresh; contention with an in-flight edit keeps
    /// the previous snapshot for one tick, never a torn read.
    fn refresh_profile(&mut self) {
        if let Ok(guard) = self.shared.profile.try_read() {
            self.active = guard.clone();
        }
    }

    /// One control tick. `now` is injected so tests can drive the timeline.
    fn tick(&mut self, now: Instant) {
        // Surface commands apply atomically at tick start.
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::ToggleArmed { response_tx } => {
                    self.apply_toggle();
                    let _ = response_tx.send(self.fire != FireState::Disarmed);
                }
            }
        }

        // A vanished device must not leave the system stuck armed.
        if !self.transport.connected() {
            if self.fire != FireState::Disarmed {
                warn!("Device disconnected, disarming");
                self.fire = FireState::Disarmed;
            }
            self.publish();
            return;
        }

        // The binding comes from this tick's snapshot, so a rebind only
        // affects future edges.
        let toggle_button = ButtonId::from(self.active.toggle_button);
        if self.transport.poll_button(toggle_button) == ButtonEdge::Pressed {
            self.apply_toggle();
        }

        match self.transport.poll_button(ButtonId::Left) {
            ButtonEdge::Pressed => {
                if self.fire == FireState::ArmedIdle {
                    self.fire = FireState::ArmedFiring {
                        fire_start: now,
                        phase: initial_phase(&self.active),
                    };
                    debug!("Trigger pressed, compensation started");
                }
            }
            ButtonEdge::Released => {
                if matches!(self.fire, FireState::ArmedFiring { .. }) {
                    self.fire = FireState::ArmedIdle;
                    debug!("Trigger released, compensation stopped");
                }
            }
            ButtonEdge::Unchanged => {}
        }

        // Drain edges on every unbound button each tick; otherwise a press
        // latched before a rebind would replay as a toggle the moment the
        // binding changes.
        for button in ButtonId::ALL {
            if button != ButtonId::Left && button != toggle_button {
                let _ = self.transport.poll_button(button);
            }
        }

        if let FireState::ArmedFiring { fire_start, phase } = &mut self.fire {
            let elapsed_ms = now.duration_since(*fire_start).as_millis() as u64;
            *phase = horizontal_phase(&self.active, elapsed_ms);

            let dx = if *phase == HorizontalPhase::Active {
                self.active.horizontal_amount.round() as i32
            } else {
                0
            };
            let dy = self.active.vertical_pull.round() as i32;

            // One combined move per tick; two separate calls would show as
            // two-step jitter on screen.
            if dx != 0 || dy != 0 {
                if let Err(e) = self.transport.move_rel(dx, dy) {
                    warn!("Move failed, retrying next tick: {}", e);
                }
            }
        }

        self.publish();
    }

    fn apply_toggle(&mut self) {
        self.fire = match self.fire {
            FireState::Disarmed => {
                info!("Armed");
                FireState::ArmedIdle
            }
            FireState::ArmedIdle => {
                info!("Disarmed");
                FireState::Disarmed
            }
            // Disarm overrides firing: the in-flight burst stops now and
            // resuming takes toggle + trigger again.
            FireState::ArmedFiring { .. } => {
                info!("Disarmed mid-burst");
                FireState::Disarmed
            }
        };
    }

    fn publish(&self) {
        self.shared
            .armed
            .store(self.fire != FireState::Disarmed, Ordering::Relaxed);
        self.shared.firing.store(
            matches!(self.fire, FireState::ArmedFiring { .. }),
            Ordering::Relaxed,
        );
    }
}

fn initial_phase(profile: &Profile) -> HorizontalPhase {
    if profile.horizontal_amount == 0.0 {
        HorizontalPhase::Inactive
    } else if profile.horizontal_delay_ms > 0 {
        HorizontalPhase::Pending
    } else {
        HorizontalPhase::Active
    }
}

fn horizontal_phase(profile: &Profile, elapsed_ms: u64) -> HorizontalPhase {
    if profile.horizontal_amount == 0.0 {
        HorizontalPhase::Inactive
    } else if elapsed_ms < profile.horizontal_delay_ms {
        HorizontalPhase::Pending
    } else if profile.horizontal_duration_ms == 0
        || elapsed_ms < profile.horizontal_delay_ms + profile.horizontal_duration_ms
    {
        HorizontalPhase::Active
    } else {
        HorizontalPhase::Expired
    }
}

/// Owning handle for the spawned engine task.
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    task: tokio::task::JoinHandle<()>,
}

impl EngineHandle {
    /// Spawns the engine as a tokio task and returns the handle the surface
    /// uses to reach it.
    pub fn spawn(
        transport: Arc<dyn MouseTransport>,
        shared: Arc<SharedState>,
        settings: Option<EngineSettings>,
        cancel: CancellationToken,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let engine = RecoilEngine::create(transport, shared, commands_rx, settings);
        let task = tokio::spawn(async move {
            engine.initialize().run(cancel).await;
        });
        Self {
            commands: commands_tx,
            task,
        }
    }

    pub fn commands(&self) -> mpsc::Sender<EngineCommand> {
        self.commands.clone()
    }

    /// Waits for the loop to drain after cancellation; the caller releases
    /// the device handle only after this returns.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Engine task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use crate::profile::ToggleButton;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    /// Scripted transport double: edges are queued per button and popped one
    /// per poll; emitted moves are recorded for assertions.
    #[derive(Default)]
    struct ScriptedTransport {
        edges: Mutex<HashMap<ButtonId, VecDeque<ButtonEdge>>>,
        moves: Mutex<Vec<(i32, i32)>>,
        move_attempts: AtomicUsize,
        fail_moves: AtomicBool,
        disconnected: AtomicBool,
    }

    impl ScriptedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn push_edge(&self, button: ButtonId, edge: ButtonEdge) {
            self.edges
                .lock()
                .unwrap()
                .entry(button)
                .or_default()
                .push_back(edge);
        }

        fn moves(&self) -> Vec<(i32, i32)> {
            self.moves.lock().unwrap().clone()
        }
    }

    impl MouseTransport for ScriptedTransport {
        fn poll_button(&self, button: ButtonId) -> ButtonEdge {
            self.edges
                .lock()
                .unwrap()
                .get_mut(&button)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(ButtonEdge::Unchanged)
        }

        fn move_rel(&self, dx: i32, dy: i32) -> Result<(), DeviceError> {
            self.move_attempts.fetch_add(1, Ordering::Relaxed);
            if self.fail_moves.load(Ordering::Relaxed) {
                return Err(DeviceError::Io("scripted failure".into()));
            }
            self.moves.lock().unwrap().push((dx, dy));
            Ok(())
        }

        fn connected(&self) -> bool {
            !self.disconnected.load(Ordering::Relaxed)
        }
    }

    fn running_engine(
        profile: Profile,
        transport: Arc<ScriptedTransport>,
    ) -> (
        RecoilEngine<Running>,
        Arc<SharedState>,
        mpsc::Sender<EngineCommand>,
    ) {
        let shared = SharedState::new(profile);
        let (tx, rx) = mpsc::channel(8);
        let mut engine =
            RecoilEngine::create(transport, shared.clone(), rx, None).initialize();
        engine.refresh_profile();
        (engine, shared, tx)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Arm via toggle edge and start firing via trigger edge at `t0`.
    fn arm_and_fire(
        engine: &mut RecoilEngine<Running>,
        transport: &ScriptedTransport,
        toggle: ButtonId,
        t0: Instant,
    ) {
        transport.push_edge(toggle, ButtonEdge::Pressed);
        engine.tick(t0);
        transport.push_edge(ButtonId::Left, ButtonEdge::Pressed);
        engine.tick(t0);
    }

    #[test]
    fn disarmed_ignores_the_trigger() {
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(Profile::default(), transport.clone());

        transport.push_edge(ButtonId::Left, ButtonEdge::Pressed);
        engine.tick(Instant::now());

        assert!(!shared.armed());
        assert!(!shared.firing());
        assert!(transport.moves().is_empty());
    }

    #[test]
    fn arming_alone_emits_nothing() {
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(Profile::default(), transport.clone());

        transport.push_edge(ButtonId::Mouse5, ButtonEdge::Pressed);
        engine.tick(Instant::now());

        assert!(shared.armed());
        assert!(!shared.firing());
        assert!(transport.moves().is_empty());
    }

    #[test]
    fn zero_horizontal_amount_never_emits_laterally() {
        let profile = Profile {
            vertical_pull: 4.0,
            horizontal_amount: 0.0,
            horizontal_delay_ms: 0,
            horizontal_duration_ms: 0,
            toggle_button: ToggleButton::M5,
        };
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(profile, transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse5, t0);
        for step in 1..50u64 {
            engine.tick(t0 + ms(step * 10));
        }

        assert!(shared.firing());
        let moves = transport.moves();
        assert!(!moves.is_empty());
        assert!(moves.iter().all(|&(dx, dy)| dx == 0 && dy == 4));
    }

    #[test]
    fn zero_duration_keeps_horizontal_until_release() {
        let profile = Profile {
            vertical_pull: 2.0,
            horizontal_amount: -3.0,
            horizontal_delay_ms: 40,
            horizontal_duration_ms: 0,
            toggle_button: ToggleButton::M4,
        };
        let transport = ScriptedTransport::new();
        let (mut engine, _shared, _tx) = running_engine(profile, transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse4, t0);
        // Well past any plausible duration window.
        for step in 1..=600u64 {
            engine.tick(t0 + ms(step * 10));
        }
        transport.push_edge(ButtonId::Left, ButtonEdge::Released);
        engine.tick(t0 + ms(6_010));

        let moves = transport.moves();
        let last = *moves.last().unwrap();
        assert_eq!(last, (-3, 2), "horizontal still active at release time");
        // Nothing after the release tick.
        engine.tick(t0 + ms(6_020));
        assert_eq!(transport.moves().len(), moves.len());
    }

    #[test]
    fn delay_then_duration_window_gates_horizontal_emission() {
        let profile = Profile {
            vertical_pull: 4.0,
            horizontal_amount: 4.0,
            horizontal_delay_ms: 60,
            horizontal_duration_ms: 67,
            toggle_button: ToggleButton::M4,
        };
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(profile, transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse4, t0);
        assert_eq!(transport.moves(), vec![(0, 4)], "pending right after press");

        engine.tick(t0 + ms(50));
        assert_eq!(transport.moves().last(), Some(&(0, 4)), "still pending at 50ms");

        engine.tick(t0 + ms(70));
        assert_eq!(transport.moves().last(), Some(&(4, 4)), "active at 70ms");
        engine.tick(t0 + ms(100));
        assert_eq!(transport.moves().last(), Some(&(4, 4)), "active at 100ms");

        engine.tick(t0 + ms(130));
        assert_eq!(transport.moves().last(), Some(&(0, 4)), "expired at 130ms");

        transport.push_edge(ButtonId::Left, ButtonEdge::Released);
        let before = transport.moves().len();
        engine.tick(t0 + ms(200));
        assert_eq!(transport.moves().len(), before, "no emission on release");
        assert!(shared.armed());
        assert!(!shared.firing());
    }

    #[test]
    fn new_press_reopens_the_horizontal_window() {
        let profile = Profile {
            vertical_pull: 1.0,
            horizontal_amount: 5.0,
            horizontal_delay_ms: 0,
            horizontal_duration_ms: 20,
            toggle_button: ToggleButton::M5,
        };
        let transport = ScriptedTransport::new();
        let (mut engine, _shared, _tx) = running_engine(profile, transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse5, t0);
        engine.tick(t0 + ms(30));
        assert_eq!(transport.moves().last(), Some(&(0, 1)), "first window expired");

        transport.push_edge(ButtonId::Left, ButtonEdge::Released);
        engine.tick(t0 + ms(40));
        transport.push_edge(ButtonId::Left, ButtonEdge::Pressed);
        engine.tick(t0 + ms(50));
        assert_eq!(transport.moves().last(), Some(&(5, 1)), "window restarted");
    }

    #[test]
    fn toggle_mid_burst_disarms_and_requires_full_resume() {
        let profile = Profile {
            vertical_pull: 3.0,
            horizontal_amount: 0.0,
            horizontal_delay_ms: 0,
            horizontal_duration_ms: 0,
            toggle_button: ToggleButton::Middle,
        };
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(profile, transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Middle, t0);
        assert!(shared.firing());

        transport.push_edge(ButtonId::Middle, ButtonEdge::Pressed);
        engine.tick(t0 + ms(10));
        assert!(!shared.armed());
        assert!(!shared.firing());

        // Trigger still physically held: no edges, no emission.
        let emitted = transport.moves().len();
        for step in 2..10u64 {
            engine.tick(t0 + ms(step * 10));
        }
        assert_eq!(transport.moves().len(), emitted);

        // Re-arming alone is not enough while the trigger stays held.
        transport.push_edge(ButtonId::Middle, ButtonEdge::Pressed);
        engine.tick(t0 + ms(100));
        assert!(shared.armed());
        engine.tick(t0 + ms(110));
        assert!(!shared.firing());
        assert_eq!(transport.moves().len(), emitted);

        // A fresh press edge resumes.
        transport.push_edge(ButtonId::Left, ButtonEdge::Pressed);
        engine.tick(t0 + ms(120));
        assert!(shared.firing());
        assert_eq!(transport.moves().len(), emitted + 1);
    }

    #[test]
    fn device_loss_mid_burst_disarms_within_one_tick() {
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(Profile::default(), transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse5, t0);
        assert!(shared.firing());

        transport.disconnected.store(true, Ordering::Relaxed);
        let emitted = transport.moves().len();
        engine.tick(t0 + ms(10));

        assert!(!shared.armed());
        assert!(!shared.firing());
        assert!(!transport.connected());
        assert_eq!(transport.moves().len(), emitted, "no move attempted while gone");
    }

    #[test]
    fn failed_move_is_retried_next_tick_without_state_change() {
        let profile = Profile {
            vertical_pull: 2.0,
            ..Profile::default()
        };
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(profile, transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse5, t0);
        let attempts = transport.move_attempts.load(Ordering::Relaxed);

        transport.fail_moves.store(true, Ordering::Relaxed);
        engine.tick(t0 + ms(10));
        assert!(shared.firing(), "a device error never transitions state");

        transport.fail_moves.store(false, Ordering::Relaxed);
        engine.tick(t0 + ms(20));
        assert_eq!(
            transport.move_attempts.load(Ordering::Relaxed),
            attempts + 2,
            "unconditional retry on the next tick"
        );
        assert_eq!(transport.moves().last(), Some(&(0, 2)));
    }

    #[test]
    fn profile_edit_mid_burst_keeps_the_original_press_time() {
        let profile = Profile {
            vertical_pull: 4.0,
            horizontal_amount: 4.0,
            horizontal_delay_ms: 5_000,
            horizontal_duration_ms: 0,
            toggle_button: ToggleButton::M4,
        };
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(profile, transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse4, t0);
        assert_eq!(transport.moves().last(), Some(&(0, 4)), "long delay pending");

        // Surface edit lands between ticks: shorten the delay.
        shared.profile.try_write().unwrap().horizontal_delay_ms = 60;
        engine.refresh_profile();

        // Evaluated against the original press time, 70ms is already past the
        // new 60ms delay.
        engine.tick(t0 + ms(70));
        assert_eq!(transport.moves().last(), Some(&(4, 4)));
    }

    #[test]
    fn toggle_rebind_applies_to_future_edges_only() {
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(Profile::default(), transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse5, t0);
        assert!(shared.firing());

        shared.profile.try_write().unwrap().toggle_button = ToggleButton::M4;
        engine.refresh_profile();

        // The old binding no longer disarms...
        transport.push_edge(ButtonId::Mouse5, ButtonEdge::Pressed);
        engine.tick(t0 + ms(10));
        assert!(shared.firing());

        // ...the new one does.
        transport.push_edge(ButtonId::Mouse4, ButtonEdge::Pressed);
        engine.tick(t0 + ms(20));
        assert!(!shared.armed());
    }

    #[test]
    fn stale_edge_on_an_unbound_button_never_replays_after_rebind() {
        let transport = ScriptedTransport::new();
        let (mut engine, shared, _tx) = running_engine(Profile::default(), transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse5, t0);
        assert!(shared.firing());

        // Press on a button that is not bound yet; it must be consumed on
        // this tick, not held back until the binding changes.
        transport.push_edge(ButtonId::Mouse4, ButtonEdge::Pressed);
        engine.tick(t0 + ms(10));
        engine.tick(t0 + ms(20));
        assert!(shared.armed());

        shared.profile.try_write().unwrap().toggle_button = ToggleButton::M4;
        engine.refresh_profile();

        // The pre-rebind press must not surface as a toggle now.
        engine.tick(t0 + ms(30));
        assert!(shared.armed());
        assert!(shared.firing());

        // A fresh edge on the new binding disarms as usual.
        transport.push_edge(ButtonId::Mouse4, ButtonEdge::Pressed);
        engine.tick(t0 + ms(40));
        assert!(!shared.armed());
    }

    #[tokio::test]
    async fn cancellation_drains_the_loop_and_clears_runtime_flags() {
        let transport = ScriptedTransport::new();
        let shared = SharedState::new(Profile::default());
        let cancel = CancellationToken::new();
        let handle = EngineHandle::spawn(transport.clone(), shared.clone(), None, cancel.clone());

        let (response_tx, response_rx) = oneshot::channel();
        handle
            .commands()
            .send(EngineCommand::ToggleArmed { response_tx })
            .await
            .unwrap();
        assert!(response_rx.await.unwrap());
        assert!(shared.armed());

        // Joining after cancellation must leave the system disarmed no
        // matter what state the loop was in.
        cancel.cancel();
        handle.join().await;
        assert!(!shared.armed());
        assert!(!shared.firing());
    }

    #[test]
    fn manual_toggle_command_replies_with_resulting_state() {
        let transport = ScriptedTransport::new();
        let (mut engine, shared, tx) = running_engine(Profile::default(), transport.clone());

        let (response_tx, mut response_rx) = oneshot::channel();
        tx.try_send(EngineCommand::ToggleArmed { response_tx }).unwrap();
        engine.tick(Instant::now());
        assert!(response_rx.try_recv().unwrap());
        assert!(shared.armed());

        let (response_tx, mut response_rx) = oneshot::channel();
        tx.try_send(EngineCommand::ToggleArmed { response_tx }).unwrap();
        engine.tick(Instant::now());
        assert!(!response_rx.try_recv().unwrap());
        assert!(!shared.armed());
    }

    #[test]
    fn fractional_amounts_round_to_whole_pixels() {
        let profile = Profile {
            vertical_pull: 0.4,
            horizontal_amount: 0.0,
            horizontal_delay_ms: 0,
            horizontal_duration_ms: 0,
            toggle_button: ToggleButton::M5,
        };
        let transport = ScriptedTransport::new();
        let (mut engine, _shared, _tx) = running_engine(profile, transport.clone());

        let t0 = Instant::now();
        arm_and_fire(&mut engine, &transport, ButtonId::Mouse5, t0);
        engine.tick(t0 + ms(10));

        // 0.4 rounds to zero: the all-zero move is skipped entirely.
        assert_eq!(transport.move_attempts.load(Ordering::Relaxed), 0);
        assert!(transport.moves().is_empty());
    }
}
