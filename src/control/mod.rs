//! Recoil control loop
//!
//! The only component with real temporal logic: a fixed-cadence state machine
//! that watches button edges from the device transport and emits timed
//! compensation moves while armed.
//!
//! ```text
//! Transport ──[button edges]──► RecoilEngine ──[km.move]──► Transport
//!                                    ▲
//!              Control Surface ──[EngineCommand]──┘
//! ```
//!
//! The engine task is the only writer of runtime state (armed/firing) and the
//! only reader of the active profile during a tick; the surface writes the
//! profile behind the shared lock and reads the runtime flags from atomics.

pub mod engine;

pub use engine::{EngineHandle, EngineSettings};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};

use crate::profile::Profile;

/// Horizontal-compensation phase, derived each tick from the press timestamp
/// and the active profile's delay/duration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalPhase {
    /// Horizontal compensation disabled (`horizontal_amount == 0`).
    Inactive,
    /// Waiting out `horizontal_delay_ms` after the trigger press.
    Pending,
    /// Emitting lateral movement.
    Active,
    /// Duration window elapsed; vertical-only until the next press.
    Expired,
}

/// Requests relayed from the control surface, drained at the start of the
/// next tick so they apply atomically with respect to emission.
#[derive(Debug)]
pub enum EngineCommand {
    /// Manual arm/disarm; replies with the resulting armed flag.
    ToggleArmed { response_tx: oneshot::Sender<bool> },
}

/// State shared between the engine task and the control surface.
///
/// The profile sits behind one lock so the loop always reads a complete,
/// never-partially-edited snapshot; the runtime flags are mirrored into
/// atomics so status reads never contend with a tick.
#[derive(Debug)]
pub struct SharedState {
    pub profile: RwLock<Profile>,
    pub armed: AtomicBool,
    pub firing: AtomicBool,
}

impl SharedState {
    pub fn new(profile: Profile) -> Arc<Self> {
        Arc::new(Self {
            profile: RwLock::new(profile),
            armed: AtomicBool::new(false),
            firing: AtomicBool::new(false),
        })
    }

    pub fn armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    pub fn firing(&self) -> bool {
        self.firing.load(Ordering::Relaxed)
    }
}
