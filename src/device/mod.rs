//! Device transport for the makcu mouse bridge
//!
//! The hardware side of the system: a USB-serial bridge that injects relative
//! pointer movement and streams physical button transitions back. The control
//! loop only ever talks to the [`MouseTransport`] trait so the serial driver
//! can be swapped for a scripted double in tests.

pub mod makcu;

pub use makcu::MakcuTransport;

use crate::profile::ToggleButton;

/// Physical mouse buttons as reported by the device bitmask stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    Left,
    Right,
    Middle,
    Mouse4,
    Mouse5,
}

impl ButtonId {
    pub const COUNT: usize = 5;

    pub const ALL: [ButtonId; Self::COUNT] = [
        ButtonId::Left,
        ButtonId::Right,
        ButtonId::Middle,
        ButtonId::Mouse4,
        ButtonId::Mouse5,
    ];

    /// Bit position in the device's button bitmask byte.
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl From<ToggleButton> for ButtonId {
    fn from(button: ToggleButton) -> Self {
        match button {
            ToggleButton::M4 => ButtonId::Mouse4,
            ToggleButton::M5 => ButtonId::Mouse5,
            ToggleButton::Middle => ButtonId::Middle,
        }
    }
}

/// Button transition observed since the previous poll of the same button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
    Unchanged,
}

/// Transport I/O failure. Recoverable: the loop treats a failed move as a
/// no-op for that tick and the driver reconnects in the background.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no makcu device found: {0}")]
    NotFound(String),

    #[error("device not connected")]
    Disconnected,

    #[error("serial I/O failed: {0}")]
    Io(String),
}

/// Capability interface between the control loop and the hardware.
///
/// Implementations use interior mutability; all methods are non-blocking from
/// the caller's point of view (a `move_rel` is a short buffered serial write).
pub trait MouseTransport: Send + Sync {
    /// Edge observed on `button` since the previous poll. Presses shorter than
    /// the poll interval are latched and surface as `Pressed` on one poll and
    /// `Released` on the next; multiple flaps within one interval coalesce.
    fn poll_button(&self, button: ButtonId) -> ButtonEdge;

    /// Fire-and-forget relative pointer displacement.
    fn move_rel(&self, dx: i32, dy: i32) -> Result<(), DeviceError>;

    fn connected(&self) -> bool;
}
