//! Weapon profiles: the tunable compensation parameters plus the toggle
//! binding, their validation rules, and JSON persistence of named snapshots.

pub mod store;

use serde::{Deserialize, Serialize};

pub use store::{ProfileStore, StoreError};

/// Upper bound for `vertical_pull` and `|horizontal_amount|` in pixels per tick.
pub const MAX_AMOUNT: f64 = 300.0;
/// Upper bound for the horizontal-phase delay.
pub const MAX_DELAY_MS: u64 = 5_000;
/// Upper bound for the horizontal-phase duration.
pub const MAX_DURATION_MS: u64 = 10_000;
/// Longest accepted profile name.
pub const MAX_NAME_LEN: usize = 50;

/// Side button that arms/disarms the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToggleButton {
    M4,
    M5,
    Middle,
}

/// Active compensation configuration.
///
/// The serialized shape of this struct is the wire format of the HTTP API and
/// the persisted profile collection, so field names are load-bearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Downward compensation in pixels per tick while the trigger is held.
    pub vertical_pull: f64,
    /// Lateral compensation in pixels per tick; negative pulls left, zero
    /// disables the horizontal phase entirely.
    pub horizontal_amount: f64,
    /// Time after trigger press before horizontal compensation starts.
    pub horizontal_delay_ms: u64,
    /// How long the horizontal phase runs once started; zero means "until
    /// trigger release".
    pub horizontal_duration_ms: u64,
    pub toggle_button: ToggleButton,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            vertical_pull: 1.0,
            horizontal_amount: 0.0,
            horizontal_delay_ms: 500,
            horizontal_duration_ms: 2_000,
            toggle_button: ToggleButton::M5,
        }
    }
}

/// Rejected profile field or profile name. No state is mutated when one of
/// these surfaces; the caller keeps the previous value.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("vertical_pull must be between 0 and {MAX_AMOUNT}, got {0}")]
    VerticalPull(f64),

    #[error("horizontal_amount must be between -{MAX_AMOUNT} and {MAX_AMOUNT}, got {0}")]
    HorizontalAmount(f64),

    #[error("horizontal_delay_ms must be at most {MAX_DELAY_MS}, got {0}")]
    HorizontalDelay(u64),

    #[error("horizontal_duration_ms must be at most {MAX_DURATION_MS}, got {0}")]
    HorizontalDuration(u64),

    #[error(
        "profile name must be 1-{MAX_NAME_LEN} characters of letters, digits, \
         spaces, '_' or '-'"
    )]
    ProfileName,
}

impl Profile {
    /// Checks every field against the documented ranges. NaN fails the range
    /// comparison and is rejected like any other out-of-range value.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=MAX_AMOUNT).contains(&self.vertical_pull) {
            return Err(ValidationError::VerticalPull(self.vertical_pull));
        }
        if !(-MAX_AMOUNT..=MAX_AMOUNT).contains(&self.horizontal_amount) {
            return Err(ValidationError::HorizontalAmount(self.horizontal_amount));
        }
        if self.horizontal_delay_ms > MAX_DELAY_MS {
            return Err(ValidationError::HorizontalDelay(self.horizontal_delay_ms));
        }
        if self.horizontal_duration_ms > MAX_DURATION_MS {
            return Err(ValidationError::HorizontalDuration(
                self.horizontal_duration_ms,
            ));
        }
        Ok(())
    }

    /// Applies a partial edit, validating the result before anything is
    /// visible to the caller. Returns the new profile; on rejection the
    /// previous profile stays untouched.
    pub fn with_update(&self, update: &ProfileUpdate) -> Result<Profile, ValidationError> {
        let mut next = self.clone();
        if let Some(v) = update.vertical_pull {
            next.vertical_pull = v;
        }
        if let Some(v) = update.horizontal_amount {
            next.horizontal_amount = v;
        }
        if let Some(v) = update.horizontal_delay_ms {
            next.horizontal_delay_ms = v;
        }
        if let Some(v) = update.horizontal_duration_ms {
            next.horizontal_duration_ms = v;
        }
        if let Some(v) = update.toggle_button {
            next.toggle_button = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial profile edit as accepted by `PUT /api/profile`. Absent fields keep
/// their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub vertical_pull: Option<f64>,
    pub horizontal_amount: Option<f64>,
    pub horizontal_delay_ms: Option<u64>,
    pub horizontal_duration_ms: Option<u64>,
    pub toggle_button: Option<ToggleButton>,
}

/// Profile names are case-sensitive keys in the persisted collection; the
/// accepted alphabet matches what the UI lets the user type.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let len_ok = !name.is_empty() && name.chars().count() <= MAX_NAME_LEN;
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ' '));
    if len_ok && chars_ok {
        Ok(())
    } else {
        Err(ValidationError::ProfileName)
    }
}
