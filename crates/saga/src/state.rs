//! Compensation stack lifecycle.

use serde::{Deserialize, Serialize};

/// Where a [`CompensationStack`](crate::CompensationStack) is in its life.
///
/// ```text
/// Open ──► Unwinding ──┬──► Unwound     (every compensator succeeded)
///                      └──► Incomplete  (at least one compensator failed)
/// ```
///
/// A stack that stays `Open` until it is dropped belonged to a workflow that
/// succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StackState {
    /// Compensators are being registered.
    #[default]
    Open,

    /// Compensators are running in reverse order.
    Unwinding,

    /// Every compensator ran successfully.
    Unwound,

    /// Every compensator ran, some failed. Manual cleanup may be needed.
    Incomplete,
}

impl StackState {
    /// State reached once an unwind with `failures` failed compensators ends.
    pub fn after_unwind(failures: usize) -> Self {
        if failures == 0 {
            Self::Unwound
        } else {
            Self::Incomplete
        }
    }

    /// Returns true once the stack has been unwound, successfully or not.
    pub fn is_unwound(&self) -> bool {
        matches!(self, Self::Unwound | Self::Incomplete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Unwinding => "unwinding",
            Self::Unwound => "unwound",
            Self::Incomplete => "incomplete",
        }
    }
}

impl std::fmt::Display for StackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
