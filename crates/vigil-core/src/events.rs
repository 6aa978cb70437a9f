use crate::surface::TargetId;

/// Inputs delivered by the host shell's event source. The tracker never
/// originates these; banner button presses arrive here too, keyed by the
/// target whose banner carried the button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    /// A target became the active one, with its current URL.
    ContextActivated { target: TargetId, url: String },
    /// The active target navigated to a new URL.
    ContextUrlChanged { target: TargetId, url: String },
    /// A target disappeared externally.
    ContextRemoved { target: TargetId },
    /// Focus moved to a target (resolved through the target surface), or
    /// away from the host entirely (`None`).
    FocusChanged { target: Option<TargetId> },
    /// The host process (re)started; in-memory state must be reconciled
    /// from durable state.
    ProcessStarted,
    /// The user pressed Snooze on a target's banner.
    SnoozePressed { target: TargetId },
    /// The user pressed Unblock on a target's banner.
    UnblockPressed { target: TargetId },
}
