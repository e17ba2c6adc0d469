//! Drag and drop interaction state for the upload zone.
//!
//! The zone tracks pointer interaction only; it never inspects the payload it
//! receives. A dropped candidate is handed back to the caller for validation.

use crate::media::CandidateFile;

/// Visible state of the zone. `Disabled` masks the drag phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropZoneState {
    #[default]
    Idle,
    DragOver,
    Disabled,
}

/// Where the pointer went when a drag-leave fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveTarget {
    /// The related target is outside the zone, or there is none
    Outside,
    /// The related target is a node contained in the zone
    Descendant,
}

/// Keyboard keys the zone distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Space,
    Escape,
    Tab,
    Other,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Self {
        match key {
            "Enter" => Key::Enter,
            " " | "Spacebar" => Key::Space,
            "Escape" => Key::Escape,
            "Tab" => Key::Tab,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => Key::Other,
                }
            }
        }
    }

    fn activates(&self) -> bool {
        matches!(self, Key::Enter | Key::Space)
    }
}

/// Interaction events delivered to the zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropZoneEvent {
    DragEnter,
    DragOver,
    DragLeave(LeaveTarget),
    Drop(Option<CandidateFile>),
    Click,
    Key(Key),
}

/// What the caller must do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropZoneAction {
    None,
    /// Run the dropped payload through the validator
    Validate(Option<CandidateFile>),
    /// Open the platform file picker
    OpenPicker,
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropZoneOutcome {
    /// Whether the platform's default handling must be suppressed
    pub suppress_default: bool,
    pub action: DropZoneAction,
}

impl DropZoneOutcome {
    fn ignored() -> Self {
        Self {
            suppress_default: false,
            action: DropZoneAction::None,
        }
    }

    fn suppressed(action: DropZoneAction) -> Self {
        Self {
            suppress_default: true,
            action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DragPhase {
    #[default]
    Idle,
    DragOver,
}

/// The drop zone state machine.
#[derive(Debug, Default)]
pub struct DropZone {
    phase: DragPhase,
    disabled: bool,
}

impl DropZone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DropZoneState {
        match (self.disabled, self.phase) {
            (true, _) => DropZoneState::Disabled,
            (false, DragPhase::Idle) => DropZoneState::Idle,
            (false, DragPhase::DragOver) => DropZoneState::DragOver,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Enable or disable the zone. Either way the drag phase returns to idle.
    pub fn set_disabled(&mut self, disabled: bool) {
        if self.disabled != disabled {
            log::debug!(
                "Drop zone {}",
                if disabled { "disabled" } else { "enabled" }
            );
        }
        self.disabled = disabled;
        self.phase = DragPhase::Idle;
    }

    /// Apply one event.
    ///
    /// Drag events always suppress the platform default so a file dropped on
    /// a disabled zone is not opened by the browser, but they change nothing
    /// while disabled.
    pub fn handle(&mut self, event: DropZoneEvent) -> DropZoneOutcome {
        match event {
            DropZoneEvent::DragEnter | DropZoneEvent::DragOver => {
                if !self.disabled {
                    self.phase = DragPhase::DragOver;
                }
                DropZoneOutcome::suppressed(DropZoneAction::None)
            }
            DropZoneEvent::DragLeave(target) => {
                if !self.disabled && target == LeaveTarget::Outside {
                    self.phase = DragPhase::Idle;
                }
                DropZoneOutcome::suppressed(DropZoneAction::None)
            }
            DropZoneEvent::Drop(candidate) => {
                if self.disabled {
                    log::debug!("Ignoring drop on disabled zone");
                    return DropZoneOutcome::suppressed(DropZoneAction::None);
                }
                self.phase = DragPhase::Idle;
                DropZoneOutcome::suppressed(DropZoneAction::Validate(candidate))
            }
            DropZoneEvent::Click => self.activate(),
            DropZoneEvent::Key(key) if key.activates() => self.activate(),
            DropZoneEvent::Key(_) => DropZoneOutcome::ignored(),
        }
    }

    fn activate(&mut self) -> DropZoneOutcome {
        if self.disabled {
            DropZoneOutcome::ignored()
        } else {
            DropZoneOutcome::suppressed(DropZoneAction::OpenPicker)
        }
    }
}
