// Licensed under the Apache-2.0 license

use crate::clock::ClockId;
use thiserror::Error;

/// Errors that can occur while building, evaluating, restoring or emitting
/// a clock tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClockError {
    // Frequency evaluation
    /// A clock's parent edges were never resolved.
    #[error("clock {clock} is disconnected from its parents")]
    Disconnected { clock: String },

    #[error("gate {gate} on clock {clock} is in an undefined state")]
    UndefinedGateState { clock: String, gate: String },

    #[error("field {field} on clock {clock} has not been set")]
    UnsetField { clock: String, field: String },

    #[error("field {field} on clock {clock} is invalid: {reason}")]
    InvalidField {
        clock: String,
        field: String,
        reason: String,
    },

    /// An anchor clock that is not in the known-rate table.
    #[error("anchor clock {clock} has no known rate")]
    UnknownRate { clock: String },

    #[error("clock {clock} is part of a dependency cycle")]
    Cycle { clock: String },

    // Graph construction
    #[error("clock id {id} is defined more than once (second definition: {name})")]
    DuplicateId { id: ClockId, name: String },

    #[error("clock name {name} is used by more than one clock id")]
    DuplicateName { name: String },

    #[error("clock {name} ({id}) has both a divider and a fractional divider")]
    DividerAndFrac { id: ClockId, name: String },

    #[error("clock {name} ({id}) has {parents} parents but no mux")]
    MultiParentWithoutMux {
        id: ClockId,
        name: String,
        parents: usize,
    },

    #[error("malformed register spec {spec:?} on clock {clock}: {reason}")]
    MalformedSpec {
        clock: String,
        spec: String,
        reason: String,
    },

    #[error("clock {name} ({id}) references unknown parent id {parent}")]
    UnknownParent {
        id: ClockId,
        name: String,
        parent: ClockId,
    },

    #[error("anchor clock {name} needed by PLL {pll} is not defined")]
    MissingAnchor { name: String, pll: String },

    #[error("clock {name} ({id}) has no parents")]
    Orphan { id: ClockId, name: String },

    #[error("invalid register field {register}: {reason}")]
    InvalidRegisterField { register: String, reason: String },

    // Lookups shared by dump restore and live edits
    #[error("unknown clock {clock}")]
    UnknownClock { clock: String },

    #[error("clock {clock} has no child {child}")]
    UnknownChild { clock: String, child: String },

    #[error("clock {clock} has no field {field}")]
    UnknownField { clock: String, field: String },

    // Dump format
    #[error("unrecognized dump line {text:?}")]
    DumpSyntax { text: String },

    #[error("field line appears before any clock header")]
    NoCurrentClock,

    #[error("child field line appears outside a child block of clock {clock}")]
    NoCurrentChild { clock: String },

    #[error("dump line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<ClockError>,
    },

    // Firmware emission
    #[error("conflicting writes to register {register}: {}", .labels.join(", "))]
    CoalesceConflict {
        register: String,
        labels: Vec<String>,
    },
}

impl ClockError {
    /// Returns true for conditions a caller may treat as "frequency unknown"
    /// rather than aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClockError::Disconnected { .. }
                | ClockError::UndefinedGateState { .. }
                | ClockError::UnsetField { .. }
                | ClockError::InvalidField { .. }
                | ClockError::UnknownRate { .. }
        )
    }

    pub(crate) fn at_line(self, line: usize) -> Self {
        ClockError::AtLine {
            line,
            source: Box::new(self),
        }
    }
}

/// Result type for clock tree operations.
pub type ClockResult<T> = std::result::Result<T, ClockError>;
