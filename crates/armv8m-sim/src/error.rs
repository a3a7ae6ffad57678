// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fault representation and internal control-transfer types.
//!
//! Architectural faults (`ExcInfo`) are ordinary return values threaded
//! through every fallible helper. `InternalAbort` is the one place this
//! crate uses `Result` purely for non-local control transfer, and it is
//! swallowed at the top of [`crate::pe::Pe::step`] -- nothing below that
//! call ever sees it escape.

use crate::excnum;

/// Which architectural fault has been raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    MemManage,
    BusFault,
    UsageFault,
    SecureFault,
    HardFault,
}

impl Fault {
    pub fn exception_number(self) -> u16 {
        match self {
            Fault::MemManage => excnum::MEM_MANAGE,
            Fault::BusFault => excnum::BUS_FAULT,
            Fault::UsageFault => excnum::USAGE_FAULT,
            Fault::SecureFault => excnum::SECURE_FAULT,
            Fault::HardFault => excnum::HARD_FAULT,
        }
    }
}

/// Architectural fault information, threaded as a plain value rather than
/// raised as a Rust error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcInfo {
    pub fault: Fault,
    pub orig_fault: Option<Fault>,
    pub is_secure: bool,
    /// Terminates the current instruction immediately when true.
    pub is_terminal: bool,
    /// Set once the exception has actually been taken (entry has run).
    pub in_exc_taken: bool,
    pub lockup: bool,
    /// Distinguishes "instruction fully handled, proceed to advance phase"
    /// faults (e.g. UNDEFINED, which still needs ITSTATE/PC commit) from
    /// faults that should short-circuit everything.
    pub term_inst: bool,
}

impl ExcInfo {
    pub fn new(fault: Fault, is_secure: bool) -> Self {
        ExcInfo {
            fault,
            orig_fault: None,
            is_secure,
            is_terminal: true,
            in_exc_taken: false,
            lockup: false,
            term_inst: true,
        }
    }

    /// Merges a fault detected later in the same instruction (`de`, the
    /// "derived exception") against one already pending (`oe`): the
    /// higher-priority (lower-numbered) fault wins and the loser is
    /// recorded as `orig_fault` so the caller can decide whether to pend
    /// it (`pend_overridden_derived_exceptions`).
    pub fn merge(oe: ExcInfo, de: ExcInfo, priority_of: impl Fn(Fault) -> i32) -> ExcInfo {
        if priority_of(de.fault) < priority_of(oe.fault) {
            ExcInfo { orig_fault: Some(oe.fault), ..de }
        } else {
            ExcInfo { orig_fault: Some(de.fault), ..oe }
        }
    }
}

/// Failure surface of the debug-probe `debug_load`/`debug_store` entry
/// points. Unlike `ExcInfo`, this never enters the PE's pending-exception
/// state -- a rejected debug transfer is reported straight back to the
/// probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugError {
    /// The transfer was not naturally aligned to its size.
    Misaligned,
    /// The bus or register file rejected the access.
    Fault,
}

/// Internal, non-architectural control transfers used while decoding or
/// executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalAbort {
    /// No allocated encoding matched ("See/Undefined" in the reference
    /// manual's pseudocode).
    See,
    Undefined,
    /// A CONSTRAINED UNPREDICTABLE case this implementation declines to
    /// emulate freely.
    Unpredictable,
    /// The current instruction has already been fully handled (e.g.
    /// exception entry started mid-execute); dispatch should stop and
    /// proceed straight to the advance phase.
    EndOfInstruction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_higher_priority_fault() {
        let oe = ExcInfo::new(Fault::BusFault, false);
        let de = ExcInfo::new(Fault::HardFault, false);
        let priority_of = |f: Fault| match f {
            Fault::HardFault => -1,
            Fault::BusFault => 0,
            _ => 1,
        };
        let merged = ExcInfo::merge(oe, de, priority_of);
        assert_eq!(merged.fault, Fault::HardFault);
        assert_eq!(merged.orig_fault, Some(Fault::BusFault));
    }
}
