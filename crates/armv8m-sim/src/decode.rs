// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `Decoder`/`Executor`: Thumb T16/T32 dispatch tree,
//! condition/ITSTATE handling, and a representative slice of the
//! instruction table sufficient to exercise exception entry/return,
//! IT-block conditionals, exclusive accesses, and SVC/SG transitions
//! end to end.
//!
//! The full per-opcode arithmetic table is out of scope;
//! this module specifies the dispatch mechanism and implements enough
//! opcodes that the top-level loop and exception model can be exercised
//! end to end.

use armv8m_regs::{it_state_from_xpsr, it_state_into_xpsr};

use crate::config::SimulatorConfig;
use crate::device::{AccessSize, AccessType};
use crate::error::{ExcInfo, Fault, InternalAbort};
use crate::excnum;
use crate::memory::MemoryPipeline;
use crate::monitor::LocalMonitor;
use crate::nest::CpuNest;
use crate::state::{Mode, PeState};
use crate::systick_timer::SysTickTimer;

const SG_FIRST_HALF: u16 = 0xE97F;
const SG_SECOND_HALF: u16 = 0xE97F;

/// Condition codes, in the standard ARM encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Cond {
    pub fn from_bits(bits: u8) -> Cond {
        match bits & 0xF {
            0 => Cond::Eq,
            1 => Cond::Ne,
            2 => Cond::Cs,
            3 => Cond::Cc,
            4 => Cond::Mi,
            5 => Cond::Pl,
            6 => Cond::Vs,
            7 => Cond::Vc,
            8 => Cond::Hi,
            9 => Cond::Ls,
            10 => Cond::Ge,
            11 => Cond::Lt,
            12 => Cond::Gt,
            13 => Cond::Le,
            _ => Cond::Al,
        }
    }

    /// `_ConditionPassed`.
    pub fn passed(self, n: bool, z: bool, c: bool, v: bool) -> bool {
        match self {
            Cond::Eq => z,
            Cond::Ne => !z,
            Cond::Cs => c,
            Cond::Cc => !c,
            Cond::Mi => n,
            Cond::Pl => !n,
            Cond::Vs => v,
            Cond::Vc => !v,
            Cond::Hi => c && !z,
            Cond::Ls => !c || z,
            Cond::Ge => n == v,
            Cond::Lt => n != v,
            Cond::Gt => !z && (n == v),
            Cond::Le => z || (n != v),
            Cond::Al => true,
        }
    }
}

/// Advances ITSTATE after a non-IT instruction has executed inside an IT
/// block.
pub fn advance_it_state(it_state: u8) -> u8 {
    if it_state & 0b111 == 0 {
        0
    } else {
        (it_state & 0b1110_0000) | ((it_state << 1) & 0b0001_1111)
    }
}

/// `branch_write_pc`: clears bit 0 unconditionally.
pub fn branch_write_pc(addr: u32) -> u32 {
    addr & !1
}

/// Outcome of `bx_write_pc` dispatch.
pub enum BxOutcome {
    PendExceptionReturn(u32),
    FunctionReturnUnstack,
    Branch { target: u32, thumb: bool },
}

pub fn bx_write_pc(addr: u32, in_handler_mode: bool, from_secure: bool, allow_ns_unstack: bool) -> BxOutcome {
    if in_handler_mode && (addr >> 24) == 0xFF {
        return BxOutcome::PendExceptionReturn(addr);
    }
    if from_secure && allow_ns_unstack && (addr & 0xFFFF_FFFE) == 0xFFFF_FFFE {
        return BxOutcome::FunctionReturnUnstack;
    }
    BxOutcome::Branch { target: addr & !1, thumb: addr & 1 != 0 }
}

/// Outcome of executing one instruction, reported back to the top level
/// so it can decide whether to run the advance phase.
pub struct ExecOutcome {
    pub branch_taken: bool,
    pub new_pc: u32,
}

pub struct Decoder;

impl Decoder {
    /// Fetches one halfword, enforcing the SG domain-crossing check at
    /// the earliest-detection default.
    #[allow(clippy::too_many_arguments)]
    pub fn fetch_and_dispatch(
        state: &mut PeState,
        nest: &mut CpuNest,
        cfg: &SimulatorConfig,
        pipeline: &mut MemoryPipeline,
        systick: Option<&SysTickTimer>,
        crossing_to_ns_target: bool,
    ) -> Result<u32, InternalAbort> {
        let privileged = !state.control().npriv;
        let secure = state.is_secure();
        let pc = state.pc;

        let first = pipeline
            .fetch_halfword(state, nest, cfg, systick, pc, privileged, secure)
            .map_err(|e| {
                Self::raise(state, nest, e);
                InternalAbort::EndOfInstruction
            })?;

        if crossing_to_ns_target && first != SG_FIRST_HALF {
            nest.sfsr |= 1 << 0; // INVEP
            let mut info = ExcInfo::new(Fault::SecureFault, secure);
            info.term_inst = true;
            Self::raise(state, nest, info);
            return Err(InternalAbort::EndOfInstruction);
        }

        let is_32bit = matches!((first >> 11) & 0b11111, 0b11101 | 0b11110 | 0b11111);
        if !is_32bit {
            state.scratch.this_instr = first as u32;
            state.scratch.this_instr_length = 2;
            Ok(first as u32)
        } else {
            let second = pipeline
                .fetch_halfword(state, nest, cfg, systick, pc + 2, privileged, secure)
                .map_err(|e| {
                    Self::raise(state, nest, e);
                    InternalAbort::EndOfInstruction
                })?;
            let word = ((first as u32) << 16) | second as u32;
            state.scratch.this_instr = word;
            state.scratch.this_instr_length = 4;
            Ok(word)
        }
    }

    fn raise(state: &mut PeState, nest: &mut CpuNest, info: ExcInfo) {
        let banked = excnum::is_banked(info.fault.exception_number(), false);
        state.exc_pending[info.fault.exception_number() as usize].set(banked, info.is_secure, true);
        let _ = nest;
    }

    /// Whether `SG` is the literal opcode this module special-cases in the
    /// domain-crossing check above.
    pub fn is_sg_opcode(first: u16, second: u16) -> bool {
        first == SG_FIRST_HALF && second == SG_SECOND_HALF
    }

    pub fn default_cond_from_it_state(it_state: u8) -> u8 {
        if it_state == 0 {
            0b1110
        } else {
            it_state >> 4
        }
    }
}

pub struct Executor;

impl Executor {
    /// Executes the halfword/word already loaded into
    /// `state.scratch.this_instr`. Returns `Ok(())` having updated
    /// `next_instr_addr`/PC-change scratch fields, or an `ExcInfo` for
    /// UNDEFINED/architectural faults (`term_inst=false` so the top level
    /// still runs the advance phase), or `InternalAbort` for encodings
    /// this module declines to emulate.
    #[allow(clippy::too_many_arguments)]
    pub fn execute(
        state: &mut PeState,
        nest: &mut CpuNest,
        cfg: &SimulatorConfig,
        pipeline: &mut MemoryPipeline,
        systick: Option<&SysTickTimer>,
        local_monitor: &mut LocalMonitor,
    ) -> Result<(), InternalAbort> {
        let instr = state.scratch.this_instr;
        let len = state.scratch.this_instr_length;
        state.scratch.next_instr_addr = state.pc + len as u32;

        let it_state = it_state_from_xpsr(state.xpsr);
        let default_cond = Decoder::default_cond_from_it_state(it_state);
        let cond_bits = if state.scratch.cur_cond_override >= 0 {
            state.scratch.cur_cond_override as u8
        } else {
            default_cond
        };
        let cond = Cond::from_bits(cond_bits);
        let n = state.xpsr & (1 << 31) != 0;
        let z = state.xpsr & (1 << 30) != 0;
        let c = state.xpsr & (1 << 29) != 0;
        let v = state.xpsr & (1 << 28) != 0;

        if len == 2 {
            match instr as u16 {
                0xBF00 => { /* NOP */ }
                0xBF30 => {
                    state.exit_cause |= crate::state::ExitCause::WFI;
                }
                it @ 0xBF00..=0xBFFF if it & 0xF != 0 => {
                    // IT{x}{y}{z} <cond>.
                    let firstcond = ((it >> 4) & 0xF) as u8;
                    let mask = (it & 0xF) as u8;
                    let new_it = (firstcond << 4) | mask;
                    state.scratch.it_state_changed = true;
                    state.scratch.next_it_state = new_it;
                    return Self::advance_only(state, it_state);
                }
                bx if (bx & 0xFF87) == 0x4700 => {
                    // BX Rm
                    if !cond.passed(n, z, c, v) {
                        return Self::advance_only(state, it_state);
                    }
                    let rm = ((bx >> 3) & 0xF) as usize;
                    let target = Self::read_reg(state, rm);
                    match bx_write_pc(target, state.mode() == Mode::Handler, state.is_secure(), true) {
                        BxOutcome::Branch { target, .. } => {
                            state.pc = target;
                            state.scratch.pc_changed = true;
                        }
                        BxOutcome::PendExceptionReturn(exc_return) => {
                            crate::exceptions::ExceptionEngine::exception_return(state, nest, cfg, pipeline, systick, exc_return)?;
                        }
                        BxOutcome::FunctionReturnUnstack => {
                            state.pc = target & !1;
                            state.scratch.pc_changed = true;
                        }
                    }
                    return Ok(());
                }
                mov if (mov & 0xF800) == 0x2000 => {
                    // MOVS/MOV<cond> Rd, #imm8
                    if !cond.passed(n, z, c, v) {
                        return Self::advance_only(state, it_state);
                    }
                    let rd = ((mov >> 8) & 0x7) as usize;
                    let imm = (mov & 0xFF) as u32;
                    Self::write_reg(state, rd, imm);
                    if it_state == 0 {
                        state.xpsr = (state.xpsr & !(0b11 << 30))
                            | (if imm == 0 { 1 << 30 } else { 0 })
                            | (if imm & 0x8000_0000 != 0 { 1 << 31 } else { 0 });
                    }
                }
                svc if (svc & 0xFF00) == 0xDF00 => {
                    let banked = excnum::is_banked(excnum::SVCALL, false);
                    let secure = state.is_secure();
                    state.exc_pending[excnum::SVCALL as usize].set(banked, secure, true);
                }
                _ => {
                    nest.fault_mut(state.is_secure()).cfsr |= 1 << 16; // UFSR.UNDEFINSTR
                    return Err(InternalAbort::Undefined);
                }
            }
        } else {
            // T32 LDREX/STREX exclusive pair, reduced to their addressing
            // mode: `instr` bits [31:16] = first halfword, low 16 = second.
            let op1 = (instr >> 16) as u16;
            let op2 = instr as u16;
            if (op1 & 0xFFF0) == 0xE850 {
                let rn = ((op1 >> 0) & 0xF) as usize;
                let rt = ((op2 >> 12) & 0xF) as usize;
                let imm8 = (op2 & 0xFF) << 2;
                let addr = Self::read_reg(state, rn).wrapping_add(imm8 as u32);
                let privileged = !state.control().npriv;
                let secure = state.is_secure();
                let val = pipeline
                    .load(state, nest, cfg, systick, addr, AccessSize::Word, AccessType::Normal, privileged, secure)
                    .map_err(|_| InternalAbort::EndOfInstruction)?;
                Self::write_reg(state, rt, val);
                state.scratch.pending_return_operation = false;
                local_monitor.mark_exclusive(addr, 4);
                pipeline.global_monitor.mark_exclusive(pipeline.pe_id, addr, 4);
            } else if (op1 & 0xFFF0) == 0xE840 {
                let rn = (op1 & 0xF) as usize;
                let rd = ((op2 >> 8) & 0xF) as usize;
                let rt = ((op2 >> 12) & 0xF) as usize;
                let imm8 = (op2 & 0xFF) << 2;
                let addr = Self::read_reg(state, rn).wrapping_add(imm8 as u32);
                let privileged = !state.control().npriv;
                let secure = state.is_secure();
                // Both monitors are queried (and thus cleared) on every
                // attempt, per the architecture; only a match in both
                // means no other PE's store and no context-switch-equivalent
                // event invalidated the reservation.
                let local_matched = local_monitor.exclusive_store(addr, 4, cfg.local_monitor_checks_address);
                let global_matched = pipeline.global_monitor.exclusive_store(pipeline.pe_id, addr, 4);
                let matched = local_matched && global_matched;
                if matched {
                    let value = Self::read_reg(state, rt);
                    pipeline
                        .store(state, nest, cfg, systick, addr, AccessSize::Word, AccessType::Normal, privileged, secure, value)
                        .map_err(|_| InternalAbort::EndOfInstruction)?;
                    Self::write_reg(state, rd, 0);
                } else {
                    Self::write_reg(state, rd, 1);
                }
            } else if (op1 & 0xF800) == 0xF000 && (op2 & 0xC000) == 0xC000 {
                // BL <label24>, T32 unconditional branch-with-link.
                let s = ((op1 >> 10) & 1) as u32;
                let imm10 = (op1 & 0x3FF) as u32;
                let j1 = ((op2 >> 13) & 1) as u32;
                let j2 = ((op2 >> 11) & 1) as u32;
                let imm11 = (op2 & 0x7FF) as u32;
                let i1 = 1 - (j1 ^ s);
                let i2 = 1 - (j2 ^ s);
                let mut imm = (s << 24) | (i1 << 23) | (i2 << 22) | (imm10 << 12) | (imm11 << 1);
                if s != 0 {
                    imm |= 0xFF00_0000;
                }
                let target = state.scratch.next_instr_addr.wrapping_add(imm as i32 as u32);
                state.lr = state.scratch.next_instr_addr | 1;
                state.pc = branch_write_pc(target);
                state.scratch.pc_changed = true;
            } else {
                nest.fault_mut(state.is_secure()).cfsr |= 1 << 16;
                return Err(InternalAbort::Undefined);
            }
        }

        Self::advance_only(state, it_state)
    }

    fn advance_only(state: &mut PeState, it_state: u8) -> Result<(), InternalAbort> {
        if !state.scratch.pc_changed {
            state.pc = state.scratch.next_instr_addr;
        }
        if it_state != 0 && !state.scratch.it_state_changed {
            state.scratch.it_state_changed = true;
            state.scratch.next_it_state = advance_it_state(it_state);
        }
        Ok(())
    }

    fn read_reg(state: &PeState, idx: usize) -> u32 {
        match idx {
            0..=12 => state.r[idx],
            13 => state.sp(),
            14 => state.lr,
            _ => state.pc,
        }
    }

    fn write_reg(state: &mut PeState, idx: usize, value: u32) {
        match idx {
            0..=12 => state.r[idx] = value,
            13 => state.set_sp(value),
            14 => state.lr = value,
            _ => {
                state.pc = branch_write_pc(value);
                state.scratch.pc_changed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_codes_match_reference_truth_table() {
        assert!(Cond::Eq.passed(false, true, false, false));
        assert!(!Cond::Eq.passed(false, false, false, false));
        assert!(Cond::Ge.passed(true, false, false, true));
        assert!(!Cond::Lt.passed(true, false, false, true));
    }

    #[test]
    fn it_state_advances_and_clears_at_bottom_three_zero() {
        // itt eq: firstcond=EQ(0000), mask=0b1000 (one conditional instr follows).
        let it = (0b0000 << 4) | 0b1000;
        let next = advance_it_state(it);
        assert_eq!(next, 0);
    }

    #[test]
    fn default_cond_is_always_outside_it_block() {
        assert_eq!(Decoder::default_cond_from_it_state(0), 0b1110);
    }

    #[test]
    fn branch_write_pc_clears_bit_zero() {
        assert_eq!(branch_write_pc(0x1001), 0x1000);
    }

    #[test]
    fn strex_fails_when_another_pe_clears_the_global_tag() {
        // Mirrors the combination STREX handling now performs: a PE's own
        // local tag surviving is not enough, the global monitor must agree.
        use crate::monitor::{GlobalMonitor, LocalMonitor};

        let global = GlobalMonitor::new();
        let mut local0 = LocalMonitor::default();

        local0.mark_exclusive(0x2000, 4);
        global.mark_exclusive(0, 0x2000, 4);

        // PE 1 performs its own exclusive store to the same line, clearing
        // PE 0's global reservation without touching PE 0's local monitor.
        global.mark_exclusive(1, 0x2000, 4);
        assert!(global.exclusive_store(1, 0x2000, 4));

        let local_matched = local0.exclusive_store(0x2000, 4, true);
        let global_matched = global.exclusive_store(0, 0x2000, 4);
        assert!(local_matched, "pe 0's own local tag was never touched by pe 1");
        assert!(!global_matched, "pe 1's store must have invalidated pe 0's global tag");
        assert!(!(local_matched && global_matched));
    }
}
