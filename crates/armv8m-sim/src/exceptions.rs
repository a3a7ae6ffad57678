// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `ExceptionEngine`: priority evaluation, stack frame
//! build/teardown, tail-chaining, late arrival, lockup.

use armv8m_regs::scb::Aircr;
use armv8m_regs::LocalRegisterCopy;

use crate::config::SimulatorConfig;
use crate::device::{AccessSize, AccessType};
use crate::error::{ExcInfo, Fault, InternalAbort};
use crate::excnum;
use crate::memory::MemoryPipeline;
use crate::nest::CpuNest;
use crate::state::{Control, ExcSides, Mode, PeState, Security};
use crate::systick_timer::SysTickTimer;

/// `0xFFFF_FFxx` EXC_RETURN encoding bits.
#[derive(Debug, Clone, Copy)]
pub struct ExcReturn {
    pub es_secure: bool,
    pub spsel_process: bool,
    pub mode_thread: bool,
    pub ftype_no_fp: bool,
    pub dcrs_no_callee_frame: bool,
    pub secure_stack: bool,
}

impl ExcReturn {
    pub fn encode(&self) -> u32 {
        // Bits [31:7] are RES1; every other bit reflects the corresponding
        // flag and must not be forced by the base value (bit 1 is RES0).
        let mut v: u32 = 0xFFFF_FF80;
        if self.es_secure {
            v |= 1 << 0;
        }
        if self.spsel_process {
            v |= 1 << 2;
        }
        if self.mode_thread {
            v |= 1 << 3;
        }
        if self.ftype_no_fp {
            v |= 1 << 4;
        }
        if self.dcrs_no_callee_frame {
            v |= 1 << 5;
        }
        if self.secure_stack {
            v |= 1 << 6;
        }
        v
    }

    pub fn decode(raw: u32) -> Option<ExcReturn> {
        if raw >> 24 != 0xFF {
            return None;
        }
        Some(ExcReturn {
            es_secure: raw & (1 << 0) != 0,
            spsel_process: raw & (1 << 2) != 0,
            mode_thread: raw & (1 << 3) != 0,
            ftype_no_fp: raw & (1 << 4) != 0,
            dcrs_no_callee_frame: raw & (1 << 5) != 0,
            secure_stack: raw & (1 << 6) != 0,
        })
    }
}

/// The callee-saved integrity signature pushed ahead of a Secure→Secure
/// frame.
pub const CALLEE_SIGNATURE_FP: u32 = 0xFEFA_125B;
pub const CALLEE_SIGNATURE_NO_FP: u32 = 0xFEFA_125A;

pub struct ExceptionEngine;

impl ExceptionEngine {
    /// `exception_priority`.
    pub fn exception_priority(
        nest: &CpuNest,
        cfg: &SimulatorConfig,
        exc_no: u16,
        secure: bool,
        apply_prigroup: bool,
    ) -> i32 {
        let raw = match exc_no {
            excnum::RESET => return excnum::RESET_PRIORITY,
            excnum::NMI => return excnum::NMI_PRIORITY,
            excnum::HARD_FAULT => {
                let bfhfnmins = nest.bfhfnmins();
                return if bfhfnmins && secure {
                    excnum::HARD_FAULT_PRIORITY_SECURE_BANKED
                } else {
                    excnum::HARD_FAULT_PRIORITY
                };
            }
            4..=15 => {
                let bank = if secure { &nest.shpr_s } else { &nest.shpr_ns };
                bank.0.get(exc_no as usize).copied().unwrap_or(0)
            }
            n => {
                let bank = if secure { &nest.ipr_s } else { &nest.ipr_ns };
                bank.0.get(n as usize).copied().unwrap_or(0)
            }
        };

        let masked = armv8m_regs::nvic::mask_priority(raw, cfg.priority_bits());
        let mut result = masked as i32;

        if apply_prigroup {
            let prigroup = nest.prigroup(true);
            let group_bits = prigroup + 1;
            if group_bits < 8 {
                let mask = !0u8 << group_bits;
                result = (masked & mask) as i32;
            }
        }

        if nest.pris() && !secure {
            result = (result >> 1) + 0x80;
        }

        result
    }

    /// Boosted execution priority from `PRIMASK`/`FAULTMASK`/`BASEPRI`.
    fn boosted_priority(state: &PeState, secure: bool) -> i32 {
        let primask = if secure { state.primask_s } else { state.primask_ns };
        let faultmask = if secure { state.faultmask_s } else { state.faultmask_ns };
        let basepri = if secure { state.basepri_s } else { state.basepri_ns };

        let mut boosted = 256;
        if primask {
            boosted = 0;
        }
        if basepri != 0 {
            boosted = boosted.min(basepri as i32);
        }
        if faultmask {
            boosted = boosted.min(-1);
        }
        boosted
    }

    /// `raw_execution_priority`: minimum priority over active exceptions.
    fn raw_execution_priority(state: &PeState, nest: &CpuNest, cfg: &SimulatorConfig) -> i32 {
        let mut min_prio = 256;
        for exc_no in 1..state.exc_active.len() as u16 {
            let banked = excnum::is_banked(exc_no, cfg.sys_tick == crate::config::SysTickKind::Dual);
            for &secure in &[true, false] {
                if state.exc_active[exc_no as usize].get(banked, secure) {
                    let p = Self::exception_priority(nest, cfg, exc_no, secure, true);
                    min_prio = min_prio.min(p);
                }
                if !banked {
                    break;
                }
            }
        }
        min_prio
    }

    pub fn execution_priority(state: &PeState, nest: &CpuNest, cfg: &SimulatorConfig) -> i32 {
        let raw = Self::raw_execution_priority(state, nest, cfg);
        let boosted = Self::boosted_priority(state, state.is_secure());
        raw.min(boosted)
    }

    /// `pending_exception_details`.
    pub fn pending_exception_details(
        state: &PeState,
        nest: &CpuNest,
        cfg: &SimulatorConfig,
        ignore_primask: bool,
    ) -> Option<(u16, bool)> {
        let mut best: Option<(u16, bool, i32)> = None;

        for exc_no in 2..state.exc_pending.len() as u16 {
            let banked = excnum::is_banked(exc_no, cfg.sys_tick == crate::config::SysTickKind::Dual);
            for &secure in &[true, false] {
                if state.exc_pending[exc_no as usize].get(banked, secure) {
                    let prio = Self::exception_priority(nest, cfg, exc_no, secure, true);
                    if best.map_or(true, |(_, _, p)| prio < p) {
                        best = Some((exc_no, secure, prio));
                    }
                }
                if !banked {
                    break;
                }
            }
        }

        let (exc_no, secure, min_priority) = best?;

        let raw = Self::raw_execution_priority(state, nest, cfg);
        let execution_priority = if ignore_primask {
            raw
        } else {
            Self::execution_priority(state, nest, cfg)
        };

        if execution_priority > min_priority {
            Some((exc_no, secure))
        } else {
            None
        }
    }

    pub fn exception_targets_secure(cfg: &SimulatorConfig, exc_no: u16, requester_secure: bool) -> bool {
        if !cfg.security_extension {
            return true;
        }
        if excnum::is_banked(exc_no, cfg.sys_tick == crate::config::SysTickKind::Dual) {
            requester_secure
        } else {
            // Unbanked exceptions target whichever side enables them; the
            // caller supplies the side it means to mutate directly.
            requester_secure
        }
    }

    fn frame_size(fp_active: bool, ts: bool) -> u32 {
        if !fp_active {
            0x20
        } else if ts {
            0xA8
        } else {
            0x68
        }
    }

    /// `exception_entry`: builds the stack frame, composes `EXC_RETURN`,
    /// and calls `activate_exception`.
    #[allow(clippy::too_many_arguments)]
    pub fn exception_entry(
        state: &mut PeState,
        nest: &mut CpuNest,
        cfg: &SimulatorConfig,
        pipeline: &mut MemoryPipeline,
        systick: Option<&SysTickTimer>,
        exc_no: u16,
        target_secure: bool,
    ) -> Result<(), ExcInfo> {
        let from_secure = state.is_secure();
        let fp_active = state.control().fpca && cfg.fp_ext;
        let fpccr_raw = if target_secure { nest.fpccr_s } else { nest.fpccr_ns };
        let ts = fp_active
            && target_secure
            && LocalRegisterCopy::<u32, armv8m_regs::fpu::Fpccr::Register>::new(fpccr_raw)
                .is_set(armv8m_regs::fpu::Fpccr::TS);

        let frame_size = Self::frame_size(fp_active, ts);
        let sp = state.sp();
        let framed_ptr = sp.wrapping_sub(frame_size) & !0b100;

        let limit = state.sp.limit_for(state.is_secure(), state.control().spsel);
        let stkof_ignored = nest.ccr(state.is_secure())
            & armv8m_regs::scb::Ccr::STKOFHFNMIGN::SET.value
            != 0
            && Self::execution_priority(state, nest, cfg) < 0;
        if framed_ptr < limit && !stkof_ignored {
            let mut info = ExcInfo::new(Fault::UsageFault, from_secure);
            info.term_inst = false;
            return Err(info);
        }

        let privileged = !state.control().npriv;
        let words = [
            state.r[0],
            state.r[1],
            state.r[2],
            state.r[3],
            state.r[12],
            state.lr,
            state.scratch.next_instr_addr,
            Self::retpsr(state),
        ];
        for (i, &w) in words.iter().enumerate() {
            pipeline
                .store(
                    state,
                    nest,
                    cfg,
                    systick,
                    framed_ptr + (i as u32) * 4,
                    AccessSize::Word,
                    AccessType::Stack,
                    privileged,
                    from_secure,
                    w,
                )
                .map_err(|mut e| {
                    e.term_inst = true;
                    e
                })?;
        }

        state.set_sp(framed_ptr);

        // EXC_RETURN.MODE/SPSEL record the context being preempted, not the
        // Handler-mode target every exception enters.
        let was_thread = state.mode() == Mode::Thread;
        // The callee-integrity frame only exists when the Security Extension
        // is implemented; with it absent there is a single security state
        // and no Secure->Secure transition to distinguish.
        let secure_to_secure = cfg.security_extension && from_secure && target_secure;
        let exc_return = ExcReturn {
            es_secure: target_secure,
            spsel_process: was_thread && state.control().spsel,
            mode_thread: was_thread,
            ftype_no_fp: !fp_active,
            dcrs_no_callee_frame: !secure_to_secure,
            // Which stack held the frame; always Secure when the extension
            // isn't implemented, since there is only one security state.
            secure_stack: from_secure,
        };
        state.lr = exc_return.encode();

        if secure_to_secure {
            let callee = [
                state.r[4], state.r[5], state.r[6], state.r[7],
                state.r[8], state.r[9], state.r[10], state.r[11],
                if fp_active { CALLEE_SIGNATURE_FP } else { CALLEE_SIGNATURE_NO_FP },
            ];
            let callee_ptr = framed_ptr - 9 * 4;
            for (i, &w) in callee.iter().enumerate() {
                pipeline
                    .store(state, nest, cfg, systick, callee_ptr + (i as u32) * 4, AccessSize::Word, AccessType::Stack, privileged, from_secure, w)
                    .map_err(|mut e| { e.term_inst = true; e })?;
            }
            state.set_sp(callee_ptr);
        }

        let vtor = nest.vtor(target_secure);
        let vector_addr = vtor.wrapping_add(4 * exc_no as u32);
        let start = pipeline
            .load(state, nest, cfg, systick, vector_addr, AccessSize::Word, AccessType::VecTable, true, target_secure)
            .map_err(|_| {
                nest.fault_mut(target_secure).hfsr |= armv8m_regs::scb::Hfsr::VECTTBL::SET.value;
                let mut info = ExcInfo::new(Fault::HardFault, target_secure);
                info.term_inst = true;
                info
            })?;

        Self::activate_exception(state, nest, cfg, exc_no, target_secure, start);
        Ok(())
    }

    fn retpsr(state: &PeState) -> u32 {
        let mut v = state.xpsr & !0x1FF;
        v |= state.ipsr() as u32;
        v
    }

    /// `activate_exception`.
    fn activate_exception(
        state: &mut PeState,
        nest: &mut CpuNest,
        cfg: &SimulatorConfig,
        exc_no: u16,
        secure: bool,
        start: u32,
    ) {
        state.set_ipsr(exc_no);
        state.xpsr &= !((0b11 << 25) | (0x3F << 10));
        {
            let ctrl = if secure { &mut state.control_s } else { &mut state.control_ns };
            ctrl.spsel = false;
            ctrl.fpca = false;
        }
        state.current_security = if secure { Security::Secure } else { Security::NonSecure };

        let banked = excnum::is_banked(exc_no, cfg.sys_tick == crate::config::SysTickKind::Dual);
        state.exc_active[exc_no as usize].set(banked, secure, true);
        state.exc_pending[exc_no as usize].set(banked, secure, false);

        state.pc = start & !1;
        if start & 1 == 0 {
            // T bit cleared: architecturally a fault on next fetch, left
            // to the decoder's invariant check rather than handled here.
        }
        let _ = nest;
        state.scratch.pc_changed = true;
    }

    /// `exception_return`.
    #[allow(clippy::too_many_arguments)]
    pub fn exception_return(
        state: &mut PeState,
        nest: &mut CpuNest,
        cfg: &SimulatorConfig,
        pipeline: &mut MemoryPipeline,
        systick: Option<&SysTickTimer>,
        raw_exc_return: u32,
    ) -> Result<(), InternalAbort> {
        let exc_return = match ExcReturn::decode(raw_exc_return) {
            Some(r) => r,
            None => {
                nest.fault_mut(state.is_secure()).cfsr |= 1 << 2; // UFSR.INVPC
                return Err(InternalAbort::EndOfInstruction);
            }
        };

        let returning_secure = state.is_secure();
        let returning_exc = state.ipsr();
        let banked = excnum::is_banked(returning_exc, cfg.sys_tick == crate::config::SysTickKind::Dual);
        state.exc_active[returning_exc as usize].set(banked, returning_secure, false);

        if let Some((next_exc, next_secure)) = Self::pending_exception_details(state, nest, cfg, false) {
            if Self::exception_priority(nest, cfg, next_exc, next_secure, true)
                < Self::exception_priority(nest, cfg, returning_exc, returning_secure, true)
            {
                let _ = Self::exception_entry(state, nest, cfg, pipeline, systick, next_exc, next_secure);
                return Ok(());
            }
        }

        let frame_size = if exc_return.ftype_no_fp { 0x20 } else { 0x68 };
        let secure_stack = exc_return.secure_stack;
        let from_sp = state.sp();
        let words_base = if !exc_return.dcrs_no_callee_frame { from_sp + 9 * 4 } else { from_sp };
        let privileged = !state.control().npriv;

        let mut loaded = [0u32; 8];
        for i in 0..8 {
            loaded[i] = pipeline
                .load(state, nest, cfg, systick, words_base + (i as u32) * 4, AccessSize::Word, AccessType::Stack, privileged, secure_stack)
                .map_err(|_| InternalAbort::EndOfInstruction)?;
        }

        state.r[0] = loaded[0];
        state.r[1] = loaded[1];
        state.r[2] = loaded[2];
        state.r[3] = loaded[3];
        state.r[12] = loaded[4];
        state.lr = loaded[5];
        state.pc = loaded[6] & !1;
        state.xpsr = (state.xpsr & 0x1FF) | (loaded[7] & !0x1FF);

        state.current_security = if exc_return.es_secure { Security::Secure } else { Security::NonSecure };
        {
            let ctrl: &mut Control = if exc_return.es_secure { &mut state.control_s } else { &mut state.control_ns };
            ctrl.spsel = exc_return.spsel_process;
        }

        let new_sp = words_base + frame_size;
        state.set_sp(new_sp);

        if Self::pending_exception_details(state, nest, cfg, false).is_none() && state.mode() == Mode::Thread {
            // SLEEPONEXIT: handled by caller inspecting SCR after return.
        }

        state.scratch.pc_changed = true;
        Ok(())
    }

    /// Which bank `HardFault` enters when it must be taken on behalf of
    /// `requester_secure`: always Secure unless the Security Extension is
    /// implemented and `AIRCR.BFHFNMINS` hands it to the Non-secure side.
    pub fn hardfault_target_secure(cfg: &SimulatorConfig, nest: &CpuNest, requester_secure: bool) -> bool {
        if !cfg.security_extension {
            return true;
        }
        if nest.bfhfnmins() {
            requester_secure
        } else {
            true
        }
    }

    /// Folds a late-arriving derived exception into the exception already
    /// being entered.
    pub fn merge_derived(
        cfg: &SimulatorConfig,
        nest: &CpuNest,
        oe: ExcInfo,
        de: ExcInfo,
    ) -> ExcInfo {
        let priority_of = |f: Fault| {
            Self::exception_priority(nest, cfg, f.exception_number(), de.is_secure, true)
        };
        ExcInfo::merge(oe, de, priority_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;

    #[test]
    fn exc_return_round_trips_through_encode_decode() {
        let er = ExcReturn {
            es_secure: true,
            spsel_process: false,
            mode_thread: true,
            ftype_no_fp: true,
            dcrs_no_callee_frame: true,
            secure_stack: true,
        };
        let decoded = ExcReturn::decode(er.encode()).unwrap();
        assert_eq!(decoded.es_secure, er.es_secure);
        assert_eq!(decoded.mode_thread, er.mode_thread);
    }

    #[test]
    fn reset_and_nmi_have_fixed_priorities() {
        let nest = CpuNest::new(16, 4, 4, 4, 0);
        let cfg = SimulatorConfig::default();
        assert_eq!(
            ExceptionEngine::exception_priority(&nest, &cfg, excnum::RESET, true, true),
            excnum::RESET_PRIORITY
        );
        assert_eq!(
            ExceptionEngine::exception_priority(&nest, &cfg, excnum::NMI, true, true),
            excnum::NMI_PRIORITY
        );
    }

    #[test]
    fn pending_exception_requires_higher_priority_than_execution() {
        let mut nest = CpuNest::new(16, 4, 4, 4, 0);
        nest.shpr_ns.0[excnum::SVCALL as usize] = 0x80;
        let cfg = SimulatorConfig::default();
        let mut state = PeState::new(16);
        state.current_security = Security::NonSecure;
        let banked = excnum::is_banked(excnum::SVCALL, false);
        state.exc_pending[excnum::SVCALL as usize].set(banked, false, true);
        let pending = ExceptionEngine::pending_exception_details(&state, &nest, &cfg, false);
        assert_eq!(pending, Some((excnum::SVCALL, false)));
    }
}
