// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `Pe`: the top-level processing element.

use log::{debug, trace, warn};

use crate::config::{ConfigError, SimulatorConfig, SysTickKind};
use crate::decode::{Decoder, Executor};
use crate::device::{AccessSize, AccessType, Device};
use crate::error::{DebugError, ExcInfo, Fault, InternalAbort};
use crate::excnum;
use crate::exceptions::ExceptionEngine;
use crate::memory::MemoryPipeline;
use crate::monitor::{GlobalMonitor, LocalMonitor};
use crate::nest::CpuNest;
use crate::state::{ExitCause, Mode, PeState, Security};
use crate::systick_timer::SysTickTimer;

/// Address PC is parked at when the processor enters lockup.
pub const LOCKUP_PC: u32 = 0xEFFF_FFFE;

/// The top-level processing element: owns architectural state, the
/// system-control register file, and the timer/monitor machinery, and
/// drives `step`/`cold_reset`.
pub struct Pe<D: Device> {
    pub cfg: SimulatorConfig,
    pub state: PeState,
    pub nest: CpuNest,
    pub device: D,
    pub local_monitor: LocalMonitor,
    pub global_monitor: GlobalMonitor,
    pub systick: Option<SysTickTimer>,
    pe_id: usize,
    lockup: bool,
}

impl<D: Device> Pe<D> {
    pub fn new(cfg: SimulatorConfig, device: D, pe_id: usize) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let max_exc = cfg.max_exc as usize;
        let systick = match cfg.sys_tick {
            SysTickKind::None => None,
            _ => Some(SysTickTimer::new(cfg.syst_int_freq, cfg.syst_ext_freq)),
        };
        Ok(Pe {
            state: PeState::new(max_exc),
            nest: CpuNest::new(
                max_exc,
                cfg.num_mpu_region_s,
                cfg.num_mpu_region_ns,
                cfg.num_sau_region,
                cfg.initial_vtor,
            ),
            device,
            local_monitor: LocalMonitor::default(),
            global_monitor: GlobalMonitor::new(),
            systick,
            pe_id,
            lockup: false,
            cfg,
        })
    }

    /// `cold_reset`.
    pub fn cold_reset(&mut self) {
        self.state = PeState::new(self.cfg.max_exc as usize);
        self.nest.vtor_s = self.cfg.initial_vtor;
        self.lockup = false;

        let vtor = self.nest.vtor_s;
        let mut pipeline = MemoryPipeline { device: &mut self.device, global_monitor: &self.global_monitor, pe_id: self.pe_id };
        let systick = self.systick.as_ref();
        let initial_sp = pipeline.load(&mut self.state, &mut self.nest, &self.cfg, systick, vtor, AccessSize::Word, AccessType::VecTable, true, true);
        let reset_handler = pipeline.load(&mut self.state, &mut self.nest, &self.cfg, systick, vtor + 4, AccessSize::Word, AccessType::VecTable, true, true);

        match (initial_sp, reset_handler) {
            (Ok(sp), Ok(pc)) => {
                self.state.sp.msp_s = sp & !0b111;
                self.state.pc = pc & !1;
                self.state.xpsr = 1 << 24; // T bit set, IPSR = 0.
                debug!("cold_reset: SP={:#010x} PC={:#010x}", sp, self.state.pc);
            }
            _ => {
                warn!("cold_reset: vector fetch failed, entering lockup");
                self.enter_lockup();
            }
        }
    }

    fn enter_lockup(&mut self) {
        self.lockup = true;
        self.state.pc = LOCKUP_PC;
        self.nest.dhcsr |= 1 << 19; // DHCSR.S_LOCKUP
    }

    pub fn trigger_nmi(&mut self) {
        self.state.exc_pending[excnum::NMI as usize].set(false, true, true);
    }

    /// Pends an external interrupt, numbered from [`excnum::EXT_INT0`].
    pub fn trigger_ext_int(&mut self, irq: u16) {
        let exc_no = excnum::EXT_INT0 + irq;
        if (exc_no as usize) < self.state.exc_pending.len() {
            let targets_secure = ExceptionEngine::exception_targets_secure(&self.cfg, exc_no, true);
            self.state.exc_pending[exc_no as usize].set(
                excnum::is_banked(exc_no, self.cfg.sys_tick == SysTickKind::Dual),
                targets_secure,
                true,
            );
        }
    }

    pub fn is_exception_pending(&self, ignore_primask: bool) -> bool {
        ExceptionEngine::pending_exception_details(&self.state, &self.nest, &self.cfg, ignore_primask).is_some()
    }

    fn poll_systick(&mut self) {
        if let Some(timer) = &self.systick {
            if timer.poll_interrupt_edge() {
                let dual = self.cfg.sys_tick == SysTickKind::Dual;
                let secure = !dual || self.state.is_secure();
                self.state.exc_pending[excnum::SYS_TICK as usize].set(
                    excnum::is_banked(excnum::SYS_TICK, dual),
                    secure,
                    true,
                );
            }
        }
    }

    /// `TopLevel`: the per-cycle algorithm.
    pub fn step(&mut self) {
        self.state.exit_cause = ExitCause::empty();

        if self.lockup {
            self.state.scratch.this_instr_length = 0;
            return;
        }

        self.poll_systick();

        self.state.scratch.pc_changed = false;
        self.state.scratch.it_state_changed = false;
        self.state.scratch.cur_cond_override = -1;

        // An NS requester fetching from an address the SAU/IDAU classify as
        // Non-secure-callable must land on the SG instruction exactly; any
        // other entry point is illegal and is checked by the decoder below.
        let crossing_to_ns = self.cfg.security_extension
            && !self.state.is_secure()
            && crate::memory::security_check(&self.nest, &self.device, self.state.pc, true).nsc;
        let mut pipeline = MemoryPipeline { device: &mut self.device, global_monitor: &self.global_monitor, pe_id: self.pe_id };
        let systick = self.systick.as_ref();
        let fetch_result = Decoder::fetch_and_dispatch(&mut self.state, &mut self.nest, &self.cfg, &mut pipeline, systick, crossing_to_ns);

        match fetch_result {
            Ok(_) => {
                let exec_result = Executor::execute(&mut self.state, &mut self.nest, &self.cfg, &mut pipeline, systick, &mut self.local_monitor);
                if let Err(abort) = exec_result {
                    self.handle_internal_abort(abort);
                }
            }
            Err(InternalAbort::EndOfInstruction) => {
                trace!("fetch raised a fault; absorbed by EndOfInstruction");
            }
            Err(_) => {}
        }

        self.instruction_advance();
    }

    fn handle_internal_abort(&mut self, abort: InternalAbort) {
        match abort {
            InternalAbort::EndOfInstruction => {}
            InternalAbort::Undefined | InternalAbort::See => {
                let secure = self.state.is_secure();
                let banked = excnum::is_banked(excnum::USAGE_FAULT, false);
                self.state.exc_pending[excnum::USAGE_FAULT as usize].set(banked, secure, true);
            }
            InternalAbort::Unpredictable => {
                let secure = self.state.is_secure();
                let banked = excnum::is_banked(excnum::USAGE_FAULT, false);
                self.state.exc_pending[excnum::USAGE_FAULT as usize].set(banked, secure, true);
            }
        }
    }

    /// Consumes any deferred return, selects a pending exception,
    /// tail-chains or enters, and commits PC/ITSTATE.
    fn instruction_advance(&mut self) {
        if self.state.scratch.it_state_changed {
            let it = self.state.scratch.next_it_state;
            self.state.xpsr = armv8m_regs::it_state_into_xpsr(self.state.xpsr, it);
        }

        if let Some((exc_no, secure)) = ExceptionEngine::pending_exception_details(&self.state, &self.nest, &self.cfg, false) {
            let current_priority = ExceptionEngine::execution_priority(&self.state, &self.nest, &self.cfg);
            let candidate_priority = ExceptionEngine::exception_priority(&self.nest, &self.cfg, exc_no, secure, true);
            if candidate_priority < current_priority {
                self.enter_exception_or_escalate(exc_no, secure);
                self.local_monitor.clear();
            }
        }

        if self.nest.scr_ns & (1 << 1) != 0
            && !self.is_exception_pending(false)
            && self.state.mode() == Mode::Thread
        {
            self.state.exit_cause |= ExitCause::SLEEP_ON_EXIT;
        }
    }

    /// Enters `exc_no`, escalating to `HardFault` (setting `HFSR.FORCED`
    /// and, via [`ExceptionEngine::merge_derived`], pending whichever of the
    /// two faults loses the priority race) if entry itself raises a fault,
    /// and locking up if `HardFault` entry fails in turn.
    fn enter_exception_or_escalate(&mut self, exc_no: u16, secure: bool) {
        let mut pipeline = MemoryPipeline { device: &mut self.device, global_monitor: &self.global_monitor, pe_id: self.pe_id };
        let systick = self.systick.as_ref();
        let first = ExceptionEngine::exception_entry(&mut self.state, &mut self.nest, &self.cfg, &mut pipeline, systick, exc_no, secure);

        let derived = match first {
            Ok(()) => return,
            Err(de) if de.fault == Fault::HardFault && exc_no == excnum::HARD_FAULT => {
                warn!("HardFault entry itself faulted; entering lockup");
                self.enter_lockup();
                return;
            }
            Err(de) => de,
        };

        let hf_secure = ExceptionEngine::hardfault_target_secure(&self.cfg, &self.nest, secure);
        let oe = ExcInfo::new(Fault::HardFault, hf_secure);
        let merged = ExceptionEngine::merge_derived(&self.cfg, &self.nest, oe, derived);
        if let Some(orig) = merged.orig_fault {
            if self.cfg.pend_overridden_derived_exceptions {
                let banked = excnum::is_banked(orig.exception_number(), self.cfg.sys_tick == SysTickKind::Dual);
                self.state.exc_pending[orig.exception_number() as usize].set(banked, merged.is_secure, true);
            }
        }
        if derived.fault != Fault::HardFault {
            self.nest.fault_mut(hf_secure).hfsr |= armv8m_regs::scb::Hfsr::FORCED::SET.value;
        }

        debug!("escalating exception {} to HardFault (derived fault {:?})", exc_no, derived.fault);
        let mut pipeline = MemoryPipeline { device: &mut self.device, global_monitor: &self.global_monitor, pe_id: self.pe_id };
        let systick = self.systick.as_ref();
        if ExceptionEngine::exception_entry(&mut self.state, &mut self.nest, &self.cfg, &mut pipeline, systick, excnum::HARD_FAULT, hf_secure).is_err() {
            warn!("HardFault entry failed after escalation; entering lockup");
            self.enter_lockup();
        }
    }

    /// Raises `fault` as a pended exception. Faults are plain values
    /// merged by the caller, never thrown.
    pub fn pend_fault(&mut self, info: ExcInfo) {
        let banked = excnum::is_banked(info.fault.exception_number(), self.cfg.sys_tick == SysTickKind::Dual);
        self.state.exc_pending[info.fault.exception_number() as usize].set(banked, info.is_secure, true);
        if let Some(orig) = info.orig_fault {
            if self.cfg.pend_overridden_derived_exceptions {
                let orig_banked = excnum::is_banked(orig.exception_number(), self.cfg.sys_tick == SysTickKind::Dual);
                self.state.exc_pending[orig.exception_number() as usize].set(orig_banked, info.is_secure, true);
            }
        }
    }

    pub fn is_in_lockup(&self) -> bool {
        self.lockup
    }

    /// `debug_load`: the debug probe's read entry point. `hprot[6]`
    /// selects Non-secure; the probe always addresses the side directly
    /// (`NAT_External`), bypassing the software access-classification
    /// table that gates `Pe::step`'s own register accesses.
    pub fn debug_load(&mut self, addr: u32, size: AccessSize, hprot: u32) -> Result<u32, DebugError> {
        if addr % size.bytes() != 0 {
            return Err(DebugError::Misaligned);
        }
        let secure = hprot & (1 << 6) == 0;
        if (crate::memory::SCS_BASE..crate::memory::SCS_END).contains(&addr) {
            if size != AccessSize::Word {
                return Err(DebugError::Fault);
            }
            return crate::scs::debug_read(&self.state, &mut self.nest, &self.cfg, self.systick.as_ref(), addr, secure)
                .ok_or(DebugError::Fault);
        }
        self.device
            .load(addr, size, crate::device::AddressDescriptor { access_type: AccessType::Normal, flags: crate::device::AccessFlags::PRIVILEGED })
            .map_err(|_| DebugError::Fault)
    }

    /// `debug_store`: the debug probe's write entry point.
    pub fn debug_store(&mut self, addr: u32, size: AccessSize, hprot: u32, val: u32) -> Result<(), DebugError> {
        if addr % size.bytes() != 0 {
            return Err(DebugError::Misaligned);
        }
        let secure = hprot & (1 << 6) == 0;
        if (crate::memory::SCS_BASE..crate::memory::SCS_END).contains(&addr) {
            if size != AccessSize::Word {
                return Err(DebugError::Fault);
            }
            return crate::scs::debug_write(&mut self.state, &mut self.nest, &self.cfg, self.systick.as_ref(), addr, secure, val)
                .ok_or(DebugError::Fault);
        }
        self.device
            .store(addr, size, crate::device::AddressDescriptor { access_type: AccessType::Normal, flags: crate::device::AccessFlags::PRIVILEGED }, val)
            .map_err(|_| DebugError::Fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DebugPins, IdauResult};

    struct FlatMemory {
        bytes: Vec<u8>,
    }

    impl FlatMemory {
        fn new(size: usize) -> Self {
            FlatMemory { bytes: vec![0; size] }
        }

        fn write_word(&mut self, addr: u32, val: u32) {
            self.bytes[addr as usize..addr as usize + 4].copy_from_slice(&val.to_le_bytes());
        }
    }

    impl Device for FlatMemory {
        fn load(&mut self, phys_addr: u32, size: AccessSize, _desc: crate::device::AddressDescriptor) -> Result<u32, crate::device::BusError> {
            let base = phys_addr as usize;
            let mut val = 0u32;
            for i in 0..size.bytes() as usize {
                val |= (*self.bytes.get(base + i).unwrap_or(&0) as u32) << (8 * i);
            }
            Ok(val)
        }

        fn store(&mut self, phys_addr: u32, size: AccessSize, _desc: crate::device::AddressDescriptor, val: u32) -> Result<(), crate::device::BusError> {
            let base = phys_addr as usize;
            for i in 0..size.bytes() as usize {
                self.bytes[base + i] = ((val >> (8 * i)) & 0xFF) as u8;
            }
            Ok(())
        }

        fn idau_check(&self, _addr: u32, _is_ifetch: bool) -> IdauResult {
            IdauResult { exempt: false, ns: true, nsc: false, iregion: 0, irvalid: false }
        }

        fn debug_pins(&self) -> DebugPins {
            DebugPins::all()
        }
    }

    fn make_pe() -> Pe<FlatMemory> {
        let mut mem = FlatMemory::new(0x1_0000);
        mem.write_word(0x0000_0000, 0x2000_0100);
        mem.write_word(0x0000_0004, 0x0000_0009);
        mem.write_word(0x0000_0008, 0x4770_BF00);
        let cfg = SimulatorConfig { security_extension: false, ..Default::default() };
        Pe::new(cfg, mem, 0).unwrap()
    }

    #[test]
    fn vanilla_reset_sets_sp_pc_and_t_bit() {
        let mut pe = make_pe();
        pe.cold_reset();
        assert_eq!(pe.state.sp.msp_s, 0x2000_0100);
        assert_eq!(pe.state.pc, 0x0000_0008);
        assert_eq!(pe.state.xpsr & (1 << 24), 1 << 24);
        assert_eq!(pe.state.ipsr(), 0);
        assert!(pe.state.exit_cause.is_empty());
    }

    #[test]
    fn nop_then_bx_lr_runs_without_lockup() {
        let mut pe = make_pe();
        pe.cold_reset();
        pe.step();
        assert!(!pe.is_in_lockup());
        assert_eq!(pe.state.pc, 0x0000_000A);
    }

    #[test]
    fn debug_load_reads_vector_table_word() {
        let mut pe = make_pe();
        let word = pe.debug_load(0x0000_0000, AccessSize::Word, 0).unwrap();
        assert_eq!(word, 0x2000_0100);
    }

    #[test]
    fn debug_load_rejects_misaligned_transfer() {
        let mut pe = make_pe();
        let err = pe.debug_load(0x0000_0001, AccessSize::Word, 0).unwrap_err();
        assert_eq!(err, crate::error::DebugError::Misaligned);
    }

    #[test]
    fn debug_store_then_load_round_trips_through_the_scs() {
        let mut pe = make_pe();
        pe.debug_store(0xE000_ED08, AccessSize::Word, 0, 0x1000_0000).unwrap();
        let vtor = pe.debug_load(0xE000_ED08, AccessSize::Word, 0).unwrap();
        assert_eq!(vtor, 0x1000_0000);
    }
}
