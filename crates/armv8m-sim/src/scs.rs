// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! System Control Space register file.
//!
//! The SCS occupies `[0xE000_0000, 0xE010_0000)` and is mirrored at
//! `0xE002_xxxx` for the Non-secure alias. This module resolves one
//! address plus requester context into a concrete register read or
//! write, applying the access-classification table before touching any
//! banked state. Word-only; the caller (`crate::memory`) has already
//! rejected non-word sizes.

use armv8m_regs::{dcb, dwt, mpu, nvic, scb, systick, LocalRegisterCopy};

use crate::config::SimulatorConfig;
use crate::excnum;
use crate::nest::CpuNest;
use crate::state::PeState;
use crate::systick_timer::{ClockSource, SysTickTimer};

/// Base of the Non-secure alias window.
const NS_ALIAS_BASE: u32 = 0xE002_0000;
const NS_ALIAS_END: u32 = 0xE003_0000;
/// Offset between a Secure SCS address and its Non-secure alias.
const NS_ALIAS_OFFSET: u32 = 0x0002_0000;

/// What a given `(addr, requester)` tuple resolves to, per the access
/// classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Serve the register from the named bank.
    View { secure: bool },
    /// Reads as zero, writes ignored.
    RazWi,
    /// Any access other than `STIR` faults.
    BusFault,
}

/// Classifies the `NAT_SW` access path (`internal` is handled separately
/// by callers that already know which side they mean --
/// `ExceptionEngine`/`Pe` read/write `CpuNest` fields directly).
pub fn classify(requester_secure: bool, privileged: bool, alt_alias: bool, security_ext: bool) -> Behavior {
    match (requester_secure, privileged, alt_alias) {
        (true, true, false) => Behavior::View { secure: true },
        (true, true, true) => {
            if security_ext {
                Behavior::View { secure: false }
            } else {
                Behavior::RazWi
            }
        }
        (true, false, _) => Behavior::BusFault,
        (false, true, false) => {
            if security_ext {
                Behavior::View { secure: false }
            } else {
                Behavior::View { secure: true }
            }
        }
        (false, true, true) => Behavior::RazWi,
        (false, false, _) => Behavior::BusFault,
    }
}

/// Splits `addr` into its canonical (Secure-addressed) offset plus
/// whether it was reached through the Non-secure alias window.
fn canonicalize(addr: u32, security_ext: bool) -> (u32, bool) {
    if security_ext && (NS_ALIAS_BASE..NS_ALIAS_END).contains(&addr) {
        (addr - NS_ALIAS_OFFSET, true)
    } else {
        (addr, false)
    }
}

/// Address of the Software Trigger Interrupt Register: the one register
/// accessible unprivileged regardless of `classify`'s BusFault verdict.
const STIR_ADDR: u32 = 0xE000_EF00;

fn byte_bank_word(bank: &[u8], exc_base: u16) -> u32 {
    let mut v = 0u32;
    for i in 0..4u32 {
        let exc_no = exc_base as usize + i as usize;
        v |= (*bank.get(exc_no).unwrap_or(&0) as u32) << (8 * i);
    }
    v
}

fn byte_bank_write(bank: &mut [u8], exc_base: u16, value: u32, priority_bits: u32) {
    for i in 0..4u32 {
        let exc_no = exc_base as usize + i as usize;
        if let Some(slot) = bank.get_mut(exc_no) {
            let raw = ((value >> (8 * i)) & 0xFF) as u8;
            *slot = nvic::mask_priority(raw, priority_bits);
        }
    }
}

/// Reads a word from the SCS for the `NAT_SW` access path. Returns `None`
/// for addresses this register file does not implement (BusFault at the
/// memory-pipeline layer).
#[allow(clippy::too_many_arguments)]
pub fn read(
    state: &PeState,
    nest: &mut CpuNest,
    cfg: &SimulatorConfig,
    systick: Option<&SysTickTimer>,
    addr: u32,
    requester_secure: bool,
    privileged: bool,
) -> Option<u32> {
    if addr == STIR_ADDR {
        return Some(0);
    }

    let (canon, alt) = canonicalize(addr, cfg.security_extension);
    let behavior = classify(requester_secure, privileged, alt, cfg.security_extension);
    let secure = match behavior {
        Behavior::View { secure } => secure,
        Behavior::RazWi => return Some(0),
        Behavior::BusFault => return None,
    };

    read_banked(state, nest, cfg, systick, canon, secure)
}

/// Writes a word to the SCS for the `NAT_SW` access path. A `None`
/// return means the address is unimplemented (BusFault).
#[allow(clippy::too_many_arguments)]
pub fn write(
    state: &mut PeState,
    nest: &mut CpuNest,
    cfg: &SimulatorConfig,
    systick: Option<&SysTickTimer>,
    addr: u32,
    requester_secure: bool,
    privileged: bool,
    value: u32,
) -> Option<()> {
    if addr == STIR_ADDR {
        set_pending_external(state, cfg, (value & 0x1FF) as u16, requester_secure);
        return Some(());
    }

    let (canon, alt) = canonicalize(addr, cfg.security_extension);
    let behavior = classify(requester_secure, privileged, alt, cfg.security_extension);
    let secure = match behavior {
        Behavior::View { secure } => secure,
        Behavior::RazWi => return Some(()),
        Behavior::BusFault => return None,
    };

    write_banked(state, nest, cfg, systick, canon, secure, value)
}

/// Reads a word via the `NAT_External` access path: a debug probe
/// addresses a side directly (per `hprot[6]`) rather than going through
/// the software access-classification table.
#[allow(clippy::too_many_arguments)]
pub fn debug_read(
    state: &PeState,
    nest: &mut CpuNest,
    cfg: &SimulatorConfig,
    systick: Option<&SysTickTimer>,
    addr: u32,
    secure: bool,
) -> Option<u32> {
    if addr == STIR_ADDR {
        return Some(0);
    }
    let (canon, _alt) = canonicalize(addr, cfg.security_extension);
    read_banked(state, nest, cfg, systick, canon, secure)
}

/// Writes a word via the `NAT_External` access path.
#[allow(clippy::too_many_arguments)]
pub fn debug_write(
    state: &mut PeState,
    nest: &mut CpuNest,
    cfg: &SimulatorConfig,
    systick: Option<&SysTickTimer>,
    addr: u32,
    secure: bool,
    value: u32,
) -> Option<()> {
    if addr == STIR_ADDR {
        set_pending_external(state, cfg, (value & 0x1FF) as u16, secure);
        return Some(());
    }
    let (canon, _alt) = canonicalize(addr, cfg.security_extension);
    write_banked(state, nest, cfg, systick, canon, secure, value)
}

fn dual_systick(cfg: &SimulatorConfig) -> bool {
    cfg.sys_tick == crate::config::SysTickKind::Dual
}

/// Sets the pending bit for an external interrupt, either via `STIR` or
/// via NVIC `ISPR`; both route through the same unbanked side logic.
fn set_pending_external(state: &mut PeState, cfg: &SimulatorConfig, irq: u16, requester_secure: bool) {
    let exc_no = excnum::EXT_INT0 + irq;
    if (exc_no as usize) >= state.exc_pending.len() {
        return;
    }
    let _ = cfg;
    state.exc_pending[exc_no as usize].set(false, requester_secure, true);
}

fn read_banked(
    state: &PeState,
    nest: &mut CpuNest,
    cfg: &SimulatorConfig,
    systick: Option<&SysTickTimer>,
    addr: u32,
    secure: bool,
) -> Option<u32> {
    match addr {
        scb::CPUID_BASE => Some(0x410F_C240),
        0xE000_ED04 => Some(icsr_value(state, nest, cfg, secure)),
        0xE000_ED08 => Some(nest.vtor(secure)),
        0xE000_ED0C => Some(nest.aircr(secure)),
        0xE000_ED10 => Some(nest.scr(secure)),
        0xE000_ED14 => Some(nest.ccr(secure)),
        0xE000_ED18 => Some(byte_bank_word(if secure { &nest.shpr_s.0 } else { &nest.shpr_ns.0 }, 4)),
        0xE000_ED1C => Some(byte_bank_word(if secure { &nest.shpr_s.0 } else { &nest.shpr_ns.0 }, 8)),
        0xE000_ED20 => Some(byte_bank_word(if secure { &nest.shpr_s.0 } else { &nest.shpr_ns.0 }, 12)),
        0xE000_ED24 => Some(if secure { nest.shcsr_s } else { nest.shcsr_ns }),
        0xE000_ED28 => Some(nest.fault(secure).cfsr),
        0xE000_ED2C => Some(nest.fault(secure).hfsr),
        0xE000_ED30 => Some(nest.fault(secure).dfsr),
        0xE000_ED34 => Some(nest.fault(secure).mmfar),
        0xE000_ED38 => Some(nest.fault(secure).bfar),
        0xE000_ED88 => Some(if secure { nest.cpacr_s } else { nest.cpacr_ns }),
        0xE000_ED8C => Some(if secure { nest.nsacr } else { 0 }),
        0xE000_ED90 => Some(mpu_type(nest, secure)),
        0xE000_ED94 => Some(nest.mpu(secure).ctrl),
        0xE000_ED98 => Some(nest.mpu(secure).rnr),
        0xE000_ED9C => Some(mpu_region(nest, secure, |r| r.rbar)),
        0xE000_EDA0 => Some(mpu_region(nest, secure, |r| r.rlar)),
        0xE000_EDC0 => Some(nest.mpu(secure).mair0),
        0xE000_EDC4 => Some(nest.mpu(secure).mair1),
        0xE000_EDD0 if secure => Some(nest.sau_ctrl),
        0xE000_EDD4 if secure => Some(nest.sau_regions.len() as u32),
        0xE000_EDD8 if secure => Some(nest.sau_rnr),
        0xE000_EDDC if secure => Some(sau_region(nest, |r| r.rbar)),
        0xE000_EDE0 if secure => Some(sau_region(nest, |r| r.rlar)),
        0xE000_EDE4 if secure => Some(nest.sfsr),
        0xE000_EDE8 if secure => Some(nest.sfar),
        0xE000_EDD0..=0xE000_EDE8 if !secure => Some(0),
        0xE000_EDF0 => Some(nest.dhcsr),
        0xE000_EDF4 => Some(0),
        0xE000_EDF8 => Some(0),
        0xE000_EDFC => Some(nest.demcr),
        0xE000_EF34 => Some(if secure { nest.fpccr_s } else { nest.fpccr_ns }),
        0xE000_EF38 => Some(if secure { nest.fpcar_s } else { nest.fpcar_ns }),
        0xE000_EF3C => Some(if secure { nest.fpdscr_s } else { nest.fpdscr_ns }),
        0xE000_E010 => systick_read(systick, cfg, SystickField::Csr),
        0xE000_E014 => systick_read(systick, cfg, SystickField::Rvr),
        0xE000_E018 => systick_read(systick, cfg, SystickField::Cvr),
        0xE000_E01C => systick_read(systick, cfg, SystickField::Calib),
        0xE000_E100..=0xE000_E13F => nvic_enable_read(state, cfg, word_index(addr, 0xE000_E100)),
        0xE000_E180..=0xE000_E1BF => nvic_enable_read(state, cfg, word_index(addr, 0xE000_E180)),
        0xE000_E200..=0xE000_E23F => nvic_pending_read(state, cfg, word_index(addr, 0xE000_E200)),
        0xE000_E280..=0xE000_E2BF => nvic_pending_read(state, cfg, word_index(addr, 0xE000_E280)),
        0xE000_E300..=0xE000_E33F => nvic_active_read(state, cfg, word_index(addr, 0xE000_E300)),
        0xE000_E400..=0xE000_E5EF => Some(byte_bank_word(
            if secure { &nest.ipr_s.0 } else { &nest.ipr_ns.0 },
            excnum::EXT_INT0 + 4 * word_index(addr, 0xE000_E400),
        )),
        0xE000_1000 => Some(nest.dwt_ctrl),
        0xE000_1004 => Some(nest.dwt_cyccnt),
        addr if dwt_comp_slot(addr).is_some() => dwt_comp_read(nest, addr),
        0xE000_EFB0 if secure => Some(nest.dauthctrl),
        _ => None,
    }
}

#[allow(clippy::too_many_arguments)]
fn write_banked(
    state: &mut PeState,
    nest: &mut CpuNest,
    cfg: &SimulatorConfig,
    systick: Option<&SysTickTimer>,
    addr: u32,
    secure: bool,
    value: u32,
) -> Option<()> {
    match addr {
        scb::CPUID_BASE => Some(()),
        0xE000_ED04 => {
            icsr_write(state, nest, cfg, secure, value);
            Some(())
        }
        0xE000_ED08 => {
            if secure {
                nest.vtor_s = value & !0x7F;
            } else {
                nest.vtor_ns = value & !0x7F;
            }
            Some(())
        }
        0xE000_ED0C => {
            nest.write_aircr(secure, value);
            Some(())
        }
        0xE000_ED10 => {
            if secure {
                nest.scr_s = value;
            } else {
                nest.scr_ns = value;
            }
            Some(())
        }
        0xE000_ED14 => {
            if secure {
                nest.ccr_s = value;
            } else {
                nest.ccr_ns = value;
            }
            Some(())
        }
        0xE000_ED18 => {
            byte_bank_write(if secure { &mut nest.shpr_s.0 } else { &mut nest.shpr_ns.0 }, 4, value, cfg.priority_bits());
            Some(())
        }
        0xE000_ED1C => {
            byte_bank_write(if secure { &mut nest.shpr_s.0 } else { &mut nest.shpr_ns.0 }, 8, value, cfg.priority_bits());
            Some(())
        }
        0xE000_ED20 => {
            byte_bank_write(if secure { &mut nest.shpr_s.0 } else { &mut nest.shpr_ns.0 }, 12, value, cfg.priority_bits());
            Some(())
        }
        0xE000_ED24 => {
            write_shcsr(state, nest, cfg, secure, value);
            Some(())
        }
        0xE000_ED28 => {
            nest.fault_mut(secure).cfsr &= !value; // w1c
            Some(())
        }
        0xE000_ED2C => {
            nest.fault_mut(secure).hfsr &= !value; // w1c
            Some(())
        }
        0xE000_ED30 => {
            nest.fault_mut(secure).dfsr &= !value;
            Some(())
        }
        0xE000_ED34 => {
            nest.fault_mut(secure).mmfar = value;
            Some(())
        }
        0xE000_ED38 => {
            nest.fault_mut(secure).bfar = value;
            Some(())
        }
        0xE000_ED88 => {
            if secure {
                nest.cpacr_s = value;
            } else {
                nest.cpacr_ns = value;
            }
            Some(())
        }
        0xE000_ED8C => {
            if secure {
                nest.nsacr = value;
            }
            Some(())
        }
        0xE000_ED94 => {
            nest.mpu_mut(secure).ctrl = value;
            Some(())
        }
        0xE000_ED98 => {
            nest.mpu_mut(secure).rnr = value;
            Some(())
        }
        0xE000_ED9C => {
            mpu_region_write(nest, secure, value, true);
            Some(())
        }
        0xE000_EDA0 => {
            mpu_region_write(nest, secure, value, false);
            Some(())
        }
        0xE000_EDC0 => {
            nest.mpu_mut(secure).mair0 = value;
            Some(())
        }
        0xE000_EDC4 => {
            nest.mpu_mut(secure).mair1 = value;
            Some(())
        }
        0xE000_EDD0 if secure => {
            nest.sau_ctrl = value;
            Some(())
        }
        0xE000_EDD8 if secure => {
            nest.sau_rnr = value;
            Some(())
        }
        0xE000_EDDC if secure => {
            sau_region_write(nest, value, true);
            Some(())
        }
        0xE000_EDE0 if secure => {
            sau_region_write(nest, value, false);
            Some(())
        }
        0xE000_EDE4 if secure => {
            nest.sfsr &= !value;
            Some(())
        }
        0xE000_EDE8 if secure => {
            nest.sfar = value;
            Some(())
        }
        0xE000_EDD0..=0xE000_EDE8 if !secure => Some(()),
        0xE000_EDF0 => {
            if LocalRegisterCopy::<u32, dcb::Dhcsr::Register>::new(value).read(dcb::Dhcsr::DBGKEY)
                == dcb::DHCSR_DBGKEY
            {
                nest.dhcsr = value & 0x0003_000F;
            }
            Some(())
        }
        0xE000_EDF4 | 0xE000_EDF8 => Some(()),
        0xE000_EDFC => {
            nest.demcr = value;
            Some(())
        }
        0xE000_EF34 => {
            if secure {
                nest.fpccr_s = value;
            } else {
                nest.fpccr_ns = value;
            }
            Some(())
        }
        0xE000_EF38 => {
            if secure {
                nest.fpcar_s = value;
            } else {
                nest.fpcar_ns = value;
            }
            Some(())
        }
        0xE000_EF3C => {
            if secure {
                nest.fpdscr_s = value;
            } else {
                nest.fpdscr_ns = value;
            }
            Some(())
        }
        0xE000_E010 => {
            systick_write(systick, SystickField::Csr, value);
            Some(())
        }
        0xE000_E014 => {
            systick_write(systick, SystickField::Rvr, value);
            Some(())
        }
        0xE000_E018 => {
            systick_write(systick, SystickField::Cvr, value);
            Some(())
        }
        0xE000_E01C => Some(()),
        0xE000_E100..=0xE000_E13F => {
            nvic_enable_write(state, cfg, word_index(addr, 0xE000_E100), value, secure, true);
            Some(())
        }
        0xE000_E180..=0xE000_E1BF => {
            nvic_enable_write(state, cfg, word_index(addr, 0xE000_E180), value, secure, false);
            Some(())
        }
        0xE000_E200..=0xE000_E23F => {
            nvic_pending_write(state, cfg, word_index(addr, 0xE000_E200), value, secure, true);
            Some(())
        }
        0xE000_E280..=0xE000_E2BF => {
            nvic_pending_write(state, cfg, word_index(addr, 0xE000_E280), value, secure, false);
            Some(())
        }
        0xE000_E300..=0xE000_E33F => Some(()), // IABR: read-only
        0xE000_E400..=0xE000_E5EF => {
            byte_bank_write(
                if secure { &mut nest.ipr_s.0 } else { &mut nest.ipr_ns.0 },
                excnum::EXT_INT0 + 4 * word_index(addr, 0xE000_E400),
                value,
                cfg.priority_bits(),
            );
            Some(())
        }
        0xE000_1000 => {
            nest.dwt_ctrl = value;
            Some(())
        }
        0xE000_1004 => {
            nest.dwt_cyccnt = value;
            Some(())
        }
        addr if dwt_comp_slot(addr).is_some() => {
            dwt_comp_write(nest, addr, value);
            Some(())
        }
        0xE000_EFB0 if secure => {
            nest.dauthctrl = value;
            Some(())
        }
        _ => None,
    }
}

fn word_index(addr: u32, base: u32) -> u32 {
    (addr - base) / 4
}

fn mpu_type(nest: &CpuNest, secure: bool) -> u32 {
    let n = nest.mpu(secure).regions.len() as u32;
    LocalRegisterCopy::<u32, mpu::MpuType::Register>::new(0).get() | (n << 8)
}

fn mpu_region(nest: &CpuNest, secure: bool, get: impl Fn(&crate::nest::MpuRegion) -> u32) -> u32 {
    let bank = nest.mpu(secure);
    let idx = (bank.rnr as usize) % bank.regions.len().max(1);
    bank.regions.get(idx).map(|r| get(r)).unwrap_or(0)
}

fn mpu_region_write(nest: &mut CpuNest, secure: bool, value: u32, is_rbar: bool) {
    let bank = nest.mpu_mut(secure);
    if bank.regions.is_empty() {
        return;
    }
    let idx = (bank.rnr as usize) % bank.regions.len();
    if let Some(region) = bank.regions.get_mut(idx) {
        if is_rbar {
            region.rbar = value;
        } else {
            region.rlar = value;
        }
    }
}

fn sau_region(nest: &CpuNest, get: impl Fn(&crate::nest::SauRegion) -> u32) -> u32 {
    let idx = (nest.sau_rnr as usize) % nest.sau_regions.len().max(1);
    nest.sau_regions.get(idx).map(|r| get(r)).unwrap_or(0)
}

fn sau_region_write(nest: &mut CpuNest, value: u32, is_rbar: bool) {
    if nest.sau_regions.is_empty() {
        return;
    }
    let idx = (nest.sau_rnr as usize) % nest.sau_regions.len();
    if let Some(region) = nest.sau_regions.get_mut(idx) {
        if is_rbar {
            region.rbar = value;
        } else {
            region.rlar = value;
        }
    }
}

enum DwtReg {
    Comp,
    Mask,
    Function,
}

fn dwt_comp_slot(addr: u32) -> Option<(usize, DwtReg)> {
    if !(0xE000_1020..0xE000_1020 + 0x10 * dwt::NUM_DWT_COMPARATORS as u32).contains(&addr) {
        return None;
    }
    let rel = addr - 0xE000_1020;
    let idx = (rel / 0x10) as usize;
    let reg = match rel % 0x10 {
        0x0 => DwtReg::Comp,
        0x4 => DwtReg::Mask,
        0x8 => DwtReg::Function,
        _ => return None,
    };
    Some((idx, reg))
}

/// Reading `FUNCTION` clears `MATCHED` (bit 24) as a side effect, per the
/// architecture; the other two registers in a comparator's bank are plain.
fn dwt_comp_read(nest: &mut CpuNest, addr: u32) -> Option<u32> {
    let (idx, reg) = dwt_comp_slot(addr)?;
    match reg {
        DwtReg::Comp => nest.dwt_comp.get(idx).copied(),
        DwtReg::Mask => nest.dwt_mask.get(idx).copied(),
        DwtReg::Function => {
            let value = *nest.dwt_function.get(idx)?;
            if let Some(slot) = nest.dwt_function.get_mut(idx) {
                *slot &= !(1 << 24);
            }
            Some(value)
        }
    }
}

fn dwt_comp_write(nest: &mut CpuNest, addr: u32, value: u32) {
    if let Some((idx, reg)) = dwt_comp_slot(addr) {
        match reg {
            DwtReg::Comp => {
                if let Some(s) = nest.dwt_comp.get_mut(idx) {
                    *s = value;
                }
            }
            DwtReg::Mask => {
                if let Some(s) = nest.dwt_mask.get_mut(idx) {
                    *s = value;
                }
            }
            DwtReg::Function => {
                if let Some(s) = nest.dwt_function.get_mut(idx) {
                    *s = value;
                }
            }
        }
    }
}

enum SystickField {
    Csr,
    Rvr,
    Cvr,
    Calib,
}

fn systick_read(systick: Option<&SysTickTimer>, cfg: &SimulatorConfig, field: SystickField) -> Option<u32> {
    let timer = systick?;
    Some(match field {
        SystickField::Csr => {
            let (_, countflag) = timer.read_current_and_countflag();
            let (enable, tickint, external) = timer.csr_bits();
            let mut v: u32 = 0;
            if enable {
                v |= systick::ControlAndStatus::ENABLE::SET.value;
            }
            if tickint {
                v |= systick::ControlAndStatus::TICKINT::SET.value;
            }
            if !external {
                v |= systick::ControlAndStatus::CLKSOURCE::SET.value;
            }
            if countflag {
                v |= systick::ControlAndStatus::COUNTFLAG::SET.value;
            }
            v
        }
        SystickField::Rvr => timer.reload(),
        SystickField::Cvr => timer.read_current_and_countflag().0,
        SystickField::Calib => {
            let tenms = cfg.syst_int_freq / 100;
            let noref = if cfg.syst_ext_freq == 0 { 1 } else { 0 };
            (noref << 31) | (tenms & 0x00FF_FFFF)
        }
    })
}

fn systick_write(systick: Option<&SysTickTimer>, field: SystickField, value: u32) {
    let Some(timer) = systick else { return };
    match field {
        SystickField::Csr => {
            timer.set_enable(value & 1 != 0);
            timer.set_tickint(value & 0b10 != 0);
            timer.set_clksource(if value & 0b100 != 0 { ClockSource::Internal } else { ClockSource::External });
        }
        SystickField::Rvr => timer.write_reload(value & 0x00FF_FFFF),
        SystickField::Cvr => timer.write_current(value & 0x00FF_FFFF),
        SystickField::Calib => {}
    }
}

fn icsr_value(state: &PeState, nest: &CpuNest, cfg: &SimulatorConfig, secure: bool) -> u32 {
    use crate::exceptions::ExceptionEngine;

    let mut v = nest.icsr(secure);
    let active = (0..state.exc_active.len() as u16)
        .rev()
        .find(|&n| state.exc_active[n as usize].get(excnum::is_banked(n, dual_systick(cfg)), secure));
    let vectactive = active.unwrap_or(0);
    v = (v & !0x1FF) | vectactive as u32;

    let rettobase = state
        .exc_active
        .iter()
        .enumerate()
        .skip(1)
        .filter(|&(n, sides)| sides.get(excnum::is_banked(n as u16, dual_systick(cfg)), secure))
        .count()
        <= 1;
    v &= !(1 << 11);
    if rettobase {
        v |= 1 << 11;
    }

    if let Some((pending_no, _)) = ExceptionEngine::pending_exception_details(state, nest, cfg, true) {
        v = (v & !(0x1FF << 12)) | ((pending_no as u32 & 0x1FF) << 12);
        v |= 1 << 22;
    } else {
        v &= !(1 << 22);
    }
    v
}

fn icsr_write(state: &mut PeState, nest: &mut CpuNest, cfg: &SimulatorConfig, secure: bool, value: u32) {
    let view = LocalRegisterCopy::<u32, scb::Icsr::Register>::new(value);
    if view.is_set(scb::Icsr::PENDSVSET) {
        state.exc_pending[excnum::PEND_SV as usize].set(excnum::is_banked(excnum::PEND_SV, dual_systick(cfg)), secure, true);
    }
    if view.is_set(scb::Icsr::PENDSVCLR) {
        state.exc_pending[excnum::PEND_SV as usize].set(excnum::is_banked(excnum::PEND_SV, dual_systick(cfg)), secure, false);
    }
    let systick_banked = excnum::is_banked(excnum::SYS_TICK, dual_systick(cfg));
    if view.is_set(scb::Icsr::PENDSTSET) {
        state.exc_pending[excnum::SYS_TICK as usize].set(systick_banked, secure, true);
    }
    if view.is_set(scb::Icsr::PENDSTCLR) {
        state.exc_pending[excnum::SYS_TICK as usize].set(systick_banked, secure, false);
    }
    if view.is_set(scb::Icsr::NMIPENDSET) {
        state.exc_pending[excnum::NMI as usize].set(false, true, true);
    }
    let _ = nest;
}

fn write_shcsr(state: &mut PeState, nest: &mut CpuNest, cfg: &SimulatorConfig, secure: bool, value: u32) {
    if secure {
        nest.shcsr_s = value;
    } else {
        nest.shcsr_ns = value;
    }
    let view = LocalRegisterCopy::<u32, scb::Shcsr::Register>::new(value);
    let set_enable = |state: &mut PeState, exc_no: u16, on: bool| {
        let banked = excnum::is_banked(exc_no, dual_systick(cfg));
        state.exc_enable[exc_no as usize].set(banked, secure, on);
    };
    set_enable(state, excnum::MEM_MANAGE, view.is_set(scb::Shcsr::MEMFAULTENA));
    set_enable(state, excnum::BUS_FAULT, view.is_set(scb::Shcsr::BUSFAULTENA));
    set_enable(state, excnum::USAGE_FAULT, view.is_set(scb::Shcsr::USGFAULTENA));
    if secure {
        set_enable(state, excnum::SECURE_FAULT, view.is_set(scb::Shcsr::SECUREFAULTENA));
    }

    let set_pended = |state: &mut PeState, exc_no: u16, on: bool| {
        let banked = excnum::is_banked(exc_no, dual_systick(cfg));
        state.exc_pending[exc_no as usize].set(banked, secure, on);
    };
    set_pended(state, excnum::MEM_MANAGE, view.is_set(scb::Shcsr::MEMFAULTPENDED));
    set_pended(state, excnum::BUS_FAULT, view.is_set(scb::Shcsr::BUSFAULTPENDED));
    set_pended(state, excnum::USAGE_FAULT, view.is_set(scb::Shcsr::USGFAULTPENDED));
    set_pended(state, excnum::SVCALL, view.is_set(scb::Shcsr::SVCALLPENDED));
    if secure {
        set_pended(state, excnum::SECURE_FAULT, view.is_set(scb::Shcsr::SECUREFAULTPENDED));
    }
}

fn nvic_enable_read(state: &PeState, cfg: &SimulatorConfig, word_idx: u32) -> Option<u32> {
    if word_idx >= 16 {
        return None;
    }
    let mut v = 0u32;
    for bit in 0..32u32 {
        let irq = word_idx * 32 + bit;
        let exc_no = excnum::EXT_INT0 + irq as u16;
        if (exc_no as usize) < state.exc_enable.len() && exc_no < cfg.max_exc {
            if state.exc_enable[exc_no as usize].get(false, false) {
                v |= 1 << bit;
            }
        }
    }
    Some(v)
}

fn nvic_pending_read(state: &PeState, cfg: &SimulatorConfig, word_idx: u32) -> Option<u32> {
    if word_idx >= 16 {
        return None;
    }
    let mut v = 0u32;
    for bit in 0..32u32 {
        let irq = word_idx * 32 + bit;
        let exc_no = excnum::EXT_INT0 + irq as u16;
        if (exc_no as usize) < state.exc_pending.len() && exc_no < cfg.max_exc {
            if state.exc_pending[exc_no as usize].get(false, false) {
                v |= 1 << bit;
            }
        }
    }
    Some(v)
}

fn nvic_active_read(state: &PeState, cfg: &SimulatorConfig, word_idx: u32) -> Option<u32> {
    if word_idx >= 16 {
        return None;
    }
    let mut v = 0u32;
    for bit in 0..32u32 {
        let irq = word_idx * 32 + bit;
        let exc_no = excnum::EXT_INT0 + irq as u16;
        if (exc_no as usize) < state.exc_active.len() && exc_no < cfg.max_exc {
            if state.exc_active[exc_no as usize].get(false, false) {
                v |= 1 << bit;
            }
        }
    }
    Some(v)
}

fn nvic_enable_write(state: &mut PeState, cfg: &SimulatorConfig, word_idx: u32, value: u32, secure: bool, enable: bool) {
    for bit in 0..32u32 {
        if value & (1 << bit) == 0 {
            continue;
        }
        let irq = word_idx * 32 + bit;
        let exc_no = excnum::EXT_INT0 + irq as u16;
        if (exc_no as usize) < state.exc_enable.len() && exc_no < cfg.max_exc {
            state.exc_enable[exc_no as usize].set(false, secure, enable);
        }
    }
}

fn nvic_pending_write(state: &mut PeState, cfg: &SimulatorConfig, word_idx: u32, value: u32, secure: bool, pend: bool) {
    for bit in 0..32u32 {
        if value & (1 << bit) == 0 {
            continue;
        }
        let irq = word_idx * 32 + bit;
        let exc_no = excnum::EXT_INT0 + irq as u16;
        if (exc_no as usize) < state.exc_pending.len() && exc_no < cfg.max_exc {
            state.exc_pending[exc_no as usize].set(false, secure, pend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::state::PeState;

    #[test]
    fn classify_secure_privileged_direct_is_secure_view() {
        assert_eq!(classify(true, true, false, true), Behavior::View { secure: true });
    }

    #[test]
    fn classify_secure_unprivileged_is_busfault() {
        assert_eq!(classify(true, false, false, true), Behavior::BusFault);
    }

    #[test]
    fn classify_nonsecure_privileged_direct_is_nonsecure_view_when_security_present() {
        assert_eq!(classify(false, true, false, true), Behavior::View { secure: false });
    }

    #[test]
    fn classify_nonsecure_privileged_direct_is_secure_view_without_security_ext() {
        assert_eq!(classify(false, true, false, false), Behavior::View { secure: true });
    }

    #[test]
    fn cpuid_reads_fixed_value_through_nonsecure_alias() {
        let state = PeState::new(48);
        let mut nest = CpuNest::new(48, 8, 8, 8, 0);
        let cfg = SimulatorConfig::default();
        let v = read(&state, &mut nest, &cfg, None, 0xE002_ED00, false, true);
        assert_eq!(v, Some(0x410F_C240));
    }

    #[test]
    fn icsr_pendsvset_pends_pendsv_on_requester_side() {
        let mut state = PeState::new(48);
        let mut nest = CpuNest::new(48, 8, 8, 8, 0);
        let cfg = SimulatorConfig::default();
        write(&mut state, &mut nest, &cfg, None, 0xE000_ED04, true, true, 1 << 28).unwrap();
        let banked = excnum::is_banked(excnum::PEND_SV, false);
        assert!(state.exc_pending[excnum::PEND_SV as usize].get(banked, true));
    }

    #[test]
    fn debug_read_ignores_software_access_classification() {
        let state = PeState::new(48);
        let mut nest = CpuNest::new(48, 8, 8, 8, 0);
        nest.sfsr = 0x3;
        let cfg = SimulatorConfig::default();
        // A NAT_SW non-secure read of SFSR is RAZ/WI (Some(0)); the debug
        // path addresses the Secure bank directly regardless.
        assert_eq!(read(&state, &mut nest, &cfg, None, 0xE000_EDE4, false, true), Some(0));
        assert_eq!(debug_read(&state, &mut nest, &cfg, None, 0xE000_EDE4, true), Some(3));
    }

    #[test]
    fn sfsr_raz_wi_from_nonsecure_requester() {
        let state = PeState::new(48);
        let mut nest = CpuNest::new(48, 8, 8, 8, 0);
        nest.sfsr = 0xFF;
        let cfg = SimulatorConfig::default();
        let v = read(&state, &mut nest, &cfg, None, 0xE000_EDE4, false, true);
        assert_eq!(v, Some(0));
    }

    #[test]
    fn dwt_function_matched_clears_on_read() {
        let state = PeState::new(48);
        let mut nest = CpuNest::new(48, 8, 8, 8, 0);
        nest.dwt_function[0] = 0b0101 | (1 << 24);
        let cfg = SimulatorConfig::default();
        let v = read(&state, &mut nest, &cfg, None, 0xE000_1028, true, true).unwrap();
        assert_ne!(v & (1 << 24), 0);
        assert_eq!(nest.dwt_function[0] & (1 << 24), 0);
        let v2 = read(&state, &mut nest, &cfg, None, 0xE000_1028, true, true).unwrap();
        assert_eq!(v2 & (1 << 24), 0);
    }
}
