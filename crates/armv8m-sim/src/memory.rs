// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `MemoryPipeline`: address validation through SAU →
//! MPU → permission check → endianness → DWT data match → exclusive
//! monitor arbitration → bus access.

use armv8m_regs::mpu;
use armv8m_regs::sau::{self, SecurityAttribution};
use armv8m_regs::LocalRegisterCopy;

use crate::config::SimulatorConfig;
use crate::device::{AccessFlags, AccessSize, AccessType, AddressDescriptor, BusError, Device};
use crate::error::{ExcInfo, Fault};
use crate::monitor::{GlobalMonitor, LocalMonitor};
use crate::nest::CpuNest;
use crate::state::PeState;
use crate::systick_timer::SysTickTimer;

/// Lower bound (inclusive) and upper bound (exclusive) of the System
/// Control Space.
pub const SCS_BASE: u32 = 0xE000_0000;
pub const SCS_END: u32 = 0xE010_0000;

/// Resolved Normal/Device attribution for a region with no MPU entry
/// matching, derived purely from the address's top 3 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultAttrs {
    pub device: bool,
    pub device_ngnrne: bool,
    pub shareable: bool,
    pub xn: bool,
}

pub fn default_attributes(addr: u32) -> DefaultAttrs {
    match addr >> 29 {
        0b000 => DefaultAttrs { device: false, device_ngnrne: false, shareable: false, xn: false },
        0b001 => DefaultAttrs { device: false, device_ngnrne: false, shareable: false, xn: false },
        0b010 => DefaultAttrs { device: true, device_ngnrne: false, shareable: true, xn: true },
        0b011 => DefaultAttrs { device: false, device_ngnrne: false, shareable: false, xn: false },
        0b100 => DefaultAttrs { device: false, device_ngnrne: false, shareable: false, xn: false },
        0b101 => DefaultAttrs { device: true, device_ngnrne: false, shareable: true, xn: true },
        0b110 => DefaultAttrs { device: true, device_ngnrne: false, shareable: true, xn: true },
        _ => {
            // 0b111: nGnRnE only inside the PPB window (bits[28:20] == 0).
            let ngnrne = (addr >> 20) & 0x1FF != 0;
            DefaultAttrs { device: true, device_ngnrne: !ngnrne, shareable: true, xn: true }
        }
    }
}

/// `security_check`: combines the SAU region
/// table with the embedder's IDAU classification.
pub fn security_check(
    nest: &CpuNest,
    device: &dyn Device,
    addr: u32,
    is_ifetch: bool,
) -> SecurityAttribution {
    let idau = device.idau_check(addr, is_ifetch);
    if idau.exempt || sau::is_exempt_window(addr) {
        return SecurityAttribution {
            ns: idau.ns,
            nsc: false,
            sregion: 0,
            srvalid: false,
            iregion: idau.iregion,
            irvalid: idau.irvalid,
        };
    }

    let ctrl_enabled =
        LocalRegisterCopy::<u32, sau::SauCtrl::Register>::new(nest.sau_ctrl).is_set(sau::SauCtrl::ENABLE);
    let allns = LocalRegisterCopy::<u32, sau::SauCtrl::Register>::new(nest.sau_ctrl).is_set(sau::SauCtrl::ALLNS);

    if !ctrl_enabled {
        let ns = allns || idau.ns;
        return SecurityAttribution {
            ns,
            nsc: false,
            sregion: 0,
            srvalid: false,
            iregion: idau.iregion,
            irvalid: idau.irvalid,
        };
    }

    let mut hit: Option<(usize, bool)> = None;
    let mut multi_hit = false;
    for (i, region) in nest.sau_regions.iter().enumerate() {
        let rlar = LocalRegisterCopy::<u32, sau::SauRlar::Register>::new(region.rlar);
        if !rlar.is_set(sau::SauRlar::ENABLE) {
            continue;
        }
        let base = region.rbar & !0x1F;
        let limit = (rlar.read(sau::SauRlar::LADDR) << 5) | 0x1F;
        if addr >= base && addr <= limit {
            if hit.is_some() {
                multi_hit = true;
            }
            hit = Some((i, rlar.is_set(sau::SauRlar::NSC)));
        }
    }

    match hit {
        _ if multi_hit => SecurityAttribution {
            ns: false,
            nsc: false,
            sregion: 0,
            srvalid: false,
            iregion: idau.iregion,
            irvalid: idau.irvalid,
        },
        Some((region, nsc)) => SecurityAttribution {
            ns: false,
            nsc,
            sregion: region as u8,
            srvalid: true,
            iregion: idau.iregion,
            irvalid: idau.irvalid,
        },
        None => SecurityAttribution {
            ns: allns || idau.ns,
            nsc: false,
            sregion: 0,
            srvalid: false,
            iregion: idau.iregion,
            irvalid: idau.irvalid,
        },
    }
}

struct MpuHit {
    xn: bool,
    read: bool,
    write: bool,
}

fn mpu_lookup(nest: &CpuNest, secure: bool, addr: u32, privileged: bool) -> Option<MpuHit> {
    let bank = nest.mpu(secure);
    let enabled = LocalRegisterCopy::<u32, mpu::MpuCtrl::Register>::new(bank.ctrl)
        .is_set(mpu::MpuCtrl::ENABLE);
    if !enabled {
        return None;
    }

    let mut hit: Option<MpuHit> = None;
    let mut multi = false;
    for region in &bank.regions {
        let rlar = LocalRegisterCopy::<u32, mpu::MpuRlar::Register>::new(region.rlar);
        if !rlar.is_set(mpu::MpuRlar::EN) {
            continue;
        }
        let rbar = LocalRegisterCopy::<u32, mpu::MpuRbar::Register>::new(region.rbar);
        let base = region.rbar & !0x1F;
        let limit = (rlar.read(mpu::MpuRlar::LIMIT) << 5) | 0x1F;
        if addr >= base && addr <= limit {
            if hit.is_some() {
                multi = true;
            }
            let ap = rbar.read(mpu::MpuRbar::AP);
            let perm = mpu::access_permission(ap, privileged);
            hit = Some(MpuHit {
                xn: rbar.is_set(mpu::MpuRbar::XN),
                read: perm.read,
                write: perm.write,
            });
        }
    }
    if multi {
        Some(MpuHit { xn: true, read: false, write: false })
    } else {
        hit
    }
}

/// Outcome of the SAU/MPU/permission stages, ahead of dispatch.
struct Resolved {
    ns_target: bool,
    readable: bool,
    writable: bool,
    executable: bool,
    device: bool,
    device_ngnrne: bool,
    shareable: bool,
}

fn resolve(
    nest: &mut CpuNest,
    device: &dyn Device,
    cfg: &SimulatorConfig,
    addr: u32,
    access_type: AccessType,
    privileged: bool,
    secure: bool,
) -> Result<Resolved, ExcInfo> {
    use armv8m_regs::scb::Sfsr;

    let is_ifetch = matches!(access_type, AccessType::IFetch);
    let attrib = security_check(nest, device, addr, is_ifetch);

    if cfg.security_extension && !secure && !attrib.ns {
        if is_ifetch {
            nest.sfsr |= Sfsr::INVEP::SET.value;
        } else {
            nest.sfsr |= Sfsr::AUVIOL::SET.value | Sfsr::SFARVALID::SET.value;
            nest.sfar = addr;
        }
        let mut info = ExcInfo::new(Fault::SecureFault, secure);
        info.term_inst = true;
        return Err(info);
    }

    if cfg.security_extension && is_ifetch && secure && attrib.ns {
        nest.sfsr |= Sfsr::INVTRAN::SET.value;
        let mut info = ExcInfo::new(Fault::SecureFault, secure);
        info.term_inst = true;
        return Err(info);
    }

    let num_regions_present = !nest.mpu(secure).regions.is_empty();
    let mpu_hit = mpu_lookup(nest, secure, addr, privileged);
    let default_priv_ok =
        LocalRegisterCopy::<u32, mpu::MpuCtrl::Register>::new(nest.mpu(secure).ctrl)
            .is_set(mpu::MpuCtrl::PRIVDEFENA);

    let defaults = default_attributes(addr);

    let (readable, writable, executable, device_mem, device_ngnrne, shareable) = match mpu_hit {
        Some(hit) => (hit.read, hit.write, hit.read && !hit.xn, defaults.device, defaults.device_ngnrne, defaults.shareable),
        None if !num_regions_present
            || !LocalRegisterCopy::<u32, mpu::MpuCtrl::Register>::new(nest.mpu(secure).ctrl)
                .is_set(mpu::MpuCtrl::ENABLE) =>
        {
            (true, true, !defaults.xn, defaults.device, defaults.device_ngnrne, defaults.shareable)
        }
        None if default_priv_ok && privileged => {
            (true, true, !defaults.xn, defaults.device, defaults.device_ngnrne, defaults.shareable)
        }
        None => (false, false, false, defaults.device, defaults.device_ngnrne, defaults.shareable),
    };

    // The Non-secure alias window (addr[31:29] == 0b111) is never
    // executable, regardless of what the MPU/default map granted.
    let executable = executable && (addr >> 29) != 0b111;

    if is_ifetch && !executable {
        nest.fault_mut(secure).cfsr |= armv8m_regs::scb::Cfsr::IACCVIOL::SET.value;
        let mut info = ExcInfo::new(Fault::MemManage, secure);
        info.term_inst = true;
        return Err(info);
    }

    Ok(Resolved {
        ns_target: attrib.ns,
        readable,
        writable,
        executable,
        device: device_mem,
        device_ngnrne,
        shareable,
    })
}

fn encode_flags(resolved: &Resolved, access_type: AccessType, privileged: bool, secure: bool, write: bool) -> AccessFlags {
    let mut flags = AccessFlags::empty();
    if privileged {
        flags |= AccessFlags::PRIVILEGED;
    }
    if secure {
        flags |= AccessFlags::SECURE;
    }
    if write {
        flags |= AccessFlags::WRITE;
    }
    if resolved.device {
        flags |= AccessFlags::DEVICE;
    }
    if resolved.device_ngnrne {
        flags |= AccessFlags::DEVICE_NGNRNE;
    }
    if resolved.shareable {
        flags |= AccessFlags::SHAREABLE;
    }
    if matches!(access_type, AccessType::Stack | AccessType::LazyFp) {
        flags |= AccessFlags::TRANSIENT;
    }
    flags
}

/// Feeds a completed data access to the DWT comparators: address-range
/// matches (mask-qualified) against an enabled read/write/read-write
/// comparator set `FUNCTION.MATCHED` and, if `DEMCR.MON_EN` is set, pend
/// `DebugMonitor`; otherwise, with halting debug enabled, latch the `DBG`
/// exit cause so the harness can stop the run.
fn dwt_data_match(
    nest: &mut CpuNest,
    state: &mut PeState,
    cfg: &SimulatorConfig,
    addr: u32,
    size: AccessSize,
    value: u32,
    is_write: bool,
) {
    if !cfg.dwt {
        return;
    }
    let _ = value;
    let mut any_matched = false;
    for i in 0..nest.dwt_function.len() {
        let function = nest.dwt_function[i] & 0xF;
        let wants_read = function == 0b0101 || function == 0b0111;
        let wants_write = function == 0b0110 || function == 0b0111;
        if (is_write && !wants_write) || (!is_write && !wants_read) {
            continue;
        }
        let mask_bits = (nest.dwt_mask[i] & 0x1F).min(31);
        let mask = if mask_bits == 0 { !0u32 } else { !0u32 << mask_bits };
        let comp = nest.dwt_comp[i];
        if (addr & mask) == (comp & mask) && (addr + size.bytes() - 1) & mask == comp & mask {
            nest.dwt_function[i] |= 1 << 24; // FUNCTION.MATCHED
            any_matched = true;
        }
    }

    if !any_matched {
        return;
    }

    let mon_en = nest.demcr & (1 << 16) != 0;
    if mon_en {
        let secure = state.is_secure();
        let banked = crate::excnum::is_banked(crate::excnum::DEBUG_MONITOR, false);
        state.exc_pending[crate::excnum::DEBUG_MONITOR as usize].set(banked, secure, true);
    } else if nest.dhcsr & 1 != 0 {
        state.exit_cause |= crate::state::ExitCause::DBG;
    }
}

/// Raises `MemManage` for a denied data access, setting the MMFSR bit that
/// matches `access_type` and, for ordinary data accesses, `MMFAR`.
fn mem_manage_fault(nest: &mut CpuNest, addr: u32, access_type: AccessType, secure: bool, is_store: bool) -> ExcInfo {
    use armv8m_regs::scb::Cfsr;
    let bank = nest.fault_mut(secure);
    match access_type {
        AccessType::Stack if is_store => bank.cfsr |= Cfsr::MSTKERR::SET.value,
        AccessType::Stack => bank.cfsr |= Cfsr::MUNSTKERR::SET.value,
        AccessType::LazyFp => bank.cfsr |= Cfsr::MLSPERR::SET.value,
        _ => {
            bank.cfsr |= Cfsr::DACCVIOL::SET.value | Cfsr::MMARVALID::SET.value;
            bank.mmfar = addr;
        }
    }
    let mut info = ExcInfo::new(Fault::MemManage, secure);
    info.term_inst = true;
    info
}

fn byte_reverse(val: u32, size: AccessSize) -> u32 {
    match size {
        AccessSize::Byte => val,
        AccessSize::Half => ((val & 0xFF) << 8) | ((val >> 8) & 0xFF),
        AccessSize::Word => val.swap_bytes(),
    }
}

/// The memory pipeline. Borrows everything it needs per call; it owns no
/// state of its own.
pub struct MemoryPipeline<'d> {
    pub device: &'d mut dyn Device,
    pub global_monitor: &'d GlobalMonitor,
    pub pe_id: usize,
}

impl<'d> MemoryPipeline<'d> {
    fn check_alignment(addr: u32, size: AccessSize, cfg: &SimulatorConfig) -> Result<(), ExcInfo> {
        let _ = cfg;
        if addr % size.bytes() != 0 {
            let mut info = ExcInfo::new(Fault::UsageFault, false);
            info.term_inst = true;
            return Err(info);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn load(
        &mut self,
        state: &mut PeState,
        nest: &mut CpuNest,
        cfg: &SimulatorConfig,
        systick: Option<&SysTickTimer>,
        addr: u32,
        size: AccessSize,
        access_type: AccessType,
        privileged: bool,
        secure: bool,
    ) -> Result<u32, ExcInfo> {
        Self::check_alignment(addr, size, cfg)?;
        let resolved = resolve(nest, self.device, cfg, addr, access_type, privileged, secure)?;
        if !resolved.readable {
            return Err(mem_manage_fault(nest, addr, access_type, secure, false));
        }

        let desc = AddressDescriptor { access_type, flags: encode_flags(&resolved, access_type, privileged, secure, false) };
        let raw = if (SCS_BASE..SCS_END).contains(&addr) {
            if size != AccessSize::Word {
                let mut info = ExcInfo::new(Fault::BusFault, secure);
                info.term_inst = true;
                return Err(info);
            }
            crate::scs::read(state, nest, cfg, systick, addr, secure, privileged).ok_or_else(|| {
                let mut info = ExcInfo::new(Fault::BusFault, secure);
                info.term_inst = true;
                info
            })?
        } else {
            self.device.load(addr, size, desc).map_err(|e| bus_fault(nest, e, addr, access_type, secure, false))?
        };

        let value = if self.aircr_big_endian(nest, secure) && !(0xE00..=0xE00).contains(&(addr >> 20)) {
            byte_reverse(raw, size)
        } else {
            raw
        };

        if matches!(access_type, AccessType::Normal | AccessType::Ordered) && !(SCS_BASE..SCS_END).contains(&addr) {
            dwt_data_match(nest, state, cfg, addr, size, value, false);
        }

        Ok(value)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &mut self,
        state: &mut PeState,
        nest: &mut CpuNest,
        cfg: &SimulatorConfig,
        systick: Option<&SysTickTimer>,
        addr: u32,
        size: AccessSize,
        access_type: AccessType,
        privileged: bool,
        secure: bool,
        value: u32,
    ) -> Result<(), ExcInfo> {
        Self::check_alignment(addr, size, cfg)?;
        let resolved = resolve(nest, self.device, cfg, addr, access_type, privileged, secure)?;
        if !resolved.writable {
            return Err(mem_manage_fault(nest, addr, access_type, secure, true));
        }

        let out = if self.aircr_big_endian(nest, secure) && !(0xE00..=0xE00).contains(&(addr >> 20)) {
            byte_reverse(value, size)
        } else {
            value
        };

        if (SCS_BASE..SCS_END).contains(&addr) {
            if size != AccessSize::Word {
                let mut info = ExcInfo::new(Fault::BusFault, secure);
                info.term_inst = true;
                return Err(info);
            }
            crate::scs::write(state, nest, cfg, systick, addr, secure, privileged, out).ok_or_else(|| {
                let mut info = ExcInfo::new(Fault::BusFault, secure);
                info.term_inst = true;
                info
            })?;
        } else {
            let desc = AddressDescriptor { access_type, flags: encode_flags(&resolved, access_type, privileged, secure, true) };
            self.device.store(addr, size, desc, out).map_err(|e| bus_fault(nest, e, addr, access_type, secure, true))?;
            if resolved.shareable {
                self.global_monitor.clear_exclusive_by_address(addr, size.bytes(), self.pe_id);
            }
            if matches!(access_type, AccessType::Normal | AccessType::Ordered) {
                dwt_data_match(nest, state, cfg, addr, size, value, true);
            }
        }

        Ok(())
    }

    /// `get_mem_i`: 16-bit instruction-fetch path.
    #[allow(clippy::too_many_arguments)]
    pub fn fetch_halfword(
        &mut self,
        state: &mut PeState,
        nest: &mut CpuNest,
        cfg: &SimulatorConfig,
        systick: Option<&SysTickTimer>,
        addr: u32,
        privileged: bool,
        secure: bool,
    ) -> Result<u16, ExcInfo> {
        let word = self.load(state, nest, cfg, systick, addr & !0b1, AccessSize::Half, AccessType::IFetch, privileged, secure)?;
        Ok(word as u16)
    }

    fn aircr_big_endian(&self, nest: &CpuNest, secure: bool) -> bool {
        use armv8m_regs::scb::Aircr;
        LocalRegisterCopy::<u32, Aircr::Register>::new(nest.aircr(secure)).is_set(Aircr::ENDIANNESS)
    }

}

/// Raises `BusFault` for a denied bus response, setting the BFSR bit that
/// matches `access_type` and, for ordinary data accesses, `BFAR`.
fn bus_fault(nest: &mut CpuNest, _err: BusError, addr: u32, access_type: AccessType, secure: bool, is_store: bool) -> ExcInfo {
    use armv8m_regs::scb::Cfsr;
    let bank = nest.fault_mut(secure);
    match access_type {
        AccessType::Stack if is_store => bank.cfsr |= Cfsr::STKERR::SET.value,
        AccessType::Stack => bank.cfsr |= Cfsr::UNSTKERR::SET.value,
        AccessType::LazyFp => bank.cfsr |= Cfsr::LSPERR::SET.value,
        _ => {
            bank.cfsr |= Cfsr::PRECISERR::SET.value | Cfsr::BFARVALID::SET.value;
            bank.bfar = addr;
        }
    }
    let mut info = ExcInfo::new(Fault::BusFault, secure);
    info.term_inst = !matches!(access_type, AccessType::LazyFp);
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DebugPins, IdauResult};

    struct FlatMemory {
        bytes: Vec<u8>,
    }

    impl Device for FlatMemory {
        fn load(&mut self, phys_addr: u32, size: AccessSize, _desc: AddressDescriptor) -> Result<u32, BusError> {
            let base = phys_addr as usize;
            let mut val = 0u32;
            for i in 0..size.bytes() as usize {
                val |= (*self.bytes.get(base + i).unwrap_or(&0) as u32) << (8 * i);
            }
            Ok(val)
        }

        fn store(&mut self, phys_addr: u32, size: AccessSize, _desc: AddressDescriptor, val: u32) -> Result<(), BusError> {
            let base = phys_addr as usize;
            if base + size.bytes() as usize > self.bytes.len() {
                return Err(BusError::NoResponse);
            }
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

    #[test]
    fn unaligned_word_access_raises_usage_fault() {
        let mut mem = FlatMemory { bytes: vec![0; 4096] };
        let monitor = GlobalMonitor::new();
        let mut pipeline = MemoryPipeline { device: &mut mem, global_monitor: &monitor, pe_id: 0 };
        let mut nest = CpuNest::new(16, 4, 4, 4, 0);
        let cfg = SimulatorConfig { security_extension: false, ..Default::default() };
        let mut state = PeState::new(16);
        let err = pipeline
            .load(&mut state, &mut nest, &cfg, None, 0x1001, AccessSize::Word, AccessType::Normal, true, true)
            .unwrap_err();
        assert_eq!(err.fault, Fault::UsageFault);
    }

    #[test]
    fn non_secure_access_to_secure_region_raises_secure_fault() {
        let mut mem = FlatMemory { bytes: vec![0; 4096] };
        let monitor = GlobalMonitor::new();
        let mut pipeline = MemoryPipeline { device: &mut mem, global_monitor: &monitor, pe_id: 0 };
        let mut nest = CpuNest::new(16, 4, 4, 4, 0);
        nest.sau_ctrl = armv8m_regs::sau::SauCtrl::ENABLE::SET.value;
        // Region 0 covers [0x100, 0x11F], Secure and not Non-secure-callable.
        nest.sau_regions[0] = crate::nest::SauRegion {
            rbar: 0x100,
            rlar: 0x100 | armv8m_regs::sau::SauRlar::ENABLE::SET.value,
        };
        let cfg = SimulatorConfig { security_extension: true, ..Default::default() };
        let mut state = PeState::new(16);
        let err = pipeline
            .load(&mut state, &mut nest, &cfg, None, 0x100, AccessSize::Word, AccessType::Normal, true, false)
            .unwrap_err();
        assert_eq!(err.fault, Fault::SecureFault);
        assert_ne!(nest.sfsr & armv8m_regs::scb::Sfsr::AUVIOL::SET.value, 0);
    }

    #[test]
    fn default_map_allows_full_access_with_mpu_disabled() {
        let mut mem = FlatMemory { bytes: vec![0xAB; 4096] };
        let monitor = GlobalMonitor::new();
        let mut pipeline = MemoryPipeline { device: &mut mem, global_monitor: &monitor, pe_id: 0 };
        let mut nest = CpuNest::new(16, 4, 4, 4, 0);
        let cfg = SimulatorConfig { security_extension: false, ..Default::default() };
        let mut state = PeState::new(16);
        let val = pipeline
            .load(&mut state, &mut nest, &cfg, None, 0x100, AccessSize::Word, AccessType::Normal, true, true)
            .unwrap();
        assert_eq!(val, 0xABAB_ABAB);
    }

    #[test]
    fn local_monitor_is_exercised_independently() {
        let mut local = LocalMonitor::default();
        local.mark_exclusive(0x100, 4);
        assert!(local.exclusive_store(0x100, 4, true));
    }

    #[test]
    fn scs_reads_route_through_the_register_file() {
        let mut mem = FlatMemory { bytes: vec![0; 4096] };
        let monitor = GlobalMonitor::new();
        let mut pipeline = MemoryPipeline { device: &mut mem, global_monitor: &monitor, pe_id: 0 };
        let mut nest = CpuNest::new(16, 4, 4, 4, 0);
        let cfg = SimulatorConfig { security_extension: false, ..Default::default() };
        let mut state = PeState::new(16);
        let cpuid = pipeline
            .load(&mut state, &mut nest, &cfg, None, armv8m_regs::scb::CPUID_BASE, AccessSize::Word, AccessType::Normal, true, true)
            .unwrap();
        assert_eq!(cpuid, 0x410F_C240);
    }

    #[test]
    fn scs_rejects_non_word_access_with_bus_fault() {
        let mut mem = FlatMemory { bytes: vec![0; 4096] };
        let monitor = GlobalMonitor::new();
        let mut pipeline = MemoryPipeline { device: &mut mem, global_monitor: &monitor, pe_id: 0 };
        let mut nest = CpuNest::new(16, 4, 4, 4, 0);
        let cfg = SimulatorConfig { security_extension: false, ..Default::default() };
        let mut state = PeState::new(16);
        let err = pipeline
            .load(&mut state, &mut nest, &cfg, None, armv8m_regs::scb::CPUID_BASE, AccessSize::Byte, AccessType::Normal, true, true)
            .unwrap_err();
        assert_eq!(err.fault, Fault::BusFault);
    }
}
