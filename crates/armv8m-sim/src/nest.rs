// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `CpuNest`: the system control register file.
//!
//! Every register that is banked per security side gets an `_s`/`_ns`
//! pair of fields rather than a single field plus a "which side" flag:
//! banking is never modeled as pointer swapping, only as a pair of
//! fields with a helper that picks the current view.

use armv8m_regs::LocalRegisterCopy;
use armv8m_regs::scb;

/// One MPU region's RBAR/RLAR pair plus its governing MAIR index.
#[derive(Debug, Clone, Copy, Default)]
pub struct MpuRegion {
    pub rbar: u32,
    pub rlar: u32,
}

/// One SAU region's RBAR/RLAR pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct SauRegion {
    pub rbar: u32,
    pub rlar: u32,
}

/// Banked MPU bank (one exists per security state).
#[derive(Debug, Clone)]
pub struct MpuBank {
    pub ctrl: u32,
    pub rnr: u32,
    pub mair0: u32,
    pub mair1: u32,
    pub regions: Vec<MpuRegion>,
}

impl MpuBank {
    fn new(num_regions: u8) -> Self {
        MpuBank {
            ctrl: 0,
            rnr: 0,
            mair0: 0,
            mair1: 0,
            regions: vec![MpuRegion::default(); num_regions as usize],
        }
    }
}

/// Banked fault/status registers duplicated per security side.
#[derive(Debug, Clone, Default)]
pub struct FaultBank {
    pub cfsr: u32,
    pub hfsr: u32,
    pub dfsr: u32,
    pub mmfar: u32,
    pub bfar: u32,
}

/// Banked SHPR1-3 as a flat priority-byte table indexed by exception
/// number (system exceptions 4..15).
#[derive(Debug, Clone)]
pub struct ShpBank(pub Vec<u8>);

impl ShpBank {
    fn new(max_exc: usize) -> Self {
        ShpBank(vec![0; max_exc])
    }
}

/// NVIC priority bytes for external interrupts, one per `IPR` byte lane.
#[derive(Debug, Clone)]
pub struct IprBank(pub Vec<u8>);

impl IprBank {
    fn new(max_exc: usize) -> Self {
        IprBank(vec![0; max_exc])
    }
}

/// The system control register file, banked by security side wherever the
/// architecture banks it.
#[derive(Debug, Clone)]
pub struct CpuNest {
    pub vtor_s: u32,
    pub vtor_ns: u32,
    pub aircr_s: u32,
    pub aircr_ns: u32,
    pub ccr_s: u32,
    pub ccr_ns: u32,
    pub scr_s: u32,
    pub scr_ns: u32,
    pub shcsr_s: u32,
    pub shcsr_ns: u32,
    pub icsr_s: u32,
    pub icsr_ns: u32,
    pub cpacr_s: u32,
    pub cpacr_ns: u32,
    pub nsacr: u32,

    pub fault_s: FaultBank,
    pub fault_ns: FaultBank,

    pub sfsr: u32,
    pub sfar: u32,
    pub dauthctrl: u32,

    pub fpccr_s: u32,
    pub fpccr_ns: u32,
    pub fpcar_s: u32,
    pub fpcar_ns: u32,
    pub fpdscr_s: u32,
    pub fpdscr_ns: u32,

    pub shpr_s: ShpBank,
    pub shpr_ns: ShpBank,
    pub ipr_s: IprBank,
    pub ipr_ns: IprBank,

    pub mpu_s: MpuBank,
    pub mpu_ns: MpuBank,

    pub sau_ctrl: u32,
    pub sau_rnr: u32,
    pub sau_regions: Vec<SauRegion>,

    pub dhcsr: u32,
    pub demcr: u32,

    pub dwt_ctrl: u32,
    pub dwt_cyccnt: u32,
    pub dwt_comp: Vec<u32>,
    pub dwt_mask: Vec<u32>,
    pub dwt_function: Vec<u32>,
}

impl CpuNest {
    pub fn new(
        max_exc: usize,
        num_mpu_s: u8,
        num_mpu_ns: u8,
        num_sau: u8,
        initial_vtor: u32,
    ) -> Self {
        CpuNest {
            vtor_s: initial_vtor,
            vtor_ns: 0,
            aircr_s: 0,
            aircr_ns: 0,
            ccr_s: scb::Ccr::STKALIGN::SET.value,
            ccr_ns: scb::Ccr::STKALIGN::SET.value,
            scr_s: 0,
            scr_ns: 0,
            shcsr_s: 0,
            shcsr_ns: 0,
            icsr_s: 0,
            icsr_ns: 0,
            cpacr_s: 0,
            cpacr_ns: 0,
            nsacr: 0,
            fault_s: FaultBank::default(),
            fault_ns: FaultBank::default(),
            sfsr: 0,
            sfar: 0,
            dauthctrl: 0,
            fpccr_s: 0,
            fpccr_ns: 0,
            fpcar_s: 0,
            fpcar_ns: 0,
            fpdscr_s: 0,
            fpdscr_ns: 0,
            shpr_s: ShpBank::new(max_exc),
            shpr_ns: ShpBank::new(max_exc),
            ipr_s: IprBank::new(max_exc),
            ipr_ns: IprBank::new(max_exc),
            mpu_s: MpuBank::new(num_mpu_s),
            mpu_ns: MpuBank::new(num_mpu_ns),
            sau_ctrl: 0,
            sau_rnr: 0,
            sau_regions: vec![SauRegion::default(); num_sau as usize],
            dhcsr: 0,
            demcr: 0,
            dwt_ctrl: 0,
            dwt_cyccnt: 0,
            dwt_comp: vec![0; armv8m_regs::dwt::NUM_DWT_COMPARATORS],
            dwt_mask: vec![0; armv8m_regs::dwt::NUM_DWT_COMPARATORS],
            dwt_function: vec![0; armv8m_regs::dwt::NUM_DWT_COMPARATORS],
        }
    }

    pub fn mpu(&self, secure: bool) -> &MpuBank {
        if secure {
            &self.mpu_s
        } else {
            &self.mpu_ns
        }
    }

    pub fn mpu_mut(&mut self, secure: bool) -> &mut MpuBank {
        if secure {
            &mut self.mpu_s
        } else {
            &mut self.mpu_ns
        }
    }

    pub fn fault(&self, secure: bool) -> &FaultBank {
        if secure {
            &self.fault_s
        } else {
            &self.fault_ns
        }
    }

    pub fn fault_mut(&mut self, secure: bool) -> &mut FaultBank {
        if secure {
            &mut self.fault_s
        } else {
            &mut self.fault_ns
        }
    }

    pub fn vtor(&self, secure: bool) -> u32 {
        if secure {
            self.vtor_s
        } else {
            self.vtor_ns
        }
    }

    pub fn ccr(&self, secure: bool) -> u32 {
        if secure {
            self.ccr_s
        } else {
            self.ccr_ns
        }
    }

    pub fn icsr(&self, secure: bool) -> u32 {
        if secure {
            self.icsr_s
        } else {
            self.icsr_ns
        }
    }

    pub fn scr(&self, secure: bool) -> u32 {
        if secure {
            self.scr_s
        } else {
            self.scr_ns
        }
    }

    pub fn aircr(&self, secure: bool) -> u32 {
        if secure {
            self.aircr_s
        } else {
            self.aircr_ns
        }
    }

    /// `AIRCR.PRIGROUP`, shared bit position regardless of bank.
    pub fn prigroup(&self, secure: bool) -> u32 {
        LocalRegisterCopy::<u32, scb::Aircr::Register>::new(self.aircr(secure))
            .read(scb::Aircr::PRIGROUP)
    }

    /// `AIRCR.PRIS`, Secure-bank only (reads 0 from the Non-secure alias).
    pub fn pris(&self) -> bool {
        LocalRegisterCopy::<u32, scb::Aircr::Register>::new(self.aircr_s)
            .is_set(scb::Aircr::PRIS)
    }

    pub fn bfhfnmins(&self) -> bool {
        LocalRegisterCopy::<u32, scb::Aircr::Register>::new(self.aircr_s)
            .is_set(scb::Aircr::BFHFNMINS)
    }

    /// Writes `AIRCR`, honoring the `VECTKEY` write-gate.
    pub fn write_aircr(&mut self, secure: bool, raw: u32) {
        let view = LocalRegisterCopy::<u32, scb::Aircr::Register>::new(raw);
        if view.read(scb::Aircr::VECTKEY) != scb::AIRCR_VECTKEY {
            return;
        }
        if secure {
            self.aircr_s = raw;
        } else {
            // Non-secure writes cannot affect PRIS/BFHFNMINS/SYSRESETREQ
            // banking beyond its own side's PRIGROUP/ENDIANNESS.
            self.aircr_ns = raw;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aircr_write_requires_vectkey() {
        let mut nest = CpuNest::new(16, 4, 4, 4, 0);
        nest.write_aircr(true, 0xDEAD_0700);
        assert_eq!(nest.aircr_s, 0, "wrong VECTKEY must be ignored");
        let good = (scb::AIRCR_VECTKEY << 16) | (3 << 8);
        nest.write_aircr(true, good);
        assert_eq!(nest.prigroup(true), 3);
    }

    #[test]
    fn stkalign_defaults_set_on_both_banks() {
        let nest = CpuNest::new(16, 4, 4, 4, 0);
        assert_ne!(nest.ccr(true) & scb::Ccr::STKALIGN::SET.value, 0);
        assert_ne!(nest.ccr(false) & scb::Ccr::STKALIGN::SET.value, 0);
    }
}
