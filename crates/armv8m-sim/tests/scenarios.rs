// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end scenarios driving `Pe` through `step`/`cold_reset` the way an
//! embedder would, rather than exercising individual pipeline stages.

use armv8m_sim::device::{AccessSize, AccessType, AddressDescriptor, BusError, DebugPins, IdauResult};
use armv8m_sim::{Device, ExitCause, Mode, Pe, Security, SimulatorConfig};

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

    fn read_word(&self, addr: u32) -> u32 {
        let b = &self.bytes[addr as usize..addr as usize + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Writes two T16 halfwords (or one T32 instruction split the same way)
    /// as they'd actually sit in memory: `first` at `addr`, `second` at
    /// `addr + 2`.
    fn write_halfwords(&mut self, addr: u32, first: u16, second: u16) {
        self.write_word(addr, ((second as u32) << 16) | first as u32);
    }
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

fn make_pe(cfg: SimulatorConfig) -> Pe<FlatMemory> {
    let mem = FlatMemory::new(0x1_0000);
    Pe::new(cfg, mem, 0).unwrap()
}

fn non_secure_cfg() -> SimulatorConfig {
    SimulatorConfig { security_extension: false, ..Default::default() }
}

// Scenario 1: cold reset loads SP/PC from the vector table and leaves the
// PE in Thread mode with the T bit set and no exit cause pending.
#[test]
fn scenario_vanilla_reset() {
    let mut pe = make_pe(non_secure_cfg());
    pe.device.write_word(0x0000_0000, 0x2000_0100);
    pe.device.write_word(0x0000_0004, 0x0000_0009);
    pe.device.write_halfwords(0x0000_0008, 0xBF00, 0x4770); // nop; bx lr

    pe.cold_reset();

    assert_eq!(pe.state.sp.msp_s, 0x2000_0100);
    assert_eq!(pe.state.pc, 0x0000_0008);
    assert_eq!(pe.state.xpsr & (1 << 24), 1 << 24);
    assert_eq!(pe.state.ipsr(), 0);
    assert_eq!(pe.state.mode(), Mode::Thread);
    assert!(pe.state.exit_cause.is_empty());
    assert!(!pe.is_in_lockup());
}

// Scenario 2: a WFI parks the PE until an NMI preempts it, pushing an
// 8-word exception frame and vectoring to the NMI handler.
#[test]
fn scenario_nmi_preempts_wfi() {
    let mut pe = make_pe(non_secure_cfg());
    pe.device.write_halfwords(0x0010, 0xBF30, 0xBF00); // wfi; nop
    pe.nest.vtor_s = 0;
    pe.device.write_word(4 * 2, 0x0000_3001); // NMI vector -> 0x3000, thumb

    pe.state.pc = 0x0010;
    pe.state.xpsr = 1 << 24;
    pe.state.sp.msp_s = 0x1000;

    pe.step();
    assert!(pe.state.exit_cause.contains(ExitCause::WFI));
    assert_eq!(pe.state.pc, 0x0012);
    assert_eq!(pe.state.ipsr(), 0);

    pe.trigger_nmi();
    pe.step();

    assert_eq!(pe.state.ipsr(), 2);
    assert_eq!(pe.state.mode(), Mode::Handler);
    assert_eq!(pe.state.pc, 0x3000);
    assert_eq!(pe.state.sp.msp_s, 0x1000 - 0x20);
    assert!(pe.state.is_secure());
}

// Scenario 3: LDREX/STREX exclusive pair. The first STREX against a live
// reservation succeeds and clears the monitor; a second STREX with no
// preceding LDREX reports failure and leaves memory untouched.
#[test]
fn scenario_exclusive_load_store() {
    let mut pe = make_pe(non_secure_cfg());
    const ADDR: u32 = 0x0200;
    pe.device.write_word(ADDR, 0x1234_5678);

    // ldrex r1, [r0]
    pe.device.write_halfwords(0x0010, 0xE850, 0x1000);
    // strex r2, r3, [r0]  (expected to succeed)
    pe.device.write_halfwords(0x0014, 0xE840, 0x3200);
    // strex r2, r4, [r0]  (no live reservation: expected to fail)
    pe.device.write_halfwords(0x0018, 0xE840, 0x4200);

    pe.state.pc = 0x0010;
    pe.state.xpsr = 1 << 24;
    pe.state.r[0] = ADDR;
    pe.state.r[3] = 0xDEAD_BEEF;
    pe.state.r[4] = 0x1111_1111;

    pe.step();
    assert_eq!(pe.state.r[1], 0x1234_5678);
    assert_eq!(pe.state.pc, 0x0014);

    pe.step();
    assert_eq!(pe.state.r[2], 0);
    assert_eq!(pe.device.read_word(ADDR), 0xDEAD_BEEF);
    assert_eq!(pe.state.pc, 0x0018);

    pe.step();
    assert_eq!(pe.state.r[2], 1);
    assert_eq!(pe.device.read_word(ADDR), 0xDEAD_BEEF);
}

// Scenario 4: an IT block ("EQ, NE, EQ") steers three conditional MOVS
// instructions, once for each flag polarity.
fn run_it_block(z_flag: bool) -> u32 {
    let mut pe = make_pe(non_secure_cfg());
    pe.device.write_halfwords(0x0010, 0xBF0A, 0x2001); // it eq; moveq r0, #1
    pe.device.write_halfwords(0x0014, 0x2002, 0x2003); // movne r0, #2; moveq r0, #3

    pe.state.pc = 0x0010;
    pe.state.xpsr = (1 << 24) | if z_flag { 1 << 30 } else { 0 };

    for _ in 0..4 {
        pe.step();
    }
    assert_eq!(pe.state.pc, 0x0018);
    assert_eq!(armv8m_regs::it_state_from_xpsr(pe.state.xpsr), 0);
    pe.state.r[0]
}

#[test]
fn scenario_it_block_eq_path() {
    assert_eq!(run_it_block(true), 3);
}

#[test]
fn scenario_it_block_ne_path() {
    assert_eq!(run_it_block(false), 2);
}

// Scenario 5: SVC takes effect synchronously within the same step that
// executes it, stacking the instruction after it and composing the
// Thread+MSP, no-FP-frame EXC_RETURN value.
#[test]
fn scenario_svc_call() {
    let mut pe = make_pe(non_secure_cfg());
    pe.nest.shpr_s.0[armv8m_sim::excnum::SVCALL as usize] = 0x80;
    pe.device.write_word(4 * 11, 0x0000_1101); // SVCALL vector -> 0x1100, thumb
    pe.device.write_halfwords(0x0010, 0xDF42, 0xBF00); // svc #0x42; nop

    pe.state.pc = 0x0010;
    pe.state.xpsr = 1 << 24;
    pe.state.sp.msp_s = 0x2000;

    pe.step();

    assert_eq!(pe.state.ipsr(), 11);
    assert_eq!(pe.state.mode(), Mode::Handler);
    assert_eq!(pe.state.pc, 0x1100);
    assert_eq!(pe.state.lr, 0xFFFF_FFF9);

    let framed_ptr = pe.state.sp.msp_s;
    assert_eq!(framed_ptr, 0x2000 - 0x20);
    assert_eq!(pe.device.read_word(framed_ptr + 6 * 4), 0x0000_0012); // stacked return address
    let stacked_xpsr = pe.device.read_word(framed_ptr + 7 * 4);
    assert_eq!(stacked_xpsr & 0x1FF, 0); // RETPSR.EXCEPTION: thread mode before entry
}

// Scenario 6: a Non-secure instruction fetch landing inside a Secure,
// non-NSC SAU region raises SecureFault with SFSR.INVEP set, and the
// handler always runs Secure.
#[test]
fn scenario_illegal_ns_to_secure_fetch_raises_secure_fault() {
    let cfg = SimulatorConfig { security_extension: true, ..Default::default() };
    let mut pe = make_pe(cfg);

    pe.nest.sau_ctrl = armv8m_regs::sau::SauCtrl::ENABLE::SET.value;
    pe.nest.sau_regions[0] = armv8m_sim::nest::SauRegion {
        rbar: 0x0000_0000,
        rlar: 0x0000_0FE0 | armv8m_regs::sau::SauRlar::ENABLE::SET.value,
    };
    pe.device.write_halfwords(0x0100, 0xBF00, 0xBF00); // handler body: nop; nop
    pe.device.write_word(4 * 7, 0x0000_0101); // SecureFault vector -> 0x100, thumb

    pe.state.current_security = Security::NonSecure;
    pe.state.pc = 0x0200; // inside the Secure region: illegal for an NS fetch
    pe.state.xpsr = 1 << 24;
    pe.state.sp.msp_ns = 0x9000; // well outside the Secure region

    pe.step();

    assert_ne!(pe.nest.sfsr & armv8m_regs::scb::Sfsr::INVEP::SET.value, 0);
    assert_eq!(pe.state.ipsr(), 7);
    assert!(pe.state.is_secure());
    assert_eq!(pe.state.pc, 0x0100);
}
