// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bitfield layouts for the ARMv8-M system control space (SCS).
//!
//! Unlike a bare-metal HAL, nothing here is memory-mapped: the simulator
//! keeps each register as a plain `u32` (or a small array of them, for the
//! banked S/NS and per-region registers) and uses
//! [`tock_registers::LocalRegisterCopy`] purely as a bitfield view over that
//! storage. The field layouts themselves come straight from the
//! architecture reference and match what a real Cortex-M HAL exposes over
//! MMIO.

pub mod dcb;
pub mod dwt;
pub mod fpu;
pub mod mpu;
pub mod nvic;
pub mod sau;
pub mod scb;
pub mod systick;
pub mod xpsr;

pub use tock_registers::LocalRegisterCopy;
pub use xpsr::{it_state_from_xpsr, it_state_into_xpsr};
