// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single-PE ARMv8-M instruction-set simulator core.
//!
//! This crate models the architecturally visible behavior of a single
//! Cortex-M-class processing element: the top-level stepping loop, the
//! exception entry/return state machine, the memory/SAU/MPU/monitor
//! pipeline, the banked system-control register file, and the SysTick
//! timer's epoch-based timekeeping. The full Thumb decode/execute table,
//! the host bus backend, floating-point arithmetic proper, and
//! debug-probe transport are out of scope and are modeled
//! here only at their seams: [`device::Device`], a representative slice
//! of [`decode`], and the `Pe::debug_load`/`Pe::debug_store` entry
//! points.

pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod exceptions;
pub mod excnum;
pub mod mailbox;
pub mod memory;
pub mod monitor;
pub mod nest;
pub mod pe;
pub mod scs;
pub mod state;
pub mod systick_timer;

pub use config::{ConfigError, SimulatorConfig, SysTickKind};
pub use device::{AccessSize, AccessType, AddressDescriptor, BusError, DebugPins, Device, IdauResult};
pub use error::{DebugError, ExcInfo, Fault, InternalAbort};
pub use mailbox::InterruptMailbox;
pub use pe::Pe;
pub use state::{ExitCause, Mode, Security};
