// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! ARM SysTick peripheral bitfields.
//!
//! The simulator's epoch-based timekeeping lives in
//! `armv8m-sim::systick_timer` and uses these only to interpret/produce
//! register-shaped `u32` values.

use tock_registers::register_bitfields;

register_bitfields![u32,
    pub ControlAndStatus [
        /// RO, clear-on-read: set if the counter reached 0 since this was
        /// last read.
        COUNTFLAG 16,
        /// 0 = external reference clock, 1 = processor clock.
        CLKSOURCE 2,
        /// Enables the SysTick exception request.
        TICKINT 1,
        ENABLE 0
    ],

    pub ReloadValue [
        RELOAD OFFSET(0) NUMBITS(24) []
    ],

    pub CurrentValue [
        CURRENT OFFSET(0) NUMBITS(24) []
    ],

    pub CalibrationValue [
        /// 0 if the device provides a reference clock to the processor.
        NOREF OFFSET(31) NUMBITS(1) [],
        /// 0 if TENMS is exact.
        SKEW  OFFSET(30) NUMBITS(1) [],
        TENMS OFFSET(0)  NUMBITS(24) []
    ]
];
