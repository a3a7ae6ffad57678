// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Debug Control Block bitfields (DHCSR/DEMCR), matching `ARM DDI 0403E.e`.

use tock_registers::register_bitfields;

register_bitfields![u32,
    pub Dhcsr [
        DBGKEY     OFFSET(16) NUMBITS(16) [],
        S_RESET_ST OFFSET(25) NUMBITS(1) [],
        S_RETIRE_ST OFFSET(24) NUMBITS(1) [],
        /// Set when the PE is locked up.
        S_LOCKUP   OFFSET(19) NUMBITS(1) [],
        S_SLEEP    OFFSET(18) NUMBITS(1) [],
        S_HALT     OFFSET(17) NUMBITS(1) [],
        S_REGREADY OFFSET(16) NUMBITS(1) [],
        C_STEP     OFFSET(2)  NUMBITS(1) [],
        C_HALT     OFFSET(1)  NUMBITS(1) [],
        C_DEBUGEN  OFFSET(0)  NUMBITS(1) []
    ],

    pub Demcr [
        TRCENA   OFFSET(24) NUMBITS(1) [],
        MON_REQ  OFFSET(19) NUMBITS(1) [],
        MON_STEP OFFSET(18) NUMBITS(1) [],
        MON_PEND OFFSET(17) NUMBITS(1) [],
        MON_EN   OFFSET(16) NUMBITS(1) [],
        VC_HARDERR OFFSET(10) NUMBITS(1) []
    ]
];

/// Debug-key write-gate for DHCSR, analogous to AIRCR's VECTKEY.
pub const DHCSR_DBGKEY: u32 = 0xA05F;
