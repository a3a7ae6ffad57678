// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Floating-point context control bitfields (FPCCR/CPACR/NSACR).
//!
//! IEEE arithmetic itself is out of scope; only the lazy
//! stacking control state needed by `ExceptionEngine` is modeled here.

use tock_registers::register_bitfields;

register_bitfields![u32,
    pub Fpccr [
        /// Lazy state preservation active: a floating-point context is
        /// owed but has not yet been saved.
        LSPACT   OFFSET(0)  NUMBITS(1) [],
        /// The active floating-point context belongs to the handler, not
        /// a pre-empted thread.
        USER     OFFSET(1)  NUMBITS(1) [],
        /// Secure/Non-secure ownership of the current FP context.
        S        OFFSET(2)  NUMBITS(1) [],
        /// Whether the NS side is permitted to access this context.
        THREAD   OFFSET(3)  NUMBITS(1) [],
        HFRDY    OFFSET(4)  NUMBITS(1) [],
        MMRDY    OFFSET(5)  NUMBITS(1) [],
        BFRDY    OFFSET(6)  NUMBITS(1) [],
        SFRDY    OFFSET(7)  NUMBITS(1) [],
        MONRDY   OFFSET(8)  NUMBITS(1) [],
        SPLIMVIOL OFFSET(9) NUMBITS(1) [],
        UFRDY    OFFSET(10) NUMBITS(1) [],
        /// Reserve stack space for S16-S31 in addition to S0-S15.
        TS       OFFSET(26) NUMBITS(1) [],
        /// Clear S0-S15/FPSCR on exception return.
        CLRONRET OFFSET(27) NUMBITS(1) [],
        /// Treat CLRONRET/CLRONRETS bits as RAZ/WI unless set.
        CLRONRETS OFFSET(28) NUMBITS(1) [],
        /// Prevent Non-secure access to a Secure FP context.
        LSPENS   OFFSET(29) NUMBITS(1) [],
        /// Enable lazy context-save of FP state on exception entry.
        LSPEN    OFFSET(30) NUMBITS(1) [],
        ASPEN    OFFSET(31) NUMBITS(1) []
    ],

    pub Cpacr [
        CP10 OFFSET(20) NUMBITS(2) [],
        CP11 OFFSET(22) NUMBITS(2) []
    ],

    pub Nsacr [
        CP10 OFFSET(10) NUMBITS(1) [],
        CP11 OFFSET(11) NUMBITS(1) []
    ]
];
