// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data Watchpoint and Trace unit bitfields.
//!
//! <https://developer.arm.com/documentation/100166/0001/Data-Watchpoint-and-Trace-Unit/DWT-Programmers--model>
//!
//! Only what the data-match pipeline and the free-running cycle counter
//! actually need is modeled: the control register, the cycle counter,
//! and up to four comparator/mask/function triples.

use tock_registers::register_bitfields;

/// Number of DWT comparators modeled (architectural maximum is
/// implementation-defined; four covers every Cortex-M33 part in practice).
pub const NUM_DWT_COMPARATORS: usize = 4;

register_bitfields![u32,
    pub DwtCtrl [
        NUMCOMP  OFFSET(28) NUMBITS(4) [],
        CYCCNTENA OFFSET(0) NUMBITS(1) []
    ],

    pub DwtFunction [
        /// Set when the comparator matches. Reading a DWT FUNCTION
        /// register clears MATCHED except when the reader is the core
        /// itself.
        MATCHED  OFFSET(24) NUMBITS(1) [],
        FUNCTION OFFSET(0)  NUMBITS(4) [
            Disabled  = 0b0000,
            MatchRead  = 0b0101,
            MatchWrite = 0b0110,
            MatchReadWrite = 0b0111
        ]
    ],

    pub DwtMask [
        MASK OFFSET(0) NUMBITS(5) []
    ]
];
