// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Security Attribution Unit bitfields.

use tock_registers::register_bitfields;

register_bitfields![u32,
    pub SauCtrl [
        /// When set, all memory not covered by an enabled region is treated
        /// as Non-secure instead of Secure.
        ALLNS  OFFSET(1) NUMBITS(1) [],
        ENABLE OFFSET(0) NUMBITS(1) []
    ],

    pub SauType [
        SREGION OFFSET(0) NUMBITS(8) []
    ],

    pub SauRnr [
        REGION OFFSET(0) NUMBITS(8) []
    ],

    pub SauRbar [
        BADDR OFFSET(5) NUMBITS(27) []
    ],

    pub SauRlar [
        LADDR OFFSET(5) NUMBITS(27) [],
        /// Non-secure Callable: the region is Secure but may be called from
        /// Non-secure state via `BLXNS`/`SG`.
        NSC   OFFSET(1) NUMBITS(1) [],
        ENABLE OFFSET(0) NUMBITS(1) []
    ]
];

/// Result of classifying an address through SAU + IDAU: the
/// `security_check` return shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityAttribution {
    pub ns: bool,
    pub nsc: bool,
    pub sregion: u8,
    pub srvalid: bool,
    pub iregion: u8,
    pub irvalid: bool,
}

/// Fixed address windows that are exempt from SAU/IDAU classification and
/// inherit the requester's own security state.
pub const EXEMPT_WINDOWS: [(u32, u32); 4] = [
    (0xE000_0000, 0xE000_1000),
    (0xE002_0000, 0xE002_1000),
    (0xE004_0000, 0xE004_1000),
    (0xE00F_F000, 0xE010_0000),
];

pub fn is_exempt_window(addr: u32) -> bool {
    EXEMPT_WINDOWS.iter().any(|&(lo, hi)| addr >= lo && addr < hi)
}
