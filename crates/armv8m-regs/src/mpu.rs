// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memory Protection Unit bitfields for the Armv8-M architecture.
//!
//! Field layout mirrors the real MPU_TYPE/MPU_CTRL/MPU_RNR/MPU_RBAR/MPU_RLAR/
//! MPU_MAIRn registers; one bank of these exists per security state.

use tock_registers::register_bitfields;

/// Smallest MPU region granule on Armv8-M; `BASE`/`LIMIT` are aligned to it.
pub const MPU_REGION_GRANULE: usize = 32;

register_bitfields![u32,
    pub MpuType [
        DREGION  OFFSET(8) NUMBITS(8) [],
        SEPARATE OFFSET(0) NUMBITS(1) []
    ],

    pub MpuCtrl [
        PRIVDEFENA OFFSET(2) NUMBITS(1) [],
        HFNMIENA   OFFSET(1) NUMBITS(1) [],
        ENABLE     OFFSET(0) NUMBITS(1) []
    ],

    pub MpuRnr [
        REGION OFFSET(0) NUMBITS(8) []
    ],

    pub MpuRbar [
        BASE OFFSET(5) NUMBITS(27) [],
        SH   OFFSET(3) NUMBITS(2) [],
        AP   OFFSET(1) NUMBITS(2) [
            ReadWritePrivilegedOnly = 0b00,
            ReadWrite = 0b01,
            ReadOnlyPrivilegedOnly = 0b10,
            ReadOnly = 0b11
        ],
        XN   OFFSET(0) NUMBITS(1) []
    ],

    pub MpuRlar [
        LIMIT OFFSET(5) NUMBITS(27) [],
        /// Index into MAIR0/MAIR1 (4 attribute slots per register).
        ATTRINDX OFFSET(1) NUMBITS(3) [],
        EN    OFFSET(0) NUMBITS(1) []
    ],

    pub MpuMair [
        ATTR3 OFFSET(24) NUMBITS(8) [],
        ATTR2 OFFSET(16) NUMBITS(8) [],
        ATTR1 OFFSET(8)  NUMBITS(8) [],
        ATTR0 OFFSET(0)  NUMBITS(8) []
    ]
];

/// Access permission outcome of a `(AP, priv, is_write)` permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPermission {
    pub read: bool,
    pub write: bool,
}

/// Resolves the `AP[1:0]` encoding into the concrete read/write grant for
/// the given privilege level.
pub fn access_permission(ap: u32, privileged: bool) -> AccessPermission {
    match (ap & 0b11, privileged) {
        (0b00, true) => AccessPermission { read: true, write: true },
        (0b00, false) => AccessPermission { read: false, write: false },
        (0b01, _) => AccessPermission { read: true, write: true },
        (0b10, true) => AccessPermission { read: true, write: false },
        (0b10, false) => AccessPermission { read: false, write: false },
        (0b11, _) => AccessPermission { read: true, write: false },
        _ => unreachable!("AP is masked to 2 bits"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_privileged_only_blocks_unprivileged() {
        let perm = access_permission(0b00, false);
        assert!(!perm.read && !perm.write);
    }

    #[test]
    fn read_write_grants_both_levels() {
        assert_eq!(access_permission(0b01, true), AccessPermission { read: true, write: true });
        assert_eq!(access_permission(0b01, false), AccessPermission { read: true, write: true });
    }

    #[test]
    fn read_only_never_grants_write() {
        assert!(!access_permission(0b11, true).write);
        assert!(!access_permission(0b11, false).write);
    }
}
