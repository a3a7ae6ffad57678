// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! System Control Block bitfields (ICSR, AIRCR, CCR, SHCSR, CFSR/HFSR/DFSR).
//!
//! <http://infocenter.arm.com/help/index.jsp?topic=/com.arm.doc.dui0553a/CIHFDJCA.html>

use tock_registers::register_bitfields;

register_bitfields![u32,
    pub Cpuid [
        IMPLEMENTER OFFSET(24) NUMBITS(8) [],
        VARIANT     OFFSET(20) NUMBITS(4) [],
        ARCHITECTURE OFFSET(16) NUMBITS(4) [],
        PARTNO      OFFSET(4)  NUMBITS(12) [],
        REVISION    OFFSET(0)  NUMBITS(4) []
    ],

    pub Icsr [
        /// Set to pend an NMI; always reads as 0.
        NMIPENDSET OFFSET(31) NUMBITS(1) [],
        /// RW. Set to pend PendSV, clear to un-pend it.
        PENDSVSET  OFFSET(28) NUMBITS(1) [],
        PENDSVCLR  OFFSET(27) NUMBITS(1) [],
        /// RW. Set to pend SysTick, clear to un-pend it.
        PENDSTSET  OFFSET(26) NUMBITS(1) [],
        PENDSTCLR  OFFSET(25) NUMBITS(1) [],
        /// RO. Set if a pending exception will be serviced on exit from
        /// debug halt state.
        ISRPREEMPT OFFSET(23) NUMBITS(1) [],
        /// RO. Set if there is no active exception and the next exception
        /// taken will return to Thread mode.
        ISRPENDING OFFSET(22) NUMBITS(1) [],
        /// RO. Highest-priority pending exception number.
        VECTPENDING OFFSET(12) NUMBITS(9) [],
        /// RO. Set if returning from the current exception would pop the
        /// last active frame.
        RETTOBASE  OFFSET(11) NUMBITS(1) [],
        /// RO. Number of the currently active exception.
        VECTACTIVE OFFSET(0)  NUMBITS(9) []
    ],

    pub Aircr [
        /// Must be `0x05FA` on any write or the write is ignored.
        VECTKEY     OFFSET(16) NUMBITS(16) [],
        /// RO mirror of the write-side VECTKEY; reads back `0xFA05`.
        VECTKEYSTAT OFFSET(16) NUMBITS(16) [],
        /// 1 = big-endian data accesses outside the PPB.
        ENDIANNESS  OFFSET(15) NUMBITS(1) [],
        /// Secure only. Controls whether BusFault/HardFault/NMI target
        /// Secure or Non-secure.
        BFHFNMINS   OFFSET(13) NUMBITS(1) [],
        /// Binary point position for grouped vs. sub- priority.
        PRIGROUP    OFFSET(8)  NUMBITS(3) [],
        /// Secure only. Restricts Non-secure exception priorities to the
        /// lower half of the priority range.
        PRIS        OFFSET(14) NUMBITS(1) [],
        /// System reset request.
        SYSRESETREQ OFFSET(2)  NUMBITS(1) [],
        /// Clears all active state; implementation-defined support.
        VECTCLRACTIVE OFFSET(1) NUMBITS(1) []
    ],

    pub Ccr [
        /// Traps unaligned halfword/word accesses when set.
        UNALIGN_TRP   OFFSET(3) NUMBITS(1) [],
        /// Enables the default memory map for privileged accesses when no
        /// MPU region matches.
        PRIVDEFENA    OFFSET(2) NUMBITS(1) [],
        /// BusFault/HardFault/NMI handlers ignore precise data bus faults.
        BFHFNMIGN     OFFSET(8) NUMBITS(1) [],
        /// A stacking failure at or below `SPLIM` during entry at negative
        /// execution priority is ignored rather than raising UsageFault.
        STKOFHFNMIGN  OFFSET(10) NUMBITS(1) [],
        /// 8-byte stack alignment on exception entry.
        STKALIGN      OFFSET(9) NUMBITS(1) []
    ],

    pub Shcsr [
        MEMFAULTACT    OFFSET(0)  NUMBITS(1) [],
        BUSFAULTACT    OFFSET(1)  NUMBITS(1) [],
        HARDFAULTACT   OFFSET(2)  NUMBITS(1) [],
        USGFAULTACT    OFFSET(3)  NUMBITS(1) [],
        SECUREFAULTACT OFFSET(4)  NUMBITS(1) [],
        NMIACT         OFFSET(5)  NUMBITS(1) [],
        SVCALLACT      OFFSET(7)  NUMBITS(1) [],
        MONITORACT     OFFSET(8)  NUMBITS(1) [],
        PENDSVACT      OFFSET(10) NUMBITS(1) [],
        SYSTICKACT     OFFSET(11) NUMBITS(1) [],
        USGFAULTPENDED OFFSET(12) NUMBITS(1) [],
        MEMFAULTPENDED OFFSET(13) NUMBITS(1) [],
        BUSFAULTPENDED OFFSET(14) NUMBITS(1) [],
        SVCALLPENDED   OFFSET(15) NUMBITS(1) [],
        MEMFAULTENA    OFFSET(16) NUMBITS(1) [],
        BUSFAULTENA    OFFSET(17) NUMBITS(1) [],
        USGFAULTENA    OFFSET(18) NUMBITS(1) [],
        SECUREFAULTENA OFFSET(19) NUMBITS(1) [],
        SECUREFAULTPENDED OFFSET(20) NUMBITS(1) [],
        HARDFAULTPENDED OFFSET(21) NUMBITS(1) []
    ],

    /// MMFSR/BFSR/UFSR packed as one 32-bit CFSR, as the architecture
    /// defines it (byte 0 = MMFSR, byte 1 = BFSR, bytes 2..=3 = UFSR).
    pub Cfsr [
        // MMFSR, byte 0
        IACCVIOL    OFFSET(0)  NUMBITS(1) [],
        DACCVIOL    OFFSET(1)  NUMBITS(1) [],
        MUNSTKERR   OFFSET(3)  NUMBITS(1) [],
        MSTKERR     OFFSET(4)  NUMBITS(1) [],
        MLSPERR     OFFSET(5)  NUMBITS(1) [],
        MMARVALID   OFFSET(7)  NUMBITS(1) [],
        // BFSR, byte 1
        IBUSERR     OFFSET(8)  NUMBITS(1) [],
        PRECISERR   OFFSET(9)  NUMBITS(1) [],
        IMPRECISERR OFFSET(10) NUMBITS(1) [],
        UNSTKERR    OFFSET(11) NUMBITS(1) [],
        STKERR      OFFSET(12) NUMBITS(1) [],
        LSPERR      OFFSET(13) NUMBITS(1) [],
        BFARVALID   OFFSET(15) NUMBITS(1) [],
        // UFSR, bytes 2..=3
        UNDEFINSTR  OFFSET(16) NUMBITS(1) [],
        INVSTATE    OFFSET(17) NUMBITS(1) [],
        INVPC       OFFSET(18) NUMBITS(1) [],
        NOCP        OFFSET(19) NUMBITS(1) [],
        STKOF       OFFSET(20) NUMBITS(1) [],
        UNALIGNED   OFFSET(24) NUMBITS(1) [],
        DIVBYZERO   OFFSET(25) NUMBITS(1) []
    ],

    pub Hfsr [
        VECTTBL  OFFSET(1)  NUMBITS(1) [],
        FORCED   OFFSET(30) NUMBITS(1) [],
        DEBUGEVT OFFSET(31) NUMBITS(1) []
    ],

    pub Sfsr [
        INVEP    OFFSET(0) NUMBITS(1) [],
        INVIS    OFFSET(1) NUMBITS(1) [],
        INVER    OFFSET(2) NUMBITS(1) [],
        AUVIOL   OFFSET(3) NUMBITS(1) [],
        INVTRAN  OFFSET(4) NUMBITS(1) [],
        LSPERR   OFFSET(5) NUMBITS(1) [],
        SFARVALID OFFSET(6) NUMBITS(1) [],
        LSERR    OFFSET(7) NUMBITS(1) []
    ]
];

/// `AIRCR` write-key required by the architecture; writes with any other
/// value in bits `[31:16]` are ignored.
pub const AIRCR_VECTKEY: u32 = 0x05FA;
/// Read-back value of `AIRCR[31:16]`.
pub const AIRCR_VECTKEYSTAT: u32 = 0xFA05;

/// Base address of the Cortex-M CPUID register; exempt from the
/// Secure/Non-secure SCS alias split, always RO.
pub const CPUID_BASE: u32 = 0xE000_ED00;
