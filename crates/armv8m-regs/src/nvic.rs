// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Nested Vectored Interrupt Controller bitfields.
//!
//! <https://developer.arm.com/docs/100165/0201/nested-vectored-interrupt-controller/nvic-programmers-model/table-of-nvic-registers>
//!
//! The real NVIC exposes one `u32` per 32 interrupts for ISER/ICER/ISPR/
//! ICPR/IABR and one byte per interrupt for IPR. The simulator keeps the
//! per-exception enable/active/pending state in `Pe`'s byte arrays and the
//! priority bytes in a flat `Vec<u8>` sized to `SimulatorConfig::max_exc`;
//! this module supplies only the bit arithmetic shared by both directions
//! of the ISER/ICER/ISPR/ICPR/IPR register views.

use tock_registers::register_bitfields;

register_bitfields![u32,
    pub NvicInterruptPriority [
        PRI_N3 OFFSET(24) NUMBITS(8) [],
        PRI_N2 OFFSET(16) NUMBITS(8) [],
        PRI_N1 OFFSET(8)  NUMBITS(8) [],
        PRI_N0 OFFSET(0)  NUMBITS(8) []
    ]
];

/// Index of the 32-interrupt-wide register bank and bit offset within it
/// for external interrupt `irq` (0-based, i.e. not including the fixed
/// system exceptions 0..16).
pub fn bank_and_bit(irq: u32) -> (usize, u32) {
    ((irq / 32) as usize, irq % 32)
}

/// Index of the byte holding `irq`'s priority within a flattened IPR array,
/// and which byte lane (0..=3) within the 32-bit register that byte
/// occupies -- mirrors `NvicInterruptPriority`'s `PRI_N{0..3}` layout so a
/// caller composing a 32-bit IPR read/write can reuse the same arithmetic
/// the real register uses.
pub fn ipr_byte_index(irq: u32) -> usize {
    irq as usize
}

/// Masks a raw priority byte down to the implemented `PriorityBits()`.
pub fn mask_priority(raw: u8, priority_bits: u32) -> u8 {
    debug_assert!((2..=8).contains(&priority_bits));
    let shift = 8 - priority_bits;
    (raw & (0xFFu8 << shift)) & 0xFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_and_bit_wraps_every_32() {
        assert_eq!(bank_and_bit(0), (0, 0));
        assert_eq!(bank_and_bit(31), (0, 31));
        assert_eq!(bank_and_bit(32), (1, 0));
        assert_eq!(bank_and_bit(240), (7, 16));
    }

    #[test]
    fn mask_priority_keeps_only_implemented_bits() {
        assert_eq!(mask_priority(0xFF, 3), 0xE0);
        assert_eq!(mask_priority(0xFF, 8), 0xFF);
        assert_eq!(mask_priority(0x3F, 2), 0x00);
    }
}
