// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The `Device` trait and the address-descriptor flags passed across it.
//! This is the one interface the embedder must supply; everything else
//! in this crate is a concrete type.

use bitflags::bitflags;
use thiserror::Error;

/// Size of a bus transfer in bytes. Always 1, 2, or 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    Byte = 1,
    Half = 2,
    Word = 4,
}

impl AccessSize {
    pub fn bytes(self) -> u32 {
        self as u32
    }
}

/// What kind of access this is, for permission/fault attribution
/// (STACK/LAZYFP/NORMAL/ORDERED/VECTABLE/IFETCH).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    IFetch,
    Normal,
    Ordered,
    Stack,
    LazyFp,
    VecTable,
}

bitflags! {
    /// Encodes the full `AddressDescriptor` the architecture passes
    /// alongside a bus transfer: privilege, security, device/normal and its
    /// sub-type, shareability, and transient hints.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        const PRIVILEGED = 1 << 0;
        const SECURE     = 1 << 1;
        const WRITE      = 1 << 2;
        /// Set for Device memory, clear for Normal memory.
        const DEVICE     = 1 << 3;
        /// Device sub-type is nGnRnE rather than nGnRE (only meaningful
        /// when `DEVICE` is set).
        const DEVICE_NGNRNE = 1 << 4;
        const SHAREABLE  = 1 << 5;
        const TRANSIENT  = 1 << 6;
        /// Inner-cacheable hint for Normal memory.
        const INNER_CACHEABLE = 1 << 7;
        /// Outer-cacheable hint for Normal memory.
        const OUTER_CACHEABLE = 1 << 8;
    }
}

/// Fully resolved description of one bus transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDescriptor {
    pub access_type: AccessType,
    pub flags: AccessFlags,
}

/// Error surface of the `Device` trait. This is the one fallible boundary
/// the embedder controls directly; every other failure the crate produces
/// is an architectural `ExcInfo`, not a Rust error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("bus access to unmapped or unresponsive device")]
    NoResponse,
    #[error("bus access rejected by device-specific decode logic")]
    Decode,
}

/// Bitset describing `DBGEN|NIDEN|SPIDEN|SPNIDEN`, as returned by
/// [`Device::debug_pins`].
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugPins: u32 {
        const DBGEN   = 1 << 0;
        const NIDEN   = 1 << 1;
        const SPIDEN  = 1 << 2;
        const SPNIDEN = 1 << 3;
    }
}

/// Result of classifying an address through the IDAU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdauResult {
    pub exempt: bool,
    pub ns: bool,
    pub nsc: bool,
    pub iregion: u8,
    pub irvalid: bool,
}

/// The embedder-supplied memory/peripheral backend. Required of every
/// `Pe`; the simulator core never assumes anything about
/// what lies behind it beyond this contract.
pub trait Device {
    /// Loads `size` bytes at `phys_addr`. `val` is written zero-extended
    /// to 32 bits regardless of `size`.
    fn load(
        &mut self,
        phys_addr: u32,
        size: AccessSize,
        desc: AddressDescriptor,
    ) -> Result<u32, BusError>;

    /// Stores the low `size` bytes of `val` at `phys_addr`.
    fn store(
        &mut self,
        phys_addr: u32,
        size: AccessSize,
        desc: AddressDescriptor,
        val: u32,
    ) -> Result<(), BusError>;

    /// Classifies `addr` through the Implementation Defined Attribution
    /// Unit, ahead of (and ANDed with) the SAU result.
    fn idau_check(&self, addr: u32, is_ifetch: bool) -> IdauResult;

    /// Current state of the four debug-enable pins.
    fn debug_pins(&self) -> DebugPins;
}
