// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `InterruptMailbox`: the thread-safe shim the harness
//! uses to inject NMI/external interrupts and external-interrupt wake
//! events into the single-threaded [`crate::pe::Pe`].
//!
//! The PE interpreter itself is never called concurrently; this type is
//! the one piece of the crate whose whole job is serializing access to it
//! from other threads. A full mutex stands in for an interrupt-disable
//! primitive, since there is no bare-metal critical section to borrow.

use parking_lot::{Condvar, Mutex};

use crate::device::Device;
use crate::pe::Pe;

/// Serializes `Pe::step`/`trigger_*` calls from multiple threads and
/// provides `wait_for_interrupt` for a harness thread to block on.
pub struct InterruptMailbox<D: Device> {
    pe: Mutex<Pe<D>>,
    wake: Condvar,
}

impl<D: Device> InterruptMailbox<D> {
    pub fn new(pe: Pe<D>) -> Self {
        InterruptMailbox { pe: Mutex::new(pe), wake: Condvar::new() }
    }

    pub fn step(&self) {
        let mut pe = self.pe.lock();
        pe.step();
        self.wake.notify_all();
    }

    pub fn trigger_nmi(&self) {
        let mut pe = self.pe.lock();
        pe.trigger_nmi();
        self.wake.notify_all();
    }

    pub fn trigger_ext_int(&self, irq: u16) {
        let mut pe = self.pe.lock();
        pe.trigger_ext_int(irq);
        self.wake.notify_all();
    }

    /// Blocks the calling (harness) thread until an interrupt is pending
    /// at a priority the PE would actually take, ignoring PRIMASK.
    pub fn wait_for_interrupt(&self) {
        let mut pe = self.pe.lock();
        loop {
            if pe.is_exception_pending(true) {
                return;
            }
            self.wake.wait(&mut pe);
        }
    }

    pub fn with_pe<R>(&self, f: impl FnOnce(&mut Pe<D>) -> R) -> R {
        let mut pe = self.pe.lock();
        f(&mut pe)
    }
}
