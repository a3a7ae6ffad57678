// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `SysTickTimer`: the epoch-anchored real-time model.
//!
//! The counter is never ticked eagerly. Instead every read recomputes
//! the live value from an `epoch` instant plus the configured frequency,
//! and a background thread sleeps until the next era boundary to fire
//! the interrupt/count-flag callback at (approximately) the right wall
//! clock moment.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Frequency source selected by `CSR.CLKSOURCE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Internal,
    External,
}

#[derive(Debug, Clone)]
struct TimerConfig {
    enable: bool,
    tickint: bool,
    clksource: ClockSource,
    reload: u32,
    /// `CURRENT` at the moment `epoch` was last reset.
    initial_cur: u32,
    epoch: Instant,
    /// Era cursors: count-flag, interrupt-flag, and callback delivery
    /// each advance independently.
    era_count_flag: u64,
    era_int_flag: u64,
    era_callback: u64,
}

impl TimerConfig {
    fn freq(&self, internal_freq: u32, external_freq: u32) -> u32 {
        match self.clksource {
            ClockSource::Internal => internal_freq,
            ClockSource::External if external_freq != 0 => external_freq,
            ClockSource::External => internal_freq,
        }
    }

    /// Cycles elapsed since `epoch`, as of `now`, at the given frequency.
    fn cycles_since_epoch(&self, now: Instant, freq: u32) -> u64 {
        if freq == 0 || !self.enable {
            return 0;
        }
        let elapsed = now.saturating_duration_since(self.epoch);
        // Fixed point: whole cycles elapsed, rounding down.
        (elapsed.as_nanos() as u128 * freq as u128 / 1_000_000_000u128) as u64
    }

    /// `(current_value, era)` at `now`.
    fn sample(&self, now: Instant, freq: u32) -> (u32, u64) {
        let period = self.reload as u64 + 1;
        let cycles = self.cycles_since_epoch(now, freq);
        let offset_into_period = (self.reload as u64 + 1 - self.initial_cur as u64 + cycles)
            % period;
        let current = self.reload - offset_into_period as u32;
        let era = (self.reload as u64 + 1 - self.initial_cur as u64 + cycles) / period;
        (current, era)
    }

    fn deadline(&self, freq: u32) -> Option<Instant> {
        if freq == 0 || !self.enable {
            return None;
        }
        let period = self.reload as u64 + 1;
        let era_next = self.era_callback + 1;
        let cycles_to_fire = era_next * period - (period - self.initial_cur as u64);
        let nanos = (cycles_to_fire as u128 * 1_000_000_000u128 / freq as u128) as u64;
        Some(self.epoch + Duration::from_nanos(nanos))
    }
}

type Callback = Box<dyn FnMut() + Send + 'static>;

struct Shared {
    config: Mutex<TimerConfig>,
    callback: Mutex<Option<Callback>>,
    /// Held while a callback invocation is in flight, so that setting the
    /// callback to `None` can block until it is safe to drop.
    callback_running: Mutex<()>,
    wake: Condvar,
    wake_lock: Mutex<()>,
    shutdown: AtomicBool,
    internal_freq: AtomicU64,
    external_freq: AtomicU64,
}

/// The SysTick timer model. Owns a background deadline thread for the
/// lifetime of the value; drop it (or call [`SysTickTimer::shutdown`]) to
/// join that thread.
pub struct SysTickTimer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl SysTickTimer {
    pub fn new(internal_freq: u32, external_freq: u32) -> Self {
        let shared = Arc::new(Shared {
            config: Mutex::new(TimerConfig {
                enable: false,
                tickint: false,
                clksource: ClockSource::Internal,
                reload: 0,
                initial_cur: 0,
                epoch: Instant::now(),
                era_count_flag: 0,
                era_int_flag: 0,
                era_callback: 0,
            }),
            callback: Mutex::new(None),
            callback_running: Mutex::new(()),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            internal_freq: AtomicU64::new(internal_freq as u64),
            external_freq: AtomicU64::new(external_freq as u64),
        });

        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::spawn(move || Self::deadline_loop(worker_shared));

        SysTickTimer { shared, thread: Some(thread) }
    }

    fn freqs(shared: &Shared) -> (u32, u32) {
        (
            shared.internal_freq.load(Ordering::Relaxed) as u32,
            shared.external_freq.load(Ordering::Relaxed) as u32,
        )
    }

    fn deadline_loop(shared: Arc<Shared>) {
        loop {
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            let (internal, external) = Self::freqs(&shared);
            let deadline = {
                let cfg = shared.config.lock();
                cfg.deadline(cfg.freq(internal, external))
            };
            let mut guard = shared.wake_lock.lock();
            match deadline {
                None => {
                    shared.wake.wait(&mut guard);
                }
                Some(at) => {
                    let now = Instant::now();
                    if at > now {
                        let timed_out = shared
                            .wake
                            .wait_for(&mut guard, at - now)
                            .timed_out();
                        if !timed_out {
                            // Reconfigured; loop around and recompute.
                            continue;
                        }
                    }
                }
            }
            drop(guard);
            if shared.shutdown.load(Ordering::Acquire) {
                return;
            }
            let fired = {
                let (internal, external) = Self::freqs(&shared);
                let mut cfg = shared.config.lock();
                let freq = cfg.freq(internal, external);
                let (_, era) = cfg.sample(Instant::now(), freq);
                if era > cfg.era_callback {
                    cfg.era_callback = era;
                    cfg.tickint
                } else {
                    false
                }
            };
            if fired {
                let _running = shared.callback_running.lock();
                if let Some(cb) = shared.callback.lock().as_mut() {
                    cb();
                }
            }
        }
    }

    /// Reads `CSR.COUNTFLAG` and `CURRENT`, advancing the count-flag era
    /// cursor as a side effect of the read.
    pub fn read_current_and_countflag(&self) -> (u32, bool) {
        let (internal, external) = Self::freqs(&self.shared);
        let mut cfg = self.shared.config.lock();
        let freq = cfg.freq(internal, external);
        let (current, era) = cfg.sample(Instant::now(), freq);
        let fired = era > cfg.era_count_flag;
        cfg.era_count_flag = era;
        (current, fired)
    }

    /// `(ENABLE, TICKINT, CLKSOURCE == External)` as currently configured.
    pub fn csr_bits(&self) -> (bool, bool, bool) {
        let cfg = self.shared.config.lock();
        (cfg.enable, cfg.tickint, cfg.clksource == ClockSource::External)
    }

    /// The configured `RELOAD` value.
    pub fn reload(&self) -> u32 {
        self.shared.config.lock().reload
    }

    /// Consumes the interrupt-flag era cursor, reporting whether a new
    /// era boundary has been crossed since the last call.
    pub fn poll_interrupt_edge(&self) -> bool {
        let (internal, external) = Self::freqs(&self.shared);
        let mut cfg = self.shared.config.lock();
        let freq = cfg.freq(internal, external);
        let (_, era) = cfg.sample(Instant::now(), freq);
        let fired = era > cfg.era_int_flag;
        cfg.era_int_flag = era;
        fired
    }

    fn reset_epoch(cfg: &mut TimerConfig, current_value: u32) {
        cfg.epoch = Instant::now();
        cfg.initial_cur = current_value;
        cfg.era_count_flag = 0;
        cfg.era_int_flag = 0;
        cfg.era_callback = 0;
    }

    pub fn write_reload(&self, reload: u32) {
        let mut cfg = self.shared.config.lock();
        let (internal, external) = Self::freqs(&self.shared);
        let (current, _) = cfg.sample(Instant::now(), cfg.freq(internal, external));
        cfg.reload = reload;
        Self::reset_epoch(&mut cfg, current.min(reload));
        drop(cfg);
        self.shared.wake.notify_all();
    }

    pub fn write_current(&self, value: u32) {
        let mut cfg = self.shared.config.lock();
        Self::reset_epoch(&mut cfg, value);
        drop(cfg);
        self.shared.wake.notify_all();
    }

    pub fn set_enable(&self, enable: bool) {
        let mut cfg = self.shared.config.lock();
        let (internal, external) = Self::freqs(&self.shared);
        let (current, _) = cfg.sample(Instant::now(), cfg.freq(internal, external));
        cfg.enable = enable;
        Self::reset_epoch(&mut cfg, current);
        drop(cfg);
        self.shared.wake.notify_all();
    }

    pub fn set_tickint(&self, tickint: bool) {
        self.shared.config.lock().tickint = tickint;
        self.shared.wake.notify_all();
    }

    /// Forces the internal source on write when the external frequency is
    /// zero.
    pub fn set_clksource(&self, clksource: ClockSource) {
        let external_zero = self.shared.external_freq.load(Ordering::Relaxed) == 0;
        let mut cfg = self.shared.config.lock();
        cfg.clksource = if clksource == ClockSource::External && external_zero {
            ClockSource::Internal
        } else {
            clksource
        };
        self.shared.wake.notify_all();
    }

    /// Replaces the callback. Ordered with respect to any callback
    /// invocation already in flight: this blocks until that invocation
    /// returns before swapping in the new one. Callers
    /// must not hold `callback_running`'s lock themselves; only the
    /// deadline thread does.
    pub fn set_callback(&self, callback: Option<Callback>) {
        let _running = self.shared.callback_running.lock();
        *self.shared.callback.lock() = callback;
        self.shared.wake.notify_all();
    }

    pub fn shutdown(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.wake.notify_all();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SysTickTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_resets_era_cursors_and_clamps_current() {
        let timer = SysTickTimer::new(1_000_000, 0);
        timer.set_enable(true);
        timer.write_reload(999);
        let (current, flag) = timer.read_current_and_countflag();
        assert!(current <= 999);
        assert!(!flag);
    }

    #[test]
    fn clksource_forces_internal_when_external_is_zero() {
        let timer = SysTickTimer::new(1_000_000, 0);
        timer.set_clksource(ClockSource::External);
        timer.write_reload(100);
        let (internal, external) = SysTickTimer::freqs(&timer.shared);
        assert_eq!(timer.shared.config.lock().freq(internal, external), 1_000_000);
    }
}
