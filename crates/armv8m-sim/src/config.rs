// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Construction-time configuration.
//!
//! `SimulatorConfig` is a single well-defined collection of knobs that the
//! rest of the crate is generic over: plain data rather than an
//! associated-const trait, because one binary needs to support many
//! configurations without recompiling.

use thiserror::Error;

/// How many SysTick timers a configuration exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SysTickKind {
    #[default]
    None,
    Single,
    Dual,
}

/// Construction-time configuration for a [`crate::pe::Pe`].
///
/// Every field here is read-only after construction.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub main_extension: bool,
    pub security_extension: bool,
    pub fpb: bool,
    pub dwt: bool,
    pub itm: bool,
    pub fp_ext: bool,
    pub sys_tick: SysTickKind,
    pub halting_debug: bool,
    pub dsp_ext: bool,
    pub num_mpu_region_s: u8,
    pub num_mpu_region_ns: u8,
    pub num_sau_region: u8,
    pub max_exc: u16,
    pub initial_vtor: u32,
    pub isa_version: u8,
    pub syst_int_freq: u32,
    pub syst_ext_freq: u32,
    pub priority_bits: u32,
    /// `IMPL_DEF_OVERRIDDEN_EXCEPTIONS_PENDED`:
    /// whether a derived exception that loses a priority race during entry
    /// is left pending rather than dropped.
    pub pend_overridden_derived_exceptions: bool,
    /// `IMPL_DEF_EARLY_SG_CHECK`: check the SG-gateway
    /// requirement after fetching only the first halfword rather than
    /// after the full 32-bit fetch.
    pub early_sg_check: bool,
    /// `IMPL_DEF_LOCAL_MON_CHECK_ADDR`: whether the local
    /// monitor verifies the address range on an unchecked (size 0 disabled)
    /// exclusive access rather than trivially succeeding.
    pub local_monitor_checks_address: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            main_extension: true,
            security_extension: true,
            fpb: true,
            dwt: true,
            itm: false,
            fp_ext: false,
            sys_tick: SysTickKind::Single,
            halting_debug: true,
            dsp_ext: false,
            num_mpu_region_s: 8,
            num_mpu_region_ns: 8,
            num_sau_region: 8,
            max_exc: 48,
            initial_vtor: 0,
            isa_version: 8,
            syst_int_freq: 1_000_000,
            syst_ext_freq: 0,
            priority_bits: 3,
            pend_overridden_derived_exceptions: true,
            early_sg_check: true,
            local_monitor_checks_address: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("num_mpu_region_s out of range: {0} (max 16)")]
    MpuRegionS(u8),
    #[error("num_mpu_region_ns out of range: {0} (max 16)")]
    MpuRegionNs(u8),
    #[error("num_sau_region out of range: {0} (max 8)")]
    SauRegion(u8),
    #[error("priority_bits out of range: {0} (must be 3..=8 for Main, forced to 2 on Baseline)")]
    PriorityBits(u32),
    #[error("isa_version must be 7 or 8, got {0}")]
    IsaVersion(u8),
    #[error("max_exc must be < 512, got {0}")]
    MaxExc(u16),
    #[error("security_extension requires isa_version >= 8")]
    SecurityRequiresV8,
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_mpu_region_s > 16 {
            return Err(ConfigError::MpuRegionS(self.num_mpu_region_s));
        }
        if self.num_mpu_region_ns > 16 {
            return Err(ConfigError::MpuRegionNs(self.num_mpu_region_ns));
        }
        if self.num_sau_region > 8 {
            return Err(ConfigError::SauRegion(self.num_sau_region));
        }
        if self.main_extension && !(3..=8).contains(&self.priority_bits) {
            return Err(ConfigError::PriorityBits(self.priority_bits));
        }
        if self.isa_version != 7 && self.isa_version != 8 {
            return Err(ConfigError::IsaVersion(self.isa_version));
        }
        if self.max_exc >= 512 {
            return Err(ConfigError::MaxExc(self.max_exc));
        }
        if self.security_extension && self.isa_version < 8 {
            return Err(ConfigError::SecurityRequiresV8);
        }
        Ok(())
    }

    /// `PriorityBits()`: forced to 2 outside the Main extension regardless
    /// of the configured value.
    pub fn priority_bits(&self) -> u32 {
        if self.main_extension {
            self.priority_bits
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        SimulatorConfig::default().validate().unwrap();
    }

    #[test]
    fn baseline_forces_two_priority_bits() {
        let mut cfg = SimulatorConfig {
            main_extension: false,
            priority_bits: 2,
            ..SimulatorConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.priority_bits(), 2);

        cfg.priority_bits = 5;
        assert_eq!(cfg.validate(), Err(ConfigError::PriorityBits(5)));
    }

    #[test]
    fn security_without_v8_is_rejected() {
        let cfg = SimulatorConfig {
            isa_version: 7,
            security_extension: true,
            ..SimulatorConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::SecurityRequiresV8));
    }
}
