// Licensed under the Apache-2.0 license

//! Optional TOML overrides for the built-in RK3399 configuration.
//!
//! ```toml
//! gate_mode = "first-only"
//! pll_bypass_order = "after-work-mode"
//! crate_name = "rk3399_pac"
//! exclude_registers = ["CRU_CLKSEL_CON99"]
//!
//! [known_rates]
//! "clk_usbphy0_480m<PHY>" = 480000000.0
//! ```

use anyhow::{Context, Result};
use clock_tree::{EmitConfig, GateMode, ManagerConfig, PllBypassOrder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Extra or replacement anchor rates, in Hz.
    pub known_rates: BTreeMap<String, f64>,
    /// Extra descriptor modules treated as anchors.
    pub anchor_modules: Vec<String>,
    pub gate_mode: Option<GateMode>,
    pub pll_bypass_order: Option<PllBypassOrder>,
    pub crate_name: Option<String>,
    pub exclude_registers: Vec<String>,
}

impl Settings {
    /// Reads `path`, or returns the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn manager_config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::with_defaults();
        for (name, hz) in &self.known_rates {
            config = config.known_rate(name, *hz);
        }
        for module in &self.anchor_modules {
            config = config.anchor_module(module);
        }
        if let Some(mode) = self.gate_mode {
            config = config.gate_mode(mode);
        }
        if let Some(order) = self.pll_bypass_order {
            config = config.pll_bypass_order(order);
        }
        config
    }

    /// Emission config with the configured exclusions plus `extra`.
    pub fn emit_config(&self, extra: &[String]) -> EmitConfig {
        let mut config = match &self.crate_name {
            Some(name) => EmitConfig::new(name),
            None => EmitConfig::default(),
        };
        for register in self.exclude_registers.iter().chain(extra) {
            config = config.exclude_register(register);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings, Settings::default());
        let config = settings.manager_config();
        assert_eq!(config.gate_mode, GateMode::AllGates);
        assert_eq!(settings.emit_config(&[]).crate_name, "rk3399_tools");
    }

    #[test]
    fn test_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
gate_mode = "first-only"
pll_bypass_order = "after-work-mode"
crate_name = "rk3399_pac"
exclude_registers = ["cru_clksel_con99"]
anchor_modules = ["PHY_CLK"]

[known_rates]
"clk_usbphy0_480m<PHY>" = 480000000.0
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        let config = settings.manager_config();
        assert_eq!(config.gate_mode, GateMode::FirstOnly);
        assert_eq!(config.pll_bypass_order, PllBypassOrder::AfterWorkMode);
        assert_eq!(config.known_rates["clk_usbphy0_480m<PHY>"], 480_000_000.0);
        assert_eq!(config.known_rates["clk_24m<IO>"], 24_000_000.0);
        assert!(config.is_anchor("PHY_CLK"));
        assert!(config.is_anchor("IO_CLK"));

        let emit = settings.emit_config(&["CRU_CLKGATE_CON1".to_string()]);
        assert_eq!(emit.crate_name, "rk3399_pac");
        assert!(emit.is_excluded("CRU_CLKSEL_CON99"));
        assert!(emit.is_excluded("CRU_CLKGATE_CON1"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gate_modes = \"first-only\"").unwrap();
        assert!(Settings::load(Some(file.path())).is_err());
    }
}
