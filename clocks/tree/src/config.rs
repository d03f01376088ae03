// Licensed under the Apache-2.0 license

//! Configuration for graph construction, register naming and code emission.
//!
//! - [`RegisterNaming`] maps the short register prefixes used by clock
//!   descriptors (`S12[7:0]`, `PG3[1]`, ...) to full register names and
//!   peripheral blocks.
//! - [`ManagerConfig`] controls how the clock manager classifies descriptors
//!   and evaluates frequencies.
//! - [`EmitConfig`] controls the generated firmware source.
//!
//! All three default to the RK3399 layout.

use crate::register::Bits;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// A short register prefix and the register base name it expands to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterPrefix {
    pub short: String,
    pub base: String,
    /// Registers with this prefix use the high-half write-enable convention.
    pub write_mask: bool,
}

/// Renames a run of numbered registers onto a different base name.
///
/// Used where the register table numbers registers that the peripheral
/// description names differently, e.g. `PMUCRU_CLKSEL_CON6` is really
/// `PMUCRU_CLKFRAC_CON0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterRename {
    pub base: String,
    pub first: u32,
    pub last: u32,
    pub to_base: String,
    pub write_mask: bool,
}

/// Register naming rules for short-form register accessors.
///
/// # Example
///
/// ```
/// use clock_tree::config::RegisterNaming;
///
/// let naming = RegisterNaming::with_defaults();
/// assert_eq!(naming.full_name("S", "12").unwrap().0, "CRU_CLKSEL_CON12");
/// assert_eq!(naming.full_name("PS", "7").unwrap().0, "PMUCRU_CLKFRAC_CON1");
/// assert_eq!(naming.peripheral_of("PMUGRF_SOC_CON0").as_deref(), Some("pmugrf"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct RegisterNaming {
    pub prefixes: Vec<RegisterPrefix>,
    pub renames: Vec<RegisterRename>,
    /// Leading property markers, e.g. `GF_` for glitch-free muxes.
    pub glitch_free_marker: String,
    pub icg_marker: String,
    /// Prefix marking a fixed divisor instead of a register.
    pub fixed_marker: String,
    /// Literal marking a register-less clock inversion.
    pub invert_marker: String,
    /// Known peripheral blocks, lower case.
    pub peripherals: Vec<String>,
}

impl RegisterNaming {
    /// The RK3399 naming as used by its peripheral description file.
    pub fn with_defaults() -> Self {
        let prefix = |short: &str, base: &str| RegisterPrefix {
            short: short.to_string(),
            base: base.to_string(),
            write_mask: true,
        };
        Self {
            prefixes: vec![
                prefix("PS", "PMUCRU_CLKSEL_CON"),
                prefix("PG", "PMUCRU_CLKGATE_CON"),
                prefix("S", "CRU_CLKSEL_CON"),
                prefix("G", "CRU_CLKGATE_CON"),
                prefix("M", "CRU_MISC_CON"),
                prefix("GRF", "GRF_SOC_CON"),
                prefix("PMUGRF", "PMUGRF_SOC_CON"),
            ],
            renames: vec![RegisterRename {
                base: "PMUCRU_CLKSEL_CON".to_string(),
                first: 6,
                last: 7,
                to_base: "PMUCRU_CLKFRAC_CON".to_string(),
                write_mask: false,
            }],
            glitch_free_marker: "GF_".to_string(),
            icg_marker: "ICG_".to_string(),
            fixed_marker: "F".to_string(),
            invert_marker: "INVERT".to_string(),
            peripherals: ["cru", "pmucru", "grf", "pmugrf"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Add or replace a prefix mapping.
    pub fn add_prefix(mut self, short: &str, base: &str, write_mask: bool) -> Self {
        self.prefixes.retain(|p| p.short != short);
        self.prefixes.push(RegisterPrefix {
            short: short.to_string(),
            base: base.to_string(),
            write_mask,
        });
        self
    }

    pub fn add_peripheral(mut self, peripheral: &str) -> Self {
        self.peripherals.push(peripheral.to_lowercase());
        self
    }

    /// Expands a short prefix and register number into the full register
    /// name and whether that register uses a write mask.
    pub fn full_name(&self, short: &str, number: &str) -> Option<(String, bool)> {
        let prefix = self.prefixes.iter().find(|p| p.short == short)?;
        if let Ok(n) = number.parse::<u32>() {
            if let Some(rename) = self
                .renames
                .iter()
                .find(|r| r.base == prefix.base && (r.first..=r.last).contains(&n))
            {
                return Some((
                    format!("{}{}", rename.to_base, n - rename.first),
                    rename.write_mask,
                ));
            }
        }
        Some((format!("{}{}", prefix.base, number), prefix.write_mask))
    }

    /// Derives the peripheral block from a register name.
    ///
    /// The first `_`-separated segment is tried as-is, then with any
    /// trailing register number removed (`GRF5` -> `grf`).
    pub fn peripheral_of(&self, register: &str) -> Option<String> {
        let lower = register.to_lowercase();
        let head = lower.split('_').next()?;
        if self.peripherals.iter().any(|p| p == head) {
            return Some(head.to_string());
        }
        let trimmed = head.trim_end_matches(|c: char| c.is_ascii_digit());
        if trimmed != head && self.peripherals.iter().any(|p| p == trimmed) {
            return Some(trimmed.to_string());
        }
        None
    }
}

/// How a clock with several gates decides whether it is running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateMode {
    /// Gated if any gate is disabled; every gate appears in dumps.
    #[default]
    AllGates,
    /// Only the first gate is considered. Matches dumps written by older
    /// tooling that ignored the remaining gates.
    FirstOnly,
}

/// Where a PLL's bypass bit is evaluated relative to its work-mode mux.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PllBypassOrder {
    /// Bypass passes the reference through whatever the work mode selects.
    #[default]
    BeforeWorkMode,
    /// Bypass only applies when the work mode selects the PLL itself.
    AfterWorkMode,
}

/// Location of one PLL parameter within the PLL's `CON<n>` registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllFieldLayout {
    pub con: u8,
    pub bits: Bits,
    pub write_mask: bool,
}

impl PllFieldLayout {
    const fn masked(con: u8, bits: Bits) -> Self {
        Self {
            con,
            bits,
            write_mask: true,
        }
    }
}

/// Register layout shared by all PLLs of the SoC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PllLayout {
    pub fbdiv: PllFieldLayout,
    pub refdiv: PllFieldLayout,
    pub fracdiv: PllFieldLayout,
    pub dsmpd: PllFieldLayout,
    pub postdiv1: PllFieldLayout,
    pub postdiv2: PllFieldLayout,
    pub power_down: PllFieldLayout,
    pub bypass: PllFieldLayout,
    pub work_mode: PllFieldLayout,
}

impl Default for PllLayout {
    fn default() -> Self {
        Self {
            fbdiv: PllFieldLayout::masked(0, Bits::Range { high: 11, low: 0 }),
            bypass: PllFieldLayout::masked(0, Bits::Bit(15)),
            postdiv2: PllFieldLayout::masked(1, Bits::Range { high: 14, low: 12 }),
            postdiv1: PllFieldLayout::masked(1, Bits::Range { high: 10, low: 8 }),
            refdiv: PllFieldLayout::masked(1, Bits::Range { high: 5, low: 0 }),
            fracdiv: PllFieldLayout {
                con: 2,
                bits: Bits::Range { high: 23, low: 0 },
                write_mask: false,
            },
            work_mode: PllFieldLayout::masked(3, Bits::Range { high: 9, low: 8 }),
            dsmpd: PllFieldLayout::masked(3, Bits::Bit(3)),
            power_down: PllFieldLayout::masked(3, Bits::Bit(0)),
        }
    }
}

/// Configuration for building a clock graph from descriptors.
///
/// # Example
///
/// ```
/// use clock_tree::config::{GateMode, ManagerConfig};
///
/// let config = ManagerConfig::with_defaults()
///     .known_rate("clk_usbphy0_480m<PHY>", 480_000_000.0)
///     .gate_mode(GateMode::FirstOnly);
/// assert_eq!(config.known_rates["clk_24m<IO>"], 24_000_000.0);
/// ```
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    pub naming: RegisterNaming,
    /// Descriptor modules whose clocks are fixed-rate anchors.
    pub anchor_modules: Vec<String>,
    pub pll_module: String,
    /// Rates of well-known anchors, in Hz.
    pub known_rates: BTreeMap<String, f64>,
    /// Anchor used as the PLL slow-mode source.
    pub reference_clock: String,
    /// Anchor used as the PLL deep-sleep source.
    pub deep_sleep_clock: String,
    pub gate_mode: GateMode,
    pub pll_bypass_order: PllBypassOrder,
    pub pll_layout: PllLayout,
    /// PLLs whose registers live in the PMU clock unit.
    pub pmu_plls: BTreeSet<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ManagerConfig {
    pub const FIXED_24MHZ_CLKNAME: &'static str = "clk_24m<IO>";
    pub const FIXED_32KHZ_CLKNAME: &'static str = "clk_32k<IO>";

    pub fn with_defaults() -> Self {
        let mut known_rates = BTreeMap::new();
        known_rates.insert(Self::FIXED_24MHZ_CLKNAME.to_string(), 24_000_000.0);
        known_rates.insert(Self::FIXED_32KHZ_CLKNAME.to_string(), 32_768.0);
        Self {
            naming: RegisterNaming::with_defaults(),
            anchor_modules: vec!["IO_CLK".to_string()],
            pll_module: "PLL".to_string(),
            known_rates,
            reference_clock: Self::FIXED_24MHZ_CLKNAME.to_string(),
            deep_sleep_clock: Self::FIXED_32KHZ_CLKNAME.to_string(),
            gate_mode: GateMode::default(),
            pll_bypass_order: PllBypassOrder::default(),
            pll_layout: PllLayout::default(),
            pmu_plls: ["ppll".to_string()].into_iter().collect(),
        }
    }

    pub fn known_rate(mut self, name: &str, hz: f64) -> Self {
        self.known_rates.insert(name.to_string(), hz);
        self
    }

    pub fn anchor_module(mut self, module: &str) -> Self {
        self.anchor_modules.push(module.to_string());
        self
    }

    pub fn gate_mode(mut self, mode: GateMode) -> Self {
        self.gate_mode = mode;
        self
    }

    pub fn pll_bypass_order(mut self, order: PllBypassOrder) -> Self {
        self.pll_bypass_order = order;
        self
    }

    pub fn naming(mut self, naming: RegisterNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn is_anchor(&self, module: &str) -> bool {
        self.anchor_modules.iter().any(|m| m == module)
    }

    /// Register name of a PLL control word, e.g. `CRU_LPLL_CON1`.
    pub fn pll_register(&self, pll: &str, con: u8) -> String {
        let block = if self.pmu_plls.contains(pll) {
            "PMUCRU"
        } else {
            "CRU"
        };
        format!("{block}_{}_CON{con}", pll.to_uppercase())
    }
}

/// Configuration for the generated register dump and load routines.
///
/// # Example
///
/// ```
/// use clock_tree::config::EmitConfig;
///
/// let config = EmitConfig::new("rk3399_tools").exclude_register("CRU_CLKSEL_CON99");
/// assert!(config.is_excluded("cru_clksel_con99"));
/// assert!(!config.is_excluded("CRU_CLKSEL_CON98"));
/// ```
#[derive(Clone, Debug)]
pub struct EmitConfig {
    /// Register access crate the generated code links against.
    pub crate_name: String,
    pub dumper_fn: String,
    pub loader_fn: String,
    /// Registers the loader never writes, upper case.
    pub exclude_registers: BTreeSet<String>,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self::new("rk3399_tools")
    }
}

impl EmitConfig {
    pub fn new(crate_name: &str) -> Self {
        Self {
            crate_name: crate_name.to_string(),
            dumper_fn: "print_clocks".to_string(),
            loader_fn: "load_clocks".to_string(),
            exclude_registers: BTreeSet::new(),
        }
    }

    pub fn exclude_register(mut self, register: &str) -> Self {
        self.exclude_registers.insert(register.to_uppercase());
        self
    }

    pub fn is_excluded(&self, register: &str) -> bool {
        self.exclude_registers.contains(&register.to_uppercase())
    }
}
