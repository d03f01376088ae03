// Licensed under the Apache-2.0 license

//! SoC clock-tree model.
//!
//! This crate models a clock distribution network (muxes, dividers,
//! fractional dividers, gates and PLLs) as a graph built from a flat
//! descriptor table, computes clock rates from the register state, and
//! converts that state to and from a text dump and generated firmware
//! source.
//!
//! ## Usage
//!
//! ```
//! use clock_tree::{ClockDescriptor, ClockManager, EmitConfig, FirmwareEmitter, ManagerConfig};
//!
//! let descriptors = vec![
//!     ClockDescriptor::new(0, "clk_24m<IO>", "IO_CLK"),
//!     ClockDescriptor::new(1, "clk_32k<IO>", "IO_CLK"),
//!     ClockDescriptor::new(2, "clk_uart0", "UART")
//!         .parents(&[0])
//!         .div("S33[6:0]")
//!         .gate("G9[0]"),
//! ];
//! let mut manager = ClockManager::build(&descriptors, ManagerConfig::with_defaults()).unwrap();
//!
//! manager
//!     .load_dump("clk_uart0:\n|-divider:\n\t\tdiv:\t\t0x1\n|-gate:\n\t\tdisable:\t\t0x0\n")
//!     .unwrap();
//! assert_eq!(manager.frequency_by_name("clk_uart0").unwrap(), Some(12_000_000.0));
//!
//! let loader = FirmwareEmitter::new(&manager, EmitConfig::default())
//!     .generate_loader()
//!     .unwrap();
//! assert!(loader.contains("cru.cru_clksel_con33.modify"));
//! ```
//!
//! ## Module Organization
//!
//! - [`register`]: Register fields, bit ranges and write descriptions
//! - [`shorthand`]: Parser for the short register specs in descriptors
//! - [`node`]: Gates, dividers, fractional dividers and muxes
//! - [`clock`]: Clocks and PLLs
//! - [`manager`]: Graph construction and frequency resolution ([`ClockManager`])
//! - [`dump`]: Text dump save and restore
//! - [`emit`]: Firmware dumper/loader generation and write coalescing
//! - [`config`]: Naming, graph and emission configuration
//! - [`descriptor`]: Descriptor table rows and inspection summaries

pub mod clock;
pub mod config;
pub mod descriptor;
pub mod dump;
pub mod emit;
pub mod manager;
pub mod node;
pub mod register;
pub mod shorthand;
pub mod util;

mod error;

pub use clock::{Clock, ClockId, ClockKind, Pll};
pub use config::{EmitConfig, GateMode, ManagerConfig, PllBypassOrder, RegisterNaming};
pub use descriptor::{ClockDescriptor, ClockSummary};
pub use emit::{coalesce_writes, CoalescedWrite, FirmwareEmitter, LabeledWrite, WriteOp};
pub use error::{ClockError, ClockResult};
pub use manager::{ClockManager, FieldEdit};
pub use register::{Bits, RegisterAddress, RegisterField, RegisterWrite};
