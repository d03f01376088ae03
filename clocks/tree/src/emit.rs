// Licensed under the Apache-2.0 license

//! Firmware source generation.
//!
//! Two routines are generated against an svd2rust-style register crate:
//!
//! - a dumper that reads every register field of every clock and prints it in
//!   the dump text format, so the output can be fed back to
//!   [`ClockManager::load_dump`];
//! - a loader that programs the hardware to the in-memory state.
//!
//! ## Write coalescing
//!
//! Several fields often share one physical register (a PLL's feedback divider
//! and bypass bit, a clock's mux and divider). Writing them one by one would
//! expose intermediate register states the hardware never expects, so the
//! loader merges all field writes per register:
//!
//! ```text
//! field writes ──group by (peripheral, register)──┬─ one whole write  → write(value)
//!                                                 ├─ only partials    → modify(mask, value)
//!                                                 └─ whole + anything → CoalesceConflict
//! ```
//!
//! Write-masked fields contribute a second, write-enable write (see
//! [`RegisterField::write_expr`](crate::RegisterField::write_expr)) which is
//! merged into the same modify.

use crate::config::EmitConfig;
use crate::error::{ClockError, ClockResult};
use crate::manager::{field_label, ClockManager};
use crate::node::FieldView;
use crate::register::{RegisterAddress, RegisterField, RegisterWrite};
use crate::util::{dedup_stable, hex_const};
use crate::Clock;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A field write tagged with the field it came from, e.g. `lpll.fbdiv`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledWrite {
    pub label: String,
    pub write: RegisterWrite,
}

/// The single operation a register group reduces to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Replace the whole register.
    Write { value: u32 },
    /// Replace the `mask` bits with `value`, keeping the rest.
    Modify { mask: u32, value: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoalescedWrite {
    pub address: RegisterAddress,
    pub op: WriteOp,
    /// Fields covered by this write, in collection order.
    pub labels: Vec<String>,
}

/// Merges field writes into one operation per register, ordered by
/// register address.
pub fn coalesce_writes(writes: &[LabeledWrite]) -> ClockResult<Vec<CoalescedWrite>> {
    let mut groups: BTreeMap<&RegisterAddress, Vec<&LabeledWrite>> = BTreeMap::new();
    for write in writes {
        groups.entry(&write.write.address).or_default().push(write);
    }
    groups
        .into_iter()
        .map(|(address, group)| coalesce_group(address, &group))
        .collect()
}

fn coalesce_group(address: &RegisterAddress, group: &[&LabeledWrite]) -> ClockResult<CoalescedWrite> {
    let labels = dedup_stable(group.iter().map(|w| w.label.clone()));
    let conflict = |labels: Vec<String>| ClockError::CoalesceConflict {
        register: address.to_string(),
        labels,
    };

    if group.iter().any(|w| w.write.whole) {
        return match group {
            [only] => Ok(CoalescedWrite {
                address: address.clone(),
                op: WriteOp::Write {
                    value: only.write.value,
                },
                labels,
            }),
            _ => Err(conflict(labels)),
        };
    }

    let mut mask = 0u32;
    let mut value = 0u32;
    let mut owners: Vec<(u32, &str)> = Vec::new();
    for w in group {
        let overlap = mask & w.write.mask;
        if value & overlap != w.write.value & overlap {
            let mut clashing: Vec<String> = owners
                .iter()
                .filter(|(bits, _)| bits & overlap != 0)
                .map(|(_, label)| label.to_string())
                .collect();
            clashing.push(w.label.clone());
            return Err(conflict(dedup_stable(clashing)));
        }
        mask |= w.write.mask;
        value |= w.write.value;
        owners.push((w.write.mask, w.label.as_str()));
    }

    Ok(CoalescedWrite {
        address: address.clone(),
        op: WriteOp::Modify { mask, value },
        labels,
    })
}

/// A register-bound field of one clock, with its label and child name.
struct BoundField<'a> {
    label: String,
    field: String,
    register: &'a RegisterField,
    value: Option<u32>,
}

/// Generates firmware source from a populated clock graph.
pub struct FirmwareEmitter<'a> {
    manager: &'a ClockManager,
    config: EmitConfig,
}

impl<'a> FirmwareEmitter<'a> {
    pub fn new(manager: &'a ClockManager, config: EmitConfig) -> Self {
        Self { manager, config }
    }

    pub fn config(&self) -> &EmitConfig {
        &self.config
    }

    fn bound_fields(&self, clock: &'a Clock) -> Vec<BoundField<'a>> {
        let mode = self.manager.config().gate_mode;
        let mut views: Vec<(Option<String>, FieldView<'a>)> = clock
            .direct_fields()
            .into_iter()
            .map(|view| (None, view))
            .collect();
        for (child, node) in clock.children(mode) {
            views.extend(node.fields().into_iter().map(|view| (Some(child.clone()), view)));
        }
        views
            .into_iter()
            .filter_map(|(child, view)| {
                let field = field_label(child.as_deref(), view.name);
                Some(BoundField {
                    label: format!("{}.{field}", clock.name),
                    field,
                    register: view.register?,
                    value: view.value,
                })
            })
            .collect()
    }

    /// Every field write the loader has to perform, in clock id order.
    /// Fields in excluded registers are left out.
    pub fn field_writes(&self) -> ClockResult<Vec<LabeledWrite>> {
        let mut writes = Vec::new();
        let mut skipped = BTreeSet::new();
        for clock in self.manager.clocks() {
            for bound in self.bound_fields(clock) {
                if self.config.is_excluded(&bound.register.register) {
                    skipped.insert(bound.register.register.clone());
                    continue;
                }
                let value = bound.value.ok_or_else(|| ClockError::UnsetField {
                    clock: clock.name.clone(),
                    field: bound.field.clone(),
                })?;
                writes.extend(
                    bound
                        .register
                        .write_expr(value)
                        .into_iter()
                        .map(|write| LabeledWrite {
                            label: bound.label.clone(),
                            write,
                        }),
                );
            }
        }
        for register in skipped {
            warn!("skipping writes to excluded register {register}");
        }
        Ok(writes)
    }

    /// The loader's register writes after coalescing.
    pub fn loader_writes(&self) -> ClockResult<Vec<CoalescedWrite>> {
        let writes = coalesce_writes(&self.field_writes()?)?;
        debug!("coalesced loader into {} register writes", writes.len());
        Ok(writes)
    }

    /// Source of a function printing the hardware clock state in dump
    /// format.
    pub fn generate_dumper(&self) -> String {
        DumperSource { emitter: self }.to_string()
    }

    /// Source of a function programming the in-memory clock state into
    /// hardware.
    pub fn generate_loader(&self) -> ClockResult<String> {
        let writes = self.loader_writes()?;
        Ok(LoaderSource {
            config: &self.config,
            writes: &writes,
        }
        .to_string())
    }
}

fn write_peripherals(
    f: &mut fmt::Formatter<'_>,
    crate_name: &str,
    peripherals: &BTreeSet<&str>,
) -> fmt::Result {
    for peripheral in peripherals {
        writeln!(
            f,
            "    let {peripheral} = unsafe {{ &*{crate_name}::{}::ptr() }};",
            peripheral.to_uppercase()
        )?;
    }
    if !peripherals.is_empty() {
        writeln!(f)?;
    }
    Ok(())
}

struct DumperSource<'e, 'a> {
    emitter: &'e FirmwareEmitter<'a>,
}

impl fmt::Display for DumperSource<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let emitter = self.emitter;
        let mode = emitter.manager.config().gate_mode;
        let clocks: Vec<_> = emitter.manager.clocks().collect();
        let peripherals: BTreeSet<&str> = clocks
            .iter()
            .flat_map(|&clock| emitter.bound_fields(clock))
            .map(|bound| bound.register.peripheral.as_str())
            .collect();

        writeln!(f, "// Generated by clocktool. Do not edit.")?;
        writeln!(f)?;
        writeln!(f, "pub fn {}() {{", emitter.config.dumper_fn)?;
        write_peripherals(f, &emitter.config.crate_name, &peripherals)?;
        for clock in clocks {
            writeln!(f, "    println!(\"{}:\");", clock.name)?;
            for view in clock.direct_fields() {
                if let Some(register) = view.register {
                    writeln!(
                        f,
                        "    println!(\"\\t{}:\\t\\t0x{{:x}}\", {});",
                        view.name,
                        register.read_expr()
                    )?;
                }
            }
            for (child, node) in clock.children(mode) {
                let views: Vec<_> = node
                    .fields()
                    .into_iter()
                    .filter_map(|view| Some((view.name, view.register?)))
                    .collect();
                if views.is_empty() {
                    continue;
                }
                writeln!(f, "    println!(\"|-{child}:\");")?;
                for (name, register) in views {
                    writeln!(
                        f,
                        "    println!(\"\\t\\t{name}:\\t\\t0x{{:x}}\", {});",
                        register.read_expr()
                    )?;
                }
            }
        }
        writeln!(f, "}}")
    }
}

struct LoaderSource<'c> {
    config: &'c EmitConfig,
    writes: &'c [CoalescedWrite],
}

impl fmt::Display for LoaderSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peripherals: BTreeSet<&str> = self
            .writes
            .iter()
            .map(|w| w.address.peripheral.as_str())
            .collect();

        writeln!(f, "// Generated by clocktool. Do not edit.")?;
        writeln!(f)?;
        writeln!(f, "pub fn {}() {{", self.config.loader_fn)?;
        write_peripherals(f, &self.config.crate_name, &peripherals)?;
        for write in self.writes {
            let target = format!(
                "{}.{}",
                write.address.peripheral,
                write.address.register.to_lowercase()
            );
            writeln!(f, "    // {}", write.labels.join(", "))?;
            match write.op {
                WriteOp::Write { value } => writeln!(
                    f,
                    "    {target}.write(|w| unsafe {{ w.bits({}) }});",
                    hex_const(value)
                )?,
                WriteOp::Modify { mask, value } => writeln!(
                    f,
                    "    {target}.modify(|r, w| unsafe {{ w.bits((r.bits() & !{}) | {}) }});",
                    hex_const(mask),
                    hex_const(value)
                )?,
            }
        }
        writeln!(f, "}}")
    }
}
