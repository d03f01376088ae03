// Licensed under the Apache-2.0 license

//! Text dump of the register-derived clock state.
//!
//! ```text
//! lpll:
//! 	fbdiv:		0x14
//! 	postdiv2:		0x1
//! clk_uart2:
//! |-mux:
//! 		sel:		0x1
//! |-gate:
//! 		disable:		0x0
//! ```
//!
//! A block starts with `<clock>:`. Single-tab lines are fields of the clock
//! itself (PLL parameters). `|-<child>:` opens a child block whose fields
//! are indented with two tabs. Values are lower-case hex.

use crate::clock::{Clock, ClockIdx};
use crate::error::{ClockError, ClockResult};
use crate::manager::{apply_field, ClockManager};
use crate::node::FieldView;
use log::debug;
use std::fmt;

/// Borrowed dump of a manager's state; render with `to_string()`.
pub struct Dump<'a> {
    manager: &'a ClockManager,
}

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = self.manager.config.gate_mode;
        for clock in self.manager.clocks() {
            writeln!(f, "{}:", clock.name)?;
            for (name, value) in set_fields(clock.direct_fields()) {
                writeln!(f, "\t{name}:\t\t0x{value:x}")?;
            }
            for (child, node) in clock.children(mode) {
                let fields: Vec<_> = set_fields(node.fields()).collect();
                if fields.is_empty() {
                    continue;
                }
                writeln!(f, "|-{child}:")?;
                for (name, value) in fields {
                    writeln!(f, "\t\t{name}:\t\t0x{value:x}")?;
                }
            }
        }
        Ok(())
    }
}

fn set_fields(views: Vec<FieldView<'_>>) -> impl Iterator<Item = (&'static str, u32)> + '_ {
    views
        .into_iter()
        .filter_map(|view| view.value.map(|value| (view.name, value)))
}

/// One classified dump line.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Blank,
    Clock(&'a str),
    Child(&'a str),
    DirectField(&'a str, u32),
    ChildField(&'a str, u32),
}

fn parse_line(line: &str) -> ClockResult<Line<'_>> {
    let syntax = || ClockError::DumpSyntax {
        text: line.to_string(),
    };

    if line.trim().is_empty() {
        return Ok(Line::Blank);
    }
    if let Some(rest) = line.strip_prefix("\t\t") {
        let (name, value) = parse_field(rest).ok_or_else(syntax)?;
        return Ok(Line::ChildField(name, value));
    }
    if let Some(rest) = line.strip_prefix('\t') {
        let (name, value) = parse_field(rest).ok_or_else(syntax)?;
        return Ok(Line::DirectField(name, value));
    }
    if let Some(rest) = line.strip_prefix("|-") {
        let name = rest.trim_end().strip_suffix(':').ok_or_else(syntax)?;
        if !is_name(name) {
            return Err(syntax());
        }
        return Ok(Line::Child(name));
    }
    let name = line.trim_end().strip_suffix(':').ok_or_else(syntax)?;
    if !is_name(name) {
        return Err(syntax());
    }
    Ok(Line::Clock(name))
}

/// `name:<whitespace>0x<hex>`
fn parse_field(text: &str) -> Option<(&str, u32)> {
    let (name, value) = text.split_once(':')?;
    if !is_name(name) {
        return None;
    }
    let hex = value.trim().strip_prefix("0x")?;
    Some((name, u32::from_str_radix(hex, 16).ok()?))
}

fn is_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(char::is_whitespace) && !name.contains(':')
}

impl ClockManager {
    pub fn dump(&self) -> Dump<'_> {
        Dump { manager: self }
    }

    /// Serializes every clock's register-derived state.
    pub fn save_dump(&self) -> String {
        self.dump().to_string()
    }

    /// Restores state from dump text. Either every line applies or the
    /// graph is left unchanged.
    pub fn load_dump(&mut self, text: &str) -> ClockResult<()> {
        let mode = self.config.gate_mode;
        let mut staged = self.clocks.clone();
        let mut current: Option<ClockIdx> = None;
        let mut child: Option<&str> = None;
        let mut applied = 0usize;

        for (index, line) in text.lines().enumerate() {
            let at_line = |err: ClockError| err.at_line(index + 1);
            match parse_line(line).map_err(at_line)? {
                Line::Blank => {}
                Line::Clock(name) => {
                    current = Some(self.index_of(name).map_err(at_line)?);
                    child = None;
                }
                Line::Child(name) => {
                    let clock = current_clock(&staged, current).map_err(at_line)?;
                    if !clock.has_child(name, mode) {
                        return Err(at_line(ClockError::UnknownChild {
                            clock: clock.name.clone(),
                            child: name.to_string(),
                        }));
                    }
                    child = Some(name);
                }
                Line::DirectField(field, value) => {
                    let idx = current.ok_or(ClockError::NoCurrentClock).map_err(at_line)?;
                    apply_field(&mut staged[idx], None, field, value, mode).map_err(at_line)?;
                    applied += 1;
                }
                Line::ChildField(field, value) => {
                    let idx = current.ok_or(ClockError::NoCurrentClock).map_err(at_line)?;
                    let name = child
                        .ok_or_else(|| ClockError::NoCurrentChild {
                            clock: staged[idx].name.clone(),
                        })
                        .map_err(at_line)?;
                    apply_field(&mut staged[idx], Some(name), field, value, mode)
                        .map_err(at_line)?;
                    applied += 1;
                }
            }
        }

        self.clocks = staged;
        debug!("restored {applied} register fields from dump");
        Ok(())
    }
}

fn current_clock(clocks: &[Clock], current: Option<ClockIdx>) -> ClockResult<&Clock> {
    current
        .map(|idx| &clocks[idx])
        .ok_or(ClockError::NoCurrentClock)
}
