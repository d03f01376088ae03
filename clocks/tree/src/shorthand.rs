// Licensed under the Apache-2.0 license

//! Parser for the short-form register accessors used in clock descriptors.
//!
//! ```text
//! spec     := accessor ('|' accessor)*
//! accessor := 'INVERT' | 'F' divisor | [prop] ['~'] PREFIX [NUM] [bits]
//! prop     := 'GF_' | 'ICG_'
//! bits     := '[' bit ']' | '[' high ':' low ']'
//! ```

use crate::config::RegisterNaming;
use crate::error::{ClockError, ClockResult};
use crate::register::{BitwiseOp, Bits, RegisterField, RegisterProp};

/// One parsed element of a register spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Accessor {
    Register(RegisterField),
    /// Compiled-in divisor with no register behind it.
    Fixed(u32),
    /// Clock inversion with no register behind it.
    Invert,
}

/// Parses a `|`-joined register spec belonging to `clock`.
pub fn parse_accessors(
    spec: &str,
    naming: &RegisterNaming,
    clock: &str,
) -> ClockResult<Vec<Accessor>> {
    spec.split('|')
        .map(|item| parse_accessor(item.trim(), naming, clock))
        .collect()
}

/// Parses a spec and keeps only the register accessors.
pub fn parse_registers(
    spec: &str,
    naming: &RegisterNaming,
    clock: &str,
) -> ClockResult<Vec<RegisterField>> {
    Ok(parse_accessors(spec, naming, clock)?
        .into_iter()
        .filter_map(|a| match a {
            Accessor::Register(field) => Some(field),
            _ => None,
        })
        .collect())
}

fn parse_accessor(item: &str, naming: &RegisterNaming, clock: &str) -> ClockResult<Accessor> {
    let malformed = |reason: &str| ClockError::MalformedSpec {
        clock: clock.to_string(),
        spec: item.to_string(),
        reason: reason.to_string(),
    };

    if item.is_empty() {
        return Err(malformed("empty accessor"));
    }
    if item == naming.invert_marker {
        return Ok(Accessor::Invert);
    }

    let (prop, rest) = if let Some(rest) = item.strip_prefix(naming.glitch_free_marker.as_str()) {
        (Some(RegisterProp::GlitchFree), rest)
    } else if let Some(rest) = item.strip_prefix(naming.icg_marker.as_str()) {
        (Some(RegisterProp::Icg), rest)
    } else {
        (None, item)
    };

    let (op, rest) = match rest.strip_prefix('~') {
        Some(rest) => (BitwiseOp::Not, rest),
        None => (BitwiseOp::None, rest),
    };

    let split = rest
        .find(|c: char| !(c.is_ascii_uppercase() || c == '_'))
        .unwrap_or(rest.len());
    let (short, rest) = rest.split_at(split);
    let split = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let (number, rest) = rest.split_at(split);

    if short.is_empty() {
        return Err(malformed("missing register prefix"));
    }

    if short == naming.fixed_marker {
        if prop.is_some() || op != BitwiseOp::None || !rest.is_empty() {
            return Err(malformed("fixed divisor cannot carry bits or modifiers"));
        }
        return match number.parse::<u32>() {
            Ok(0) => Err(malformed("fixed divisor must be non-zero")),
            Ok(divisor) => Ok(Accessor::Fixed(divisor)),
            Err(_) => Err(malformed("fixed divisor needs a number")),
        };
    }

    let bits = parse_bits(rest).ok_or_else(|| malformed("bad bit selector"))?;
    let (register, write_mask) = naming
        .full_name(short, number)
        .ok_or_else(|| malformed("unknown register prefix"))?;
    let peripheral = naming
        .peripheral_of(&register)
        .ok_or_else(|| malformed("register belongs to no known peripheral"))?;

    let field = RegisterField::new(&register, &peripheral, bits)?
        .with_op(op)
        .with_prop(prop);
    let field = if write_mask && !bits.is_whole() {
        field.with_write_mask()?
    } else {
        field
    };
    Ok(Accessor::Register(field))
}

fn parse_bits(text: &str) -> Option<Bits> {
    if text.is_empty() {
        return Some(Bits::Whole);
    }
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;
    match inner.split_once(':') {
        Some((high, low)) => Some(Bits::Range {
            high: high.parse().ok()?,
            low: low.parse().ok()?,
        }),
        None => Some(Bits::Bit(inner.parse().ok()?)),
    }
}
