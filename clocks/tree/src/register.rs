// Licensed under the Apache-2.0 license

//! Symbolic register fields.
//!
//! A [`RegisterField`] names a physical register inside a peripheral block
//! and the bits of it a clock node owns. It converts between raw register
//! words and field values, and describes the writes needed to program a
//! field value back into hardware.
//!
//! Rockchip-style clock registers only latch the low 16 bits when the
//! matching bit in the high 16 bits is set in the same write. Fields living
//! in such registers carry `write_mask`, and [`RegisterField::write_expr`]
//! returns the extra write-enable half alongside the data.

use crate::error::{ClockError, ClockResult};
use std::fmt;

/// Position of the write-enable half in write-masked registers.
pub const WRITE_MASK_SHIFT: u8 = 16;

/// The bits of a register that a field occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bits {
    /// The field is the entire 32-bit register.
    Whole,
    /// A single bit.
    Bit(u8),
    /// An inclusive `high:low` range.
    Range { high: u8, low: u8 },
}

impl Bits {
    pub fn low(&self) -> u8 {
        match *self {
            Bits::Whole => 0,
            Bits::Bit(bit) => bit,
            Bits::Range { low, .. } => low,
        }
    }

    pub fn high(&self) -> u8 {
        match *self {
            Bits::Whole => 31,
            Bits::Bit(bit) => bit,
            Bits::Range { high, .. } => high,
        }
    }

    pub fn width(&self) -> u8 {
        self.high() - self.low() + 1
    }

    pub fn is_whole(&self) -> bool {
        matches!(self, Bits::Whole)
    }

    /// Mask of the field value, not shifted into register position.
    pub fn value_mask(&self) -> u32 {
        if self.width() >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width()) - 1
        }
    }

    /// Mask of the field within the register word.
    pub fn register_mask(&self) -> u32 {
        self.value_mask() << self.low()
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            Bits::Whole => Ok(()),
            Bits::Bit(bit) if bit > 31 => Err(format!("bit {bit} is outside a 32-bit register")),
            Bits::Bit(_) => Ok(()),
            Bits::Range { high, low } if high <= low => {
                Err(format!("bit range {high}:{low} must be ordered high:low"))
            }
            Bits::Range { high, .. } if high > 31 => {
                Err(format!("bit {high} is outside a 32-bit register"))
            }
            Bits::Range { .. } => Ok(()),
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bits::Whole => Ok(()),
            Bits::Bit(bit) => write!(f, "[{bit}]"),
            Bits::Range { high, low } => write!(f, "[{high}:{low}]"),
        }
    }
}

/// Unary transform applied to the field value when reading and writing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BitwiseOp {
    #[default]
    None,
    /// The register holds the bitwise inverse of the field value.
    Not,
}

/// Annotations carried by the short-form register accessors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterProp {
    GlitchFree,
    Icg,
}

/// Physical register identity: peripheral block plus register name.
///
/// Ordering is lexicographic on (peripheral, register) so that anything
/// keyed by it iterates reproducibly.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterAddress {
    pub peripheral: String,
    pub register: String,
}

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.peripheral, self.register)
    }
}

/// One write a field contributes to its register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterWrite {
    pub address: RegisterAddress,
    /// Value already shifted into register position.
    pub value: u32,
    /// Register bits this write owns.
    pub mask: u32,
    /// Whether this write replaces the entire register.
    pub whole: bool,
    /// True for the write-enable half of a write-masked field.
    pub write_enable: bool,
}

/// A field of a named hardware register.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterField {
    /// Full register name, e.g. `CRU_CLKSEL_CON12`.
    pub register: String,
    /// Lower-case peripheral block the register belongs to, e.g. `cru`.
    pub peripheral: String,
    pub bits: Bits,
    pub op: BitwiseOp,
    pub prop: Option<RegisterProp>,
    /// The register only latches the low half when the high half enables it.
    pub write_mask: bool,
}

impl RegisterField {
    pub fn new(register: &str, peripheral: &str, bits: Bits) -> ClockResult<Self> {
        bits.validate()
            .map_err(|reason| ClockError::InvalidRegisterField {
                register: register.to_string(),
                reason,
            })?;
        Ok(Self {
            register: register.to_string(),
            peripheral: peripheral.to_string(),
            bits,
            op: BitwiseOp::None,
            prop: None,
            write_mask: false,
        })
    }

    pub fn with_op(mut self, op: BitwiseOp) -> Self {
        self.op = op;
        self
    }

    pub fn with_prop(mut self, prop: Option<RegisterProp>) -> Self {
        self.prop = prop;
        self
    }

    /// Marks the field as needing a write-enable mask in the high half.
    ///
    /// Fails when the data bits reach into the high half, which includes
    /// whole-register fields.
    pub fn with_write_mask(mut self) -> ClockResult<Self> {
        if self.bits.high() >= WRITE_MASK_SHIFT {
            return Err(ClockError::InvalidRegisterField {
                register: self.register.clone(),
                reason: format!(
                    "write-masked field {} extends past bit {}",
                    self.bits,
                    WRITE_MASK_SHIFT - 1
                ),
            });
        }
        self.write_mask = true;
        Ok(self)
    }

    pub fn address(&self) -> RegisterAddress {
        RegisterAddress {
            peripheral: self.peripheral.clone(),
            register: self.register.clone(),
        }
    }

    /// True if `value` can be represented in this field.
    pub fn fits(&self, value: u32) -> bool {
        value & !self.bits.value_mask() == 0
    }

    /// Extracts the field value from a raw register word.
    pub fn decode(&self, raw: u32) -> u32 {
        let mask = self.bits.value_mask();
        let value = (raw >> self.bits.low()) & mask;
        match self.op {
            BitwiseOp::None => value,
            BitwiseOp::Not => !value & mask,
        }
    }

    /// Places a field value into register position.
    pub fn encode(&self, value: u32) -> u32 {
        let mask = self.bits.value_mask();
        let value = match self.op {
            BitwiseOp::None => value & mask,
            BitwiseOp::Not => !value & mask,
        };
        value << self.bits.low()
    }

    /// The writes needed to program `value`: the data write, followed by the
    /// write-enable write when the register uses a write mask.
    pub fn write_expr(&self, value: u32) -> Vec<RegisterWrite> {
        let mut writes = vec![RegisterWrite {
            address: self.address(),
            value: self.encode(value),
            mask: self.bits.register_mask(),
            whole: self.bits.is_whole(),
            write_enable: false,
        }];
        if self.write_mask {
            let enable = self.bits.register_mask() << WRITE_MASK_SHIFT;
            writes.push(RegisterWrite {
                address: self.address(),
                value: enable,
                mask: enable,
                whole: false,
                write_enable: true,
            });
        }
        writes
    }

    /// Rust expression reading this field through an svd2rust-style
    /// peripheral handle bound to `self.peripheral`.
    pub fn read_expr(&self) -> String {
        let read = format!("{}.{}.read().bits()", self.peripheral, self.register.to_lowercase());
        let read = match self.op {
            BitwiseOp::None => read,
            BitwiseOp::Not => format!("(!{read})"),
        };
        match self.bits {
            Bits::Whole => read,
            bits if bits.low() == 0 => format!("{read} & 0x{:x}", bits.value_mask()),
            bits => format!("({read} >> {}) & 0x{:x}", bits.low(), bits.value_mask()),
        }
    }
}

impl fmt::Display for RegisterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op == BitwiseOp::Not {
            write!(f, "~")?;
        }
        write!(f, "{}{}", self.register, self.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(bits: Bits) -> RegisterField {
        RegisterField::new("CRU_CLKSEL_CON12", "cru", bits).unwrap()
    }

    #[test]
    fn test_decode_range() {
        let f = field(Bits::Range { high: 12, low: 8 });
        assert_eq!(f.decode(0x0000_1f00), 0x1f);
        assert_eq!(f.decode(0xffff_0300), 0x3);
        assert_eq!(f.encode(0x3), 0x300);
    }

    #[test]
    fn test_decode_bit_and_whole() {
        let bit = field(Bits::Bit(3));
        assert_eq!(bit.decode(0x8), 1);
        assert_eq!(bit.decode(0x7), 0);
        assert_eq!(bit.encode(1), 0x8);

        let whole = field(Bits::Whole);
        assert_eq!(whole.decode(0xdead_beef), 0xdead_beef);
        assert_eq!(whole.encode(0xdead_beef), 0xdead_beef);
    }

    #[test]
    fn test_not_transform() {
        let f = field(Bits::Range { high: 3, low: 2 }).with_op(BitwiseOp::Not);
        assert_eq!(f.decode(0b0100), 0b10);
        assert_eq!(f.encode(0b10), 0b0100);
        assert_eq!(f.decode(f.encode(0b01)), 0b01);
    }

    #[test]
    fn test_invalid_bits() {
        assert!(RegisterField::new("R", "cru", Bits::Range { high: 4, low: 4 }).is_err());
        assert!(RegisterField::new("R", "cru", Bits::Range { high: 2, low: 5 }).is_err());
        assert!(RegisterField::new("R", "cru", Bits::Bit(32)).is_err());
    }

    #[test]
    fn test_write_mask_rejected_past_bit_15() {
        let err = field(Bits::Range { high: 17, low: 8 })
            .with_write_mask()
            .unwrap_err();
        assert!(matches!(err, ClockError::InvalidRegisterField { .. }));
        assert!(field(Bits::Whole).with_write_mask().is_err());
        assert!(field(Bits::Range { high: 15, low: 8 }).with_write_mask().is_ok());
    }

    #[test]
    fn test_write_expr_with_mask() {
        let f = field(Bits::Range { high: 9, low: 8 }).with_write_mask().unwrap();
        let writes = f.write_expr(0x2);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].value, 0x200);
        assert_eq!(writes[0].mask, 0x300);
        assert!(!writes[0].write_enable);
        assert_eq!(writes[1].value, 0x0300_0000);
        assert_eq!(writes[1].mask, 0x0300_0000);
        assert!(writes[1].write_enable);
    }

    #[test]
    fn test_write_expr_without_mask() {
        let writes = field(Bits::Whole).write_expr(0x0001_0002);
        assert_eq!(writes.len(), 1);
        assert!(writes[0].whole);
        assert_eq!(writes[0].mask, u32::MAX);
    }

    #[test]
    fn test_read_expr() {
        assert_eq!(
            field(Bits::Range { high: 12, low: 8 }).read_expr(),
            "(cru.cru_clksel_con12.read().bits() >> 8) & 0x1f"
        );
        assert_eq!(
            field(Bits::Bit(0)).read_expr(),
            "cru.cru_clksel_con12.read().bits() & 0x1"
        );
        assert_eq!(
            field(Bits::Whole).read_expr(),
            "cru.cru_clksel_con12.read().bits()"
        );
        assert_eq!(
            field(Bits::Bit(4)).with_op(BitwiseOp::Not).read_expr(),
            "((!cru.cru_clksel_con12.read().bits()) >> 4) & 0x1"
        );
    }
}
