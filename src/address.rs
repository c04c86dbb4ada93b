//! A relative address names a byte of machine memory as a signed offset from one of the
//! machine's pointer registers. It is stored in the bytecode as a single 16 bit word:
//!
//! ```text
//! [Register:2][Displacement:14]
//! ```
//!
//! The register selector occupies the top two bits. A selector of zero names no register at
//! all, which is how absolute jump targets are written.

use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

/// The bits of an address word holding the register selector.
pub const SELECTOR_MASK: u16 = 0xC000;
/// The bits of an address word holding the displacement.
pub const DISPLACEMENT_MASK: u16 = 0x3FFF;

pub const MIN_DISPLACEMENT: i16 = -0x2000;
pub const MAX_DISPLACEMENT: i16 = 0x1FFF;

/// The pointer registers an indirect operand may be relative to.
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter,
  Clone,        Copy,          Eq, PartialEq,  Debug,  Hash
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Register {
  /// Stack pointer, the next free byte above the top of the stack.
  Sp,
  /// Frame pointer, the base of the current call frame.
  Fp,
  /// Instruction pointer, the next byte to fetch.
  Ip,
}

impl Register {
  pub fn selector(&self) -> u16 {
    match self {
      Register::Sp => 0x4000,
      Register::Fp => 0x8000,
      Register::Ip => 0xC000,
    }
  }

  /// Reads the selector bits of an address word. Returns `None` for the "no register" selector.
  pub fn from_selector(word: u16) -> Option<Register> {
    match word & SELECTOR_MASK {
      0x4000 => Some(Register::Sp),
      0x8000 => Some(Register::Fp),
      0xC000 => Some(Register::Ip),
      _      => None
    }
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct RelativeAddress {
  pub register     : Option<Register>,
  pub displacement : i16,
}

impl RelativeAddress {

  /// Returns `None` if `displacement` does not fit in 14 signed bits.
  pub fn new(register: Register, displacement: i16) -> Option<RelativeAddress> {
    match (MIN_DISPLACEMENT..=MAX_DISPLACEMENT).contains(&displacement) {
      true  => Some(RelativeAddress{ register: Some(register), displacement }),
      false => None
    }
  }

  pub fn encode(&self) -> u16 {
    let selector = self.register.map_or(0, |register| register.selector());
    selector | (self.displacement as u16 & DISPLACEMENT_MASK)
  }

  pub fn decode(word: u16) -> RelativeAddress {
    // Shifting the selector out and arithmetically back sign-extends the low 14 bits.
    let displacement = ((word << 2) as i16) >> 2;
    RelativeAddress {
      register: Register::from_selector(word),
      displacement
    }
  }

}

impl Display for RelativeAddress {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let sign = match self.displacement < 0 {
      true  => '-',
      false => '+'
    };
    let magnitude = self.displacement.unsigned_abs();
    match self.register {
      Some(register) => write!(f, "[{}{}{}]", register, sign, magnitude),
      None           => write!(f, "[{}{}]", sign, magnitude)
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::str::FromStr;

  #[test]
  fn register_names(){
    assert_eq!(Register::from_str("FP"), Ok(Register::Fp));
    assert_eq!(Register::from_str("IP"), Ok(Register::Ip));
    assert!(Register::from_str("fp").is_err());
    assert_eq!(Register::Sp.to_string(), "SP");
  }

  #[test]
  fn packs_selector_and_displacement(){
    let address = RelativeAddress::new(Register::Fp, 1).unwrap();
    assert_eq!(address.encode(), 0x8001);

    let address = RelativeAddress::new(Register::Sp, 4).unwrap();
    assert_eq!(address.encode(), 0x4004);
  }

  #[test]
  fn negative_displacement_keeps_its_register(){
    let address = RelativeAddress::new(Register::Fp, -1).unwrap();
    assert_eq!(address.encode(), 0xBFFF);
    assert_eq!(RelativeAddress::decode(0xBFFF), address);
  }

  #[test]
  fn sign_extends_displacement(){
    let address = RelativeAddress::decode(0xC000 | 0x2000);
    assert_eq!(address.register, Some(Register::Ip));
    assert_eq!(address.displacement, MIN_DISPLACEMENT);

    let address = RelativeAddress::decode(0x1FFF);
    assert_eq!(address.register, None);
    assert_eq!(address.displacement, MAX_DISPLACEMENT);
  }

  #[test]
  fn rejects_wide_displacement(){
    assert_eq!(RelativeAddress::new(Register::Sp, 0x2000), None);
    assert_eq!(RelativeAddress::new(Register::Sp, -0x2001), None);
    assert!(RelativeAddress::new(Register::Sp, -0x2000).is_some());
  }

  #[test]
  fn display(){
    assert_eq!(RelativeAddress::new(Register::Fp, -12).unwrap().to_string(), "[FP-12]");
    assert_eq!(RelativeAddress::new(Register::Ip, 0).unwrap().to_string(), "[IP+0]");
  }
}
