//! Short (8.3) and long (Joliet) names derived for every element of the tree.

use crate::{
  error::{Error, Result},
  spec::NameScheme,
};

/// Upper bound of a short name, disambiguator included.
pub const SHORT_NAME_LENGTH: usize = 8;

/// Upper bound of a long name, disambiguator included.
pub const LONG_NAME_LENGTH: usize = 101;

pub type ShortName = arraystring::ArrayString<arraystring::typenum::U8>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementNames {
  /// Upper-case ASCII, at most [SHORT_NAME_LENGTH] characters.
  pub short: ShortName,
  /// At most [LONG_NAME_LENGTH] characters, all inside the Basic Multilingual Plane.
  pub long: String,
}

impl ElementNames {
  /// The root is called `.` under both schemes.
  pub fn root() -> Self {
    Self {
      short: ShortName::from_str_truncate("."),
      long: ".".to_owned(),
    }
  }

  pub fn name(&self, scheme: NameScheme) -> &str {
    match scheme {
      NameScheme::Primary => self.short.as_str(),
      NameScheme::Joliet => &self.long,
    }
  }

  /// Derives both names of a child from its original name and its positional
  /// disambiguator (see [child_number]).
  ///
  /// Disambiguation is purely positional: the disambiguator is appended only when the
  /// name has to be cut, never after probing siblings for collisions.
  pub fn derive(original: &str, child_number: &str) -> Result<Self> {
    Ok(Self {
      short: short_name(original, child_number)?,
      long: long_name(original, child_number)?,
    })
  }
}

/// Index of a child among `count` siblings, zero-padded to the digit count of `count`.
pub fn child_number(index: usize, count: usize) -> String {
  let width = count.to_string().len();
  format!("{index:0width$}")
}

fn short_name(original: &str, child_number: &str) -> Result<ShortName> {
  let length = original.chars().count();
  let name: String = match length > SHORT_NAME_LENGTH {
    true => {
      let keep = SHORT_NAME_LENGTH
        .checked_sub(child_number.len())
        .ok_or_else(|| Error::overflow(format!("short name of {original:?}"), child_number.len()))?;
      original
        .chars()
        .take(keep)
        .map(sanitize)
        .chain(child_number.chars())
        .collect()
    }
    false => original.chars().map(sanitize).collect(),
  };

  ShortName::try_from_str(&name).map_err(|_| Error::overflow(format!("short name {name:?}"), name.len()))
}

fn long_name(original: &str, child_number: &str) -> Result<String> {
  let length = original.chars().count();
  let chars = original.chars().map(|ch| match (ch as u32) > 0xFFFF {
    true => '_',
    false => ch,
  });

  match length > LONG_NAME_LENGTH {
    true => {
      let keep = LONG_NAME_LENGTH
        .checked_sub(child_number.len())
        .ok_or_else(|| Error::overflow(format!("long name of {original:?}"), child_number.len()))?;
      Ok(chars.take(keep).chain(child_number.chars()).collect())
    }
    false => Ok(chars.collect()),
  }
}

fn sanitize(ch: char) -> char {
  match ch {
    ' ' | '.' => '_',
    ch if ch.is_ascii() => ch.to_ascii_uppercase(),
    _ => '_',
  }
}
