//! Byte layouts of the structures in [crate::spec].

use crate::{
  error::{Error, Result},
  spec::{self, NameScheme},
};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order of a path table. Only path tables pick a single order; everything else is
/// written both-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
  /// Type L path table.
  Little,
  /// Type M path table.
  Big,
}

impl Endianness {
  fn write_u32(self, out: &mut [u8], value: u32) {
    match self {
      Endianness::Little => LittleEndian::write_u32(out, value),
      Endianness::Big => BigEndian::write_u32(out, value),
    }
  }

  fn write_u16(self, out: &mut [u8], value: u16) {
    match self {
      Endianness::Little => LittleEndian::write_u16(out, value),
      Endianness::Big => BigEndian::write_u16(out, value),
    }
  }
}

pub trait IsoSerialize {
  type Context;

  /// Length in bytes of the serialized form.
  fn extent(&self) -> usize;

  /// Writes the serialized form into the start of `out`.
  fn serialize(&self, context: &mut Self::Context, out: &mut [u8]) -> Result<()>;

  fn to_bytes(&self, context: &mut Self::Context) -> Result<Vec<u8>> {
    let mut bytes = vec![0; self.extent()];
    self.serialize(context, &mut bytes)?;
    Ok(bytes)
  }
}

fn ensure_room(out: &[u8], extent: usize, what: &str) -> Result<()> {
  match out.len() < extent {
    true => Err(Error::overflow(format!("{what} buffer of {} bytes", out.len()), extent)),
    false => Ok(()),
  }
}

/// 32-bit value stored little-endian then big-endian (8 bytes).
pub fn write_both_u32(out: &mut [u8], value: u32) {
  LittleEndian::write_u32(&mut out[0..4], value);
  BigEndian::write_u32(&mut out[4..8], value);
}

/// 16-bit value stored little-endian then big-endian (4 bytes).
pub fn write_both_u16(out: &mut [u8], value: u16) {
  LittleEndian::write_u16(&mut out[0..2], value);
  BigEndian::write_u16(&mut out[2..4], value);
}

/// Reads a both-endian 32-bit value, `None` if the two halves disagree.
pub fn read_both_u32(bytes: &[u8]) -> Option<u32> {
  let value = LittleEndian::read_u32(&bytes[0..4]);
  (value == BigEndian::read_u32(&bytes[4..8])).then_some(value)
}

/// Reads a both-endian 16-bit value, `None` if the two halves disagree.
pub fn read_both_u16(bytes: &[u8]) -> Option<u16> {
  let value = LittleEndian::read_u16(&bytes[0..2]);
  (value == BigEndian::read_u16(&bytes[2..4])).then_some(value)
}

/// Writes a descriptor text field: space padded ASCII for the primary volume and space
/// padded UCS-2 for Joliet. Text longer than the field is truncated.
pub fn write_text(out: &mut [u8], text: &str, scheme: NameScheme) {
  match scheme {
    NameScheme::Primary => {
      out.fill(b' ');
      for (slot, ch) in out.iter_mut().zip(text.chars()) {
        *slot = if ch.is_ascii() { ch as u8 } else { b'_' };
      }
    }
    NameScheme::Joliet => {
      let units = out.len() / 2;
      let (pairs, tail) = out.split_at_mut(units * 2);
      let padded = text
        .chars()
        .map(|ch| if (ch as u32) > 0xFFFF { '_' } else { ch })
        .chain(std::iter::repeat(' '));
      for (pair, ch) in pairs.chunks_exact_mut(2).zip(padded) {
        BigEndian::write_u16(pair, ch as u16);
      }
      tail.fill(0);
    }
  }
}

impl IsoSerialize for spec::NumericalDate {
  type Context = ();

  fn extent(&self) -> usize {
    7
  }

  fn serialize(&self, _: &mut (), out: &mut [u8]) -> Result<()> {
    ensure_room(out, self.extent(), "binary date")?;
    out[0] = self.years_since_1900;
    out[1] = self.month;
    out[2] = self.day;
    out[3] = self.hour;
    out[4] = self.minute;
    out[5] = self.second;
    out[6] = self.gmt_offset as u8;
    Ok(())
  }
}

impl IsoSerialize for spec::DigitsDate {
  type Context = ();

  fn extent(&self) -> usize {
    17
  }

  fn serialize(&self, _: &mut (), out: &mut [u8]) -> Result<()> {
    ensure_room(out, self.extent(), "digits date")?;
    let digits = format!(
      "{:04}{:02}{:02}{:02}{:02}{:02}{:02}",
      self.year % 10_000,
      self.month % 100,
      self.day % 100,
      self.hour % 100,
      self.minute % 100,
      self.second % 100,
      self.hundredths % 100
    );
    out[..16].copy_from_slice(digits.as_bytes());
    out[16] = self.gmt_offset as u8;
    Ok(())
  }
}

impl IsoSerialize for spec::DirectoryRecord {
  type Context = ();

  fn extent(&self) -> usize {
    self.length()
  }

  fn serialize(&self, context: &mut (), out: &mut [u8]) -> Result<()> {
    self.validate()?;
    let extent = self.extent();
    ensure_room(out, extent, "directory record")?;

    let identifier = self.file_identifier.as_bytes();
    let out = &mut out[..extent];
    out.fill(0);

    out[0] = extent as u8;
    // Extended attribute record length.
    out[1] = 0;
    write_both_u32(&mut out[2..10], self.extent_location);
    write_both_u32(&mut out[10..18], self.data_length);
    self.recording_date.serialize(context, &mut out[18..25])?;
    out[25] = self.file_flags.bits();
    // File unit size and interleave gap size stay zero.
    write_both_u16(&mut out[28..32], 1);
    out[32] = identifier.len() as u8;
    out[33..33 + identifier.len()].copy_from_slice(identifier);

    Ok(())
  }
}

impl IsoSerialize for spec::PathTableRecord {
  type Context = Endianness;

  fn extent(&self) -> usize {
    self.length()
  }

  fn serialize(&self, endianness: &mut Endianness, out: &mut [u8]) -> Result<()> {
    let extent = self.extent();
    ensure_room(out, extent, "path table record")?;

    let identifier = self.directory_identifier.as_bytes();
    let out = &mut out[..extent];
    out.fill(0);

    out[0] = identifier.len() as u8;
    out[1] = 0;
    endianness.write_u32(&mut out[2..6], self.extent_location);
    endianness.write_u16(&mut out[6..8], self.parent_directory_number);
    out[8..8 + identifier.len()].copy_from_slice(identifier);

    Ok(())
  }
}

impl IsoSerialize for spec::VolumeDescriptor {
  type Context = ();

  fn extent(&self) -> usize {
    spec::SECTOR_SIZE as usize
  }

  fn serialize(&self, context: &mut (), out: &mut [u8]) -> Result<()> {
    ensure_room(out, self.extent(), "volume descriptor")?;
    let scheme = self.scheme();
    let out = &mut out[..self.extent()];
    out.fill(0);

    out[0] = self.descriptor_type.into();
    out[1..6].copy_from_slice(self.standard_identifier.as_bytes());
    out[6] = spec::VOLUME_DESCRIPTOR_VERSION;
    // out[7]: unused / volume flags.
    write_text(&mut out[8..40], &self.system_identifier, scheme);
    write_text(&mut out[40..72], &self.volume_identifier, scheme);
    // 72..80 unused.
    write_both_u32(&mut out[80..88], self.volume_space_size);
    if scheme == NameScheme::Joliet {
      out[88..91].copy_from_slice(spec::JOLIET_ESCAPE_SEQUENCE);
    }
    write_both_u16(&mut out[120..124], self.volume_set_size);
    write_both_u16(&mut out[124..128], self.volume_sequence_number);
    write_both_u16(&mut out[128..132], self.logical_block_size);
    write_both_u32(&mut out[132..140], self.path_table_size);
    LittleEndian::write_u32(&mut out[140..144], self.type_l_path_table_location);
    LittleEndian::write_u32(&mut out[144..148], self.optional_type_l_path_table_location);
    BigEndian::write_u32(&mut out[148..152], self.type_m_path_table_location);
    BigEndian::write_u32(&mut out[152..156], self.optional_type_m_path_table_location);

    let root = &self.root_directory_record;
    if root.extent() != spec::DEFAULT_DIRECTORY_RECORD_LENGTH as usize {
      return Err(Error::overflow("root directory record", root.extent()));
    }
    root.serialize(context, &mut out[156..190])?;

    write_text(&mut out[190..318], &self.volume_set_identifier, scheme);
    write_text(&mut out[318..446], &self.publisher_identifier, scheme);
    write_text(&mut out[446..574], &self.data_preparer_identifier, scheme);
    write_text(&mut out[574..702], &self.application_identifier, scheme);
    write_text(&mut out[702..739], &self.copyright_file_identifier, scheme);
    write_text(&mut out[739..776], &self.abstract_file_identifier, scheme);
    write_text(&mut out[776..813], &self.bibliographic_file_identifier, scheme);

    self.creation_date.serialize(context, &mut out[813..830])?;
    self.modification_date.serialize(context, &mut out[830..847])?;
    self.expiration_date.serialize(context, &mut out[847..864])?;
    self.effective_date.serialize(context, &mut out[864..881])?;

    out[881] = spec::FILE_STRUCTURE_VERSION;
    // 882 reserved, 883..1395 application use, 1395..2048 reserved.

    Ok(())
  }
}

impl IsoSerialize for spec::VolumeDescriptorSetTerminator {
  type Context = ();

  fn extent(&self) -> usize {
    spec::SECTOR_SIZE as usize
  }

  fn serialize(&self, _: &mut (), out: &mut [u8]) -> Result<()> {
    ensure_room(out, self.extent(), "set terminator")?;
    let out = &mut out[..self.extent()];
    out.fill(0);
    out[0] = spec::VolumeDescriptorType::Terminator.into();
    out[1..6].copy_from_slice(spec::StandardIdentifier::Cd001.as_bytes());
    out[6] = spec::VOLUME_DESCRIPTOR_VERSION;
    Ok(())
  }
}
