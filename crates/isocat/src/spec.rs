//! ISO 9660 and Joliet on-disc structures, shared by the primary and supplementary volumes.

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Logical sector size. Every major structure is aligned to it.
pub const SECTOR_SIZE: u32 = 2048;

/// Sectors 0..=15 are the (empty) system area.
pub const SYSTEM_AREA_SECTORS: u32 = 16;

/// First free sector: system area plus primary, supplementary and terminator descriptors.
pub const FIRST_DIRECTORY_LBA: u32 = 19;

/// Length of a directory record without its identifier.
pub const DIRECTORY_RECORD_HEADER_LENGTH: usize = 33;

/// Length of the `.` and `..` records, which start every directory block.
pub const DEFAULT_DIRECTORY_RECORD_LENGTH: u32 = 34;

/// Length of a path table record without its identifier.
pub const PATH_TABLE_RECORD_HEADER_LENGTH: usize = 8;

/// Upper bound for a directory record's length and for any identifier.
pub const MAX_RECORD_LENGTH: usize = 255;

/// GMT+2, in 15 minute steps.
pub const DEFAULT_TIMEZONE_OFFSET: i8 = 8;

/// Version suffix appended to every file identifier.
pub const FILE_VERSION_SUFFIX: &str = ";1";

/// Joliet UCS-2 level 3 escape sequence.
pub const JOLIET_ESCAPE_SEQUENCE: &[u8; 3] = b"%/E";

/// The two naming layouts recorded side by side in every image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameScheme {
  /// Upper-case 8.3 ASCII names, referenced by the Primary Volume Descriptor.
  Primary,
  /// Long UCS-2 names, referenced by the Joliet Supplementary Volume Descriptor.
  Joliet,
}

impl NameScheme {
  pub const ALL: [NameScheme; 2] = [NameScheme::Primary, NameScheme::Joliet];

  pub(crate) fn index(self) -> usize {
    match self {
      NameScheme::Primary => 0,
      NameScheme::Joliet => 1,
    }
  }

  pub fn descriptor_type(self) -> VolumeDescriptorType {
    match self {
      NameScheme::Primary => VolumeDescriptorType::Primary,
      NameScheme::Joliet => VolumeDescriptorType::Supplementary,
    }
  }
}

/// Kind of identifier. Used to determine how to interpret the bytes and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
  /// Special case for the `.` entry in a directory.
  CurrentDirectory,
  /// Special case for the `..` entry in a directory.
  ParentDirectory,
  /// The root directory, as named in path tables and volume descriptors.
  RootDirectory,
  /// ASCII file identifier, including the `;1` suffix.
  StandardFileIdentifier,
  /// ASCII directory identifier.
  StandardDirectoryIdentifier,
  /// Joliet (Unicode UCS-2) encoded file identifier, including the `;1` suffix.
  JolietFileIdentifier,
  /// Joliet (Unicode UCS-2) encoded directory identifier.
  JolietDirectoryIdentifier,
}

/// Encoded file or directory identifier.
///
/// Identifiers are produced by a pure encoding of a name under a [NameScheme]; switching
/// schemes means encoding the name again, never rewriting an existing identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
  kind: IdentifierKind,
  data: [u8; MAX_RECORD_LENGTH],
  /// Length in bytes.
  length: u8,
}

impl Identifier {
  fn special(kind: IdentifierKind, byte: u8) -> Self {
    let mut data = [0; MAX_RECORD_LENGTH];
    data[0] = byte;
    Self {
      kind,
      data,
      length: 1,
    }
  }

  pub fn current_directory() -> Self {
    Self::special(IdentifierKind::CurrentDirectory, 0)
  }

  pub fn parent_directory() -> Self {
    Self::special(IdentifierKind::ParentDirectory, 1)
  }

  /// Single zero byte, as used by path tables and the descriptors' root record.
  pub fn root_directory() -> Self {
    Self::special(IdentifierKind::RootDirectory, 0)
  }

  /// Encodes a file name, appending the mandatory version suffix.
  pub fn file(name: &str, scheme: NameScheme) -> Result<Self> {
    let versioned = format!("{name}{FILE_VERSION_SUFFIX}");
    match scheme {
      NameScheme::Primary => Self::ascii(IdentifierKind::StandardFileIdentifier, &versioned),
      NameScheme::Joliet => Self::ucs2(IdentifierKind::JolietFileIdentifier, &versioned),
    }
  }

  pub fn directory(name: &str, scheme: NameScheme) -> Result<Self> {
    match scheme {
      NameScheme::Primary => Self::ascii(IdentifierKind::StandardDirectoryIdentifier, name),
      NameScheme::Joliet => Self::ucs2(IdentifierKind::JolietDirectoryIdentifier, name),
    }
  }

  fn ascii(kind: IdentifierKind, text: &str) -> Result<Self> {
    let length = text.chars().count();
    if length > MAX_RECORD_LENGTH {
      return Err(Error::overflow(format!("identifier {text:?}"), length));
    }

    let mut data = [0; MAX_RECORD_LENGTH];
    for (slot, ch) in data.iter_mut().zip(text.chars()) {
      *slot = if ch.is_ascii() { ch as u8 } else { b'_' };
    }

    Ok(Self {
      kind,
      data,
      length: length as u8,
    })
  }

  fn ucs2(kind: IdentifierKind, text: &str) -> Result<Self> {
    let mut units = [0u16; MAX_RECORD_LENGTH / 2];
    let count = ucs2::encode(text, &mut units).map_err(|err| {
      log::debug!("UCS-2 encoding of {text:?} failed: {err:?}");
      Error::overflow(format!("Joliet identifier {text:?}"), 2 * text.chars().count())
    })?;

    let mut data = [0; MAX_RECORD_LENGTH];
    for (pair, unit) in data.chunks_exact_mut(2).zip(&units[..count]) {
      pair.copy_from_slice(&unit.to_be_bytes());
    }

    Ok(Self {
      kind,
      data,
      length: (count * 2) as u8,
    })
  }

  pub fn kind(&self) -> IdentifierKind {
    self.kind
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data[..self.length as usize]
  }

  pub fn len(&self) -> usize {
    self.length as usize
  }

  pub fn is_empty(&self) -> bool {
    self.length == 0
  }

  /// Decodes the identifier back into text.
  pub fn decode(&self) -> String {
    match self.kind {
      IdentifierKind::CurrentDirectory => ".".to_owned(),
      IdentifierKind::ParentDirectory => "..".to_owned(),
      IdentifierKind::RootDirectory => String::new(),
      IdentifierKind::StandardFileIdentifier | IdentifierKind::StandardDirectoryIdentifier => {
        self.as_bytes().iter().map(|&b| b as char).collect()
      }
      IdentifierKind::JolietFileIdentifier | IdentifierKind::JolietDirectoryIdentifier => {
        let units = self
          .as_bytes()
          .chunks_exact(2)
          .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        char::decode_utf16(units)
          .map(|ch| ch.unwrap_or(char::REPLACEMENT_CHARACTER))
          .collect()
      }
    }
  }
}

bitflags::bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct FileFlags: u8 {
    const HIDDEN = 1 << 0;
    const DIRECTORY = 1 << 1;
    const ASSOCIATED_FILE = 1 << 2;
    const RECORD = 1 << 3;
    const PROTECTION = 1 << 4;
    const MULTI_EXTENT = 1 << 7;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardIdentifier {
  /// Standard ISO 9660 identifier; "CD001"
  Cd001,
}

impl StandardIdentifier {
  pub fn as_bytes(&self) -> &[u8; 5] {
    match self {
      StandardIdentifier::Cd001 => b"CD001",
    }
  }
}

/// Version byte following the standard identifier in every descriptor.
pub const VOLUME_DESCRIPTOR_VERSION: u8 = 1;

/// File structure version recorded in the primary and supplementary descriptors.
pub const FILE_STRUCTURE_VERSION: u8 = 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDescriptorType {
  Primary = 1,
  Supplementary = 2,
  Terminator = 255,
}

impl From<VolumeDescriptorType> for u8 {
  fn from(value: VolumeDescriptorType) -> u8 {
    value as u8
  }
}

/// 1900-01-01 00:00:00, used when a source carries no usable timestamp.
pub fn no_date() -> NaiveDateTime {
  NaiveDate::from_ymd_opt(1900, 1, 1)
    .and_then(|date| date.and_hms_opt(0, 0, 0))
    .unwrap_or_default()
}

/// 17-byte ASCII digits date, as found in volume descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitsDate {
  pub year: u16,
  pub month: u8,
  pub day: u8,
  pub hour: u8,
  pub minute: u8,
  pub second: u8,
  pub hundredths: u8,
  /// Offset from GMT in 15 minute intervals.
  pub gmt_offset: i8,
}

impl DigitsDate {
  pub fn from_datetime(dt: NaiveDateTime, gmt_offset: i8) -> Self {
    Self {
      year: (dt.year().rem_euclid(10_000)) as u16,
      month: dt.month() as u8,
      day: dt.day() as u8,
      hour: dt.hour() as u8,
      minute: dt.minute() as u8,
      second: dt.second() as u8,
      // Leap seconds report more than 999 milliseconds.
      hundredths: (dt.nanosecond() / 10_000_000).min(99) as u8,
      gmt_offset,
    }
  }

  /// "Not specified": all digits zero and no offset.
  pub fn unspecified() -> Self {
    Self {
      year: 0,
      month: 0,
      day: 0,
      hour: 0,
      minute: 0,
      second: 0,
      hundredths: 0,
      gmt_offset: 0,
    }
  }

  pub fn is_unspecified(&self) -> bool {
    *self == Self::unspecified()
  }

  pub fn to_datetime(&self) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?.and_hms_milli_opt(
      self.hour as u32,
      self.minute as u32,
      self.second as u32,
      self.hundredths as u32 * 10,
    )
  }

  /// Parses the 17-byte form written by [crate::serialize::IsoSerialize].
  pub fn parse(bytes: &[u8; 17]) -> Option<Self> {
    fn digits(bytes: &[u8]) -> Option<u16> {
      bytes.iter().try_fold(0u16, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + (b - b'0') as u16)
      })
    }

    Some(Self {
      year: digits(&bytes[0..4])?,
      month: digits(&bytes[4..6])? as u8,
      day: digits(&bytes[6..8])? as u8,
      hour: digits(&bytes[8..10])? as u8,
      minute: digits(&bytes[10..12])? as u8,
      second: digits(&bytes[12..14])? as u8,
      hundredths: digits(&bytes[14..16])? as u8,
      gmt_offset: bytes[16] as i8,
    })
  }
}

impl From<&NumericalDate> for DigitsDate {
  fn from(date: &NumericalDate) -> Self {
    Self {
      year: 1900 + date.years_since_1900 as u16,
      month: date.month,
      day: date.day,
      hour: date.hour,
      minute: date.minute,
      second: date.second,
      hundredths: 0,
      gmt_offset: date.gmt_offset,
    }
  }
}

/// 7-byte binary date (6 date bytes and the GMT offset), as found in directory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericalDate {
  pub years_since_1900: u8,
  pub month: u8,
  pub day: u8,
  pub hour: u8,
  pub minute: u8,
  pub second: u8,
  /// Offset from GMT in 15 minute intervals.
  pub gmt_offset: i8,
}

impl NumericalDate {
  /// Years outside 1900..=2155 are clamped to the representable range.
  pub fn from_datetime(dt: NaiveDateTime, gmt_offset: i8) -> Self {
    Self {
      years_since_1900: (dt.year().clamp(1900, 1900 + u8::MAX as i32) - 1900) as u8,
      month: dt.month() as u8,
      day: dt.day() as u8,
      hour: dt.hour() as u8,
      minute: dt.minute() as u8,
      second: dt.second() as u8,
      gmt_offset,
    }
  }

  pub fn to_datetime(&self) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(
      1900 + self.years_since_1900 as i32,
      self.month as u32,
      self.day as u32,
    )?
    .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
  }

  pub fn parse(bytes: &[u8; 7]) -> Self {
    Self {
      years_since_1900: bytes[0],
      month: bytes[1],
      day: bytes[2],
      hour: bytes[3],
      minute: bytes[4],
      second: bytes[5],
      gmt_offset: bytes[6] as i8,
    }
  }
}

impl From<&DigitsDate> for NumericalDate {
  fn from(date: &DigitsDate) -> Self {
    Self {
      years_since_1900: (date.year.clamp(1900, 1900 + u8::MAX as u16) - 1900) as u8,
      month: date.month,
      day: date.day,
      hour: date.hour,
      minute: date.minute,
      second: date.second,
      gmt_offset: date.gmt_offset,
    }
  }
}

#[derive(Debug, Clone)]
pub struct DirectoryRecord {
  pub extent_location: u32,
  pub data_length: u32,
  pub recording_date: NumericalDate,
  pub file_flags: FileFlags,
  pub file_identifier: Identifier,
}

impl DirectoryRecord {
  /// Total record length: header, identifier and one pad byte when the identifier length is even.
  pub fn length(&self) -> usize {
    let id = self.file_identifier.len();
    DIRECTORY_RECORD_HEADER_LENGTH + id + (1 - id % 2)
  }

  /// Fails when the record would not fit its one-byte length field.
  pub fn validate(&self) -> Result<()> {
    match self.length() {
      length if length > MAX_RECORD_LENGTH => Err(Error::overflow(
        format!("directory record {:?}", self.file_identifier.decode()),
        length,
      )),
      _ => Ok(()),
    }
  }
}

#[derive(Debug, Clone)]
pub struct PathTableRecord {
  pub extent_location: u32,
  pub parent_directory_number: u16,
  pub directory_identifier: Identifier,
}

impl PathTableRecord {
  /// Header, identifier and one pad byte when the identifier length is odd.
  pub fn length(&self) -> usize {
    let id = self.directory_identifier.len();
    PATH_TABLE_RECORD_HEADER_LENGTH + id + id % 2
  }
}

/// Primary or supplementary (Joliet) volume descriptor.
///
/// Text fields hold plain text; they are encoded as space padded ASCII for the primary
/// descriptor and as space padded UCS-2 for the supplementary one.
#[derive(Debug, Clone)]
pub struct VolumeDescriptor {
  pub descriptor_type: VolumeDescriptorType,
  pub standard_identifier: StandardIdentifier,
  pub system_identifier: String,
  pub volume_identifier: String,
  /// Number of sectors in the volume.
  pub volume_space_size: u32,
  pub volume_set_size: u16,
  pub volume_sequence_number: u16,
  pub logical_block_size: u16,
  /// Length in bytes of one path table, without padding.
  pub path_table_size: u32,
  pub type_l_path_table_location: u32,
  pub optional_type_l_path_table_location: u32,
  pub type_m_path_table_location: u32,
  pub optional_type_m_path_table_location: u32,
  pub root_directory_record: DirectoryRecord,
  pub volume_set_identifier: String,
  pub publisher_identifier: String,
  pub data_preparer_identifier: String,
  pub application_identifier: String,
  pub copyright_file_identifier: String,
  pub abstract_file_identifier: String,
  pub bibliographic_file_identifier: String,
  pub creation_date: DigitsDate,
  pub modification_date: DigitsDate,
  pub expiration_date: DigitsDate,
  pub effective_date: DigitsDate,
}

impl VolumeDescriptor {
  pub fn scheme(&self) -> NameScheme {
    match self.descriptor_type {
      VolumeDescriptorType::Supplementary => NameScheme::Joliet,
      _ => NameScheme::Primary,
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeDescriptorSetTerminator;
