use crate::{
  lba::LbaAllocator,
  serialize::{Endianness, IsoSerialize},
  spec::{self, Identifier, NameScheme},
  tree::{DirectoryId, Tree, ROOT},
};

use super::prelude::*;

/// Numbers directories 1..=N following `order`, the level order of the tree.
pub fn number_directories(tree: &mut Tree, order: &[DirectoryId]) -> Result<()> {
  if order.len() > u16::MAX as usize {
    return Err(Error::TooManyDirectories(order.len()));
  }

  for (index, &id) in order.iter().enumerate() {
    tree.set_number(id, index as u16 + 1);
  }

  Ok(())
}

/// Path table of one scheme. The type L and type M tables hold the same records and
/// differ only in byte order.
#[derive(Debug)]
pub struct PathTable {
  size: u32,
  records: Vec<spec::PathTableRecord>,
}

impl PathTable {
  /// Requires directory extents of `scheme` and directory numbers to be assigned.
  pub fn build(tree: &Tree, order: &[DirectoryId], scheme: NameScheme) -> Result<Self> {
    let mut records = Vec::with_capacity(order.len());

    for &id in order {
      let directory = tree.directory(id);
      let parent = tree.directory(directory.parent);
      debug_assert!(directory.extent(scheme).is_some() && parent.number().is_some());

      let directory_identifier = match id {
        ROOT => Identifier::root_directory(),
        _ => Identifier::directory(directory.names.name(scheme), scheme)?,
      };

      records.push(spec::PathTableRecord {
        extent_location: directory.extent(scheme).unwrap_or_default(),
        parent_directory_number: parent.number().unwrap_or(1),
        directory_identifier,
      });
    }

    let size = records.iter().map(|record| record.extent() as u32).sum();
    log::debug!(
      "{scheme:?} path table: {} records, {size} bytes",
      records.len()
    );

    Ok(Self { size, records })
  }

  /// Length of one table in bytes, without padding.
  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn sectors(&self) -> u32 {
    self.size.div_ceil(spec::SECTOR_SIZE)
  }

  pub fn records_iter(&self) -> impl Iterator<Item = &spec::PathTableRecord> {
    self.records.iter()
  }

  /// Allocates LBA for Type L path table.
  pub fn allocate_type_l_lba(&self, allocator: &mut LbaAllocator) -> u32 {
    allocator.allocate(self.size)
  }

  /// Allocates LBA for Type M path table.
  pub fn allocate_type_m_lba(&self, allocator: &mut LbaAllocator) -> u32 {
    allocator.allocate(self.size)
  }

  /// The whole table in one byte order, padded to whole sectors.
  pub fn to_bytes(&self, endianness: Endianness) -> Result<Vec<u8>> {
    let mut bytes = vec![0; (self.sectors() * spec::SECTOR_SIZE) as usize];
    let mut endianness = endianness;
    let mut offset = 0;

    for record in &self.records {
      record.serialize(&mut endianness, &mut bytes[offset..])?;
      log::trace!(
        "Path table record {:?} at byte {offset}",
        record.directory_identifier.decode()
      );
      offset += record.extent();
    }

    Ok(bytes)
  }
}
