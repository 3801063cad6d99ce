use crate::spec;

/// Hands out consecutive sectors, starting at a fixed offset.
#[derive(Debug)]
pub struct LbaAllocator {
  sector_size: u32,
  next_lba: u32,
}

impl LbaAllocator {
  pub fn new(sector_size: u32, offset: u32) -> Self {
    Self {
      sector_size,
      next_lba: offset,
    }
  }

  /// Allocator for the first sector after the system area and the three volume descriptors.
  pub fn after_descriptors() -> Self {
    Self::new(spec::SECTOR_SIZE, spec::FIRST_DIRECTORY_LBA)
  }

  /// Reserves enough sectors for `size` bytes and returns the first one.
  pub fn allocate(&mut self, size: u32) -> u32 {
    self.allocate_sectors(size.div_ceil(self.sector_size))
  }

  pub fn allocate_sectors(&mut self, sectors: u32) -> u32 {
    let lba = self.next_lba;
    self.next_lba += sectors;
    lba
  }

  /// First sector not handed out yet.
  pub fn next_lba(&self) -> u32 {
    self.next_lba
  }
}
