//! Sector assignment for directories and files.

use crate::{
  lba::LbaAllocator,
  spec::NameScheme,
  tree::{DirectoryId, Tree},
};

/// Gives every directory its extent under `scheme`, in level order, and returns that order.
pub fn assign_directory_extents(
  tree: &mut Tree,
  scheme: NameScheme,
  allocator: &mut LbaAllocator,
) -> Vec<DirectoryId> {
  let order = tree.level_order();

  for &id in &order {
    let sectors = tree.directory(id).sectors(scheme);
    let extent = allocator.allocate_sectors(sectors);
    log::trace!(
      "{scheme:?} directory {:?}: extent {extent}, {sectors} sectors",
      tree.directory(id).names.name(scheme)
    );
    tree.set_directory_extent(id, scheme, extent);
  }

  order
}

/// Gives every non-empty file its extent, depth first with files before subdirectories.
/// Empty files sit at extent 0 and take no sectors.
pub fn assign_file_extents(tree: &mut Tree, allocator: &mut LbaAllocator) {
  for id in tree.files_depth_first() {
    let extent = match tree.file(id).length {
      0 => 0,
      length => allocator.allocate(length),
    };
    tree.set_file_extent(id, extent);
  }
}

/// Location of the type L and type M tables of one scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTableLocation {
  pub type_l: u32,
  pub type_m: u32,
  /// Bytes in one table, without padding.
  pub size: u32,
  /// Sectors taken by one table.
  pub sectors: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemeLayout {
  pub root_extent: u32,
  pub directory_sectors: u32,
  pub path_table: PathTableLocation,
}

/// Where everything landed in a finished image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
  pub volume_space_size: u32,
  pub directories: usize,
  pub files: usize,
  pub primary: SchemeLayout,
  pub joliet: SchemeLayout,
  /// First sector of file payload, `None` when the image carries none.
  pub first_file_extent: Option<u32>,
}

impl ImageLayout {
  pub fn scheme(&self, scheme: NameScheme) -> &SchemeLayout {
    match scheme {
      NameScheme::Primary => &self.primary,
      NameScheme::Joliet => &self.joliet,
    }
  }
}
