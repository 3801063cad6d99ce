//! Arena of the directories and files laid out in an image.
//!
//! Directories refer to their parent and children by index; the root is its own parent.
//! Names are derived once when the tree is built. Sizes, extents and directory numbers
//! start unset and are each written once by the later build passes.

use crate::{
  name::{self, ElementNames},
  source::SourceNode,
  spec::{self, NameScheme},
};

use super::prelude::*;
use chrono::NaiveDateTime;
use std::collections::VecDeque;

pub type DirectoryId = usize;
pub type FileId = usize;

pub const ROOT: DirectoryId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
  File(FileId),
  Directory(DirectoryId),
}

#[derive(Debug)]
pub struct DirectoryElement {
  pub names: ElementNames,
  pub created: NaiveDateTime,
  pub parent: DirectoryId,
  /// Depth in the tree, the root being level 1.
  pub level: u32,
  /// Children sorted by long name.
  pub children: Vec<Child>,
  number: Option<u16>,
  sectors: [Option<u32>; 2],
  extents: [Option<u32>; 2],
}

impl DirectoryElement {
  /// Position in the path table, starting at 1.
  pub fn number(&self) -> Option<u16> {
    self.number
  }

  /// Size of the record block in sectors, zero until sized.
  pub fn sectors(&self, scheme: NameScheme) -> u32 {
    self.sectors[scheme.index()].unwrap_or(0)
  }

  pub fn size(&self, scheme: NameScheme) -> u32 {
    self.sectors(scheme) * spec::SECTOR_SIZE
  }

  pub fn extent(&self, scheme: NameScheme) -> Option<u32> {
    self.extents[scheme.index()]
  }
}

#[derive(Debug)]
pub struct FileElement<'a> {
  pub names: ElementNames,
  pub source: &'a SourceNode,
  pub length: u32,
  extent: Option<u32>,
}

impl FileElement<'_> {
  /// Shared by both schemes. Unset in catalog builds.
  pub fn extent(&self) -> Option<u32> {
    self.extent
  }

  pub fn sectors(&self) -> u32 {
    self.length.div_ceil(spec::SECTOR_SIZE)
  }
}

/// View over either kind of element.
#[derive(Debug, Clone, Copy)]
pub enum FolderElement<'t, 'a> {
  File(&'t FileElement<'a>),
  Directory(&'t DirectoryElement),
}

impl FolderElement<'_, '_> {
  pub fn is_directory(&self) -> bool {
    matches!(self, FolderElement::Directory(_))
  }

  pub fn names(&self) -> &ElementNames {
    match self {
      FolderElement::File(file) => &file.names,
      FolderElement::Directory(directory) => &directory.names,
    }
  }

  pub fn name(&self, scheme: NameScheme) -> &str {
    self.names().name(scheme)
  }

  pub fn created(&self) -> NaiveDateTime {
    match self {
      FolderElement::File(file) => file.source.created,
      FolderElement::Directory(directory) => directory.created,
    }
  }

  /// Data length in bytes as recorded in a directory record.
  pub fn size(&self, scheme: NameScheme) -> u32 {
    match self {
      FolderElement::File(file) => file.length,
      FolderElement::Directory(directory) => directory.size(scheme),
    }
  }

  pub fn extent(&self, scheme: NameScheme) -> Option<u32> {
    match self {
      FolderElement::File(file) => file.extent(),
      FolderElement::Directory(directory) => directory.extent(scheme),
    }
  }

  /// Length of this element's record in its parent's block.
  pub fn record_length(&self, scheme: NameScheme) -> usize {
    let identifier = match scheme {
      NameScheme::Primary => self.names().short.as_str().len(),
      NameScheme::Joliet => 2 * self.names().long.chars().count(),
    };
    let suffix = match self.is_directory() {
      true => 0,
      false => identifier_suffix_length(scheme),
    };
    let length = spec::DIRECTORY_RECORD_HEADER_LENGTH + identifier + suffix;
    length + length % 2
  }
}

fn identifier_suffix_length(scheme: NameScheme) -> usize {
  match scheme {
    NameScheme::Primary => spec::FILE_VERSION_SUFFIX.len(),
    NameScheme::Joliet => 2 * spec::FILE_VERSION_SUFFIX.len(),
  }
}

/// Sectors taken by a directory block holding records of the given lengths after the
/// `.` and `..` records. Records never straddle a sector boundary.
pub fn directory_sectors(record_lengths: impl IntoIterator<Item = usize>) -> u32 {
  let sector = spec::SECTOR_SIZE as usize;
  let mut position = 2 * spec::DEFAULT_DIRECTORY_RECORD_LENGTH as usize;
  let mut sectors = 1;

  for length in record_lengths {
    if position + length > sector {
      sectors += 1;
      position = length;
    } else {
      position += length;
    }
  }

  sectors
}

#[derive(Debug)]
pub struct Tree<'a> {
  directories: Vec<DirectoryElement>,
  files: Vec<FileElement<'a>>,
}

impl<'a> Tree<'a> {
  /// Names every element of `source` and orders each directory's children by long name.
  pub fn build(source: &'a SourceNode) -> Result<Self> {
    if !source.is_directory() {
      return Err(Error::NotADirectory(source.name.clone().into()));
    }

    let mut tree = Tree {
      directories: vec![DirectoryElement {
        names: ElementNames::root(),
        created: source.created,
        parent: ROOT,
        level: 1,
        children: Vec::new(),
        number: None,
        sectors: [None; 2],
        extents: [None; 2],
      }],
      files: Vec::new(),
    };

    let mut pending = vec![(source, ROOT)];
    while let Some((node, id)) = pending.pop() {
      let count = node.children().len();
      let mut children = Vec::with_capacity(count);

      for (index, child) in node.children().iter().enumerate() {
        let names = ElementNames::derive(&child.name, &name::child_number(index, count))?;

        if child.is_directory() {
          let child_id = tree.directories.len();
          let level = tree.directories[id].level + 1;
          tree.directories.push(DirectoryElement {
            names,
            created: child.created,
            parent: id,
            level,
            children: Vec::new(),
            number: None,
            sectors: [None; 2],
            extents: [None; 2],
          });
          children.push(Child::Directory(child_id));
          pending.push((child, child_id));
        } else {
          let length = u32::try_from(child.length()).map_err(|_| Error::FileTooLarge {
            name: child.name.clone(),
            length: child.length(),
          })?;
          children.push(Child::File(tree.files.len()));
          tree.files.push(FileElement {
            names,
            source: child,
            length,
            extent: None,
          });
        }
      }

      children.sort_by(|a, b| tree.element(*a).names().long.cmp(&tree.element(*b).names().long));
      tree.directories[id].children = children;
    }

    log::debug!(
      "Tree holds {} directories and {} files",
      tree.directories.len(),
      tree.files.len()
    );

    Ok(tree)
  }

  pub fn root(&self) -> &DirectoryElement {
    &self.directories[ROOT]
  }

  pub fn directory(&self, id: DirectoryId) -> &DirectoryElement {
    &self.directories[id]
  }

  pub fn file(&self, id: FileId) -> &FileElement<'a> {
    &self.files[id]
  }

  pub fn element(&self, child: Child) -> FolderElement<'_, 'a> {
    match child {
      Child::File(id) => FolderElement::File(&self.files[id]),
      Child::Directory(id) => FolderElement::Directory(&self.directories[id]),
    }
  }

  pub fn directory_count(&self) -> usize {
    self.directories.len()
  }

  pub fn file_count(&self) -> usize {
    self.files.len()
  }

  /// Sizes every directory block under both schemes.
  pub fn compute_sizes(&mut self) -> Result<()> {
    for id in 0..self.directories.len() {
      for scheme in NameScheme::ALL {
        let mut lengths = Vec::with_capacity(self.directories[id].children.len());
        for &child in &self.directories[id].children {
          let element = self.element(child);
          let length = element.record_length(scheme);
          if length > spec::MAX_RECORD_LENGTH {
            return Err(Error::overflow(
              format!("directory record {:?}", element.name(scheme)),
              length,
            ));
          }
          lengths.push(length);
        }

        let sectors = directory_sectors(lengths);
        let directory = &mut self.directories[id];
        debug_assert!(directory.sectors[scheme.index()].is_none());
        directory.sectors[scheme.index()] = Some(sectors);
      }
    }
    Ok(())
  }

  /// Directories in level order: by level, then by parent position, then by name.
  pub fn level_order(&self) -> Vec<DirectoryId> {
    let mut order = Vec::with_capacity(self.directories.len());
    let mut queue = VecDeque::from([ROOT]);

    while let Some(id) = queue.pop_front() {
      order.push(id);
      queue.extend(self.subdirectories(id));
    }

    order
  }

  /// Files in depth first order, each directory's files before its subdirectories.
  pub fn files_depth_first(&self) -> Vec<FileId> {
    let mut order = Vec::with_capacity(self.files.len());
    let mut stack = vec![ROOT];

    while let Some(id) = stack.pop() {
      order.extend(self.directories[id].children.iter().filter_map(|child| match child {
        Child::File(file) => Some(*file),
        Child::Directory(_) => None,
      }));
      let subdirectories: Vec<_> = self.subdirectories(id).collect();
      stack.extend(subdirectories.into_iter().rev());
    }

    order
  }

  pub fn subdirectories(&self, id: DirectoryId) -> impl Iterator<Item = DirectoryId> + '_ {
    self.directories[id].children.iter().filter_map(|child| match child {
      Child::Directory(directory) => Some(*directory),
      Child::File(_) => None,
    })
  }

  /// Directory sectors of one scheme.
  pub fn directory_sectors(&self, scheme: NameScheme) -> u32 {
    self.directories.iter().map(|d| d.sectors(scheme)).sum()
  }

  /// Directory sectors of both schemes.
  pub fn total_dir_sectors(&self) -> u32 {
    NameScheme::ALL.iter().map(|&scheme| self.directory_sectors(scheme)).sum()
  }

  pub fn file_sectors(&self) -> u32 {
    self.files.iter().map(FileElement::sectors).sum()
  }

  /// Directory sectors of both schemes plus the payload of every file.
  pub fn total_sectors(&self) -> u32 {
    self.total_dir_sectors() + self.file_sectors()
  }

  pub(crate) fn set_directory_extent(&mut self, id: DirectoryId, scheme: NameScheme, extent: u32) {
    let slot = &mut self.directories[id].extents[scheme.index()];
    debug_assert!(slot.is_none(), "directory extent assigned twice");
    *slot = Some(extent);
  }

  pub(crate) fn set_file_extent(&mut self, id: FileId, extent: u32) {
    let slot = &mut self.files[id].extent;
    debug_assert!(slot.is_none(), "file extent assigned twice");
    *slot = Some(extent);
  }

  pub(crate) fn set_number(&mut self, id: DirectoryId, number: u16) {
    let slot = &mut self.directories[id].number;
    debug_assert!(slot.is_none(), "directory numbered twice");
    *slot = Some(number);
  }
}
