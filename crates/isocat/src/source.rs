//! The caller supplied tree an image is built from.

use crate::{
  path::IsoPath,
  spec,
};

use super::prelude::*;
use chrono::{DateTime, Local, NaiveDateTime};
use std::{
  io::Read,
  path::{Path, PathBuf},
};

/// Where the bytes of a file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
  /// File on the host filesystem, opened when the image is written.
  Disk(PathBuf),
  /// Content held in memory.
  InMemory(Vec<u8>),
  /// No content at all. Only usable for catalog builds.
  Virtual,
}

impl FileContent {
  pub fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
    match self {
      FileContent::Disk(path) => Ok(Box::new(std::fs::File::open(path)?)),
      FileContent::InMemory(bytes) => Ok(Box::new(bytes.as_slice())),
      FileContent::Virtual => Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "virtual file has no content",
      )),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
  File { length: u64, content: FileContent },
  Directory { children: Vec<SourceNode> },
}

/// A file or directory of the input tree.
///
/// The order of a directory's children is the order names are disambiguated in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNode {
  pub name: String,
  pub created: NaiveDateTime,
  pub kind: SourceKind,
}

impl SourceNode {
  /// Empty directory dated [spec::no_date].
  pub fn directory(name: impl Into<String>) -> Self {
    Self::tree(name, Vec::new())
  }

  pub fn tree(name: impl Into<String>, children: Vec<SourceNode>) -> Self {
    Self {
      name: name.into(),
      created: spec::no_date(),
      kind: SourceKind::Directory { children },
    }
  }

  /// File of `length` bytes without content, as listed by a catalog.
  pub fn file(name: impl Into<String>, length: u64) -> Self {
    Self {
      name: name.into(),
      created: spec::no_date(),
      kind: SourceKind::File {
        length,
        content: FileContent::Virtual,
      },
    }
  }

  pub fn in_memory(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    let bytes = bytes.into();
    Self {
      name: name.into(),
      created: spec::no_date(),
      kind: SourceKind::File {
        length: bytes.len() as u64,
        content: FileContent::InMemory(bytes),
      },
    }
  }

  pub fn disk(name: impl Into<String>, path: impl Into<PathBuf>, length: u64) -> Self {
    Self {
      name: name.into(),
      created: spec::no_date(),
      kind: SourceKind::File {
        length,
        content: FileContent::Disk(path.into()),
      },
    }
  }

  pub fn with_created(mut self, created: NaiveDateTime) -> Self {
    self.created = created;
    self
  }

  pub fn is_directory(&self) -> bool {
    matches!(self.kind, SourceKind::Directory { .. })
  }

  /// Declared length of a file, zero for directories.
  pub fn length(&self) -> u64 {
    match &self.kind {
      SourceKind::File { length, .. } => *length,
      SourceKind::Directory { .. } => 0,
    }
  }

  pub fn content(&self) -> Option<&FileContent> {
    match &self.kind {
      SourceKind::File { content, .. } => Some(content),
      SourceKind::Directory { .. } => None,
    }
  }

  pub fn children(&self) -> &[SourceNode] {
    match &self.kind {
      SourceKind::Directory { children } => children,
      SourceKind::File { .. } => &[],
    }
  }

  fn children_mut(&mut self) -> Result<&mut Vec<SourceNode>> {
    match &mut self.kind {
      SourceKind::Directory { children } => Ok(children),
      SourceKind::File { .. } => Err(Error::NotADirectory(PathBuf::from(&self.name))),
    }
  }

  /// Appends a child without looking for an existing one of the same name.
  pub fn push(&mut self, child: SourceNode) -> Result<()> {
    self.children_mut()?.push(child);
    Ok(())
  }

  /// Inserts `node` at `path`, creating missing intermediate directories. The last
  /// component of `path` becomes the node's name.
  ///
  /// An existing file of the same name is replaced; an existing directory receives the
  /// children of an inserted directory.
  pub fn insert<'p>(&mut self, path: impl Into<IsoPath<'p>>, node: SourceNode) -> Result<()> {
    let path = path.into();
    let Some(name) = path.file_name() else {
      return Err(Error::NotAFile(PathBuf::from(path.as_str())));
    };
    self.insert_components(path.parent_components(), name, node)
  }

  fn insert_components<'p>(
    &mut self,
    parents: impl Iterator<Item = &'p str>,
    name: &str,
    mut node: SourceNode,
  ) -> Result<()> {
    let mut directory = self;
    for part in parents {
      let children = directory.children_mut()?;
      let index = match children.iter().position(|child| child.name == part) {
        Some(index) => index,
        None => {
          log::trace!("Scaffolding directory {part:?}");
          children.push(SourceNode::directory(part));
          children.len() - 1
        }
      };
      directory = &mut children[index];
    }

    node.name = name.to_owned();
    let children = directory.children_mut()?;
    match children.iter_mut().find(|child| child.name == name) {
      Some(existing) => existing.merge(node),
      None => {
        children.push(node);
        Ok(())
      }
    }
  }

  fn merge(&mut self, other: SourceNode) -> Result<()> {
    match (self.is_directory(), other) {
      (
        true,
        SourceNode {
          created,
          kind: SourceKind::Directory { children },
          ..
        },
      ) => {
        self.created = created;
        for child in children {
          let name = child.name.clone();
          self.insert_components(std::iter::empty(), &name, child)?;
        }
        Ok(())
      }
      (_, other) => {
        *self = other;
        Ok(())
      }
    }
  }

  /// Every node below this one, depth first, parents before their children.
  pub fn descendants(&self) -> Descendants<'_> {
    Descendants {
      stack: self.children().iter().rev().collect(),
    }
  }

  /// Captures the directory at `path` and everything below it.
  ///
  /// Entries are visited sorted by file name. Symbolic links and special files are
  /// skipped.
  pub fn capture(path: impl AsRef<Path>) -> Result<Self> {
    let root = path.as_ref();
    let metadata = std::fs::metadata(root)?;
    if !metadata.is_dir() {
      return Err(Error::NotADirectory(root.to_path_buf()));
    }

    let name = root
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let mut captured = SourceNode::directory(name).with_created(created_at(&metadata));

    for entry in walkdir::WalkDir::new(root)
      .min_depth(1)
      .sort_by_file_name()
    {
      let entry = entry?;
      let Ok(relative) = entry.path().strip_prefix(root) else {
        continue;
      };
      let components: Vec<String> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect();
      let Some((name, parents)) = components.split_last() else {
        continue;
      };

      let file_type = entry.file_type();
      if !file_type.is_dir() && !file_type.is_file() {
        log::warn!("Skipping {}: not a regular file or directory", entry.path().display());
        continue;
      }

      let metadata = entry.metadata()?;
      let node = match file_type.is_dir() {
        true => SourceNode::directory(name.as_str()),
        false => SourceNode::disk(name.as_str(), entry.path(), metadata.len()),
      }
      .with_created(created_at(&metadata));
      log::trace!("Captured {}", entry.path().display());
      captured.insert_components(parents.iter().map(String::as_str), name, node)?;
    }

    Ok(captured)
  }
}

/// Creation time, falling back to the modification time and then to [spec::no_date].
fn created_at(metadata: &std::fs::Metadata) -> NaiveDateTime {
  metadata
    .created()
    .or_else(|_| metadata.modified())
    .map(|time| DateTime::<Local>::from(time).naive_local())
    .unwrap_or_else(|_| spec::no_date())
}

pub struct Descendants<'a> {
  stack: Vec<&'a SourceNode>,
}

impl<'a> Iterator for Descendants<'a> {
  type Item = &'a SourceNode;

  fn next(&mut self) -> Option<Self::Item> {
    let node = self.stack.pop()?;
    self.stack.extend(node.children().iter().rev());
    Some(node)
  }
}
