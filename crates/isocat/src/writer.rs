//! High-level interface for writing ISO 9660 images with Joliet extensions.

use crate::{
  layout::{self, ImageLayout, PathTableLocation, SchemeLayout},
  lba::LbaAllocator,
  path_table::{self, PathTable},
  progress::{AbortSignal, Progress, ProgressSink},
  serialize::{Endianness, IsoSerialize},
  source::SourceNode,
  spec::{self, FileFlags, Identifier, NameScheme, NumericalDate},
  tree::{Child, DirectoryId, Tree},
};

use super::prelude::*;
use chrono::{Local, NaiveDateTime};
use std::{
  io::{Read, Write},
  path::Path,
};

/// Message passed to [ProgressSink::finished] once an image is complete.
pub const FINISHED_MESSAGE: &str = "ISO writing process finished successfully";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
  /// File contents follow the directory structures.
  #[default]
  Payload,
  /// Files are listed with their lengths but take no sectors.
  Catalog,
}

#[derive(Debug, Clone)]
pub struct IsoWriterOptions {
  /// Upper-cased for the primary volume; cut to 16 characters for Joliet.
  pub volume_name: String,
  pub mode: BuildMode,
  pub system_identifier: String,
  pub publisher_identifier: String,
  pub preparer_identifier: String,
  pub application_identifier: String,
  /// Offset from GMT in 15 minute intervals, recorded with every date.
  pub timezone_offset: i8,
  /// Creation and modification date of the volume, the current time when unset.
  pub creation_date: Option<NaiveDateTime>,
}

impl IsoWriterOptions {
  pub fn catalog(volume_name: impl Into<String>) -> Self {
    Self {
      volume_name: volume_name.into(),
      mode: BuildMode::Catalog,
      ..Default::default()
    }
  }
}

impl Default for IsoWriterOptions {
  fn default() -> Self {
    Self {
      volume_name: "CDROM".to_owned(),
      mode: BuildMode::Payload,
      system_identifier: String::new(),
      publisher_identifier: String::new(),
      preparer_identifier: String::new(),
      application_identifier: "ISOCAT".to_owned(),
      timezone_offset: spec::DEFAULT_TIMEZONE_OFFSET,
      creation_date: None,
    }
  }
}

/// Steps of a build, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuildState {
  Init,
  SizePass,
  ExtentPassPrimary,
  PathTablePrimary,
  ExtentPassSecondary,
  PathTableSecondary,
  FileExtentAssignment,
  Serialize,
  Done,
}

impl BuildState {
  pub fn label(self) -> &'static str {
    match self {
      BuildState::Init => "Initializing...",
      BuildState::SizePass => "Initializing ISO root directory...",
      BuildState::ExtentPassPrimary => "Preparing first set of directory extents...",
      BuildState::PathTablePrimary => "Preparing first set of path tables...",
      BuildState::ExtentPassSecondary => "Preparing second set of directory extents...",
      BuildState::PathTableSecondary => "Preparing second set of path tables...",
      BuildState::FileExtentAssignment => "Preparing file extents...",
      BuildState::Serialize => "Writing data to file...",
      BuildState::Done => FINISHED_MESSAGE,
    }
  }
}

const NUMBERING_LABEL: &str = "Calculating directory numbers...";

#[derive(Debug)]
pub enum BuildOutcome {
  Completed(ImageLayout),
  Aborted(Error),
}

impl BuildOutcome {
  pub fn is_completed(&self) -> bool {
    matches!(self, BuildOutcome::Completed(_))
  }

  pub fn layout(&self) -> Option<&ImageLayout> {
    match self {
      BuildOutcome::Completed(layout) => Some(layout),
      BuildOutcome::Aborted(_) => None,
    }
  }

  pub fn into_result(self) -> Result<ImageLayout> {
    match self {
      BuildOutcome::Completed(layout) => Ok(layout),
      BuildOutcome::Aborted(error) => Err(error),
    }
  }
}

/// Writes sectors sequentially, tracking how much has been written.
struct SectorWriter<Storage> {
  storage: Storage,
  sector_size: u64,
  written: u64,
}

impl<Storage: Write> SectorWriter<Storage> {
  fn new(storage: Storage, sector_size: u64) -> Self {
    Self {
      storage,
      sector_size,
      written: 0,
    }
  }

  /// Write `buf`, then pad with zeros up to the next sector boundary.
  fn write_aligned(&mut self, buf: &[u8]) -> std::io::Result<()> {
    self.storage.write_all(buf)?;
    self.written += buf.len() as u64;
    self.pad_to_sector()
  }

  fn write_zero_sectors(&mut self, count: u32) -> std::io::Result<()> {
    let zeros = vec![0; self.sector_size as usize];
    for _ in 0..count {
      self.write_aligned(&zeros)?;
    }
    Ok(())
  }

  /// Copies at most `length` bytes from `reader` and returns how many were copied.
  fn copy_from(&mut self, reader: &mut dyn Read, length: u64) -> std::io::Result<u64> {
    let copied = std::io::copy(&mut reader.take(length), &mut self.storage)?;
    self.written += copied;
    Ok(copied)
  }

  fn pad_to_sector(&mut self) -> std::io::Result<()> {
    let remainder = self.written % self.sector_size;
    if remainder != 0 {
      let padding = vec![0; (self.sector_size - remainder) as usize];
      self.storage.write_all(&padding)?;
      self.written += padding.len() as u64;
    }
    Ok(())
  }

  fn sectors(&self) -> u64 {
    self.written.div_ceil(self.sector_size)
  }

  fn finish(mut self) -> std::io::Result<Storage> {
    self.storage.flush()?;
    Ok(self.storage)
  }
}

/// Tracks the current state and forwards progress of one build.
struct Build<'b, S: ?Sized, A: ?Sized> {
  sink: &'b mut S,
  abort: &'b A,
  state: BuildState,
}

impl<S, A> Build<'_, S, A>
where
  S: ProgressSink + ?Sized,
  A: AbortSignal + ?Sized,
{
  fn check(&self) -> Result<()> {
    match self.abort.is_aborted() {
      true => Err(Error::Cancelled),
      false => Ok(()),
    }
  }

  fn enter(&mut self, state: BuildState, maximum: u64) -> Result<()> {
    self.check()?;
    debug_assert!(state > self.state || state == BuildState::Init);
    log::info!("{:?} -> {:?}", self.state, state);
    self.state = state;
    self.report(state.label(), 0, maximum);
    Ok(())
  }

  fn report(&mut self, action: &str, current: u64, maximum: u64) {
    self.sink.progress(&Progress {
      current,
      maximum,
      action: action.to_owned(),
    });
  }
}

/// Layout decisions of one scheme, kept until its structures are written.
struct SchemePlan {
  scheme: NameScheme,
  table: PathTable,
  type_l: u32,
  type_m: u32,
}

impl SchemePlan {
  fn layout(&self, tree: &Tree) -> SchemeLayout {
    SchemeLayout {
      root_extent: tree.root().extent(self.scheme).unwrap_or_default(),
      directory_sectors: tree.directory_sectors(self.scheme),
      path_table: PathTableLocation {
        type_l: self.type_l,
        type_m: self.type_m,
        size: self.table.size(),
        sectors: self.table.sectors(),
      },
    }
  }
}

#[derive(Debug)]
pub struct IsoWriter {
  options: IsoWriterOptions,
}

impl IsoWriter {
  pub fn new(options: IsoWriterOptions) -> Self {
    Self { options }
  }

  pub fn options(&self) -> &IsoWriterOptions {
    &self.options
  }

  /// Writes the image of `source` to `writer`, reporting progress to `sink` and polling
  /// `abort` between steps.
  ///
  /// Completion and aborts are not reported here; see [IsoWriter::run].
  pub fn write<W, S, A>(
    &self,
    source: &SourceNode,
    writer: W,
    sink: &mut S,
    abort: &A,
  ) -> Result<ImageLayout>
  where
    W: Write,
    S: ProgressSink + ?Sized,
    A: AbortSignal + ?Sized,
  {
    let mut build = Build {
      sink,
      abort,
      state: BuildState::Init,
    };

    // 1. Name every element.

    build.enter(BuildState::Init, 1)?;
    let mut tree = Tree::build(source)?;

    // 2. Size every directory under both schemes.

    build.enter(BuildState::SizePass, tree.directory_count() as u64)?;
    tree.compute_sizes()?;

    // 3. Primary directories, then their path tables, starting right after the descriptors.

    let mut allocator = LbaAllocator::after_descriptors();

    build.enter(BuildState::ExtentPassPrimary, tree.directory_count() as u64)?;
    let order = layout::assign_directory_extents(&mut tree, NameScheme::Primary, &mut allocator);

    build.enter(BuildState::PathTablePrimary, order.len() as u64)?;
    build.report(NUMBERING_LABEL, 0, order.len() as u64);
    path_table::number_directories(&mut tree, &order)?;
    let primary = self.plan_path_table(&tree, &order, NameScheme::Primary, &mut allocator)?;

    // 4. Joliet directories and path tables.

    build.enter(BuildState::ExtentPassSecondary, tree.directory_count() as u64)?;
    let joliet_order =
      layout::assign_directory_extents(&mut tree, NameScheme::Joliet, &mut allocator);
    debug_assert_eq!(order, joliet_order);

    build.enter(BuildState::PathTableSecondary, order.len() as u64)?;
    let joliet = self.plan_path_table(&tree, &order, NameScheme::Joliet, &mut allocator)?;

    // 5. File payload.

    let first_file_extent = match self.options.mode {
      BuildMode::Payload => {
        build.enter(BuildState::FileExtentAssignment, tree.file_count() as u64)?;
        let first = allocator.next_lba();
        layout::assign_file_extents(&mut tree, &mut allocator);
        Some(first)
      }
      BuildMode::Catalog => None,
    };

    let content_sectors = match self.options.mode {
      BuildMode::Payload => tree.total_sectors(),
      BuildMode::Catalog => tree.total_dir_sectors(),
    };
    let volume_space_size = spec::FIRST_DIRECTORY_LBA
      + content_sectors
      + 2 * primary.table.sectors()
      + 2 * joliet.table.sectors();
    debug_assert_eq!(volume_space_size, allocator.next_lba());

    let layout = ImageLayout {
      volume_space_size,
      directories: tree.directory_count(),
      files: tree.file_count(),
      primary: primary.layout(&tree),
      joliet: joliet.layout(&tree),
      first_file_extent,
    };

    // 6. Everything in sector order.

    build.enter(BuildState::Serialize, volume_space_size as u64)?;
    let mut out = SectorWriter::new(writer, spec::SECTOR_SIZE as u64);

    out.write_zero_sectors(spec::SYSTEM_AREA_SECTORS)?;
    for plan in [&primary, &joliet] {
      let descriptor = self.volume_descriptor(&tree, plan, volume_space_size);
      out.write_aligned(&descriptor.to_bytes(&mut ())?)?;
    }
    out.write_aligned(&spec::VolumeDescriptorSetTerminator.to_bytes(&mut ())?)?;
    log::debug!("Wrote volume descriptors");

    for plan in [&primary, &joliet] {
      for &id in &order {
        build.check()?;
        let block = directory_block(&tree, id, plan.scheme, self.options.timezone_offset)?;
        out.write_aligned(&block)?;
        log::debug!(
          "Wrote {:?} directory {:?} ({} bytes)",
          plan.scheme,
          tree.directory(id).names.name(plan.scheme),
          block.len()
        );
        build.report(BuildState::Serialize.label(), out.sectors(), volume_space_size as u64);
      }

      debug_assert_eq!(out.sectors(), plan.type_l as u64);
      out.write_aligned(&plan.table.to_bytes(Endianness::Little)?)?;
      debug_assert_eq!(out.sectors(), plan.type_m as u64);
      out.write_aligned(&plan.table.to_bytes(Endianness::Big)?)?;
      log::debug!("Wrote {:?} path tables", plan.scheme);
    }

    if self.options.mode == BuildMode::Payload {
      for id in tree.files_depth_first() {
        build.check()?;
        let file = tree.file(id);
        if file.length == 0 {
          continue;
        }

        debug_assert_eq!(file.extent().map(u64::from), Some(out.sectors()));
        let expected = file.length as u64;
        let copied = match file.source.content() {
          Some(content) => out.copy_from(&mut *content.open()?, expected)?,
          None => 0,
        };
        if copied != expected {
          return Err(Error::ContentLength {
            name: file.source.name.clone(),
            expected,
            actual: copied,
          });
        }
        out.pad_to_sector()?;
        log::debug!("Wrote file {:?} ({expected} bytes)", file.names.long);
        build.report(BuildState::Serialize.label(), out.sectors(), volume_space_size as u64);
      }
    }

    debug_assert_eq!(out.sectors(), volume_space_size as u64);
    out.finish()?;

    build.state = BuildState::Done;
    log::info!("Image complete: {volume_space_size} sectors");

    Ok(layout)
  }

  /// Like [IsoWriter::write], but reports the outcome to `sink` as well.
  pub fn run<W, S, A>(&self, source: &SourceNode, writer: W, sink: &mut S, abort: &A) -> BuildOutcome
  where
    W: Write,
    S: ProgressSink + ?Sized,
    A: AbortSignal + ?Sized,
  {
    let result = self.write(source, writer, sink, abort);
    conclude(result, sink)
  }

  fn plan_path_table(
    &self,
    tree: &Tree,
    order: &[DirectoryId],
    scheme: NameScheme,
    allocator: &mut LbaAllocator,
  ) -> Result<SchemePlan> {
    let table = PathTable::build(tree, order, scheme)?;
    let type_l = table.allocate_type_l_lba(allocator);
    let type_m = table.allocate_type_m_lba(allocator);
    Ok(SchemePlan {
      scheme,
      table,
      type_l,
      type_m,
    })
  }

  fn volume_descriptor(
    &self,
    tree: &Tree,
    plan: &SchemePlan,
    volume_space_size: u32,
  ) -> spec::VolumeDescriptor {
    let options = &self.options;
    let scheme = plan.scheme;
    let text = |value: &str| match scheme {
      NameScheme::Primary => value.to_ascii_uppercase(),
      NameScheme::Joliet => value.to_owned(),
    };
    let volume_identifier = match scheme {
      NameScheme::Primary => options.volume_name.to_ascii_uppercase(),
      NameScheme::Joliet => options.volume_name.chars().take(16).collect(),
    };

    let created = options.creation_date.unwrap_or_else(|| Local::now().naive_local());
    let date = spec::DigitsDate::from_datetime(created, options.timezone_offset);
    let root = tree.root();

    spec::VolumeDescriptor {
      descriptor_type: scheme.descriptor_type(),
      standard_identifier: spec::StandardIdentifier::Cd001,
      system_identifier: text(&options.system_identifier),
      volume_identifier,
      volume_space_size,
      volume_set_size: 1,
      volume_sequence_number: 1,
      logical_block_size: spec::SECTOR_SIZE as u16,
      path_table_size: plan.table.size(),
      type_l_path_table_location: plan.type_l,
      optional_type_l_path_table_location: 0,
      type_m_path_table_location: plan.type_m,
      optional_type_m_path_table_location: 0,
      root_directory_record: spec::DirectoryRecord {
        extent_location: root.extent(scheme).unwrap_or_default(),
        data_length: root.size(scheme),
        recording_date: NumericalDate::from_datetime(root.created, options.timezone_offset),
        file_flags: FileFlags::DIRECTORY,
        file_identifier: Identifier::root_directory(),
      },
      volume_set_identifier: String::new(),
      publisher_identifier: text(&options.publisher_identifier),
      data_preparer_identifier: text(&options.preparer_identifier),
      application_identifier: text(&options.application_identifier),
      copyright_file_identifier: String::new(),
      abstract_file_identifier: String::new(),
      bibliographic_file_identifier: String::new(),
      creation_date: date,
      modification_date: date,
      expiration_date: spec::DigitsDate::unspecified(),
      effective_date: spec::DigitsDate::unspecified(),
    }
  }
}

/// Record block of one directory under `scheme`: `.`, `..`, then every child, padded to
/// whole sectors. Records that would cross a sector boundary start the next sector.
fn directory_block(
  tree: &Tree,
  id: DirectoryId,
  scheme: NameScheme,
  timezone_offset: i8,
) -> Result<Vec<u8>> {
  let directory = tree.directory(id);
  let parent = tree.directory(directory.parent);
  let sector = spec::SECTOR_SIZE as usize;

  let mut block = vec![0; directory.size(scheme) as usize];
  let mut offset = 0;

  let mut place = |record: spec::DirectoryRecord| -> Result<()> {
    let length = record.extent();
    let position = offset % sector;
    if position + length > sector {
      offset += sector - position;
    }
    record.serialize(&mut (), &mut block[offset..])?;
    log::trace!(
      "{scheme:?} record {:?} at byte {offset}",
      record.file_identifier.decode()
    );
    offset += length;
    Ok(())
  };

  for (identifier, element) in [
    (Identifier::current_directory(), directory),
    (Identifier::parent_directory(), parent),
  ] {
    place(spec::DirectoryRecord {
      extent_location: element.extent(scheme).unwrap_or_default(),
      data_length: element.size(scheme),
      recording_date: NumericalDate::from_datetime(element.created, timezone_offset),
      file_flags: FileFlags::DIRECTORY,
      file_identifier: identifier,
    })?;
  }

  for &child in &directory.children {
    let element = tree.element(child);
    let (file_flags, file_identifier) = match child {
      Child::Directory(_) => (
        FileFlags::DIRECTORY,
        Identifier::directory(element.name(scheme), scheme)?,
      ),
      Child::File(_) => (FileFlags::empty(), Identifier::file(element.name(scheme), scheme)?),
    };

    place(spec::DirectoryRecord {
      extent_location: element.extent(scheme).unwrap_or_default(),
      data_length: element.size(scheme),
      recording_date: NumericalDate::from_datetime(element.created(), timezone_offset),
      file_flags,
      file_identifier,
    })?;
  }

  Ok(block)
}

fn conclude<S: ProgressSink + ?Sized>(result: Result<ImageLayout>, sink: &mut S) -> BuildOutcome {
  match result {
    Ok(layout) => {
      sink.finished(FINISHED_MESSAGE);
      BuildOutcome::Completed(layout)
    }
    Err(error) => {
      sink.aborted(&error.to_string());
      BuildOutcome::Aborted(error)
    }
  }
}

/// Builds an image of the directory at `source`, file contents included.
pub fn build_from_directory<S, A>(
  source: impl AsRef<Path>,
  destination: impl AsRef<Path>,
  volume_name: &str,
  sink: &mut S,
  abort: &A,
) -> BuildOutcome
where
  S: ProgressSink + ?Sized,
  A: AbortSignal + ?Sized,
{
  let writer = IsoWriter::new(IsoWriterOptions {
    volume_name: volume_name.to_owned(),
    mode: BuildMode::Payload,
    ..Default::default()
  });

  let result = SourceNode::capture(source).and_then(|tree| {
    let file = std::fs::File::create(destination.as_ref())?;
    writer.write(&tree, std::io::BufWriter::new(file), sink, abort)
  });
  conclude(result, sink)
}

/// Builds a catalog image of `source`: the directory structure with every file listed
/// but no file contents. The volume is named after the root of `source`.
pub fn build_from_tree<S, A>(
  source: &SourceNode,
  destination: impl AsRef<Path>,
  sink: &mut S,
  abort: &A,
) -> BuildOutcome
where
  S: ProgressSink + ?Sized,
  A: AbortSignal + ?Sized,
{
  let writer = IsoWriter::new(IsoWriterOptions::catalog(source.name.as_str()));

  let result = std::fs::File::create(destination.as_ref())
    .map_err(Error::from)
    .and_then(|file| writer.write(source, std::io::BufWriter::new(file), sink, abort));
  conclude(result, sink)
}
