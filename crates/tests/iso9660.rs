use chrono::{NaiveDate, NaiveDateTime};
use isocat::{
  error::{Error, ErrorKind},
  layout::{self, ImageLayout},
  lba::LbaAllocator,
  name::{self, ElementNames},
  path_table,
  progress::{BuildEvent, CancelToken, FnSink, NeverAbort, NoProgress},
  serialize::{read_both_u16, read_both_u32},
  spec::{self, Identifier, NameScheme},
  tree::Tree,
  BuildMode, BuildOutcome, IsoWriter, IsoWriterOptions, SourceNode,
};

const SECTOR: usize = 2048;

fn fixed_date() -> NaiveDateTime {
  NaiveDate::from_ymd_opt(2024, 5, 17)
    .unwrap()
    .and_hms_milli_opt(10, 30, 15, 250)
    .unwrap()
}

fn options(volume_name: &str, mode: BuildMode) -> IsoWriterOptions {
  IsoWriterOptions {
    volume_name: volume_name.to_owned(),
    mode,
    creation_date: Some(fixed_date()),
    ..Default::default()
  }
}

fn build(source: &SourceNode, options: IsoWriterOptions) -> (Vec<u8>, ImageLayout) {
  let mut image = Vec::new();
  let layout = IsoWriter::new(options)
    .write(source, &mut image, &mut NoProgress, &NeverAbort)
    .unwrap();
  (image, layout)
}

fn sector(image: &[u8], lba: u32) -> &[u8] {
  let start = lba as usize * SECTOR;
  &image[start..start + SECTOR]
}

/// Every directory record of a block, `.` and `..` included.
fn records(block: &[u8]) -> Vec<&[u8]> {
  let mut records = Vec::new();
  for sector in block.chunks(SECTOR) {
    let mut offset = 0;
    while offset < SECTOR && sector[offset] != 0 {
      let length = sector[offset] as usize;
      records.push(&sector[offset..offset + length]);
      offset += length;
    }
  }
  records
}

fn identifier(record: &[u8]) -> &[u8] {
  let length = record[32] as usize;
  &record[33..33 + length]
}

fn ucs2(text: &str) -> Vec<u8> {
  text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

fn report_tree(content: bool) -> SourceNode {
  let report = match content {
    true => SourceNode::in_memory("report.txt", vec![b'r'; 100]),
    false => SourceNode::file("report.txt", 100),
  };
  SourceNode::tree("root", vec![report.with_created(fixed_date())]).with_created(fixed_date())
}

#[test]
fn empty_root_directory() {
  let source = SourceNode::directory("EMPTY");
  let (image, layout) = build(&source, options("EMPTY", BuildMode::Payload));

  // 19 + one root block per scheme + four one-sector path tables.
  assert_eq!(layout.volume_space_size, 25);
  assert_eq!(image.len(), 25 * SECTOR);
  assert!(image[..16 * SECTOR].iter().all(|&byte| byte == 0));

  let pvd = sector(&image, 16);
  assert_eq!(pvd[0], 1);
  assert_eq!(&pvd[1..6], b"CD001");
  assert_eq!(pvd[6], 1);
  assert_eq!(&pvd[40..72], format!("{:32}", "EMPTY").as_bytes());
  assert_eq!(read_both_u32(&pvd[80..88]), Some(25));
  assert!(pvd[88..120].iter().all(|&byte| byte == 0));
  assert_eq!(read_both_u16(&pvd[128..132]), Some(2048));
  assert_eq!(pvd[881], 1);

  // Root record: one sector at LBA 19.
  let root = &pvd[156..190];
  assert_eq!(root[0], 34);
  assert_eq!(read_both_u32(&root[2..10]), Some(19));
  assert_eq!(read_both_u32(&root[10..18]), Some(2048));
  assert_eq!(root[25], 0x02);

  let svd = sector(&image, 17);
  assert_eq!(svd[0], 2);
  assert_eq!(&svd[1..6], b"CD001");
  assert_eq!(&svd[88..91], b"%/E");
  assert_eq!(read_both_u32(&svd[156 + 2..156 + 10]), Some(22));

  let terminator = sector(&image, 18);
  assert_eq!(&terminator[..7], &[255, b'C', b'D', b'0', b'0', b'1', 1]);
  assert!(terminator[7..].iter().all(|&byte| byte == 0));

  let block = sector(&image, 19);
  let entries = records(block);
  assert_eq!(entries.len(), 2);
  assert_eq!(identifier(entries[0]), &[0]);
  assert_eq!(identifier(entries[1]), &[1]);
  assert!(block[68..].iter().all(|&byte| byte == 0));
}

#[test]
fn single_file_names_and_payload() {
  let source = report_tree(true);
  let (image, layout) = build(&source, options("REPORTS", BuildMode::Payload));

  assert_eq!(layout.first_file_extent, Some(25));
  assert_eq!(layout.volume_space_size, 26);

  let primary = records(sector(&image, layout.primary.root_extent));
  assert_eq!(identifier(primary[2]), b"REPORT_0;1");
  assert_eq!(read_both_u32(&primary[2][2..10]), Some(25));
  assert_eq!(read_both_u32(&primary[2][10..18]), Some(100));
  assert_eq!(primary[2][25], 0);

  let joliet = records(sector(&image, layout.joliet.root_extent));
  assert_eq!(identifier(joliet[2]), ucs2("report.txt;1").as_slice());
  assert_eq!(read_both_u32(&joliet[2][2..10]), Some(25));

  let payload = sector(&image, 25);
  assert!(payload[..100].iter().all(|&byte| byte == b'r'));
  assert!(payload[100..].iter().all(|&byte| byte == 0));
}

#[test]
fn catalog_matches_payload_structure() {
  let payload_source = report_tree(true);
  let catalog_source = report_tree(false);
  let (payload, payload_layout) = build(&payload_source, options("REPORTS", BuildMode::Payload));
  let (catalog, catalog_layout) = build(&catalog_source, options("REPORTS", BuildMode::Catalog));

  assert_eq!(payload_layout.volume_space_size, 26);
  assert_eq!(catalog_layout.volume_space_size, 25);
  assert_eq!(catalog.len(), 25 * SECTOR);
  assert_eq!(catalog_layout.first_file_extent, None);
  assert_eq!(payload_layout.primary, catalog_layout.primary);
  assert_eq!(payload_layout.joliet, catalog_layout.joliet);

  for scheme in NameScheme::ALL {
    let scheme_layout = catalog_layout.scheme(scheme);
    for lba in [scheme_layout.path_table.type_l, scheme_layout.path_table.type_m] {
      assert_eq!(sector(&payload, lba), sector(&catalog, lba));
    }

    let payload_block = sector(&payload, scheme_layout.root_extent);
    let catalog_block = sector(&catalog, scheme_layout.root_extent);
    let payload_records = records(payload_block);
    let catalog_records = records(catalog_block);
    assert_eq!(payload_records[..2], catalog_records[..2]);

    // Only the file's extent differs.
    let (payload_file, catalog_file) = (payload_records[2], catalog_records[2]);
    assert_eq!(read_both_u32(&catalog_file[2..10]), Some(0));
    assert_eq!(read_both_u32(&payload_file[2..10]), Some(25));
    assert_eq!(payload_file[..2], catalog_file[..2]);
    assert_eq!(payload_file[10..], catalog_file[10..]);
  }
}

#[test]
fn nine_character_names_keep_their_prefix() {
  let mut children = vec![SourceNode::directory("abcdefghi")];
  children.extend((1..12).map(|i| SourceNode::directory(format!("dir{i:02}"))));
  let source = SourceNode::tree("root", children);

  let (image, layout) = build(&source, options("NAMES", BuildMode::Catalog));
  let table = sector(&image, layout.primary.path_table.type_l);

  // The record after the root's: 12 siblings give two digit disambiguators.
  assert_eq!(table[10], 8);
  assert_eq!(&table[18..26], b"ABCDEF00");

  for count in [1, 9, 10, 99, 100, 1_000, 100_000] {
    let number = name::child_number(count - 1, count);
    let names = ElementNames::derive("abcdefghi", &number).unwrap();
    let keep = 8 - number.len();
    assert_eq!(&names.short.as_str()[..keep], &"ABCDEFGHI"[..keep]);
    assert_eq!(names.long, "abcdefghi");
  }
}

fn wide_tree() -> SourceNode {
  let leaves = |prefix: &str, count: usize| -> Vec<SourceNode> {
    (0..count)
      .map(|i| SourceNode::file(format!("{prefix} file with a long name {i}.txt"), i as u64 * 700))
      .collect()
  };

  let mut nested = leaves("nested", 30);
  nested.push(SourceNode::tree("deeper", leaves("deep", 5)));

  let mut root = leaves("root", 80);
  root.push(SourceNode::tree("Alpha", nested));
  root.push(SourceNode::tree("beta", leaves("beta", 3)));
  root.push(SourceNode::tree("Gamma", vec![SourceNode::directory("empty")]));
  SourceNode::tree("root", root)
}

#[test]
fn extents_and_path_table_order() {
  let source = wide_tree();
  let mut tree = Tree::build(&source).unwrap();
  tree.compute_sizes().unwrap();

  let mut allocator = LbaAllocator::after_descriptors();
  let order = layout::assign_directory_extents(&mut tree, NameScheme::Primary, &mut allocator);
  path_table::number_directories(&mut tree, &order).unwrap();
  let joliet_order = layout::assign_directory_extents(&mut tree, NameScheme::Joliet, &mut allocator);
  assert_eq!(order, joliet_order);

  for scheme in NameScheme::ALL {
    for pair in order.windows(2) {
      let (previous, next) = (tree.directory(pair[0]), tree.directory(pair[1]));
      assert!(next.extent(scheme).unwrap() >= previous.extent(scheme).unwrap() + previous.sectors(scheme));
      assert_eq!(next.size(scheme) % 2048, 0);
    }
  }

  // Level, then parent number, then name.
  let keys: Vec<_> = order
    .iter()
    .map(|&id| {
      let directory = tree.directory(id);
      (
        directory.level,
        tree.directory(directory.parent).number().unwrap(),
        directory.names.long.clone(),
      )
    })
    .collect();
  assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));

  let numbers: Vec<_> = order.iter().map(|&id| tree.directory(id).number().unwrap()).collect();
  assert_eq!(numbers, (1..=order.len() as u16).collect::<Vec<_>>());

  // The root block holds 84 records and needs more than one sector.
  assert!(tree.root().sectors(NameScheme::Primary) > 1);
  assert!(tree.root().sectors(NameScheme::Joliet) > tree.root().sectors(NameScheme::Primary));
}

#[test]
fn directory_records_are_even_and_never_straddle() {
  let source = wide_tree();
  let (image, layout) = build(&source, options("WIDE", BuildMode::Catalog));

  for scheme in NameScheme::ALL {
    let scheme_layout = layout.scheme(scheme);
    let start = scheme_layout.root_extent as usize * SECTOR;
    let end = start + scheme_layout.directory_sectors as usize * SECTOR;

    for sector in image[start..end].chunks(SECTOR) {
      let mut offset = 0;
      while offset < SECTOR && sector[offset] != 0 {
        let length = sector[offset] as usize;
        assert_eq!(length % 2, 0);
        assert!(offset + length <= SECTOR);
        assert_eq!(33 + sector[offset + 32] as usize + (1 - sector[offset + 32] as usize % 2), length);
        offset += length;
      }
    }
  }
}

#[test]
fn catalog_volume_excludes_file_sectors() {
  let source = wide_tree();
  let (_, catalog) = build(&source, options("WIDE", BuildMode::Catalog));

  let payload_source = {
    fn fill(node: &SourceNode) -> SourceNode {
      match node.is_directory() {
        true => SourceNode::tree(node.name.clone(), node.children().iter().map(fill).collect()),
        false => SourceNode::in_memory(node.name.clone(), vec![0xAA; node.length() as usize]),
      }
    }
    fill(&source)
  };
  let (image, payload) = build(&payload_source, options("WIDE", BuildMode::Payload));

  let file_sectors: u32 = source
    .descendants()
    .filter(|node| !node.is_directory())
    .map(|node| (node.length() as u32).div_ceil(2048))
    .sum();
  assert!(file_sectors > 0);
  assert_eq!(payload.volume_space_size, catalog.volume_space_size + file_sectors);
  assert_eq!(image.len(), payload.volume_space_size as usize * SECTOR);
}

#[test]
fn joliet_identifiers_widen_ascii() {
  for name in ["DOCS", "README", "A_B_C"] {
    let primary = Identifier::directory(name, NameScheme::Primary).unwrap();
    let joliet = Identifier::directory(name, NameScheme::Joliet).unwrap();
    let widened: Vec<u8> = primary.as_bytes().iter().flat_map(|&byte| [0, byte]).collect();
    assert_eq!(joliet.as_bytes(), widened.as_slice());
    assert_eq!(joliet.decode(), name);
  }

  let joliet = Identifier::file("Ünïcödé", NameScheme::Joliet).unwrap();
  assert_eq!(joliet.as_bytes(), ucs2("Ünïcödé;1").as_slice());
  assert_eq!(joliet.decode(), "Ünïcödé;1");
}

#[test]
fn descriptor_text_and_dates() {
  let source = SourceNode::directory("root");
  let options = IsoWriterOptions {
    publisher_identifier: "Publisher".to_owned(),
    ..options("my very long volume name", BuildMode::Catalog)
  };
  let (image, _) = build(&source, options);

  let pvd = sector(&image, 16);
  assert_eq!(&pvd[40..64], b"MY VERY LONG VOLUME NAME");
  assert_eq!(&pvd[318..327], b"PUBLISHER");
  assert_eq!(&pvd[574..580], b"ISOCAT");
  assert_eq!(&pvd[813..830], b"2024051710301525\x08");
  assert_eq!(&pvd[830..847], &pvd[813..830]);
  assert_eq!(&pvd[847..864], b"0000000000000000\x00");
  assert_eq!(&pvd[864..881], b"0000000000000000\x00");

  let svd = sector(&image, 17);
  assert_eq!(&svd[40..72], ucs2("my very long vol").as_slice());
  assert_eq!(&svd[318..336], ucs2("Publisher").as_slice());

  let created: [u8; 17] = svd[813..830].try_into().unwrap();
  let created = spec::DigitsDate::parse(&created).unwrap();
  assert_eq!(created.gmt_offset, 8);
  assert_eq!(created.to_datetime(), Some(fixed_date()));
}

#[test]
fn cancelled_before_start() {
  let token = CancelToken::new();
  token.cancel();

  let mut events = Vec::new();
  let mut sink = FnSink(|event: BuildEvent<'_>| events.push(format!("{event:?}")));
  let outcome = IsoWriter::new(Default::default()).run(
    &SourceNode::directory("root"),
    Vec::<u8>::new(),
    &mut sink,
    &token,
  );
  drop(sink);

  match outcome {
    BuildOutcome::Aborted(error) => {
      assert_eq!(error.kind(), ErrorKind::Cancelled);
      assert_eq!(error.to_string(), "Aborted by user");
    }
    BuildOutcome::Completed(_) => panic!("build was cancelled"),
  }
  assert_eq!(events, [format!("{:?}", BuildEvent::Aborted("Aborted by user"))]);
}

#[test]
fn cancelled_while_writing() {
  let token = CancelToken::new();
  let trigger = token.clone();
  let mut aborted = None;
  let mut finished = false;

  let mut sink = FnSink(|event: BuildEvent<'_>| match event {
    BuildEvent::Progress(progress) if progress.action == "Writing data to file..." => trigger.cancel(),
    BuildEvent::Progress(_) => {}
    BuildEvent::Finished(_) => finished = true,
    BuildEvent::Aborted(message) => aborted = Some(message.to_owned()),
  });

  let mut image = Vec::new();
  let outcome = IsoWriter::new(Default::default()).run(&wide_tree(), &mut image, &mut sink, &token);
  drop(sink);

  assert!(matches!(outcome, BuildOutcome::Aborted(Error::Cancelled)));
  assert!(!finished);
  assert_eq!(aborted.as_deref(), Some("Aborted by user"));
}

#[test]
fn progress_is_ordered_and_finishes() {
  let mut actions: Vec<String> = Vec::new();
  let mut writing = Vec::new();
  let mut finished = Vec::new();

  let source = wide_tree();
  let mut sink = FnSink(|event: BuildEvent<'_>| match event {
    BuildEvent::Progress(progress) => {
      if actions.last() != Some(&progress.action) {
        actions.push(progress.action.clone());
      }
      if progress.action == "Writing data to file..." {
        writing.push((progress.current, progress.maximum));
      }
    }
    BuildEvent::Finished(message) => finished.push(message.to_owned()),
    BuildEvent::Aborted(message) => panic!("aborted: {message}"),
  });

  let outcome = IsoWriter::new(options("WIDE", BuildMode::Catalog)).run(
    &source,
    Vec::<u8>::new(),
    &mut sink,
    &NeverAbort,
  );
  drop(sink);

  let layout = outcome.into_result().unwrap();
  assert_eq!(
    actions,
    [
      "Initializing...",
      "Initializing ISO root directory...",
      "Preparing first set of directory extents...",
      "Preparing first set of path tables...",
      "Calculating directory numbers...",
      "Preparing second set of directory extents...",
      "Preparing second set of path tables...",
      "Writing data to file...",
    ]
  );
  assert!(writing.windows(2).all(|pair| pair[0].0 < pair[1].0));
  assert!(writing.iter().all(|&(_, maximum)| maximum == layout.volume_space_size as u64));
  assert_eq!(finished, ["ISO writing process finished successfully"]);
}

#[test]
fn virtual_files_cannot_be_written_with_payload() {
  let outcome = IsoWriter::new(Default::default()).run(
    &report_tree(false),
    Vec::<u8>::new(),
    &mut NoProgress,
    &NeverAbort,
  );
  match outcome {
    BuildOutcome::Aborted(error) => assert_eq!(error.kind(), ErrorKind::IoFailure),
    BuildOutcome::Completed(_) => panic!("virtual content was written"),
  }
}

#[test]
fn real_directory_round_trip() {
  let source = tempfile::tempdir().unwrap();
  std::fs::write(source.path().join("a.txt"), b"hello").unwrap();
  std::fs::create_dir(source.path().join("sub")).unwrap();
  std::fs::write(source.path().join("sub").join("b.txt"), vec![b'b'; 3000]).unwrap();
  std::fs::create_dir(source.path().join("empty")).unwrap();

  let output = tempfile::tempdir().unwrap();
  let destination = output.path().join("image.iso");

  let outcome = isocat::build_from_directory(
    source.path(),
    &destination,
    "capture",
    &mut NoProgress,
    &NeverAbort,
  );
  let layout = outcome.into_result().unwrap();
  assert_eq!(layout.directories, 3);
  assert_eq!(layout.files, 2);

  let image = std::fs::read(&destination).unwrap();
  assert_eq!(image.len(), layout.volume_space_size as usize * SECTOR);
  assert_eq!(&sector(&image, 16)[40..47], b"CAPTURE");

  let first = layout.first_file_extent.unwrap();
  assert_eq!(&sector(&image, first)[..5], b"hello");
  let second = (first as usize + 1) * SECTOR;
  assert!(image[second..second + 3000].iter().all(|&byte| byte == b'b'));
  assert_eq!(first + 3, layout.volume_space_size);

  let captured = SourceNode::capture(source.path()).unwrap();
  let names: Vec<_> = captured.descendants().map(|node| node.name.as_str()).collect();
  assert_eq!(names, ["a.txt", "empty", "sub", "b.txt"]);
}

#[test]
fn catalog_of_a_virtual_tree_on_disk() {
  let mut source = SourceNode::directory("Archive 2024");
  source.insert("photos/summer/beach.jpg", SourceNode::file("", 4_000_000)).unwrap();
  source.insert("photos/winter.jpg", SourceNode::file("", 2_500_000)).unwrap();
  source.insert("notes.txt", SourceNode::file("", 12)).unwrap();

  let output = tempfile::tempdir().unwrap();
  let destination = output.path().join("catalog.iso");

  let layout = isocat::build_from_tree(&source, &destination, &mut NoProgress, &NeverAbort)
    .into_result()
    .unwrap();
  let image = std::fs::read(&destination).unwrap();

  // Three directories and their path tables only.
  assert_eq!(layout.volume_space_size, 19 + 6 + 4);
  assert_eq!(image.len(), layout.volume_space_size as usize * SECTOR);
  assert_eq!(&sector(&image, 16)[40..52], b"ARCHIVE 2024");

  let root = records(sector(&image, layout.primary.root_extent));
  let notes = root
    .iter()
    .find(|record| identifier(record).starts_with(b"NOTES_T"))
    .unwrap();
  assert_eq!(read_both_u32(&notes[2..10]), Some(0));
  assert_eq!(read_both_u32(&notes[10..18]), Some(12));
}

#[test]
fn missing_source_directory_aborts() {
  let output = tempfile::tempdir().unwrap();
  let outcome = isocat::build_from_directory(
    output.path().join("does-not-exist"),
    output.path().join("image.iso"),
    "MISSING",
    &mut NoProgress,
    &NeverAbort,
  );
  match outcome {
    BuildOutcome::Aborted(error) => assert_eq!(error.kind(), ErrorKind::IoFailure),
    BuildOutcome::Completed(_) => panic!("nothing to capture"),
  }
}
