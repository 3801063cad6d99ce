//! Builds ISO 9660 images carrying both 8.3 names and Joliet long names, either with file
//! contents or as a catalog whose files take no space.

pub mod error;
pub mod layout;
pub mod lba;
pub mod name;
pub mod path;
pub mod path_table;
pub mod progress;
pub mod serialize;
pub mod source;
pub mod spec;
pub mod tree;
pub mod writer;

pub use layout::ImageLayout;
pub use progress::{AbortSignal, CancelToken, ProgressSink};
pub use source::SourceNode;
pub use writer::{
  build_from_directory, build_from_tree, BuildMode, BuildOutcome, IsoWriter, IsoWriterOptions,
};

pub mod prelude {
  pub use crate::error::{Error, Result};
}
