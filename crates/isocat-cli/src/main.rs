mod cli;

use isocat::{progress::LogSink, progress::NeverAbort, SourceNode};

fn main() -> Result<(), isocat::error::Error> {
  pretty_env_logger::init();

  let mut sink = LogSink::default();

  let outcome = match cli::parse().command {
    cli::Command::Create {
      output,
      directory,
      volume,
    } => isocat::build_from_directory(
      &directory,
      &output,
      volume.as_deref().unwrap_or("CDROM"),
      &mut sink,
      &NeverAbort,
    ),
    cli::Command::Catalog {
      output,
      directory,
      volume,
    } => {
      let mut tree = SourceNode::capture(&directory)?;
      if let Some(volume) = volume {
        tree.name = volume;
      }
      isocat::build_from_tree(&tree, &output, &mut sink, &NeverAbort)
    }
  };

  let layout = outcome.into_result()?;
  log::info!(
    "{} directories, {} files, {} sectors",
    layout.directories,
    layout.files,
    layout.volume_space_size
  );

  Ok(())
}
