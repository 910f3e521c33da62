//! Where command output goes: a file, or stdout when none is given.

use std::{
  fs::File,
  io::{self, BufWriter, Write},
  path::Path,
};

use anyhow::Context as _;
use clap::ValueEnum;
use serde::Serialize;
use vocab_core::{
  export::{export_json, export_tsv},
  table::Table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
  Json,
  Tsv,
}

pub fn open(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
  Ok(match path {
    Some(path) => {
      let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
      Box::new(BufWriter::new(file))
    }
    None => Box::new(io::stdout().lock()),
  })
}

pub fn write_table(
  table: &Table,
  language: Option<&str>,
  format: Format,
  path: Option<&Path>,
) -> anyhow::Result<()> {
  let mut out = open(path)?;
  match format {
    Format::Json => {
      export_json(table, language, &mut out)?;
      writeln!(out)?;
    }
    Format::Tsv => export_tsv(table, language, &mut out)?,
  }
  out.flush().context("failed to flush output")?;
  Ok(())
}

/// Pretty JSON followed by a newline.
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> anyhow::Result<()> {
  let mut out = open(path)?;
  serde_json::to_writer_pretty(&mut out, value)?;
  writeln!(out)?;
  out.flush().context("failed to flush output")?;
  Ok(())
}
