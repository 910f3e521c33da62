//! `vocab`: maintain ontology-derived vocabulary tables.
//!
//! # Usage
//!
//! ```text
//! vocab refresh --table genepio --source genepio.owl --root GENEPIO:0001000,GENEPIO:0002000
//! vocab export --table genepio --format tsv --output genepio.tsv
//! vocab pin --table genepio --id GENEPIO:0001001
//! vocab --config ~/.config/vocab/vocab.toml tables
//! ```

mod output;
mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use output::Format;
use settings::{Settings, expand_tilde};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use vocab_core::{
  service::Refresher,
  store::{SourceRef, TableStore as _},
  term::{TermField, TermKey},
};
use vocab_owl::RdfLoader;
use vocab_store_sqlite::SqliteStore;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vocab", version, about = "Ontology-derived vocabulary tables")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "vocab.toml")]
  config: PathBuf,

  /// SQLite store; overrides `store_path` from the config.
  #[arg(long, env = "VOCAB_STORE", value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pull terms from ontologies into a table.
  Refresh(RefreshArgs),
  /// Write a table as JSON or TSV.
  Export {
    #[arg(long)]
    table:    String,
    /// Only rows in this language.
    #[arg(long)]
    language: Option<String>,
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format:   Format,
    #[arg(short, long, value_name = "FILE")]
    output:   Option<PathBuf>,
  },
  /// Show the change history of one term.
  History {
    #[arg(long)]
    table: String,
    #[arg(long)]
    id:    String,
  },
  /// Protect a row from source updates, or release it.
  Pin {
    #[command(flatten)]
    row:     RowArgs,
    #[arg(long)]
    release: bool,
  },
  /// Set one field of one row by hand.
  Override {
    #[command(flatten)]
    row:   RowArgs,
    /// Field name, e.g. `label` or `narrow_synonym`.
    #[arg(long)]
    field: TermField,
    /// New value; sets are `;`-separated, empty clears optional fields.
    #[arg(long, allow_hyphen_values = true)]
    value: String,
  },
  /// Mint a LOCAL term.
  Mint {
    #[arg(long)]
    table:    String,
    #[arg(long)]
    label:    String,
    #[arg(long, default_value = "en")]
    language: String,
    #[arg(long)]
    parent:   Option<String>,
  },
  /// List stored tables.
  Tables,
}

#[derive(Args, Debug)]
struct RefreshArgs {
  #[arg(long)]
  table:           String,
  /// Ontology file path or http(s) URL. Repeat for several sources.
  #[arg(long = "source", required = true, value_name = "PATH|URL")]
  sources:         Vec<String>,
  /// Root class IRIs or CURIEs, comma-separated. `owl:Thing` takes every
  /// top-level class.
  #[arg(long = "root", value_delimiter = ',', default_value = "owl:Thing")]
  roots:           Vec<String>,
  /// Value for the `ontology` column; derived from the ontology IRI if unset.
  #[arg(long)]
  ontology_prefix: Option<String>,
  /// Write the pass report as JSON to this file.
  #[arg(long, value_name = "FILE")]
  report:          Option<PathBuf>,
  /// Also export the refreshed table.
  #[arg(short, long, value_name = "FILE")]
  output:          Option<PathBuf>,
  #[arg(long, value_enum, default_value_t = Format::Json)]
  format:          Format,
}

#[derive(Args, Debug)]
struct RowArgs {
  #[arg(long)]
  table:    String,
  #[arg(long)]
  id:       String,
  #[arg(long, default_value = "en")]
  language: String,
}

impl RowArgs {
  fn key(&self) -> TermKey { TermKey::new(self.id.clone(), self.language.clone()) }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store_path = expand_tilde(cli.store.as_ref().unwrap_or(&settings.store_path));
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_lease_ttl(settings.lease_ttl());
  let refresher = Refresher::new(Arc::new(store), Arc::new(settings.loader()));

  run(cli.command, &settings, &refresher).await
}

async fn run(
  command: Command,
  settings: &Settings,
  refresher: &Refresher<SqliteStore, RdfLoader>,
) -> Result<()> {
  match command {
    Command::Refresh(args) => {
      let mut options = settings.refresh_options()?;
      if args.ontology_prefix.is_some() {
        options.extract.ontology_prefix = args.ontology_prefix;
      }
      let sources: Vec<SourceRef> = args
        .sources
        .iter()
        .map(|s| s.parse::<SourceRef>())
        .collect::<Result<_, _>>()?;

      let (table, report) = refresher
        .refresh(&args.table, &sources, &args.roots, &options)
        .await
        .with_context(|| format!("refresh of table {:?} failed", args.table))?;

      match &args.report {
        Some(path) => output::write_json(&report, Some(path))?,
        None => println!("{}", report.summary()),
      }
      if let Some(path) = &args.output {
        output::write_table(&table, None, args.format, Some(path))?;
      }
    }

    Command::Export { table, language, format, output: path } => {
      let table = refresher.load(&table).await?;
      output::write_table(&table, language.as_deref(), format, path.as_deref())?;
    }

    Command::History { table, id } => {
      let entries = refresher.history(&table, &id).await?;
      output::write_json(&entries, None)?;
    }

    Command::Pin { row, release } => {
      let entry = refresher.pin(&row.table, &row.key(), !release).await?;
      report_change(&row.key(), entry.is_some());
    }

    Command::Override { row, field, value } => {
      let value = field.parse_value(&value)?;
      let entry = refresher
        .override_field(&row.table, &row.key(), field, value)
        .await?;
      report_change(&row.key(), entry.is_some());
    }

    Command::Mint { table, label, language, parent } => {
      let entry = refresher
        .mint(&table, &label, &language, parent.as_deref())
        .await?;
      println!("{}", entry.id);
    }

    Command::Tables => {
      for name in refresher.store().list_tables().await? {
        println!("{name}");
      }
    }
  }
  Ok(())
}

fn report_change(key: &TermKey, changed: bool) {
  if changed {
    info!(%key, "updated");
  } else {
    info!(%key, "already up to date");
  }
}

#[cfg(test)]
mod tests {
  use clap::CommandFactory;

  use super::*;

  #[test]
  fn cli_definition_is_consistent() { Cli::command().debug_assert(); }

  #[test]
  fn roots_split_on_commas() {
    let cli = Cli::parse_from([
      "vocab",
      "refresh",
      "--table",
      "genepio",
      "--source",
      "genepio.owl",
      "--root",
      "GENEPIO:0001,GENEPIO:0002",
    ]);
    let Command::Refresh(args) = cli.command else {
      panic!("expected refresh");
    };
    assert_eq!(args.roots, vec!["GENEPIO:0001", "GENEPIO:0002"]);
    assert_eq!(args.format, Format::Json);
  }

  #[test]
  fn root_defaults_to_owl_thing() {
    let cli = Cli::parse_from(["vocab", "refresh", "--table", "t", "--source", "t.owl"]);
    let Command::Refresh(args) = cli.command else {
      panic!("expected refresh");
    };
    assert_eq!(args.roots, vec!["owl:Thing"]);
  }

  #[test]
  fn override_field_names_are_parsed() {
    let cli = Cli::parse_from([
      "vocab",
      "override",
      "--table",
      "t",
      "--id",
      "T:1",
      "--field",
      "narrow_synonym",
      "--value",
      "a;b",
    ]);
    let Command::Override { row, field, .. } = cli.command else {
      panic!("expected override");
    };
    assert_eq!(field, TermField::NarrowSynonym);
    assert_eq!(row.key(), TermKey::english("T:1"));
  }
}
