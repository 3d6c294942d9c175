use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge tabular batches into primary-key tables",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge a CSV batch into a table, creating the table on first load
    Merge(MergeArgs),
    /// Print the storage schema a CSV batch would create
    Schema(SchemaArgs),
    /// Show rows persisted in a table
    Preview(PreviewArgs),
    /// List load reports recorded in the summary ledger
    Loads(LoadsArgs),
    /// List per-table row and column counts after each table's latest load
    Tables(TablesArgs),
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Input CSV file; its first column is the primary key
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Number of rows to sample when inferring types (0 means full scan)
    #[arg(long, default_value_t = 2000)]
    pub sample_rows: usize,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Target table name
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Numeric table identifier recorded in the ledger
    #[arg(long = "table-id")]
    pub table_id: u32,
    /// YAML file with staging_dir, store_root and ledger settings
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Directory holding persisted tables (overrides the config)
    #[arg(long = "store")]
    pub store: Option<PathBuf>,
    /// Scratch directory for staging artifacts (overrides the config)
    #[arg(long = "staging-dir")]
    pub staging_dir: Option<PathBuf>,
    /// Summary ledger file (overrides the config)
    #[arg(long = "ledger")]
    pub ledger: Option<PathBuf>,
    /// Compute the insert/update/unchanged split without writing anything
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Print the load report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Table name used in messages
    #[arg(short = 't', long = "table", default_value = "batch")]
    pub table: String,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Directory holding persisted tables
    #[arg(long = "store")]
    pub store: PathBuf,
    /// Table to display
    #[arg(short = 't', long = "table")]
    pub table: String,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct LoadsArgs {
    /// Summary ledger file
    #[arg(long = "ledger")]
    pub ledger: PathBuf,
    /// Only show loads for this table
    #[arg(short = 't', long = "table")]
    pub table: Option<String>,
    /// Print entries as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// Table summary file
    #[arg(long = "summary")]
    pub summary: PathBuf,
    /// Print entries as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err(format!("Unsupported delimiter '{other}'"));
            }
            if !first.is_ascii() || first == '"' {
                return Err(format!("Delimiter '{other}' is not usable"));
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delimiter_accepts_names_and_single_ascii_chars() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter("#"), Ok(b'#'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("::").is_err());
        assert!(parse_delimiter("\"").is_err());
        assert!(parse_delimiter("§").is_err());
    }

    #[test]
    fn merge_arguments_parse() {
        let cli = Cli::try_parse_from([
            "table-sync",
            "merge",
            "-i",
            "orders.csv",
            "-t",
            "orders",
            "--table-id",
            "12",
            "--delimiter",
            "pipe",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Merge(args) => {
                assert_eq!(args.table, "orders");
                assert_eq!(args.table_id, 12);
                assert_eq!(args.input.delimiter, Some(b'|'));
                assert!(args.json);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
