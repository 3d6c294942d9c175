pub mod apply;
pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod diff;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod io_utils;
pub mod ledger;
pub mod report;
pub mod schema;
pub mod staging;
pub mod store;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands},
    config::{SyncConfig, TableTarget},
    error::SyncError,
    ledger::{CsvLedger, CsvTableSummary, TableSummary},
    report::{LoadLedger, LoadReport},
    store::{TableStore, csv::CsvTableStore},
    table::Align,
};

pub use crate::{
    engine::merge,
    error::{ErrorKind, SyncResult},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("table_sync", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Merge(args) => handle_merge(&args),
        Commands::Schema(args) => handle_schema(&args),
        Commands::Preview(args) => handle_preview(&args),
        Commands::Loads(args) => handle_loads(&args),
        Commands::Tables(args) => handle_tables(&args),
    }
}

fn resolve_config(args: &cli::MergeArgs) -> Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    if let Some(store) = &args.store {
        config.store_root = store.clone();
    }
    if let Some(staging) = &args.staging_dir {
        config.staging_dir = staging.clone();
    }
    if let Some(ledger) = &args.ledger {
        config.ledger = Some(ledger.clone());
    }
    debug!("Resolved configuration: {:?}", config);
    Ok(config)
}

fn open_store(root: &std::path::Path, table: &str) -> Result<CsvTableStore> {
    CsvTableStore::open(root)
        .map_err(|err| SyncError::from_read(table, "opening store for", err))
        .with_context(|| format!("Opening store at {root:?}"))
}

#[derive(Serialize)]
struct MergeOutput<'a> {
    load_id: &'a str,
    #[serde(flatten)]
    report: &'a LoadReport,
}

fn handle_merge(args: &cli::MergeArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let target = TableTarget::new(args.table_id, args.table.clone());
    let input = &args.input;
    info!(
        "Merging '{}' into table '{}' with delimiter '{}'",
        input.input.display(),
        target.table_name,
        printable_delimiter(io_utils::resolve_input_delimiter(
            &input.input,
            input.delimiter
        ))
    );
    let dataset = ingest::read_dataset(
        &input.input,
        input.delimiter,
        input.input_encoding.as_deref(),
        input.sample_rows,
    )
    .with_context(|| format!("Reading batch from {:?}", input.input))?;

    let mut store = open_store(&config.store_root, &target.table_name)?;

    if args.dry_run {
        let partition = engine::preview(&store, &target, &dataset)
            .with_context(|| format!("Diffing {:?} against '{}'", input.input, target.table_name))?;
        let headers = ["table", "inserted", "updated", "unchanged"].map(String::from);
        let row = vec![
            target.table_name.clone(),
            partition.inserted().to_string(),
            partition.updated().to_string(),
            partition.unchanged().to_string(),
        ];
        table::print_table(
            &headers,
            &[row],
            &[Align::Left, Align::Right, Align::Right, Align::Right],
        );
        return Ok(());
    }

    let report = engine::merge(&mut store, &config, &target, &dataset)
        .with_context(|| format!("Merging {:?} into '{}'", input.input, target.table_name))?;
    let mut ledger = CsvLedger::new(config.ledger_path());
    let load_id = ledger
        .record(&report)
        .with_context(|| format!("Recording load in {:?}", ledger.path()))?;
    let summaries = CsvTableSummary::new(config.table_summary_path());
    TableSummary::capture(&store, &report)
        .and_then(|summary| summaries.upsert(summary))
        .with_context(|| format!("Updating table summary in {:?}", summaries.path()))?;

    if args.json {
        let output = MergeOutput {
            load_id: &load_id,
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let headers = [
            "load_id",
            "table_id",
            "table",
            "inserted",
            "updated",
            "unchanged",
            "timestamp",
        ]
        .map(String::from);
        let row = vec![
            load_id,
            report.table_id.to_string(),
            report.table_name.clone(),
            report.inserted.to_string(),
            report.updated.to_string(),
            report.unchanged.to_string(),
            report.formatted_timestamp(),
        ];
        table::print_table(&headers, &[row], &report_aligns());
    }
    Ok(())
}

fn handle_schema(args: &cli::SchemaArgs) -> Result<()> {
    let input = &args.input;
    let dataset = ingest::read_dataset(
        &input.input,
        input.delimiter,
        input.input_encoding.as_deref(),
        input.sample_rows,
    )
    .with_context(|| format!("Reading batch from {:?}", input.input))?;
    let schema = schema::infer_table_schema(&args.table, &dataset)?;
    let headers = ["#", "column", "storage_type", "primary_key"].map(String::from);
    let rows: Vec<Vec<String>> = schema
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.name.clone(),
                column.storage_type.to_string(),
                if column.primary_key { "yes" } else { "" }.to_string(),
            ]
        })
        .collect();
    table::print_table(&headers, &rows, &[Align::Right]);
    info!(
        "Inferred {} column(s) from {} row(s) of {:?}",
        schema.columns.len(),
        dataset.len(),
        input.input
    );
    Ok(())
}

fn handle_preview(args: &cli::PreviewArgs) -> Result<()> {
    let store = open_store(&args.store, &args.table)?;
    let schema = store
        .table_schema(&args.table)
        .map_err(|err| SyncError::from_read(&args.table, "reading schema of", err))?;
    let rows = store
        .scan(&args.table)
        .map_err(|err| SyncError::from_read(&args.table, "scanning", err))?;
    let shown: Vec<Vec<String>> = rows
        .iter()
        .take(args.rows)
        .map(|row| table::row_cells(&schema, row))
        .collect();
    table::print_table(
        &schema.column_names(),
        &shown,
        &table::schema_aligns(&schema),
    );
    info!(
        "Displayed {} of {} row(s) from '{}'",
        shown.len(),
        rows.len(),
        args.table
    );
    Ok(())
}

fn handle_loads(args: &cli::LoadsArgs) -> Result<()> {
    let ledger = CsvLedger::new(&args.ledger);
    let entries: Vec<_> = ledger
        .entries()
        .with_context(|| format!("Reading ledger {:?}", args.ledger))?
        .into_iter()
        .filter(|entry| {
            args.table
                .as_deref()
                .is_none_or(|table| entry.table_name == table)
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    let headers = ledger::LEDGER_HEADERS.map(String::from);
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            vec![
                entry.load_id.clone(),
                entry.table_id.to_string(),
                entry.table_name.clone(),
                entry.inserted.to_string(),
                entry.updated.to_string(),
                entry.unchanged.to_string(),
                entry.timestamp.to_rfc3339(),
            ]
        })
        .collect();
    table::print_table(&headers, &rows, &report_aligns());
    Ok(())
}

fn handle_tables(args: &cli::TablesArgs) -> Result<()> {
    let summaries = CsvTableSummary::new(&args.summary);
    let entries = summaries
        .entries()
        .with_context(|| format!("Reading table summary {:?}", args.summary))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    let headers = ledger::TABLE_SUMMARY_HEADERS.map(String::from);
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            vec![
                entry.table_id.to_string(),
                entry.table_name.clone(),
                entry.rows.to_string(),
                entry.columns.to_string(),
                entry.last_updated.to_string(),
            ]
        })
        .collect();
    table::print_table(
        &headers,
        &rows,
        &[Align::Right, Align::Left, Align::Right, Align::Right, Align::Left],
    );
    Ok(())
}

fn report_aligns() -> [Align; 7] {
    [
        Align::Left,
        Align::Right,
        Align::Left,
        Align::Right,
        Align::Right,
        Align::Right,
        Align::Left,
    ]
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
