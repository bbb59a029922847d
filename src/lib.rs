pub mod admin;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod lister;
pub mod loader;
pub mod normalize;
pub mod preview;
pub mod schema;
pub mod spreadsheet;
pub mod table;
pub mod verify;

use std::{env, sync::OnceLock, time::Duration};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    cli::{Cli, Commands},
    client::D1Client,
    config::D1Config,
    lister::WbsLister,
    loader::{BatchLoader, LoadStatistics},
    schema::TableName,
    spreadsheet::ReadOptions,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("wbs_loader", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs.max(1));
    match &cli.command {
        Commands::Preview(args) => preview::execute(args),
        Commands::Init(args) => {
            let client = connect(timeout)?;
            handle_init(&client, &cli.table, args.recreate)
        }
        Commands::Load(args) => handle_load(args, &cli.table, timeout),
        Commands::Verify(args) => {
            let client = connect(timeout)?;
            verify::execute(args, &cli.table, &client)
        }
        Commands::List(args) => {
            let mut lister = WbsLister::new(connect(timeout)?, cli.table.clone());
            handle_list(&mut lister, args)
        }
        Commands::Search(args) => {
            let mut lister = WbsLister::new(connect(timeout)?, cli.table.clone());
            handle_search(&mut lister, args)
        }
        Commands::Show(args) => {
            let lister = WbsLister::new(connect(timeout)?, cli.table.clone());
            handle_show(&lister, args)
        }
        Commands::Stats(args) => {
            let mut lister = WbsLister::new(connect(timeout)?, cli.table.clone());
            handle_stats(&mut lister, args)
        }
    }
}

fn connect(timeout: Duration) -> Result<D1Client> {
    let config = D1Config::from_env().context("Loading D1 configuration")?;
    info!(
        "Using database {} (account {})",
        config.database_id, config.account_id
    );
    D1Client::new(&config, timeout).context("Creating D1 client")
}

pub(crate) fn source_options(args: &cli::SourceArgs) -> Result<ReadOptions> {
    Ok(ReadOptions {
        sheet: args.sheet.clone(),
        limit: args.limit,
        delimiter: args.delimiter,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
    })
}

fn handle_init(client: &D1Client, table: &TableName, recreate: bool) -> Result<()> {
    let created = if recreate {
        admin::recreate_table(client, table)
    } else {
        admin::create_table(client, table)
    };
    created.with_context(|| format!("Creating table {table}"))
}

fn handle_load(args: &cli::LoadArgs, table: &TableName, timeout: Duration) -> Result<()> {
    // Configuration problems surface before any file work.
    let config = D1Config::from_env().context("Loading D1 configuration")?;

    let options = source_options(&args.source)?;
    let source = spreadsheet::read_table(&args.source.input, &options)?;
    let normalized = normalize::normalize(&source)
        .with_context(|| format!("Normalizing {:?}", args.source.input))?;
    if !args.json {
        preview::print_summary(&normalized.summary, normalized.records.len());
    }

    let client = D1Client::new(&config, timeout).context("Creating D1 client")?;
    admin::create_table(&client, table).with_context(|| format!("Creating table {table}"))?;
    if args.clear {
        admin::clear_table(&client, table);
    }

    let loader = BatchLoader::new(&client, table.clone());
    let stats = loader.load(&normalized.records, args.batch_size);

    let report = if args.no_verify {
        None
    } else {
        Some(
            verify::verify(&client, table, verify::DEFAULT_GROUP_BY, verify::DEFAULT_SAMPLE_SIZE)
                .with_context(|| format!("Verifying table {table}"))?,
        )
    };

    if args.json {
        let output = serde_json::json!({
            "normalize": normalized.summary,
            "statistics": stats,
            "verification": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_load_statistics(&stats);
        if let Some(report) = &report {
            println!();
            verify::print_report(report);
        }
    }

    if stats.failed > 0 {
        warn!("{} record(s) failed to load", stats.failed);
    }
    Ok(())
}

fn print_load_statistics(stats: &LoadStatistics) {
    let rows = vec![
        vec!["inserted".to_string(), stats.inserted.to_string()],
        vec!["skipped".to_string(), stats.skipped.to_string()],
        vec!["failed".to_string(), stats.failed.to_string()],
        vec!["batches".to_string(), stats.batches_run.to_string()],
        vec!["fallback batches".to_string(), stats.fallback_batches.to_string()],
        vec![
            "elapsed".to_string(),
            format!("{:.2}s", stats.elapsed.as_secs_f64()),
        ],
        vec![
            "throughput".to_string(),
            format!("{:.1} records/s", stats.throughput()),
        ],
    ];
    table::print_table(&["metric".to_string(), "value".to_string()], &rows);
}

const LIST_COLUMNS: &[&str] = &[
    "WBS_ELEMENT_CDE",
    "WBS_ELEMENT_NME",
    "PROJ_NAME",
    "COMPANY_CDE",
    "SAP_STATUS",
    "CREATE_DATE",
];

fn handle_list<E: client::QueryExecutor>(lister: &mut WbsLister<E>, args: &cli::ListArgs) -> Result<()> {
    if args.all {
        let rows = lister.list(None, 0).context("Listing records")?;
        print!("{}", table::render_rows(LIST_COLUMNS, &rows));
        println!("\n{} record(s)", rows.len());
        return Ok(());
    }
    let view = lister
        .page(args.paging.page, args.paging.per_page, None)
        .context("Listing records")?;
    print_page(&view);
    Ok(())
}

fn handle_search<E: client::QueryExecutor>(
    lister: &mut WbsLister<E>,
    args: &cli::SearchArgs,
) -> Result<()> {
    if args.json {
        let suggestions = lister
            .suggest(&args.term)
            .with_context(|| format!("Searching for '{}'", args.term))?;
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
        return Ok(());
    }
    let view = lister
        .page(args.paging.page, args.paging.per_page, Some(&args.term))
        .with_context(|| format!("Searching for '{}'", args.term))?;
    print_page(&view);
    Ok(())
}

fn print_page(view: &lister::PageView) {
    print!("{}", table::render_rows(LIST_COLUMNS, &view.items));
    let scope = match &view.search_term {
        Some(term) => format!(" matching '{term}'"),
        None => String::new(),
    };
    println!(
        "\nPage {} of {} ({} record(s){scope})",
        view.page,
        view.total_pages.max(1),
        view.total_count
    );
}

fn handle_show<E: client::QueryExecutor>(lister: &WbsLister<E>, args: &cli::ShowArgs) -> Result<()> {
    let row = lister
        .find(&args.code)
        .with_context(|| format!("Looking up '{}'", args.code))?
        .ok_or_else(|| anyhow!("WBS item '{}' not found", args.code))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&row)?);
    } else {
        print!("{}", table::render_record(&row));
    }
    Ok(())
}

fn handle_stats<E: client::QueryExecutor>(lister: &mut WbsLister<E>, args: &cli::StatsArgs) -> Result<()> {
    let stats = lister.stats().context("Collecting statistics")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Total records: {}", stats.total_count);
    let rows = stats
        .top_prefixes
        .iter()
        .map(|p| vec![p.prefix.clone(), p.count.to_string()])
        .collect::<Vec<_>>();
    table::print_table(&["prefix".to_string(), "count".to_string()], &rows);
    Ok(())
}
