use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yoki_drops::addresses::{compare, dedup, find_duplicates, read_address_list, write_address_list};
use yoki_drops::cli::{Cli, Command};
use yoki_drops::config::{Config, IndexerKind, SnapshotKind};
use yoki_drops::export::{build_records, read_batch, write_batches, AmountRule};
use yoki_drops::fetch::{FetchDriver, TargetFailure};
use yoki_drops::http::build_client;
use yoki_drops::indexer::{BlockscoutGraphqlSource, BlockscoutRestSource, SubgraphSource};
use yoki_drops::pipeline::{collect_snapshot, run_eligibility};
use yoki_drops::rewards::{RewardsClient, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use yoki_drops::snapshot::{GraphCollectionSource, SeasonHolder, SquidSnapshotSource};
use yoki_drops::source::{PageSource, TransferSource};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("Failed to load configuration")?;

    match cli.command {
        Command::Eligibility {
            source,
            url,
            policy,
            max_pages,
            output,
            batch,
        } => {
            let mut config = config;
            if let Some(kind) = source {
                config.indexer.kind = kind;
            }
            if let Some(url) = url {
                config.indexer.url = url;
            }
            if let Some(policy) = policy {
                config.season.credit_policy = policy;
            }
            eligibility(&config, max_pages, &output, batch.as_deref()).await
        }
        Command::Snapshot {
            kind,
            url,
            season,
            collection,
            output,
        } => {
            let mut config = config;
            if let Some(kind) = kind {
                config.snapshot.kind = kind;
            }
            if let Some(url) = url {
                config.snapshot.url = url;
            }
            if let Some(season) = season {
                config.snapshot.season = season;
            }
            if let Some(collection) = collection {
                config.snapshot.collection = collection;
            }
            snapshot(&config, &output).await
        }
        Command::Compare { a, b, out_dir } => compare_lists(&a, &b, &out_dir),
        Command::Duplicates {
            file,
            top,
            dedup_output,
        } => duplicates(&file, top, dedup_output.as_deref()),
        Command::Batch {
            input,
            output,
            defi_id,
            amount,
            pool,
            description,
        } => {
            let mut config = config;
            if let Some(defi_id) = defi_id {
                config.rewards.defi_id = defi_id;
            }
            if amount.is_some() || pool.is_some() {
                config.rewards.amount_per_user = amount;
                config.rewards.pool = pool;
            }
            if let Some(description) = description {
                config.rewards.description = description;
            }
            let addresses = read_address_list(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            write_rewards(&config, &addresses, &output)?;
            Ok(())
        }
        Command::Send {
            files,
            dry_run,
            endpoint,
        } => {
            let mut config = config;
            if let Some(endpoint) = endpoint {
                config.rewards.endpoint = endpoint;
            }
            send(&config, &files, dry_run).await
        }
    }
}

fn report_incomplete(incomplete: &[TargetFailure]) {
    if incomplete.is_empty() {
        return;
    }
    warn!("Results are missing data for {} targets:", incomplete.len());
    for failure in incomplete {
        warn!("  {}: {}", failure.target, failure.reason);
    }
}

async fn eligibility(config: &Config, max_pages: Option<u32>, output: &Path, batch: Option<&Path>) -> Result<()> {
    let season = config.season.resolve()?;
    config.indexer.validate()?;
    if batch.is_some() {
        config.rewards.amount_rule()?;
    }

    let client = build_client(config.http.timeout())?;
    let mut driver = FetchDriver::from_config(&config.fetch);
    if let Some(max_pages) = max_pages {
        driver = driver.with_max_pages(max_pages);
    }
    let indexer = &config.indexer;

    let source: Box<dyn TransferSource> = match indexer.kind {
        IndexerKind::BlockscoutRest => Box::new(BlockscoutRestSource::new(client, &indexer.url, season.contract)),
        IndexerKind::BlockscoutGraphql => Box::new(BlockscoutGraphqlSource::new(
            client,
            &indexer.url,
            season.contract,
            season.cutoff,
            indexer.page_size,
        )),
        IndexerKind::Subgraph => Box::new(SubgraphSource::new(
            client,
            &indexer.url,
            season.cutoff,
            indexer.page_size,
        )),
    };

    let outcome = run_eligibility(source.as_ref(), &driver, &season).await;

    write_address_list(output, &outcome.qualified)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Season:         {}", season.name);
    println!("Holders:        {}", outcome.holders);
    println!("Qualified:      {}", outcome.qualified.len());
    println!("Transfers:      {} applied, {} after cutoff", outcome.summary.applied, outcome.summary.after_cutoff);
    if outcome.malformed > 0 {
        println!("Skipped:        {} malformed transfers", outcome.malformed);
    }
    println!("Output:         {}", output.display());
    report_incomplete(&outcome.incomplete);

    if let Some(batch) = batch {
        write_rewards(config, &outcome.qualified, batch)?;
    }
    Ok(())
}

async fn snapshot(config: &Config, output: &Path) -> Result<()> {
    config.snapshot.validate()?;
    let client = build_client(config.http.timeout())?;
    let driver = FetchDriver::from_config(&config.fetch);
    let snapshot = &config.snapshot;

    let source: Box<dyn PageSource<Item = SeasonHolder>> = match snapshot.kind {
        SnapshotKind::Squid => Box::new(SquidSnapshotSource::new(
            client,
            &snapshot.url,
            snapshot.season,
            snapshot.page_size,
        )),
        SnapshotKind::Thegraph => Box::new(GraphCollectionSource::new(
            client,
            &snapshot.url,
            snapshot.collection.clone(),
            snapshot.page_size,
        )),
    };

    let outcome = collect_snapshot(source.as_ref(), &driver).await;
    write_address_list(output, &outcome.qualified)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Rows:           {}", outcome.rows);
    println!("Qualified:      {}", outcome.qualified.len());
    println!("Duplicates:     {} addresses, {} extra rows", outcome.duplicates.duplicates.len(), outcome.duplicates.duplicate_entries);
    println!("Output:         {}", output.display());
    report_incomplete(&outcome.incomplete);
    Ok(())
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "list".to_string())
}

fn compare_lists(a: &Path, b: &Path, out_dir: &Path) -> Result<()> {
    let list_a = read_address_list(a).with_context(|| format!("Failed to read {}", a.display()))?;
    let list_b = read_address_list(b).with_context(|| format!("Failed to read {}", b.display()))?;
    let comparison = compare(&list_a, &list_b);

    let (name_a, name_b) = (stem(a), stem(b));
    let outputs = [
        (out_dir.join(format!("{}_not_in_{}.csv", name_a, name_b)), &comparison.only_in_a),
        (out_dir.join(format!("{}_not_in_{}.csv", name_b, name_a)), &comparison.only_in_b),
        (out_dir.join(format!("{}_and_{}.csv", name_a, name_b)), &comparison.common),
    ];
    for (path, list) in &outputs {
        write_address_list(path, list).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    println!("{}: {} addresses", name_a, list_a.len());
    println!("{}: {} addresses", name_b, list_b.len());
    println!("Only in {}: {}", name_a, comparison.only_in_a.len());
    println!("Only in {}: {}", name_b, comparison.only_in_b.len());
    println!("In both:    {}", comparison.common.len());
    Ok(())
}

fn duplicates(file: &Path, top: usize, dedup_output: Option<&Path>) -> Result<()> {
    let list = read_address_list(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let report = find_duplicates(&list);

    println!("Total entries:      {}", report.total);
    println!("Unique addresses:   {}", report.unique);
    println!("Duplicated:         {}", report.duplicates.len());
    println!("Duplicate entries:  {}", report.duplicate_entries);
    for (address, count) in report.most_duplicated(top) {
        println!("  {} x{}", address, count);
    }

    if let Some(path) = dedup_output {
        write_address_list(path, &dedup(&list)).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

fn write_rewards(config: &Config, addresses: &[String], output: &Path) -> Result<Vec<PathBuf>> {
    let rewards = &config.rewards;
    let rule: AmountRule = rewards.amount_rule()?;
    let records = build_records(addresses, rewards.defi_id, rule, &rewards.description)?;
    let files = write_batches(output, &records, rewards.max_records_per_file)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    for file in &files {
        println!("Batch written:  {}", file.display());
    }
    Ok(files)
}

async fn send(config: &Config, files: &[PathBuf], dry_run: bool) -> Result<()> {
    let secret = config.rewards_secret()?;
    let client = RewardsClient::new(build_client(config.http.timeout())?, &config.rewards.endpoint, secret);

    for file in files {
        let records = read_batch(file).with_context(|| format!("Failed to read {}", file.display()))?;
        if dry_run {
            let headers = client.sign_now(&records)?;
            println!("POST {}", client.endpoint());
            println!("{}: {}", TIMESTAMP_HEADER, headers.timestamp);
            println!("{}: {}", NONCE_HEADER, headers.nonce);
            println!("{}: {}", SIGNATURE_HEADER, headers.signature);
            println!("{}", serde_json::to_string_pretty(&records)?);
            continue;
        }

        let response = client
            .submit(&records)
            .await
            .with_context(|| format!("Failed to submit {}", file.display()))?;
        info!("{}: {}", file.display(), response);
    }
    Ok(())
}
