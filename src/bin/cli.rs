use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use insider_ledger::{
    core::config::IngestConfig,
    edgar::{parsing::text::read_submission, EdgarFetcher, FilingFetcher, ReportType},
    ownership::model::TransactionCode,
    FilingBundle, FilingContext, FilingProcessor, FilingSink, MemoryStore,
};
use rust_decimal::Decimal;
use itertools::Itertools;
use serde::Serialize;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "insider-cli", about = "Extract insider ownership data from SEC Form 4 filings")]
enum Command {
    /// Parse a submission text file
    Parse {
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        #[structopt(flatten)]
        context: ContextArgs,
        /// Print transactions as CSV instead of the full bundle as JSON
        #[structopt(long)]
        csv: bool,
    },
    /// Fetch a submission from EDGAR and parse it
    Fetch {
        #[structopt(long)]
        cik: String,
        #[structopt(long)]
        accession: String,
        #[structopt(long)]
        csv: bool,
    },
    /// Process every .txt submission in a directory, oldest file name first
    Batch {
        #[structopt(parse(from_os_str))]
        dir: PathBuf,
    },
    /// List known transaction codes and form types
    Codes,
}

#[derive(Debug, StructOpt)]
struct ContextArgs {
    #[structopt(long, default_value = "")]
    cik: String,
    #[structopt(long, default_value = "")]
    accession: String,
    #[structopt(long = "form", default_value = "")]
    form_type: String,
    /// Filing date as YYYY-MM-DD
    #[structopt(long)]
    filing_date: Option<NaiveDate>,
}

impl From<ContextArgs> for FilingContext {
    fn from(args: ContextArgs) -> Self {
        FilingContext::new(&args.cik, &args.accession, &args.form_type, args.filing_date)
    }
}

#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    accession_number: &'a str,
    owner: &'a str,
    relationship_type: String,
    security: &'a str,
    code: String,
    date: Option<NaiveDate>,
    shares: Decimal,
    price: Option<Decimal>,
    acquired_disposed: String,
    direct: bool,
    position_only: bool,
    shares_owned_following: Option<Decimal>,
    footnotes: String,
}

fn print_bundle(bundle: &FilingBundle, as_csv: bool) -> Result<()> {
    if !as_csv {
        println!("{}", serde_json::to_string_pretty(bundle)?);
        return Ok(());
    }

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for txn in &bundle.transactions {
        let relationship = bundle.relationship(txn.relationship_id);
        let security = bundle
            .securities
            .iter()
            .find(|s| s.id == txn.security_id)
            .map(|s| s.title.as_str())
            .unwrap_or("");
        writer.serialize(TransactionRow {
            accession_number: &txn.accession_number,
            owner: relationship
                .map(|r| r.relationship_details.owner.name.as_str())
                .unwrap_or(""),
            relationship_type: relationship
                .map(|r| r.relationship_type.to_string())
                .unwrap_or_default(),
            security,
            code: txn
                .transaction_code
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_default(),
            date: txn.transaction_date,
            shares: txn.shares_amount,
            price: txn.price_per_share.or(txn.price_per_derivative),
            acquired_disposed: txn
                .acquisition_disposition_flag
                .map(|f| format!("{:?}", f))
                .unwrap_or_default(),
            direct: txn.direct_ownership,
            position_only: txn.is_position_only,
            shares_owned_following: txn.shares_owned_following,
            footnotes: txn.footnote_ids.join(";"),
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn submission_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {:?}", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map(|ext| ext == "txt").unwrap_or(false))
        .collect();
    files.sort();
    Ok(files)
}

async fn run_batch(dir: &Path) -> Result<()> {
    let files = submission_files(dir)?;
    if files.is_empty() {
        return Err(anyhow!("No .txt submissions found in {:?}", dir));
    }

    let store = MemoryStore::new();
    let mut processor = FilingProcessor::new();

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut skipped = 0;
    let mut failed = 0;
    for path in &files {
        progress.set_message(
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        let raw = match read_submission(path) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Failed to read {:?}: {}", path, e);
                failed += 1;
                progress.inc(1);
                continue;
            }
        };
        let bundle = processor.process(&raw, &FilingContext::default());
        skipped += bundle.report.skipped.len();
        if let Err(e) = store.persist(&bundle).await {
            log::error!("Failed to store {:?}: {}", path, e);
            failed += 1;
        }
        progress.inc(1);
    }
    progress.finish_with_message("done");

    let counts = store.counts();
    println!(
        "{} filings, {} relationships, {} transactions, {} snapshots ({} records skipped, {} files failed)",
        counts.filings, counts.relationships, counts.transactions, counts.snapshots, skipped, failed
    );

    // One block per owner and issuer, labelled by the latest filing's role.
    let latest = store
        .relationships()
        .into_iter()
        .rev()
        .unique_by(|r| r.ownership_id)
        .collect::<Vec<_>>();
    for relationship in latest.into_iter().rev() {
        let totals = processor.ledger().totals(relationship.ownership_id, None);
        let details = &relationship.relationship_details;
        println!("{} -> {} ({})", details.owner.name, details.issuer.name, relationship.relationship_type);
        for (security_id, shares) in totals {
            let title = store
                .security(security_id)
                .map(|s| s.title)
                .unwrap_or_else(|| security_id.to_string());
            println!("    {:<40} {}", title, shares);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    match Command::from_args() {
        Command::Parse {
            input,
            context,
            csv,
        } => {
            if !input.exists() {
                return Err(anyhow!("Input file does not exist: {:?}", input));
            }
            let raw = read_submission(&input)?;
            let bundle = insider_ledger::extract(&raw, &context.into());
            print_bundle(&bundle, csv)?;
        }
        Command::Fetch {
            cik,
            accession,
            csv,
        } => {
            let config = IngestConfig::from_env()?;
            let fetcher = EdgarFetcher::new(config)?;
            let raw = fetcher.fetch(&cik, &accession).await?;
            let context = FilingContext::new(&cik, &accession, "", None);
            let bundle = insider_ledger::extract(&raw, &context);
            print_bundle(&bundle, csv)?;
        }
        Command::Batch { dir } => run_batch(&dir).await?,
        Command::Codes => {
            for code in TransactionCode::iter().filter(|c| !matches!(c, TransactionCode::Unknown(_))) {
                println!("{}  {}", code, code.description());
            }
            println!("\nForm types: {}", ReportType::list_types());
        }
    }
    Ok(())
}
