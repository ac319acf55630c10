//! End-to-end season runs: fetch, normalize, replay, evaluate.

use tracing::{info, warn};

use crate::addresses::{dedup, find_duplicates, DuplicateReport};
use crate::config::Season;
use crate::eligibility::{evaluate_all, sorted_addresses};
use crate::fetch::{FetchDriver, TargetFailure};
use crate::ledger::{Ledger, ReplaySummary};
use crate::snapshot::SeasonHolder;
use crate::source::{FetchTarget, PageSource, TransferSource};
use crate::types::TransferEvent;

#[derive(Debug)]
pub struct EligibilityOutcome {
    /// Lowercase hex, sorted.
    pub qualified: Vec<String>,
    pub summary: ReplaySummary,
    /// Targets abandoned after retries. Their transfers are missing from the replay.
    pub incomplete: Vec<TargetFailure>,
    pub holders: usize,
    pub malformed: usize,
}

impl EligibilityOutcome {
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }
}

pub async fn run_eligibility<S>(source: &S, driver: &FetchDriver, season: &Season) -> EligibilityOutcome
where
    S: TransferSource + ?Sized,
{
    info!(
        "Evaluating {} with {} required tokens, cutoff {}",
        season.name,
        season.required.len(),
        season.cutoff.to_rfc3339()
    );

    let targets = source.targets(&season.required);
    let report = driver.fetch_all(source, &targets).await;
    info!("Fetched {} transfers in {} pages", report.items.len(), report.pages);

    let mut malformed = 0;
    let mut events = Vec::with_capacity(report.items.len());
    for raw in report.items {
        match TransferEvent::try_from(raw) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!("Skipping transfer: {}", e);
                malformed += 1;
            }
        }
    }

    let (ledger, summary) = Ledger::new(season.credit_policy).replay(events, season.cutoff);
    let qualified = sorted_addresses(&evaluate_all(&ledger, &season.required));
    info!(
        "{} of {} holders qualify for {}",
        qualified.len(),
        ledger.holder_count(),
        season.name
    );

    EligibilityOutcome {
        qualified,
        summary,
        incomplete: report.incomplete,
        holders: ledger.holder_count(),
        malformed,
    }
}

#[derive(Debug)]
pub struct SnapshotOutcome {
    /// Qualifying addresses, first occurrence kept.
    pub qualified: Vec<String>,
    pub rows: usize,
    pub duplicates: DuplicateReport,
    pub incomplete: Vec<TargetFailure>,
}

pub async fn collect_snapshot<S>(source: &S, driver: &FetchDriver) -> SnapshotOutcome
where
    S: PageSource<Item = SeasonHolder> + ?Sized,
{
    let report = driver.fetch_all(source, &[FetchTarget::All]).await;
    let rows = report.items.len();

    let addresses: Vec<String> = report
        .items
        .into_iter()
        .filter(SeasonHolder::qualifies)
        .map(|holder| holder.address)
        .collect();

    let duplicates = find_duplicates(&addresses);
    if !duplicates.duplicates.is_empty() {
        warn!(
            "{} addresses repeated in {} snapshot ({} extra rows)",
            duplicates.duplicates.len(),
            source.name(),
            duplicates.duplicate_entries
        );
    }
    let qualified = dedup(&addresses);
    info!("{} of {} snapshot rows qualify", qualified.len(), rows);

    SnapshotOutcome {
        qualified,
        rows,
        duplicates,
        incomplete: report.incomplete,
    }
}
