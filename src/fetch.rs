use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::AppResult;
use crate::retry::RetryPolicy;
use crate::source::{Cursor, FetchTarget, PageSource};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Politeness delay between page requests.
    pub page_delay_ms: u64,
    /// Stop a target after this many pages even if the source says there is more.
    pub max_pages: Option<u32>,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_delay_ms: 100,
            max_pages: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: FetchTarget,
    pub reason: String,
}

#[derive(Debug)]
pub struct FetchReport<T> {
    /// Items from completed targets only.
    pub items: Vec<T>,
    pub completed: Vec<FetchTarget>,
    pub incomplete: Vec<TargetFailure>,
    pub pages: usize,
}

impl<T> FetchReport<T> {
    pub fn is_complete(&self) -> bool {
        self.incomplete.is_empty()
    }
}

/// Sequential page walker with per-page retry.
#[derive(Debug, Clone)]
pub struct FetchDriver {
    retry: RetryPolicy,
    page_delay: Duration,
    max_pages: Option<u32>,
}

impl FetchDriver {
    pub fn new(retry: RetryPolicy, page_delay: Duration) -> Self {
        Self {
            retry,
            page_delay,
            max_pages: None,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            page_delay: Duration::from_millis(config.page_delay_ms),
            max_pages: config.max_pages,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    /// Walk every page of one target. Any page that still fails after the
    /// retry budget fails the whole target.
    pub async fn fetch_target<S>(&self, source: &S, target: &FetchTarget) -> AppResult<(Vec<S::Item>, usize)>
    where
        S: PageSource + ?Sized,
    {
        let mut items = Vec::new();
        let mut cursor: Option<Cursor> = None;
        let mut pages = 0usize;

        loop {
            let label = format!("{} {} page {}", source.name(), target, pages + 1);
            let page = self
                .retry
                .run(&label, || source.fetch_page(target, cursor.as_ref()))
                .await?;

            pages += 1;
            let count = page.items.len();
            items.extend(page.items);
            debug!("Fetched {} items for {} (page {}, total {})", count, target, pages, items.len());

            let short_page = source.page_size().is_some_and(|size| count < size);
            let stalled = count == 0 && page.next.is_some() && page.next == cursor;
            if stalled {
                warn!("{} returned an empty page without advancing for {}, stopping pagination", source.name(), target);
            }
            match page.next {
                Some(next) if !short_page && !stalled => cursor = Some(next),
                _ => break,
            }

            if let Some(max) = self.max_pages {
                if pages >= max as usize {
                    warn!("Reached maximum page limit ({}) for {}, stopping pagination", max, target);
                    break;
                }
            }

            tokio::time::sleep(self.page_delay).await;
        }

        Ok((items, pages))
    }

    /// Fetch each target in turn. A target that fails is logged and skipped;
    /// whatever it had fetched so far is dropped.
    pub async fn fetch_all<S>(&self, source: &S, targets: &[FetchTarget]) -> FetchReport<S::Item>
    where
        S: PageSource + ?Sized,
    {
        let mut report = FetchReport {
            items: Vec::new(),
            completed: Vec::new(),
            incomplete: Vec::new(),
            pages: 0,
        };

        for target in targets {
            info!("Fetching {} from {}", target, source.name());
            match self.fetch_target(source, target).await {
                Ok((items, pages)) => {
                    info!("Completed {}: {} items in {} pages", target, items.len(), pages);
                    report.items.extend(items);
                    report.pages += pages;
                    report.completed.push(target.clone());
                }
                Err(e) => {
                    error!("Abandoning {} after error: {}", target, e);
                    report.incomplete.push(TargetFailure {
                        target: target.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !report.is_complete() {
            let names: Vec<String> = report.incomplete.iter().map(|f| f.target.to_string()).collect();
            warn!("Incomplete data for: {}", names.join(", "));
        }

        report
    }
}
