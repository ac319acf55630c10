//! Pre-computed season tables served by an indexer.
//!
//! Some seasons were computed inside a Squid processor or a subgraph, which
//! store one row per holder with a `hasAll` flag. These sources page through
//! those rows instead of raw transfers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::http::post_graphql;
use crate::source::{offset_of, Cursor, FetchTarget, Page, PageSource};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonHolder {
    pub address: String,
    #[serde(default)]
    pub has_all: Option<bool>,
    #[serde(default)]
    pub owned_yokis: Option<Vec<i64>>,
}

impl SeasonHolder {
    /// `hasAll` wins; when it is false the per-token counts are checked as a
    /// fallback. Rows without the flag come from server-filtered queries.
    pub fn qualifies(&self) -> bool {
        match self.has_all {
            Some(true) | None => true,
            Some(false) => self
                .owned_yokis
                .as_ref()
                .is_some_and(|counts| !counts.is_empty() && counts.iter().all(|c| *c > 0)),
        }
    }
}

fn next_offset(skip: u64, returned: usize) -> Option<Cursor> {
    Some(Cursor::Offset(skip + returned as u64))
}

// ---------------------------------------------------------------------------
// Squid: yokiPerSeasons
// ---------------------------------------------------------------------------

const SQUID_SEASON_QUERY: &str = r#"
query GetYokiPerSeasons($season: Int!, $limit: Int!, $offset: Int!) {
  yokiPerSeasons(
    where: { season_eq: $season }
    limit: $limit
    offset: $offset
    orderBy: address_ASC
  ) {
    address
    hasAll
    ownedYokis
  }
}
"#;

#[derive(Debug, Serialize)]
struct SquidVariables {
    season: u32,
    limit: usize,
    offset: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquidData {
    yoki_per_seasons: Vec<SeasonHolder>,
}

/// Reads every row of one season and leaves filtering to [`SeasonHolder::qualifies`].
pub struct SquidSnapshotSource {
    client: Client,
    url: String,
    season: u32,
    limit: usize,
}

impl SquidSnapshotSource {
    pub fn new(client: Client, url: impl Into<String>, season: u32, limit: usize) -> Self {
        Self {
            client,
            url: url.into(),
            season,
            limit,
        }
    }
}

#[async_trait]
impl PageSource for SquidSnapshotSource {
    type Item = SeasonHolder;

    fn name(&self) -> &str {
        "squid"
    }

    fn page_size(&self) -> Option<usize> {
        Some(self.limit)
    }

    async fn fetch_page(&self, _target: &FetchTarget, cursor: Option<&Cursor>) -> AppResult<Page<SeasonHolder>> {
        let offset = offset_of(cursor);
        let variables = SquidVariables {
            season: self.season,
            limit: self.limit,
            offset,
        };
        let data: SquidData = post_graphql(&self.client, &self.url, SQUID_SEASON_QUERY, variables).await?;
        let items = data.yoki_per_seasons;
        let next = next_offset(offset, items.len());
        Ok(Page { items, next })
    }
}

// ---------------------------------------------------------------------------
// The Graph: <seasonN>Conditions_collection
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CollectionVariables {
    first: usize,
    skip: u64,
}

/// Rows already filtered by `hasAllRequiredTokens: true` on the subgraph.
pub struct GraphCollectionSource {
    client: Client,
    url: String,
    collection: String,
    query: String,
    first: usize,
}

impl GraphCollectionSource {
    pub fn new(client: Client, url: impl Into<String>, collection: impl Into<String>, first: usize) -> Self {
        let collection = collection.into();
        let query = format!(
            r#"
query CheckSeasonConditions($first: Int!, $skip: Int!) {{
  {collection}(
    where: {{ hasAllRequiredTokens: true }}
    first: $first
    skip: $skip
    orderBy: id
    orderDirection: asc
  ) {{
    id
    address
  }}
}}
"#
        );
        Self {
            client,
            url: url.into(),
            collection,
            query,
            first,
        }
    }
}

#[async_trait]
impl PageSource for GraphCollectionSource {
    type Item = SeasonHolder;

    fn name(&self) -> &str {
        "thegraph"
    }

    fn page_size(&self) -> Option<usize> {
        Some(self.first)
    }

    async fn fetch_page(&self, _target: &FetchTarget, cursor: Option<&Cursor>) -> AppResult<Page<SeasonHolder>> {
        let skip = offset_of(cursor);
        let variables = CollectionVariables {
            first: self.first,
            skip,
        };
        let mut data: serde_json::Map<String, Value> =
            post_graphql(&self.client, &self.url, &self.query, variables).await?;

        let rows = data.remove(&self.collection).ok_or_else(|| {
            AppError::MalformedResponse(format!("Response has no '{}' field", self.collection))
        })?;
        let items: Vec<SeasonHolder> = serde_json::from_value(rows)
            .map_err(|e| AppError::MalformedResponse(format!("Unexpected {} rows: {}", self.collection, e)))?;

        let next = next_offset(skip, items.len());
        Ok(Page { items, next })
    }
}
