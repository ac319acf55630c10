//! Transfer feeds for the Yoki ERC-1155 contract.
//!
//! Three indexers have served the campaign: the Blockscout REST v2 API, the
//! Blockscout GraphQL endpoint and a self-hosted subgraph. Each one is a
//! [`TransferSource`]; server-side cutoff filters are only a pre-filter, the
//! ledger replay applies the cutoff again.

use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::eligibility::RequiredTokenSet;
use crate::error::{AppError, AppResult};
use crate::http::{ensure_success, post_graphql};
use crate::source::{offset_of, Cursor, FetchTarget, Page, PageSource, TransferSource};
use crate::types::{RawTransfer, TokenId};

fn token_of(source: &str, target: &FetchTarget) -> AppResult<TokenId> {
    match target {
        FetchTarget::Token(id) => Ok(*id),
        FetchTarget::All => Err(AppError::Configuration(format!(
            "{} is queried per token id",
            source
        ))),
    }
}

// ---------------------------------------------------------------------------
// Blockscout REST v2
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RestTransfersResponse {
    items: Vec<RestTransfer>,
    next_page_params: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RestTransfer {
    from: HashRef,
    to: HashRef,
    timestamp: String,
    total: RestTotal,
}

#[derive(Debug, Deserialize)]
struct HashRef {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RestTotal {
    token_id: Option<String>,
    value: Option<String>,
}

/// `GET /tokens/{contract}/instances/{id}/transfers`, newest first.
pub struct BlockscoutRestSource {
    client: Client,
    base_url: String,
    contract: Address,
}

impl BlockscoutRestSource {
    pub fn new(client: Client, base_url: impl Into<String>, contract: Address) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            contract,
        }
    }

    fn transfers_url(&self, token_id: &TokenId) -> String {
        format!(
            "{}/tokens/{}/instances/{}/transfers",
            self.base_url,
            self.contract.to_checksum(None),
            token_id
        )
    }
}

/// `next_page_params` values come as numbers or strings; all go back as query strings.
fn page_params(params: serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    params
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

#[async_trait]
impl PageSource for BlockscoutRestSource {
    type Item = RawTransfer;

    fn name(&self) -> &str {
        "blockscout-rest"
    }

    fn page_size(&self) -> Option<usize> {
        None
    }

    async fn fetch_page(&self, target: &FetchTarget, cursor: Option<&Cursor>) -> AppResult<Page<RawTransfer>> {
        let token_id = token_of(self.name(), target)?;
        let url = self.transfers_url(&token_id);

        let mut request = self.client.get(&url);
        if let Some(Cursor::Params(params)) = cursor {
            request = request.query(params);
        }
        debug!("GET {}", url);

        let response = ensure_success(request.send().await?).await?;
        let body: RestTransfersResponse = response.json().await?;

        let fallback_id = token_id.to_string();
        let items = body
            .items
            .into_iter()
            .map(|item| RawTransfer {
                from: item.from.hash,
                to: item.to.hash,
                token_id: item.total.token_id.unwrap_or_else(|| fallback_id.clone()),
                value: item.total.value.unwrap_or_default(),
                timestamp: item.timestamp,
            })
            .collect();

        Ok(Page {
            items,
            next: body.next_page_params.map(|p| Cursor::Params(page_params(p))),
        })
    }
}

impl TransferSource for BlockscoutRestSource {}

// ---------------------------------------------------------------------------
// Blockscout GraphQL
// ---------------------------------------------------------------------------

const BLOCKSCOUT_TRANSFERS_QUERY: &str = r#"
query GetTokenTransfers($contract: AddressHash!, $tokenId: String!, $first: Int!, $after: String) {
  erc1155Token(hash: $contract) {
    tokenTransfers(
      tokenIds: [$tokenId],
      filter: { timestamp: { lessThan: "__CUTOFF__" } },
      first: $first,
      after: $after
    ) {
      pageInfo {
        hasNextPage
        endCursor
      }
      nodes {
        timestamp
        from { hash }
        to { hash }
        tokenId
        value
      }
    }
  }
}
"#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockscoutVariables<'a> {
    contract: String,
    token_id: String,
    first: usize,
    after: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Erc1155TokenData {
    erc1155_token: Option<TokenTransfersField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransfersField {
    token_transfers: TransferConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferConnection {
    page_info: PageInfo,
    nodes: Vec<GraphTransferNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphTransferNode {
    timestamp: String,
    from: HashRef,
    to: HashRef,
    token_id: String,
    value: String,
}

pub struct BlockscoutGraphqlSource {
    client: Client,
    url: String,
    contract: Address,
    query: String,
    first: usize,
}

impl BlockscoutGraphqlSource {
    pub fn new(client: Client, url: impl Into<String>, contract: Address, cutoff: DateTime<Utc>, first: usize) -> Self {
        // `lessThan` is exclusive; nudge it so transfers at the cutoff still arrive.
        let bound = (cutoff + Duration::seconds(1)).to_rfc3339();
        Self {
            client,
            url: url.into(),
            contract,
            query: BLOCKSCOUT_TRANSFERS_QUERY.replace("__CUTOFF__", &bound),
            first,
        }
    }
}

#[async_trait]
impl PageSource for BlockscoutGraphqlSource {
    type Item = RawTransfer;

    fn name(&self) -> &str {
        "blockscout-graphql"
    }

    fn page_size(&self) -> Option<usize> {
        Some(self.first)
    }

    async fn fetch_page(&self, target: &FetchTarget, cursor: Option<&Cursor>) -> AppResult<Page<RawTransfer>> {
        let token_id = token_of(self.name(), target)?;
        let after = match cursor {
            Some(Cursor::After(end_cursor)) => Some(end_cursor.as_str()),
            _ => None,
        };

        let variables = BlockscoutVariables {
            contract: self.contract.to_checksum(None),
            token_id: token_id.to_string(),
            first: self.first,
            after,
        };
        let data: Erc1155TokenData = post_graphql(&self.client, &self.url, &self.query, variables).await?;

        let Some(token) = data.erc1155_token else {
            info!("No transfer data found for token {}", token_id);
            return Ok(Page {
                items: Vec::new(),
                next: None,
            });
        };

        let connection = token.token_transfers;
        let next = match (connection.page_info.has_next_page, connection.page_info.end_cursor) {
            (true, Some(end_cursor)) => Some(Cursor::After(end_cursor)),
            (true, None) => {
                return Err(AppError::MalformedResponse(
                    "hasNextPage without endCursor".to_string(),
                ))
            }
            (false, _) => None,
        };

        let items = connection
            .nodes
            .into_iter()
            .map(|node| RawTransfer {
                from: node.from.hash,
                to: node.to.hash,
                token_id: node.token_id,
                value: node.value,
                timestamp: node.timestamp,
            })
            .collect();

        Ok(Page { items, next })
    }
}

impl TransferSource for BlockscoutGraphqlSource {}

// ---------------------------------------------------------------------------
// Subgraph
// ---------------------------------------------------------------------------

const SUBGRAPH_TRANSFERS_QUERY: &str = r#"
query GetTransferSingles($first: Int!, $skip: Int!, $blockTimestamp_lte: BigInt!) {
  transferSingles(
    first: $first
    skip: $skip
    where: { blockTimestamp_lte: $blockTimestamp_lte }
    orderBy: blockTimestamp
    orderDirection: asc
  ) {
    from
    to
    tokenId
    value
    blockTimestamp
  }
}
"#;

#[derive(Debug, Serialize)]
struct SubgraphVariables {
    first: usize,
    skip: u64,
    #[serde(rename = "blockTimestamp_lte")]
    block_timestamp_lte: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferSinglesData {
    transfer_singles: Vec<SubgraphTransfer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubgraphTransfer {
    from: String,
    to: String,
    token_id: String,
    value: String,
    block_timestamp: String,
}

/// Every `TransferSingle` up to the cutoff in one ascending, offset-paged stream.
pub struct SubgraphSource {
    client: Client,
    url: String,
    cutoff_seconds: i64,
    first: usize,
}

impl SubgraphSource {
    pub fn new(client: Client, url: impl Into<String>, cutoff: DateTime<Utc>, first: usize) -> Self {
        Self {
            client,
            url: url.into(),
            cutoff_seconds: cutoff.timestamp(),
            first,
        }
    }
}

#[async_trait]
impl PageSource for SubgraphSource {
    type Item = RawTransfer;

    fn name(&self) -> &str {
        "subgraph"
    }

    fn page_size(&self) -> Option<usize> {
        Some(self.first)
    }

    async fn fetch_page(&self, _target: &FetchTarget, cursor: Option<&Cursor>) -> AppResult<Page<RawTransfer>> {
        let skip = offset_of(cursor);
        let variables = SubgraphVariables {
            first: self.first,
            skip,
            block_timestamp_lte: self.cutoff_seconds.to_string(),
        };
        let data: TransferSinglesData =
            post_graphql(&self.client, &self.url, SUBGRAPH_TRANSFERS_QUERY, variables).await?;

        let items: Vec<RawTransfer> = data
            .transfer_singles
            .into_iter()
            .map(|t| RawTransfer {
                from: t.from,
                to: t.to,
                token_id: t.token_id,
                value: t.value,
                timestamp: t.block_timestamp,
            })
            .collect();

        let next = Some(Cursor::Offset(skip + items.len() as u64));
        Ok(Page { items, next })
    }
}

impl TransferSource for SubgraphSource {
    fn targets(&self, _required: &RequiredTokenSet) -> Vec<FetchTarget> {
        vec![FetchTarget::All]
    }
}
