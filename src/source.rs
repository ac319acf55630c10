//! Paginated indexer feeds.
//!
//! A source answers one page at a time for a [`FetchTarget`]; the fetch
//! driver owns looping, retries and politeness delays.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

use crate::eligibility::RequiredTokenSet;
use crate::error::AppResult;
use crate::types::{RawTransfer, TokenId};

/// Unit of work for the fetch driver. Abandoned as a whole on failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchTarget {
    Token(TokenId),
    /// Feeds that return every token in one stream (subgraph, season snapshots).
    All,
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::Token(id) => write!(f, "token {}", id),
            FetchTarget::All => write!(f, "all tokens"),
        }
    }
}

/// Opaque position for the next page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Offset(u64),
    /// GraphQL connection `endCursor`
    After(String),
    /// REST `next_page_params`, echoed back as query parameters
    Params(BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when the source says there is nothing after this page.
    pub next: Option<Cursor>,
}

#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    fn name(&self) -> &str;

    /// Requested page size, when the caller controls it. A shorter page ends pagination.
    fn page_size(&self) -> Option<usize>;

    async fn fetch_page(
        &self,
        target: &FetchTarget,
        cursor: Option<&Cursor>,
    ) -> AppResult<Page<Self::Item>>;
}

/// Feed of ERC-1155 transfers for a season.
pub trait TransferSource: PageSource<Item = RawTransfer> {
    /// One target per required token unless the feed is not keyed by token.
    fn targets(&self, required: &RequiredTokenSet) -> Vec<FetchTarget> {
        required.ids().iter().map(|id| FetchTarget::Token(*id)).collect()
    }
}

/// Offset carried by `cursor`, zero on the first page.
pub(crate) fn offset_of(cursor: Option<&Cursor>) -> u64 {
    match cursor {
        Some(Cursor::Offset(offset)) => *offset,
        _ => 0,
    }
}
