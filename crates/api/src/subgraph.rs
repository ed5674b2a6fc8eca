//! Moola v2 subgraph client for loan-book discovery.
//!
//! Fetches one page of users per request, each with the reserves they hold as
//! collateral and the reserves they owe. Pagination is driven by the caller
//! through an opaque `id_gt` cursor.

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Default Moola v2 subgraph on The Graph hosted service.
pub const DEFAULT_SUBGRAPH_ENDPOINT: &str =
    "https://api.thegraph.com/subgraphs/name/ashutoshvarma/moola-v2-celo";

/// Per-request deadline, covering connect, response and body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Users query. Collateral side only includes reserves with a positive aToken
/// balance that are enabled as collateral; borrow side only reserves with debt.
pub const USERS_QUERY: &str = r#"
query getUserData($lastID: String, $first: Int) {
  users(first: $first, where: { id_gt: $lastID }, orderBy: id, orderDirection: asc) {
    userId: id
    collateralReserve: reserves(
      where: { currentATokenBalance_gt: 0, usageAsCollateralEnabled: true }
    ) {
      currentATokenBalance
      reserve {
        name
        underlyingAsset
        symbol
        decimals
        reserveLiquidationThreshold
        reserveLiquidationBonus
      }
    }
    borrowReserve: reserves(where: { currentTotalDebt_gt: 0 }) {
      currentTotalDebt
      reserve {
        name
        underlyingAsset
        symbol
        decimals
        reserveLiquidationThreshold
        reserveLiquidationBonus
      }
    }
  }
}
"#;

/// Errors returned by the subgraph client.
#[derive(Debug, thiserror::Error)]
pub enum SubgraphError {
    #[error("subgraph request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("subgraph returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("subgraph query error: {0}")]
    Query(String),

    #[error("subgraph response had no data")]
    MissingData,

    #[error("loan book refresh timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Reserve metadata attached to every user reserve.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveInfo {
    #[serde(default)]
    pub name: String,
    pub underlying_asset: Address,
    #[serde(default)]
    pub symbol: String,
    #[serde(deserialize_with = "de_number")]
    pub decimals: u8,
    /// Liquidation threshold in basis points (8000 = 80%)
    #[serde(rename = "reserveLiquidationThreshold", deserialize_with = "de_number")]
    pub liquidation_threshold_bps: u16,
    /// Liquidation bonus in basis points (10500 = 5% bonus)
    #[serde(rename = "reserveLiquidationBonus", deserialize_with = "de_number")]
    pub liquidation_bonus_bps: u16,
}

/// One reserve a user holds, either as collateral or as debt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserReserve {
    /// Raw balance (collateral) or total debt (borrow), unscaled
    #[serde(
        alias = "currentATokenBalance",
        alias = "currentTotalDebt",
        deserialize_with = "de_u256"
    )]
    pub amount: U256,
    pub reserve: ReserveInfo,
}

/// A user row as returned by the subgraph.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubgraphUser {
    /// Opaque ascending identifier, also the borrower address
    #[serde(rename = "userId")]
    pub id: String,
    #[serde(default)]
    pub collateral_reserve: Vec<UserReserve>,
    #[serde(default)]
    pub borrow_reserve: Vec<UserReserve>,
}

/// Source of paginated loan-book rows.
#[async_trait]
pub trait LoanBookSource: Send + Sync {
    /// Fetch up to `page_size` users with an id strictly greater than `cursor`,
    /// ordered by ascending id. An empty cursor starts from the beginning.
    async fn fetch_users_page(
        &self,
        cursor: &str,
        page_size: usize,
    ) -> Result<Vec<SubgraphUser>, SubgraphError>;
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: UsersVariables<'a>,
}

#[derive(Serialize)]
struct UsersVariables<'a> {
    #[serde(rename = "lastID")]
    last_id: &'a str,
    first: usize,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct UsersData {
    users: Vec<SubgraphUser>,
}

/// HTTP client for the Moola subgraph.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    client: reqwest::Client,
    endpoint: String,
}

impl SubgraphClient {
    /// Create a client against the default hosted subgraph.
    pub fn new() -> Result<Self, SubgraphError> {
        Self::with_endpoint(DEFAULT_SUBGRAPH_ENDPOINT)
    }

    /// Create a client with a custom endpoint.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, SubgraphError> {
        Self::with_timeout(endpoint, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SubgraphError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LoanBookSource for SubgraphClient {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn fetch_users_page(
        &self,
        cursor: &str,
        page_size: usize,
    ) -> Result<Vec<SubgraphUser>, SubgraphError> {
        let request = GraphQlRequest {
            query: USERS_QUERY,
            variables: UsersVariables {
                last_id: cursor,
                first: page_size,
            },
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SubgraphError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: GraphQlResponse<UsersData> = response.json().await?;
        let users = parse_users(body)?;

        debug!(cursor = cursor, rows = users.len(), "Fetched subgraph page");

        Ok(users)
    }
}

fn parse_users(body: GraphQlResponse<UsersData>) -> Result<Vec<SubgraphUser>, SubgraphError> {
    if !body.errors.is_empty() {
        let message = body
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SubgraphError::Query(message));
    }

    body.data
        .map(|d| d.users)
        .ok_or(SubgraphError::MissingData)
}

/// GraphQL `BigInt` values arrive as strings, `Int` values as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

fn de_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + TryFrom<u64>,
    <T as FromStr>::Err: std::fmt::Display,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.trim().parse().map_err(de::Error::custom),
        StringOrNumber::Number(n) => {
            T::try_from(n).map_err(|_| de::Error::custom(format!("number {n} out of range")))
        }
    }
}

fn de_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => U256::from_str_radix(s.trim(), 10).map_err(de::Error::custom),
        StringOrNumber::Number(n) => Ok(U256::from(n)),
    }
}
