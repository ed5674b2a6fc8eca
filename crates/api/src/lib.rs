//! Moola liquidator API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - The Moola v2 subgraph: paginated loan-book discovery

mod subgraph;

pub use subgraph::{
    LoanBookSource, ReserveInfo, SubgraphClient, SubgraphError, SubgraphUser, UserReserve,
    DEFAULT_SUBGRAPH_ENDPOINT, REQUEST_TIMEOUT, USERS_QUERY,
};
