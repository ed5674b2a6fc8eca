//! Swap path selection for flash-loan repayment.
//!
//! The settlement contract swaps seized collateral back into the debt asset
//! along the returned path. Stable/stable pairs trade directly; CELO/stable
//! pairs go through the network's bridge token.

use alloy::primitives::Address;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

use crate::assets::{Asset, AssetRegistry};
use crate::error::RouteError;

/// Ordered hop list, 2 or 3 addresses.
pub type SwapPath = SmallVec<[Address; 3]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Direct,
    Bridged,
}

pub struct AssetRouter {
    assets: Arc<AssetRegistry>,
}

impl AssetRouter {
    pub fn new(assets: Arc<AssetRegistry>) -> Self {
        Self { assets }
    }

    /// Path from `collateral` to `debt`.
    pub fn route(&self, collateral: Address, debt: Address) -> Result<SwapPath, RouteError> {
        if collateral == debt {
            return Ok(smallvec![collateral, debt]);
        }

        let no_route = || RouteError::NoRouteForPair {
            from: collateral,
            to: debt,
        };
        let from = self.assets.asset_of(&collateral).map_err(|_| no_route())?;
        let to = self.assets.asset_of(&debt).map_err(|_| no_route())?;

        match shape(from, to) {
            Shape::Direct => Ok(smallvec![collateral, debt]),
            Shape::Bridged => {
                let bridge = self.assets.bridge().ok_or_else(no_route)?;
                Ok(smallvec![collateral, bridge, debt])
            }
        }
    }
}

/// Shape depends only on the unordered pair.
fn shape(a: Asset, b: Asset) -> Shape {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo.is_native() && hi.is_stable() {
        Shape::Bridged
    } else {
        Shape::Direct
    }
}
