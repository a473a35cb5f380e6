//! Trading pair reference data

use crate::ids::{AssetId, PairCode, PairId};
use crate::order::Side;
use serde::{Deserialize, Serialize};

/// A tradeable market: primary (base) asset quoted in the secondary asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingPair {
    pub id: PairId,
    pub code: PairCode,
    pub primary_asset_id: AssetId,
    pub secondary_asset_id: AssetId,
}

impl TradingPair {
    /// Asset debited when an order on `side` is accepted
    pub fn funding_asset(&self, side: Side) -> AssetId {
        match side {
            Side::SELL => self.primary_asset_id,
            Side::BUY => self.secondary_asset_id,
        }
    }

    /// Asset credited to the owner of an order on `side` when it fills
    pub fn receiving_asset(&self, side: Side) -> AssetId {
        self.funding_asset(side.opposite())
    }
}
