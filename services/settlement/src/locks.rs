//! Settlement lock set

use lock_service::LockKey;
use types::order::Side;
use types::pair::TradingPair;
use types::trade::Trade;

/// Every lock a settlement of `trade` needs, in acquisition order
///
/// Both orders, plus each user's wallet for the asset they receive. A BUY
/// taker may also get a price-improvement refund in the secondary asset;
/// the refund depends on the taker's limit price, which is only known after
/// loading the order, so that wallet is always included for BUY takers.
pub fn settlement_lock_keys(trade: &Trade, pair: &TradingPair) -> Vec<LockKey> {
    let mut keys = vec![
        LockKey::Order(trade.taker_order_id),
        LockKey::Order(trade.maker_order_id),
        LockKey::wallet(trade.taker_user_id, pair.receiving_asset(trade.side)),
        LockKey::wallet(trade.maker_user_id, pair.receiving_asset(trade.side.opposite())),
    ];
    if trade.side == Side::BUY {
        keys.push(LockKey::wallet(trade.taker_user_id, pair.secondary_asset_id));
    }

    keys.sort();
    keys.dedup();
    keys
}
