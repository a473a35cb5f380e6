//! Trade generation
//!
//! Turns one match between a taker and a maker into a `Trade`, stamping it
//! with the book's next sequence number.

use types::ids::{PairId, TradeId};
use types::numeric::{Price, Quantity};
use types::order::Order;
use types::trade::Trade;

/// Trade factory with a per-book sequence counter
#[derive(Debug)]
pub struct MatchExecutor {
    sequence_counter: u64,
}

impl MatchExecutor {
    /// Create an executor whose first trade carries `starting_sequence`
    pub fn new(starting_sequence: u64) -> Self {
        Self {
            sequence_counter: starting_sequence,
        }
    }

    /// Next sequence number (monotonically increasing)
    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence_counter;
        self.sequence_counter += 1;
        seq
    }

    /// Build the trade for `quantity` between `taker` and `maker` at `price`
    ///
    /// `price` is the maker's resting price; the side recorded is the taker's.
    pub fn execute_trade(
        &mut self,
        pair_id: PairId,
        taker: &Order,
        maker: &Order,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Trade {
        Trade {
            trade_id: TradeId::new(),
            sequence: self.next_sequence(),
            pair_id,
            taker_order_id: taker.id,
            maker_order_id: maker.id,
            taker_user_id: taker.user_id,
            maker_user_id: maker.user_id,
            side: taker.side,
            price,
            quantity,
            trade_time: timestamp,
        }
    }
}
