//! Persistence
//!
//! The Wallet Ledger and the Order Store share one transaction scope: a
//! balance debit, the order it funds and the outbox entry announcing it
//! either all commit or none do. Dropping a [`Transaction`] without calling
//! [`Transaction::commit`] rolls it back.
//!
//! # Modules
//! - `error`: Store errors and their classes
//! - `outbox`: Outbox entries awaiting publication
//! - `memory`: In-process store used by the services and tests
//!
//! Users live next to orders: [`UserStore`] registers accounts and resolves
//! login emails.

pub mod error;
pub mod memory;
pub mod outbox;

use async_trait::async_trait;
use rust_decimal::Decimal;
use types::account::User;
use types::ids::{AssetId, OrderId, PairCode, PairId, UserId};
use types::order::Order;
use types::pair::TradingPair;
use types::trade::{Trade, TradeKey};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use outbox::OutboxEntry;

/// Read side of the wallet ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Committed balance; a wallet that was never credited holds zero
    async fn balance(&self, user_id: UserId, asset_id: AssetId) -> Result<Decimal, StoreError>;
}

/// Read side of the order store, plus outbox bookkeeping
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn pair_by_code(&self, code: &PairCode) -> Result<Option<TradingPair>, StoreError>;

    async fn pair_by_id(&self, pair_id: PairId) -> Result<Option<TradingPair>, StoreError>;

    async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Whether a trade with this key has been committed
    async fn trade_recorded(&self, key: TradeKey) -> Result<bool, StoreError>;

    /// Undispatched outbox entries in sequence order, at most `limit`
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    async fn mark_dispatched(&self, sequence: u64) -> Result<(), StoreError>;
}

/// Registered users and their login credentials
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look a user up by email, compared case-insensitively
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Create an active user with the next free id
    ///
    /// Fails with `DuplicateEmail` if the email is taken.
    async fn register_user(&self, email: &str, password_hash: String) -> Result<User, StoreError>;
}

/// Ledger and order store behind one transaction boundary
#[async_trait]
pub trait Store: Ledger + OrderStore + UserStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

/// One atomic unit of work
///
/// Writes are invisible to readers until commit.
#[async_trait]
pub trait Transaction: Send {
    /// Add `delta` (negative to debit) to a wallet; returns the new balance
    ///
    /// Fails with `InsufficientFunds` if the balance would go negative and
    /// with `BalanceOverflow` if it would leave the decimal range.
    async fn adjust_balance(
        &mut self,
        user_id: UserId,
        asset_id: AssetId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError>;

    /// Reserve the id for a new order
    async fn allocate_order_id(&mut self) -> Result<OrderId, StoreError>;

    /// Insert or replace an order
    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Record a settled trade; the trade key must be unique at commit
    async fn record_trade(&mut self, trade: &Trade) -> Result<(), StoreError>;

    /// Stage a message for publication once this transaction commits
    async fn enqueue_outbox(&mut self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
