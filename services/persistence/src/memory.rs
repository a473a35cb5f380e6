//! In-process store
//!
//! Committed state sits behind one `parking_lot` mutex. A transaction stages
//! its writes privately and applies them under that mutex at commit, after
//! re-checking balances and trade-key uniqueness against the committed state.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use types::account::{User, UserStatus, Wallet};
use types::ids::{AssetId, OrderId, PairCode, PairId, UserId};
use types::order::Order;
use types::pair::TradingPair;
use types::time::unix_nanos_now;
use types::trade::{Trade, TradeKey};

use crate::{Ledger, OrderStore, OutboxEntry, Store, StoreError, Transaction, UserStore};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    pairs: HashMap<PairId, TradingPair>,
    pair_codes: HashMap<PairCode, PairId>,
    wallets: HashMap<(UserId, AssetId), Decimal>,
    orders: BTreeMap<OrderId, Order>,
    trades: HashMap<TradeKey, Trade>,
    outbox: BTreeMap<u64, OutboxEntry>,
    next_outbox_sequence: u64,
}

impl State {
    fn balance(&self, user_id: UserId, asset_id: AssetId) -> Decimal {
        self.wallets.get(&(user_id, asset_id)).copied().unwrap_or(Decimal::ZERO)
    }
}

struct Shared {
    state: Mutex<State>,
    next_order_id: AtomicU64,
    unavailable: AtomicBool,
}

impl Shared {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store marked unavailable".to_string()));
        }
        Ok(())
    }
}

/// Store backed by process memory
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                next_order_id: AtomicU64::new(1),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    // ── Reference data ──────────────────────────────────────────────

    pub fn insert_user(&self, user: User) {
        self.shared.state.lock().users.insert(user.id, user);
    }

    pub fn insert_pair(&self, pair: TradingPair) {
        let mut state = self.shared.state.lock();
        state.pair_codes.insert(pair.code.clone(), pair.id);
        state.pairs.insert(pair.id, pair);
    }

    /// Overwrite a committed balance, bypassing the transaction path
    pub fn set_balance(&self, user_id: UserId, asset_id: AssetId, quantity: Decimal) {
        self.shared.state.lock().wallets.insert((user_id, asset_id), quantity);
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Every committed wallet, sorted by owner then asset
    pub fn wallets(&self) -> Vec<Wallet> {
        let state = self.shared.state.lock();
        let mut wallets: Vec<Wallet> = state
            .wallets
            .iter()
            .map(|(&(user_id, asset_id), &quantity)| Wallet::new(user_id, asset_id, quantity))
            .collect();
        wallets.sort_by_key(|w| (w.user_id, w.asset_id));
        wallets
    }

    pub fn orders(&self) -> Vec<Order> {
        self.shared.state.lock().orders.values().cloned().collect()
    }

    pub fn trades(&self) -> Vec<Trade> {
        let state = self.shared.state.lock();
        let mut trades: Vec<Trade> = state.trades.values().cloned().collect();
        trades.sort_by_key(|t| t.key());
        trades
    }

    /// Simulate an outage: every call fails with `Unavailable` while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::Release);
    }
}

#[async_trait]
impl Ledger for MemoryStore {
    async fn balance(&self, user_id: UserId, asset_id: AssetId) -> Result<Decimal, StoreError> {
        self.shared.check_available()?;
        Ok(self.shared.state.lock().balance(user_id, asset_id))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn pair_by_code(&self, code: &PairCode) -> Result<Option<TradingPair>, StoreError> {
        self.shared.check_available()?;
        let state = self.shared.state.lock();
        Ok(state.pair_codes.get(code).and_then(|id| state.pairs.get(id)).cloned())
    }

    async fn pair_by_id(&self, pair_id: PairId) -> Result<Option<TradingPair>, StoreError> {
        self.shared.check_available()?;
        Ok(self.shared.state.lock().pairs.get(&pair_id).cloned())
    }

    async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        self.shared.check_available()?;
        Ok(self.shared.state.lock().users.get(&user_id).cloned())
    }

    async fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.shared.check_available()?;
        Ok(self.shared.state.lock().orders.get(&order_id).cloned())
    }

    async fn trade_recorded(&self, key: TradeKey) -> Result<bool, StoreError> {
        self.shared.check_available()?;
        Ok(self.shared.state.lock().trades.contains_key(&key))
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        self.shared.check_available()?;
        Ok(self.shared.state.lock().outbox.values().take(limit).cloned().collect())
    }

    async fn mark_dispatched(&self, sequence: u64) -> Result<(), StoreError> {
        self.shared.check_available()?;
        self.shared.state.lock().outbox.remove(&sequence);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.shared.check_available()?;
        let state = self.shared.state.lock();
        Ok(state.users.values().find(|user| user.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn register_user(&self, email: &str, password_hash: String) -> Result<User, StoreError> {
        self.shared.check_available()?;
        let mut state = self.shared.state.lock();
        if state.users.values().any(|user| user.email.eq_ignore_ascii_case(email)) {
            return Err(StoreError::DuplicateEmail(email.to_string()));
        }

        let next_id = state.users.keys().map(|id| id.value()).max().unwrap_or(0) + 1;
        let mut user = User::new(UserId::new(next_id), email, UserStatus::Active);
        user.password_hash = password_hash;
        state.users.insert(user.id, user.clone());
        debug!(user_id = %user.id, "user registered");
        Ok(user)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        self.shared.check_available()?;
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            deltas: Vec::new(),
            orders: Vec::new(),
            trades: Vec::new(),
            outbox: Vec::new(),
        }))
    }
}

struct StagedMessage {
    topic: String,
    key: String,
    payload: Vec<u8>,
}

/// Staged writes; dropped unapplied on rollback
struct MemoryTransaction {
    shared: Arc<Shared>,
    deltas: Vec<(UserId, AssetId, Decimal)>,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    outbox: Vec<StagedMessage>,
}

impl MemoryTransaction {
    /// Committed balance plus this transaction's staged deltas
    fn staged_balance(&self, user_id: UserId, asset_id: AssetId) -> Result<Decimal, StoreError> {
        let committed = self.shared.state.lock().balance(user_id, asset_id);
        self.deltas
            .iter()
            .filter(|(u, a, _)| *u == user_id && *a == asset_id)
            .try_fold(committed, |balance, (_, _, delta)| balance.checked_add(*delta))
            .ok_or(StoreError::BalanceOverflow { user_id, asset_id })
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn adjust_balance(
        &mut self,
        user_id: UserId,
        asset_id: AssetId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        self.shared.check_available()?;
        let balance = self.staged_balance(user_id, asset_id)?;
        let updated = balance
            .checked_add(delta)
            .ok_or(StoreError::BalanceOverflow { user_id, asset_id })?;
        if updated < Decimal::ZERO {
            return Err(StoreError::InsufficientFunds { user_id, asset_id, balance, delta });
        }
        self.deltas.push((user_id, asset_id, delta));
        Ok(updated)
    }

    async fn allocate_order_id(&mut self) -> Result<OrderId, StoreError> {
        self.shared.check_available()?;
        // Ids of rolled-back transactions are not reused, like a database sequence
        Ok(OrderId::new(self.shared.next_order_id.fetch_add(1, Ordering::Relaxed)))
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), StoreError> {
        self.orders.push(order.clone());
        Ok(())
    }

    async fn record_trade(&mut self, trade: &Trade) -> Result<(), StoreError> {
        if self.trades.iter().any(|t| t.key() == trade.key()) {
            return Err(StoreError::DuplicateTrade(trade.key()));
        }
        self.trades.push(trade.clone());
        Ok(())
    }

    async fn enqueue_outbox(&mut self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), StoreError> {
        self.outbox.push(StagedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.shared.check_available()?;
        let mut state = this.shared.state.lock();

        // Validate everything before touching committed state
        if let Some(trade) = this.trades.iter().find(|t| state.trades.contains_key(&t.key())) {
            return Err(StoreError::DuplicateTrade(trade.key()));
        }
        let mut balances: HashMap<(UserId, AssetId), Decimal> = HashMap::new();
        for &(user_id, asset_id, delta) in &this.deltas {
            let balance = balances
                .entry((user_id, asset_id))
                .or_insert_with(|| state.balance(user_id, asset_id));
            let updated = balance
                .checked_add(delta)
                .ok_or(StoreError::BalanceOverflow { user_id, asset_id })?;
            if updated < Decimal::ZERO {
                return Err(StoreError::InsufficientFunds {
                    user_id,
                    asset_id,
                    balance: *balance,
                    delta,
                });
            }
            *balance = updated;
        }

        state.wallets.extend(balances);
        for order in this.orders {
            state.orders.insert(order.id, order);
        }
        for trade in this.trades {
            state.trades.insert(trade.key(), trade);
        }
        let now = unix_nanos_now();
        for message in this.outbox {
            let sequence = state.next_outbox_sequence;
            state.next_outbox_sequence += 1;
            state.outbox.insert(
                sequence,
                OutboxEntry {
                    sequence,
                    topic: message.topic,
                    key: message.key,
                    payload: message.payload,
                    created_at: now,
                },
            );
        }

        debug!(deltas = this.deltas.len(), "transaction committed");
        Ok(())
    }
}
