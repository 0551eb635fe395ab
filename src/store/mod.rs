//! Canonical state store: the single owner of the four entity maps.
//!
//! Every producer (bootstrap fetch, push decoder, lifecycle confirmation)
//! mutates state exclusively through the typed `merge_*` operation family.
//! Each merge is atomic per entity kind and linearized by the sequence rule
//! in [`seq`], not by arrival order, so an out-of-order push can never
//! clobber newer fetched or confirmed state. Reads are copy-out snapshots;
//! no caller ever holds a reference into the live maps.

pub mod seq;

pub use seq::{Sequence, Source, Versioned};

use std::collections::HashMap;

use async_lock::RwLock;
use tracing::{debug, warn};

use crate::domain::{
    Balance, BalancePatch, IntegrityWarning, Market, MarketPatch, Order, OrderPatch, Position,
    PositionPatch,
};
use crate::shared::{ClientOrderId, LeverageBounds, OrderId, PositionId, Symbol, TokenId};

/// Entity kinds handled by the merge family, mirroring the push channel's
/// message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Market,
    Balance,
    Position,
    Order,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Market => "market",
            EntityKind::Balance => "balance",
            EntityKind::Position => "position",
            EntityKind::Order => "order",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a merge attempt.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// False when the sequence rule rejected the patch outright.
    pub applied: bool,
    /// Invariant repairs performed while applying an accepted patch.
    pub warnings: Vec<IntegrityWarning>,
}

impl MergeOutcome {
    fn applied(warnings: Vec<IntegrityWarning>) -> Self {
        Self {
            applied: true,
            warnings,
        }
    }

    fn stale() -> Self {
        Self {
            applied: false,
            warnings: Vec::new(),
        }
    }
}

/// The in-memory authoritative view of markets, balances, positions and
/// orders.
pub struct CanonicalStore {
    markets: RwLock<HashMap<Symbol, Versioned<Market>>>,
    balances: RwLock<HashMap<TokenId, Versioned<Balance>>>,
    positions: RwLock<HashMap<PositionId, Versioned<Position>>>,
    orders: RwLock<HashMap<OrderId, Versioned<Order>>>,
    /// Secondary order index; orders carrying a client order id are always
    /// reachable through it, whatever key they currently live under.
    by_client: RwLock<HashMap<ClientOrderId, OrderId>>,
    leverage_bounds: LeverageBounds,
}

impl Default for CanonicalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonicalStore {
    pub fn new() -> Self {
        Self::with_leverage_bounds(LeverageBounds::default())
    }

    /// Builds a store that validates position leverage against the bounds
    /// the chain adapter declares.
    pub fn with_leverage_bounds(leverage_bounds: LeverageBounds) -> Self {
        Self {
            markets: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            positions: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            by_client: RwLock::new(HashMap::new()),
            leverage_bounds,
        }
    }

    // ─── Merges ──────────────────────────────────────────────────────────────

    pub async fn merge_market(
        &self,
        key: Symbol,
        patch: MarketPatch,
        source: Source,
        seq: Sequence,
    ) -> MergeOutcome {
        let mut markets = self.markets.write().await;
        match markets.get_mut(&key) {
            Some(entry) => {
                if !entry.admits(seq, source) {
                    return self.reject(EntityKind::Market, key.as_str(), entry.seq, seq, source);
                }
                entry.value.apply_patch(patch);
                entry.record(seq, source);
                MergeOutcome::applied(Vec::new())
            }
            None => {
                let market = Market::from_patch(&key, patch);
                markets.insert(key, Versioned::new(market, seq, source));
                MergeOutcome::applied(Vec::new())
            }
        }
    }

    pub async fn merge_balance(
        &self,
        key: TokenId,
        patch: BalancePatch,
        source: Source,
        seq: Sequence,
    ) -> MergeOutcome {
        let mut warnings = Vec::new();
        let mut balances = self.balances.write().await;
        match balances.get_mut(&key) {
            Some(entry) => {
                if !entry.admits(seq, source) {
                    return self.reject(EntityKind::Balance, key.as_str(), entry.seq, seq, source);
                }
                entry.value.apply_patch(patch, &mut warnings);
                entry.record(seq, source);
            }
            None => {
                let balance = Balance::from_patch(&key, patch, &mut warnings);
                balances.insert(key, Versioned::new(balance, seq, source));
            }
        }
        drop(balances);
        self.log_warnings(&warnings);
        MergeOutcome::applied(warnings)
    }

    pub async fn merge_position(
        &self,
        key: PositionId,
        patch: PositionPatch,
        source: Source,
        seq: Sequence,
    ) -> MergeOutcome {
        let mut warnings = Vec::new();
        let mut positions = self.positions.write().await;
        match positions.get_mut(&key) {
            Some(entry) => {
                if !entry.admits(seq, source) {
                    return self.reject(EntityKind::Position, key.as_str(), entry.seq, seq, source);
                }
                entry
                    .value
                    .apply_patch(patch, &self.leverage_bounds, &mut warnings);
                entry.record(seq, source);
            }
            None => {
                let position =
                    Position::from_patch(&key, patch, &self.leverage_bounds, &mut warnings);
                positions.insert(key, Versioned::new(position, seq, source));
            }
        }
        drop(positions);
        self.log_warnings(&warnings);
        MergeOutcome::applied(warnings)
    }

    pub async fn merge_order(
        &self,
        key: OrderId,
        patch: OrderPatch,
        source: Source,
        seq: Sequence,
    ) -> MergeOutcome {
        let mut warnings = Vec::new();
        let mut orders = self.orders.write().await;
        let (applied, client_id) =
            self.upsert_order(&mut orders, &key, patch, source, seq, &mut warnings);
        drop(orders);
        if !applied {
            return MergeOutcome::stale();
        }
        if let Some(cid) = client_id {
            self.by_client.write().await.insert(cid, key);
        }
        self.log_warnings(&warnings);
        MergeOutcome::applied(warnings)
    }

    /// Applies one order patch with the `orders` guard already held. Returns
    /// whether the patch was admitted, plus the client order id to reindex
    /// once the guard is dropped.
    fn upsert_order(
        &self,
        orders: &mut HashMap<OrderId, Versioned<Order>>,
        key: &OrderId,
        patch: OrderPatch,
        source: Source,
        seq: Sequence,
        warnings: &mut Vec<IntegrityWarning>,
    ) -> (bool, Option<ClientOrderId>) {
        match orders.get_mut(key) {
            Some(entry) => {
                if !entry.admits(seq, source) {
                    self.reject(EntityKind::Order, key.as_str(), entry.seq, seq, source);
                    return (false, None);
                }
                entry.value.apply_patch(patch, warnings);
                entry.record(seq, source);
                (true, entry.value.client_order_id.clone())
            }
            None => {
                let order = Order::from_patch(key, patch, warnings);
                let client_id = order.client_order_id.clone();
                orders.insert(key.clone(), Versioned::new(order, seq, source));
                (true, client_id)
            }
        }
    }

    /// Moves an optimistic order under its authoritative id, carrying its
    /// fields forward as a confirmation-sourced patch overlaid with `extra`
    /// (transaction reference, confirmation timestamp).
    ///
    /// Remove and reinsert share one write guard, so the record is in the
    /// map under one key or the other at every instant; a concurrent
    /// client-id lookup can land on the scan fallback but never on a blank.
    ///
    /// If a push update already created the target record, the carried patch
    /// merges into it under the normal acceptance rule; the order invariants
    /// guarantee the race cannot roll back fills or terminal statuses.
    pub async fn rekey_order(
        &self,
        from: &OrderId,
        to: OrderId,
        extra: OrderPatch,
        source: Source,
        seq: Sequence,
    ) -> MergeOutcome {
        let mut warnings = Vec::new();
        let mut orders = self.orders.write().await;
        let (applied, client_id) = match orders.remove(from) {
            Some(entry) => {
                let mut patch = entry.value.to_patch();
                patch.id = Some(to.clone());
                if entry.value.filled.is_zero() {
                    // A zero fill carries no information worth merging into a
                    // record a faster push may have advanced already.
                    patch.filled = None;
                }
                let patch = patch.overlay(extra);
                let (applied, merged_cid) =
                    self.upsert_order(&mut orders, &to, patch, source, seq, &mut warnings);
                // The correlation holds even when field-level merging was
                // outrun by a newer update.
                (applied, entry.value.client_order_id.clone().or(merged_cid))
            }
            None => {
                let mut patch = extra;
                patch.id = Some(to.clone());
                self.upsert_order(&mut orders, &to, patch, source, seq, &mut warnings)
            }
        };
        drop(orders);
        if let Some(cid) = client_id {
            self.by_client.write().await.insert(cid, to);
        }
        self.log_warnings(&warnings);
        if applied {
            MergeOutcome::applied(warnings)
        } else {
            MergeOutcome::stale()
        }
    }

    /// Rolls back an optimistic insert after a definitive submission failure.
    pub async fn remove_order(&self, key: &OrderId) -> Option<Order> {
        let removed = self.orders.write().await.remove(key).map(|v| v.value);
        if let Some(cid) = removed.as_ref().and_then(|o| o.client_order_id.clone()) {
            self.by_client.write().await.remove(&cid);
        }
        removed
    }

    /// Drops a flat position the adapter reported as closed.
    pub async fn remove_position(&self, key: &PositionId) -> Option<Position> {
        self.positions.write().await.remove(key).map(|v| v.value)
    }

    // ─── Snapshot reads ──────────────────────────────────────────────────────

    pub async fn market(&self, key: &Symbol) -> Option<Market> {
        self.markets.read().await.get(key).map(|v| v.value.clone())
    }

    pub async fn markets(&self) -> Vec<Market> {
        let mut out: Vec<Market> = self
            .markets
            .read()
            .await
            .values()
            .map(|v| v.value.clone())
            .collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    pub async fn balance(&self, key: &TokenId) -> Option<Balance> {
        self.balances.read().await.get(key).map(|v| v.value.clone())
    }

    pub async fn balances(&self) -> Vec<Balance> {
        let mut out: Vec<Balance> = self
            .balances
            .read()
            .await
            .values()
            .map(|v| v.value.clone())
            .collect();
        out.sort_by(|a, b| a.token.cmp(&b.token));
        out
    }

    pub async fn position(&self, key: &PositionId) -> Option<Position> {
        self.positions.read().await.get(key).map(|v| v.value.clone())
    }

    pub async fn positions(&self) -> Vec<Position> {
        let mut out: Vec<Position> = self
            .positions
            .read()
            .await
            .values()
            .map(|v| v.value.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub async fn order(&self, key: &OrderId) -> Option<Order> {
        self.orders.read().await.get(key).map(|v| v.value.clone())
    }

    pub async fn orders(&self) -> Vec<Order> {
        let mut out: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .map(|v| v.value.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Looks an order up by its client-assigned id, wherever the record
    /// currently lives.
    pub async fn order_by_client_id(&self, cid: &ClientOrderId) -> Option<Order> {
        if let Some(key) = self.by_client.read().await.get(cid).cloned() {
            if let Some(order) = self.order(&key).await {
                return Some(order);
            }
        }
        // Index misses are possible across rekey races; fall back to a scan.
        self.orders
            .read()
            .await
            .values()
            .find(|v| v.value.client_order_id.as_ref() == Some(cid))
            .map(|v| v.value.clone())
    }

    pub fn leverage_bounds(&self) -> &LeverageBounds {
        &self.leverage_bounds
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    fn reject(
        &self,
        kind: EntityKind,
        key: &str,
        stored: Sequence,
        seq: Sequence,
        source: Source,
    ) -> MergeOutcome {
        debug!(
            "stale {} update for {} rejected: seq {} ({}) behind stored seq {}",
            kind,
            key,
            seq.as_millis(),
            source,
            stored.as_millis()
        );
        MergeOutcome::stale()
    }

    fn log_warnings(&self, warnings: &[IntegrityWarning]) {
        for warning in warnings {
            warn!("data integrity: {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{OrderStatus, Side};
    use rust_decimal::prelude::*;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn limit_order_patch(cid: Option<&str>) -> OrderPatch {
        OrderPatch {
            client_order_id: cid.map(ClientOrderId::from),
            market: Some(Symbol::from("ETH-USDC")),
            side: Some(Side::Buy),
            price: Some(dec("1720.50")),
            amount: Some(dec("1.5")),
            filled: Some(Decimal::ZERO),
            status: Some(OrderStatus::Open),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_merge_creates_then_updates() {
        let store = CanonicalStore::new();
        let key = Symbol::from("ETH-USDC");

        let outcome = store
            .merge_market(
                key.clone(),
                MarketPatch {
                    address: Some("0xabc".into()),
                    price_decimals: Some(8),
                    size_decimals: Some(18),
                    ..Default::default()
                },
                Source::Fetch,
                Sequence::from_millis(10),
            )
            .await;
        assert!(outcome.applied);

        let outcome = store
            .merge_market(
                key.clone(),
                MarketPatch {
                    last_price: Some(dec("1725")),
                    ..Default::default()
                },
                Source::Push,
                Sequence::from_millis(20),
            )
            .await;
        assert!(outcome.applied);

        let market = store.market(&key).await.unwrap();
        assert_eq!(market.price_decimals, 8);
        assert_eq!(market.last_price, Some(dec("1725")));
    }

    #[tokio::test]
    async fn test_stale_sequence_rejected() {
        let store = CanonicalStore::new();
        let key = OrderId::from("42");

        store
            .merge_order(
                key.clone(),
                limit_order_patch(None),
                Source::Confirmation,
                Sequence::from_millis(100),
            )
            .await;

        let stale = store
            .merge_order(
                key.clone(),
                OrderPatch {
                    status: Some(OrderStatus::Canceled),
                    ..Default::default()
                },
                Source::Push,
                Sequence::from_millis(50),
            )
            .await;
        assert!(!stale.applied);
        assert_eq!(store.order(&key).await.unwrap().status, OrderStatus::Open);
    }

    #[tokio::test]
    async fn test_confirmation_wins_sequence_tie() {
        let store = CanonicalStore::new();
        let key = OrderId::from("42");
        let seq = Sequence::from_millis(100);

        store
            .merge_order(key.clone(), limit_order_patch(None), Source::Push, seq)
            .await;
        let confirm = store
            .merge_order(
                key.clone(),
                OrderPatch {
                    filled: Some(dec("0.5")),
                    ..Default::default()
                },
                Source::Confirmation,
                seq,
            )
            .await;
        assert!(confirm.applied);

        let push_back = store
            .merge_order(
                key.clone(),
                OrderPatch {
                    filled: Some(dec("1.5")),
                    ..Default::default()
                },
                Source::Push,
                seq,
            )
            .await;
        assert!(!push_back.applied);
        assert_eq!(store.order(&key).await.unwrap().filled, dec("0.5"));
    }

    #[tokio::test]
    async fn test_rekey_moves_record_and_index() {
        let store = CanonicalStore::new();
        let cid = ClientOrderId::from("c-1");
        let optimistic_key = OrderId::from(&cid);

        store
            .merge_order(
                optimistic_key.clone(),
                limit_order_patch(Some("c-1")),
                Source::Local,
                Sequence::from_millis(10),
            )
            .await;

        let outcome = store
            .rekey_order(
                &optimistic_key,
                OrderId::from("42"),
                OrderPatch {
                    tx_ref: Some(crate::shared::TxRef::from("0xdead")),
                    ..Default::default()
                },
                Source::Confirmation,
                Sequence::from_millis(20),
            )
            .await;
        assert!(outcome.applied);

        assert!(store.order(&optimistic_key).await.is_none());
        let order = store.order(&OrderId::from("42")).await.unwrap();
        assert_eq!(order.id, OrderId::from("42"));
        assert_eq!(order.tx_ref, Some(crate::shared::TxRef::from("0xdead")));

        let via_cid = store.order_by_client_id(&cid).await.unwrap();
        assert_eq!(via_cid.id, OrderId::from("42"));
    }

    #[tokio::test]
    async fn test_rekey_survives_push_race() {
        let store = CanonicalStore::new();
        let cid = ClientOrderId::from("c-2");
        let optimistic_key = OrderId::from(&cid);

        store
            .merge_order(
                optimistic_key.clone(),
                limit_order_patch(Some("c-2")),
                Source::Local,
                Sequence::from_millis(10),
            )
            .await;

        // Push got there first with a fill under the authoritative id.
        store
            .merge_order(
                OrderId::from("42"),
                OrderPatch {
                    status: Some(OrderStatus::Filled),
                    filled: Some(dec("1.5")),
                    ..Default::default()
                },
                Source::Push,
                Sequence::from_millis(15),
            )
            .await;

        store
            .rekey_order(
                &optimistic_key,
                OrderId::from("42"),
                OrderPatch::default(),
                Source::Confirmation,
                Sequence::from_millis(20),
            )
            .await;

        let order = store.order(&OrderId::from("42")).await.unwrap();
        // The carried optimistic fields enrich the record without rolling
        // back what the push already settled.
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled, dec("1.5"));
        assert_eq!(order.market, Symbol::from("ETH-USDC"));
        assert_eq!(order.price, dec("1720.50"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rekey_keeps_order_continuously_reachable() {
        let store = Arc::new(CanonicalStore::new());
        let cid = ClientOrderId::from("c-live");
        let mut key = OrderId::from(&cid);

        store
            .merge_order(
                key.clone(),
                limit_order_patch(Some("c-live")),
                Source::Local,
                Sequence::from_millis(10),
            )
            .await;

        // A parallel reader must find the order at every poll while the
        // writer chains it through a series of rekeys.
        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let store = Arc::clone(&store);
            let cid = cid.clone();
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                while !done.load(Ordering::Relaxed) {
                    assert!(store.order_by_client_id(&cid).await.is_some());
                    tokio::task::yield_now().await;
                }
            })
        };

        for round in 0u64..50 {
            let next = OrderId::from(format!("{}", 100 + round));
            store
                .rekey_order(
                    &key,
                    next.clone(),
                    OrderPatch::default(),
                    Source::Confirmation,
                    Sequence::from_millis(11 + round),
                )
                .await;
            key = next;
        }
        done.store(true, Ordering::Relaxed);
        reader.await.unwrap();

        assert_eq!(store.order_by_client_id(&cid).await.unwrap().id, key);
    }

    #[tokio::test]
    async fn test_remove_order_cleans_index() {
        let store = CanonicalStore::new();
        let cid = ClientOrderId::from("c-3");
        let key = OrderId::from(&cid);

        store
            .merge_order(
                key.clone(),
                limit_order_patch(Some("c-3")),
                Source::Local,
                Sequence::from_millis(10),
            )
            .await;
        let removed = store.remove_order(&key).await;
        assert!(removed.is_some());
        assert!(store.order_by_client_id(&cid).await.is_none());
    }

    #[tokio::test]
    async fn test_reads_are_copies() {
        let store = CanonicalStore::new();
        let token = TokenId::from("USDC");
        store
            .merge_balance(
                token.clone(),
                BalancePatch {
                    free: Some(dec("100")),
                    ..Default::default()
                },
                Source::Fetch,
                Sequence::from_millis(1),
            )
            .await;

        let mut snapshot = store.balance(&token).await.unwrap();
        snapshot.free = dec("0");
        assert_eq!(store.balance(&token).await.unwrap().free, dec("100"));
    }
}
