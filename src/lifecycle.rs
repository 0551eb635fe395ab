//! Order lifecycle controller: optimistic mutate, confirm, reconcile.
//!
//! Every write follows the same protocol. The local mutation lands first with
//! `Source::Local` so the session sees its own intent immediately; the chain
//! call runs in a spawned task so an abandoned caller future never prevents
//! the confirmation from reaching the store; the confirmed result merges with
//! `Source::Confirmation`, which wins sequence ties against concurrent push
//! updates for the same entity.
//!
//! Timeouts are not failures: a confirmation that outruns the adapter's
//! deadline may still land on chain, so the optimistic record stays and the
//! caller gets a retry-safe error. Only a definitive rejection rolls the
//! optimistic state back.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::chain::{AssignedId, ChainAdapter};
use crate::domain::{Order, OrderPatch, OrderRequest, PositionPatch};
use crate::error::{AdapterError, OrderError, SdkError};
use crate::shared::{ClientOrderId, OrderId, OrderStatus, PositionId};
use crate::store::{CanonicalStore, Sequence, Source};

/// Drives the write operations against one chain adapter and one store.
pub struct LifecycleController {
    store: Arc<CanonicalStore>,
    adapter: Arc<dyn ChainAdapter>,
}

impl LifecycleController {
    pub fn new(store: Arc<CanonicalStore>, adapter: Arc<dyn ChainAdapter>) -> Self {
        Self { store, adapter }
    }

    /// Submits a new order.
    ///
    /// The returned order is the post-reconciliation snapshot: keyed by the
    /// venue id when the chain surfaced one, otherwise still keyed by the
    /// client order id. On [`AdapterError::Timeout`] the optimistic record
    /// stays in the store and retrying with the same `client_order_id` is
    /// safe.
    pub async fn create_order(&self, mut request: OrderRequest) -> Result<Order, SdkError> {
        if self.adapter.bound_owner().is_none() {
            return Err(OrderError::WalletNotConnected.into());
        }
        if self.store.market(&request.market).await.is_none() {
            return Err(OrderError::MarketNotFound(request.market.clone()).into());
        }

        let cid = request
            .client_order_id
            .get_or_insert_with(ClientOrderId::generate)
            .clone();
        let optimistic_key = OrderId::from(&cid);

        let optimistic = OrderPatch {
            id: Some(optimistic_key.clone()),
            client_order_id: Some(cid),
            market: Some(request.market.clone()),
            side: Some(request.side),
            order_type: Some(request.order_type),
            price: Some(request.price),
            amount: Some(request.amount),
            filled: Some(Decimal::ZERO),
            status: Some(OrderStatus::Open),
            timestamp: Some(Utc::now()),
            tx_ref: None,
        };
        self.store
            .merge_order(optimistic_key.clone(), optimistic, Source::Local, Sequence::now())
            .await;

        let (done_tx, done_rx) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let adapter = Arc::clone(&self.adapter);
        tokio::spawn(async move {
            let result = submit_and_reconcile(store, adapter, request, optimistic_key).await;
            let _ = done_tx.send(result);
        });

        let key = done_rx
            .await
            .map_err(|_| SdkError::Other("order reconciliation task stopped".to_string()))??;
        self.store
            .order(&key)
            .await
            .ok_or_else(|| SdkError::Other(format!("order {} vanished after confirmation", key)))
    }

    /// Cancels an order by venue id.
    ///
    /// Idempotent: an order already canceled locally resolves without a chain
    /// call. An id absent from the store is still sent to the chain, and a
    /// successful confirmation upserts the canceled record.
    pub async fn cancel_order(&self, id: &OrderId) -> Result<(), SdkError> {
        if self.adapter.bound_owner().is_none() {
            return Err(OrderError::WalletNotConnected.into());
        }
        if let Some(order) = self.store.order(id).await {
            if order.status == OrderStatus::Canceled {
                debug!("order {} already canceled, skipping chain call", id);
                return Ok(());
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let adapter = Arc::clone(&self.adapter);
        let id = id.clone();
        tokio::spawn(async move {
            let result = cancel_and_reconcile(store, adapter, id).await;
            let _ = done_tx.send(result);
        });

        done_rx
            .await
            .map_err(|_| SdkError::Other("cancel reconciliation task stopped".to_string()))?
    }

    /// Changes the leverage on an open position.
    ///
    /// The new value shows locally before the chain confirms; a definitive
    /// rejection restores the previous value, a timeout leaves the optimistic
    /// value for a later push or fetch to settle.
    pub async fn update_position_leverage(
        &self,
        position: &PositionId,
        leverage: Decimal,
    ) -> Result<(), SdkError> {
        if self.adapter.bound_owner().is_none() {
            return Err(OrderError::WalletNotConnected.into());
        }
        let bounds = self.adapter.leverage_bounds();
        if !bounds.contains(leverage) {
            return Err(SdkError::Validation(format!(
                "leverage {} outside allowed range {}..={}",
                leverage, bounds.min, bounds.max
            )));
        }

        let previous = self.store.position(position).await.map(|p| p.leverage);
        if previous.is_some() {
            let patch = PositionPatch {
                leverage: Some(leverage),
                ..PositionPatch::default()
            };
            self.store
                .merge_position(position.clone(), patch, Source::Local, Sequence::now())
                .await;
        }

        let (done_tx, done_rx) = oneshot::channel();
        let store = Arc::clone(&self.store);
        let adapter = Arc::clone(&self.adapter);
        let position = position.clone();
        tokio::spawn(async move {
            let result =
                leverage_and_reconcile(store, adapter, position, leverage, previous).await;
            let _ = done_tx.send(result);
        });

        done_rx
            .await
            .map_err(|_| SdkError::Other("leverage reconciliation task stopped".to_string()))?
    }
}

/// Runs detached from the caller: whatever confirmation the chain produces is
/// applied to the store even if nobody is waiting for the result anymore.
async fn submit_and_reconcile(
    store: Arc<CanonicalStore>,
    adapter: Arc<dyn ChainAdapter>,
    request: OrderRequest,
    optimistic_key: OrderId,
) -> Result<OrderId, SdkError> {
    match adapter.submit_order(&request).await {
        Ok(outcome) => {
            let seq = Sequence::now();
            let confirm = OrderPatch {
                tx_ref: Some(outcome.tx_ref),
                timestamp: Some(Utc::now()),
                ..OrderPatch::default()
            };
            match outcome.order_id {
                AssignedId::Assigned(id) => {
                    store
                        .rekey_order(&optimistic_key, id.clone(), confirm, Source::Confirmation, seq)
                        .await;
                    Ok(id)
                }
                AssignedId::Pending => {
                    // No recoverable id: the record keeps its client-order-id
                    // key until a push or poll carries the venue id.
                    store
                        .merge_order(optimistic_key.clone(), confirm, Source::Confirmation, seq)
                        .await;
                    Ok(optimistic_key)
                }
            }
        }
        Err(AdapterError::Timeout { waited_ms }) => {
            warn!(
                "order {} unconfirmed after {}ms, keeping optimistic record",
                optimistic_key, waited_ms
            );
            Err(AdapterError::Timeout { waited_ms }.into())
        }
        Err(err) => {
            store.remove_order(&optimistic_key).await;
            Err(OrderError::SubmissionFailed(err.to_string()).into())
        }
    }
}

async fn cancel_and_reconcile(
    store: Arc<CanonicalStore>,
    adapter: Arc<dyn ChainAdapter>,
    id: OrderId,
) -> Result<(), SdkError> {
    let outcome = adapter.cancel_order(&id).await?;
    let patch = OrderPatch {
        id: Some(id.clone()),
        status: Some(OrderStatus::Canceled),
        tx_ref: Some(outcome.tx_ref),
        ..OrderPatch::default()
    };
    store
        .merge_order(id, patch, Source::Confirmation, Sequence::now())
        .await;
    Ok(())
}

async fn leverage_and_reconcile(
    store: Arc<CanonicalStore>,
    adapter: Arc<dyn ChainAdapter>,
    position: PositionId,
    leverage: Decimal,
    previous: Option<Decimal>,
) -> Result<(), SdkError> {
    match adapter.update_leverage(&position, leverage).await {
        Ok(_) => {
            let patch = PositionPatch {
                leverage: Some(leverage),
                ..PositionPatch::default()
            };
            store
                .merge_position(position, patch, Source::Confirmation, Sequence::now())
                .await;
            Ok(())
        }
        Err(AdapterError::Timeout { waited_ms }) => {
            warn!(
                "leverage update on {} unconfirmed after {}ms, keeping optimistic value",
                position, waited_ms
            );
            Err(AdapterError::Timeout { waited_ms }.into())
        }
        Err(err) => {
            if let Some(previous) = previous {
                let rollback = PositionPatch {
                    leverage: Some(previous),
                    ..PositionPatch::default()
                };
                store
                    .merge_position(position, rollback, Source::Local, Sequence::now())
                    .await;
            }
            Err(err.into())
        }
    }
}
