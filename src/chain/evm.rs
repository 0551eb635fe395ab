//! Adapter for the venue's contract-based (EVM) deployments.
//!
//! The contracts speak in unsigned fixed-point words: sizes at each market's
//! `sizeDecimals`, prices at its `priceDecimals`, collateral amounts at the
//! deployment's collateral scale, leverage in basis points. This module owns
//! the translation between those raws and canonical records, the enum code
//! tables, and the receipt-polling loop that turns a broadcast transaction
//! into a confirmation.
//!
//! The raw RPC/indexer surface is abstracted behind [`EvmTransport`] so the
//! adapter logic stays testable without a chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::RwLock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use tracing::{debug, warn};

use crate::chain::{ChainAdapter, ChainKind, SubmitOutcome, TransportError, TxOutcome};
use crate::domain::{Balance, Market, Order, OrderRequest, Position};
use crate::error::AdapterError;
use crate::shared::scaling::{
    from_canonical, leverage_from_bps, leverage_to_bps, to_canonical, to_canonical_unsigned,
    ScalingError,
};
use crate::shared::{
    AccountId, ClientOrderId, LeverageBounds, OrderId, OrderStatus, OrderType, PositionId,
    PositionSide, Side, Symbol, TimeInForce, TokenId, TxRef,
};

lazy_static::lazy_static! {
    /// keccak256("OrderPlaced(address,uint256)"), the topic the venue's
    /// contract emits when it assigns an order id.
    pub static ref ORDER_PLACED_TOPIC: String = {
        let mut hasher = Keccak256::new();
        hasher.update(b"OrderPlaced(address,uint256)");
        format!("0x{}", hex::encode(hasher.finalize()))
    };
}

// ─── Raw wire shapes ─────────────────────────────────────────────────────────

/// Market listing as the contract reader reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvmMarket {
    pub symbol: String,
    pub address: String,
    pub price_decimals: u32,
    pub size_decimals: u32,
    #[serde(default)]
    pub last_price: Option<u128>,
    /// Signed; funding flips direction with the basis.
    #[serde(default)]
    pub funding_rate: Option<i128>,
}

/// Token balance row at the token's own scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvmBalance {
    pub token: String,
    pub decimals: u32,
    pub free: u128,
    pub locked: u128,
}

/// Position row; prices at the market's price scale, margin and pnl at the
/// deployment's collateral scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvmPosition {
    pub id: String,
    pub market: String,
    pub side: u8,
    pub size: u128,
    pub leverage_bps: u32,
    pub entry_price: u128,
    /// Zero means the contract has not priced a liquidation level.
    #[serde(default)]
    pub liquidation_price: u128,
    pub margin: u128,
    pub pnl: i128,
}

/// Open order row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvmOrder {
    pub id: u128,
    pub market: String,
    pub side: u8,
    #[serde(rename = "type")]
    pub order_type: u8,
    pub price: u128,
    pub amount: u128,
    pub filled: u128,
    pub status: u8,
    pub created_at_ms: u64,
    #[serde(default)]
    pub client_tag: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Mined transaction receipt, reduced to what confirmation needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmReceipt {
    pub status: bool,
    #[serde(default)]
    pub logs: Vec<EvmLog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmLog {
    pub topics: Vec<String>,
    /// ABI-encoded payload as a 0x-prefixed hex string.
    pub data: String,
}

// ─── Encoded mutation calls ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderCall {
    pub market_address: String,
    pub side: u8,
    pub order_type: u8,
    pub price: u128,
    pub amount: u128,
    pub leverage_bps: u32,
    pub reduce_only: bool,
    pub time_in_force: u8,
    pub stop_price: Option<u128>,
    /// Client order id, echoed back by the indexer for correlation.
    pub client_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOrderCall {
    pub order_id: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateLeverageCall {
    pub position_id: String,
    pub leverage_bps: u32,
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Raw chain access the adapter drives: reads against the contract state and
/// signed mutations broadcast to the network.
///
/// `send_*` methods return the transaction hash immediately after broadcast;
/// the adapter polls [`EvmTransport::receipt`] until the chain mines it.
#[async_trait]
pub trait EvmTransport: Send + Sync {
    async fn list_markets(&self) -> Result<Vec<RawEvmMarket>, TransportError>;

    async fn account_balances(&self, owner: &str) -> Result<Vec<RawEvmBalance>, TransportError>;

    async fn account_positions(&self, owner: &str) -> Result<Vec<RawEvmPosition>, TransportError>;

    async fn account_orders(&self, owner: &str) -> Result<Vec<RawEvmOrder>, TransportError>;

    async fn send_place_order(&self, call: PlaceOrderCall) -> Result<String, TransportError>;

    async fn send_cancel_order(&self, call: CancelOrderCall) -> Result<String, TransportError>;

    async fn send_update_leverage(
        &self,
        call: UpdateLeverageCall,
    ) -> Result<String, TransportError>;

    /// None until the transaction is mined.
    async fn receipt(&self, tx_hash: &str) -> Result<Option<EvmReceipt>, TransportError>;
}

// ─── Enum code tables ────────────────────────────────────────────────────────

/// Fixed numeric encodings the contracts use for enums.
///
/// Decoding is total: unmapped codes land on the `Unknown` variant so a
/// contract upgrade cannot wedge a fetch. Encoding is partial: an `Unknown`
/// has no code and the submission is refused before broadcast.
pub mod codes {
    use super::*;

    pub fn side(code: u8) -> Side {
        match code {
            0 => Side::Buy,
            1 => Side::Sell,
            _ => Side::Unknown,
        }
    }

    pub fn side_code(side: Side) -> Option<u8> {
        match side {
            Side::Buy => Some(0),
            Side::Sell => Some(1),
            Side::Unknown => None,
        }
    }

    pub fn position_side(code: u8) -> PositionSide {
        match code {
            0 => PositionSide::Long,
            1 => PositionSide::Short,
            _ => PositionSide::Unknown,
        }
    }

    pub fn order_type(code: u8) -> OrderType {
        match code {
            0 => OrderType::Market,
            1 => OrderType::Limit,
            2 => OrderType::Stop,
            3 => OrderType::StopLimit,
            4 => OrderType::TrailingStop,
            _ => OrderType::Unknown,
        }
    }

    pub fn order_type_code(order_type: OrderType) -> Option<u8> {
        match order_type {
            OrderType::Market => Some(0),
            OrderType::Limit => Some(1),
            OrderType::Stop => Some(2),
            OrderType::StopLimit => Some(3),
            OrderType::TrailingStop => Some(4),
            OrderType::Unknown => None,
        }
    }

    pub fn order_status(code: u8) -> OrderStatus {
        match code {
            0 => OrderStatus::Open,
            1 => OrderStatus::Filled,
            2 => OrderStatus::Canceled,
            3 => OrderStatus::Expired,
            4 => OrderStatus::Rejected,
            _ => OrderStatus::Unknown,
        }
    }

    pub fn time_in_force_code(tif: TimeInForce) -> u8 {
        match tif {
            TimeInForce::Gtc => 0,
            TimeInForce::Ioc => 1,
            TimeInForce::Fok => 2,
            TimeInForce::Gtd => 3,
        }
    }
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EvmAdapterConfig {
    /// How long a broadcast transaction may stay unmined before the call
    /// reports a timeout.
    pub confirm_timeout_ms: u64,
    pub receipt_poll_ms: u64,
    /// Scale of margin and pnl words.
    pub collateral_decimals: u32,
    pub leverage_bounds: LeverageBounds,
}

impl Default for EvmAdapterConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: 30_000,
            receipt_poll_ms: 500,
            collateral_decimals: 6,
            leverage_bounds: LeverageBounds::default(),
        }
    }
}

/// Scales needed to encode and decode per-market amounts.
#[derive(Debug, Clone)]
struct MarketMeta {
    address: String,
    price_decimals: u32,
    size_decimals: u32,
}

pub struct EvmAdapter {
    transport: Arc<dyn EvmTransport>,
    owner: Option<AccountId>,
    config: EvmAdapterConfig,
    meta: RwLock<HashMap<Symbol, MarketMeta>>,
}

impl EvmAdapter {
    pub fn new(transport: Arc<dyn EvmTransport>) -> Self {
        Self {
            transport,
            owner: None,
            config: EvmAdapterConfig::default(),
            meta: RwLock::new(HashMap::new()),
        }
    }

    /// Binds the wallet account whose state the account-scoped fetchers and
    /// mutations operate on.
    pub fn with_owner(mut self, owner: AccountId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_config(mut self, config: EvmAdapterConfig) -> Self {
        self.config = config;
        self
    }

    fn require_owner(&self) -> Result<&AccountId, AdapterError> {
        self.owner
            .as_ref()
            .ok_or_else(|| AdapterError::Rejected("no wallet bound to adapter".into()))
    }

    /// Resolves a market's encoding scales, refreshing the listing cache on
    /// a miss so callers that never fetched markets still resolve.
    async fn market_meta(&self, symbol: &Symbol) -> Result<Option<MarketMeta>, AdapterError> {
        if let Some(meta) = self.meta.read().await.get(symbol).cloned() {
            return Ok(Some(meta));
        }
        let raws = self.transport.list_markets().await?;
        let mut cache = self.meta.write().await;
        for raw in &raws {
            cache.insert(
                Symbol::from(raw.symbol.as_str()),
                MarketMeta {
                    address: raw.address.clone(),
                    price_decimals: raw.price_decimals,
                    size_decimals: raw.size_decimals,
                },
            );
        }
        Ok(cache.get(symbol).cloned())
    }

    /// Polls for the receipt of a broadcast transaction until it is mined or
    /// the configured deadline lapses. Transient polling failures are logged
    /// and retried; only the deadline ends the wait.
    async fn await_receipt(&self, tx_hash: &str) -> Result<EvmReceipt, AdapterError> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.config.confirm_timeout_ms);
        loop {
            match self.transport.receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(err) => warn!("receipt poll for {} failed: {}", tx_hash, err),
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            futures_timer::Delay::new(Duration::from_millis(self.config.receipt_poll_ms)).await;
        }
    }

    fn encode_order(
        &self,
        request: &OrderRequest,
        meta: &MarketMeta,
    ) -> Result<PlaceOrderCall, AdapterError> {
        let reject = |err: ScalingError| AdapterError::Rejected(err.to_string());
        let side = codes::side_code(request.side)
            .ok_or_else(|| AdapterError::Rejected("order side is not encodable".into()))?;
        let order_type = codes::order_type_code(request.order_type)
            .ok_or_else(|| AdapterError::Rejected("order type is not encodable".into()))?;
        let stop_price = match request.stop_price {
            Some(price) => Some(from_canonical(price, meta.price_decimals).map_err(reject)?),
            None => None,
        };
        Ok(PlaceOrderCall {
            market_address: meta.address.clone(),
            side,
            order_type,
            price: from_canonical(request.price, meta.price_decimals).map_err(reject)?,
            amount: from_canonical(request.amount, meta.size_decimals).map_err(reject)?,
            leverage_bps: leverage_to_bps(request.leverage).map_err(reject)?,
            reduce_only: request.reduce_only,
            time_in_force: codes::time_in_force_code(request.time_in_force),
            stop_price,
            client_tag: request
                .client_order_id
                .as_ref()
                .map(|cid| cid.to_string())
                .unwrap_or_default(),
        })
    }
}

/// Pulls the assigned order id out of a mined receipt's `OrderPlaced` event.
///
/// The id is the last 32-byte word of the event data; ids above `u128` range
/// and malformed log data are treated as unrecoverable rather than
/// truncated. Log data is untrusted RPC input and need not be ASCII hex.
fn extract_order_id(receipt: &EvmReceipt) -> Option<OrderId> {
    receipt.logs.iter().find_map(|log| {
        if log.topics.first()? != &*ORDER_PLACED_TOPIC {
            return None;
        }
        let data = log.data.strip_prefix("0x").unwrap_or(&log.data);
        let word = data.get(data.len().saturating_sub(64)..)?;
        let split = word.len().saturating_sub(32);
        let high = word.get(..split)?;
        let low = word.get(split..)?;
        if !high.chars().all(|c| c == '0') {
            return None;
        }
        let id = u128::from_str_radix(low, 16).ok()?;
        Some(OrderId::from(id.to_string()))
    })
}

// ─── Raw → canonical ─────────────────────────────────────────────────────────

fn market_from_raw(raw: &RawEvmMarket) -> Result<Market, ScalingError> {
    let last_price = raw
        .last_price
        .map(|p| to_canonical_unsigned(p, raw.price_decimals))
        .transpose()?;
    let funding_rate = raw
        .funding_rate
        .map(|r| to_canonical(r, crate::shared::scaling::PRICE_DECIMALS))
        .transpose()?;
    Ok(Market {
        symbol: Symbol::from(raw.symbol.as_str()),
        address: raw.address.clone(),
        price_decimals: raw.price_decimals,
        size_decimals: raw.size_decimals,
        last_price,
        funding_rate,
    })
}

fn balance_from_raw(raw: &RawEvmBalance) -> Result<Balance, ScalingError> {
    let free = to_canonical_unsigned(raw.free, raw.decimals)?;
    let locked = to_canonical_unsigned(raw.locked, raw.decimals)?;
    Ok(Balance {
        token: TokenId::from(raw.token.as_str()),
        free,
        locked,
        total: free + locked,
    })
}

fn position_from_raw(
    raw: &RawEvmPosition,
    meta: &MarketMeta,
    collateral_decimals: u32,
) -> Result<Position, ScalingError> {
    let margin = to_canonical_unsigned(raw.margin, collateral_decimals)?;
    let pnl = to_canonical(raw.pnl, collateral_decimals)?;
    let pnl_percentage = if margin > Decimal::ZERO {
        pnl.checked_div(margin)
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };
    let liquidation_price = if raw.liquidation_price == 0 {
        None
    } else {
        Some(to_canonical_unsigned(
            raw.liquidation_price,
            meta.price_decimals,
        )?)
    };
    Ok(Position {
        id: PositionId::from(raw.id.as_str()),
        market: Symbol::from(raw.market.as_str()),
        side: codes::position_side(raw.side),
        size: to_canonical_unsigned(raw.size, meta.size_decimals)?,
        leverage: leverage_from_bps(raw.leverage_bps),
        entry_price: to_canonical_unsigned(raw.entry_price, meta.price_decimals)?,
        liquidation_price,
        margin,
        pnl,
        pnl_percentage,
    })
}

fn order_from_raw(raw: &RawEvmOrder, meta: &MarketMeta) -> Result<Order, ScalingError> {
    Ok(Order {
        id: OrderId::from(raw.id.to_string()),
        client_order_id: raw
            .client_tag
            .as_deref()
            .filter(|tag| !tag.is_empty())
            .map(ClientOrderId::from),
        market: Symbol::from(raw.market.as_str()),
        side: codes::side(raw.side),
        order_type: codes::order_type(raw.order_type),
        price: to_canonical_unsigned(raw.price, meta.price_decimals)?,
        amount: to_canonical_unsigned(raw.amount, meta.size_decimals)?,
        filled: to_canonical_unsigned(raw.filled, meta.size_decimals)?,
        status: codes::order_status(raw.status),
        timestamp: DateTime::<Utc>::from_timestamp_millis(raw.created_at_ms as i64)
            .unwrap_or_default(),
        tx_ref: raw.tx_hash.as_deref().map(TxRef::from),
    })
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain_kind(&self) -> ChainKind {
        ChainKind::Evm
    }

    fn bound_owner(&self) -> Option<AccountId> {
        self.owner.clone()
    }

    fn leverage_bounds(&self) -> LeverageBounds {
        self.config.leverage_bounds.clone()
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>, AdapterError> {
        let raws = self.transport.list_markets().await?;
        let mut cache = self.meta.write().await;
        let mut markets = Vec::with_capacity(raws.len());
        for raw in &raws {
            match market_from_raw(raw) {
                Ok(market) => {
                    cache.insert(
                        market.symbol.clone(),
                        MarketMeta {
                            address: raw.address.clone(),
                            price_decimals: raw.price_decimals,
                            size_decimals: raw.size_decimals,
                        },
                    );
                    markets.push(market);
                }
                Err(err) => warn!("skipping market {}: {}", raw.symbol, err),
            }
        }
        Ok(markets)
    }

    async fn fetch_balances(&self) -> Result<Vec<Balance>, AdapterError> {
        let Some(owner) = self.owner.as_ref() else {
            return Ok(Vec::new());
        };
        let raws = self.transport.account_balances(owner.as_str()).await?;
        let mut balances = Vec::with_capacity(raws.len());
        for raw in &raws {
            match balance_from_raw(raw) {
                Ok(balance) => balances.push(balance),
                Err(err) => warn!("skipping balance {}: {}", raw.token, err),
            }
        }
        Ok(balances)
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, AdapterError> {
        let Some(owner) = self.owner.as_ref() else {
            return Ok(Vec::new());
        };
        let raws = self.transport.account_positions(owner.as_str()).await?;
        let mut positions = Vec::with_capacity(raws.len());
        for raw in &raws {
            let symbol = Symbol::from(raw.market.as_str());
            let Some(meta) = self.market_meta(&symbol).await? else {
                warn!("skipping position {}: unknown market {}", raw.id, symbol);
                continue;
            };
            match position_from_raw(raw, &meta, self.config.collateral_decimals) {
                Ok(position) => positions.push(position),
                Err(err) => warn!("skipping position {}: {}", raw.id, err),
            }
        }
        Ok(positions)
    }

    async fn fetch_open_orders(&self) -> Result<Vec<Order>, AdapterError> {
        let Some(owner) = self.owner.as_ref() else {
            return Ok(Vec::new());
        };
        let raws = self.transport.account_orders(owner.as_str()).await?;
        let mut orders = Vec::with_capacity(raws.len());
        for raw in &raws {
            let symbol = Symbol::from(raw.market.as_str());
            let Some(meta) = self.market_meta(&symbol).await? else {
                warn!("skipping order {}: unknown market {}", raw.id, symbol);
                continue;
            };
            match order_from_raw(raw, &meta) {
                Ok(order) => orders.push(order),
                Err(err) => warn!("skipping order {}: {}", raw.id, err),
            }
        }
        Ok(orders)
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<SubmitOutcome, AdapterError> {
        self.require_owner()?;
        let meta = self
            .market_meta(&request.market)
            .await?
            .ok_or_else(|| AdapterError::Rejected(format!("unknown market {}", request.market)))?;
        let call = self.encode_order(request, &meta)?;
        let tx_hash = self.transport.send_place_order(call).await?;
        debug!("order broadcast in {}", tx_hash);

        let receipt = self.await_receipt(&tx_hash).await?;
        if !receipt.status {
            return Err(AdapterError::Rejected(format!(
                "transaction {} reverted",
                tx_hash
            )));
        }
        let tx_ref = TxRef::from(tx_hash.as_str());
        match extract_order_id(&receipt) {
            Some(id) => Ok(SubmitOutcome::assigned(id, tx_ref)),
            None => {
                warn!("no order id in receipt {}", tx_hash);
                Ok(SubmitOutcome::pending(tx_ref))
            }
        }
    }

    async fn cancel_order(&self, id: &OrderId) -> Result<TxOutcome, AdapterError> {
        self.require_owner()?;
        // An order still keyed by its client order id has no venue id to
        // cancel by; the parse rejects it.
        let order_id: u128 = id
            .as_str()
            .parse()
            .map_err(|_| AdapterError::Rejected(format!("order id {} is not numeric", id)))?;
        let tx_hash = self
            .transport
            .send_cancel_order(CancelOrderCall { order_id })
            .await?;
        let receipt = self.await_receipt(&tx_hash).await?;
        if !receipt.status {
            return Err(AdapterError::Rejected(format!(
                "transaction {} reverted",
                tx_hash
            )));
        }
        Ok(TxOutcome {
            tx_ref: TxRef::from(tx_hash.as_str()),
        })
    }

    async fn update_leverage(
        &self,
        position: &PositionId,
        leverage: Decimal,
    ) -> Result<TxOutcome, AdapterError> {
        self.require_owner()?;
        let leverage_bps =
            leverage_to_bps(leverage).map_err(|err| AdapterError::Rejected(err.to_string()))?;
        let tx_hash = self
            .transport
            .send_update_leverage(UpdateLeverageCall {
                position_id: position.to_string(),
                leverage_bps,
            })
            .await?;
        let receipt = self.await_receipt(&tx_hash).await?;
        if !receipt.status {
            return Err(AdapterError::Rejected(format!(
                "transaction {} reverted",
                tx_hash
            )));
        }
        Ok(TxOutcome {
            tx_ref: TxRef::from(tx_hash.as_str()),
        })
    }
}
