//! Adapter for the venue's program-based deployments.
//!
//! Program chains hand back decoded account rows rather than ABI words:
//! amounts are `u64` at per-market scales, enums travel as snake_case string
//! labels, and confirmation means a finalized transaction status whose log
//! lines carry the assigned order id. The signing wallet lives inside the
//! transport; the adapter only validates that the bound owner key is a
//! well-formed base58 account address.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_lock::RwLock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
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

/// Marker preceding the assigned id in the program's confirmation logs.
const ORDER_ID_LOG_KEY: &str = "order_id: ";

/// Byte length of a program account key.
const ACCOUNT_KEY_LEN: usize = 32;

// ─── Raw account rows ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMarketAccount {
    pub symbol: String,
    /// Base58 market account key.
    pub market_key: String,
    pub price_decimals: u32,
    pub size_decimals: u32,
    #[serde(default)]
    pub last_price: Option<u64>,
    #[serde(default)]
    pub funding_rate: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBalanceAccount {
    pub token: String,
    pub decimals: u32,
    pub free: u64,
    pub locked: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPositionAccount {
    /// Base58 position account key, used as the position id.
    pub address: String,
    pub market: String,
    pub direction: String,
    pub size: u64,
    pub leverage_bps: u32,
    pub entry_price: u64,
    /// Zero means no liquidation level is set.
    #[serde(default)]
    pub liquidation_price: u64,
    pub margin: u64,
    pub pnl: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrderAccount {
    pub id: u64,
    pub market: String,
    pub side: String,
    pub kind: String,
    pub price: u64,
    pub amount: u64,
    pub filled: u64,
    pub state: String,
    /// Unix seconds, the program's clock granularity.
    pub created_at: i64,
    #[serde(default)]
    pub client_tag: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Finalized transaction status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramConfirmation {
    pub slot: u64,
    /// Present when the program aborted the transaction.
    #[serde(default)]
    pub err: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

// ─── Instructions ────────────────────────────────────────────────────────────

/// Mutations the adapter asks the transport to sign and send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueInstruction {
    PlaceOrder(PlaceOrderIx),
    CancelOrder(CancelOrderIx),
    UpdateLeverage(UpdateLeverageIx),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderIx {
    pub market_key: String,
    pub side: String,
    pub kind: String,
    pub price: u64,
    pub amount: u64,
    pub leverage_bps: u32,
    pub reduce_only: bool,
    pub time_in_force: String,
    pub stop_price: Option<u64>,
    pub client_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOrderIx {
    pub order_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateLeverageIx {
    pub position_key: String,
    pub leverage_bps: u32,
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Raw program access: account reads plus signed instruction submission.
///
/// The transport owns the keypair; `send_instruction` returns the transaction
/// signature immediately and the adapter polls
/// [`ProgramTransport::confirmation`] until the cluster finalizes it.
#[async_trait]
pub trait ProgramTransport: Send + Sync {
    async fn market_accounts(&self) -> Result<Vec<RawMarketAccount>, TransportError>;

    async fn balance_accounts(&self, owner: &str)
        -> Result<Vec<RawBalanceAccount>, TransportError>;

    async fn position_accounts(
        &self,
        owner: &str,
    ) -> Result<Vec<RawPositionAccount>, TransportError>;

    async fn open_order_accounts(&self, owner: &str)
        -> Result<Vec<RawOrderAccount>, TransportError>;

    async fn send_instruction(&self, ix: VenueInstruction) -> Result<String, TransportError>;

    /// None until the cluster finalizes the transaction.
    async fn confirmation(
        &self,
        signature: &str,
    ) -> Result<Option<ProgramConfirmation>, TransportError>;
}

// ─── Label tables ────────────────────────────────────────────────────────────

/// Fixed string labels the program uses for enums.
///
/// Decoding is total with an `Unknown` fallback; encoding an `Unknown` has no
/// label and fails before the instruction is built. `partial` collapses into
/// `Open` because a partially filled order is still working.
pub mod labels {
    use super::*;

    pub fn side(label: &str) -> Side {
        match label {
            "bid" => Side::Buy,
            "ask" => Side::Sell,
            _ => Side::Unknown,
        }
    }

    pub fn side_label(side: Side) -> Option<&'static str> {
        match side {
            Side::Buy => Some("bid"),
            Side::Sell => Some("ask"),
            Side::Unknown => None,
        }
    }

    pub fn direction(label: &str) -> PositionSide {
        match label {
            "long" => PositionSide::Long,
            "short" => PositionSide::Short,
            _ => PositionSide::Unknown,
        }
    }

    pub fn kind(label: &str) -> OrderType {
        match label {
            "market" => OrderType::Market,
            "limit" => OrderType::Limit,
            "stop" => OrderType::Stop,
            "stop_limit" => OrderType::StopLimit,
            "trailing_stop" => OrderType::TrailingStop,
            _ => OrderType::Unknown,
        }
    }

    pub fn kind_label(kind: OrderType) -> Option<&'static str> {
        match kind {
            OrderType::Market => Some("market"),
            OrderType::Limit => Some("limit"),
            OrderType::Stop => Some("stop"),
            OrderType::StopLimit => Some("stop_limit"),
            OrderType::TrailingStop => Some("trailing_stop"),
            OrderType::Unknown => None,
        }
    }

    pub fn state(label: &str) -> OrderStatus {
        match label {
            "open" | "partial" => OrderStatus::Open,
            "filled" => OrderStatus::Filled,
            "cancelled" => OrderStatus::Canceled,
            "expired" => OrderStatus::Expired,
            "rejected" => OrderStatus::Rejected,
            _ => OrderStatus::Unknown,
        }
    }

    pub fn time_in_force_label(tif: TimeInForce) -> &'static str {
        match tif {
            TimeInForce::Gtc => "gtc",
            TimeInForce::Ioc => "ioc",
            TimeInForce::Fok => "fok",
            TimeInForce::Gtd => "gtd",
        }
    }
}

// ─── Adapter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ProgramAdapterConfig {
    /// Finalization can lag a busy cluster well past EVM mining times.
    pub confirm_timeout_ms: u64,
    pub confirm_poll_ms: u64,
    pub collateral_decimals: u32,
    pub leverage_bounds: LeverageBounds,
}

impl Default for ProgramAdapterConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: 45_000,
            confirm_poll_ms: 400,
            collateral_decimals: 6,
            leverage_bounds: LeverageBounds::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct MarketMeta {
    market_key: String,
    price_decimals: u32,
    size_decimals: u32,
}

pub struct ProgramAdapter {
    transport: Arc<dyn ProgramTransport>,
    owner: Option<AccountId>,
    config: ProgramAdapterConfig,
    meta: RwLock<HashMap<Symbol, MarketMeta>>,
}

impl ProgramAdapter {
    pub fn new(transport: Arc<dyn ProgramTransport>) -> Self {
        Self {
            transport,
            owner: None,
            config: ProgramAdapterConfig::default(),
            meta: RwLock::new(HashMap::new()),
        }
    }

    /// Binds the owner account, rejecting keys that do not decode to a
    /// 32-byte base58 address.
    pub fn with_owner(mut self, owner: AccountId) -> Result<Self, AdapterError> {
        let decoded = bs58::decode(owner.as_str())
            .into_vec()
            .map_err(|_| AdapterError::Rejected(format!("{} is not base58", owner)))?;
        if decoded.len() != ACCOUNT_KEY_LEN {
            return Err(AdapterError::Rejected(format!(
                "{} is not a {}-byte account key",
                owner, ACCOUNT_KEY_LEN
            )));
        }
        self.owner = Some(owner);
        Ok(self)
    }

    pub fn with_config(mut self, config: ProgramAdapterConfig) -> Self {
        self.config = config;
        self
    }

    fn require_owner(&self) -> Result<&AccountId, AdapterError> {
        self.owner
            .as_ref()
            .ok_or_else(|| AdapterError::Rejected("no wallet bound to adapter".into()))
    }

    async fn market_meta(&self, symbol: &Symbol) -> Result<Option<MarketMeta>, AdapterError> {
        if let Some(meta) = self.meta.read().await.get(symbol).cloned() {
            return Ok(Some(meta));
        }
        let raws = self.transport.market_accounts().await?;
        let mut cache = self.meta.write().await;
        for raw in &raws {
            cache.insert(
                Symbol::from(raw.symbol.as_str()),
                MarketMeta {
                    market_key: raw.market_key.clone(),
                    price_decimals: raw.price_decimals,
                    size_decimals: raw.size_decimals,
                },
            );
        }
        Ok(cache.get(symbol).cloned())
    }

    /// Polls transaction status until finalization or the deadline. A
    /// finalized transaction that the program aborted is a rejection, not a
    /// timeout.
    async fn await_confirmation(
        &self,
        signature: &str,
    ) -> Result<ProgramConfirmation, AdapterError> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.config.confirm_timeout_ms);
        loop {
            match self.transport.confirmation(signature).await {
                Ok(Some(confirmation)) => {
                    if let Some(err) = confirmation.err {
                        return Err(AdapterError::Rejected(format!(
                            "transaction {} failed: {}",
                            signature, err
                        )));
                    }
                    return Ok(confirmation);
                }
                Ok(None) => {}
                Err(err) => warn!("confirmation poll for {} failed: {}", signature, err),
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::Timeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            futures_timer::Delay::new(Duration::from_millis(self.config.confirm_poll_ms)).await;
        }
    }

    fn encode_order(
        &self,
        request: &OrderRequest,
        meta: &MarketMeta,
    ) -> Result<PlaceOrderIx, AdapterError> {
        let side = labels::side_label(request.side)
            .ok_or_else(|| AdapterError::Rejected("order side is not encodable".into()))?;
        let kind = labels::kind_label(request.order_type)
            .ok_or_else(|| AdapterError::Rejected("order type is not encodable".into()))?;
        let stop_price = match request.stop_price {
            Some(price) => Some(scale_u64(price, meta.price_decimals)?),
            None => None,
        };
        Ok(PlaceOrderIx {
            market_key: meta.market_key.clone(),
            side: side.to_string(),
            kind: kind.to_string(),
            price: scale_u64(request.price, meta.price_decimals)?,
            amount: scale_u64(request.amount, meta.size_decimals)?,
            leverage_bps: leverage_to_bps(request.leverage)
                .map_err(|err| AdapterError::Rejected(err.to_string()))?,
            reduce_only: request.reduce_only,
            time_in_force: labels::time_in_force_label(request.time_in_force).to_string(),
            stop_price,
            client_tag: request
                .client_order_id
                .as_ref()
                .map(|cid| cid.to_string())
                .unwrap_or_default(),
        })
    }
}

/// Scales a canonical value into the program's u64 word, rejecting values the
/// word cannot hold.
fn scale_u64(value: Decimal, decimals: u32) -> Result<u64, AdapterError> {
    let raw = from_canonical(value, decimals)
        .map_err(|err: ScalingError| AdapterError::Rejected(err.to_string()))?;
    u64::try_from(raw)
        .map_err(|_| AdapterError::Rejected(format!("{} exceeds the chain's u64 range", value)))
}

/// Scans confirmation logs for the `order_id: <n>` line the program emits
/// when it books an order.
fn extract_order_id(logs: &[String]) -> Option<OrderId> {
    logs.iter().find_map(|line| {
        let at = line.find(ORDER_ID_LOG_KEY)?;
        let digits: String = line[at + ORDER_ID_LOG_KEY.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return None;
        }
        Some(OrderId::from(digits))
    })
}

// ─── Raw → canonical ─────────────────────────────────────────────────────────

fn market_from_raw(raw: &RawMarketAccount) -> Result<Market, ScalingError> {
    let last_price = raw
        .last_price
        .map(|p| to_canonical_unsigned(p as u128, raw.price_decimals))
        .transpose()?;
    let funding_rate = raw
        .funding_rate
        .map(|r| to_canonical(r as i128, raw.price_decimals))
        .transpose()?;
    Ok(Market {
        symbol: Symbol::from(raw.symbol.as_str()),
        address: raw.market_key.clone(),
        price_decimals: raw.price_decimals,
        size_decimals: raw.size_decimals,
        last_price,
        funding_rate,
    })
}

fn balance_from_raw(raw: &RawBalanceAccount) -> Result<Balance, ScalingError> {
    let free = to_canonical_unsigned(raw.free as u128, raw.decimals)?;
    let locked = to_canonical_unsigned(raw.locked as u128, raw.decimals)?;
    Ok(Balance {
        token: TokenId::from(raw.token.as_str()),
        free,
        locked,
        total: free + locked,
    })
}

fn position_from_raw(
    raw: &RawPositionAccount,
    meta: &MarketMeta,
    collateral_decimals: u32,
) -> Result<Position, ScalingError> {
    let margin = to_canonical_unsigned(raw.margin as u128, collateral_decimals)?;
    let pnl = to_canonical(raw.pnl as i128, collateral_decimals)?;
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
            raw.liquidation_price as u128,
            meta.price_decimals,
        )?)
    };
    Ok(Position {
        id: PositionId::from(raw.address.as_str()),
        market: Symbol::from(raw.market.as_str()),
        side: labels::direction(&raw.direction),
        size: to_canonical_unsigned(raw.size as u128, meta.size_decimals)?,
        leverage: leverage_from_bps(raw.leverage_bps),
        entry_price: to_canonical_unsigned(raw.entry_price as u128, meta.price_decimals)?,
        liquidation_price,
        margin,
        pnl,
        pnl_percentage,
    })
}

fn order_from_raw(raw: &RawOrderAccount, meta: &MarketMeta) -> Result<Order, ScalingError> {
    Ok(Order {
        id: OrderId::from(raw.id.to_string()),
        client_order_id: raw
            .client_tag
            .as_deref()
            .filter(|tag| !tag.is_empty())
            .map(ClientOrderId::from),
        market: Symbol::from(raw.market.as_str()),
        side: labels::side(&raw.side),
        order_type: labels::kind(&raw.kind),
        price: to_canonical_unsigned(raw.price as u128, meta.price_decimals)?,
        amount: to_canonical_unsigned(raw.amount as u128, meta.size_decimals)?,
        filled: to_canonical_unsigned(raw.filled as u128, meta.size_decimals)?,
        status: labels::state(&raw.state),
        timestamp: DateTime::<Utc>::from_timestamp(raw.created_at, 0).unwrap_or_default(),
        tx_ref: raw.signature.as_deref().map(TxRef::from),
    })
}

#[async_trait]
impl ChainAdapter for ProgramAdapter {
    fn chain_kind(&self) -> ChainKind {
        ChainKind::Program
    }

    fn bound_owner(&self) -> Option<AccountId> {
        self.owner.clone()
    }

    fn leverage_bounds(&self) -> LeverageBounds {
        self.config.leverage_bounds.clone()
    }

    async fn fetch_markets(&self) -> Result<Vec<Market>, AdapterError> {
        let raws = self.transport.market_accounts().await?;
        let mut cache = self.meta.write().await;
        let mut markets = Vec::with_capacity(raws.len());
        for raw in &raws {
            match market_from_raw(raw) {
                Ok(market) => {
                    cache.insert(
                        market.symbol.clone(),
                        MarketMeta {
                            market_key: raw.market_key.clone(),
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
        let raws = self.transport.balance_accounts(owner.as_str()).await?;
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
        let raws = self.transport.position_accounts(owner.as_str()).await?;
        let mut positions = Vec::with_capacity(raws.len());
        for raw in &raws {
            let symbol = Symbol::from(raw.market.as_str());
            let Some(meta) = self.market_meta(&symbol).await? else {
                warn!("skipping position {}: unknown market {}", raw.address, symbol);
                continue;
            };
            match position_from_raw(raw, &meta, self.config.collateral_decimals) {
                Ok(position) => positions.push(position),
                Err(err) => warn!("skipping position {}: {}", raw.address, err),
            }
        }
        Ok(positions)
    }

    async fn fetch_open_orders(&self) -> Result<Vec<Order>, AdapterError> {
        let Some(owner) = self.owner.as_ref() else {
            return Ok(Vec::new());
        };
        let raws = self.transport.open_order_accounts(owner.as_str()).await?;
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
        let ix = self.encode_order(request, &meta)?;
        let signature = self
            .transport
            .send_instruction(VenueInstruction::PlaceOrder(ix))
            .await?;
        debug!("order sent in {}", signature);

        let confirmation = self.await_confirmation(&signature).await?;
        let tx_ref = TxRef::from(signature.as_str());
        match extract_order_id(&confirmation.logs) {
            Some(id) => Ok(SubmitOutcome::assigned(id, tx_ref)),
            None => {
                warn!("no order id in logs of {}", signature);
                Ok(SubmitOutcome::pending(tx_ref))
            }
        }
    }

    async fn cancel_order(&self, id: &OrderId) -> Result<TxOutcome, AdapterError> {
        self.require_owner()?;
        // An order still keyed by its client order id has no venue id to
        // cancel by; the parse rejects it.
        let order_id: u64 = id
            .as_str()
            .parse()
            .map_err(|_| AdapterError::Rejected(format!("order id {} is not numeric", id)))?;
        let signature = self
            .transport
            .send_instruction(VenueInstruction::CancelOrder(CancelOrderIx { order_id }))
            .await?;
        self.await_confirmation(&signature).await?;
        Ok(TxOutcome {
            tx_ref: TxRef::from(signature.as_str()),
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
        let signature = self
            .transport
            .send_instruction(VenueInstruction::UpdateLeverage(UpdateLeverageIx {
                position_key: position.to_string(),
                leverage_bps,
            }))
            .await?;
        self.await_confirmation(&signature).await?;
        Ok(TxOutcome {
            tx_ref: TxRef::from(signature.as_str()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    // 32 bytes of 0x01 in base58.
    const OWNER: &str = "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi";

    #[derive(Default)]
    struct MockTransport {
        markets: Vec<RawMarketAccount>,
        balances: Vec<RawBalanceAccount>,
        positions: Vec<RawPositionAccount>,
        orders: Vec<RawOrderAccount>,
        confirmation_script: Mutex<VecDeque<Option<ProgramConfirmation>>>,
        sent: Mutex<Vec<VenueInstruction>>,
    }

    impl MockTransport {
        fn script_confirmation(self, confirmations: Vec<Option<ProgramConfirmation>>) -> Self {
            *self.confirmation_script.lock().unwrap() = confirmations.into();
            self
        }
    }

    #[async_trait]
    impl ProgramTransport for MockTransport {
        async fn market_accounts(&self) -> Result<Vec<RawMarketAccount>, TransportError> {
            Ok(self.markets.clone())
        }

        async fn balance_accounts(
            &self,
            _owner: &str,
        ) -> Result<Vec<RawBalanceAccount>, TransportError> {
            Ok(self.balances.clone())
        }

        async fn position_accounts(
            &self,
            _owner: &str,
        ) -> Result<Vec<RawPositionAccount>, TransportError> {
            Ok(self.positions.clone())
        }

        async fn open_order_accounts(
            &self,
            _owner: &str,
        ) -> Result<Vec<RawOrderAccount>, TransportError> {
            Ok(self.orders.clone())
        }

        async fn send_instruction(&self, ix: VenueInstruction) -> Result<String, TransportError> {
            self.sent.lock().unwrap().push(ix);
            Ok("5sig".into())
        }

        async fn confirmation(
            &self,
            _signature: &str,
        ) -> Result<Option<ProgramConfirmation>, TransportError> {
            Ok(self
                .confirmation_script
                .lock()
                .unwrap()
                .pop_front()
                .flatten())
        }
    }

    fn sol_market() -> RawMarketAccount {
        RawMarketAccount {
            symbol: "SOL-USDC".into(),
            market_key: "9cCFmkt".into(),
            price_decimals: 6,
            size_decimals: 9,
            last_price: Some(142_250_000),
            funding_rate: Some(3_500),
        }
    }

    fn fast_config() -> ProgramAdapterConfig {
        ProgramAdapterConfig {
            confirm_timeout_ms: 50,
            confirm_poll_ms: 5,
            ..ProgramAdapterConfig::default()
        }
    }

    fn adapter(transport: MockTransport) -> ProgramAdapter {
        ProgramAdapter::new(Arc::new(transport))
            .with_owner(AccountId::from(OWNER))
            .unwrap()
            .with_config(fast_config())
    }

    fn booked_confirmation(order_id: u64) -> ProgramConfirmation {
        ProgramConfirmation {
            slot: 1234,
            err: None,
            logs: vec![
                "Program geodesic invoke [1]".into(),
                format!("Program log: order_id: {}", order_id),
                "Program geodesic success".into(),
            ],
        }
    }

    #[test]
    fn test_owner_must_be_account_key() {
        let bad = ProgramAdapter::new(Arc::new(MockTransport::default()))
            .with_owner(AccountId::from("not-base58!"));
        assert!(bad.is_err());

        let short = ProgramAdapter::new(Arc::new(MockTransport::default()))
            .with_owner(AccountId::from("abc"));
        assert!(short.is_err());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(labels::state("open"), OrderStatus::Open);
        assert_eq!(labels::state("partial"), OrderStatus::Open);
        assert_eq!(labels::state("cancelled"), OrderStatus::Canceled);
        assert_eq!(labels::state("liquidated"), OrderStatus::Unknown);
    }

    #[test]
    fn test_extract_order_id_from_logs() {
        let logs = vec![
            "Program geodesic invoke [1]".into(),
            "Program log: order_id: 4242, owner: abc".into(),
        ];
        assert_eq!(extract_order_id(&logs), Some(OrderId::from("4242")));
        assert_eq!(extract_order_id(&["no id here".into()]), None);
    }

    #[tokio::test]
    async fn test_fetch_markets_normalizes_scales() {
        let adapter = adapter(MockTransport {
            markets: vec![sol_market()],
            ..Default::default()
        });

        let markets = adapter.fetch_markets().await.unwrap();
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].last_price, Some(dec("142.25")));
        assert_eq!(markets[0].funding_rate, Some(dec("0.0035")));
    }

    #[tokio::test]
    async fn test_account_fetchers_empty_without_wallet() {
        let transport = MockTransport {
            balances: vec![RawBalanceAccount {
                token: "USDC".into(),
                decimals: 6,
                free: 5_000_000,
                locked: 0,
            }],
            ..Default::default()
        };
        let adapter = ProgramAdapter::new(Arc::new(transport));

        assert!(adapter.fetch_balances().await.unwrap().is_empty());
        assert!(adapter.fetch_positions().await.unwrap().is_empty());
        assert!(adapter.fetch_open_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_orders_decodes_labels() {
        let adapter = adapter(MockTransport {
            markets: vec![sol_market()],
            orders: vec![RawOrderAccount {
                id: 7,
                market: "SOL-USDC".into(),
                side: "ask".into(),
                kind: "stop_limit".into(),
                price: 140_000_000,
                amount: 2_000_000_000,
                filled: 500_000_000,
                state: "partial".into(),
                created_at: 1_700_000_000,
                client_tag: Some("c-9".into()),
                signature: Some("5sig".into()),
            }],
            ..Default::default()
        });

        let orders = adapter.fetch_open_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Sell);
        assert_eq!(orders[0].order_type, OrderType::StopLimit);
        assert_eq!(orders[0].status, OrderStatus::Open);
        assert_eq!(orders[0].price, dec("140"));
        assert_eq!(orders[0].amount, dec("2"));
        assert_eq!(orders[0].filled, dec("0.5"));
    }

    #[tokio::test]
    async fn test_submit_extracts_order_id() {
        let transport = MockTransport {
            markets: vec![sol_market()],
            ..Default::default()
        }
        .script_confirmation(vec![None, Some(booked_confirmation(4242))]);
        let adapter = adapter(transport);

        let request = OrderRequest::new(
            "SOL-USDC",
            Side::Sell,
            OrderType::Limit,
            dec("142.25"),
            dec("2"),
        );
        let outcome = adapter.submit_order(&request).await.unwrap();
        assert_eq!(outcome.order_id.order_id(), Some(&OrderId::from("4242")));
        assert_eq!(outcome.tx_ref, TxRef::from("5sig"));
    }

    #[tokio::test]
    async fn test_submit_program_error_is_rejected() {
        let transport = MockTransport {
            markets: vec![sol_market()],
            ..Default::default()
        }
        .script_confirmation(vec![Some(ProgramConfirmation {
            slot: 9,
            err: Some("custom program error: 0x1".into()),
            logs: Vec::new(),
        })]);
        let adapter = adapter(transport);

        let request = OrderRequest::new(
            "SOL-USDC",
            Side::Buy,
            OrderType::Limit,
            dec("142.25"),
            dec("2"),
        );
        let err = adapter.submit_order(&request).await.unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_submit_unconfirmed_times_out() {
        let transport = MockTransport {
            markets: vec![sol_market()],
            ..Default::default()
        };
        let adapter = adapter(transport);

        let request = OrderRequest::new(
            "SOL-USDC",
            Side::Buy,
            OrderType::Limit,
            dec("142.25"),
            dec("2"),
        );
        let err = adapter.submit_order(&request).await.unwrap_err();
        assert!(matches!(err, AdapterError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancel_confirms() {
        let transport =
            MockTransport::default().script_confirmation(vec![Some(ProgramConfirmation {
                slot: 10,
                err: None,
                logs: Vec::new(),
            })]);
        let adapter = adapter(transport);

        let outcome = adapter.cancel_order(&OrderId::from("4242")).await.unwrap();
        assert_eq!(outcome.tx_ref, TxRef::from("5sig"));
    }

    #[tokio::test]
    async fn test_amount_beyond_u64_rejected() {
        let transport = MockTransport {
            markets: vec![sol_market()],
            ..Default::default()
        };
        let adapter = adapter(transport);

        // 2^64 / 10^9 rounds far above any plausible size; scaling must
        // refuse rather than wrap.
        let request = OrderRequest::new(
            "SOL-USDC",
            Side::Buy,
            OrderType::Limit,
            dec("142.25"),
            dec("99000000000"),
        );
        let err = adapter.submit_order(&request).await.unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(_)));
    }
}
