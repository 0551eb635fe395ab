//! High-level client: one façade over the store, the chain adapter, the
//! lifecycle controller, the push channel and the read API.
//!
//! Construction is builder-based; the chain adapter is the only mandatory
//! ingredient. Reads are copy-out snapshots of the canonical store, writes go
//! through the lifecycle controller, and the push channel keeps the store
//! current between bootstraps.

use std::sync::Arc;

use async_lock::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::auth::WalletSigner;
use crate::chain::ChainAdapter;
use crate::domain::{Balance, Market, Order, OrderRequest, Position, Trade, TradeFilter};
use crate::error::SdkError;
use crate::http::ReadApi;
use crate::lifecycle::LifecycleController;
use crate::shared::{ClientOrderId, OrderId, PositionId, Symbol, TokenId};
use crate::store::{CanonicalStore, Sequence, Source};
use crate::ws::{Channel, ChannelConfig, ChannelManager, ChannelState, ReconnectPolicy};

/// The primary entry point for the Geodesic SDK.
pub struct GeodesicClient {
    store: Arc<CanonicalStore>,
    adapter: Arc<dyn ChainAdapter>,
    lifecycle: LifecycleController,
    read_api: ReadApi,
    channel_config: ChannelConfig,
    signer: Option<Arc<dyn WalletSigner>>,
    channel: RwLock<Option<Arc<ChannelManager>>>,
}

impl GeodesicClient {
    pub fn builder() -> GeodesicClientBuilder {
        GeodesicClientBuilder::default()
    }

    /// The canonical store behind this client. Direct merging is an advanced
    /// path; normal producers are bootstrap, the push channel and the
    /// lifecycle controller.
    pub fn store(&self) -> Arc<CanonicalStore> {
        Arc::clone(&self.store)
    }

    // ── Bootstrap ────────────────────────────────────────────────────────

    /// Fetches the four entity categories in parallel and merges them in.
    ///
    /// A category whose fetch fails degrades to empty with a logged warning;
    /// bootstrap itself always completes. Call again at any time to
    /// resynchronize; the sequence rule keeps refetched data from clobbering
    /// anything newer.
    pub async fn bootstrap(&self) {
        let (markets, balances, positions, orders) = tokio::join!(
            self.adapter.fetch_markets(),
            self.adapter.fetch_balances(),
            self.adapter.fetch_positions(),
            self.adapter.fetch_open_orders(),
        );

        match markets {
            Ok(markets) => {
                let seq = Sequence::now();
                debug!("bootstrap: {} markets", markets.len());
                for market in markets {
                    self.store
                        .merge_market(market.symbol.clone(), market.to_patch(), Source::Fetch, seq)
                        .await;
                }
            }
            Err(err) => warn!("market fetch degraded to empty: {}", err),
        }

        match balances {
            Ok(balances) => {
                let seq = Sequence::now();
                debug!("bootstrap: {} balances", balances.len());
                for balance in balances {
                    self.store
                        .merge_balance(balance.token.clone(), balance.to_patch(), Source::Fetch, seq)
                        .await;
                }
            }
            Err(err) => warn!("balance fetch degraded to empty: {}", err),
        }

        match positions {
            Ok(positions) => {
                let seq = Sequence::now();
                debug!("bootstrap: {} positions", positions.len());
                for position in positions {
                    self.store
                        .merge_position(position.id.clone(), position.to_patch(), Source::Fetch, seq)
                        .await;
                }
            }
            Err(err) => warn!("position fetch degraded to empty: {}", err),
        }

        match orders {
            Ok(orders) => {
                let seq = Sequence::now();
                debug!("bootstrap: {} open orders", orders.len());
                for order in orders {
                    self.store
                        .merge_order(order.id.clone(), order.to_patch(), Source::Fetch, seq)
                        .await;
                }
            }
            Err(err) => warn!("order fetch degraded to empty: {}", err),
        }
    }

    // ── Push channel ─────────────────────────────────────────────────────

    /// Starts the push channel (no-op when one is already running). The
    /// returned handle exposes the diagnostic event stream; holding it is
    /// optional, the client keeps the channel alive either way.
    pub async fn connect(&self) -> Arc<ChannelManager> {
        let mut guard = self.channel.write().await;
        if let Some(channel) = guard.as_ref() {
            // Liveness, not connection state: a manager waiting out a backoff
            // window reports `Disconnected` but is still the one to keep.
            if channel.is_running() {
                return Arc::clone(channel);
            }
        }
        let manager = Arc::new(ChannelManager::connect(
            self.channel_config.clone(),
            Arc::clone(&self.store),
            self.signer.clone(),
        ));
        *guard = Some(Arc::clone(&manager));
        manager
    }

    /// Closes the push channel and stops reconnecting.
    pub async fn disconnect(&self) {
        if let Some(channel) = self.channel.write().await.take() {
            channel.disconnect().await;
        }
    }

    pub async fn channel_state(&self) -> ChannelState {
        match self.channel.read().await.as_ref() {
            Some(channel) => channel.state(),
            None => ChannelState::Disconnected,
        }
    }

    // ── Writes ───────────────────────────────────────────────────────────

    pub async fn create_order(&self, request: OrderRequest) -> Result<Order, SdkError> {
        self.lifecycle.create_order(request).await
    }

    pub async fn cancel_order(&self, id: &OrderId) -> Result<(), SdkError> {
        self.lifecycle.cancel_order(id).await
    }

    pub async fn update_position_leverage(
        &self,
        position: &PositionId,
        leverage: Decimal,
    ) -> Result<(), SdkError> {
        self.lifecycle.update_position_leverage(position, leverage).await
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub async fn markets(&self) -> Vec<Market> {
        self.store.markets().await
    }

    pub async fn market(&self, symbol: &Symbol) -> Option<Market> {
        self.store.market(symbol).await
    }

    pub async fn balances(&self) -> Vec<Balance> {
        self.store.balances().await
    }

    pub async fn balance(&self, token: &TokenId) -> Option<Balance> {
        self.store.balance(token).await
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.store.positions().await
    }

    pub async fn position(&self, id: &PositionId) -> Option<Position> {
        self.store.position(id).await
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.store.orders().await
    }

    pub async fn order(&self, id: &OrderId) -> Option<Order> {
        self.store.order(id).await
    }

    pub async fn order_by_client_id(&self, cid: &ClientOrderId) -> Option<Order> {
        self.store.order_by_client_id(cid).await
    }

    /// Historical trades from the venue read API; never touches the store.
    pub async fn historical_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, SdkError> {
        Ok(self.read_api.get_trades(filter).await?)
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

pub struct GeodesicClientBuilder {
    api_url: String,
    ws_url: String,
    api_key: Option<String>,
    channels: Vec<Channel>,
    reconnect: ReconnectPolicy,
    adapter: Option<Arc<dyn ChainAdapter>>,
    signer: Option<Arc<dyn WalletSigner>>,
}

impl Default for GeodesicClientBuilder {
    fn default() -> Self {
        Self {
            api_url: crate::network::DEFAULT_API_URL.to_string(),
            ws_url: crate::network::DEFAULT_WS_URL.to_string(),
            api_key: None,
            channels: Channel::all(),
            reconnect: ReconnectPolicy::default(),
            adapter: None,
            signer: None,
        }
    }
}

impl GeodesicClientBuilder {
    pub fn api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    pub fn ws_url(mut self, url: &str) -> Self {
        self.ws_url = url.to_string();
        self
    }

    /// API key for push-channel authentication; pair it with a signer.
    pub fn api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    /// Channels to subscribe on connect. Defaults to all four.
    pub fn channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// The chain deployment this client trades on. Mandatory.
    pub fn adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn WalletSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn build(self) -> Result<GeodesicClient, SdkError> {
        let adapter = self
            .adapter
            .ok_or_else(|| SdkError::Validation("no chain adapter configured".to_string()))?;
        let store = Arc::new(CanonicalStore::with_leverage_bounds(
            adapter.leverage_bounds(),
        ));
        let lifecycle = LifecycleController::new(Arc::clone(&store), Arc::clone(&adapter));
        let channel_config = ChannelConfig {
            ws_url: self.ws_url,
            api_key: self.api_key,
            channels: self.channels,
            reconnect: self.reconnect,
            ..ChannelConfig::default()
        };

        Ok(GeodesicClient {
            store,
            adapter,
            lifecycle,
            read_api: ReadApi::new(&self.api_url),
            channel_config,
            signer: self.signer,
            channel: RwLock::new(None),
        })
    }
}
