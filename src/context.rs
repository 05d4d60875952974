// Application context shared by the booking views.
//
// Holds the backend clients, the browsing context the identifiers live in,
// and the signed-in session (customer plus any payment draft). It is built
// once by `AppContext::bootstrap` and handed to views explicitly; signing
// out resets the session and starts a new browser-session identity.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::hold::RoomHold;
use crate::identity::IdentitySnapshot;
use crate::lock_api::{ReservationLockApi, ReservationLockClient};
use crate::payload::LockTarget;
use crate::storage::BrowsingContext;
use crate::trade_api::{TradeApi, TradeClient, UsedTradeIdx};
use crate::trade_flow::TradeCoordinator;
use crate::transport::HttpTransport;

/// Checkout data carried from the room page to the payment page.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDraft {
    pub target: LockTarget,
    pub amount: i64,
    /// Set when paying for a resale item rather than a fresh booking.
    pub used_trade_idx: Option<UsedTradeIdx>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub customer_idx: Option<i64>,
    pub payment_draft: Option<PaymentDraft>,
}

pub struct AppContext {
    config: ClientConfig,
    browsing: Option<BrowsingContext>,
    lock_api: Arc<dyn ReservationLockApi>,
    trade_api: Arc<dyn TradeApi>,
    session: RwLock<SessionState>,
}

impl AppContext {
    /// Build the clients over one shared transport.
    ///
    /// `browsing` is `None` when running outside a browser tab; lock payloads
    /// then go out without tab or session identifiers.
    pub fn bootstrap(
        config: ClientConfig,
        browsing: Option<BrowsingContext>,
    ) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config)?;
        let lock_api = Arc::new(ReservationLockClient::with_transport(transport.clone()));
        let trade_api = Arc::new(TradeClient::with_transport(transport));
        info!(base_url = %config.base_url, "application context ready");
        Ok(Self::with_services(config, browsing, lock_api, trade_api))
    }

    pub fn with_services(
        config: ClientConfig,
        browsing: Option<BrowsingContext>,
        lock_api: Arc<dyn ReservationLockApi>,
        trade_api: Arc<dyn TradeApi>,
    ) -> Self {
        Self {
            config,
            browsing,
            lock_api,
            trade_api,
            session: RwLock::new(SessionState::default()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn identity(&self) -> IdentitySnapshot {
        IdentitySnapshot::capture(self.browsing.as_ref())
    }

    pub fn lock_api(&self) -> Arc<dyn ReservationLockApi> {
        Arc::clone(&self.lock_api)
    }

    pub fn trade_api(&self) -> Arc<dyn TradeApi> {
        Arc::clone(&self.trade_api)
    }

    pub fn room_hold(&self) -> RoomHold {
        RoomHold::new(self.lock_api(), self.identity())
    }

    /// A fresh coordinator for one purchase view.
    pub fn trade_coordinator(&self) -> TradeCoordinator<dyn TradeApi> {
        TradeCoordinator::new(self.trade_api())
    }

    pub fn sign_in(&self, customer_idx: i64) {
        let mut session = self.session.write();
        if session.customer_idx != Some(customer_idx) {
            session.payment_draft = None;
        }
        session.customer_idx = Some(customer_idx);
        info!(customer_idx, "customer signed in");
    }

    pub fn session(&self) -> SessionState {
        self.session.read().clone()
    }

    pub fn customer_idx(&self) -> Option<i64> {
        self.session.read().customer_idx
    }

    pub fn set_payment_draft(&self, draft: PaymentDraft) {
        self.session.write().payment_draft = Some(draft);
    }

    pub fn take_payment_draft(&self) -> Option<PaymentDraft> {
        self.session.write().payment_draft.take()
    }

    /// Drop the session state and the browser-session identity. The tab's
    /// lock id survives, as it would in a real tab.
    pub fn sign_out(&self) {
        *self.session.write() = SessionState::default();
        if let Some(browsing) = &self.browsing {
            browsing.session_storage().clear();
        }
        info!("customer signed out");
    }
}
