// Trade coordination for the resale purchase flow
//
// Sequences the trade client calls and keeps the client-observed view of
// the trade ({phase, is_loading, error, trade}) for a single purchase view.
// The backend owns the real state machine; this only mirrors what it says.

use futures::future::{AbortHandle, AbortRegistration, Abortable};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::trade_api::{
    Availability, CreateTradeRequest, Trade, TradeApi, TradeStatus, TradeStatusUpdate,
    UsedItemIdx, UsedTradeIdx,
};

pub const TRADE_ERROR_MESSAGE: &str = "거래 중 오류가 발생했습니다";
pub const AVAILABILITY_ERROR_MESSAGE: &str = "거래 가능 여부 확인 중 오류가 발생했습니다";
pub const UNAVAILABLE_MESSAGE: &str = "현재 거래할 수 없는 상품입니다";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradePhase {
    Idle,
    CheckingAvailability,
    Creating,
    Created,
    Confirming,
    Confirmed,
    Cancelling,
}

impl TradePhase {
    fn for_status(status: TradeStatus) -> Self {
        match status {
            TradeStatus::Completed => TradePhase::Confirmed,
            TradeStatus::InProgress | TradeStatus::Other(_) => TradePhase::Created,
        }
    }
}

/// What a purchase view renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeView {
    pub phase: TradePhase,
    pub is_loading: bool,
    pub error: Option<String>,
    pub trade: Option<Trade>,
}

struct FlowState {
    phase: TradePhase,
    error: Option<String>,
    trade: Option<Trade>,
    in_flight: Option<AbortHandle>,
    detached: bool,
}

// Holds the single-flight slot. Dropping it without `settle` (the action
// future was dropped mid-request) frees the slot and restores the resting phase.
struct Flight<'a> {
    state: &'a Mutex<FlowState>,
    resting: TradePhase,
    settled: bool,
}

impl Flight<'_> {
    fn release(&mut self, state: &mut FlowState) {
        state.in_flight = None;
        state.phase = self.resting;
        self.settled = true;
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        debug!(resting = ?self.resting, "trade action dropped before settling");
        let state = self.state;
        self.release(&mut state.lock());
    }
}

pub struct TradeCoordinator<A: TradeApi + ?Sized> {
    api: Arc<A>,
    state: Mutex<FlowState>,
}

impl<A: TradeApi + ?Sized> TradeCoordinator<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: Mutex::new(FlowState {
                phase: TradePhase::Idle,
                error: None,
                trade: None,
                in_flight: None,
                detached: false,
            }),
        }
    }

    pub fn snapshot(&self) -> TradeView {
        let state = self.state.lock();
        TradeView {
            phase: state.phase,
            is_loading: state.in_flight.is_some(),
            error: state.error.clone(),
            trade: state.trade.clone(),
        }
    }

    /// Ask whether an item can be traded. An unavailable item is not an
    /// `Err`: the backend's answer comes back and `error` carries its message.
    pub async fn check_availability(&self, item: &UsedItemIdx) -> Result<Availability, ApiError> {
        let (flight, registration) = self.begin(TradePhase::CheckingAvailability)?;
        let outcome = self
            .fly(registration, self.api.check_availability(item))
            .await;

        self.settle(flight, outcome, |state, outcome| match outcome {
            Ok(availability) if !availability.available => {
                state.error = Some(
                    availability
                        .message
                        .clone()
                        .filter(|m| !m.trim().is_empty())
                        .unwrap_or_else(|| UNAVAILABLE_MESSAGE.to_string()),
                );
            }
            Ok(_) => {}
            Err(e) => state.error = Some(e.user_message(AVAILABILITY_ERROR_MESSAGE)),
        })
    }

    pub async fn create_trade(&self, request: &CreateTradeRequest) -> Result<Trade, ApiError> {
        let (flight, registration) = self.begin(TradePhase::Creating)?;
        let outcome = self
            .fly(registration, self.api.create_trade(request))
            .await;

        self.settle(flight, outcome, |state, outcome| match outcome {
            Ok(trade) => {
                info!(trade = %trade.used_trade_idx, "trade created");
                state.phase = TradePhase::for_status(trade.status);
                state.trade = Some(trade.clone());
            }
            Err(e) => state.error = Some(e.user_message(TRADE_ERROR_MESSAGE)),
        })
    }

    /// Confirm a trade. The held trade keeps its `used_trade_idx`; only its
    /// status changes.
    pub async fn confirm_trade(&self, trade: &UsedTradeIdx) -> Result<TradeStatusUpdate, ApiError> {
        let (flight, registration) = self.begin(TradePhase::Confirming)?;
        let outcome = self
            .fly(registration, self.api.confirm_trade(trade))
            .await;

        self.settle(flight, outcome, |state, outcome| match outcome {
            Ok(update) => {
                info!(trade = %trade, status = update.status.code(), "trade confirmed");
                let holds_same = state
                    .trade
                    .as_ref()
                    .is_some_and(|held| &held.used_trade_idx == trade);
                if holds_same {
                    if let Some(held) = state.trade.as_mut() {
                        held.status = update.status;
                    }
                } else {
                    state.trade = Some(Trade {
                        used_trade_idx: trade.clone(),
                        status: update.status,
                    });
                }
                state.phase = TradePhase::for_status(update.status);
            }
            Err(e) => state.error = Some(e.user_message(TRADE_ERROR_MESSAGE)),
        })
    }

    pub async fn cancel_trade(
        &self,
        trade: &UsedTradeIdx,
        reason: &str,
    ) -> Result<TradeStatusUpdate, ApiError> {
        let (flight, registration) = self.begin(TradePhase::Cancelling)?;
        let outcome = self
            .fly(registration, self.api.cancel_trade(trade, reason))
            .await;

        self.settle(flight, outcome, |state, outcome| match outcome {
            Ok(_) => {
                let held_other = state
                    .trade
                    .as_ref()
                    .is_some_and(|held| &held.used_trade_idx != trade);
                if !held_other {
                    info!(trade = %trade, "trade cancelled");
                    state.trade = None;
                    state.phase = TradePhase::Idle;
                }
            }
            Err(e) => state.error = Some(e.user_message(TRADE_ERROR_MESSAGE)),
        })
    }

    /// The owning view is gone: abort whatever is in flight and stop
    /// committing results.
    pub fn detach(&self) {
        let mut state = self.state.lock();
        state.detached = true;
        if let Some(handle) = state.in_flight.take() {
            debug!("aborting in-flight trade request");
            handle.abort();
        }
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().detached
    }

    /// Back to Idle with no trade and no error. Ignored while a request is in flight.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        if state.in_flight.is_some() {
            return;
        }
        state.phase = TradePhase::Idle;
        state.error = None;
        state.trade = None;
    }

    // Single-flight gate: checked and claimed under one lock.
    fn begin(&self, busy: TradePhase) -> Result<(Flight<'_>, AbortRegistration), ApiError> {
        let mut state = self.state.lock();
        if state.detached {
            return Err(ApiError::Cancelled);
        }
        if state.in_flight.is_some() {
            debug!(?busy, "rejecting action while another is in flight");
            return Err(ApiError::InFlight);
        }

        let (handle, registration) = AbortHandle::new_pair();
        state.in_flight = Some(handle);
        state.error = None;
        let resting = state.phase;
        state.phase = busy;
        let flight = Flight {
            state: &self.state,
            resting,
            settled: false,
        };
        Ok((flight, registration))
    }

    async fn fly<T, F>(&self, registration: AbortRegistration, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        Abortable::new(call, registration)
            .await
            .unwrap_or(Err(ApiError::Cancelled))
    }

    fn settle<T>(
        &self,
        mut flight: Flight<'_>,
        outcome: Result<T, ApiError>,
        commit: impl FnOnce(&mut FlowState, &Result<T, ApiError>),
    ) -> Result<T, ApiError> {
        let mut state = self.state.lock();
        flight.release(&mut state);

        if state.detached {
            return Err(ApiError::Cancelled);
        }
        if !matches!(outcome, Err(ApiError::Cancelled)) {
            commit(&mut state, &outcome);
        }
        outcome
    }
}


#[cfg(test)]
mod tests {
    use super::mock_server::MockTradeServer;
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn create_request(item: &str) -> CreateTradeRequest {
        CreateTradeRequest {
            used_item_idx: UsedItemIdx::new(item),
            buyer_idx: 1,
            seller_idx: 2,
            price: 10000,
            reserv_idx: 5,
        }
    }

    fn coordinator() -> (Arc<MockTradeServer>, TradeCoordinator<MockTradeServer>) {
        let server = Arc::new(MockTradeServer::new());
        let coordinator = TradeCoordinator::new(Arc::clone(&server));
        (server, coordinator)
    }

    #[tokio::test]
    async fn test_happy_path_purchase() {
        let (server, coordinator) = coordinator();
        server
            .set_create_response(Ok(Trade {
                used_trade_idx: UsedTradeIdx::new("T1"),
                status: TradeStatus::InProgress,
            }))
            .await;

        let availability = assert_ok!(coordinator.check_availability(&UsedItemIdx::new("ITEM1")).await);
        assert!(availability.available);
        assert_eq!(coordinator.snapshot().phase, TradePhase::Idle);

        let trade = assert_ok!(coordinator.create_trade(&create_request("ITEM1")).await);
        assert_eq!(trade.status, TradeStatus::InProgress);
        assert_eq!(coordinator.snapshot().phase, TradePhase::Created);

        let update = assert_ok!(coordinator.confirm_trade(&UsedTradeIdx::new("T1")).await);
        assert_eq!(update.status, TradeStatus::Completed);

        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Confirmed);
        assert!(!view.is_loading);
        assert_eq!(view.error, None);
        assert_eq!(
            view.trade,
            Some(Trade {
                used_trade_idx: UsedTradeIdx::new("T1"),
                status: TradeStatus::Completed,
            })
        );
    }

    #[tokio::test]
    async fn test_unavailable_item_sets_server_message() {
        let (server, coordinator) = coordinator();
        server
            .set_availability(
                "ITEM2",
                Availability {
                    available: false,
                    message: Some("이미 거래중입니다".to_string()),
                },
            )
            .await;

        let availability = coordinator
            .check_availability(&UsedItemIdx::new("ITEM2"))
            .await
            .unwrap();
        assert!(!availability.available);

        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Idle);
        assert_eq!(view.trade, None);
        assert_eq!(view.error.as_deref(), Some("이미 거래중입니다"));
    }

    #[tokio::test]
    async fn test_unavailable_without_message_uses_default() {
        let (server, coordinator) = coordinator();
        server
            .set_availability(
                "ITEM3",
                Availability {
                    available: false,
                    message: None,
                },
            )
            .await;

        coordinator
            .check_availability(&UsedItemIdx::new("ITEM3"))
            .await
            .unwrap();
        assert_eq!(coordinator.snapshot().error.as_deref(), Some(UNAVAILABLE_MESSAGE));
    }

    #[tokio::test]
    async fn test_availability_transport_failure() {
        let (server, coordinator) = coordinator();
        server.fail_next_requests(1);

        let result = coordinator.check_availability(&UsedItemIdx::new("ITEM1")).await;
        assert!(matches!(result, Err(ApiError::NetworkError(_))));
        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Idle);
        assert_eq!(view.error.as_deref(), Some(AVAILABILITY_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_confirm_keeps_trade_idx_and_cancel_clears() {
        let (_server, coordinator) = coordinator();

        let trade = coordinator.create_trade(&create_request("ITEM9")).await.unwrap();
        let idx = trade.used_trade_idx.clone();

        coordinator.confirm_trade(&idx).await.unwrap();
        let held = coordinator.snapshot().trade.unwrap();
        assert_eq!(held.used_trade_idx, idx);
        assert_eq!(held.status, TradeStatus::Completed);

        coordinator.cancel_trade(&idx, "단순 변심").await.unwrap();
        let view = coordinator.snapshot();
        assert_eq!(view.trade, None);
        assert_eq!(view.phase, TradePhase::Idle);
    }

    #[tokio::test]
    async fn test_create_failure_returns_to_idle() {
        let (server, coordinator) = coordinator();
        server.fail_next_requests(1);

        assert!(coordinator.create_trade(&create_request("ITEM1")).await.is_err());
        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Idle);
        assert_eq!(view.trade, None);
        assert_eq!(view.error.as_deref(), Some(TRADE_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_confirm_failure_stays_created_with_backend_message() {
        let (server, coordinator) = coordinator();
        let trade = coordinator.create_trade(&create_request("ITEM1")).await.unwrap();
        server
            .set_confirm_response(Err(ApiError::ApiResponseError {
                status_code: 409,
                message: "판매자가 거래를 취소했습니다".to_string(),
            }))
            .await;

        assert!(coordinator.confirm_trade(&trade.used_trade_idx).await.is_err());
        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Created);
        assert_eq!(view.trade, Some(trade));
        assert_eq!(view.error.as_deref(), Some("판매자가 거래를 취소했습니다"));
    }

    #[tokio::test]
    async fn test_cancel_failure_keeps_trade() {
        let (server, coordinator) = coordinator();
        let trade = coordinator.create_trade(&create_request("ITEM1")).await.unwrap();
        server.fail_next_requests(1);

        assert!(coordinator
            .cancel_trade(&trade.used_trade_idx, "구매자 취소")
            .await
            .is_err());
        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Created);
        assert_eq!(view.trade, Some(trade));
        assert!(view.error.is_some());
    }

    #[tokio::test]
    async fn test_next_action_clears_previous_error() {
        let (server, coordinator) = coordinator();
        server.fail_next_requests(1);
        assert!(coordinator.create_trade(&create_request("ITEM1")).await.is_err());
        assert!(coordinator.snapshot().error.is_some());

        coordinator.create_trade(&create_request("ITEM1")).await.unwrap();
        assert_eq!(coordinator.snapshot().error, None);
    }

    #[tokio::test]
    async fn test_double_submit_is_single_flight() {
        let (server, coordinator) = coordinator();
        server.set_delay(50);
        let request = create_request("ITEM1");

        let (first, second) = tokio::join!(
            coordinator.create_trade(&request),
            coordinator.create_trade(&request)
        );

        assert!(first.is_ok());
        assert_eq!(second, Err(ApiError::InFlight));
        assert_eq!(server.request_count(), 1);
        assert_eq!(coordinator.snapshot().phase, TradePhase::Created);
    }

    #[tokio::test]
    async fn test_loading_visible_while_in_flight() {
        let (server, coordinator) = coordinator();
        server.set_delay(100);

        let observe = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coordinator.snapshot()
        };
        let request = create_request("ITEM1");
        let (result, during) = tokio::join!(coordinator.create_trade(&request), observe);

        assert!(result.is_ok());
        assert!(during.is_loading);
        assert_eq!(during.phase, TradePhase::Creating);
        assert!(!coordinator.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_detach_drops_in_flight_result() {
        let (server, coordinator) = coordinator();
        server.set_delay(200);

        let unmount = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            coordinator.detach();
        };
        let request = create_request("ITEM1");
        let (result, _) = tokio::join!(coordinator.create_trade(&request), unmount);

        assert_eq!(result, Err(ApiError::Cancelled));
        let view = coordinator.snapshot();
        assert_eq!(view.trade, None);
        assert!(!view.is_loading);
        assert!(coordinator.is_detached());

        assert_eq!(
            coordinator.check_availability(&UsedItemIdx::new("ITEM1")).await,
            Err(ApiError::Cancelled)
        );
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let (_server, coordinator) = coordinator();
        coordinator.create_trade(&create_request("ITEM1")).await.unwrap();
        coordinator.reset();

        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Idle);
        assert_eq!(view.trade, None);
    }

    #[tokio::test]
    async fn test_dropped_action_frees_the_slot() {
        let (server, coordinator) = coordinator();
        server.set_delay(200);
        let request = create_request("ITEM1");

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), coordinator.create_trade(&request))
                .await;
        assert!(timed_out.is_err());

        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Idle);
        assert!(!view.is_loading);
        assert_eq!(view.trade, None);

        server.set_delay(0);
        let availability = assert_ok!(coordinator.check_availability(&UsedItemIdx::new("ITEM1")).await);
        assert!(availability.available);
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_confirm_keeps_created_trade() {
        let (server, coordinator) = coordinator();
        let trade = assert_ok!(coordinator.create_trade(&create_request("ITEM1")).await);
        server.set_delay(200);

        let confirm = coordinator.confirm_trade(&trade.used_trade_idx);
        assert!(tokio::time::timeout(Duration::from_millis(20), confirm).await.is_err());

        let view = coordinator.snapshot();
        assert_eq!(view.phase, TradePhase::Created);
        assert_eq!(view.trade, Some(trade.clone()));

        server.set_delay(0);
        assert_ok!(coordinator.confirm_trade(&trade.used_trade_idx).await);
        assert_eq!(coordinator.snapshot().phase, TradePhase::Confirmed);
    }
}
