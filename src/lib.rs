// Client-side core of the hotel booking platform: reservation locks and resale trades

pub mod config;
pub mod context;
pub mod error;
pub mod hold;
pub mod identity;
pub mod lock_api;
pub mod payload;
pub mod storage;
pub mod trade_api;
pub mod trade_flow;
pub mod transport;

// Re-export key types for convenience
pub use config::ClientConfig;
pub use context::{AppContext, PaymentDraft, SessionState};
pub use error::{ApiError, ClientError};
pub use hold::RoomHold;
pub use identity::{
    get_or_create_session_id, get_or_create_tab_lock_id, IdentitySnapshot, LockId, SessionId,
};
pub use lock_api::{spawn_release, ReservationLockApi, ReservationLockClient};
pub use payload::{merge_fields, LockOptions, LockTarget, ReservationLockRequest};
pub use storage::{BrowsingContext, KeyValueStorage, MemoryStorage};
pub use trade_api::{
    Availability, CreateTradeRequest, Trade, TradeApi, TradeClient, TradePayment, TradeStatus,
    TradeStatusUpdate, TradeSummary, UsedItemIdx, UsedTradeIdx,
};
pub use trade_flow::{TradeCoordinator, TradePhase, TradeView};
