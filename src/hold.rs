// Room-hold bookkeeping for one booking page
//
// Ties a lock target to this tab's identifiers and remembers when the hold
// was first requested, so retries from the same page report the original
// `initialLockAt` instead of a fresh one.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::identity::IdentitySnapshot;
use crate::lock_api::{spawn_release, ReservationLockApi};
use crate::payload::{LockOptions, LockTarget, ReservationLockRequest};

#[derive(Debug, Clone, PartialEq)]
struct HeldRoom {
    target: LockTarget,
    initial_lock_at: DateTime<Utc>,
}

pub struct RoomHold {
    api: Arc<dyn ReservationLockApi>,
    identity: IdentitySnapshot,
    held: Mutex<Option<HeldRoom>>,
}

impl RoomHold {
    pub fn new(api: Arc<dyn ReservationLockApi>, identity: IdentitySnapshot) -> Self {
        Self {
            api,
            identity,
            held: Mutex::new(None),
        }
    }

    pub fn current_target(&self) -> Option<LockTarget> {
        self.held.lock().as_ref().map(|h| h.target.clone())
    }

    pub fn initial_lock_at(&self) -> Option<DateTime<Utc>> {
        self.held.lock().as_ref().map(|h| h.initial_lock_at)
    }

    /// Ask the backend to hold `target`. Whatever the backend answers is
    /// returned as-is; a conflict is not an error at this level.
    pub async fn acquire(&self, target: LockTarget) -> Result<Value, ApiError> {
        let initial_lock_at = {
            let mut held = self.held.lock();
            let initial_lock_at = match held.as_ref() {
                Some(h) if h.target == target => h.initial_lock_at,
                _ => Utc::now(),
            };
            *held = Some(HeldRoom {
                target: target.clone(),
                initial_lock_at,
            });
            initial_lock_at
        };

        let request = self.request_for(
            target,
            LockOptions {
                initial_lock_at: Some(initial_lock_at),
                ..Default::default()
            },
        );
        self.api.create_lock(&request).await
    }

    /// Release the current hold. Without one this is a no-op returning `Ok(None)`.
    ///
    /// The hold is only forgotten once the backend accepts the release, so a
    /// failed release can simply be called again.
    pub async fn release(&self, customer_idx: Option<i64>) -> Result<Option<Value>, ApiError> {
        let Some(target) = self.current_target() else {
            return Ok(None);
        };

        let body = self.release_target(target.clone(), customer_idx).await?;
        self.forget(&target);
        Ok(Some(body))
    }

    /// Post-payment cleanup: the hold is dropped locally whether or not the
    /// backend answers, since the lock expires server-side anyway.
    pub async fn release_after_payment(
        &self,
        customer_idx: Option<i64>,
    ) -> Result<Option<Value>, ApiError> {
        let Some(target) = self.current_target() else {
            return Ok(None);
        };

        let result = self.release_target(target.clone(), customer_idx).await;
        match &result {
            Ok(_) => info!("reservation lock released after payment"),
            Err(e) => {
                warn!(error = %e, "lock release after payment failed, relying on backend expiry")
            }
        }
        self.forget(&target);
        result.map(Some)
    }

    /// Page-exit cleanup that does not wait for the backend. The hold is
    /// dropped locally either way; `None` when nothing was held or no runtime
    /// is available to send the release.
    pub fn release_detached(
        &self,
        customer_idx: Option<i64>,
    ) -> Option<JoinHandle<Result<Value, ApiError>>> {
        let held = self.held.lock().take()?;
        let request = self.request_for(
            held.target,
            LockOptions {
                customer_idx,
                ..Default::default()
            },
        );
        spawn_release(Arc::clone(&self.api), request)
    }

    async fn release_target(
        &self,
        target: LockTarget,
        customer_idx: Option<i64>,
    ) -> Result<Value, ApiError> {
        let request = self.request_for(
            target,
            LockOptions {
                customer_idx,
                ..Default::default()
            },
        );
        self.api.release_lock(&request).await
    }

    fn request_for(&self, target: LockTarget, extra: LockOptions) -> ReservationLockRequest {
        let options = self.identity.clone().into_options().merge(extra);
        ReservationLockRequest::new(target, options)
    }

    fn forget(&self, target: &LockTarget) {
        let mut held = self.held.lock();
        if held.as_ref().map(|h| &h.target) == Some(target) {
            *held = None;
        }
    }
}
