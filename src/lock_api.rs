// Reservation lock client
//
// Thin wrapper over the backend's room-hold endpoints. The backend is the
// only arbiter of conflicts: results come back unmodified and nothing is
// retried or cached here.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ClientError};
use crate::payload::{LockTarget, ReservationLockRequest};
use crate::transport::HttpTransport;

pub const LOCK_PATH: &str = "/reservations/lock";
pub const UNLOCK_PATH: &str = "/reservations/unlock";
pub const LOCK_STATUS_PATH: &str = "/reservations/lock/status";

#[async_trait]
pub trait ReservationLockApi: Send + Sync + 'static {
    // Hold the room for the target stay
    async fn create_lock(&self, request: &ReservationLockRequest) -> Result<Value, ApiError>;

    // Release a hold; page exit and post-payment cleanup both land here
    async fn release_lock(&self, request: &ReservationLockRequest) -> Result<Value, ApiError>;

    // Diagnostics only, never used to gate a booking flow
    async fn lock_status(&self, target: &LockTarget) -> Result<Value, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReservationLockClient {
    transport: HttpTransport,
}

impl ReservationLockClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::with_transport(HttpTransport::new(config)?))
    }

    pub fn with_transport(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ReservationLockApi for ReservationLockClient {
    #[instrument(skip_all, fields(content_id = %request.target.content_id(), room_id = %request.target.room_id()))]
    async fn create_lock(&self, request: &ReservationLockRequest) -> Result<Value, ApiError> {
        let payload = request.to_payload()?;
        let result = self.transport.post_json(LOCK_PATH, Some(&payload)).await;
        debug!(ok = result.is_ok(), "create lock finished");
        result
    }

    #[instrument(skip_all, fields(content_id = %request.target.content_id(), room_id = %request.target.room_id()))]
    async fn release_lock(&self, request: &ReservationLockRequest) -> Result<Value, ApiError> {
        let payload = request.to_payload()?;
        let result = self.transport.post_json(UNLOCK_PATH, Some(&payload)).await;
        debug!(ok = result.is_ok(), "release lock finished");
        result
    }

    #[instrument(skip_all, fields(content_id = %target.content_id(), room_id = %target.room_id()))]
    async fn lock_status(&self, target: &LockTarget) -> Result<Value, ApiError> {
        self.transport
            .get_json(LOCK_STATUS_PATH, &target.query_pairs())
            .await
    }
}

/// Release a lock without making the caller wait.
///
/// Failures are logged and handed back through the join handle; the backend
/// expires stale locks on its own, so callers may drop the handle. Outside a
/// tokio runtime (e.g. from a `Drop` during shutdown) nothing is sent and
/// `None` is returned.
pub fn spawn_release(
    api: Arc<dyn ReservationLockApi>,
    request: ReservationLockRequest,
) -> Option<JoinHandle<Result<Value, ApiError>>> {
    let runtime = match Handle::try_current() {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(
                error = %e,
                content_id = request.target.content_id(),
                room_id = request.target.room_id(),
                "no runtime for background lock release, leaving it to expire"
            );
            return None;
        }
    };

    Some(runtime.spawn(async move {
        let result = api.release_lock(&request).await;
        if let Err(ref e) = result {
            warn!(
                error = %e,
                content_id = request.target.content_id(),
                room_id = request.target.room_id(),
                "background lock release failed"
            );
        }
        result
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LockId;
    use crate::payload::LockOptions;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ReservationLockClient {
        ReservationLockClient::new(&ClientConfig::with_base_url(server.uri())).unwrap()
    }

    fn target() -> LockTarget {
        LockTarget::parse("C100", "R7", "2025-06-01", "2025-06-03").unwrap()
    }

    fn request_with_lock_id() -> ReservationLockRequest {
        ReservationLockRequest::new(
            target(),
            LockOptions {
                lock_id: Some(LockId::new("L-1")),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_lock_sends_only_provided_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOCK_PATH))
            .and(body_json(json!({
                "contentId": "C100",
                "roomId": "R7",
                "checkIn": "2025-06-01",
                "checkOut": "2025-06-03",
                "lockId": "L-1",
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "lockToken": "abc"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = client_for(&server)
            .create_lock(&request_with_lock_id())
            .await
            .unwrap();
        assert_eq!(body, json!({"success": true, "lockToken": "abc"}));
    }

    #[tokio::test]
    async fn test_create_lock_returns_conflict_body_unmodified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOCK_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"success": false, "conflict": true, "message": "다른 고객이 결제 진행중입니다"}),
            ))
            .mount(&server)
            .await;

        let body = assert_ok!(client_for(&server).create_lock(&request_with_lock_id()).await);
        assert_eq!(body["conflict"], json!(true));
    }

    #[tokio::test]
    async fn test_release_twice_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UNLOCK_PATH))
            .and(body_json(json!({
                "contentId": "C100",
                "roomId": "R7",
                "checkIn": "2025-06-01",
                "checkOut": "2025-06-03",
                "lockId": "L-1",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"released": true})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let request = request_with_lock_id();
        assert_ok!(client.release_lock(&request).await);
        assert_ok!(client.release_lock(&request).await);
    }

    #[tokio::test]
    async fn test_release_failure_is_an_error_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UNLOCK_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .release_lock(&request_with_lock_id().with_customer_idx(5))
            .await;
        assert!(matches!(
            result,
            Err(ApiError::ApiResponseError {
                status_code: 500,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_lock_status_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOCK_STATUS_PATH))
            .and(query_param("contentId", "C100"))
            .and(query_param("roomId", "R7"))
            .and(query_param("checkIn", "2025-06-01"))
            .and(query_param("checkOut", "2025-06-03"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"locked": true})))
            .expect(1)
            .mount(&server)
            .await;

        let status = client_for(&server).lock_status(&target()).await.unwrap();
        assert_eq!(status, json!({"locked": true}));
    }

    #[tokio::test]
    async fn test_spawn_release_reports_failure_without_panicking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UNLOCK_PATH))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let api: Arc<dyn ReservationLockApi> = Arc::new(client_for(&server));
        let handle = spawn_release(api, request_with_lock_id()).unwrap();
        let outcome = handle.await.expect("release task panicked");
        assert_err!(outcome);
    }

    #[test]
    fn test_spawn_release_without_runtime_is_skipped() {
        let api: Arc<dyn ReservationLockApi> = Arc::new(
            ReservationLockClient::new(&ClientConfig::with_base_url("http://127.0.0.1:9")).unwrap(),
        );
        assert!(spawn_release(api, request_with_lock_id()).is_none());
    }
}
