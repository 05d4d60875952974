// Request payloads for the reservation lock endpoints.
//
// A lock request is a required `LockTarget` plus an optional-fields
// `LockOptions`. The two halves are combined by `merge_fields`, which
// copies only the optional keys that actually carry a value, so an absent
// field never reaches the backend as `null` or an empty string.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::identity::{LockId, SessionId};

/// The room and stay a lock applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockTarget {
    content_id: String,
    room_id: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl LockTarget {
    pub fn new(
        content_id: impl Into<String>,
        room_id: impl Into<String>,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Self, ApiError> {
        let content_id = content_id.into().trim().to_string();
        let room_id = room_id.into().trim().to_string();

        if content_id.is_empty() {
            return Err(ApiError::InvalidRequest("contentId is required".to_string()));
        }
        if room_id.is_empty() {
            return Err(ApiError::InvalidRequest("roomId is required".to_string()));
        }
        if check_in >= check_out {
            return Err(ApiError::InvalidRequest(format!(
                "checkIn {} must be before checkOut {}",
                check_in, check_out
            )));
        }

        Ok(Self {
            content_id,
            room_id,
            check_in,
            check_out,
        })
    }

    /// Parse `YYYY-MM-DD` dates, as the booking pages pass them around.
    pub fn parse(
        content_id: impl Into<String>,
        room_id: impl Into<String>,
        check_in: &str,
        check_out: &str,
    ) -> Result<Self, ApiError> {
        let check_in = parse_date("checkIn", check_in)?;
        let check_out = parse_date("checkOut", check_out)?;
        Self::new(content_id, room_id, check_in, check_out)
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("contentId", self.content_id.clone()),
            ("roomId", self.room_id.clone()),
            ("checkIn", self.check_in.format("%Y-%m-%d").to_string()),
            ("checkOut", self.check_out.format("%Y-%m-%d").to_string()),
        ]
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::InvalidRequest(format!("{} must be YYYY-MM-DD, got {:?}", field, raw))
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_id: Option<LockId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_lock_at: Option<DateTime<Utc>>,
    // Only meaningful on release
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_idx: Option<i64>,
}

impl LockOptions {
    /// Fields set in `overrides` replace ours; unset ones keep our value.
    pub fn merge(self, overrides: LockOptions) -> LockOptions {
        LockOptions {
            lock_id: overrides.lock_id.or(self.lock_id),
            session_id: overrides.session_id.or(self.session_id),
            tab_id: overrides.tab_id.or(self.tab_id),
            initial_lock_at: overrides.initial_lock_at.or(self.initial_lock_at),
            customer_idx: overrides.customer_idx.or(self.customer_idx),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReservationLockRequest {
    pub target: LockTarget,
    pub options: LockOptions,
}

impl ReservationLockRequest {
    pub fn new(target: LockTarget, options: LockOptions) -> Self {
        Self { target, options }
    }

    pub fn with_customer_idx(mut self, customer_idx: i64) -> Self {
        self.options.customer_idx = Some(customer_idx);
        self
    }

    pub fn to_payload(&self) -> Result<Map<String, Value>, ApiError> {
        merge_fields(&self.target, &self.options)
    }
}

impl Serialize for ReservationLockRequest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_payload()
            .map_err(<S::Error as serde::ser::Error>::custom)?
            .serialize(serializer)
    }
}

/// Combine a required-fields object with an optional-fields object.
///
/// Every key of `base` is kept. Keys of `optional` are copied over only when
/// their value is not `null`; they never overwrite a required key.
pub fn merge_fields<B, O>(base: &B, optional: &O) -> Result<Map<String, Value>, ApiError>
where
    B: Serialize + ?Sized,
    O: Serialize + ?Sized,
{
    let mut merged = to_object(base)?;
    for (key, value) in to_object(optional)? {
        if value.is_null() || merged.contains_key(&key) {
            continue;
        }
        merged.insert(key, value);
    }
    Ok(merged)
}

fn to_object<T: Serialize + ?Sized>(value: &T) -> Result<Map<String, Value>, ApiError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ApiError::InvalidRequest(format!(
            "payload must serialize to an object, got {}",
            other
        ))),
        Err(e) => Err(ApiError::InvalidRequest(e.to_string())),
    }
}
