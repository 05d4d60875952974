// Per-tab lock ids and per-session ids
//
// The backend uses these to tell "the same customer retrying from this tab"
// apart from a concurrent attempt in another tab or browser session.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::payload::LockOptions;
use crate::storage::{BrowsingContext, KeyValueStorage};

pub const TAB_LOCK_ID_KEY: &str = "reservation_lock_id";
pub const SESSION_ID_KEY: &str = "reservation_session_id";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl LockId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Return this tab's lock id, creating and persisting one on first use.
///
/// `None` means there is no browsing context (e.g. server-side execution);
/// callers omit the id from payloads in that case.
pub fn get_or_create_tab_lock_id(ctx: Option<&BrowsingContext>) -> Option<LockId> {
    let ctx = ctx?;
    Some(LockId(get_or_create(ctx.tab_storage(), TAB_LOCK_ID_KEY)))
}

/// Same contract as [`get_or_create_tab_lock_id`], scoped to the browser session.
pub fn get_or_create_session_id(ctx: Option<&BrowsingContext>) -> Option<SessionId> {
    let ctx = ctx?;
    Some(SessionId(get_or_create(ctx.session_storage(), SESSION_ID_KEY)))
}

fn get_or_create(storage: &dyn KeyValueStorage, key: &str) -> String {
    let mut generated = false;
    let id = storage.get_or_insert_with(key, &mut || {
        generated = true;
        generate_identifier()
    });
    if generated {
        debug!(key, "generated new identifier");
    }
    id
}

/// A UUID-v4 from OS randomness, or a PRNG-assembled v4-shaped string when
/// the OS source is unavailable.
pub fn generate_identifier() -> String {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string(),
        Err(e) => {
            warn!(error = %e, "OS randomness unavailable, using fallback identifier");
            fallback_identifier(&mut rand::thread_rng())
        }
    }
}

pub fn fallback_identifier<R: Rng>(rng: &mut R) -> String {
    const TEMPLATE: &str = "xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx";
    TEMPLATE
        .chars()
        .map(|c| match c {
            'x' => hex_digit(rng.gen_range(0..16)),
            // RFC 4122 variant bits: 8, 9, a or b
            'y' => hex_digit((rng.gen_range(0..16) & 0x3) | 0x8),
            other => other,
        })
        .collect()
}

fn hex_digit(n: u8) -> char {
    char::from_digit(n as u32, 16).unwrap_or('0')
}

/// Identifiers attached to every lock payload from one tab.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentitySnapshot {
    pub lock_id: Option<LockId>,
    pub session_id: Option<SessionId>,
    pub tab_id: Option<String>,
}

impl IdentitySnapshot {
    pub fn capture(ctx: Option<&BrowsingContext>) -> Self {
        let lock_id = get_or_create_tab_lock_id(ctx);
        let session_id = get_or_create_session_id(ctx);
        // The tab is identified by its lock id.
        let tab_id = lock_id.as_ref().map(|id| id.as_str().to_string());
        Self {
            lock_id,
            session_id,
            tab_id,
        }
    }

    pub fn into_options(self) -> LockOptions {
        LockOptions {
            lock_id: self.lock_id,
            session_id: self.session_id,
            tab_id: self.tab_id,
            ..Default::default()
        }
    }
}
