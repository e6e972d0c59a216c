//! Access token cache with a refresh margin.
//!
//! Readers take the fast path under a read lock. Refresh happens under the
//! write lock after a second validity check, so concurrent callers trigger
//! one refresh. If refresh fails while the old token has not yet expired,
//! the old token is used.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the provider reports an unusable expiry.
const FALLBACK_TTL: Duration = Duration::from_secs(50 * 60);

pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    fn unexpired(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            slot: RwLock::new(None),
        }
    }

    /// Drop the cached token, e.g. after the server reports it expired.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    pub async fn get_token(&self) -> FirestoreResult<String> {
        if let Some(cached) = self.slot.read().await.as_ref().filter(|t| t.fresh()) {
            return Ok(cached.value.clone());
        }

        let mut slot = self.slot.write().await;
        if let Some(cached) = slot.as_ref().filter(|t| t.fresh()) {
            return Ok(cached.value.clone());
        }

        match self.provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let value = token.as_str().to_string();
                let remaining = token.expires_at() - Utc::now();
                let expires_at = if remaining > chrono::Duration::zero() {
                    Instant::now() + remaining.to_std().unwrap_or(FALLBACK_TTL)
                } else {
                    Instant::now()
                };

                *slot = Some(CachedToken {
                    value: value.clone(),
                    expires_at,
                });
                debug!("Refreshed Firestore access token");
                Ok(value)
            }
            Err(e) => match slot.as_ref().filter(|t| t.unexpired()) {
                Some(cached) => {
                    warn!("Token refresh failed, reusing unexpired token: {}", e);
                    Ok(cached.value.clone())
                }
                None => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_token_margin() {
        let soon = CachedToken {
            value: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!soon.fresh());
        assert!(soon.unexpired());

        let later = CachedToken {
            value: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert!(later.fresh());
    }
}
