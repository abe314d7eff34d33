use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

use super::{AccessToken, TokenSource};
use crate::errors::RelayError;

pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Keeps the last token of an inner source until shortly before it expires.
///
/// The slot is locked across the inner call so concurrent requests share a
/// single refresh. A failed refresh leaves the slot empty.
pub struct CachedTokenSource {
    inner: Arc<dyn TokenSource>,
    refresh_margin: Duration,
    slot: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    api_key: String,
    token: AccessToken,
    fresh_until: Instant,
}

impl CachedTokenSource {
    pub fn new(inner: Arc<dyn TokenSource>) -> Self {
        Self::with_margin(inner, DEFAULT_REFRESH_MARGIN)
    }

    pub fn with_margin(inner: Arc<dyn TokenSource>, refresh_margin: Duration) -> Self {
        Self {
            inner,
            refresh_margin,
            slot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for CachedTokenSource {
    fn name(&self) -> &str {
        "cached"
    }

    async fn acquire(&self, api_key: &str) -> Result<AccessToken, RelayError> {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();

        if let Some(cached) = slot.as_ref() {
            if cached.api_key == api_key && cached.fresh_until > now {
                debug!(source = self.inner.name(), "access token served from cache");
                return Ok(cached.token.clone());
            }
        }

        *slot = None;
        let token = self.inner.acquire(api_key).await?;

        if let Some(lifetime) = token.expires_in {
            if let Some(usable) = lifetime.checked_sub(self.refresh_margin) {
                if !usable.is_zero() {
                    *slot = Some(CachedToken {
                        api_key: api_key.to_owned(),
                        token: token.clone(),
                        fresh_until: Instant::now() + usable,
                    });
                }
            }
        }

        Ok(token)
    }
}
