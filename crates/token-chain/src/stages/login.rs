//! Stage 4: exchange the XSTS pair for the game-service access token.
//!
//! This endpoint throttles aggressively, so the call runs under the
//! configured [`RetryPolicy`]: HTTP 429 and transient resolver failures are
//! retried, everything else ends the task.

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Exchange, Stage, send};
use crate::error::StageError;
use crate::model::{
    LoginWithXboxRequest, LoginWithXboxResponse, MinecraftToken, XstsAuthorization,
};
use crate::proxy::ProxyLane;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

#[derive(Debug, Clone)]
pub struct MinecraftLoginExchange {
    url: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl MinecraftLoginExchange {
    pub fn new(url: impl Into<String>, retry: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            url: url.into(),
            retry,
            cancel,
        }
    }

    async fn attempt(&self, identity_token: &str, lane: &ProxyLane) -> RetryAction<MinecraftToken> {
        let body = LoginWithXboxRequest { identity_token };
        let response = match send(lane.client().post(&self.url).json(&body)).await {
            Ok(response) => response,
            Err(err) if err.is_throttle() => return RetryAction::Retry(err),
            Err(err) => return RetryAction::Fail(err),
        };

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            return RetryAction::Retry(StageError::upstream(response.status, response.body));
        }
        if response.status != StatusCode::OK {
            warn!(status = %response.status, body = %response.body, "login_with_xbox rejected");
            return RetryAction::Fail(StageError::upstream(response.status, response.body));
        }

        match response.decode::<LoginWithXboxResponse>() {
            Ok(parsed) => RetryAction::Success(MinecraftToken::from(parsed.access_token)),
            Err(err) => {
                warn!(body = %response.body, "login_with_xbox returned an unusable body");
                RetryAction::Fail(err)
            }
        }
    }
}

#[async_trait]
impl Exchange for MinecraftLoginExchange {
    const STAGE: Stage = Stage::MinecraftToken;

    type Input = XstsAuthorization;
    type Output = MinecraftToken;

    async fn exchange(
        &self,
        pair: XstsAuthorization,
        lane: &ProxyLane,
    ) -> Result<MinecraftToken, StageError> {
        let identity_token = pair.identity_token();
        debug!(proxy = %lane, "Requesting minecraft token");

        retry_with_backoff(&self.retry, &self.cancel, |_| {
            self.attempt(&identity_token, lane)
        })
        .await
    }
}
