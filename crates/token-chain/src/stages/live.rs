//! Stage 1: OAuth2 refresh grant against the Microsoft account service.

use async_trait::async_trait;
use tracing::debug;

use super::{Exchange, Stage, send};
use crate::config::LiveOAuthConfig;
use crate::error::StageError;
use crate::model::{Credential, LiveAccessToken, LiveTokenResponse, RefreshGrantForm};
use crate::proxy::ProxyLane;

#[derive(Debug, Clone)]
pub struct LiveTokenExchange {
    url: String,
    oauth: LiveOAuthConfig,
}

impl LiveTokenExchange {
    pub fn new(url: impl Into<String>, oauth: LiveOAuthConfig) -> Self {
        Self {
            url: url.into(),
            oauth,
        }
    }
}

#[async_trait]
impl Exchange for LiveTokenExchange {
    const STAGE: Stage = Stage::LiveToken;

    type Input = Credential;
    type Output = LiveAccessToken;

    async fn exchange(
        &self,
        credential: Credential,
        lane: &ProxyLane,
    ) -> Result<LiveAccessToken, StageError> {
        let form = RefreshGrantForm {
            client_id: &self.oauth.client_id,
            grant_type: "refresh_token",
            redirect_uri: &self.oauth.redirect_uri,
            refresh_token: credential.as_str(),
            scope: &self.oauth.scope,
        };

        debug!(proxy = %lane, "Requesting access token");
        let response = send(lane.client().post(&self.url).form(&form))
            .await?
            .ensure_success()?;

        let parsed: LiveTokenResponse = response.decode()?;
        match parsed.access_token {
            Some(token) => Ok(LiveAccessToken::from(token)),
            None => Err(StageError::malformed(
                parsed
                    .error_description
                    .unwrap_or_else(|| "missing access_token".to_owned()),
                response.body,
            )),
        }
    }
}
