//! Stage 2: Xbox Live user authentication with the RPS ticket.

use async_trait::async_trait;
use tracing::debug;

use super::{Exchange, Stage, send};
use crate::error::StageError;
use crate::model::{
    LiveAccessToken, XboxUserAuthProperties, XboxUserAuthRequest, XboxUserAuthResponse,
    XboxUserToken,
};
use crate::proxy::ProxyLane;

const XBL_CONTRACT_VERSION_HEADER: &str = "x-xbl-contract-version";

#[derive(Debug, Clone)]
pub struct XboxUserExchange {
    url: String,
}

impl XboxUserExchange {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Exchange for XboxUserExchange {
    const STAGE: Stage = Stage::XboxUserToken;

    type Input = LiveAccessToken;
    type Output = XboxUserToken;

    async fn exchange(
        &self,
        access_token: LiveAccessToken,
        lane: &ProxyLane,
    ) -> Result<XboxUserToken, StageError> {
        let body = XboxUserAuthRequest {
            properties: XboxUserAuthProperties {
                auth_method: "RPS",
                rps_ticket: access_token.as_str(),
                site_name: "user.auth.xboxlive.com",
            },
            relying_party: "http://auth.xboxlive.com",
            token_type: "JWT",
        };

        debug!(proxy = %lane, "Requesting xbox live token");
        let request = lane
            .client()
            .post(&self.url)
            .header(XBL_CONTRACT_VERSION_HEADER, "0")
            .json(&body);
        let response = send(request).await?.ensure_success()?;

        let parsed: XboxUserAuthResponse = response.decode()?;
        Ok(XboxUserToken::from(parsed.token))
    }
}
