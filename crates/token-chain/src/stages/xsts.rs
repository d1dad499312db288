//! Stage 3: XSTS authorization for the game service relying party.

use async_trait::async_trait;
use tracing::debug;

use super::{Exchange, Stage, send};
use crate::error::StageError;
use crate::model::{
    UserHash, XboxUserToken, XstsAuthorization, XstsAuthorizeProperties, XstsAuthorizeRequest,
    XstsAuthorizeResponse, XstsToken,
};
use crate::proxy::ProxyLane;

#[derive(Debug, Clone)]
pub struct XstsExchange {
    url: String,
}

impl XstsExchange {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Exchange for XstsExchange {
    const STAGE: Stage = Stage::XstsToken;

    type Input = XboxUserToken;
    type Output = XstsAuthorization;

    async fn exchange(
        &self,
        user_token: XboxUserToken,
        lane: &ProxyLane,
    ) -> Result<XstsAuthorization, StageError> {
        let body = XstsAuthorizeRequest {
            properties: XstsAuthorizeProperties {
                sandbox_id: "RETAIL",
                user_tokens: [user_token.as_str()],
            },
            relying_party: "rp://api.minecraftservices.com/",
            token_type: "JWT",
        };

        debug!(proxy = %lane, "Requesting xsts token");
        let response = send(lane.client().post(&self.url).json(&body))
            .await?
            .ensure_success()?;

        let parsed: XstsAuthorizeResponse = response.decode()?;
        let Some(claim) = parsed.display_claims.xui.into_iter().next() else {
            return Err(StageError::malformed(
                "DisplayClaims.xui is empty",
                response.body,
            ));
        };

        Ok(XstsAuthorization {
            token: XstsToken::from(parsed.token),
            user_hash: UserHash::from(claim.uhs),
        })
    }
}
