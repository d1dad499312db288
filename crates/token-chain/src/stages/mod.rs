//! The four token exchanges.
//!
//! Each exchange turns one input into one output with exactly one HTTP call
//! through the lane it was handed (the login stage may repeat that call while
//! throttled). Exchanges never touch shared state; the driver collects their
//! results.

use std::fmt;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StageError;
use crate::proxy::ProxyLane;

mod live;
mod login;
mod xbox;
mod xsts;

pub use live::LiveTokenExchange;
pub use login::MinecraftLoginExchange;
pub use xbox::XboxUserExchange;
pub use xsts::XstsExchange;

/// Position of an exchange in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    LiveToken,
    XboxUserToken,
    XstsToken,
    MinecraftToken,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::LiveToken,
        Stage::XboxUserToken,
        Stage::XstsToken,
        Stage::MinecraftToken,
    ];

    /// 1-based position.
    pub fn number(self) -> u8 {
        match self {
            Stage::LiveToken => 1,
            Stage::XboxUserToken => 2,
            Stage::XstsToken => 3,
            Stage::MinecraftToken => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::LiveToken => "access token",
            Stage::XboxUserToken => "xbox live token",
            Stage::XstsToken => "xsts token",
            Stage::MinecraftToken => "minecraft token",
        };
        f.write_str(name)
    }
}

/// One step of the chain.
#[async_trait]
pub trait Exchange: Send + Sync + 'static {
    const STAGE: Stage;

    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn exchange(
        &self,
        input: Self::Input,
        lane: &ProxyLane,
    ) -> Result<Self::Output, StageError>;
}

/// Status and body text of a completed HTTP exchange.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    /// Fails with [`StageError::Upstream`] on any non-2xx status.
    pub fn ensure_success(self) -> Result<Self, StageError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(StageError::upstream(self.status, self.body))
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StageError> {
        serde_json::from_str(&self.body)
            .map_err(|e| StageError::malformed(e.to_string(), self.body.clone()))
    }
}

/// Send `request` and read the whole body.
pub(crate) async fn send(request: RequestBuilder) -> Result<RawResponse, StageError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok(RawResponse { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize)]
    struct Probe {
        #[allow(dead_code)]
        access_token: String,
    }

    #[test]
    fn non_success_becomes_upstream_with_body() {
        let raw = RawResponse {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"error":"invalid_grant"}"#.to_owned(),
        };
        match raw.ensure_success() {
            Err(StageError::Upstream { status, body }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn missing_field_becomes_malformed() {
        let raw = RawResponse {
            status: StatusCode::OK,
            body: r#"{"token_type":"bearer"}"#.to_owned(),
        };
        let err = raw.decode::<Probe>().unwrap_err();
        assert!(matches!(err, StageError::Malformed { .. }));
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn html_body_becomes_malformed() {
        let raw = RawResponse {
            status: StatusCode::OK,
            body: "<html>gateway</html>".to_owned(),
        };
        assert!(matches!(
            raw.decode::<Probe>(),
            Err(StageError::Malformed { .. })
        ));
    }

    #[test]
    fn stages_are_numbered_in_order() {
        let numbers: Vec<u8> = Stage::ALL.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }
}
