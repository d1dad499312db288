//! Values flowing between stages and the wire schemas of the four providers.
//!
//! Request structs declare their fields in lexical order. The providers were
//! historically fed maps serialized with sorted keys, so keeping that order
//! keeps the request bytes identical.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! secret_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(<{} chars>)"), self.0.len())
            }
        }
    };
}

secret_string!(
    /// Long-lived refresh credential supplied by the operator.
    Credential
);
secret_string!(
    /// Microsoft account access token (stage 1 output).
    LiveAccessToken
);
secret_string!(
    /// Xbox Live user token (stage 2 output).
    XboxUserToken
);
secret_string!(
    /// XSTS token, first half of the authorization pair.
    XstsToken
);
secret_string!(
    /// User hash from the XSTS display claims.
    UserHash
);
secret_string!(
    /// Game-service access token, the terminal artifact.
    MinecraftToken
);

/// Token and user hash returned together by the XSTS stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XstsAuthorization {
    pub token: XstsToken,
    pub user_hash: UserHash,
}

impl XstsAuthorization {
    /// `XBL3.0 x=<uhs>;<token>`
    pub fn identity_token(&self) -> String {
        format!(
            "XBL3.0 x={};{}",
            self.user_hash.as_str(),
            self.token.as_str()
        )
    }
}

/// A stage item together with the 1-based ordinal of the credential it
/// descends from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracked<T> {
    pub origin: usize,
    pub value: T,
}

impl<T> Tracked<T> {
    pub fn new(origin: usize, value: T) -> Self {
        Self { origin, value }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tracked<U> {
        Tracked {
            origin: self.origin,
            value: f(self.value),
        }
    }
}

// --- Stage 1: OAuth2 refresh grant ---

#[derive(Debug, Serialize)]
pub(crate) struct RefreshGrantForm<'a> {
    pub client_id: &'a str,
    pub grant_type: &'static str,
    pub redirect_uri: &'a str,
    pub refresh_token: &'a str,
    pub scope: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LiveTokenResponse {
    pub access_token: Option<String>,
    pub error_description: Option<String>,
}

// --- Stage 2: Xbox Live user authentication ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct XboxUserAuthRequest<'a> {
    pub properties: XboxUserAuthProperties<'a>,
    pub relying_party: &'static str,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct XboxUserAuthProperties<'a> {
    pub auth_method: &'static str,
    pub rps_ticket: &'a str,
    pub site_name: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct XboxUserAuthResponse {
    pub token: String,
}

// --- Stage 3: XSTS authorization ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct XstsAuthorizeRequest<'a> {
    pub properties: XstsAuthorizeProperties<'a>,
    pub relying_party: &'static str,
    pub token_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct XstsAuthorizeProperties<'a> {
    pub sandbox_id: &'static str,
    pub user_tokens: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct XstsAuthorizeResponse {
    pub token: String,
    pub display_claims: DisplayClaims,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DisplayClaims {
    pub xui: Vec<UserClaim>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserClaim {
    pub uhs: String,
}

// --- Stage 4: login with Xbox ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginWithXboxRequest<'a> {
    pub identity_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginWithXboxResponse {
    pub access_token: String,
}
