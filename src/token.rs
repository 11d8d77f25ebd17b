//! 以 IAM API 金鑰換取存取權杖。

use std::fmt;

use reqwest::{blocking::Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::{Config, ConfigError};

/// IAM 以 API 金鑰換取權杖時使用的 grant type。
pub const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// 取得存取權杖時可能發生的錯誤。
#[derive(Error, Debug)]
pub enum TokenError {
    /// 無法連線到 IAM。
    #[error("Failed to make request: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// IAM 回應非 200，或回應中沒有 `access_token`。
    #[error("IAM rejected the token request: {status}")]
    Rejected { status: StatusCode, body: String },
    /// 回應內容不是合法的 JSON。
    #[error("Invalid token response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

type Result<T> = std::result::Result<T, TokenError>;

/// 短期有效的 bearer 權杖。
///
/// `Debug` 輸出不會包含權杖內容，避免寫入日誌。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// 定義以 API 金鑰取得存取權杖的行為。
pub trait TokenSourceT: Send + Sync {
    /// 以 `api_key` 換取一個新的存取權杖，不做任何快取。
    fn obtain_access_token(&self, api_key: &str) -> Result<AccessToken>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// 透過 IAM 權杖端點取得權杖的實作。
#[derive(Debug, Clone)]
pub struct IamTokenSource {
    client: Client,
    config: Config,
}

impl IamTokenSource {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }
}

impl TokenSourceT for IamTokenSource {
    /// 以表單 POST 呼叫 IAM，成功條件為 HTTP 200 且回應含非空的 `access_token`。
    fn obtain_access_token(&self, api_key: &str) -> Result<AccessToken> {
        let url = self.config.iam_token_endpoint()?;
        debug!(url = %url, "Requesting IAM access token");

        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", APIKEY_GRANT_TYPE),
                ("apikey", api_key),
                ("response_type", "cloud_iam"),
            ])
            .send()
            .inspect_err(|e| error!(error = %e, "Couldn't reach IAM to obtain access token"))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text()?;

        if status != StatusCode::OK {
            error!(
                status = %status,
                headers = ?headers,
                body = %body,
                "Couldn't obtain access token"
            );
            return Err(TokenError::Rejected { status, body });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .inspect_err(|e| error!(error = %e, "IAM returned a malformed token response"))?;

        match parsed.access_token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(AccessToken(token)),
            None => {
                error!(status = %status, "IAM response has no access_token");
                Err(TokenError::Rejected { status, body })
            }
        }
    }
}

/// 回傳固定權杖的實作，適用於測試或已預先取得權杖的情境。
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(value),
        }
    }
}

impl TokenSourceT for StaticTokenSource {
    fn obtain_access_token(&self, _api_key: &str) -> Result<AccessToken> {
        Ok(self.token.clone())
    }
}
