//! 驗證 Certificate Manager 送來的簽章通知。
//!
//! 流程：先在不驗證的情況下解碼取得 `instance_crn`，確認該實例在允許清單中，
//! 再向 Certificate Manager 取得該實例的公鑰並驗章。未經驗證的內容只用來決定
//! 公鑰的來源與做授權檢查。

use std::collections::HashMap;

use reqwest::{blocking::Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    config::{Config, ConfigError},
    jwt::{self, JwtError},
};

/// 需要建立 DNS 驗證記錄的事件。
pub const EVENT_DOMAIN_VALIDATION_REQUIRED: &str = "cert_domain_validation_required";
/// DNS 驗證完成、可以清除記錄的事件。
pub const EVENT_DOMAIN_VALIDATION_COMPLETED: &str = "cert_domain_validation_completed";

/// 通知驗證過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Couldn't decode notification: {0}")]
    Decode(#[source] JwtError),
    /// 發送實例不在允許清單中；回應只帶 `Unauthorized`，CRN 僅寫入日誌。
    #[error("Unauthorized")]
    InstanceNotAllowed(String),
    #[error("Couldn't get the public key for instance {instance_crn}")]
    KeyFetch {
        instance_crn: String,
        status: StatusCode,
        body: String,
    },
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid public key response: {0}")]
    InvalidKeyResponse(#[from] serde_json::Error),
    #[error("Notification verification failed: {0}")]
    Verify(#[source] JwtError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl NotificationError {
    /// 對應到回應的 HTTP 狀態碼；未授權的實例為 403，其餘為 500。
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InstanceNotAllowed(_) => 403,
            _ => 500,
        }
    }
}

type Result<T> = std::result::Result<T, NotificationError>;

/// 通知事件類型；未知的類型保留原字串。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    DomainValidationRequired,
    DomainValidationCompleted,
    Other(String),
}

impl EventType {
    pub fn parse(s: &str) -> Self {
        match s {
            EVENT_DOMAIN_VALIDATION_REQUIRED => Self::DomainValidationRequired,
            EVENT_DOMAIN_VALIDATION_COMPLETED => Self::DomainValidationCompleted,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::DomainValidationRequired => EVENT_DOMAIN_VALIDATION_REQUIRED,
            Self::DomainValidationCompleted => EVENT_DOMAIN_VALIDATION_COMPLETED,
            Self::Other(s) => s,
        }
    }
}

/// DNS-01 驗證所需的 TXT 記錄資料。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChallengeData {
    pub txt_record_name: String,
    pub txt_record_val: String,
}

/// 驗章後的通知內容。
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    /// 缺少時為空字串，視為不處理的事件類型。
    #[serde(default)]
    pub event_type: String,
    /// 可能帶有 `*.` 萬用字元前綴。
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub instance_crn: String,
    #[serde(default)]
    pub challenge: Option<ChallengeData>,
}

impl Notification {
    pub fn event(&self) -> EventType {
        EventType::parse(&self.event_type)
    }
}

#[derive(Deserialize)]
struct SenderClaims {
    instance_crn: Option<String>,
}

#[derive(Deserialize)]
struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    public_key: String,
}

/// 負責授權檢查、取得公鑰與驗章。
#[derive(Debug, Clone)]
pub struct NotificationVerifier {
    client: Client,
    config: Config,
}

impl NotificationVerifier {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    /// 驗證通知並回傳可信任的內容。
    ///
    /// # 參數
    ///
    /// - `raw`: compact JWT 字串。
    /// - `allowed`: 允許的 Certificate Manager 實例 CRN，值為 `true` 才算允許。
    ///
    /// # 回傳
    ///
    /// 成功時回傳 [`Notification`]；實例不在允許清單時回傳
    /// [`NotificationError::InstanceNotAllowed`]，且不會發出任何網路請求。
    pub fn verify(&self, raw: &str, allowed: &HashMap<String, bool>) -> Result<Notification> {
        let raw = raw.trim();
        let instance_crn = authorize_sender(raw, allowed)?;

        let public_key = self.fetch_public_key(&instance_crn)?;
        let notification: Notification = jwt::decode_verified(raw, public_key.as_bytes())
            .map_err(|e| {
                error!(instance_crn = %instance_crn, error = %e, "Notification verification failed");
                NotificationError::Verify(e)
            })?;

        info!(
            instance_crn = %notification.instance_crn,
            event_type = %notification.event_type,
            domain = %notification.domain,
            "Notification verified"
        );
        Ok(notification)
    }

    /// 取得指定實例的 PEM 公鑰。
    pub fn fetch_public_key(&self, instance_crn: &str) -> Result<String> {
        let mut url = self.config.certificate_manager_endpoint(&[
            "api",
            "v1",
            "instances",
            instance_crn,
            "notifications",
            "publicKey",
        ])?;
        url.query_pairs_mut().append_pair("keyFormat", "pem");
        debug!(url = %url, "Fetching notification public key");

        let response = self
            .client
            .get(url)
            .header("Cache-Control", "no-cache")
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if status != StatusCode::OK {
            error!(
                instance_crn = %instance_crn,
                status = %status,
                body = %body,
                "Couldn't get the public key"
            );
            return Err(NotificationError::KeyFetch {
                instance_crn: instance_crn.to_owned(),
                status,
                body,
            });
        }

        let parsed: PublicKeyResponse = serde_json::from_str(&body)?;
        Ok(parsed.public_key)
    }
}

/// 從未驗證的 claims 取出 `instance_crn` 並檢查允許清單。
fn authorize_sender(raw: &str, allowed: &HashMap<String, bool>) -> Result<String> {
    let sender: SenderClaims = jwt::decode_unverified(raw).map_err(NotificationError::Decode)?;
    let instance_crn = sender.instance_crn.unwrap_or_default();

    if allowed.get(&instance_crn).copied().unwrap_or(false) {
        Ok(instance_crn)
    } else {
        error!(
            instance_crn = %instance_crn,
            "Certificate Manager instance is not allowed to invoke this action"
        );
        Err(NotificationError::InstanceNotAllowed(instance_crn))
    }
}
