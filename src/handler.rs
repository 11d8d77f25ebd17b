//! 通知處理入口：驗證通知、依事件類型分派，並把所有錯誤統一轉成回應。

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    challenge::{ChallengeError, ChallengeRecordManager},
    config::{Config, ConfigError},
    dns_record::CreateOutcome,
    notification::{EventType, NotificationError, NotificationVerifier},
};

/// 處理流程中任何一步的錯誤。
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Challenge(#[from] ChallengeError),
}

impl HandlerError {
    /// 授權失敗為 403，其餘為 500。
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Notification(e) => e.status_code(),
            Self::Challenge(e) => e.status_code(),
        }
    }
}

/// 單次呼叫的輸入參數。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvocationParams {
    /// Certificate Manager 簽出的通知（compact JWT）。
    #[serde(default)]
    pub data: String,
    /// 允許呼叫的 Certificate Manager 實例 CRN；值依 JSON truthiness 判斷，
    /// 缺少或非物件時視為空清單。
    #[serde(
        default,
        rename = "allowedCertificateManagerCRNs",
        deserialize_with = "truthy_flags"
    )]
    pub allowed_certificate_manager_crns: HashMap<String, bool>,
    #[serde(default, rename = "iamApiKey")]
    pub iam_api_key: Option<String>,
}

fn truthy_flags<'de, D>(deserializer: D) -> Result<HashMap<String, bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(crn, value)| (crn, is_truthy(&value)))
            .collect(),
        _ => HashMap::new(),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// 回傳給呼叫平台的回應。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl Response {
    pub fn success() -> Self {
        Self::new(200, json!({}))
    }

    pub fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(status_code, json!({ "message": message.into() }))
    }

    fn new(status_code: u16, body: Value) -> Self {
        Self {
            status_code,
            headers: BTreeMap::from([("Content-Type".to_owned(), "application/json".to_owned())]),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// 一次成功處理的結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    ChallengeSet(CreateOutcome),
    ChallengeRemoved(usize),
    /// 不處理的事件類型。
    Ignored(String),
}

/// 通知處理器。
pub struct Handler {
    verifier: NotificationVerifier,
    challenges: ChallengeRecordManager,
}

impl Handler {
    /// 驗證設定並建立處理器，所有元件共用同一個 HTTP 用戶端。
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = config.build_client()?;

        Ok(Self {
            verifier: NotificationVerifier::new(client.clone(), config.clone()),
            challenges: ChallengeRecordManager::new(client, config),
        })
    }

    pub fn with_components(
        verifier: NotificationVerifier,
        challenges: ChallengeRecordManager,
    ) -> Self {
        Self {
            verifier,
            challenges,
        }
    }

    /// 處理一次呼叫；成功回傳 200，失敗回傳帶有狀態碼與訊息的回應。
    pub fn handle(&self, params: &InvocationParams) -> Response {
        match self.process(params) {
            Ok(dispatch) => {
                debug!(?dispatch, "Notification handled");
                Response::success()
            }
            Err(e) => {
                error!(status = e.status_code(), error = %e, "Action failed");
                Response::failure(e.status_code(), e.to_string())
            }
        }
    }

    /// 驗證通知並依事件類型分派。驗章失敗時不會進入分派。
    pub fn process(&self, params: &InvocationParams) -> Result<Dispatch, HandlerError> {
        let notification = self
            .verifier
            .verify(&params.data, &params.allowed_certificate_manager_crns)?;
        let api_key = params.iam_api_key.as_deref();

        let dispatch = match notification.event() {
            EventType::DomainValidationRequired => {
                Dispatch::ChallengeSet(self.challenges.set_challenge(&notification, api_key)?)
            }
            EventType::DomainValidationCompleted => {
                Dispatch::ChallengeRemoved(self.challenges.remove_challenge(&notification, api_key)?)
            }
            EventType::Other(event_type) => {
                debug!(event_type = %event_type, "Ignoring event type");
                Dispatch::Ignored(event_type)
            }
        };

        info!(instance_crn = %notification.instance_crn, ?dispatch, "Notification processed");
        Ok(dispatch)
    }
}
