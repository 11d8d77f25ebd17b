//! DNS-01 挑戰記錄：依通知建立或清除 `_acme-challenge` TXT 記錄。

use reqwest::blocking::Client;
use thiserror::Error;
use tracing::{error, info};

use crate::{
    config::Config,
    dns_record::{CreateOutcome, DnsRecordClient, RecordError},
    notification::Notification,
    token::{IamTokenSource, TokenError, TokenSourceT},
    zone::{ZoneError, ZoneResolver},
};

/// 定義與 DNS-01 挑戰記錄處理相關的錯誤類型。
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// 呼叫端未提供 IAM API 金鑰。
    #[error("Couldn't {0}. iamApiKey is missing")]
    MissingApiKey(&'static str),
    #[error("Notification for {0} carries no challenge data")]
    MissingChallenge(String),
    #[error("Notification carries no domain")]
    MissingDomain,
    #[error("Error obtaining access token")]
    Token(#[source] TokenError),
    #[error("{0}")]
    Zone(#[from] ZoneError),
    #[error("{0}")]
    Record(#[from] RecordError),
}

impl From<TokenError> for ChallengeError {
    fn from(e: TokenError) -> Self {
        ChallengeError::Token(e)
    }
}

impl ChallengeError {
    /// 缺少 API 金鑰為 403，其餘為 500。
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingApiKey(_) => 403,
            _ => 500,
        }
    }
}

type Result<T> = std::result::Result<T, ChallengeError>;

/// 去掉萬用字元憑證網域開頭的 `*.`。
pub fn strip_wildcard(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// 根據通知建立或清除 `_acme-challenge` TXT 記錄。
///
/// 每次操作都重新取得權杖並查詢區域，不保留任何狀態。
pub struct ChallengeRecordManager {
    tokens: Box<dyn TokenSourceT>,
    zones: ZoneResolver,
    records: DnsRecordClient,
}

impl ChallengeRecordManager {
    /// 使用 IAM 取得權杖的預設組合。
    pub fn new(client: Client, config: Config) -> Self {
        let tokens = IamTokenSource::new(client.clone(), config.clone());
        Self::with_token_source(Box::new(tokens), client, config)
    }

    /// 以自訂的權杖來源建立。
    pub fn with_token_source(tokens: Box<dyn TokenSourceT>, client: Client, config: Config) -> Self {
        Self {
            tokens,
            zones: ZoneResolver::new(client.clone(), config.clone()),
            records: DnsRecordClient::new(client, config),
        }
    }

    /// 建立挑戰 TXT 記錄 `<txt_record_name>.<domain>`，內容為 `txt_record_val`。
    ///
    /// 記錄已存在時視為成功，重複的通知不會導致失敗。
    ///
    /// # 參數
    ///
    /// - `notification`: 已驗證的 `cert_domain_validation_required` 通知。
    /// - `api_key`: IAM API 金鑰；缺少時在任何網路請求前回傳 403 錯誤。
    pub fn set_challenge(
        &self,
        notification: &Notification,
        api_key: Option<&str>,
    ) -> Result<CreateOutcome> {
        info!(domain = %notification.domain, challenge = ?notification.challenge, "Set challenge");
        let api_key = require_api_key(api_key, "set challenge")?;

        let domain = normalized_domain(notification)?;
        let challenge = notification.challenge.as_ref().ok_or_else(|| {
            error!(domain = %domain, "Notification carries no challenge data");
            ChallengeError::MissingChallenge(domain.to_owned())
        })?;

        let token = self.tokens.obtain_access_token(api_key)?;
        let zone = self.zones.get_zone_id(domain, &token)?;

        let name = format!("{}.{}", challenge.txt_record_name, domain);
        let outcome =
            self.records
                .create_txt_record(&zone.id, &name, &challenge.txt_record_val, &token)?;
        Ok(outcome)
    }

    /// 刪除 `_acme-challenge.<domain>` 下所有 TXT 記錄，回傳刪除筆數。
    ///
    /// 所有刪除同時進行且都會執行完畢；任何一筆失敗則整體失敗。
    pub fn remove_challenge(
        &self,
        notification: &Notification,
        api_key: Option<&str>,
    ) -> Result<usize> {
        info!(domain = %notification.domain, "Removing challenge TXT records");
        let api_key = require_api_key(api_key, "remove challenge TXT record")?;

        let domain = normalized_domain(notification)?;
        let token = self.tokens.obtain_access_token(api_key)?;
        let zone = self.zones.get_zone_id(domain, &token)?;

        let ids = self
            .records
            .list_acme_challenge_record_ids(&zone.id, domain, &token)?;
        if ids.is_empty() {
            info!(domain = %domain, "No challenge TXT records to remove");
            return Ok(0);
        }

        self.records.delete_records(&zone.id, &ids, &token)?;
        info!(domain = %domain, count = ids.len(), "Challenge TXT records removed");
        Ok(ids.len())
    }
}

fn require_api_key<'a>(api_key: Option<&'a str>, action: &'static str) -> Result<&'a str> {
    match api_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(key),
        None => {
            error!("Couldn't {}. iamApiKey is missing", action);
            Err(ChallengeError::MissingApiKey(action))
        }
    }
}

fn normalized_domain(notification: &Notification) -> Result<&str> {
    let domain = strip_wildcard(notification.domain.trim());
    if domain.is_empty() {
        error!(instance_crn = %notification.instance_crn, "Notification carries no domain");
        return Err(ChallengeError::MissingDomain);
    }
    Ok(domain)
}
