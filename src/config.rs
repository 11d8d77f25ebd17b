//! 執行時設定：各服務端點與 HTTP 用戶端參數。
//!
//! 所有元件都在建構時取得一份 [`Config`]，而不是讀取模組層級的常數，
//! 因此測試可以把端點指向本機的模擬伺服器。

use std::{env, fs, io, path::Path, time::Duration};

use reqwest::{blocking::Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// IAM 取得存取權杖的預設端點。
pub const DEFAULT_IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";
/// Certificate Manager API 的預設端點（us-south 區域）。
pub const DEFAULT_CERTIFICATE_MANAGER_URL: &str =
    "https://us-south.certificate-manager.cloud.ibm.com";
/// CIS API 的預設端點。
pub const DEFAULT_CIS_API_URL: &str = "https://api.cis.cloud.ibm.com";

const ENV_IAM_TOKEN_URL: &str = "RACME_IAM_TOKEN_URL";
const ENV_CERTIFICATE_MANAGER_URL: &str = "RACME_CERTIFICATE_MANAGER_URL";
const ENV_CIS_API_URL: &str = "RACME_CIS_API_URL";
const ENV_CIS_CRN: &str = "RACME_CIS_CRN";
const ENV_REQUEST_TIMEOUT_SECS: &str = "RACME_REQUEST_TIMEOUT_SECS";

/// 設定載入、驗證與 URL 組合時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("URL cannot take path segments: {0}")]
    CannotBeABase(String),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// 處理器的完整設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IAM 權杖端點。
    pub iam_token_url: String,
    /// Certificate Manager API 基底 URL，用於取得通知公鑰。
    pub certificate_manager_url: String,
    /// CIS API 基底 URL。
    pub cis_api_url: String,
    /// 管理 DNS 區域的 CIS 實例 CRN。
    pub cis_crn: String,
    /// 單一 HTTP 請求的逾時秒數；`None` 表示不設限，由呼叫端控制整體期限。
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iam_token_url: DEFAULT_IAM_TOKEN_URL.to_owned(),
            certificate_manager_url: DEFAULT_CERTIFICATE_MANAGER_URL.to_owned(),
            cis_api_url: DEFAULT_CIS_API_URL.to_owned(),
            cis_crn: String::new(),
            request_timeout_secs: None,
        }
    }
}

impl Config {
    /// 從 JSON 檔案讀取設定，未列出的欄位使用預設值。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// 以預設值為基礎，套用環境變數覆寫。
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// 以 `RACME_*` 環境變數覆寫目前的設定。
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// 以任意查找函式覆寫設定；空字串視為未設定。
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_IAM_TOKEN_URL) {
            self.iam_token_url = v;
        }
        if let Some(v) = get(ENV_CERTIFICATE_MANAGER_URL) {
            self.certificate_manager_url = v;
        }
        if let Some(v) = get(ENV_CIS_API_URL) {
            self.cis_api_url = v;
        }
        if let Some(v) = get(ENV_CIS_CRN) {
            self.cis_crn = v;
        }
        if let Some(v) = get(ENV_REQUEST_TIMEOUT_SECS) {
            let secs = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_REQUEST_TIMEOUT_SECS,
                value: v.clone(),
            })?;
            self.request_timeout_secs = Some(secs);
        }

        Ok(())
    }

    /// 檢查設定是否可用：CIS CRN 必須存在，所有端點必須是可加入路徑的 URL。
    pub fn validate(&self) -> Result<()> {
        if self.cis_crn.trim().is_empty() {
            return Err(ConfigError::Missing("cis_crn"));
        }
        for url in [
            &self.iam_token_url,
            &self.certificate_manager_url,
            &self.cis_api_url,
        ] {
            endpoint(url, &[])?;
        }
        Ok(())
    }

    /// 依設定建立阻塞式 HTTP 用戶端。
    pub fn build_client(&self) -> Result<Client> {
        Ok(Client::builder()
            .timeout(self.request_timeout_secs.map(Duration::from_secs))
            .build()?)
    }

    /// IAM 權杖端點 URL。
    pub(crate) fn iam_token_endpoint(&self) -> Result<Url> {
        endpoint(&self.iam_token_url, &[])
    }

    /// Certificate Manager 之下的端點，每個片段都會經過百分比編碼。
    pub(crate) fn certificate_manager_endpoint(&self, segments: &[&str]) -> Result<Url> {
        endpoint(&self.certificate_manager_url, segments)
    }

    /// `{cis_api_url}/v1/{cis_crn}/...` 形式的 CIS 端點。
    pub(crate) fn cis_endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut all = Vec::with_capacity(segments.len() + 2);
        all.push("v1");
        all.push(self.cis_crn.as_str());
        all.extend_from_slice(segments);
        endpoint(&self.cis_api_url, &all)
    }
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| ConfigError::InvalidUrl {
        url: base.to_owned(),
        reason: e.to_string(),
    })?;
    if !segments.is_empty() {
        url.path_segments_mut()
            .map_err(|_| ConfigError::CannotBeABase(base.to_owned()))?
            .pop_if_empty()
            .extend(segments);
    } else if url.cannot_be_a_base() {
        return Err(ConfigError::CannotBeABase(base.to_owned()));
    }
    Ok(url)
}
