//! 依網域名稱查詢 CIS 區域。

use reqwest::{blocking::Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::{
    config::{Config, ConfigError},
    token::AccessToken,
};

/// 查詢 CIS 區域時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Zone lookup for {domain} failed with status {status}")]
    Lookup {
        domain: String,
        status: StatusCode,
        body: String,
    },
    #[error("Couldn't find zone id for domain {domain}")]
    NotFound { domain: String, body: String },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

type Result<T> = std::result::Result<T, ZoneError>;

/// CIS 中與網域對應的 DNS 區域。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ZoneListResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Vec<Zone>,
}

/// 依網域名稱查詢 CIS 區域。
#[derive(Debug, Clone)]
pub struct ZoneResolver {
    client: Client,
    config: Config,
}

impl ZoneResolver {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    /// 取得 `domain` 對應的啟用中區域。
    ///
    /// 以完整名稱比對、只取一筆、依狀態遞減排序；需要 HTTP 200、`success: true`
    /// 且至少一筆結果，否則回傳錯誤。
    pub fn get_zone_id(&self, domain: &str, token: &AccessToken) -> Result<Zone> {
        debug!(domain = %domain, "Looking up CIS zone id");

        let url = self.config.cis_endpoint(&["zones"])?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("name", domain),
                ("status", "active"),
                ("page", "1"),
                ("per_page", "1"),
                ("order", "status"),
                ("direction", "desc"),
                ("match", "all"),
            ])
            .header("X-Auth-User-Token", token.as_str())
            .header("Content-Type", "application/json")
            .send()
            .inspect_err(|e| error!(domain = %domain, error = %e, "Couldn't reach CIS zone API"))?;

        let status = response.status();
        let body = response.text()?;

        if status != StatusCode::OK {
            error!(domain = %domain, status = %status, body = %body, "Couldn't find zone id");
            return Err(ZoneError::Lookup {
                domain: domain.to_owned(),
                status,
                body,
            });
        }

        let zone = serde_json::from_str::<ZoneListResponse>(&body)
            .ok()
            .filter(|r| r.success)
            .and_then(|r| r.result.into_iter().next());

        match zone {
            Some(zone) => {
                debug!(domain = %domain, zone_id = %zone.id, zone_status = %zone.status, "Resolved CIS zone");
                Ok(zone)
            }
            None => {
                error!(domain = %domain, body = %body, "Couldn't find zone id");
                Err(ZoneError::NotFound {
                    domain: domain.to_owned(),
                    body,
                })
            }
        }
    }
}
