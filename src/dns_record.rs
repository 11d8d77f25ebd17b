//! CIS DNS 記錄 API：建立、列出與刪除 TXT 記錄。

use std::thread;

use reqwest::{blocking::Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    config::{Config, ConfigError},
    token::AccessToken,
};

/// 驗證用 TXT 記錄的 TTL（秒）。
pub const CHALLENGE_TTL: u32 = 120;
/// ACME DNS-01 驗證記錄的固定前綴。
pub const ACME_CHALLENGE_PREFIX: &str = "_acme-challenge";
/// CIS 在記錄重複時回傳的錯誤訊息。
pub const RECORD_EXISTS_MESSAGE: &str = "The record already exists.";

/// DNS 記錄操作可能發生的錯誤。
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Couldn't add TXT record {name} to CIS: {status}")]
    Create {
        name: String,
        status: StatusCode,
        body: String,
    },
    #[error("Get all TXT records for {name} failed with status code: {status}")]
    List {
        name: String,
        status: StatusCode,
        body: String,
    },
    #[error("Invalid TXT record list response: {0}")]
    InvalidListResponse(#[from] serde_json::Error),
    #[error("Delete TXT record {id} failed with status code: {status}")]
    Delete {
        id: String,
        status: StatusCode,
        body: String,
    },
    #[error("Delete TXT record {0} did not complete")]
    DeleteAborted(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

type Result<T> = std::result::Result<T, RecordError>;

/// 建立 TXT 記錄的結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// CIS 回報記錄已存在，視為成功。
    AlreadyExists,
}

/// 建立 DNS 記錄的請求內容。
#[derive(Debug, Serialize)]
struct TxtRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
}

#[derive(Debug, Default, Deserialize)]
struct CisResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<CisError>,
}

#[derive(Debug, Deserialize)]
struct CisError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RecordListResponse {
    #[serde(default)]
    result: Vec<RecordItem>,
}

#[derive(Debug, Deserialize)]
struct RecordItem {
    id: String,
}

/// 驗證記錄的完整名稱：`_acme-challenge.<domain>`。
pub fn acme_challenge_name(domain: &str) -> String {
    format!("{}.{}", ACME_CHALLENGE_PREFIX, domain)
}

/// CIS DNS 記錄 API 用戶端。
#[derive(Debug, Clone)]
pub struct DnsRecordClient {
    client: Client,
    config: Config,
}

impl DnsRecordClient {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    /// 在 `zone_id` 下建立 TXT 記錄。
    ///
    /// HTTP 200 且 `success: true` 為建立成功；HTTP 400 且第一個錯誤訊息為
    /// [`RECORD_EXISTS_MESSAGE`] 時回傳 [`CreateOutcome::AlreadyExists`]；
    /// 其他情況皆為 [`RecordError::Create`]。
    pub fn create_txt_record(
        &self,
        zone_id: &str,
        name: &str,
        content: &str,
        token: &AccessToken,
    ) -> Result<CreateOutcome> {
        let url = self.config.cis_endpoint(&["zones", zone_id, "dns_records"])?;
        let record = TxtRecord {
            record_type: "TXT",
            name,
            content,
            ttl: CHALLENGE_TTL,
        };

        let response = self
            .client
            .post(url)
            .header("X-Auth-User-Token", token.as_str())
            .json(&record)
            .send()
            .inspect_err(|e| error!(name = %name, error = %e, "Couldn't add TXT record to CIS"))?;

        let status = response.status();
        let body = response.text()?;
        let parsed: CisResponse = serde_json::from_str(&body).unwrap_or_default();

        if status == StatusCode::OK && parsed.success {
            info!(name = %name, zone_id = %zone_id, "TXT record added to CIS");
            return Ok(CreateOutcome::Created);
        }
        if status == StatusCode::BAD_REQUEST
            && parsed
                .errors
                .first()
                .is_some_and(|e| e.message == RECORD_EXISTS_MESSAGE)
        {
            info!(name = %name, zone_id = %zone_id, "TXT record already in CIS");
            return Ok(CreateOutcome::AlreadyExists);
        }

        error!(name = %name, status = %status, body = %body, "Couldn't add TXT record to CIS");
        Err(RecordError::Create {
            name: name.to_owned(),
            status,
            body,
        })
    }

    /// 列出 `_acme-challenge.<domain>` 的所有 TXT 記錄 id。
    pub fn list_acme_challenge_record_ids(
        &self,
        zone_id: &str,
        domain: &str,
        token: &AccessToken,
    ) -> Result<Vec<String>> {
        let name = acme_challenge_name(domain);
        let url = self.config.cis_endpoint(&["zones", zone_id, "dns_records"])?;

        let response = self
            .client
            .get(url)
            .query(&[("type", "TXT"), ("name", name.as_str())])
            .header("X-Auth-User-Token", token.as_str())
            .header("Content-Type", "application/json")
            .send()
            .inspect_err(|e| error!(name = %name, error = %e, "Get all TXT records failed"))?;

        let status = response.status();
        let body = response.text()?;

        if status != StatusCode::OK {
            error!(name = %name, status = %status, body = %body, "Get all TXT records failed");
            return Err(RecordError::List { name, status, body });
        }

        let list: RecordListResponse = serde_json::from_str(&body)?;
        debug!(name = %name, count = list.result.len(), "Get all TXT records finished successfully");
        Ok(list.result.into_iter().map(|r| r.id).collect())
    }

    /// 刪除單筆記錄，HTTP 200 為成功。
    pub fn delete_record(&self, zone_id: &str, record_id: &str, token: &AccessToken) -> Result<()> {
        let url = self
            .config
            .cis_endpoint(&["zones", zone_id, "dns_records", record_id])?;

        let response = self
            .client
            .delete(url)
            .header("X-Auth-User-Token", token.as_str())
            .header("Content-Type", "application/json")
            .send()
            .inspect_err(|e| error!(record_id = %record_id, error = %e, "Delete TXT record failed"))?;

        let status = response.status();
        let body = response.text()?;

        if status != StatusCode::OK {
            error!(record_id = %record_id, status = %status, body = %body, "Delete TXT record failed");
            return Err(RecordError::Delete {
                id: record_id.to_owned(),
                status,
                body,
            });
        }

        info!(record_id = %record_id, zone_id = %zone_id, "Delete TXT record finished successfully");
        Ok(())
    }

    /// 同時刪除多筆記錄。
    ///
    /// 每筆刪除各自在一個執行緒中進行，任何一筆失敗都不會中止其他刪除；
    /// 全部結束後依 `record_ids` 的順序回傳第一個錯誤。
    pub fn delete_records(
        &self,
        zone_id: &str,
        record_ids: &[String],
        token: &AccessToken,
    ) -> Result<()> {
        let results: Vec<Result<()>> = thread::scope(|scope| {
            let handles: Vec<_> = record_ids
                .iter()
                .map(move |id| (id, scope.spawn(move || self.delete_record(zone_id, id, token))))
                .collect();

            handles
                .into_iter()
                .map(|(id, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(RecordError::DeleteAborted(id.clone())))
                })
                .collect()
        });

        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::test_util::mock_config;

    const RECORDS_PATH: &str = "/v1/crn:v1:test:cis/zones/zone-1/dns_records";

    fn records(server: &mockito::Server) -> DnsRecordClient {
        DnsRecordClient::new(Client::new(), mock_config(server))
    }

    fn token() -> AccessToken {
        AccessToken::new("tok")
    }

    #[test]
    fn test_create_txt_record() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", RECORDS_PATH)
            .match_header("x-auth-user-token", "tok")
            .match_body(Matcher::Json(json!({
                "type": "TXT",
                "name": "_acme-challenge.foo.com",
                "content": "tok123",
                "ttl": 120,
            })))
            .with_status(200)
            .with_body(r#"{"success":true,"result":{"id":"rec-1"}}"#)
            .create();

        let outcome = records(&server)
            .create_txt_record("zone-1", "_acme-challenge.foo.com", "tok123", &token())
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Created);
        mock.assert();
    }

    #[test]
    fn test_create_duplicate_is_success() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", RECORDS_PATH)
            .with_status(400)
            .with_body(r#"{"success":false,"errors":[{"code":81057,"message":"The record already exists."}]}"#)
            .create();

        let outcome = records(&server)
            .create_txt_record("zone-1", "_acme-challenge.foo.com", "tok123", &token())
            .unwrap();
        assert_eq!(outcome, CreateOutcome::AlreadyExists);
    }

    #[test]
    fn test_create_other_400_fails() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", RECORDS_PATH)
            .with_status(400)
            .with_body(r#"{"success":false,"errors":[{"code":1004,"message":"DNS Validation Error"}]}"#)
            .create();

        let err = records(&server)
            .create_txt_record("zone-1", "_acme-challenge.foo.com", "tok123", &token())
            .unwrap_err();
        assert!(matches!(err, RecordError::Create { status, .. } if status == StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_create_200_without_success_fails() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", RECORDS_PATH)
            .with_status(200)
            .with_body(r#"{"success":false}"#)
            .create();

        let err = records(&server)
            .create_txt_record("zone-1", "x.foo.com", "v", &token())
            .unwrap_err();
        assert!(matches!(err, RecordError::Create { .. }));
    }

    #[test]
    fn test_list_acme_challenge_record_ids() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", RECORDS_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("type".into(), "TXT".into()),
                Matcher::UrlEncoded("name".into(), "_acme-challenge.foo.com".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"success":true,"result":[{"id":"a","type":"TXT"},{"id":"b","type":"TXT"}]}"#)
            .create();

        let ids = records(&server)
            .list_acme_challenge_record_ids("zone-1", "foo.com", &token())
            .unwrap();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        mock.assert();
    }

    #[test]
    fn test_list_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", RECORDS_PATH)
            .match_query(Matcher::Any)
            .with_status(500)
            .create();

        let err = records(&server)
            .list_acme_challenge_record_ids("zone-1", "foo.com", &token())
            .unwrap_err();
        assert!(matches!(err, RecordError::List { ref name, .. } if name == "_acme-challenge.foo.com"));
    }

    #[test]
    fn test_delete_records_attempts_all() {
        let mut server = mockito::Server::new();
        let ok_a = server
            .mock("DELETE", format!("{}/a", RECORDS_PATH).as_str())
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .expect(1)
            .create();
        let bad = server
            .mock("DELETE", format!("{}/b", RECORDS_PATH).as_str())
            .with_status(500)
            .expect(1)
            .create();
        let ok_c = server
            .mock("DELETE", format!("{}/c", RECORDS_PATH).as_str())
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .expect(1)
            .create();

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = records(&server)
            .delete_records("zone-1", &ids, &token())
            .unwrap_err();

        assert!(matches!(err, RecordError::Delete { ref id, .. } if id == "b"));
        ok_a.assert();
        bad.assert();
        ok_c.assert();
    }

    #[test]
    fn test_delete_records_empty() {
        let server = mockito::Server::new();
        assert!(records(&server)
            .delete_records("zone-1", &[], &token())
            .is_ok());
    }

    #[test]
    fn test_acme_challenge_name() {
        assert_eq!(acme_challenge_name("example.com"), "_acme-challenge.example.com");
    }
}
