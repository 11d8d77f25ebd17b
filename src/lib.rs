//! # ACME DNS-01 Webhook Handler
//!
//! 本庫接收 Certificate Manager 送出的簽章通知，驗證其來源後，
//! 在 Cloud Internet Services (CIS) 上建立或清除 `_acme-challenge` TXT 記錄，
//! 以自動完成 DNS-01 網域驗證。
//!
//! - **handler**: 入口，負責驗證通知、依事件類型分派，並將所有錯誤統一轉為回應。
//! - **notification**: 允許清單檢查、取得實例公鑰與驗章。
//! - **token**: 以 IAM API 金鑰換取存取權杖。
//! - **zone** / **dns_record** / **challenge**: CIS 區域查詢與 TXT 記錄的建立、刪除。
//!
//! 每次呼叫都是獨立、無狀態的：權杖、公鑰與區域都在當次重新取得，不做任何快取。
//!
//! ## 示例
//!
//! ```no_run
//! use racme_webhook::{config::Config, handler::{Handler, InvocationParams}};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::from_env()?;
//!     config.cis_crn = "crn:v1:bluemix:public:internet-svcs:global:a/<account>:<instance>::".into();
//!
//!     let handler = Handler::new(config)?;
//!     let params: InvocationParams = serde_json::from_str(&std::fs::read_to_string("params.json")?)?;
//!
//!     let response = handler.handle(&params);
//!     println!("{}", serde_json::to_string(&response)?);
//!     Ok(())
//! }
//! ```

pub mod challenge;
pub mod config;
pub mod dns_record;
pub mod handler;
pub mod jwt;
pub mod notification;
pub mod token;
pub mod zone;

#[cfg(test)]
mod test_util;
