//! 單元測試共用的金鑰與簽章輔助函式。

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use openssl::{
    ec::{EcGroup, EcKey},
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
};
use serde_json::Value;

use crate::config::Config;

pub(crate) fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub(crate) fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

pub(crate) fn public_pem(key: &PKey<Private>) -> String {
    String::from_utf8(key.public_key_to_pem().unwrap()).unwrap()
}

/// 以 RS256 簽出 compact JWT。
pub(crate) fn sign_token(claims: &Value, key: &PKey<Private>) -> String {
    let pem = key.rsa().unwrap().private_key_to_pem().unwrap();
    encode(
        &Header::new(Algorithm::RS256),
        claims,
        &EncodingKey::from_rsa_pem(&pem).unwrap(),
    )
    .unwrap()
}

/// 所有端點都指向同一個模擬伺服器的設定。
pub(crate) fn mock_config(server: &mockito::Server) -> Config {
    Config {
        iam_token_url: format!("{}/identity/token", server.url()),
        certificate_manager_url: server.url(),
        cis_api_url: server.url(),
        cis_crn: "crn:v1:test:cis".to_owned(),
        request_timeout_secs: Some(10),
    }
}
