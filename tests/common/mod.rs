#![allow(dead_code)]

use std::collections::HashMap;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use mockito::{Matcher, Mock, Server};
use openssl::{
    pkey::{PKey, Private},
    rsa::Rsa,
};
use racme_webhook::{config::Config, handler::InvocationParams};
use serde_json::{json, Value};

pub const INSTANCE_CRN: &str = "crn:v1:bluemix:public:cloudcerts:us-south:a/acct:abc::";
pub const CIS_CRN: &str = "crn:v1:test:cis";
pub const ZONES_PATH: &str = "/v1/crn:v1:test:cis/zones";
pub const RECORDS_PATH: &str = "/v1/crn:v1:test:cis/zones/zone-1/dns_records";

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

pub fn sign_token(claims: &Value, key: &PKey<Private>) -> String {
    let pem = key.rsa().unwrap().private_key_to_pem().unwrap();
    encode(
        &Header::new(Algorithm::RS256),
        claims,
        &EncodingKey::from_rsa_pem(&pem).unwrap(),
    )
    .unwrap()
}

pub fn claims(event_type: &str, domain: &str) -> Value {
    json!({
        "instance_crn": INSTANCE_CRN,
        "event_type": event_type,
        "domain": domain,
        "challenge": {"txt_record_name": "_acme-challenge", "txt_record_val": "tok123"},
    })
}

pub fn params(data: String, api_key: Option<&str>) -> InvocationParams {
    InvocationParams {
        data,
        allowed_certificate_manager_crns: HashMap::from([(INSTANCE_CRN.to_owned(), true)]),
        iam_api_key: api_key.map(str::to_owned),
    }
}

pub fn config(server: &Server) -> Config {
    Config {
        iam_token_url: format!("{}/identity/token", server.url()),
        certificate_manager_url: server.url(),
        cis_api_url: server.url(),
        cis_crn: CIS_CRN.to_owned(),
        request_timeout_secs: Some(10),
    }
}

pub fn key_mock(server: &mut Server, key: &PKey<Private>, hits: usize) -> Mock {
    let pem = String::from_utf8(key.public_key_to_pem().unwrap()).unwrap();
    server
        .mock(
            "GET",
            Matcher::Regex(r"^/api/v1/instances/.+/notifications/publicKey$".into()),
        )
        .match_query(Matcher::UrlEncoded("keyFormat".into(), "pem".into()))
        .with_status(200)
        .with_body(json!({ "publicKey": pem }).to_string())
        .expect(hits)
        .create()
}

pub fn token_mock(server: &mut Server, hits: usize) -> Mock {
    server
        .mock("POST", "/identity/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded(
                "grant_type".into(),
                "urn:ibm:params:oauth:grant-type:apikey".into(),
            ),
            Matcher::UrlEncoded("apikey".into(), "key".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"access_token":"tok","token_type":"Bearer","expires_in":3600}"#)
        .expect(hits)
        .create()
}

pub fn zone_mock(server: &mut Server, hits: usize) -> Mock {
    server
        .mock("GET", ZONES_PATH)
        .match_query(Matcher::UrlEncoded("name".into(), "foo.com".into()))
        .match_header("x-auth-user-token", "tok")
        .with_status(200)
        .with_body(r#"{"success":true,"result":[{"id":"zone-1","status":"active"}]}"#)
        .expect(hits)
        .create()
}

pub fn create_mock(server: &mut Server, hits: usize) -> Mock {
    server
        .mock("POST", RECORDS_PATH)
        .match_header("x-auth-user-token", "tok")
        .match_body(Matcher::Json(json!({
            "type": "TXT",
            "name": "_acme-challenge.foo.com",
            "content": "tok123",
            "ttl": 120,
        })))
        .with_status(200)
        .with_body(r#"{"success":true,"result":{"id":"r1"}}"#)
        .expect(hits)
        .create()
}
