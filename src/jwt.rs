//! 以 `jsonwebtoken` 解碼通知 JWT：未驗證的讀取只用於授權檢查，
//! 驗證則以發送實例的 PEM 公鑰進行。

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// `exp` 與 `nbf` 檢查時容許的時鐘誤差（秒）。
pub const CLOCK_LEEWAY_SECS: u64 = 60;

/// 表示與 JWT 解碼及驗證相關的錯誤。
#[derive(Debug, Error)]
pub enum JwtError {
    /// 不接受以公鑰驗證的演算法，例如 HS256。
    #[error("Unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    /// PEM 無法解析，或金鑰類型與演算法不符。
    #[error("Invalid public key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),
    #[error("{0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

type Result<T> = std::result::Result<T, JwtError>;

/// 不驗證簽名直接解碼 claims。
///
/// 結果不可作為信任依據，只能用來決定要向哪個實例取得公鑰。
pub fn decode_unverified<T: DeserializeOwned>(token: &str) -> Result<T> {
    let header = decode_header(token)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    Ok(decode::<T>(token, &DecodingKey::from_secret(&[]), &validation)?.claims)
}

/// 以 PEM 公鑰驗證簽名並檢查 `exp`/`nbf`，成功後回傳 claims。
///
/// # 參數
///
/// - `token`: compact JWT 字串。
/// - `public_key_pem`: 發送者的公鑰，RSA 接受 SubjectPublicKeyInfo 或 PKCS#1。
///
/// # 回傳
///
/// 驗證通過的 claims；演算法、金鑰、簽名或時間檢查失敗時回傳 [`JwtError`]。
pub fn decode_verified<T: DeserializeOwned>(token: &str, public_key_pem: &[u8]) -> Result<T> {
    let header = decode_header(token)?;
    let key = decoding_key(header.alg, public_key_pem)?;

    let mut validation = Validation::new(header.alg);
    validation.required_spec_claims.clear();
    validation.leeway = CLOCK_LEEWAY_SECS;
    validation.validate_nbf = true;
    validation.validate_aud = false;

    Ok(decode::<T>(token, &key, &validation)?.claims)
}

/// 依演算法家族解析公鑰；對稱式演算法一律拒絕。
fn decoding_key(alg: Algorithm, pem: &[u8]) -> Result<DecodingKey> {
    let key = match alg {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem),
        Algorithm::EdDSA => DecodingKey::from_ed_pem(pem),
        other => return Err(JwtError::UnsupportedAlgorithm(other)),
    };
    key.map_err(JwtError::InvalidKey)
}
