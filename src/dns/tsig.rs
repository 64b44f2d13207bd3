//! TSIG key material
//!
//! Secret generation, algorithm mapping for signed updates and rendering of
//! the `key { ... };` include file the nameserver loads.

use std::path::Path;
use std::str::FromStr;

use hickory_client::rr::rdata::tsig::TsigAlgorithm;
use hickory_client::rr::Name;
use hickory_proto::rr::dnssec::tsig::TSigner;
use lazy_static::lazy_static;
use rand::RngCore;
use regex::Regex;
use tracing::info;

use crate::dns::record::{NewTsigKey, TsigKey};
use crate::errors::{ConsoleError, Result};

lazy_static! {
    static ref KEY_NAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._-]{0,62}$").expect("Failed to compile TSIG key name regex");
}

pub const DEFAULT_ALGORITHM: &str = "hmac-sha256";

/// Allowed clock skew for signed messages, in seconds
pub const TSIG_FUDGE_SECS: u16 = 300;

pub const SUPPORTED_ALGORITHMS: [&str; 6] = [
    "hmac-md5",
    "hmac-sha1",
    "hmac-sha224",
    "hmac-sha256",
    "hmac-sha384",
    "hmac-sha512",
];

/// Map an algorithm name as written in BIND configuration
pub fn algorithm_from_name(name: &str) -> Result<TsigAlgorithm> {
    let algorithm = match name.trim_end_matches('.').to_ascii_lowercase().as_str() {
        "hmac-md5" | "hmac-md5.sig-alg.reg.int" => TsigAlgorithm::HmacMd5,
        "hmac-sha1" => TsigAlgorithm::HmacSha1,
        "hmac-sha224" => TsigAlgorithm::HmacSha224,
        "hmac-sha256" => TsigAlgorithm::HmacSha256,
        "hmac-sha384" => TsigAlgorithm::HmacSha384,
        "hmac-sha512" => TsigAlgorithm::HmacSha512,
        other => return Err(ConsoleError::validation(format!("Unsupported TSIG algorithm: {}", other))),
    };
    Ok(algorithm)
}

/// Secret length in bytes matching the digest size of the algorithm
fn secret_len(algorithm: &str) -> usize {
    match algorithm {
        "hmac-md5" => 16,
        "hmac-sha1" => 20,
        "hmac-sha224" => 28,
        "hmac-sha384" => 48,
        "hmac-sha512" => 64,
        _ => 32,
    }
}

/// Generate a random base64 secret for `algorithm`
pub fn generate_secret(algorithm: &str) -> String {
    let mut bytes = vec![0u8; secret_len(algorithm)];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::encode(&bytes)
}

/// Validate a key request, generating a secret when none was supplied
pub fn prepare_key(name: &str, algorithm: Option<&str>, secret: Option<&str>) -> Result<NewTsigKey> {
    let mut errors = Vec::new();
    if !KEY_NAME_REGEX.is_match(name) {
        errors.push(format!("Invalid TSIG key name: {}", name));
    }

    let algorithm = algorithm.unwrap_or(DEFAULT_ALGORITHM).to_ascii_lowercase();
    if !SUPPORTED_ALGORITHMS.contains(&algorithm.as_str()) {
        errors.push(format!("Unsupported TSIG algorithm: {}", algorithm));
    }

    let secret = match secret {
        Some(s) if base64::decode(s.trim()).map(|b| b.is_empty()).unwrap_or(true) => {
            errors.push("TSIG secret must be non-empty base64".to_string());
            String::new()
        }
        Some(s) => s.trim().to_string(),
        None => generate_secret(&algorithm),
    };

    if !errors.is_empty() {
        return Err(ConsoleError::Validation(errors));
    }
    Ok(NewTsigKey {
        name: name.to_string(),
        algorithm,
        secret,
    })
}

/// Build a request signer from key material
pub fn signer(name: &str, algorithm: &str, secret: &str) -> Result<TSigner> {
    let algorithm = algorithm_from_name(algorithm)?;
    let key = base64::decode(secret.trim())
        .map_err(|e| ConsoleError::Config(format!("TSIG secret for {} is not valid base64: {}", name, e)))?;
    let key_name =
        Name::from_str(name).map_err(|e| ConsoleError::Config(format!("Invalid TSIG key name {}: {}", name, e)))?;
    TSigner::new(key, algorithm, key_name, TSIG_FUDGE_SECS)
        .map_err(|e| ConsoleError::Config(format!("Failed to create TSIG signer for {}: {}", name, e)))
}

/// Render keys in nameserver include-file syntax
pub fn render_key_file(keys: &[TsigKey]) -> String {
    let mut output = String::from("# Managed by atlas-console; manual edits are overwritten\n");
    for key in keys {
        output.push_str(&format!(
            "\nkey \"{}\" {{\n    algorithm {};\n    secret \"{}\";\n}};\n",
            key.name, key.algorithm, key.secret
        ));
    }
    output
}

/// Rewrite the key include file
pub async fn write_key_file(path: &Path, keys: &[TsigKey]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, render_key_file(keys)).await?;
    info!(path = %path.display(), keys = keys.len(), "TSIG key file regenerated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::record::TenantId;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_generated_secret_matches_digest_size() {
        let secret = generate_secret("hmac-sha512");
        assert_eq!(base64::decode(&secret).unwrap().len(), 64);
        assert_ne!(secret, generate_secret("hmac-sha512"));
    }

    #[test]
    fn test_prepare_key() {
        let key = prepare_key("ddns-key", None, None).unwrap();
        assert_eq!(key.algorithm, "hmac-sha256");
        assert_eq!(base64::decode(&key.secret).unwrap().len(), 32);

        let err = prepare_key("bad key!", Some("hmac-whirlpool"), Some("%%%")).unwrap_err();
        match err {
            ConsoleError::Validation(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_algorithm_mapping() {
        assert!(matches!(algorithm_from_name("HMAC-SHA256"), Ok(TsigAlgorithm::HmacSha256)));
        assert!(matches!(algorithm_from_name("hmac-md5.sig-alg.reg.int."), Ok(TsigAlgorithm::HmacMd5)));
        assert!(algorithm_from_name("gss-tsig").is_err());
    }

    #[test]
    fn test_signer_rejects_bad_secret() {
        assert!(signer("ddns-key", "hmac-sha256", &generate_secret("hmac-sha256")).is_ok());
        assert!(signer("ddns-key", "hmac-sha256", "not base64!").is_err());
    }

    #[test]
    fn test_render_key_file() {
        let key = TsigKey {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            name: "ddns-key".into(),
            algorithm: "hmac-sha256".into(),
            secret: "c2VjcmV0".into(),
            created_at: Utc::now(),
            last_used: None,
            usage_count: 0,
        };
        let text = render_key_file(&[key]);
        assert!(text.contains("key \"ddns-key\" {"));
        assert!(text.contains("    algorithm hmac-sha256;"));
        assert!(text.contains("    secret \"c2VjcmV0\";"));
    }
}
