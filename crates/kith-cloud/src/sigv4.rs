//! SigV4-style request signing.
//!
//! The signature is a pure function of the request parts, a timestamp
//! and the credentials, so everything here is testable against the
//! published derivation vectors without touching the network.
//!
//! Flow: canonical request, then string-to-sign, then a four-step HMAC
//! key derivation, then the final HMAC whose hex digest lands in the
//! `Authorization` header.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credentials::CloudCredentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "rekognition";

// Canonical header order is fixed: lowercase, sorted by name.
const SIGNED_HEADER_LIST: &str = "content-type;host;x-amz-date;x-amz-target";

/// Everything that participates in a signature. All requests are
/// `POST /` with an empty query string.
pub struct SigningInput<'a> {
    pub host: &'a str,
    pub amz_target: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
    pub timestamp: DateTime<Utc>,
}

/// Headers produced by signing; attach verbatim to the outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
}

/// Sign one request.
pub fn sign(input: &SigningInput<'_>, creds: &CloudCredentials) -> SignedHeaders {
    let amz_date = input.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = input.timestamp.format("%Y%m%d").to_string();
    let scope = format!("{date_stamp}/{}/{SERVICE}/aws4_request", creds.region);

    let canonical = canonical_request(input, &amz_date);
    let to_sign = string_to_sign(&amz_date, &scope, &canonical);
    let key = derive_signing_key(&creds.secret_access_key, &date_stamp, &creds.region, SERVICE);
    let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADER_LIST}, Signature={signature}",
        creds.access_key_id,
    );

    SignedHeaders {
        authorization,
        amz_date,
    }
}

fn canonical_request(input: &SigningInput<'_>, amz_date: &str) -> String {
    let payload_hash = hex::encode(Sha256::digest(input.body));
    format!(
        "POST\n/\n\ncontent-type:{}\nhost:{}\nx-amz-date:{amz_date}\nx-amz-target:{}\n\n{SIGNED_HEADER_LIST}\n{payload_hash}",
        input.content_type, input.host, input.amz_target,
    )
}

fn string_to_sign(amz_date: &str, scope: &str, canonical: &str) -> String {
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("{ALGORITHM}\n{amz_date}\n{scope}\n{digest}")
}

/// Four chained HMACs seeded with `"AWS4" + secret` over date, region,
/// service and the literal `aws4_request`.
fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
