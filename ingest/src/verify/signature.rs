//! SNS message signature verification.
//!
//! SNS signs messages with SHA1-with-RSA (SignatureVersion "1") over a
//! canonical string of envelope fields, using an X.509 certificate hosted
//! on an AWS endpoint named in `SigningCertURL`.
//! Reference: https://docs.aws.amazon.com/sns/latest/dg/sns-verify-signature-of-message.html
//!
//! Unlike the AWS-IP check, this verifier fails closed: a certificate that
//! cannot be fetched or parsed rejects the message.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tracing::{debug, warn};
use url::Url;

use crate::cache::TtlCache;
use crate::sns::SnsEnvelope;

/// Cache lifetime for downloaded signing certificates.
pub const CERT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Canonical field order for `Notification` envelopes.
const NOTIFICATION_FIELDS: &[&str] = &[
    "Message",
    "MessageId",
    "Subject",
    "Timestamp",
    "TopicArn",
    "Type",
];

/// Canonical field order for subscription-lifecycle envelopes.
const CONFIRMATION_FIELDS: &[&str] = &[
    "Message",
    "MessageId",
    "SubscribeURL",
    "Timestamp",
    "Token",
    "TopicArn",
    "Type",
];

/// Validates SNS envelope authenticity via the AWS signature scheme.
pub struct SignatureVerifier {
    http: reqwest::Client,
    certs: TtlCache<String, String>,
}

impl SignatureVerifier {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_cache(http, TtlCache::new(CERT_CACHE_TTL))
    }

    /// Construct with an injected certificate cache; tests pre-seed it with
    /// fixture PEMs keyed by [`cert_cache_key`].
    pub fn with_cache(http: reqwest::Client, certs: TtlCache<String, String>) -> Self {
        Self { http, certs }
    }

    /// Verify an envelope's signature. Never panics; every failure path
    /// logs the failing step and returns `false`.
    pub async fn verify(&self, envelope: &SnsEnvelope) -> bool {
        let Some(signature_b64) = envelope.signature.as_deref() else {
            warn!(field = "Signature", "sns_signature_missing_field");
            return false;
        };
        let Some(cert_url) = envelope.signing_cert_url.as_deref() else {
            warn!(field = "SigningCertURL", "sns_signature_missing_field");
            return false;
        };
        let Some(version) = envelope.signature_version.as_deref() else {
            warn!(field = "SignatureVersion", "sns_signature_missing_field");
            return false;
        };

        // Only SignatureVersion 1 (SHA1-with-RSA) is supported.
        if version != "1" {
            warn!(version = %version, "sns_signature_unsupported_version");
            return false;
        }

        if !is_valid_cert_url(cert_url) {
            warn!(url = %cert_url, "sns_signature_invalid_cert_url");
            return false;
        }

        let Some(cert_pem) = self.certificate(cert_url).await else {
            return false;
        };

        let Some(string_to_sign) = build_string_to_sign(envelope) else {
            return false;
        };

        let signature = match BASE64.decode(signature_b64) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "sns_signature_invalid_base64");
                return false;
            }
        };

        match verify_rsa_sha1(&cert_pem, string_to_sign.as_bytes(), &signature) {
            Ok(()) => true,
            Err(step) => {
                warn!(step = step, "sns_signature_verification_failed");
                false
            }
        }
    }

    /// Fetch the signing certificate, cached 24h keyed by URL digest.
    async fn certificate(&self, url: &str) -> Option<String> {
        let key = cert_cache_key(url);
        if let Some(cached) = self.certs.get(&key) {
            return Some(cached);
        }

        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, url = %url, "sns_cert_fetch_failed");
                return None;
            }
        };

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, url = %url, "sns_cert_read_failed");
                return None;
            }
        };

        if body.is_empty() {
            warn!(url = %url, "sns_cert_empty_response");
            return None;
        }

        if !body.contains("-----BEGIN CERTIFICATE-----") {
            warn!(url = %url, "sns_cert_invalid_format");
            return None;
        }

        debug!(url = %url, "sns_cert_cached");
        self.certs.insert(key, body.clone());
        Some(body)
    }
}

/// Cache key for a certificate URL.
pub fn cert_cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// A signing certificate may only come from an AWS SNS endpoint over HTTPS:
/// `sns.<region>.amazonaws.com` or `<region>.sns.amazonaws.com`.
pub fn is_valid_cert_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };

    if url.scheme() != "https" {
        return false;
    }

    let Some(host) = url.host_str() else {
        return false;
    };

    let region = if let Some(rest) = host.strip_prefix("sns.") {
        rest.strip_suffix(".amazonaws.com")
    } else if let Some(rest) = host.strip_suffix(".sns.amazonaws.com") {
        Some(rest)
    } else {
        None
    };

    match region {
        Some(region) => {
            !region.is_empty()
                && region
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        }
        None => false,
    }
}

/// Reconstruct the exact string the SNS signer hashed. Field order depends
/// on the envelope type; each present field contributes `Name\nValue\n`.
/// `Subject` is the only field allowed to be absent (omitted entirely).
pub fn build_string_to_sign(envelope: &SnsEnvelope) -> Option<String> {
    let fields = match envelope.message_type.as_deref() {
        Some("Notification") => NOTIFICATION_FIELDS,
        Some("SubscriptionConfirmation") | Some("UnsubscribeConfirmation") => CONFIRMATION_FIELDS,
        other => {
            warn!(message_type = ?other, "sns_signature_unsigned_type");
            return None;
        }
    };

    let mut string_to_sign = String::new();
    for name in fields {
        match envelope.field(name) {
            Some(value) => {
                string_to_sign.push_str(name);
                string_to_sign.push('\n');
                string_to_sign.push_str(value);
                string_to_sign.push('\n');
            }
            None if *name == "Subject" => continue,
            None => {
                warn!(field = name, "sns_signature_missing_field");
                return None;
            }
        }
    }

    Some(string_to_sign)
}

fn verify_rsa_sha1(cert_pem: &str, string_to_sign: &[u8], signature: &[u8]) -> Result<(), &'static str> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
        .map_err(|_| "pem_parse")?;
    let cert = pem.parse_x509().map_err(|_| "x509_parse")?;

    let public_key = RsaPublicKey::from_public_key_der(cert.public_key().raw)
        .map_err(|_| "public_key_extract")?;

    let digest = Sha1::digest(string_to_sign);
    public_key
        .verify(Pkcs1v15Sign::new::<Sha1>(), &digest, signature)
        .map_err(|_| "rsa_verify")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;

    fn envelope(message_type: &str) -> SnsEnvelope {
        SnsEnvelope {
            message_type: Some(message_type.to_string()),
            message_id: Some("msg-1".to_string()),
            topic_arn: Some("arn:aws:sns:us-east-1:123456789012:ses-events".to_string()),
            timestamp: Some("2024-05-01T12:00:00.000Z".to_string()),
            signature_version: Some("1".to_string()),
            signature: Some("c2ln".to_string()),
            signing_cert_url: Some(
                "https://sns.us-east-1.amazonaws.com/SimpleNotificationService-abc.pem".to_string(),
            ),
            message: Some("{\"notificationType\":\"Delivery\"}".to_string()),
            subscribe_url: None,
            token: None,
            subject: None,
        }
    }

    #[test]
    fn test_cert_url_validation() {
        assert!(is_valid_cert_url(
            "https://sns.us-east-1.amazonaws.com/cert.pem"
        ));
        assert!(is_valid_cert_url(
            "https://eu-west-1.sns.amazonaws.com/cert.pem"
        ));

        // Wrong scheme.
        assert!(!is_valid_cert_url(
            "http://sns.us-east-1.amazonaws.com/cert.pem"
        ));
        // Arbitrary host.
        assert!(!is_valid_cert_url("https://evil.example.com/cert.pem"));
        // Suffix spoofing.
        assert!(!is_valid_cert_url(
            "https://sns.us-east-1.amazonaws.com.evil.example.com/cert.pem"
        ));
        // Empty region.
        assert!(!is_valid_cert_url("https://sns..amazonaws.com/cert.pem"));
        // Region with illegal characters.
        assert!(!is_valid_cert_url(
            "https://sns.Us_East.amazonaws.com/cert.pem"
        ));
        assert!(!is_valid_cert_url("not a url"));
    }

    #[test]
    fn test_string_to_sign_notification_without_subject() {
        let env = envelope("Notification");
        let s = build_string_to_sign(&env).unwrap();

        assert_eq!(
            s,
            "Message\n{\"notificationType\":\"Delivery\"}\n\
             MessageId\nmsg-1\n\
             Timestamp\n2024-05-01T12:00:00.000Z\n\
             TopicArn\narn:aws:sns:us-east-1:123456789012:ses-events\n\
             Type\nNotification\n"
        );
    }

    #[test]
    fn test_string_to_sign_includes_subject_when_present() {
        let mut env = envelope("Notification");
        env.subject = Some("Hello".to_string());

        let s = build_string_to_sign(&env).unwrap();
        assert!(s.contains("Subject\nHello\n"));
        // Subject sorts between MessageId and Timestamp.
        assert!(s.find("MessageId").unwrap() < s.find("Subject").unwrap());
        assert!(s.find("Subject").unwrap() < s.find("Timestamp").unwrap());
    }

    #[test]
    fn test_string_to_sign_confirmation_requires_token() {
        let mut env = envelope("SubscriptionConfirmation");
        env.subscribe_url = Some("https://sns.us-east-1.amazonaws.com/confirm".to_string());
        // Token missing: cannot rebuild the signed string.
        assert!(build_string_to_sign(&env).is_none());

        env.token = Some("tok-123".to_string());
        let s = build_string_to_sign(&env).unwrap();
        assert!(s.contains("SubscribeURL\nhttps://sns.us-east-1.amazonaws.com/confirm\n"));
        assert!(s.contains("Token\ntok-123\n"));
    }

    #[test]
    fn test_string_to_sign_unknown_type() {
        let env = envelope("SomethingElse");
        assert!(build_string_to_sign(&env).is_none());
    }

    #[tokio::test]
    async fn test_missing_fields_reject() {
        let verifier = SignatureVerifier::new(reqwest::Client::new());

        let mut env = envelope("Notification");
        env.signature = None;
        assert!(!verifier.verify(&env).await);

        let mut env = envelope("Notification");
        env.signing_cert_url = None;
        assert!(!verifier.verify(&env).await);

        let mut env = envelope("Notification");
        env.signature_version = None;
        assert!(!verifier.verify(&env).await);
    }

    #[tokio::test]
    async fn test_unsupported_signature_version_rejects() {
        let verifier = SignatureVerifier::new(reqwest::Client::new());

        let mut env = envelope("Notification");
        env.signature_version = Some("2".to_string());
        assert!(!verifier.verify(&env).await);
    }

    #[tokio::test]
    async fn test_bad_cert_host_rejects() {
        let verifier = SignatureVerifier::new(reqwest::Client::new());

        let mut env = envelope("Notification");
        env.signing_cert_url = Some("https://evil.example.com/cert.pem".to_string());
        assert!(!verifier.verify(&env).await);
    }

    #[tokio::test]
    async fn test_cert_fetch_failure_fails_closed() {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();
        let verifier = SignatureVerifier::new(http);

        // The host passes validation but does not serve a certificate, so
        // the fetch errors and the check rejects.
        let mut env = envelope("Notification");
        env.signing_cert_url =
            Some("https://sns.zz-nonexistent-9.amazonaws.com/cert.pem".to_string());
        assert!(!verifier.verify(&env).await);
    }

    /// Mint a self-signed RSA certificate and sign the canonical string the
    /// way SNS does, then check both the accept and reject paths.
    #[tokio::test]
    async fn test_signature_round_trip() {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();

        let pkcs8_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap();
        let key_pair =
            rcgen::KeyPair::from_pem_and_sign_algo(&pkcs8_pem, &rcgen::PKCS_RSA_SHA256).unwrap();
        let params =
            rcgen::CertificateParams::new(vec!["sns.us-east-1.amazonaws.com".to_string()])
                .unwrap();
        let cert_pem = params.self_signed(&key_pair).unwrap().pem();

        let cert_url = "https://sns.us-east-1.amazonaws.com/SimpleNotificationService-test.pem";
        let certs = TtlCache::new(CERT_CACHE_TTL);
        certs.insert(cert_cache_key(cert_url), cert_pem);
        let verifier = SignatureVerifier::with_cache(reqwest::Client::new(), certs);

        let mut env = envelope("Notification");
        env.signing_cert_url = Some(cert_url.to_string());

        let string_to_sign = build_string_to_sign(&env).unwrap();
        let digest = Sha1::digest(string_to_sign.as_bytes());
        let signature = private_key
            .sign(Pkcs1v15Sign::new::<Sha1>(), &digest)
            .unwrap();
        env.signature = Some(BASE64.encode(signature));

        // Unmodified envelope with a cached certificate verifies, and
        // verification is repeatable.
        assert!(verifier.verify(&env).await);
        assert!(verifier.verify(&env).await);

        // Flipping a single byte of Message invalidates the signature.
        let mut tampered = env.clone();
        tampered.message = Some("{\"notificationType\":\"Xelivery\"}".to_string());
        assert!(!verifier.verify(&tampered).await);

        // So does a corrupted signature.
        let mut bad_sig = env.clone();
        bad_sig.signature = Some(BASE64.encode(b"not-a-signature"));
        assert!(!verifier.verify(&bad_sig).await);
    }
}
