//! Signature Engine: base string construction and signature verification.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::config::ProviderConfig;
use super::crypto::{constant_time_eq, hmac_sha1_sign, hmac_sha1_verify};
use super::encoding::encode;
use super::types::OAuthError;

/// Supported `oauth_signature_method` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureMethod {
    #[serde(rename = "plaintext")]
    Plaintext,
    #[serde(rename = "hmac-sha1")]
    HmacSha1,
}

impl SignatureMethod {
    /// Wire name used in `oauth_signature_method`.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureMethod::Plaintext => "PLAINTEXT",
            SignatureMethod::HmacSha1 => "HMAC-SHA1",
        }
    }

    /// Computes the signature for `base_string`.
    ///
    /// PLAINTEXT ignores the base string and returns the signing key itself.
    pub fn sign(&self, base_string: &str, consumer_secret: &str, token_secret: &str) -> String {
        let key = signing_key(consumer_secret, token_secret);
        match self {
            SignatureMethod::Plaintext => key,
            SignatureMethod::HmacSha1 => STANDARD.encode(hmac_sha1_sign(key.as_bytes(), base_string.as_bytes())),
        }
    }

    /// Checks a supplied signature in constant time.
    pub fn verify(&self, base_string: &str, consumer_secret: &str, token_secret: &str, signature: &str) -> bool {
        let key = signing_key(consumer_secret, token_secret);
        match self {
            SignatureMethod::Plaintext => constant_time_eq(key.as_bytes(), signature.as_bytes()),
            SignatureMethod::HmacSha1 => match STANDARD.decode(signature.trim()) {
                Ok(tag) => hmac_sha1_verify(key.as_bytes(), base_string.as_bytes(), &tag),
                Err(_) => false,
            },
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureMethod {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("PLAINTEXT") {
            Ok(SignatureMethod::Plaintext)
        } else if s.eq_ignore_ascii_case("HMAC-SHA1") {
            Ok(SignatureMethod::HmacSha1)
        } else {
            Err(OAuthError::InvalidSignatureMethod(format!("{s} is not supported")))
        }
    }
}

/// `encode(consumer_secret)&encode(token_secret)`; the token part is empty
/// when no token is involved.
pub fn signing_key(consumer_secret: &str, token_secret: &str) -> String {
    format!("{}&{}", encode(consumer_secret), encode(token_secret))
}

/// Base string URI: scheme and host lowercased, default port dropped,
/// query and fragment removed.
pub fn normalize_url(raw: &str) -> Result<String, OAuthError> {
    let url = Url::parse(raw).map_err(|e| OAuthError::MalformedRequest(format!("bad request URL: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| OAuthError::MalformedRequest("request URL has no host".into()))?;
    // `Url` already drops the scheme's default port.
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    Ok(format!("{}://{}{}{}", url.scheme(), host, port, url.path()))
}

/// Encodes every pair, sorts by key then value, and joins with `&`.
/// `oauth_signature` never takes part.
pub fn normalize_parameters(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| k != "oauth_signature")
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Builds the signature base string `METHOD&encoded-url&encoded-params`.
pub fn base_string(method: &str, url: &str, params: &[(String, String)]) -> Result<String, OAuthError> {
    Ok(format!(
        "{}&{}&{}",
        encode(&method.to_ascii_uppercase()),
        encode(&normalize_url(url)?),
        encode(&normalize_parameters(params))
    ))
}

/// The request parts that are signed, independent of transport.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub url: &'a str,
    /// All query, body and header parameters except `realm`.
    pub params: &'a [(String, String)],
}

/// Verifies signatures against the methods a deployment accepts.
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    accepted: Vec<SignatureMethod>,
    plaintext_requires_tls: bool,
}

impl SignatureEngine {
    pub fn new(config: &ProviderConfig) -> Self {
        SignatureEngine {
            accepted: config.signature_methods.clone(),
            plaintext_requires_tls: config.plaintext_requires_tls,
        }
    }

    /// Resolves a wire method name against the accepted set.
    pub fn method(&self, name: &str, secure: bool) -> Result<SignatureMethod, OAuthError> {
        let method: SignatureMethod = name.parse()?;
        if !self.accepted.contains(&method) {
            return Err(OAuthError::InvalidSignatureMethod(format!("{method} is not accepted")));
        }
        if method == SignatureMethod::Plaintext && self.plaintext_requires_tls && !secure {
            return Err(OAuthError::InvalidSignatureMethod(
                "PLAINTEXT requires a secure transport".into(),
            ));
        }
        Ok(method)
    }

    /// Recomputes the signature; on mismatch the expected base string is
    /// reported, never the secrets.
    pub fn verify(
        &self,
        method: SignatureMethod,
        request: SignedRequest<'_>,
        consumer_secret: &str,
        token_secret: &str,
        signature: &str,
    ) -> Result<(), OAuthError> {
        let base = base_string(request.method, request.url, request.params)?;
        if method.verify(&base, consumer_secret, token_secret, signature) {
            Ok(())
        } else {
            debug!(base_string = %base, method = %method, "signature mismatch");
            Err(OAuthError::SignatureMismatch { base_string: base })
        }
    }
}
