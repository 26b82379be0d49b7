//! Transport-neutral request and response shapes.
//!
//! The HTTP server owns sockets and sessions; it hands the provider an
//! [`OAuthRequest`] and writes back the [`OAuthResponse`] it gets.

use std::collections::{HashMap, HashSet};

use url::Url;

use super::encoding::{parse_authorization_header, parse_form};
use super::types::OAuthError;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Inbound request as seen by the provider.
#[derive(Debug, Clone)]
pub struct OAuthRequest {
    /// HTTP method (GET, POST, etc.).
    pub method: String,
    /// Absolute request URL, including the query string.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Raw body; only read when it is form-encoded.
    pub body: Option<String>,
    /// Principal logged in through the session layer, if any.
    pub user: Option<String>,
}

impl OAuthRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        OAuthRequest {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            user: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends pairs to the URL query string.
    pub fn query<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k.as_ref(), v.as_ref());
        }
        let encoded = serializer.finish();
        if !encoded.is_empty() {
            let sep = if self.url.contains('?') { '&' } else { '?' };
            self.url = format!("{}{}{}", self.url, sep, encoded);
        }
        self
    }

    /// Sets a form-encoded body and its content type.
    pub fn form<K: AsRef<str>, V: AsRef<str>>(mut self, pairs: &[(K, V)]) -> Self {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            serializer.append_pair(k.as_ref(), v.as_ref());
        }
        self.body = Some(serializer.finish());
        self.headers.retain(|(name, _)| !name.eq_ignore_ascii_case("Content-Type"));
        self.headers.push(("Content-Type".into(), FORM_CONTENT_TYPE.into()));
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// First header with this name, case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
    }

    /// True when the request arrived over https.
    pub fn is_secure(&self) -> bool {
        Url::parse(&self.url).is_ok_and(|url| url.scheme() == "https")
    }

    /// Path component, used for endpoint routing.
    pub fn path(&self) -> Result<String, OAuthError> {
        Ok(self.parsed_url()?.path().to_string())
    }

    /// Path plus query, as a login page would need it to come back here.
    pub fn path_and_query(&self) -> Result<String, OAuthError> {
        let url = self.parsed_url()?;
        Ok(match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        })
    }

    fn parsed_url(&self) -> Result<Url, OAuthError> {
        Url::parse(&self.url).map_err(|e| OAuthError::MalformedRequest(format!("bad request URL: {e}")))
    }

    fn has_form_body(&self) -> bool {
        self.header_value("Content-Type")
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
    }

    /// Collects parameters from the query string, form body and
    /// `Authorization: OAuth` header.
    ///
    /// Protocol parameters supplied in the header win over the same names in
    /// the query or body; those shadowed copies take no part in signing.
    /// A protocol parameter repeated within the query and body, or within the
    /// header, is rejected.
    pub fn parameters(&self) -> Result<RequestParameters, OAuthError> {
        let url = self.parsed_url()?;
        let mut carried: Vec<(String, String)> = url
            .query()
            .map(parse_form)
            .unwrap_or_default();
        if self.has_form_body() {
            if let Some(body) = &self.body {
                carried.extend(parse_form(body));
            }
        }

        let header = self
            .header_value("Authorization")
            .and_then(parse_authorization_header);

        let (realm, header_params) = match header {
            Some(h) => (h.realm, h.params),
            None => (None, Vec::new()),
        };
        reject_duplicates(&carried)?;
        reject_duplicates(&header_params)?;

        let mut values: HashMap<String, String> = HashMap::new();
        let mut signed = Vec::with_capacity(carried.len() + header_params.len());
        for (k, v) in carried {
            if k.starts_with("oauth_") && header_params.iter().any(|(hk, _)| *hk == k) {
                continue;
            }
            values.entry(k.clone()).or_insert_with(|| v.clone());
            signed.push((k, v));
        }
        for (k, v) in header_params {
            values.insert(k.clone(), v.clone());
            signed.push((k, v));
        }

        Ok(RequestParameters { values, signed, realm })
    }
}

fn reject_duplicates(params: &[(String, String)]) -> Result<(), OAuthError> {
    let mut seen = HashSet::new();
    for (k, _) in params.iter().filter(|(k, _)| k.starts_with("oauth_")) {
        if !seen.insert(k.as_str()) {
            return Err(OAuthError::MalformedRequest(format!("duplicated protocol parameter {k}")));
        }
    }
    Ok(())
}

/// Parameters extracted from one request.
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    values: HashMap<String, String>,
    signed: Vec<(String, String)>,
    realm: Option<String>,
}

impl RequestParameters {
    /// Single value per name; header first, then query, then body.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Every pair that enters the signature base string.
    pub fn signed(&self) -> &[(String, String)] {
        &self.signed
    }

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }
}

/// Outbound response for the HTTP layer to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: String,
}

impl OAuthResponse {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        OAuthResponse {
            status,
            headers: vec![("Content-Type".into(), "text/plain; charset=utf-8".into())],
            body: body.into(),
        }
    }

    /// 200 with a form-encoded token body.
    pub fn form(body: impl Into<String>) -> Self {
        OAuthResponse {
            status: 200,
            headers: vec![("Content-Type".into(), FORM_CONTENT_TYPE.into())],
            body: body.into(),
        }
    }

    /// 302 to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        OAuthResponse {
            status: 302,
            headers: vec![("Location".into(), location.into())],
            body: String::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
