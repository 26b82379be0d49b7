#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use starberry_oauth1::oauth_core::encoding::{authorization_header, parse_form};
use starberry_oauth1::oauth_core::signature::base_string;
use starberry_oauth1::{
    Consumer, ConsumerStatus, InMemoryCredentialStore, OAuthLayer, OAuthRequest, ProviderConfig, Resource,
    SignatureMethod,
};
use uuid::Uuid;

pub const CONSUMER_KEY: &str = "dpf43f3p2l4k3l03";
pub const CONSUMER_SECRET: &str = "kd94hf93k423kf44";
pub const CALLBACK: &str = "http://printer.example.com/request_token_ready";
pub const BASE: &str = "http://testserver";

pub fn printer() -> Consumer {
    Consumer::new(CONSUMER_KEY, CONSUMER_SECRET, "printer.example.com", "jane").with_status(ConsumerStatus::Accepted)
}

/// Layer over a store holding the printer consumer and the `photos` scope.
pub fn layer(config: ProviderConfig) -> (OAuthLayer, InMemoryCredentialStore) {
    let store = InMemoryCredentialStore::with_records(
        vec![printer()],
        vec![Resource::new("photos", "/oauth/photos/")],
    );
    let layer = OAuthLayer::new(config).credential_store(Arc::new(store.clone()));
    (layer, store)
}

pub fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

/// Client-side signer, standing in for the consumer application.
#[derive(Clone)]
pub struct Signer {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub token: Option<(String, String)>,
    pub method: SignatureMethod,
}

impl Signer {
    pub fn new(method: SignatureMethod) -> Self {
        Signer {
            consumer_key: CONSUMER_KEY.into(),
            consumer_secret: CONSUMER_SECRET.into(),
            token: None,
            method,
        }
    }

    pub fn with_token(mut self, key: &str, secret: &str) -> Self {
        self.token = Some((key.into(), secret.into()));
        self
    }

    fn protocol_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_signature_method".to_string(), self.method.name().to_string()),
            ("oauth_timestamp".to_string(), Utc::now().timestamp().to_string()),
            ("oauth_nonce".to_string(), Uuid::new_v4().simple().to_string()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];
        if let Some((key, _)) = &self.token {
            params.push(("oauth_token".to_string(), key.clone()));
        }
        params
    }

    fn signature(&self, http_method: &str, url: &str, params: &[(String, String)]) -> String {
        let base = base_string(http_method, url, params).unwrap();
        let token_secret = self.token.as_ref().map(|(_, s)| s.as_str()).unwrap_or("");
        self.method.sign(&base, &self.consumer_secret, token_secret)
    }

    /// Signed request carrying every parameter in the query string.
    pub fn get_with_query(&self, url: &str, extra: &[(&str, &str)]) -> OAuthRequest {
        let mut params = self.protocol_params();
        params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let signature = self.signature("GET", url, &params);
        params.push(("oauth_signature".to_string(), signature));
        OAuthRequest::get(url).query(&params)
    }

    /// Signed request with protocol parameters in the `Authorization`
    /// header and `extra` in the query string.
    pub fn get_with_header(&self, url: &str, extra: &[(&str, &str)]) -> OAuthRequest {
        let mut params = self.protocol_params();
        let mut signed = params.clone();
        signed.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        params.push(("oauth_signature".to_string(), self.signature("GET", url, &signed)));
        OAuthRequest::get(url)
            .query(extra)
            .header("Authorization", authorization_header(Some("photos"), &params))
    }
}

pub fn form_value(body: &str, name: &str) -> Option<String> {
    parse_form(body).into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

/// Ticket id embedded in the approval page.
pub fn ticket_from_page(body: &str) -> String {
    let marker = "name=\"ticket\" value=\"";
    let start = body.find(marker).expect("ticket field") + marker.len();
    let end = body[start..].find('"').expect("ticket value end") + start;
    body[start..end].to_string()
}
