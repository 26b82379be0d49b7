mod common;

use common::{CALLBACK, Signer, form_value, layer, ticket_from_page, url};
use starberry_oauth1::oauth_core::types::OAuthError;
use starberry_oauth1::oauth_core::oauth_provider::TokenStore;
use starberry_oauth1::{OAuthLayer, OAuthRequest, OAuthResponse, ProviderConfig, SignatureMethod, TokenType};

fn config() -> ProviderConfig {
    ProviderConfig::default()
        .allow_plaintext_over_http()
        .with_blacklisted_hostnames(["localhost", "127.0.0.1"])
}

async fn request_token(layer: &OAuthLayer, callback: &str) -> (String, String) {
    let req = Signer::new(SignatureMethod::Plaintext).get_with_query(
        &url("/oauth/request_token/"),
        &[("scope", "photos"), ("oauth_callback", callback)],
    );
    let resp = layer.handle(req).await;
    assert_eq!(resp.status, 200, "{}", resp.body);
    (
        form_value(&resp.body, "oauth_token").unwrap(),
        form_value(&resp.body, "oauth_token_secret").unwrap(),
    )
}

async fn decide(layer: &OAuthLayer, token_key: &str, granted: bool) -> OAuthResponse {
    let page = layer
        .handle(OAuthRequest::get(url(&format!("/oauth/authorize/?oauth_token={token_key}"))).user("jane"))
        .await;
    assert_eq!(page.status, 200, "{}", page.body);
    let ticket = ticket_from_page(&page.body);
    let mut form = vec![("ticket", ticket.as_str())];
    if granted {
        form.push(("authorize_access", "1"));
    }
    layer
        .handle(OAuthRequest::post(url("/oauth/authorize/")).user("jane").form(&form))
        .await
}

async fn exchange(layer: &OAuthLayer, token: &(String, String), verifier: &str) -> OAuthResponse {
    let req = Signer::new(SignatureMethod::Plaintext)
        .with_token(&token.0, &token.1)
        .get_with_query(&url("/oauth/access_token/"), &[("oauth_verifier", verifier)]);
    layer.handle(req).await
}

fn query_value(location: &str, name: &str) -> Option<String> {
    let (_, query) = location.split_once('?')?;
    form_value(query, name)
}

#[tokio::test]
async fn test_three_legged_flow() {
    let (layer, store) = layer(config());

    // Temporary credentials.
    let req = Signer::new(SignatureMethod::Plaintext).get_with_query(
        &url("/oauth/request_token/"),
        &[("scope", "photos"), ("oauth_callback", CALLBACK)],
    );
    let resp = layer.handle(req).await;
    assert_eq!(resp.status, 200, "{}", resp.body);
    assert_eq!(resp.header("Content-Type"), Some("application/x-www-form-urlencoded"));
    assert!(resp.body.starts_with("oauth_token_secret="));
    assert!(resp.body.contains("&oauth_token="));
    assert!(resp.body.ends_with("&oauth_callback_confirmed=true"));
    let request = (
        form_value(&resp.body, "oauth_token").unwrap(),
        form_value(&resp.body, "oauth_token_secret").unwrap(),
    );
    assert_eq!(request.0.len(), 16);
    let stored = store.get_token(&request.0).await.unwrap().unwrap();
    assert_eq!(stored.callback.as_deref(), Some(CALLBACK));
    assert!(stored.callback_confirmed);

    // User authorization.
    let anonymous = layer
        .handle(OAuthRequest::get(url(&format!("/oauth/authorize/?oauth_token={}", request.0))))
        .await;
    assert_eq!(anonymous.status, 302);
    assert_eq!(
        anonymous.header("Location").map(str::to_string),
        Some(format!("/accounts/login/?next=/oauth/authorize/%3Foauth_token%3D{}", request.0))
    );

    let redirect = decide(&layer, &request.0, true).await;
    assert_eq!(redirect.status, 302);
    let location = redirect.header("Location").unwrap();
    assert!(location.starts_with("http://printer.example.com/request_token_ready?oauth_verifier="));
    assert_eq!(query_value(location, "oauth_token").as_deref(), Some(request.0.as_str()));
    let verifier = query_value(location, "oauth_verifier").unwrap();
    assert_eq!(verifier.len(), 10);

    // Token credentials.
    let wrong = exchange(&layer, &request, "badverifier").await;
    assert_eq!(wrong.status, 400);
    assert_eq!(wrong.body, "Invalid OAuth verifier.");

    let resp = exchange(&layer, &request, &verifier).await;
    assert_eq!(resp.status, 200, "{}", resp.body);
    assert!(resp.body.starts_with("oauth_token_secret="));
    assert!(!resp.body.contains("oauth_callback_confirmed"));
    let access = (
        form_value(&resp.body, "oauth_token").unwrap(),
        form_value(&resp.body, "oauth_token_secret").unwrap(),
    );
    assert!(store.get_token(&request.0).await.unwrap().is_none());

    let again = exchange(&layer, &request, &verifier).await;
    assert_eq!(again.status, 400);
    assert_eq!(again.body, "Invalid request token.");

    // Protected resource.
    let signer = Signer::new(SignatureMethod::HmacSha1).with_token(&access.0, &access.1);
    let req = signer.get_with_header(&url("/oauth/photos/"), &[("file", "vacation.jpg"), ("size", "original")]);
    let verdict = layer.protect(&req, Some("photos")).await.unwrap();
    assert_eq!(verdict.user.as_deref(), Some("jane"));
    assert_eq!(verdict.consumer.key, common::CONSUMER_KEY);
    assert_eq!(verdict.token.as_ref().map(|t| t.token_type), Some(TokenType::Access));
    assert_eq!(verdict.parameters.get("file"), Some("vacation.jpg"));

    let replay = layer.protect(&req, Some("photos")).await.unwrap_err();
    assert!(matches!(replay, OAuthError::ReplayedRequest(_)));

    // Revocation by the resource owner.
    assert!(layer.tokens().revoke_for_user(&access.0, "jane").await.unwrap());
    let fresh = signer.get_with_header(&url("/oauth/photos/"), &[("file", "vacation.jpg")]);
    let err = layer.protect(&fresh, Some("photos")).await.unwrap_err();
    assert!(matches!(err, OAuthError::UnknownToken(_)));
    assert_eq!(layer.reject(&err).status, 401);
}

#[tokio::test]
async fn test_bare_requests() {
    let (layer, _) = layer(config());
    let challenged = |resp: &OAuthResponse| {
        assert_eq!(resp.status, 401);
        assert_eq!(resp.body, "Invalid request parameters.");
        assert_eq!(resp.header("WWW-Authenticate"), Some("OAuth realm=\"\""));
    };

    challenged(&layer.handle(OAuthRequest::get(url("/oauth/request_token/"))).await);
    let err = layer.protect(&OAuthRequest::get(url("/oauth/photo/")), None).await.unwrap_err();
    challenged(&layer.reject(&err));

    let resp = layer.handle(OAuthRequest::get(url("/oauth/access_token/"))).await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body, "Invalid request parameters.");
}

#[tokio::test]
async fn test_unknown_scope() {
    let (layer, _) = layer(config());
    let req = Signer::new(SignatureMethod::Plaintext).get_with_query(
        &url("/oauth/request_token/"),
        &[("scope", "videos"), ("oauth_callback", CALLBACK)],
    );
    let resp = layer.handle(req).await;
    assert_eq!(resp.status, 401);
    assert_eq!(resp.body, "Resource videos does not exist.");
    assert_eq!(resp.header("WWW-Authenticate"), Some("OAuth realm=\"\""));
}

#[tokio::test]
async fn test_denied_request_token_cannot_be_exchanged() {
    let (layer, _) = layer(config());
    let request = request_token(&layer, CALLBACK).await;

    let redirect = decide(&layer, &request.0, false).await;
    assert_eq!(redirect.status, 302);
    assert_eq!(
        redirect.header("Location"),
        Some("http://printer.example.com/request_token_ready?error=Access+not+granted+by+user.")
    );

    let resp = exchange(&layer, &request, "anything").await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body, "Request Token not approved by the user.");
}

#[tokio::test]
async fn test_unapproved_request_token() {
    let (layer, _) = layer(config());
    let request = request_token(&layer, CALLBACK).await;
    let resp = exchange(&layer, &request, "").await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body, "Request Token not approved by the user.");
}

#[tokio::test]
async fn test_out_of_band_callback() {
    let (layer, store) = layer(config());
    let req = Signer::new(SignatureMethod::Plaintext).get_with_query(
        &url("/oauth/request_token/"),
        &[("scope", "photos"), ("oauth_callback", "oob")],
    );
    let resp = layer.handle(req).await;
    assert_eq!(resp.status, 200);
    assert!(resp.body.ends_with("&oauth_callback_confirmed=true"));
    let key = form_value(&resp.body, "oauth_token").unwrap();
    let stored = store.get_token(&key).await.unwrap().unwrap();
    assert!(stored.callback.is_none());
    assert!(!stored.callback_confirmed);

    let page = decide(&layer, &key, true).await;
    assert_eq!(page.status, 200);
    let verifier = store.get_token(&key).await.unwrap().unwrap().verifier().unwrap().to_string();
    assert!(page.body.contains(&verifier));
}

#[tokio::test]
async fn test_invalid_callbacks() {
    let (layer, _) = layer(config());
    for callback in ["http://localhost/cb", "not-a-url", "/relative/path"] {
        let req = Signer::new(SignatureMethod::Plaintext).get_with_query(
            &url("/oauth/request_token/"),
            &[("scope", "photos"), ("oauth_callback", callback)],
        );
        let resp = layer.handle(req).await;
        assert_eq!(resp.status, 401, "{callback}");
        assert_eq!(resp.body, "Invalid callback URL.");
    }
}

#[tokio::test]
async fn test_ticket_cannot_be_replayed() {
    let (layer, _) = layer(config());
    let request = request_token(&layer, CALLBACK).await;
    let page = layer
        .handle(OAuthRequest::get(url(&format!("/oauth/authorize/?oauth_token={}", request.0))).user("jane"))
        .await;
    let ticket = ticket_from_page(&page.body);
    let post = OAuthRequest::post(url("/oauth/authorize/"))
        .user("jane")
        .form(&[("ticket", ticket.as_str()), ("authorize_access", "1")]);

    assert_eq!(layer.handle(post.clone()).await.status, 302);
    let replay = layer.handle(post).await;
    assert_eq!(replay.status, 401);
    assert_eq!(replay.body, "Action not allowed.");
}

#[tokio::test]
async fn test_plaintext_refused_over_http_by_default() {
    let (layer, _) = layer(ProviderConfig::default());
    let req = Signer::new(SignatureMethod::Plaintext).get_with_query(
        &url("/oauth/request_token/"),
        &[("scope", "photos"), ("oauth_callback", CALLBACK)],
    );
    let resp = layer.handle(req).await;
    assert_eq!(resp.status, 401);
    assert!(resp.body.starts_with("Invalid signature method:"));

    let secure = Signer::new(SignatureMethod::Plaintext).get_with_query(
        "https://testserver/oauth/request_token/",
        &[("scope", "photos"), ("oauth_callback", CALLBACK)],
    );
    assert_eq!(layer.handle(secure).await.status, 200);
}

#[tokio::test]
async fn test_hmac_only_deployment() {
    let (layer, _) = layer(config().with_signature_methods([SignatureMethod::HmacSha1]));
    let plaintext = Signer::new(SignatureMethod::Plaintext).get_with_query(
        &url("/oauth/request_token/"),
        &[("scope", "photos"), ("oauth_callback", CALLBACK)],
    );
    assert_eq!(layer.handle(plaintext).await.status, 401);

    let hmac = Signer::new(SignatureMethod::HmacSha1).get_with_header(
        &url("/oauth/request_token/"),
        &[("scope", "photos"), ("oauth_callback", CALLBACK)],
    );
    assert_eq!(layer.handle(hmac).await.status, 200);
}
