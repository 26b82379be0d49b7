//! User authorization step: approval tickets, callback redirects and the
//! page-rendering hook.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use url::Url;
use uuid::Uuid;

use super::http::OAuthResponse;
use super::types::{Consumer, OAuthError, Token};

/// Reason sent to the consumer when the user refuses access.
pub const ACCESS_DENIED: &str = "Access not granted by user.";

/// Server-side record of one rendered approval page.
///
/// The page carries only the ticket id; the decision POST is accepted once,
/// from the same user, before the ticket expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalTicket {
    pub id: String,
    pub token_key: String,
    pub user: String,
    pub expires_at: DateTime<Utc>,
}

/// Outstanding approval tickets.
#[derive(Clone)]
pub struct ApprovalTickets {
    tickets: Arc<DashMap<String, ApprovalTicket>>,
    ttl: Duration,
}

impl ApprovalTickets {
    pub fn new(ttl: Duration) -> Self {
        ApprovalTickets { tickets: Arc::new(DashMap::new()), ttl }
    }

    pub fn issue(&self, token_key: &str, user: &str) -> ApprovalTicket {
        let ticket = ApprovalTicket {
            id: Uuid::new_v4().to_string(),
            token_key: token_key.to_string(),
            user: user.to_string(),
            expires_at: Utc::now() + self.ttl,
        };
        self.tickets.insert(ticket.id.clone(), ticket.clone());
        ticket
    }

    /// Consumes a ticket. Unknown, reused, expired or foreign tickets are
    /// `ActionNotAllowed`.
    pub fn redeem(&self, id: &str, user: &str) -> Result<ApprovalTicket, OAuthError> {
        let (_, ticket) = self.tickets.remove(id).ok_or(OAuthError::ActionNotAllowed)?;
        if ticket.user != user || ticket.expires_at <= Utc::now() {
            return Err(OAuthError::ActionNotAllowed);
        }
        Ok(ticket)
    }

    /// Drops expired tickets; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.tickets.len();
        self.tickets.retain(|_, ticket| ticket.expires_at > now);
        before.saturating_sub(self.tickets.len())
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

/// Where the user agent goes once the user has decided.
///
/// Approval appends `oauth_verifier` and `oauth_token`; denial appends
/// `error`. Returns `None` for out-of-band tokens.
pub fn callback_location(token: &Token) -> Result<Option<String>, OAuthError> {
    let Some(callback) = &token.callback else {
        return Ok(None);
    };
    let mut url = Url::parse(callback).map_err(|_| OAuthError::InvalidCallback)?;
    {
        let mut query = url.query_pairs_mut();
        match token.verifier() {
            Some(verifier) => {
                query.append_pair("oauth_verifier", verifier);
                query.append_pair("oauth_token", &token.key);
            }
            None => {
                query.append_pair("error", ACCESS_DENIED);
            }
        }
    }
    Ok(Some(url.into()))
}

/// Pages shown to the user during authorization.
pub trait AuthorizationUi: Send + Sync + 'static {
    /// Approval page; must post `ticket` and `authorize_access` back to
    /// `action`.
    fn render_authorize(&self, consumer: &Consumer, token: &Token, ticket: &ApprovalTicket, action: &str) -> OAuthResponse;

    /// Result page for out-of-band consumers.
    fn render_out_of_band(&self, token: &Token) -> OAuthResponse;
}

/// Minimal HTML pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAuthorizationUi;

impl AuthorizationUi for PlainAuthorizationUi {
    fn render_authorize(&self, consumer: &Consumer, token: &Token, ticket: &ApprovalTicket, action: &str) -> OAuthResponse {
        let html = format!(
            r#"<!DOCTYPE html>
<html><body>
<h1>Authorize {name} to access {scope}?</h1>
<form method="POST" action="{action}">
    <input type="hidden" name="ticket" value="{ticket}" />
    <input type="checkbox" name="authorize_access" value="1" /> Allow
    <button type="submit">Submit</button>
</form>
</body></html>"#,
            name = escape_html(&consumer.name),
            scope = escape_html(&token.resource),
            action = escape_html(action),
            ticket = escape_html(&ticket.id),
        );
        html_response(html)
    }

    fn render_out_of_band(&self, token: &Token) -> OAuthResponse {
        let body = match token.verifier() {
            Some(verifier) => format!("<p>Your verification code is <code>{}</code>.</p>", escape_html(verifier)),
            None => format!("<p>{ACCESS_DENIED}</p>"),
        };
        html_response(format!("<!DOCTYPE html>\n<html><body>\n{body}\n</body></html>"))
    }
}

fn html_response(body: String) -> OAuthResponse {
    OAuthResponse {
        status: 200,
        headers: vec![("Content-Type".into(), "text/html; charset=utf-8".into())],
        body,
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
