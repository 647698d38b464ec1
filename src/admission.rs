// SPDX-License-Identifier: MIT

//! Request admission: quota check, then path rules, then user-agent rules.
//!
//! Every request costs one counter increment before anything else is
//! evaluated, even if a blocklist rule would deny it anyway. A quota denial
//! short-circuits the blocklist checks; a blocklist denial escalates the
//! client's count by a full limit so its follow-up requests are denied by
//! the cheaper quota check.

use crate::blocklist::RuleStore;
use crate::handlers::AppState;
use crate::limiter::ClientTable;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Client exceeded its request quota
    RateLimited,
    /// Request path matched a blocklist rule
    PathBlocked,
    /// User agent matched a blocklist rule
    UserAgentBlocked,
}

impl DenyReason {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::PathBlocked | Self::UserAgentBlocked => StatusCode::FORBIDDEN,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::RateLimited => {
                "You have exceeded the number of allowed requests. Please wait before trying again."
            }
            Self::PathBlocked => "Access forbidden: This path is restricted.",
            Self::UserAgentBlocked => "Access temporarily blocked due to User-Agent restrictions.",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limit exceeded"),
            Self::PathBlocked => write!(f, "path restricted"),
            Self::UserAgentBlocked => write!(f, "user-agent restricted"),
        }
    }
}

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// The request-time decision function over the counter table and the active
/// blocklist snapshot.
pub struct AdmissionControl {
    table: Arc<ClientTable>,
    rules: Arc<RuleStore>,
}

impl AdmissionControl {
    pub fn new(table: Arc<ClientTable>, rules: Arc<RuleStore>) -> Self {
        Self { table, rules }
    }

    /// Decide whether to admit one request.
    ///
    /// An absent user agent is treated as the empty string, so rules that
    /// match the empty string block agent-less clients.
    pub async fn admit(
        &self,
        client_id: &str,
        path: &str,
        accept: Option<&str>,
        user_agent: Option<&str>,
    ) -> Verdict {
        let wildcard_accept = accept == Some("*/*");
        let check = self.table.record_and_check(client_id, wildcard_accept).await;
        if check.exceeded {
            info!(client = %client_id, count = check.count, "Quota exceeded");
            return Verdict::Deny(DenyReason::RateLimited);
        }

        // One snapshot for the whole evaluation; a concurrent refresh is
        // invisible to this request.
        let rules = self.rules.current().await;

        if let Some(rule) = rules.matched_path_rule(path) {
            warn!(client = %client_id, path = %path, rule = %rule.as_str(), "Blocked by path rule");
            self.table.penalize(client_id).await;
            return Verdict::Deny(DenyReason::PathBlocked);
        }

        let user_agent = user_agent.unwrap_or("");
        if let Some(rule) = rules.matched_user_agent_rule(user_agent) {
            warn!(
                client = %client_id,
                user_agent = %user_agent,
                rule = %rule.as_str(),
                "Blocked by user-agent rule"
            );
            self.table.penalize(client_id).await;
            return Verdict::Deny(DenyReason::UserAgentBlocked);
        }

        debug!(client = %client_id, count = check.count, "Request admitted");
        Verdict::Allow
    }
}

/// Deny response body.
#[derive(Debug, Serialize)]
struct DenyResponse {
    message: &'static str,
}

/// axum middleware wrapping [`AdmissionControl::admit`].
///
/// On a quota denial the full header set is logged for diagnostics and the
/// response is delayed by the configured `deny_delay` to slow automated
/// retry loops. The allow path and the blocklist denials respond
/// immediately.
pub async fn admission_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = addr.ip().to_string();
    let path = request.uri().path();
    let accept = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    let verdict = state
        .admission
        .admit(&client_id, path, accept, user_agent)
        .await;

    match verdict {
        Verdict::Allow => next.run(request).await,
        Verdict::Deny(reason) => {
            if reason == DenyReason::RateLimited {
                warn!(client = %client_id, headers = ?request.headers(), "Rate-limited request headers");
                tokio::time::sleep(state.config.rate_limit.deny_delay()).await;
            }
            (
                reason.status(),
                Json(DenyResponse {
                    message: reason.message(),
                }),
            )
                .into_response()
        }
    }
}
