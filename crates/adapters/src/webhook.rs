// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-complete webhook dispatch.
//!
//! The validation rules here are a security contract: a completing worker
//! must not be able to aim the engine's HTTP client at loopback services,
//! RFC1918 space, or cloud metadata endpoints.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use strategos_core::{strip_sensitive_keys, WebhookAction};
use thiserror::Error;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Hostnames that resolve to metadata services regardless of IP.
const BLOCKED_HOSTS: &[&str] = &[
    "metadata.google.internal",
    "metadata.goog",
    "instance-data",
];

/// Errors from webhook validation and dispatch
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("scheme not allowed: {0}")]
    SchemeNotAllowed(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("host not allowed: {0}")]
    HostNotAllowed(String),
    #[error("host did not resolve: {0}")]
    Unresolvable(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Dispatches validated webhooks with a bounded timeout.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Validate and fire a webhook action. The body is stripped of sensitive
    /// keys before leaving the process.
    pub async fn dispatch(&self, action: &WebhookAction) -> Result<u16, WebhookError> {
        let url = self.validate(action).await?;

        let method = match action.method.to_uppercase().as_str() {
            "POST" => reqwest::Method::POST,
            "PUT" => reqwest::Method::PUT,
            other => return Err(WebhookError::MethodNotAllowed(other.to_string())),
        };

        let body = action
            .body
            .clone()
            .map(strip_sensitive_keys)
            .unwrap_or(serde_json::Value::Null);

        let response = self
            .client
            .request(method, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| WebhookError::RequestFailed(e.to_string()))?;

        Ok(response.status().as_u16())
    }

    /// Full validation: scheme, method, and host resolution against the
    /// internal-address blocklist.
    pub async fn validate(&self, action: &WebhookAction) -> Result<reqwest::Url, WebhookError> {
        let url = reqwest::Url::parse(&action.url)
            .map_err(|e| WebhookError::InvalidUrl(e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(WebhookError::SchemeNotAllowed(url.scheme().to_string()));
        }
        if !matches!(action.method.to_uppercase().as_str(), "POST" | "PUT") {
            return Err(WebhookError::MethodNotAllowed(action.method.clone()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| WebhookError::InvalidUrl("missing host".to_string()))?
            .to_string();

        if BLOCKED_HOSTS.iter().any(|b| host.eq_ignore_ascii_case(b)) {
            return Err(WebhookError::HostNotAllowed(host));
        }

        // Literal IPs validate directly; names must resolve to public space.
        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_internal_ip(ip) {
                return Err(WebhookError::HostNotAllowed(host));
            }
            return Ok(url);
        }

        let port = url.port_or_known_default().unwrap_or(443);
        let addrs: Vec<_> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|_| WebhookError::Unresolvable(host.clone()))?
            .collect();
        if addrs.is_empty() {
            return Err(WebhookError::Unresolvable(host));
        }
        for addr in addrs {
            if is_internal_ip(addr.ip()) {
                return Err(WebhookError::HostNotAllowed(host));
            }
        }

        Ok(url)
    }
}

/// Whether an address points at loopback, link-local, private, CGNAT, or
/// known metadata space.
pub fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || is_cgnat(v4)
                || v4 == Ipv4Addr::new(169, 254, 169, 254)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || is_unique_local(v6)
                || is_v6_link_local(v6)
                || v6.to_ipv4_mapped().map(IpAddr::V4).is_some_and(is_internal_ip)
        }
    }
}

/// 100.64.0.0/10
fn is_cgnat(v4: Ipv4Addr) -> bool {
    let octets = v4.octets();
    octets[0] == 100 && (64..128).contains(&octets[1])
}

/// fc00::/7
fn is_unique_local(v6: Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xfe00) == 0xfc00
}

/// fe80::/10
fn is_v6_link_local(v6: Ipv6Addr) -> bool {
    (v6.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
