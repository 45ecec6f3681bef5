// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use strategos_core::WebhookAction;

fn action(url: &str, method: &str) -> WebhookAction {
    WebhookAction {
        url: url.to_string(),
        method: method.to_string(),
        body: None,
    }
}

#[yare::parameterized(
    loopback_v4     = { "127.0.0.1", true },
    loopback_high   = { "127.8.8.8", true },
    private_10      = { "10.0.0.5", true },
    private_172     = { "172.16.3.4", true },
    private_192     = { "192.168.1.1", true },
    link_local      = { "169.254.0.1", true },
    metadata        = { "169.254.169.254", true },
    cgnat           = { "100.64.0.1", true },
    unspecified     = { "0.0.0.0", true },
    public          = { "93.184.216.34", false },
    public_dns      = { "8.8.8.8", false },
    loopback_v6     = { "::1", true },
    unique_local_v6 = { "fd00::1", true },
    link_local_v6   = { "fe80::1", true },
    mapped_private  = { "::ffff:192.168.0.1", true },
    public_v6       = { "2606:2800:220:1:248:1893:25c8:1946", false },
)]
fn internal_ip_detection(ip: &str, internal: bool) {
    let parsed: std::net::IpAddr = ip.parse().unwrap();
    assert_eq!(is_internal_ip(parsed), internal, "ip: {ip}");
}

#[tokio::test]
async fn rejects_loopback_literal_url() {
    let d = WebhookDispatcher::new();
    let err = d
        .validate(&action("http://127.0.0.1:8080/hook", "POST"))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::HostNotAllowed(_)));
}

#[tokio::test]
async fn rejects_private_literal_url() {
    let d = WebhookDispatcher::new();
    let err = d
        .validate(&action("https://192.168.1.10/hook", "PUT"))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::HostNotAllowed(_)));
}

#[tokio::test]
async fn rejects_metadata_hostname() {
    let d = WebhookDispatcher::new();
    let err = d
        .validate(&action("http://metadata.google.internal/computeMetadata", "POST"))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::HostNotAllowed(_)));
}

#[yare::parameterized(
    ftp  = { "ftp://example.com/x" },
    file = { "file:///etc/passwd" },
    gopher = { "gopher://example.com/" },
)]
fn rejects_non_http_schemes(url: &str) {
    let d = WebhookDispatcher::new();
    let err = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(d.validate(&action(url, "POST")))
        .unwrap_err();
    assert!(matches!(err, WebhookError::SchemeNotAllowed(_)));
}

#[tokio::test]
async fn rejects_get_method() {
    let d = WebhookDispatcher::new();
    let err = d
        .validate(&action("https://93.184.216.34/hook", "GET"))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::MethodNotAllowed(_)));
}

#[tokio::test]
async fn accepts_public_literal_with_post() {
    let d = WebhookDispatcher::new();
    let url = d
        .validate(&action("https://93.184.216.34/hook", "POST"))
        .await
        .unwrap();
    assert_eq!(url.scheme(), "https");
}
