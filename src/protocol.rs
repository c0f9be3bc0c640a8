/*
 * Copyright 2025, the University of Queensland
 * Author: Alex Wilson <alex@uq.edu.au>
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

//! SSO gateway ticket protocol.
//!
//! Phase 1 sends the user to the gateway with the back-URL in the `service`
//! query parameter (base64, then percent-encoded). Phase 2 sends the same
//! `service` value and the one-time `ticket` to the gateway's check URL,
//! which answers with a plain text body of `key:value` lines:
//!
//! ```text
//! login:alice
//! name:Alice A
//! group:admins
//! group:users
//! ```
//!
//! Keys may repeat (multi-valued attributes). There is no escaping: a value
//! can contain neither a newline nor, in practice, a colon.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;

pub const SERVICE_ARG: &str = "service";
pub const TICKET_ARG: &str = "ticket";

/// Attributes returned by the gateway, in the order each key was seen.
pub type AttributeMap = BTreeMap<String, Vec<String>>;

/// Failure of the server-to-server ticket check.
#[derive(Debug, PartialEq, Clone)]
pub enum ExchangeFailure {
    /// Network error, error status, or a body that is not text.
    Transport(String),
    /// The gateway answered but without `login` and `name`.
    IncompleteIdentity,
}

impl fmt::Display for ExchangeFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExchangeFailure::Transport(why) => write!(f, "ticket check failed: {}", why),
            ExchangeFailure::IncompleteIdentity =>
                write!(f, "gateway response is missing login or name"),
        }
    }
}

impl std::error::Error for ExchangeFailure {}

/// Something that can fetch the body of a check URL.
pub trait Transport {
    fn get(&self, url: &str) -> Result<String, ExchangeFailure>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &str) -> Result<String, ExchangeFailure> {
        (**self).get(url)
    }
}

/// Blocking HTTP transport.
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> HttpTransport {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        HttpTransport { agent }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<String, ExchangeFailure> {
        self.agent.get(url)
            .call()
            .map_err(|e| ExchangeFailure::Transport(e.to_string()))?
            .into_body()
            .read_to_string()
            .map_err(|e| ExchangeFailure::Transport(e.to_string()))
    }
}

fn service_value(service_url: &str) -> String {
    urlencoding::encode(&STANDARD.encode(service_url)).into_owned()
}

fn query_delim(url: &str) -> char {
    if url.contains('?') { '&' } else { '?' }
}

/// URL to send the user to for authentication.
pub fn build_redirect_url(gateway_url: &str, service_url: &str) -> String {
    format!("{}{}{}={}", gateway_url, query_delim(gateway_url),
        SERVICE_ARG, service_value(service_url))
}

/// URL the application fetches to exchange `ticket` for the user's attributes.
pub fn build_check_url(check_url: &str, service_url: &str, ticket: &str) -> String {
    format!("{}{}{}={}&{}={}", check_url, query_delim(check_url),
        SERVICE_ARG, service_value(service_url),
        TICKET_ARG, urlencoding::encode(ticket))
}

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z_]+$").unwrap());

/// Parses a gateway response body. Lines that are blank, have no `:`, or
/// whose key is not `[a-z_]+` are skipped.
pub fn parse_response(body: &str) -> AttributeMap {
    let mut data = AttributeMap::new();
    for line in body.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !KEY_RE.is_match(key) {
            continue;
        }
        data.entry(key.to_string()).or_default().push(value.to_string());
    }
    data
}

/// Fetches and parses `check_url`. No retries: the ticket is single-use.
pub fn perform_exchange<T: Transport + ?Sized>(transport: &T, check_url: &str)
    -> Result<AttributeMap, ExchangeFailure>
{
    let body = transport.get(check_url)?;
    let data = parse_response(&body);
    if !data.contains_key("login") || !data.contains_key("name") {
        return Err(ExchangeFailure::IncompleteIdentity);
    }
    Ok(data)
}
