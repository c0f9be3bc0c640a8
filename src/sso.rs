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

//! The two-phase SSO login.
//!
//! A [`Client`] holds the gateway configuration and HTTP transport and is
//! shared by all requests. For each inbound request the application builds a
//! [`RequestContext`] and asks [`Client::session`] for a [`Session`], whose
//! [`Session::do_login`] either tells the application to redirect the user
//! to the gateway, or exchanges the ticket the gateway sent back.

use std::time::Duration;

use crate::identity::IdentityRecord;
use crate::path::{self, BaseUrl, InvalidBaseUrl};
use crate::protocol::{self, ExchangeFailure, HttpTransport, Transport};

pub const DEFAULT_GATEWAY_URL: &str = "https://titan.spsostrov.cz/ssogw/";
pub const DEFAULT_CHECK_URL: &str = "https://titan.spsostrov.cz/ssogw/service-check.php";

/// Configuration for creating a new [`Client`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub gateway_url: String,
    /// May be relative to `gateway_url`.
    pub check_url: String,
    pub ticket_param: String,
    /// Back-URL used when the caller does not give one; the current
    /// request URL if unset.
    pub back_url: Option<String>,
    /// Transport timeout for the check request, in milliseconds.
    pub timeout: u64,
}

impl ClientConfig {
    pub fn default() -> ClientConfig {
        ClientConfig {
            gateway_url: DEFAULT_GATEWAY_URL.into(),
            check_url: DEFAULT_CHECK_URL.into(),
            ticket_param: protocol::TICKET_ARG.into(),
            back_url: None,
            timeout: 10_000,
        }
    }

    pub fn with_gateway_url(mut self, url: &str) -> ClientConfig {
        self.gateway_url = url.into();
        self
    }

    pub fn with_check_url(mut self, url: &str) -> ClientConfig {
        self.check_url = url.into();
        self
    }

    pub fn with_ticket_param(mut self, name: &str) -> ClientConfig {
        self.ticket_param = name.into();
        self
    }

    pub fn with_back_url(mut self, url: Option<&str>) -> ClientConfig {
        self.back_url = url.map(String::from);
        self
    }

    pub fn with_timeout(mut self, millis: u64) -> ClientConfig {
        self.timeout = millis;
        self
    }
}

/// The inbound request, as far as the login needs to know it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    current: BaseUrl,
    params: Vec<(String, String)>,
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| s.clone())
}

impl RequestContext {
    /// `host` is the Host header value (possibly with a port), `uri` the
    /// request URI including any query string.
    pub fn new(secure: bool, host: &str, uri: &str) -> Result<RequestContext, InvalidBaseUrl> {
        let scheme = if secure { "https" } else { "http" };
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (uri, ""),
        };
        let current = BaseUrl::parse(&format!("{}://{}{}", scheme, host, path))?;
        let params = query.split('&')
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (decode_component(k), decode_component(v)),
                None => (decode_component(p), String::new()),
            })
            .collect();
        Ok(RequestContext { current, params })
    }

    /// Scheme, host and path of the request; the query is not included.
    pub fn current_url(&self) -> &BaseUrl {
        &self.current
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// What the application should do after [`Session::do_login`].
#[derive(Debug, PartialEq, Clone)]
pub enum LoginOutcome {
    /// Redirect the user to this gateway URL and end the request.
    Redirect(String),
    Verified(IdentityRecord),
    /// The ticket could not be verified; treat the user as anonymous.
    Anonymous,
}

/// SSO gateway client, shared between requests.
pub struct Client<T: Transport = HttpTransport> {
    gateway_url: String,
    check_url: String,
    ticket_param: String,
    back_url: Option<String>,
    transport: T,
}

impl Client<HttpTransport> {
    pub fn new(config: ClientConfig, log: slog::Logger) -> Result<Client, InvalidBaseUrl> {
        let transport = HttpTransport::new(Duration::from_millis(config.timeout));
        Client::with_transport(config, transport, log)
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(config: ClientConfig, transport: T, log: slog::Logger)
        -> Result<Client<T>, InvalidBaseUrl>
    {
        let gateway = BaseUrl::parse(&config.gateway_url)?;
        let check_url = path::resolve(Some(config.check_url.as_str()), &gateway);
        BaseUrl::parse(&check_url)?;

        debug!(log, "using SSO gateway {}, check URL {}", &config.gateway_url, &check_url);
        Ok(Client {
            gateway_url: config.gateway_url,
            check_url,
            ticket_param: config.ticket_param,
            back_url: config.back_url,
            transport,
        })
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn check_url(&self) -> &str {
        &self.check_url
    }

    pub fn session<'a>(&'a self, req: &'a RequestContext, log: &slog::Logger) -> Session<'a, T> {
        let log = log.new(o!("service" => req.current_url().to_string()));
        Session { client: self, req, log }
    }
}

/// The login procedure for one inbound request.
pub struct Session<'a, T: Transport = HttpTransport> {
    client: &'a Client<T>,
    req: &'a RequestContext,
    log: slog::Logger,
}

impl<'a, T: Transport> Session<'a, T> {
    /// The ticket the gateway passed back, if this is the return leg.
    pub fn ticket(&self) -> Option<&'a str> {
        self.req.param(&self.client.ticket_param)
    }

    fn service_url(&self, back_url: Option<&str>) -> String {
        let back_url = back_url.or(self.client.back_url.as_deref());
        path::resolve(back_url, self.req.current_url())
    }

    /// Gateway URL to send the user to for the first phase.
    pub fn redirect_url(&self, back_url: Option<&str>) -> String {
        protocol::build_redirect_url(&self.client.gateway_url, &self.service_url(back_url))
    }

    /// Second phase: exchange the ticket (by default the one in the request)
    /// for the user's identity. Every failure means "no user".
    pub fn login_credentials(&self, ticket: Option<&str>, back_url: Option<&str>)
        -> Option<IdentityRecord>
    {
        let ticket = ticket.or(self.ticket())?;
        let service = self.service_url(back_url);
        let check_url = protocol::build_check_url(&self.client.check_url, &service, ticket);

        debug!(self.log, "checking ticket with gateway"; "check_url" => check_url.clone());
        let data = match protocol::perform_exchange(&self.client.transport, &check_url) {
            Ok(data) => data,
            Err(ExchangeFailure::Transport(why)) => {
                error!(self.log, "ticket check request failed: {}", why);
                return None;
            },
            Err(ExchangeFailure::IncompleteIdentity) => {
                warn!(self.log, "gateway did not return login and name");
                return None;
            }
        };

        match IdentityRecord::from_attributes(data) {
            Ok(user) => {
                info!(self.log, "verified SSO user"; "user" => user.login.clone());
                Some(user)
            },
            Err(err) => {
                crit!(self.log, "could not build identity from checked attributes: {}", err);
                None
            }
        }
    }

    /// Runs whichever phase applies to this request.
    pub fn do_login(&self) -> LoginOutcome {
        if self.ticket().is_none() {
            let url = self.redirect_url(None);
            info!(self.log, "redirecting to SSO gateway");
            return LoginOutcome::Redirect(url);
        }
        match self.login_credentials(None, None) {
            Some(user) => LoginOutcome::Verified(user),
            None => LoginOutcome::Anonymous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Recording {
        body: Result<String, ExchangeFailure>,
        urls: RefCell<Vec<String>>,
    }

    impl Recording {
        fn new(body: Result<&str, ExchangeFailure>) -> Recording {
            Recording { body: body.map(String::from), urls: RefCell::new(Vec::new()) }
        }
    }

    impl Transport for Recording {
        fn get(&self, url: &str) -> Result<String, ExchangeFailure> {
            self.urls.borrow_mut().push(url.to_string());
            self.body.clone()
        }
    }

    fn log() -> slog::Logger {
        slog::Logger::root(slog::Discard, o!())
    }

    fn client(body: Result<&str, ExchangeFailure>) -> Client<Recording> {
        let config = ClientConfig::default()
            .with_gateway_url("https://gw.example/sso/")
            .with_check_url("check.php");
        Client::with_transport(config, Recording::new(body), log()).unwrap()
    }

    #[test]
    fn config_urls_are_validated_and_resolved() {
        let c = client(Ok(""));
        assert_eq!(c.check_url(), "https://gw.example/sso/check.php");

        let bad = ClientConfig::default().with_gateway_url("gw.example/sso/");
        assert!(Client::with_transport(bad, Recording::new(Ok("")), log()).is_err());
    }

    #[test]
    fn request_context_parses_uri() {
        let req = RequestContext::new(true, "app.example:8443", "/dir/page?ticket=ST%2D1&x=a+b&x=2&flag")
            .unwrap();
        assert_eq!(req.current_url().as_str(), "https://app.example:8443/dir/page");
        assert_eq!(req.param("ticket"), Some("ST-1"));
        assert_eq!(req.param("x"), Some("a b"));
        assert_eq!(req.param("flag"), Some(""));
        assert_eq!(req.param("missing"), None);

        assert!(RequestContext::new(false, "", "/").is_err());
    }

    #[test]
    fn no_ticket_redirects_to_gateway() {
        let c = client(Ok(""));
        let req = RequestContext::new(false, "app.example", "/page?a=1").unwrap();
        let outcome = c.session(&req, &log()).do_login();
        // base64("http://app.example/page")
        assert_eq!(outcome, LoginOutcome::Redirect(
            "https://gw.example/sso/?service=aHR0cDovL2FwcC5leGFtcGxlL3BhZ2U%3D".into()));
        assert!(c.transport.urls.borrow().is_empty());
    }

    #[test]
    fn ticket_is_exchanged() {
        let c = client(Ok("login:carol\nname:Carol C\n"));
        let req = RequestContext::new(false, "app.example", "/page?ticket=abc").unwrap();
        let outcome = c.session(&req, &log()).do_login();
        match outcome {
            LoginOutcome::Verified(user) => {
                assert_eq!(user.login, "carol");
                assert_eq!(user.name, "Carol C");
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(*c.transport.urls.borrow(), vec![
            "https://gw.example/sso/check.php?service=aHR0cDovL2FwcC5leGFtcGxlL3BhZ2U%3D&ticket=abc"
                .to_string()
        ]);
    }

    #[test]
    fn failed_exchange_is_anonymous() {
        let req = RequestContext::new(false, "app.example", "/page?ticket=abc").unwrap();

        let c = client(Err(ExchangeFailure::Transport("timed out".into())));
        assert_eq!(c.session(&req, &log()).do_login(), LoginOutcome::Anonymous);

        let c = client(Ok("login:carol\n"));
        assert_eq!(c.session(&req, &log()).do_login(), LoginOutcome::Anonymous);
    }

    #[test]
    fn back_url_override() {
        let c = client(Ok("login:carol\nname:Carol C\n"));
        let req = RequestContext::new(true, "app.example", "/a/b/page").unwrap();
        let s = c.session(&req, &log());
        // base64("https://app.example/a/done")
        assert_eq!(s.redirect_url(Some("../done")),
            "https://gw.example/sso/?service=aHR0cHM6Ly9hcHAuZXhhbXBsZS9hL2RvbmU%3D");

        assert_eq!(s.login_credentials(None, None), None);
        assert!(s.login_credentials(Some("t1"), Some("/a/done")).is_some());
        assert!(c.transport.urls.borrow()[0].ends_with("aHR0cHM6Ly9hcHAuZXhhbXBsZS9hL2RvbmU%3D&ticket=t1"));
    }

    #[test]
    fn custom_ticket_param() {
        let config = ClientConfig::default()
            .with_ticket_param("token")
            .with_back_url(Some("https://app.example/fixed"));
        let c = Client::with_transport(config, Recording::new(Ok("login:a\nname:A\n")), log()).unwrap();
        let req = RequestContext::new(false, "app.example", "/page?ticket=ignored").unwrap();
        assert!(matches!(c.session(&req, &log()).do_login(), LoginOutcome::Redirect(_)));

        let req = RequestContext::new(false, "app.example", "/page?token=t").unwrap();
        assert!(matches!(c.session(&req, &log()).do_login(), LoginOutcome::Verified(_)));
        assert!(c.transport.urls.borrow()[0]
            .starts_with("https://titan.spsostrov.cz/ssogw/service-check.php?service="));
    }
}
