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

use threadpool::ThreadPool;
use tiny_http::{Request, Response, Header, StatusCode, HeaderField};
use std::io::Cursor;
use std::sync::Arc;
use ascii::AsciiString;
use biscotti::{Processor, ProcessorConfig, RequestCookies, ResponseCookie};

use ssoclient::{Client, ClientConfig, LoginOutcome, RequestContext};

use crate::store::{SessionKey, Store};

#[derive(Debug, Clone)]
pub struct Config {
    pub log: slog::Logger,
    pub listen: String,
    pub workers: usize,
    pub cookie: String,
    pub sso: ClientConfig,
}

impl Config {
    pub fn with_log(mut self, log: slog::Logger) -> Self {
        self.log = log;
        self
    }
}

pub struct Server {
    config: Config,
    server: tiny_http::Server,
    pool: ThreadPool,
    client: Arc<Client>,
    store: Arc<Store>,
}

pub type Result<T> = std::result::Result<T, String>;

type HttpResponse = Response<Cursor<Vec<u8>>>;

fn header(name: &str, value: &str) -> Result<Header> {
    let field: HeaderField = name.parse()
        .map_err(|_| format!("invalid header name {:?}", name))?;
    let value = AsciiString::from_ascii(value.as_bytes())
        .map_err(|_| format!("non-ASCII value for header {:?}", name))?;
    Ok(Header { field, value })
}

fn text(status: u16, body: &str) -> Result<HttpResponse> {
    Ok(Response::from_string(body)
        .with_status_code(StatusCode(status))
        .with_header(header("content-type", "text/plain")?))
}

fn redirect(location: &str) -> Result<HttpResponse> {
    Ok(text(302, "Redirecting")?.with_header(header("location", location)?))
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        let pool = ThreadPool::new(config.workers);
        let server = tiny_http::Server::http(config.listen.as_str())
            .map_err(|e| format!("failed to listen on {}: {}", &config.listen, e))?;
        let client = Client::new(config.sso.clone(), config.log.clone())
            .map_err(|e| e.to_string())?;
        Ok(Server {
            config,
            server,
            pool,
            client: Arc::new(client),
            store: Arc::new(Store::new()),
        })
    }

    pub fn run(&self) {
        let log = &self.config.log;
        info!(log, "listening for requests on {}", &self.config.listen);
        for request in self.server.incoming_requests() {
            let rlog = log.new(o!());
            let config = self.config.clone().with_log(rlog);
            let client = self.client.clone();
            let store = self.store.clone();
            self.pool.execute(move || {
                let resp = match Self::process(&config, &client, &store, &request) {
                    Ok(resp) => resp,
                    Err(why) => {
                        error!(config.log, "request failed: {}", &why);
                        Response::from_string(why).with_status_code(StatusCode(500))
                    }
                };
                if let Err(err) = request.respond(resp) {
                    warn!(config.log, "failed to send response: {}", err);
                }
            });
        }
    }

    fn find_cookie(config: &Config, req: &Request) -> Option<SessionKey> {
        let ckh: HeaderField = "cookie".parse().ok()?;
        let ck_hdrs = req.headers().iter().filter_map(|h|
            if h.field == ckh { Some(h.value.to_string()) } else { None });
        let ck_proc: Processor = ProcessorConfig::default().into();
        for v in ck_hdrs {
            let cookies = RequestCookies::parse_header(v.as_str(), &ck_proc).ok()?;
            if let Some(cookie) = cookies.get(config.cookie.as_str()) {
                return Some(SessionKey::from(cookie.value()));
            }
        }
        None
    }

    fn find_one_header(req: &Request, name: &str) -> Result<String> {
        let hf: HeaderField = name.parse()
            .map_err(|_| format!("invalid header name {:?}", name))?;
        let mut hdrs = req.headers().iter().filter_map(|h|
            if h.field == hf { Some(h.value.to_string()) } else { None });
        if let Some(value) = hdrs.next() {
            Ok(value)
        } else {
            Err(format!("request contained no {:?} header", name))
        }
    }

    fn process(config: &Config, client: &Client, store: &Store, req: &Request)
        -> Result<HttpResponse>
    {
        let host = Self::find_one_header(req, "host")?;
        let uri = req.url().to_string();

        let mut log = config.log.new(o!("host" => host.clone(), "uri" => uri.clone()));
        if let Ok(req_id) = Self::find_one_header(req, "x-request-id") {
            log = log.new(o!("request-id" => req_id));
        }

        let secure = matches!(Self::find_one_header(req, "x-forwarded-proto").as_deref(),
            Ok("https"));
        let ctx = RequestContext::new(secure, &host, &uri).map_err(|e| e.to_string())?;
        let key = Self::find_cookie(config, req);

        match ctx.current_url().path() {
            "/" => {
                let user = key.as_ref().and_then(|k| store.get(k));
                match user {
                    Some(u) => {
                        let json = serde_json::to_string_pretty(&u.view())
                            .map_err(|e| e.to_string())?;
                        Ok(Response::from_string(json)
                            .with_status_code(StatusCode(200))
                            .with_header(header("content-type", "application/json")?))
                    },
                    None => text(200, "No user currently logged in.\n"),
                }
            },
            "/sso" => {
                if ctx.param("logout").is_some_and(|v| !v.is_empty()) {
                    if let Some(k) = key {
                        store.remove(&k);
                    }
                    info!(log, "logged out");
                    return redirect("/");
                }
                match client.session(&ctx, &log).do_login() {
                    LoginOutcome::Redirect(url) => redirect(&url),
                    LoginOutcome::Verified(user) => {
                        if let Some(k) = key {
                            store.remove(&k);
                        }
                        log = log.new(o!("user" => user.login.clone()));
                        let new_key = store.create(user)?;
                        info!(log, "user logged in");
                        let cookie = ResponseCookie::new(config.cookie.as_str(), new_key.as_str())
                            .set_path("/")
                            .set_http_only(true);
                        Ok(redirect("/")?.with_header(header("set-cookie", &cookie.to_string())?))
                    },
                    LoginOutcome::Anonymous => {
                        if let Some(k) = key {
                            store.remove(&k);
                        }
                        info!(log, "login failed, continuing anonymously");
                        redirect("/")
                    }
                }
            },
            _ => text(404, "Not found\n"),
        }
    }
}
