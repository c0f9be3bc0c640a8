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

//! `ssoclient` is a small demo web application for the SPŠ Ostrov SSO
//! gateway client library.
//!
//! It listens for HTTP on a TCP socket and serves two pages:
//!  * `/sso` runs the SSO login: without a `ticket` parameter the user is
//!    redirected to the gateway; with one, the ticket is checked against the
//!    gateway and the resulting user is remembered in an in-memory session
//!    keyed by a cookie. `/sso?logout=1` forgets the session.
//!  * `/` shows the logged-in user (if any) as JSON.
//!
//! When running behind a TLS-terminating proxy, the proxy is expected to set
//! `X-Forwarded-Proto: https` so that the correct back-URL is sent to the
//! gateway.

extern crate tiny_http;
extern crate base64;
extern crate getrandom;
extern crate serde_json;
extern crate threadpool;
extern crate ascii;
extern crate biscotti;
extern crate clap;
extern crate ssoclient;

#[macro_use]
extern crate slog;
extern crate slog_term;
extern crate slog_async;

mod server;
mod store;

use server::{Server, Config};
use clap::Parser;
use crate::slog::Drain;
use ssoclient::ClientConfig;
use ssoclient::sso::{DEFAULT_CHECK_URL, DEFAULT_GATEWAY_URL};

/// Command-line arguments for `ssoclient`
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address to listen for HTTP requests on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Number of threads in the request worker threadpool
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// URL of the SSO gateway login page
    #[arg(short, long, default_value = DEFAULT_GATEWAY_URL)]
    gateway_url: String,

    /// URL of the SSO gateway ticket check (may be relative to the gateway URL)
    #[arg(short = 'k', long, default_value = DEFAULT_CHECK_URL)]
    check_url: String,

    /// Name of the query parameter carrying the ticket
    #[arg(short, long, default_value = "ticket")]
    ticket_param: String,

    /// Fixed back-URL to send to the gateway instead of the request URL
    #[arg(short, long)]
    back_url: Option<String>,

    /// Timeout for the ticket check request, in milliseconds
    #[arg(long, default_value_t = 10000)]
    timeout: u64,

    /// Name of the HTTP cookie containing the session key
    #[arg(short, long, default_value = "SSO_SESSION")]
    cookie: String
}

fn main() {
    let Args { listen, workers, gateway_url, check_url, ticket_param, back_url, timeout, cookie } =
        Args::parse();

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    let log = slog::Logger::root(drain, o!());

    let sso = ClientConfig::default()
        .with_gateway_url(&gateway_url)
        .with_check_url(&check_url)
        .with_ticket_param(&ticket_param)
        .with_back_url(back_url.as_deref())
        .with_timeout(timeout);

    let config = Config { log: log.clone(), listen, workers, cookie, sso };
    let server = match Server::new(config) {
        Ok(server) => server,
        Err(why) => {
            crit!(log, "failed to start: {}", why);
            drop(log);
            std::process::exit(1);
        }
    };

    server.run();
}
