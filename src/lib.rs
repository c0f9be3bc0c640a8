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

//! Client side of the SPŠ Ostrov SSO gateway.
//!
//! An unauthenticated user is redirected to the gateway with the URL they
//! should come back to (the "service" URL). After logging in, the gateway
//! sends them back with a one-time `ticket` parameter, which the application
//! exchanges server-to-server at the gateway's check URL for the user's
//! attributes.
//!
//! ```no_run
//! # #[macro_use] extern crate slog;
//! use ssoclient::{Client, ClientConfig, LoginOutcome, RequestContext};
//!
//! # fn main() {
//! let log = slog::Logger::root(slog::Discard, o!());
//! let client = Client::new(ClientConfig::default(), log.clone()).unwrap();
//! let req = RequestContext::new(true, "app.example", "/login?ticket=ST-123").unwrap();
//! match client.session(&req, &log).do_login() {
//!     LoginOutcome::Redirect(url) => println!("302 -> {}", url),
//!     LoginOutcome::Verified(user) => println!("hello {}", user.name),
//!     LoginOutcome::Anonymous => println!("not logged in"),
//! }
//! # }
//! ```

extern crate base64;
extern crate chrono;
extern crate regex;
extern crate serde;
extern crate ureq;
extern crate urlencoding;

#[macro_use]
extern crate slog;

pub mod identity;
pub mod path;
pub mod protocol;
pub mod sso;

pub use identity::{ConstructionFailure, IdentityRecord, IdentityView};
pub use path::{BaseUrl, InvalidBaseUrl};
pub use protocol::{AttributeMap, ExchangeFailure, HttpTransport, Transport};
pub use sso::{Client, ClientConfig, LoginOutcome, RequestContext, Session};
