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

//! Back-URL resolution.
//!
//! A back-URL (the "service" URL echoed through the gateway) may be given as
//! a full URL, an absolute path, a relative path, or not at all. Everything
//! here turns such a reference into a full absolute URL against a base URL,
//! which is usually the URL of the request currently being served.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// The base URL given could not be split into scheme, host and path.
#[derive(Debug, PartialEq, Clone)]
pub struct InvalidBaseUrl(pub String);

impl fmt::Display for InvalidBaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid base URL: {:?}", self.0)
    }
}

impl std::error::Error for InvalidBaseUrl {}

static BASE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*)://([^/?#:@\s]+)(?::([0-9]*))?([^?#\s]*)(\?[^#\s]*)?(#.*)?$")
        .unwrap()
});

static FULL_URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").unwrap());

/// A parsed absolute URL used as the anchor for resolving back-URLs.
#[derive(Debug, PartialEq, Clone)]
pub struct BaseUrl {
    raw: String,
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
}

impl BaseUrl {
    pub fn parse(url: &str) -> Result<BaseUrl, InvalidBaseUrl> {
        let invalid = || InvalidBaseUrl(url.to_string());
        let caps = BASE_URL_RE.captures(url).ok_or_else(invalid)?;

        let port = match caps.get(3).map(|m| m.as_str()) {
            None | Some("") => None,
            Some(p) => Some(p.parse::<u16>().map_err(|_| invalid())?),
        };
        let path = match caps.get(4).map(|m| m.as_str()) {
            None | Some("") => "/".to_string(),
            Some(p) if p.starts_with('/') => p.to_string(),
            Some(_) => return Err(invalid()),
        };

        Ok(BaseUrl {
            raw: url.to_string(),
            scheme: caps[1].to_ascii_lowercase(),
            host: caps[2].to_string(),
            port,
            path,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `scheme://host[:port]`, without a trailing slash.
    pub fn origin(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// Directory part of the path, always ending in `/`.
    fn dir_path(&self) -> &str {
        match self.path.rfind('/') {
            Some(i) => &self.path[..=i],
            None => "/",
        }
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Canonicalizes a URL path: empty and `.` segments are dropped, `..` removes
/// the previous segment. A `..` at the root is ignored rather than rejected.
pub fn canonicalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => (),
            ".." => {
                segments.pop();
            }
            _ => segments.push(seg),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Splits a reference into its path and any `?query#fragment` tail.
fn split_tail(reference: &str) -> (&str, &str) {
    match reference.find(['?', '#']) {
        Some(i) => reference.split_at(i),
        None => (reference, ""),
    }
}

/// Resolves a back-URL reference against `base`.
///
/// * absent or empty: `base` itself
/// * `http://...` or `https://...`: returned as given
/// * `/path`: re-based onto the origin of `base`
/// * anything else: relative to the directory of `base`'s path
pub fn resolve(reference: Option<&str>, base: &BaseUrl) -> String {
    let reference = match reference {
        None | Some("") => return base.as_str().to_string(),
        Some(r) => r,
    };
    if FULL_URL_RE.is_match(reference) {
        return reference.to_string();
    }

    let (path, tail) = split_tail(reference);
    let path = if reference.starts_with('/') {
        canonicalize(path)
    } else {
        canonicalize(&format!("{}{}", base.dir_path(), path))
    };
    format!("{}{}{}", base.origin(), path, tail)
}

/// As [`resolve`], but parsing `base` first.
pub fn resolve_str(reference: Option<&str>, base: &str) -> Result<String, InvalidBaseUrl> {
    let base = BaseUrl::parse(base)?;
    Ok(resolve(reference, &base))
}
