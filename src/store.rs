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

//! In-memory session store for the demo daemon.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::{engine::general_purpose::URL_SAFE, Engine as _};

use ssoclient::IdentityRecord;

/// Random session key, 24 bytes of url-safe base64 (32 characters).
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn random() -> Result<SessionKey, String> {
        let mut buf = [0u8; 24];
        getrandom::fill(&mut buf).map_err(|e| format!("getrandom failed: {}", e))?;
        Ok(SessionKey(URL_SAFE.encode(buf)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        SessionKey(value.to_string())
    }
}

/// Logged-in users by session key.
pub struct Store {
    sessions: Mutex<HashMap<SessionKey, IdentityRecord>>,
}

impl Store {
    pub fn new() -> Self {
        Store { sessions: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionKey, IdentityRecord>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &SessionKey) -> Option<IdentityRecord> {
        self.lock().get(key).cloned()
    }

    pub fn create(&self, user: IdentityRecord) -> Result<SessionKey, String> {
        let key = SessionKey::random()?;
        self.lock().insert(key.clone(), user);
        Ok(key)
    }

    pub fn remove(&self, key: &SessionKey) -> Option<IdentityRecord> {
        self.lock().remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssoclient::protocol::parse_response;

    fn user(login: &str) -> IdentityRecord {
        let body = format!("login:{}\nname:Test User\n", login);
        IdentityRecord::from_attributes(parse_response(&body)).unwrap()
    }

    #[test]
    fn random_keys_differ() {
        let a = SessionKey::random().unwrap();
        let b = SessionKey::random().unwrap();
        assert_eq!(a.as_str().len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn create_get_remove() {
        let store = Store::new();
        let key = store.create(user("eve")).unwrap();
        assert_eq!(store.get(&key).map(|u| u.login), Some("eve".to_string()));
        assert_eq!(store.get(&SessionKey::from("nope")), None);
        assert!(store.remove(&key).is_some());
        assert_eq!(store.get(&key), None);
    }
}
