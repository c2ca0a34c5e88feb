//! The session registry: a key → `GameSession` map with opportunistic
//! expiry, swept on every mutation rather than on a timer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::Error;
use crate::session::{generate_key, generate_secret, GameSession, Registration};

/// How many times `Register` retries past a key collision before giving up.
/// Collisions are astronomically unlikely at 5 chars from a 36-symbol
/// alphabet (~60 million possibilities); this bound only exists so a
/// pathological RNG can't wedge the handler in an infinite loop.
const MAX_REGISTER_ATTEMPTS: usize = 8;

pub struct Registry {
    sessions: RwLock<HashMap<String, Arc<GameSession>>>,
    idle: Duration,
}

impl Registry {
    pub fn new(idle: Duration) -> Arc<Registry> {
        Arc::new(Registry {
            sessions: RwLock::new(HashMap::new()),
            idle,
        })
    }

    fn sweep(&self) {
        let expired: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| session.sweep_if_expired(self.idle))
            .map(|(key, _)| key.clone())
            .collect();

        if expired.is_empty() {
            return;
        }
        let mut sessions = self.sessions.write();
        for key in expired {
            // Re-check under the write lock: a park/grab may have refreshed
            // the deadline between the read-locked scan above and here.
            if sessions.get(&key).is_some_and(|s| s.sweep_if_expired(self.idle)) {
                sessions.remove(&key);
                tracing::info!(key = %key, "session expired");
            }
        }
    }

    pub fn register(&self, reg: Registration, observed_public_address: String) -> Result<(String, String), Error> {
        self.sweep();

        let mut sessions = self.sessions.write();
        for _ in 0..MAX_REGISTER_ATTEMPTS {
            let key = generate_key();
            if sessions.contains_key(&key) {
                continue;
            }
            let secret = generate_secret();
            let session = GameSession::new(key.clone(), secret.clone(), reg, observed_public_address, self.idle);
            sessions.insert(key.clone(), session);
            tracing::info!(key = %key, "session registered");
            return Ok((key, secret));
        }
        Err(Error::KeyCollision)
    }

    pub fn find(&self, key: &str) -> Option<Arc<GameSession>> {
        self.sweep();
        self.sessions.read().get(key).cloned()
    }

    pub fn list_public(&self, game_name: &str) -> Vec<Arc<GameSession>> {
        self.sweep();
        self.sessions
            .read()
            .values()
            .filter(|session| session.public && session.game_name == game_name)
            .cloned()
            .collect()
    }
}
