//! `GameSession`: one registration's descriptor plus its two parking slots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;

use crate::transport::ConnTransport;

const KEY_LENGTH: usize = 5;
const SECRET_LENGTH: usize = 32;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect()
}

pub fn generate_key() -> String {
    random_token(KEY_LENGTH)
}

pub fn generate_secret() -> String {
    random_token(SECRET_LENGTH)
}

/// The fields a server supplies at registration time.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub game_name: String,
    pub game_version: i64,
    pub public: bool,
    pub advertised_addresses: Vec<String>,
    pub port: u16,
}

/// The JSON-facing view of a session, with `AddressesFor` already applied.
#[derive(Debug, Serialize)]
pub struct SessionDescriptor {
    pub key: String,
    pub name: String,
    pub game_name: String,
    pub game_version: i64,
    pub public: bool,
    pub address: Vec<String>,
    pub port: u16,
}

pub struct GameSession {
    pub key: String,
    pub secret: String,
    pub name: String,
    pub game_name: String,
    pub game_version: i64,
    pub public: bool,
    pub advertised_addresses: Vec<String>,
    pub port: u16,
    pub observed_public_address: String,
    parked_ws: Mutex<Option<Arc<ConnTransport>>>,
    parked_raw: Mutex<Option<Arc<ConnTransport>>>,
    deadline: Mutex<Instant>,
}

impl GameSession {
    pub fn new(key: String, secret: String, reg: Registration, observed_public_address: String, idle: Duration) -> Arc<GameSession> {
        Arc::new(GameSession {
            key,
            secret,
            name: reg.name,
            game_name: reg.game_name,
            game_version: reg.game_version,
            public: reg.public,
            advertised_addresses: reg.advertised_addresses,
            port: reg.port,
            observed_public_address,
            parked_ws: Mutex::new(None),
            parked_raw: Mutex::new(None),
            deadline: Mutex::new(Instant::now() + idle),
        })
    }

    pub fn descriptor(&self, remote_ip: &str) -> SessionDescriptor {
        SessionDescriptor {
            key: self.key.clone(),
            name: self.name.clone(),
            game_name: self.game_name.clone(),
            game_version: self.game_version,
            public: self.public,
            address: self.addresses_for(remote_ip),
            port: self.port,
        }
    }

    /// §4.4 `AddressesFor`: same-subnet clients (observed from the same
    /// public address as the registering server) also get the advertised
    /// LAN-local addresses; everyone else only gets the observed address.
    pub fn addresses_for(&self, remote_ip: &str) -> Vec<String> {
        if remote_ip == self.observed_public_address {
            let mut addrs = self.advertised_addresses.clone();
            addrs.push(self.observed_public_address.clone());
            addrs
        } else {
            vec![self.observed_public_address.clone()]
        }
    }

    fn slot(&self, role: crate::transport::Role) -> &Mutex<Option<Arc<ConnTransport>>> {
        match role {
            crate::transport::Role::WebSocket => &self.parked_ws,
            crate::transport::Role::Raw => &self.parked_raw,
        }
    }

    /// Parks `transport`, displacing and closing whatever previously
    /// occupied the slot (P5), and refreshes the idle deadline.
    pub fn park(&self, role: crate::transport::Role, transport: Arc<ConnTransport>, idle: Duration) {
        let slot = self.slot(role);
        let displaced = slot.lock().replace(transport);
        if let Some(displaced) = displaced {
            displaced.close();
        }
        self.refresh_deadline(idle);
    }

    /// Atomically clears and returns whatever was parked, if anything (P4).
    pub fn grab(&self, role: crate::transport::Role) -> Option<Arc<ConnTransport>> {
        self.slot(role).lock().take()
    }

    pub fn refresh_deadline(&self, idle: Duration) {
        *self.deadline.lock() = Instant::now() + idle;
    }

    /// A session is swept when its deadline has elapsed and neither parked
    /// slot holds a transport that is still live; observing a live parked
    /// transport refreshes the deadline instead of sweeping it.
    pub fn sweep_if_expired(&self, idle: Duration) -> bool {
        let ws_live = self.parked_ws.lock().as_ref().is_some_and(|t| !t.is_closed());
        let raw_live = self.parked_raw.lock().as_ref().is_some_and(|t| !t.is_closed());

        if ws_live || raw_live {
            self.refresh_deadline(idle);
            return false;
        }

        Instant::now() > *self.deadline.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_five_chars_from_the_alphabet() {
        for _ in 0..200 {
            let key = generate_key();
            assert_eq!(key.len(), KEY_LENGTH);
            assert!(key.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn secrets_are_32_chars_from_the_alphabet() {
        for _ in 0..200 {
            let secret = generate_secret();
            assert_eq!(secret.len(), SECRET_LENGTH);
            assert!(secret.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn addresses_for_same_subnet_includes_advertised_and_observed() {
        let reg = Registration {
            name: "A".into(),
            game_name: "g".into(),
            game_version: 1,
            public: true,
            advertised_addresses: vec!["192.168.1.2".into()],
            port: 7777,
        };
        let session = GameSession::new("ABCDE".into(), generate_secret(), reg, "203.0.113.5".into(), Duration::from_secs(60));
        assert_eq!(session.addresses_for("203.0.113.5"), vec!["192.168.1.2", "203.0.113.5"]);
        assert_eq!(session.addresses_for("198.51.100.1"), vec!["203.0.113.5"]);
    }
}
