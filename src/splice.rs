//! Binds a freshly-arrived client transport to a previously parked master
//! transport and starts both read loops.

use std::sync::Arc;

use crate::transport::{ConnTransport, Role};

/// Sent as a single application-level WebSocket message to the master the
/// instant a client attaches, before any client traffic is forwarded.
pub const CLIENT_CONNECTED: &[u8] = b"CLIENT_CONNECTED";

/// Binds `client` and `master` as each other's peer and sends the
/// role-appropriate attach signal to the master (`CLIENT_CONNECTED` on
/// WebSocket, a zero-length raw frame on raw). The master's read loop is
/// already running from the moment it was parked (see `http::master`), so
/// this is the only step connecting the two sides; no read loop is started
/// here.
pub async fn bind(client: &Arc<ConnTransport>, master: &Arc<ConnTransport>) -> std::io::Result<()> {
    client.set_peer(master.clone());
    master.set_peer(client.clone());

    match master.role {
        Role::WebSocket => master.send(CLIENT_CONNECTED).await,
        Role::Raw => master.send(&[]).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Kind, Transport};
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn bind_sends_client_connected_before_any_forwarding() {
        let (mut master_peer, master_end) = duplex(1024);
        let (client_transport, _client_read) = Transport::new(duplex(1024).1, Role::WebSocket, Kind::Client);
        let (master_transport, _master_read) = Transport::new(master_end, Role::WebSocket, Kind::Master);

        bind(&client_transport, &master_transport).await.unwrap();

        let mut header = [0u8; 2];
        master_peer.read_exact(&mut header).await.unwrap();
        let len = (header[1] & 0x7F) as usize;
        let mut payload = vec![0u8; len];
        master_peer.read_exact(&mut payload).await.unwrap();
        assert_eq!(payload, CLIENT_CONNECTED);
    }

    #[tokio::test]
    async fn bind_sends_zero_length_raw_attach_signal() {
        let (mut master_peer, master_end) = duplex(1024);
        let (client_transport, _client_read) = Transport::new(duplex(1024).1, Role::Raw, Kind::Client);
        let (master_transport, _master_read) = Transport::new(master_end, Role::Raw, Kind::Master);

        bind(&client_transport, &master_transport).await.unwrap();

        let mut signal = [0u8; 4];
        master_peer.read_exact(&mut signal).await.unwrap();
        assert_eq!(signal, crate::transport::raw::CLIENT_ATTACH_SIGNAL);
    }
}
