//! Keeps NAT/firewall bindings alive on idle WebSocket connections by
//! periodically pinging every transport the HTTP layer has registered here,
//! independent of whether it is parked or spliced.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::transport::ConnTransport;

pub struct PingRegistry {
    transports: Mutex<Vec<Weak<ConnTransport>>>,
}

impl PingRegistry {
    pub fn new() -> Arc<PingRegistry> {
        Arc::new(PingRegistry {
            transports: Mutex::new(Vec::new()),
        })
    }

    /// Registers `transport` for pinging. Held as a `Weak` reference so this
    /// registry never keeps a connection alive on its own.
    pub fn track(&self, transport: &Arc<ConnTransport>) {
        self.transports.lock().push(Arc::downgrade(transport));
    }

    /// Runs forever, waking every `interval` to ping each tracked transport
    /// that is still live and dropping the dead weak references it finds.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it

        loop {
            ticker.tick().await;
            let live: Vec<Arc<ConnTransport>> = {
                let mut transports = self.transports.lock();
                transports.retain(|weak| weak.strong_count() > 0);
                transports.iter().filter_map(Weak::upgrade).collect()
            };

            for transport in live {
                if transport.is_closed() {
                    continue;
                }
                if let Err(err) = transport.send_ping().await {
                    tracing::debug!(transport_id = transport.id, error = %err, "ping failed, closing");
                    transport.close();
                }
            }
        }
    }
}
