//! Accept loop: bounded admission of new connections.
//!
//! Each accepted socket gets a short-lived login task. Admission capacity is
//! the channel's: when no slot can be reserved the connection is closed on
//! the spot instead of queueing unbounded.

use crate::error::ServerError;
use crate::profile::ProfileStore;
use crate::registry::Registry;
use crate::session::Session;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct Listener {
    socket: TcpListener,
    admissions: mpsc::Sender<Session>,
    registry: Arc<Registry>,
    store: Arc<dyn ProfileStore>,
}

impl Listener {
    pub async fn bind(
        addr: &str,
        admissions: mpsc::Sender<Session>,
        registry: Arc<Registry>,
        store: Arc<dyn ProfileStore>,
    ) -> Result<Self, ServerError> {
        let socket = TcpListener::bind(addr).await?;
        info!("listening on {}", socket.local_addr()?);
        Ok(Listener {
            socket,
            admissions,
            registry,
            store,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn run(self) {
        loop {
            let (stream, addr) = match self.socket.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    continue;
                }
            };

            // Over-capacity connections are refused outright.
            let permit = match self.admissions.clone().try_reserve_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("admission queue full, refusing {}", addr);
                    continue;
                }
            };

            let registry = Arc::clone(&self.registry);
            let store = Arc::clone(&self.store);
            tokio::spawn(async move {
                match Session::login(stream, registry, store).await {
                    Ok(session) => {
                        permit.send(session);
                    }
                    Err(e) => debug!("login from {} refused: {}", addr, e),
                }
            });
        }
    }
}
