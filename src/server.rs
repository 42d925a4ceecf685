//! Relay state and accept loop
//!
//! `RelayState` bundles the collaborators every connection task needs. It is
//! built once at startup and cloned into each task; nothing here is global.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::AppError;
use crate::handler::handle_connection;
use crate::identity::IdentityDirectory;
use crate::room::RoomKeyMode;
use crate::router::RouterHandle;
use crate::store::MessageStore;

/// Default per-session outbox capacity
pub const DEFAULT_OUTBOX_SIZE: usize = 64;

/// Shared handles for connection tasks
#[derive(Clone)]
pub struct RelayState {
    pub directory: Arc<dyn IdentityDirectory>,
    pub store: Arc<dyn MessageStore>,
    pub router: RouterHandle,
    pub room_keys: RoomKeyMode,
    pub outbox_size: usize,
}

impl RelayState {
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        store: Arc<dyn MessageStore>,
        router: RouterHandle,
        room_keys: RoomKeyMode,
    ) -> Self {
        Self {
            directory,
            store,
            router,
            room_keys,
            outbox_size: DEFAULT_OUTBOX_SIZE,
        }
    }

    pub fn with_outbox_size(mut self, outbox_size: usize) -> Self {
        self.outbox_size = outbox_size.max(1);
        self
    }
}

/// Accept connections forever, one task per connection
pub async fn serve(listener: TcpListener, state: RelayState) -> Result<(), AppError> {
    info!("WebSocket relay listening on {}", listener.local_addr()?);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let state = state.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
