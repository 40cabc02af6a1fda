//! Gateway: HTTP listener, hook ingress, WebSocket RPC and connector control.
//!
//! Lifecycle:
//! 1. Load config, resolve auth and hook settings
//! 2. Bind the listener and build the routing chain (hooks, control panel)
//! 3. Attach the WebSocket acceptor
//! 4. Start chat connectors in the background
//! 5. On shutdown, drain the listener and stop every connector

pub mod auth;
pub mod broadcast;
pub mod control;
pub mod hooks;
pub mod methods;
pub mod protocol;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;
