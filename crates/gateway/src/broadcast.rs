//! Event fan-out to connected WebSocket clients.

use {serde_json::Value, tracing::{debug, warn}};

use crate::{protocol::EventFrame, state::GatewayState};

/// Send `event` to every connected client. Returns how many clients the
/// frame was queued for.
pub async fn broadcast(state: &GatewayState, event: &str, payload: Value) -> usize {
    let frame = EventFrame::new(event, payload, state.next_seq());
    let text = match serde_json::to_string(&frame) {
        Ok(text) => text,
        Err(e) => {
            warn!(event, error = %e, "failed to serialize event");
            return 0;
        },
    };
    let clients = state.clients.read().await;
    let delivered = clients.values().filter(|c| c.send(&text)).count();
    debug!(event, seq = frame.seq, delivered, "broadcast");
    delivered
}
