//! General WebSocket acceptor: authenticates the upgrade, then runs the
//! request/response loop for one client.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use {
    async_trait::async_trait,
    axum::{
        extract::{
            ConnectInfo, FromRequestParts, Request, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    futures::{SinkExt, StreamExt},
    serde_json::json,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    auth::{authorize_connect, connect_credentials},
    methods::{MethodContext, MethodRegistry},
    protocol::{EventFrame, PROTOCOL_VERSION, RequestFrame, ResponseFrame},
    router::UpgradeHandler,
    state::{ConnectedClient, GatewayState},
};

pub struct WsAcceptor {
    state: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
}

impl WsAcceptor {
    pub fn new(state: Arc<GatewayState>, methods: Arc<MethodRegistry>) -> Self {
        Self { state, methods }
    }
}

#[async_trait]
impl UpgradeHandler for WsAcceptor {
    async fn upgrade(&self, request: Request) -> Response {
        let (mut parts, _body) = request.into_parts();

        let creds = connect_credentials(&parts.headers, &parts.uri);
        let auth = authorize_connect(&self.state.auth, &creds);
        if !auth.ok {
            warn!(reason = auth.reason.unwrap_or("denied"), "websocket auth failed");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }

        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(ws) => ws,
            Err(rejection) => return rejection.into_response(),
        };

        let state = Arc::clone(&self.state);
        let methods = Arc::clone(&self.methods);
        ws.on_upgrade(move |socket| handle_connection(socket, state, methods, remote))
    }
}

/// Drive one client connection until it closes.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
    remote: Option<SocketAddr>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    state
        .register_client(ConnectedClient {
            conn_id: conn_id.clone(),
            remote,
            sender: client_tx.clone(),
            connected_at: Instant::now(),
        })
        .await;
    info!(conn_id = %conn_id, remote = ?remote, "ws: client connected");

    let hello = EventFrame::new(
        "hello",
        json!({
            "connId": conn_id,
            "version": state.version,
            "protocol": PROTOCOL_VERSION,
            "hostname": state.hostname,
            "methods": methods.method_names(),
        }),
        state.next_seq(),
    );
    if let Ok(text) = serde_json::to_string(&hello) {
        let _ = client_tx.send(text);
    }

    // Write loop: drain queued frames onto the socket.
    let write_conn_id = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = client_rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "ws: write failed");
                break;
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        };

        let frame = match RequestFrame::parse(text.as_str()) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(conn_id = %conn_id, error = %err.message, "ws: bad frame");
                send_frame(&client_tx, &ResponseFrame::err("", err));
                continue;
            },
        };

        let ctx = MethodContext {
            request_id: frame.id,
            method: frame.method,
            params: frame.params,
            client_conn_id: conn_id.clone(),
            state: Arc::clone(&state),
        };
        let methods = Arc::clone(&methods);
        let tx = client_tx.clone();
        tokio::spawn(async move {
            let response = methods.dispatch(ctx).await;
            send_frame(&tx, &response);
        });
    }

    state.remove_client(&conn_id).await;
    writer.abort();
    info!(conn_id = %conn_id, "ws: client disconnected");
}

fn send_frame(tx: &mpsc::UnboundedSender<String>, frame: &ResponseFrame) {
    match serde_json::to_string(frame) {
        Ok(text) => {
            let _ = tx.send(text);
        },
        Err(e) => warn!(error = %e, "ws: failed to serialize response"),
    }
}
