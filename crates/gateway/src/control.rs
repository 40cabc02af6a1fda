//! Read-only control panel endpoints.

use std::sync::Arc;

use {
    async_trait::async_trait,
    axum::{
        Json,
        extract::Request,
        http::{Method, StatusCode, header},
        response::{IntoResponse, Response},
    },
    serde_json::json,
};

use crate::{protocol::PROTOCOL_VERSION, router::RouteHandler, state::GatewayState};

const HEALTH_PATH: &str = "/health";
const STATUS_PATH: &str = "/control/status";

pub struct ControlPanel {
    state: Arc<GatewayState>,
}

impl ControlPanel {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl RouteHandler for ControlPanel {
    fn claims(&self, request: &Request) -> bool {
        matches!(request.uri().path(), HEALTH_PATH | STATUS_PATH)
    }

    async fn handle(&self, request: Request) -> anyhow::Result<Response> {
        if request.method() != Method::GET {
            return Ok((
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "GET")],
                "Method Not Allowed",
            )
                .into_response());
        }

        let state = &self.state;
        let connections = state.client_count().await;
        let body = if request.uri().path() == HEALTH_PATH {
            json!({
                "status": "ok",
                "version": state.version,
                "protocol": PROTOCOL_VERSION,
                "connections": connections,
            })
        } else {
            json!({
                "version": state.version,
                "hostname": state.hostname,
                "uptimeMs": state.uptime_ms(),
                "connections": connections,
                "channels": state.supervisor.snapshot(),
                "hooks": state.hooks,
            })
        };
        Ok(Json(body).into_response())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{auth::resolve_auth, router::RequestRouter, state::HooksSummary},
        axum::body::Body,
        http_body_util::BodyExt,
        portico_channels::ConnectorSupervisor,
        portico_config::ChannelsConfig,
        serde_json::Value,
        tower::ServiceExt,
    };

    fn app() -> axum::Router {
        let state = GatewayState::new(
            resolve_auth(None, None),
            Arc::new(ConnectorSupervisor::new(ChannelsConfig::default)),
            Some(HooksSummary {
                base_path: "/hooks".into(),
                max_body_bytes: 1024,
                mappings: vec!["gmail".into()],
            }),
            Vec::new(),
        );
        RequestRouter::new()
            .with_control(Arc::new(ControlPanel::new(state)))
            .into_app()
    }

    async fn send(method: Method, path: &str) -> (StatusCode, Option<Value>) {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).ok())
    }

    #[tokio::test]
    async fn health() {
        let (status, body) = send(Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn status_includes_channels_and_hooks() {
        let (status, body) = send(Method::GET, "/control/status").await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body["channels"]["telegram"]["running"], false);
        assert_eq!(body["hooks"]["basePath"], "/hooks");
        assert_eq!(body["hooks"]["mappings"][0], "gmail");
    }

    #[tokio::test]
    async fn rejects_writes() {
        let (status, _) = send(Method::POST, "/health").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn other_paths_fall_through() {
        let (status, _) = send(Method::GET, "/control").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
