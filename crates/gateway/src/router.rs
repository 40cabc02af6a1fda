//! Top-level HTTP request routing.
//!
//! Every request walks a fixed chain: hook ingress, canvas host, control
//! panel, then a plain `404`. WebSocket upgrades skip the chain and go to the
//! specialized upgrade handler (if it claims the request) or the general
//! acceptor. Handler errors and panics become `500` responses carrying the
//! formatted error text.

use std::{any::Any, sync::Arc};

use {
    async_trait::async_trait,
    axum::{
        Router,
        body::Body,
        extract::Request,
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
    },
    tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer},
    tracing::{error, warn},
};

use portico_common::error::{format_error, format_panic};

/// A plain HTTP handler in the routing chain.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// Whether this handler owns `request`. Claimed requests never fall
    /// through to later handlers.
    fn claims(&self, request: &Request) -> bool;

    async fn handle(&self, request: Request) -> anyhow::Result<Response>;
}

/// Accepts WebSocket upgrade requests.
#[async_trait]
pub trait UpgradeHandler: Send + Sync {
    fn claims(&self, _request: &Request) -> bool {
        true
    }

    async fn upgrade(&self, request: Request) -> Response;
}

#[derive(Clone, Default)]
pub struct RequestRouter {
    hooks: Option<Arc<dyn RouteHandler>>,
    canvas: Option<Arc<dyn RouteHandler>>,
    control: Option<Arc<dyn RouteHandler>>,
    upgrade: Option<Arc<dyn UpgradeHandler>>,
    websocket: Option<Arc<dyn UpgradeHandler>>,
}

impl RequestRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(mut self, handler: Arc<dyn RouteHandler>) -> Self {
        self.hooks = Some(handler);
        self
    }

    pub fn with_canvas(mut self, handler: Arc<dyn RouteHandler>) -> Self {
        self.canvas = Some(handler);
        self
    }

    pub fn with_control(mut self, handler: Arc<dyn RouteHandler>) -> Self {
        self.control = Some(handler);
        self
    }

    /// Specialized upgrade handler consulted before the general acceptor.
    pub fn with_upgrade(mut self, handler: Arc<dyn UpgradeHandler>) -> Self {
        self.upgrade = Some(handler);
        self
    }

    pub fn with_websocket(mut self, handler: Arc<dyn UpgradeHandler>) -> Self {
        self.websocket = Some(handler);
        self
    }

    pub async fn route(&self, request: Request) -> Response {
        if is_websocket_upgrade(request.headers()) {
            if let Some(upgrade) = self.upgrade.as_ref().filter(|h| h.claims(&request)) {
                return upgrade.upgrade(request).await;
            }
            if let Some(websocket) = &self.websocket {
                return websocket.upgrade(request).await;
            }
            return not_found();
        }

        let handler = [&self.hooks, &self.canvas, &self.control]
            .into_iter()
            .flatten()
            .find(|h| h.claims(&request));
        let Some(handler) = handler else {
            return not_found();
        };

        let method = request.method().clone();
        let path = request.uri().path().to_string();
        match handler.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                let message = format_error(&e);
                error!(%method, path, error = %message, "request handler failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            },
        }
    }

    /// Wrap the chain in an axum app. Panics anywhere below are caught and
    /// answered with `500`.
    pub fn into_app(self) -> Router {
        let router = Arc::new(self);
        Router::new()
            .fallback(move |request: Request| {
                let router = Arc::clone(&router);
                async move { router.route(request).await }
            })
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TraceLayer::new_for_http())
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("websocket"))
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = format_panic(payload);
    warn!(error = %message, "request handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

pub(crate) fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::http::Method,
        http_body_util::BodyExt,
        tower::ServiceExt,
    };

    enum Behavior {
        Reply(&'static str),
        Fail,
        Panic,
    }

    struct Stub {
        prefix: &'static str,
        behavior: Behavior,
    }

    impl Stub {
        fn new(prefix: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self { prefix, behavior })
        }
    }

    #[async_trait]
    impl RouteHandler for Stub {
        fn claims(&self, request: &Request) -> bool {
            request.uri().path().starts_with(self.prefix)
        }

        async fn handle(&self, _request: Request) -> anyhow::Result<Response> {
            match self.behavior {
                Behavior::Reply(body) => Ok(body.into_response()),
                Behavior::Fail => Err(anyhow::anyhow!("backend down")),
                Behavior::Panic => panic!("handler exploded"),
            }
        }
    }

    struct Upgrader(&'static str, Option<&'static str>);

    #[async_trait]
    impl UpgradeHandler for Upgrader {
        fn claims(&self, request: &Request) -> bool {
            self.1.is_none_or(|p| request.uri().path().starts_with(p))
        }

        async fn upgrade(&self, _request: Request) -> Response {
            (StatusCode::SWITCHING_PROTOCOLS, self.0).into_response()
        }
    }

    fn get(path: &str) -> Request {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap()
    }

    fn upgrade_request(path: &str) -> Request {
        Request::builder()
            .uri(path)
            .header(header::UPGRADE, "websocket")
            .header(header::CONNECTION, "Upgrade")
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: Router, request: Request) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn hooks_take_precedence() {
        let app = RequestRouter::new()
            .with_hooks(Stub::new("/hooks", Behavior::Reply("hooks")))
            .with_canvas(Stub::new("/", Behavior::Reply("canvas")))
            .with_control(Stub::new("/", Behavior::Reply("control")))
            .into_app();
        assert_eq!(send(app.clone(), get("/hooks/wake")).await.1, "hooks");
        assert_eq!(send(app, get("/other")).await.1, "canvas");
    }

    #[tokio::test]
    async fn control_after_canvas() {
        let app = RequestRouter::new()
            .with_canvas(Stub::new("/canvas", Behavior::Reply("canvas")))
            .with_control(Stub::new("/", Behavior::Reply("control")))
            .into_app();
        assert_eq!(send(app, get("/health")).await.1, "control");
    }

    #[tokio::test]
    async fn unclaimed_is_plain_404() {
        let app = RequestRouter::new()
            .with_hooks(Stub::new("/hooks", Behavior::Reply("hooks")))
            .into_app();
        let (status, body) = send(app, get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not Found");
    }

    #[tokio::test]
    async fn handler_error_becomes_500() {
        let app = RequestRouter::new()
            .with_control(Stub::new("/", Behavior::Fail))
            .into_app();
        let (status, body) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("backend down"), "{body}");
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        let app = RequestRouter::new()
            .with_control(Stub::new("/", Behavior::Panic))
            .into_app();
        let (status, body) = send(app.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("handler exploded"), "{body}");

        // The app keeps serving after a panic.
        let (status, _) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn upgrades_bypass_the_chain() {
        let app = RequestRouter::new()
            .with_hooks(Stub::new("/", Behavior::Reply("hooks")))
            .with_upgrade(Arc::new(Upgrader("canvas-ws", Some("/canvas"))))
            .with_websocket(Arc::new(Upgrader("rpc", None)))
            .into_app();
        let (status, body) = send(app.clone(), upgrade_request("/canvas/ws")).await;
        assert_eq!(status, StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(body, "canvas-ws");
        assert_eq!(send(app, upgrade_request("/ws")).await.1, "rpc");
    }

    #[tokio::test]
    async fn upgrade_without_acceptor_is_404() {
        let app = RequestRouter::new()
            .with_hooks(Stub::new("/", Behavior::Reply("hooks")))
            .into_app();
        let (status, _) = send(app, upgrade_request("/ws")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
