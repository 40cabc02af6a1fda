//! The hook ingress request handler.

use std::{collections::BTreeMap, sync::Arc};

use {
    async_trait::async_trait,
    axum::{
        Json,
        extract::Request,
        http::{HeaderMap, Method, StatusCode, Uri, header},
        response::{IntoResponse, Response},
    },
    secrecy::ExposeSecret,
    serde_json::{Map, Value, json},
    tracing::{debug, info},
};

use crate::router::{RouteHandler, not_found};

use super::{
    body::{BodyError, read_json_body},
    config::HooksConfig,
    mapping::{MappingDispatcher, MappingEngine, MappingRequest, MappingResult},
    normalize::{
        AgentAction, AgentRequest, HookAction, WakeAction, WakeRequest, normalize_agent,
        normalize_wake,
    },
    templates::TemplateMappingEngine,
    token::{TOKEN_HEADER, extract_token, token_matches},
};

/// Receives validated hook actions.
#[async_trait]
pub trait HookDispatcher: Send + Sync {
    async fn wake(&self, action: WakeAction) -> anyhow::Result<()>;

    /// Returns the id of the queued agent run.
    async fn agent(&self, action: AgentAction) -> anyhow::Result<String>;
}

pub struct HookGateway {
    config: Option<HooksConfig>,
    mappings: Option<MappingDispatcher>,
    dispatcher: Arc<dyn HookDispatcher>,
}

impl HookGateway {
    /// Build the ingress. With `config == None` it claims no requests.
    pub fn new(config: Option<HooksConfig>, dispatcher: Arc<dyn HookDispatcher>) -> Self {
        Self::with_engine(config, dispatcher, Arc::new(TemplateMappingEngine))
    }

    pub fn with_engine(
        config: Option<HooksConfig>,
        dispatcher: Arc<dyn HookDispatcher>,
        engine: Arc<dyn MappingEngine>,
    ) -> Self {
        let mappings = config
            .as_ref()
            .filter(|c| !c.mappings.is_empty())
            .map(|c| MappingDispatcher::new(engine, c.mappings.clone()));
        Self {
            config,
            mappings,
            dispatcher,
        }
    }

    pub fn config(&self) -> Option<&HooksConfig> {
        self.config.as_ref()
    }

    async fn dispatch(&self, action: HookAction) -> anyhow::Result<Response> {
        match action {
            HookAction::Wake(wake) => {
                let mode = wake.mode;
                info!(mode = %mode, "hook wake");
                self.dispatcher.wake(wake).await?;
                Ok((StatusCode::OK, Json(json!({"ok": true, "mode": mode}))).into_response())
            },
            HookAction::Agent(agent) => {
                let session_key = agent.session_key.clone();
                let run_id = self.dispatcher.agent(agent).await?;
                info!(run_id = %run_id, session_key = %session_key, "hook agent run queued");
                let body = Json(json!({"ok": true, "runId": run_id}));
                Ok((StatusCode::ACCEPTED, body).into_response())
            },
        }
    }

    async fn dispatch_mapped(
        &self,
        mappings: &MappingDispatcher,
        request: MappingRequest,
    ) -> anyhow::Result<Response> {
        match mappings.dispatch(&request).await {
            MappingResult::NoMatch => Ok(not_found()),
            MappingResult::Invalid(message) => Ok(json_error(StatusCode::BAD_REQUEST, &message)),
            MappingResult::Skipped => Ok(StatusCode::NO_CONTENT.into_response()),
            MappingResult::Failed(message) => {
                Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, &message))
            },
            MappingResult::Action(action) => self.dispatch(action).await,
        }
    }
}

#[async_trait]
impl RouteHandler for HookGateway {
    fn claims(&self, request: &Request) -> bool {
        self.config
            .as_ref()
            .is_some_and(|c| c.sub_path(request.uri().path()).is_some())
    }

    async fn handle(&self, request: Request) -> anyhow::Result<Response> {
        let Some(config) = &self.config else {
            return Ok(not_found());
        };
        let (parts, body) = request.into_parts();
        let Some(sub_path) = config.sub_path(parts.uri.path()) else {
            return Ok(not_found());
        };

        if parts.method != Method::POST {
            return Ok((
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "POST")],
                "Method Not Allowed",
            )
                .into_response());
        }

        let authorized = extract_token(&parts.headers, &parts.uri)
            .is_some_and(|(token, _)| token_matches(&token, config.token.expose_secret()));
        if !authorized {
            debug!(path = %parts.uri.path(), "hook request rejected: missing or invalid token");
            return Ok((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
        }

        let sub_path = sub_path.trim_matches('/');
        let builtin = matches!(sub_path, "wake" | "agent");
        if sub_path.is_empty() || (!builtin && self.mappings.is_none()) {
            return Ok(not_found());
        }

        let payload = match read_json_body(&parts.headers, body, config.max_body_bytes).await {
            Ok(payload) => payload,
            Err(BodyError::TooLarge) => {
                debug!(
                    path = %parts.uri.path(),
                    limit = config.max_body_bytes,
                    "hook body too large"
                );
                return Ok(json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload too large"));
            },
            Err(e) => return Ok(json_error(StatusCode::BAD_REQUEST, &e.to_string())),
        };

        match sub_path {
            "wake" => match normalize_wake(&WakeRequest::from_payload(&payload)) {
                Ok(action) => self.dispatch(HookAction::Wake(action)).await,
                Err(e) => Ok(json_error(StatusCode::BAD_REQUEST, &e.to_string())),
            },
            "agent" => match normalize_agent(&AgentRequest::from_payload(&payload)) {
                Ok(action) => self.dispatch(HookAction::Agent(action)).await,
                Err(e) => Ok(json_error(StatusCode::BAD_REQUEST, &e.to_string())),
            },
            _ => match &self.mappings {
                Some(mappings) => {
                    let request = mapping_request(sub_path, &parts.headers, &parts.uri, payload);
                    self.dispatch_mapped(mappings, request).await
                },
                None => Ok(not_found()),
            },
        }
    }
}

fn mapping_request(
    sub_path: &str,
    headers: &HeaderMap,
    uri: &Uri,
    payload: Map<String, Value>,
) -> MappingRequest {
    // Credentials never reach the mapping engine.
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            if name == header::AUTHORIZATION || name.as_str() == TOKEN_HEADER {
                return None;
            }
            let value = value.to_str().ok()?;
            Some((name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect();
    let query: BTreeMap<String, String> = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .filter(|(k, _)| k != "token")
                .collect()
        })
        .unwrap_or_default();
    MappingRequest {
        path: sub_path.to_string(),
        headers,
        query,
        payload: Value::Object(payload),
        now: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"ok": false, "error": message}))).into_response()
}
