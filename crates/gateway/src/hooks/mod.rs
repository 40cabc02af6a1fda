//! Webhook ingress: `POST {base}/wake`, `POST {base}/agent` and mapped
//! `POST {base}/<path>` requests.

pub mod body;
pub mod config;
pub mod gateway;
pub mod mapping;
pub mod normalize;
pub mod templates;
pub mod token;

pub use {
    config::{HookConfigError, HooksConfig, resolve_hooks_config},
    gateway::{HookDispatcher, HookGateway},
    mapping::{
        MappedAction, MappingDispatcher, MappingEngine, MappingOutcome, MappingRequest,
        MappingResult, MappingRule,
    },
    normalize::{
        AgentAction, AgentRequest, HookAction, HookChannel, PayloadError, WakeAction, WakeMode,
        WakeRequest, normalize_voice_wake_triggers,
    },
    templates::TemplateMappingEngine,
};
