//! Config schema types (gateway, hooks, channels, voice wake, control UI).

use std::path::PathBuf;

use {secrecy::Secret, serde::Deserialize};

/// Trigger phrases used when none are configured (or all configured ones are blank).
pub const DEFAULT_VOICE_WAKE_TRIGGERS: &[&str] = &["portico", "computer"];

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PorticoConfig {
    pub gateway: GatewayConfig,
    pub hooks: HooksSection,
    pub channels: ChannelsConfig,
    pub voicewake: VoiceWakeConfig,
    pub control_ui: ControlUiConfig,
}

// ── Gateway ──────────────────────────────────────────────────────────────────

/// Listener and WebSocket auth settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    /// Shared token for WebSocket clients. `PORTICO_TOKEN` takes precedence.
    pub token: Option<Secret<String>>,
    /// Password for WebSocket clients. `PORTICO_PASSWORD` takes precedence.
    pub password: Option<Secret<String>>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 18789,
            token: None,
            password: None,
        }
    }
}

// ── Hooks ────────────────────────────────────────────────────────────────────

/// Raw `[hooks]` table. Resolved into a runtime hook config by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HooksSection {
    pub enabled: bool,
    pub token: Option<Secret<String>>,
    /// Base path, `/hooks` when unset.
    pub path: Option<String>,
    /// Body limit in bytes; non-positive values fall back to the default.
    pub max_body_bytes: Option<i64>,
    /// Built-in mapping presets to append (e.g. `gmail`).
    pub presets: Vec<String>,
    pub mappings: Vec<HookMappingConfig>,
}

/// One user-configured mapping rule for `{base}/<sub-path>` requests.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HookMappingConfig {
    pub id: Option<String>,
    #[serde(rename = "match")]
    pub matcher: HookMatch,
    pub action: HookMappingAction,
    pub wake_mode: Option<String>,
    pub name: Option<String>,
    pub session_key: Option<String>,
    pub message_template: Option<String>,
    pub text_template: Option<String>,
    pub deliver: Option<bool>,
    pub channel: Option<String>,
    pub to: Option<String>,
    pub thinking: Option<String>,
    pub timeout_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HookMatch {
    /// Sub-path below the hook base path, without slashes.
    pub path: Option<String>,
    /// Required value of the payload's `source` field.
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookMappingAction {
    Wake,
    #[default]
    Agent,
}

// ── Channels ─────────────────────────────────────────────────────────────────

/// Per-connector sections. A missing section is not the same as a disabled
/// one: some connectors can start from environment credentials alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub whatsapp: Option<WhatsAppConfig>,
    pub telegram: Option<TelegramConfig>,
    pub discord: Option<DiscordConfig>,
    pub signal: Option<SignalConfig>,
    pub imessage: Option<IMessageConfig>,
    /// Upper bound for waiting on a connector to honor cancellation.
    /// Unset means wait for as long as it takes.
    pub stop_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    /// Directory holding the linked web session (`creds.json`).
    pub auth_dir: Option<PathBuf>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: Option<Secret<String>>,
    pub token_file: Option<PathBuf>,
    /// When set the bot runs in webhook mode, otherwise long polling.
    pub webhook_url: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: None,
            token_file: None,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub token: Option<Secret<String>>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub enabled: bool,
    pub account: Option<String>,
    pub http_url: Option<String>,
    pub http_host: Option<String>,
    pub http_port: Option<u16>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            account: None,
            http_url: None,
            http_host: None,
            http_port: None,
        }
    }
}

impl SignalConfig {
    /// REST endpoint of the signal-cli daemon.
    pub fn base_url(&self) -> String {
        if let Some(url) = self.http_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return url.trim_end_matches('/').to_string();
        }
        let host = self.http_host.as_deref().unwrap_or("127.0.0.1");
        let port = self.http_port.unwrap_or(8080);
        format!("http://{host}:{port}")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IMessageConfig {
    pub enabled: bool,
    pub cli_path: Option<String>,
    pub db_path: Option<String>,
}

impl Default for IMessageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cli_path: None,
            db_path: None,
        }
    }
}

impl IMessageConfig {
    pub fn cli_path(&self) -> String {
        self.cli_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("imsg")
            .to_string()
    }
}

// ── Voice wake / control UI ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceWakeConfig {
    pub triggers: Vec<String>,
}

impl Default for VoiceWakeConfig {
    fn default() -> Self {
        Self {
            triggers: DEFAULT_VOICE_WAKE_TRIGGERS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlUiConfig {
    pub enabled: bool,
}

impl Default for ControlUiConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg: PorticoConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.gateway.port, 18789);
        assert!(!cfg.hooks.enabled);
        assert!(cfg.channels.telegram.is_none());
        assert!(cfg.control_ui.enabled);
        assert_eq!(cfg.voicewake.triggers, vec!["portico", "computer"]);
    }

    #[test]
    fn hooks_section_with_mapping() {
        let cfg: PorticoConfig = toml::from_str(
            r#"
            [hooks]
            enabled = true
            token = "s3cret"
            path = "/ingest"
            max_body_bytes = 1024

            [[hooks.mappings]]
            id = "github"
            match = { path = "github", source = "push" }
            action = "wake"
            text_template = "push to {{payload.repo}}"
            "#,
        )
        .unwrap();
        assert!(cfg.hooks.enabled);
        assert_eq!(cfg.hooks.token.as_ref().unwrap().expose_secret(), "s3cret");
        assert_eq!(cfg.hooks.max_body_bytes, Some(1024));
        let rule = &cfg.hooks.mappings[0];
        assert_eq!(rule.matcher.path.as_deref(), Some("github"));
        assert_eq!(rule.matcher.source.as_deref(), Some("push"));
        assert_eq!(rule.action, HookMappingAction::Wake);
    }

    #[test]
    fn mapping_action_defaults_to_agent() {
        let rule: HookMappingConfig = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        assert_eq!(rule.action, HookMappingAction::Agent);
    }

    #[test]
    fn channel_sections_default_to_enabled() {
        let cfg: PorticoConfig = toml::from_str(
            r#"
            [channels.signal]
            http_port = 9090

            [channels.imessage]
            enabled = false
            "#,
        )
        .unwrap();
        let signal = cfg.channels.signal.unwrap();
        assert!(signal.enabled);
        assert_eq!(signal.base_url(), "http://127.0.0.1:9090");
        assert!(!cfg.channels.imessage.unwrap().enabled);
    }

    #[test]
    fn signal_url_override_strips_trailing_slash() {
        let signal = SignalConfig {
            http_url: Some("http://bridge:8080/".into()),
            ..Default::default()
        };
        assert_eq!(signal.base_url(), "http://bridge:8080");
    }

    #[test]
    fn imessage_cli_path_default() {
        assert_eq!(IMessageConfig::default().cli_path(), "imsg");
    }
}
