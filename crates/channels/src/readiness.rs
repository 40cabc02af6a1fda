//! Pre-start configuration checks.
//!
//! A connector that is disabled or lacks credentials is not a failure: the
//! supervisor records the reason in `lastError` and moves on.

use std::{fmt, path::PathBuf};

use {secrecy::ExposeSecret, tracing::debug};

use portico_config::ChannelsConfig;

use crate::{connector::ConnectorKind, status::StatusPatch};

pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const DISCORD_TOKEN_ENV: &str = "DISCORD_BOT_TOKEN";

/// Why a connector was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NotConfigured,
    NotLinked,
    /// Configured, but no implementation was registered with the supervisor.
    Unavailable,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::NotConfigured => "not configured",
            Self::NotLinked => "not linked",
            Self::Unavailable => "no connector registered",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the supervisor needs to launch a connector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchPlan {
    pub token: Option<String>,
    /// Kind-specific fields seeded into the status record at start.
    pub status: StatusPatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready(LaunchPlan),
    Skip(SkipReason),
}

/// Check `kind` against `config`, reading token fallbacks from the process
/// environment.
pub fn check(kind: ConnectorKind, config: &ChannelsConfig) -> Readiness {
    check_with_env(kind, config, |name| std::env::var(name).ok())
}

pub fn check_with_env(
    kind: ConnectorKind,
    config: &ChannelsConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Readiness {
    match kind {
        ConnectorKind::WhatsApp => check_whatsapp(config),
        ConnectorKind::Telegram => check_telegram(config, &env),
        ConnectorKind::Discord => check_discord(config, &env),
        ConnectorKind::Signal => match &config.signal {
            None => Readiness::Skip(SkipReason::NotConfigured),
            Some(signal) if !signal.enabled => Readiness::Skip(SkipReason::Disabled),
            Some(signal) => Readiness::Ready(LaunchPlan {
                token: None,
                status: StatusPatch {
                    base_url: Some(signal.base_url()),
                    ..Default::default()
                },
            }),
        },
        ConnectorKind::IMessage => match &config.imessage {
            None => Readiness::Skip(SkipReason::NotConfigured),
            Some(imessage) if !imessage.enabled => Readiness::Skip(SkipReason::Disabled),
            Some(imessage) => Readiness::Ready(LaunchPlan {
                token: None,
                status: StatusPatch {
                    cli_path: Some(imessage.cli_path()),
                    db_path: imessage.db_path.clone(),
                    ..Default::default()
                },
            }),
        },
    }
}

/// Default location of the linked WhatsApp web session.
pub fn default_whatsapp_auth_dir() -> PathBuf {
    portico_config::data_dir()
        .join("credentials")
        .join("whatsapp")
}

fn check_whatsapp(config: &ChannelsConfig) -> Readiness {
    let section = config.whatsapp.clone().unwrap_or_default();
    if !section.enabled {
        return Readiness::Skip(SkipReason::Disabled);
    }
    let auth_dir = section
        .auth_dir
        .unwrap_or_else(default_whatsapp_auth_dir);
    if !auth_dir.join("creds.json").is_file() {
        debug!(auth_dir = %auth_dir.display(), "no linked whatsapp session");
        return Readiness::Skip(SkipReason::NotLinked);
    }
    Readiness::Ready(LaunchPlan::default())
}

fn check_telegram(config: &ChannelsConfig, env: &impl Fn(&str) -> Option<String>) -> Readiness {
    let section = config.telegram.clone().unwrap_or_default();
    if !section.enabled {
        return Readiness::Skip(SkipReason::Disabled);
    }
    let token = non_empty(section.bot_token.as_ref().map(|t| t.expose_secret().clone()))
        .or_else(|| {
            let path = section.token_file.as_ref()?;
            match std::fs::read_to_string(path) {
                Ok(raw) => non_empty(Some(raw)),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "telegram token file unreadable");
                    None
                },
            }
        })
        .or_else(|| non_empty(env(TELEGRAM_TOKEN_ENV)));
    let Some(token) = token else {
        return Readiness::Skip(SkipReason::NotConfigured);
    };
    let mode = if non_empty(section.webhook_url).is_some() {
        "webhook"
    } else {
        "polling"
    };
    Readiness::Ready(LaunchPlan {
        token: Some(token),
        status: StatusPatch {
            mode: Some(mode.into()),
            ..Default::default()
        },
    })
}

fn check_discord(config: &ChannelsConfig, env: &impl Fn(&str) -> Option<String>) -> Readiness {
    let section = config.discord.clone().unwrap_or_default();
    if !section.enabled {
        return Readiness::Skip(SkipReason::Disabled);
    }
    let token = non_empty(section.token.as_ref().map(|t| t.expose_secret().clone()))
        .or_else(|| non_empty(env(DISCORD_TOKEN_ENV)));
    match token {
        Some(token) => Readiness::Ready(LaunchPlan {
            token: Some(token),
            status: StatusPatch::default(),
        }),
        None => Readiness::Skip(SkipReason::NotConfigured),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        portico_config::{
            DiscordConfig, IMessageConfig, SignalConfig, TelegramConfig, WhatsAppConfig,
        },
        secrecy::Secret,
    };

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn skip(r: Readiness) -> SkipReason {
        match r {
            Readiness::Skip(reason) => reason,
            Readiness::Ready(plan) => panic!("expected skip, got {plan:?}"),
        }
    }

    fn ready(r: Readiness) -> LaunchPlan {
        match r {
            Readiness::Ready(plan) => plan,
            Readiness::Skip(reason) => panic!("expected ready, got {reason}"),
        }
    }

    #[test]
    fn missing_sections_are_not_configured() {
        let cfg = ChannelsConfig::default();
        for kind in [
            ConnectorKind::Telegram,
            ConnectorKind::Discord,
            ConnectorKind::Signal,
            ConnectorKind::IMessage,
        ] {
            assert_eq!(skip(check_with_env(kind, &cfg, no_env)), SkipReason::NotConfigured);
        }
    }

    #[test]
    fn disabled_wins_over_credentials() {
        let cfg = ChannelsConfig {
            telegram: Some(TelegramConfig {
                enabled: false,
                bot_token: Some(Secret::new("123:abc".into())),
                ..Default::default()
            }),
            signal: Some(SignalConfig {
                enabled: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            skip(check_with_env(ConnectorKind::Telegram, &cfg, no_env)),
            SkipReason::Disabled
        );
        assert_eq!(
            skip(check_with_env(ConnectorKind::Signal, &cfg, no_env)),
            SkipReason::Disabled
        );
    }

    #[test]
    fn telegram_token_sources() {
        let cfg = ChannelsConfig {
            telegram: Some(TelegramConfig {
                bot_token: Some(Secret::new(" 123:abc ".into())),
                webhook_url: Some("https://example.com/tg".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let plan = ready(check_with_env(ConnectorKind::Telegram, &cfg, no_env));
        assert_eq!(plan.token.as_deref(), Some("123:abc"));
        assert_eq!(plan.status.mode.as_deref(), Some("webhook"));

        let env = |name: &str| (name == TELEGRAM_TOKEN_ENV).then(|| "999:env".to_string());
        let plan = ready(check_with_env(
            ConnectorKind::Telegram,
            &ChannelsConfig::default(),
            env,
        ));
        assert_eq!(plan.token.as_deref(), Some("999:env"));
        assert_eq!(plan.status.mode.as_deref(), Some("polling"));
    }

    #[test]
    fn telegram_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "42:file\n").unwrap();
        let cfg = ChannelsConfig {
            telegram: Some(TelegramConfig {
                token_file: Some(path),
                ..Default::default()
            }),
            ..Default::default()
        };
        let plan = ready(check_with_env(ConnectorKind::Telegram, &cfg, no_env));
        assert_eq!(plan.token.as_deref(), Some("42:file"));
    }

    #[test]
    fn discord_env_fallback() {
        let cfg = ChannelsConfig {
            discord: Some(DiscordConfig::default()),
            ..Default::default()
        };
        assert_eq!(
            skip(check_with_env(ConnectorKind::Discord, &cfg, no_env)),
            SkipReason::NotConfigured
        );
        let env = |name: &str| (name == DISCORD_TOKEN_ENV).then(|| "d-token".to_string());
        let plan = ready(check_with_env(ConnectorKind::Discord, &cfg, env));
        assert_eq!(plan.token.as_deref(), Some("d-token"));
    }

    #[test]
    fn whatsapp_requires_linked_session() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ChannelsConfig {
            whatsapp: Some(WhatsAppConfig {
                enabled: true,
                auth_dir: Some(dir.path().to_path_buf()),
            }),
            ..Default::default()
        };
        assert_eq!(
            skip(check_with_env(ConnectorKind::WhatsApp, &cfg, no_env)),
            SkipReason::NotLinked
        );

        std::fs::write(dir.path().join("creds.json"), "{}").unwrap();
        let plan = ready(check_with_env(ConnectorKind::WhatsApp, &cfg, no_env));
        assert!(plan.token.is_none());
    }

    #[test]
    fn bridges_seed_status_fields() {
        let cfg = ChannelsConfig {
            signal: Some(SignalConfig {
                http_host: Some("10.0.0.2".into()),
                ..Default::default()
            }),
            imessage: Some(IMessageConfig {
                db_path: Some("/tmp/chat.db".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let signal = ready(check_with_env(ConnectorKind::Signal, &cfg, no_env));
        assert_eq!(signal.status.base_url.as_deref(), Some("http://10.0.0.2:8080"));

        let imessage = ready(check_with_env(ConnectorKind::IMessage, &cfg, no_env));
        assert_eq!(imessage.status.cli_path.as_deref(), Some("imsg"));
        assert_eq!(imessage.status.db_path.as_deref(), Some("/tmp/chat.db"));
    }
}
