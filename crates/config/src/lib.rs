//! Configuration loading for the portico gateway.
//!
//! Config files are discovered in the working directory first, then in
//! `~/.config/portico/`. TOML, YAML and JSON are accepted; `${VAR}`
//! placeholders are substituted before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, data_dir, discover_and_load, find_config_file, load_config,
        set_config_dir,
    },
    schema::{
        ChannelsConfig, ControlUiConfig, DEFAULT_VOICE_WAKE_TRIGGERS, DiscordConfig,
        GatewayConfig, HookMappingAction, HookMappingConfig, HookMatch, HooksSection,
        IMessageConfig, PorticoConfig, SignalConfig, TelegramConfig, VoiceWakeConfig,
        WhatsAppConfig,
    },
};
