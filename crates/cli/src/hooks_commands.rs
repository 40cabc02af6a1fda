use {anyhow::Result, clap::Subcommand};

use portico_gateway::hooks::resolve_hooks_config;

#[derive(Subcommand)]
pub enum HooksAction {
    /// Validate the hooks section and print the resolved settings.
    Check,
}

pub fn handle_hooks(action: HooksAction) -> Result<()> {
    match action {
        HooksAction::Check => check(),
    }
}

fn check() -> Result<()> {
    let config = portico_config::discover_and_load();
    let Some(hooks) = resolve_hooks_config(&config.hooks)? else {
        println!("hooks disabled");
        return Ok(());
    };

    println!("hooks enabled at {}", hooks.base_path);
    println!("  max body: {} bytes", hooks.max_body_bytes);
    if hooks.mappings.is_empty() {
        println!("  no mappings");
    }
    for rule in &hooks.mappings {
        let path = rule.match_path.as_deref().unwrap_or("*");
        let source = rule.match_source.as_deref().unwrap_or("*");
        println!("  {:<16} path={path} source={source}", rule.id);
    }
    Ok(())
}
