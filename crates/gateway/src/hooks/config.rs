//! Runtime hook configuration, resolved once per gateway instance.

use {
    portico_config::HooksSection,
    secrecy::{ExposeSecret, Secret},
};

use super::{mapping::MappingRule, templates};

pub const DEFAULT_HOOKS_PATH: &str = "/hooks";
pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookConfigError {
    #[error("hooks.enabled requires hooks.token")]
    MissingToken,
    #[error("hooks.path may not be '/'")]
    RootPath,
    #[error("unknown hooks preset: {0}")]
    UnknownPreset(String),
}

/// Resolved `[hooks]` section. Absence (`None` from [`resolve_hooks_config`])
/// disables hook handling entirely.
#[derive(Debug, Clone)]
pub struct HooksConfig {
    /// Normalized: leading slash, no trailing slash, never `/`.
    pub base_path: String,
    pub token: Secret<String>,
    pub max_body_bytes: usize,
    /// User rules first, then preset rules.
    pub mappings: Vec<MappingRule>,
}

impl HooksConfig {
    /// Sub-path below the base path if `path` belongs to the hook ingress.
    /// `Some("")` for the base path itself.
    pub fn sub_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.base_path.as_str())?;
        if rest.is_empty() {
            return Some("");
        }
        rest.strip_prefix('/')
    }
}

pub fn resolve_hooks_config(
    section: &HooksSection,
) -> Result<Option<HooksConfig>, HookConfigError> {
    if !section.enabled {
        return Ok(None);
    }

    let token = section
        .token
        .as_ref()
        .map(|t| t.expose_secret().trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(HookConfigError::MissingToken)?;

    let base_path = normalize_base_path(section.path.as_deref())?;

    let max_body_bytes = match section.max_body_bytes {
        Some(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => DEFAULT_MAX_BODY_BYTES,
    };

    let mut mappings: Vec<MappingRule> = section
        .mappings
        .iter()
        .enumerate()
        .map(|(i, m)| MappingRule::from_config(i, m))
        .collect();
    for preset in &section.presets {
        let rules = templates::preset(preset.trim())
            .ok_or_else(|| HookConfigError::UnknownPreset(preset.clone()))?;
        mappings.extend(rules);
    }

    Ok(Some(HooksConfig {
        base_path,
        token: Secret::new(token),
        max_body_bytes,
        mappings,
    }))
}

fn normalize_base_path(raw: Option<&str>) -> Result<String, HookConfigError> {
    let trimmed = raw.map(str::trim).filter(|p| !p.is_empty());
    let Some(path) = trimmed else {
        return Ok(DEFAULT_HOOKS_PATH.into());
    };
    let with_slash = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let normalized = with_slash.trim_end_matches('/');
    if normalized.is_empty() {
        return Err(HookConfigError::RootPath);
    }
    Ok(normalized.to_string())
}
