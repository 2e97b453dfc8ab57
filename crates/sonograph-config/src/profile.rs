//! Engine profile files. The format is documented on
//! [`EngineProfile`](sonograph_engine::EngineProfile).

use std::path::Path;

use sonograph_engine::EngineProfile;

use crate::error::ConfigError;

/// Load an engine profile from a TOML file.
pub fn load_profile(path: impl AsRef<Path>) -> Result<EngineProfile, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let profile = profile_from_toml(&content)?;
    tracing::debug!(
        path = %path.display(),
        unsupported = profile.unsupported.len(),
        quirks = profile.quirks.len(),
        "engine profile loaded"
    );
    Ok(profile)
}

/// Parse an engine profile from a TOML string.
pub fn profile_from_toml(toml_str: &str) -> Result<EngineProfile, ConfigError> {
    Ok(toml::from_str(toml_str)?)
}

/// Save an engine profile to a TOML file.
pub fn save_profile(profile: &EngineProfile, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = toml::to_string_pretty(profile)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}
