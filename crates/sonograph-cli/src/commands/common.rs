//! Helpers shared by the commands.

use std::path::Path;

use sonograph_config::load_profile;
use sonograph_engine::SoftwareEngine;

/// Creates the software engine, restricted by a profile file when given.
pub fn engine(profile: Option<&Path>) -> anyhow::Result<SoftwareEngine> {
    Ok(match profile {
        Some(path) => {
            let profile = load_profile(path)?;
            tracing::info!(
                path = %path.display(),
                name = profile.name.as_deref().unwrap_or("unnamed"),
                "engine profile"
            );
            SoftwareEngine::with_profile(profile)
        }
        None => SoftwareEngine::new(),
    })
}

pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -120.0
    } else {
        20.0 * linear.log10()
    }
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
