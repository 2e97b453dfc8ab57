//! Engine profiles: switch primitives off or make them misbehave.
//!
//! A profile lets the reference software engine stand in for a deficient
//! platform engine. It is plain serde data, loaded from TOML by
//! `sonograph-config`:
//!
//! ```toml
//! name = "legacy"
//! unsupported = ["iir-filter", "worklet"]
//!
//! [[quirks]]
//! kind = "merger-layout"
//!
//! [[quirks]]
//! kind = "param-default"
//! node = "gain"
//! param = "gain"
//! value = 0.0
//! ```

use serde::{Deserialize, Serialize};
use sonograph_core::NodeType;

/// A known misbehaviour of an engine primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Quirk {
    /// Channel mergers start with a two-channel `max` layout instead of one
    /// explicit channel per input.
    MergerLayout,
    /// A param starts from the wrong default.
    ParamDefault {
        /// Node type owning the param.
        node: NodeType,
        /// Param name.
        param: String,
        /// The default the engine actually uses.
        value: f32,
    },
}

/// Capabilities and defects of an engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineProfile {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Node types the engine cannot construct.
    #[serde(default)]
    pub unsupported: Vec<NodeType>,
    /// Primitive defects.
    #[serde(default)]
    pub quirks: Vec<Quirk>,
}

impl EngineProfile {
    /// Returns whether the engine can construct `node_type`.
    pub fn supports(&self, node_type: NodeType) -> bool {
        !self.unsupported.contains(&node_type)
    }

    /// Returns whether mergers are constructed with the wrong layout.
    pub fn has_merger_quirk(&self) -> bool {
        self.quirks.iter().any(|q| matches!(q, Quirk::MergerLayout))
    }

    /// Returns the wrong default the engine uses for a param, if any.
    pub fn param_default(&self, node_type: NodeType, param: &str) -> Option<f32> {
        self.quirks.iter().find_map(|q| match q {
            Quirk::ParamDefault {
                node,
                param: name,
                value,
            } if *node == node_type && name == param => Some(*value),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_supports_everything() {
        let profile = EngineProfile::default();
        assert!(NodeType::ALL.iter().all(|t| profile.supports(*t)));
        assert!(!profile.has_merger_quirk());
    }

    #[test]
    fn parses_from_toml() {
        let profile: EngineProfile = toml::from_str(
            r#"
            name = "legacy"
            unsupported = ["iir-filter"]

            [[quirks]]
            kind = "merger-layout"

            [[quirks]]
            kind = "param-default"
            node = "gain"
            param = "gain"
            value = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(profile.name.as_deref(), Some("legacy"));
        assert!(!profile.supports(NodeType::IirFilter));
        assert!(profile.has_merger_quirk());
        assert_eq!(profile.param_default(NodeType::Gain, "gain"), Some(0.25));
        assert_eq!(profile.param_default(NodeType::Delay, "gain"), None);
    }
}
