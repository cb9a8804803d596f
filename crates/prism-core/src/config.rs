//! Prism configuration
//!
//! Loads settings from `prism.toml` as an alternative to environment
//! variables. The OIT tuning constants are fixed for the lifetime of the
//! pipeline objects; changing them means rebuilding the pass manager and
//! its targets, never mutating them mid-frame.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Prism
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrismConfig {
    /// Window settings for the demo application
    pub window: WindowConfig,
    /// OIT pipeline tuning constants
    pub oit: OitSettings,
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial window width in physical pixels
    pub width: u32,
    /// Initial window height in physical pixels
    pub height: u32,
    /// Window title override
    pub title: Option<String>,
}

/// OIT pipeline tuning constants.
///
/// `storage_layers` bounds the node pool (`width * height * storage_layers`
/// slots); fragments allocated past that are dropped at accumulation time.
/// `fragment_budget` bounds the resolve-stage walk per pixel; list entries
/// past it are dropped at resolve time. The two bounds are independent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OitSettings {
    /// Multisample count for the opaque and accumulation passes (S)
    pub msaa_samples: u32,
    /// Per-pixel node pool layers backing the fragment lists (L)
    pub storage_layers: u32,
    /// Maximum fragments walked per pixel during resolve (F)
    pub fragment_budget: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1280,
            title: None,
        }
    }
}

impl Default for OitSettings {
    fn default() -> Self {
        Self {
            msaa_samples: 4,
            storage_layers: 8,
            fragment_budget: 32,
        }
    }
}

impl OitSettings {
    /// Clamp settings to values the pipeline can actually run with:
    /// a supported power-of-two sample count and non-zero bounds.
    pub fn sanitized(self) -> Self {
        let msaa_samples = match self.msaa_samples {
            0 | 1 => 1,
            2 | 3 => 2,
            4..=7 => 4,
            _ => 8,
        };
        if msaa_samples != self.msaa_samples {
            log::warn!(
                "unsupported msaa_samples {}, using {}",
                self.msaa_samples,
                msaa_samples
            );
        }
        Self {
            msaa_samples,
            storage_layers: self.storage_layers.max(1),
            fragment_budget: self.fragment_budget.max(1),
        }
    }
}

impl PrismConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from `prism.toml` in the current directory, or
    /// return the defaults if the file doesn't exist. A file that exists
    /// but fails to parse is an error; silently rendering with defaults
    /// the user didn't ask for would hide the typo.
    pub fn load_or_default() -> anyhow::Result<Self> {
        Self::load_optional("prism.toml")
    }

    /// Defaults when `path` is absent, an error when it is malformed.
    pub fn load_optional<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if !path.as_ref().exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let s = OitSettings::default();
        assert_eq!(s.msaa_samples, 4);
        assert_eq!(s.storage_layers, 8);
        assert_eq!(s.fragment_budget, 32);
    }

    #[test]
    fn parses_partial_toml() {
        let config: PrismConfig = toml::from_str(
            r#"
            [oit]
            storage_layers = 4

            [window]
            width = 800
            height = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.oit.storage_layers, 4);
        assert_eq!(config.oit.msaa_samples, 4);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.title, None);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("prism-config-missing.toml");
        let config = PrismConfig::load_optional(&path).unwrap();
        assert_eq!(config.oit, OitSettings::default());
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let path = std::env::temp_dir().join("prism-config-malformed.toml");
        std::fs::write(&path, "[oit]\nmsaa_samples = [not toml").unwrap();
        assert!(PrismConfig::load_optional(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sanitize_clamps_to_supported_values() {
        let s = OitSettings {
            msaa_samples: 6,
            storage_layers: 0,
            fragment_budget: 0,
        }
        .sanitized();
        assert_eq!(s.msaa_samples, 4);
        assert_eq!(s.storage_layers, 1);
        assert_eq!(s.fragment_budget, 1);

        let s = OitSettings {
            msaa_samples: 16,
            ..OitSettings::default()
        }
        .sanitized();
        assert_eq!(s.msaa_samples, 8);
    }
}
