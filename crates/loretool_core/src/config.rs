use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_THEMES: [&str; 4] = [
    "theme-default",
    "theme-parchment",
    "theme-dark",
    "theme-terminal",
];

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LoreConfig {
    #[serde(default)]
    pub editor: EditorSection,
    #[serde(default)]
    pub viewer: ViewerSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EditorSection {
    pub passcode: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ViewerSection {
    #[serde(default)]
    pub themes: Vec<String>,
}

impl LoreConfig {
    /// Resolve the editor passcode: env LORETOOL_PASSCODE > config > None.
    pub fn passcode(&self) -> Option<String> {
        if let Ok(value) = env::var("LORETOOL_PASSCODE") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        self.editor.passcode.clone()
    }

    /// Themes offered by the viewer; falls back to the built-in set when
    /// the config lists none.
    pub fn themes(&self) -> Vec<String> {
        if self.viewer.themes.is_empty() {
            DEFAULT_THEMES.iter().map(|theme| theme.to_string()).collect()
        } else {
            self.viewer.themes.clone()
        }
    }

    pub fn is_valid_theme(&self, theme: &str) -> bool {
        self.themes().iter().any(|known| known == theme)
    }
}

/// Gate for commands that write documents. No configured passcode means
/// the editor is locked, not open.
pub fn verify_passcode(config: &LoreConfig, supplied: Option<&str>) -> Result<()> {
    let Some(expected) = config.passcode() else {
        bail!(
            "No editor passcode is configured. Set [editor] passcode in config.toml or LORETOOL_PASSCODE."
        );
    };
    match supplied {
        Some(given) if given == expected => Ok(()),
        Some(_) => bail!("Incorrect passcode."),
        None => bail!("This command modifies documents; pass --passcode."),
    }
}

/// Load and parse a LoreConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<LoreConfig> {
    if !config_path.exists() {
        return Ok(LoreConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: LoreConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
