use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::ConfigError;

/// TrueType bytes for a locale's report font, loaded once at startup.
#[derive(Clone)]
pub struct FontData(Arc<Vec<u8>>);

impl FontData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for FontData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FontData({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone)]
pub struct Locale {
    pub code: String,
    pub name: String,
    pub font: String,
    pub font_data: Option<FontData>,
}

#[derive(Debug, Deserialize)]
struct LocaleFile {
    default: String,
    locales: HashMap<String, LocaleEntry>,
}

#[derive(Debug, Deserialize)]
struct LocaleEntry {
    name: String,
    font: String,
}

/// Read-only mapping from language code to display name and report font.
/// Unknown codes resolve to the default entry.
#[derive(Debug, Clone)]
pub struct LocaleTable {
    locales: HashMap<String, Locale>,
    default_code: String,
}

impl LocaleTable {
    pub fn builtin() -> Self {
        let locales = [
            ("en", "English", "NotoSans"),
            ("hi", "Hindi", "NotoSansDevanagari"),
        ]
        .into_iter()
        .map(|(code, name, font)| {
            (
                code.to_string(),
                Locale {
                    code: code.to_string(),
                    name: name.to_string(),
                    font: font.to_string(),
                    font_data: None,
                },
            )
        })
        .collect();

        Self {
            locales,
            default_code: "en".to_string(),
        }
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let file: LocaleFile = serde_yaml::from_str(source)?;
        if !file.locales.contains_key(&file.default) {
            return Err(ConfigError::Invalid {
                key: "LOCALES_CONFIG",
                message: format!("default locale '{}' is not defined", file.default),
            });
        }

        let locales = file
            .locales
            .into_iter()
            .map(|(code, entry)| {
                let locale = Locale {
                    code: code.clone(),
                    name: entry.name,
                    font: entry.font,
                    font_data: None,
                };
                (code, locale)
            })
            .collect();

        Ok(Self {
            locales,
            default_code: file.default,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    /// Reads `<fonts_dir>/<font>-Regular.ttf` for every locale. A missing file leaves that
    /// locale on the built-in face.
    pub fn with_fonts(mut self, fonts_dir: &Path) -> Self {
        for locale in self.locales.values_mut() {
            let path = fonts_dir.join(format!("{}-Regular.ttf", locale.font));
            match std::fs::read(&path) {
                Ok(bytes) => {
                    log::info!("Loaded font {} for locale {}", path.display(), locale.code);
                    locale.font_data = Some(FontData::new(bytes));
                }
                Err(e) => {
                    log::warn!(
                        "Font loading error for locale {}: {} ({}). Falling back to Helvetica.",
                        locale.code,
                        path.display(),
                        e
                    );
                }
            }
        }
        self
    }

    pub fn resolve(&self, code: Option<&str>) -> &Locale {
        code.and_then(|c| self.locales.get(c))
            .unwrap_or_else(|| self.default_locale())
    }

    pub fn default_locale(&self) -> &Locale {
        // The constructors guarantee the default entry exists.
        &self.locales[&self.default_code]
    }
}
