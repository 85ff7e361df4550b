//! Table and collection naming rules.
//!
//! The same transform is applied by every engine so an entity type maps to a
//! predictable table/collection name when moving between providers.

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

/// Casing applied to the entity type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameCasing {
    /// Keep the entity name as declared.
    #[default]
    Preserve,
    /// `ArticleTags`
    Pascal,
    /// `articleTags`
    Camel,
    /// `article_tags`
    Snake,
    /// `articletags`
    Lower,
}

/// Naming convention for derived table / collection names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingOptions {
    /// Prepended verbatim after casing is applied.
    #[serde(default)]
    pub prefix: String,
    /// Appended verbatim after casing is applied.
    #[serde(default)]
    pub suffix: String,
    /// Casing of the entity-derived part.
    #[serde(default)]
    pub casing: NameCasing,
    /// Pluralize the last word of the entity name.
    #[serde(default = "default_pluralize")]
    pub pluralize: bool,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            casing: NameCasing::default(),
            pluralize: default_pluralize(),
        }
    }
}

impl NamingOptions {
    /// Derive the table / collection name for an entity type name.
    pub fn table_name(&self, entity_name: &str) -> String {
        let base = if self.pluralize {
            pluralize(entity_name)
        } else {
            entity_name.to_string()
        };

        let cased = match self.casing {
            NameCasing::Preserve => base,
            NameCasing::Pascal => base.to_case(Case::Pascal),
            NameCasing::Camel => base.to_case(Case::Camel),
            NameCasing::Snake => base.to_case(Case::Snake),
            NameCasing::Lower => base.to_case(Case::Flat),
        };

        format!("{}{}{}", self.prefix, cased, self.suffix)
    }
}

/// English pluralization of the trailing word, good enough for type names.
fn pluralize(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.is_empty() {
        return String::new();
    }
    if lower.ends_with("ss")
        || lower.ends_with("sh")
        || lower.ends_with("ch")
        || lower.ends_with('x')
        || lower.ends_with('z')
    {
        return format!("{name}es");
    }
    if lower.ends_with('s') {
        return name.to_string();
    }
    if let Some(stem) = name.strip_suffix('y').or_else(|| name.strip_suffix('Y')) {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if !matches!(before, Some('a' | 'e' | 'i' | 'o' | 'u') | None) {
            let ies = if name.ends_with('Y') { "IES" } else { "ies" };
            return format!("{stem}{ies}");
        }
    }
    format!("{name}s")
}

fn default_pluralize() -> bool {
    true
}
