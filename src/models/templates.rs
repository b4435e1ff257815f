use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a stored template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TemplateKind {
    #[default]
    #[serde(rename = "bootstrap")]
    Bootstrap,
    #[serde(rename = "init-cfg", alias = "init-config")]
    InitConfig,
    #[serde(rename = "config-snippet")]
    ConfigSnippet,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Bootstrap => "bootstrap",
            TemplateKind::InitConfig => "init-cfg",
            TemplateKind::ConfigSnippet => "config-snippet",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bootstrap" => Ok(TemplateKind::Bootstrap),
            "init-cfg" | "init-config" => Ok(TemplateKind::InitConfig),
            "config-snippet" => Ok(TemplateKind::ConfigSnippet),
            other => Err(format!("unknown template type: {}", other)),
        }
    }
}

/// Template represents a stored configuration template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    pub description: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// TemplateSummary is the listing view of a template (no body)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TemplateKind,
}

impl TemplateSummary {
    /// Listing placeholder meaning "no bootstrap.xml required"
    pub fn none_sentinel() -> Self {
        Self {
            name: NO_BOOTSTRAP_TEMPLATE.to_string(),
            description: "No Bootstrap.xml Required".to_string(),
            kind: TemplateKind::Bootstrap,
        }
    }
}

impl From<&Template> for TemplateSummary {
    fn from(t: &Template) -> Self {
        Self {
            name: t.name.clone(),
            description: t.description.clone(),
            kind: t.kind,
        }
    }
}

/// Sentinel bootstrap template name that disables the bootstrap stage
pub const NO_BOOTSTRAP_TEMPLATE: &str = "None";

/// TemplateUpsert carries the fields for importing or editing a template
#[derive(Debug, Clone)]
pub struct TemplateUpsert {
    pub name: String,
    pub description: String,
    pub kind: TemplateKind,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_accepts_alias() {
        assert_eq!("init-cfg".parse::<TemplateKind>().unwrap(), TemplateKind::InitConfig);
        assert_eq!("init-config".parse::<TemplateKind>().unwrap(), TemplateKind::InitConfig);
        assert_eq!("config-snippet".parse::<TemplateKind>().unwrap(), TemplateKind::ConfigSnippet);
        assert!("firmware".parse::<TemplateKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_as_stored_value() {
        let json = serde_json::to_string(&TemplateKind::InitConfig).unwrap();
        assert_eq!(json, "\"init-cfg\"");
    }
}
