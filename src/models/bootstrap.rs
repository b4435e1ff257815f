use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Parameters is the canonical request payload: variable name -> value.
/// Built once at the boundary (JSON body, form body or YAML file).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a decoded JSON/YAML document, which must be a mapping
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            Value::Null => Ok(Self::default()),
            other => Err(format!(
                "expected a mapping of parameters, found {}",
                json_type_name(&other)
            )),
        }
    }

    /// Build from form-encoded fields; every value is a string
    pub fn from_form(fields: BTreeMap<String, String>) -> Self {
        Self(
            fields
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Value as text; scalars are stringified, null and structures are not
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Present, not null and not an empty string
    pub fn is_populated(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    /// Names from `required` that are absent or null in this mapping, sorted
    pub fn missing<'a, I>(&self, required: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut missing: Vec<String> = required
            .into_iter()
            .filter(|name| self.0.get(name.as_str()).map_or(true, Value::is_null))
            .cloned()
            .collect();
        missing.sort();
        missing
    }
}

impl FromIterator<(String, Value)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

/// ArtifactEntry points at one rendered file in the artifact cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub key: String,
    pub archive_path: String,
    pub url: String,
}

/// BaseConfig maps logical file names to cached artifacts.
/// Hand-off contract between the assembler and the packager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseConfig(BTreeMap<String, ArtifactEntry>);

impl BaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, entry: ArtifactEntry) {
        self.0.insert(file_name.into(), entry);
    }

    pub fn get(&self, file_name: &str) -> Option<&ArtifactEntry> {
        self.0.get(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.0.contains_key(file_name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArtifactEntry)> {
        self.0.iter()
    }
}

/// Packaging target requested through `archive_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    Zip,
    Iso,
    Tgz,
    S3,
    Azure,
    Gcp,
}

impl ArchiveType {
    pub const ALL: [ArchiveType; 6] = [
        ArchiveType::Zip,
        ArchiveType::Iso,
        ArchiveType::Tgz,
        ArchiveType::S3,
        ArchiveType::Azure,
        ArchiveType::Gcp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveType::Zip => "zip",
            ArchiveType::Iso => "iso",
            ArchiveType::Tgz => "tgz",
            ArchiveType::S3 => "s3",
            ArchiveType::Azure => "azure",
            ArchiveType::Gcp => "gcp",
        }
    }

    /// Local archive targets produce a file; the rest upload to cloud storage
    pub fn is_local(&self) -> bool {
        matches!(self, ArchiveType::Zip | ArchiveType::Iso | ArchiveType::Tgz)
    }
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ArchiveType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unsupported archive_type: {}", s))
    }
}
