//! Configuration assembly: resolve templates, validate variables, merge
//! defaults, render and hand cached artifacts to the packager.

pub mod builtin;
mod error;
mod openstack;
pub mod render;
pub mod variables;

pub use error::BootstrapError;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cache::ArtifactCache;
use crate::config::OperatorConfig;
use crate::models::*;

/// Legacy auth-code parameter names, highest priority first.
/// The first populated alias is copied into `auth_key`.
pub const AUTH_CODE_ALIASES: [&str; 3] = ["authcodes", "authcode", "auth_code"];

/// Read-only access to stored template bodies
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn template_content(&self, name: &str) -> Option<String>;
}

/// Assembler turns request parameters into a rendered base configuration
#[derive(Clone)]
pub struct Assembler {
    cache: ArtifactCache,
    config: Arc<OperatorConfig>,
}

impl Assembler {
    pub fn new(cache: ArtifactCache, config: Arc<OperatorConfig>) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Build the base configuration (init-cfg, optional authcodes, optional bootstrap.xml)
    pub async fn assemble(
        &self,
        source: &dyn TemplateSource,
        parameters: &Parameters,
    ) -> Result<BaseConfig, BootstrapError> {
        let mut parameters = parameters.clone();
        let mut base = BaseConfig::new();

        // init-cfg: requested template, falling back to the operator default
        let (init_cfg_name, init_cfg_template) =
            self.resolve_init_cfg(source, &parameters).await?;

        let required = required_variables(&init_cfg_name, &init_cfg_template)?;
        let missing = parameters.missing(&required);
        if !missing.is_empty() {
            tracing::info!("init-cfg template {} is missing variables: {:?}", init_cfg_name, missing);
            return Err(BootstrapError::missing(
                &format!("template '{}' requires", init_cfg_name),
                &missing,
            ));
        }

        let init_cfg = render_text(&init_cfg_name, &init_cfg_template, &parameters)?;
        self.store_artifact(&mut base, logical_file::INIT_CFG, archive_path::CONFIG, init_cfg)
            .await;

        if let Some(alias) = normalize_auth_code(&mut parameters) {
            tracing::debug!("Using {} as auth_key", alias);
        }
        if parameters.contains_key(param::AUTH_KEY) {
            let authcodes = render_text("authcodes", builtin::AUTHCODES, &parameters)?;
            self.store_artifact(&mut base, logical_file::AUTHCODES, archive_path::LICENSE, authcodes)
                .await;
        }

        if let Some(bootstrap_name) = requested_bootstrap_template(&parameters) {
            let bootstrap_template = source
                .template_content(&bootstrap_name)
                .await
                .ok_or_else(|| BootstrapError::TemplateNotFound(bootstrap_name.clone()))?;

            let required = required_variables(&bootstrap_name, &bootstrap_template)?;
            let bootstrap_config =
                defaulted_configuration(&self.config.defaults.bootstrap, &required, &parameters);

            let unresolved = unresolved_variables(&bootstrap_config, &required);
            if !unresolved.is_empty() {
                return Err(BootstrapError::missing(
                    &format!("template '{}' requires", bootstrap_name),
                    &unresolved,
                ));
            }

            let bootstrap_xml = render_text(&bootstrap_name, &bootstrap_template, &bootstrap_config)?;
            self.store_artifact(&mut base, logical_file::BOOTSTRAP_XML, archive_path::CONFIG, bootstrap_xml)
                .await;
        }

        Ok(base)
    }

    /// Render one stored template against the posted variables
    pub async fn compile_template(
        &self,
        source: &dyn TemplateSource,
        parameters: &Parameters,
    ) -> Result<String, BootstrapError> {
        let name = parameters
            .text(param::TEMPLATE_NAME)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| BootstrapError::missing("render requires", &[param::TEMPLATE_NAME.to_string()]))?;

        let template = source
            .template_content(&name)
            .await
            .ok_or_else(|| BootstrapError::TemplateNotFound(name.clone()))?;

        let required = required_variables(&name, &template)?;
        let missing = parameters.missing(&required);
        if !missing.is_empty() {
            return Err(BootstrapError::missing(
                &format!("template '{}' requires", name),
                &missing,
            ));
        }

        render_text(&name, &template, parameters)
    }

    /// Variables declared by a single stored template
    pub async fn template_variables(
        &self,
        source: &dyn TemplateSource,
        name: &str,
    ) -> Result<BTreeSet<String>, BootstrapError> {
        let template = source
            .template_content(name)
            .await
            .ok_or_else(|| BootstrapError::TemplateNotFound(name.to_string()))?;
        required_variables(name, &template)
    }

    /// Union of the variables of the requested init-cfg and bootstrap templates.
    /// Missing or unparsable templates contribute nothing.
    pub async fn bootstrap_variables(
        &self,
        source: &dyn TemplateSource,
        parameters: &Parameters,
    ) -> BTreeSet<String> {
        let mut names = vec![parameters
            .text(param::INIT_CFG_TEMPLATE)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.config.settings.default_init_cfg.clone())];
        if let Some(bootstrap) = requested_bootstrap_template(parameters) {
            names.push(bootstrap);
        }

        let mut variables = BTreeSet::new();
        for name in names {
            match self.template_variables(source, &name).await {
                Ok(found) => variables.extend(found),
                Err(e) => tracing::warn!("Could not load variables for {}: {}", name, e),
            }
        }
        variables
    }

    async fn resolve_init_cfg(
        &self,
        source: &dyn TemplateSource,
        parameters: &Parameters,
    ) -> Result<(String, String), BootstrapError> {
        let default_name = self.config.settings.default_init_cfg.clone();

        if let Some(requested) = parameters
            .text(param::INIT_CFG_TEMPLATE)
            .filter(|n| !n.is_empty())
        {
            if let Some(template) = source.template_content(&requested).await {
                return Ok((requested, template));
            }
            tracing::warn!(
                "init-cfg template {} not found, falling back to {}",
                requested,
                default_name
            );
        }

        match source.template_content(&default_name).await {
            Some(template) => Ok((default_name, template)),
            None => Err(BootstrapError::TemplateNotFound(default_name)),
        }
    }

    async fn store_artifact(
        &self,
        base: &mut BaseConfig,
        file_name: &str,
        path: &str,
        contents: String,
    ) {
        let key = self.cache.set(contents).await;
        let url = self.config.artifact_url(&key);
        base.insert(
            file_name,
            ArtifactEntry {
                key,
                archive_path: path.to_string(),
                url,
            },
        );
    }
}

/// Skeleton request body for a set of variables: every value empty, or a
/// `{{ name }}` placeholder for form builders (`format=aframe`)
pub fn variable_payload<'a, I>(variables: I, placeholders: bool) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a String>,
{
    variables
        .into_iter()
        .map(|name| {
            let value = if placeholders {
                format!("{{{{ {} }}}}", name)
            } else {
                String::new()
            };
            (name.clone(), Value::String(value))
        })
        .collect()
}

/// Copy the first populated legacy alias into `auth_key`; returns the alias used
pub fn normalize_auth_code(parameters: &mut Parameters) -> Option<&'static str> {
    let alias = AUTH_CODE_ALIASES
        .into_iter()
        .find(|alias| parameters.is_populated(alias))?;
    if let Some(value) = parameters.get(alias).cloned() {
        parameters.insert(param::AUTH_KEY, value);
    }
    Some(alias)
}

/// Bootstrap template name when one is requested (not empty, not "None")
pub fn requested_bootstrap_template(parameters: &Parameters) -> Option<String> {
    parameters
        .text(param::BOOTSTRAP_TEMPLATE)
        .filter(|n| !n.is_empty() && n != NO_BOOTSTRAP_TEMPLATE)
}

/// Operator defaults overlaid with every required variable the caller supplied.
/// A required variable with neither a supplied value nor a default is null.
pub fn defaulted_configuration(
    defaults: &Map<String, Value>,
    required: &BTreeSet<String>,
    parameters: &Parameters,
) -> Map<String, Value> {
    let mut config = defaults.clone();
    for name in required {
        match parameters.get(name) {
            Some(value) => {
                config.insert(name.clone(), value.clone());
            }
            None => {
                config.entry(name.clone()).or_insert(Value::Null);
            }
        }
    }
    config
}

/// Required names that are absent or null in `config`, sorted
pub fn unresolved_variables(config: &Map<String, Value>, required: &BTreeSet<String>) -> Vec<String> {
    required
        .iter()
        .filter(|name| config.get(name.as_str()).map_or(true, Value::is_null))
        .cloned()
        .collect()
}

fn required_variables(name: &str, template: &str) -> Result<BTreeSet<String>, BootstrapError> {
    variables::extract(template).map_err(|e| {
        tracing::warn!("Could not parse template {}: {}", name, e);
        BootstrapError::RequiredParameters(format!(
            "variables of template '{}' could not be resolved ({})",
            name, e
        ))
    })
}

fn render_text<C: serde::Serialize>(
    name: &str,
    template: &str,
    context: &C,
) -> Result<String, BootstrapError> {
    render::render(template, context).map_err(|e| {
        tracing::warn!("Could not render template {}: {}", name, e);
        BootstrapError::RequiredParameters(format!("template '{}' could not be rendered: {}", name, e))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    /// In-memory template source
    pub(crate) struct MemorySource(pub HashMap<String, String>);

    impl MemorySource {
        pub(crate) fn with(templates: &[(&str, &str)]) -> Self {
            Self(
                templates
                    .iter()
                    .map(|(n, t)| (n.to_string(), t.to_string()))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl TemplateSource for MemorySource {
        async fn template_content(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    const INIT_CFG: &str = "type=dhcp-client\nhostname={{ hostname }}\n";
    const BOOTSTRAP: &str = "<config><hostname>{{ hostname }}</hostname><tz>{{ timezone }}</tz></config>";

    fn assembler_with(defaults: &str) -> (Assembler, ArtifactCache) {
        let cache = ArtifactCache::new(Duration::from_secs(300), 64);
        let config = OperatorConfig::from_yaml("base_url: http://bs.local", defaults).unwrap();
        (Assembler::new(cache.clone(), Arc::new(config)), cache)
    }

    fn source() -> MemorySource {
        MemorySource::with(&[
            ("Default Init-Cfg", INIT_CFG),
            ("Static Init-Cfg", "hostname={{ hostname }}\nip-address={{ ip_address }}\n"),
            ("Default Bootstrap.xml", BOOTSTRAP),
            ("Broken", "{% if %}"),
        ])
    }

    fn params(value: serde_json::Value) -> Parameters {
        Parameters::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_assemble_init_cfg_only() {
        let (assembler, cache) = assembler_with("");
        let base = assembler
            .assemble(&source(), &params(json!({"hostname": "fw1"})))
            .await
            .unwrap();

        assert_eq!(base.len(), 1);
        let entry = base.get(logical_file::INIT_CFG).unwrap();
        assert_eq!(entry.archive_path, "config");
        assert_eq!(entry.url, format!("http://bs.local/get/{}", entry.key));
        assert_eq!(
            cache.get(&entry.key).await.as_deref(),
            Some("type=dhcp-client\nhostname=fw1\n")
        );
    }

    #[tokio::test]
    async fn test_missing_init_cfg_variable_is_required_parameters_error() {
        let (assembler, _) = assembler_with("");
        let err = assembler
            .assemble(
                &source(),
                &params(json!({"hostname": "fw1", "init_cfg_template": "Static Init-Cfg"})),
            )
            .await
            .unwrap_err();
        match err {
            BootstrapError::RequiredParameters(msg) => assert!(msg.contains("ip_address")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_null_init_cfg_variable_is_missing() {
        let (assembler, cache) = assembler_with("");
        let source = MemorySource::with(&[(
            "Default Init-Cfg",
            "hostname={{ hostname }}\nip={{ ip_address }}\n",
        )]);
        let err = assembler
            .assemble(&source, &params(json!({"hostname": "fw1", "ip_address": null})))
            .await
            .unwrap_err();
        match err {
            BootstrapError::RequiredParameters(msg) => assert!(msg.contains("ip_address")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(cache.len().await, 0);

        let err = assembler
            .compile_template(
                &source,
                &params(json!({"template_name": "Default Init-Cfg", "hostname": "fw1", "ip_address": null})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::RequiredParameters(msg) if msg.contains("ip_address")));
    }

    #[tokio::test]
    async fn test_unknown_init_cfg_falls_back_to_default() {
        let (assembler, cache) = assembler_with("");
        let base = assembler
            .assemble(
                &source(),
                &params(json!({"hostname": "fw1", "init_cfg_template": "Missing"})),
            )
            .await
            .unwrap();
        let key = &base.get(logical_file::INIT_CFG).unwrap().key;
        assert!(cache.get(key).await.unwrap().contains("hostname=fw1"));
    }

    #[tokio::test]
    async fn test_no_init_cfg_at_all_is_template_not_found() {
        let (assembler, _) = assembler_with("");
        let err = assembler
            .assemble(&MemorySource::with(&[]), &params(json!({"hostname": "fw1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::TemplateNotFound(name) if name == "Default Init-Cfg"));
    }

    #[tokio::test]
    async fn test_unparsable_init_cfg_is_reported_not_panicked() {
        let (assembler, _) = assembler_with("");
        let err = assembler
            .assemble(
                &source(),
                &params(json!({"hostname": "fw1", "init_cfg_template": "Broken"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::RequiredParameters(_)));
    }

    #[tokio::test]
    async fn test_none_sentinel_skips_bootstrap() {
        let (assembler, _) = assembler_with("");
        for value in [json!("None"), json!("")] {
            let base = assembler
                .assemble(
                    &source(),
                    &params(json!({"hostname": "fw1", "bootstrap_template": value})),
                )
                .await
                .unwrap();
            assert!(!base.contains(logical_file::BOOTSTRAP_XML));
        }

        let base = assembler
            .assemble(&source(), &params(json!({"hostname": "fw1"})))
            .await
            .unwrap();
        assert!(!base.contains(logical_file::BOOTSTRAP_XML));
    }

    #[tokio::test]
    async fn test_bootstrap_uses_defaults_for_unsupplied_variables() {
        let (assembler, cache) = assembler_with("bootstrap:\n  timezone: UTC\n");
        let base = assembler
            .assemble(
                &source(),
                &params(json!({"hostname": "fw1", "bootstrap_template": "Default Bootstrap.xml"})),
            )
            .await
            .unwrap();

        let entry = base.get(logical_file::BOOTSTRAP_XML).unwrap();
        assert_eq!(entry.archive_path, "config");
        assert_eq!(
            cache.get(&entry.key).await.as_deref(),
            Some("<config><hostname>fw1</hostname><tz>UTC</tz></config>")
        );
    }

    #[tokio::test]
    async fn test_bootstrap_supplied_value_overrides_default() {
        let (assembler, cache) = assembler_with("bootstrap:\n  timezone: UTC\n");
        let base = assembler
            .assemble(
                &source(),
                &params(json!({
                    "hostname": "fw1",
                    "timezone": "US/Pacific",
                    "bootstrap_template": "Default Bootstrap.xml",
                })),
            )
            .await
            .unwrap();
        let key = &base.get(logical_file::BOOTSTRAP_XML).unwrap().key;
        assert!(cache.get(key).await.unwrap().contains("<tz>US/Pacific</tz>"));
    }

    #[tokio::test]
    async fn test_bootstrap_unresolvable_variable_fails() {
        let (assembler, _) = assembler_with("");
        let err = assembler
            .assemble(
                &source(),
                &params(json!({"hostname": "fw1", "bootstrap_template": "Default Bootstrap.xml"})),
            )
            .await
            .unwrap_err();
        match err {
            BootstrapError::RequiredParameters(msg) => assert!(msg.contains("timezone")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_bootstrap_template_is_not_found() {
        let (assembler, _) = assembler_with("");
        let err = assembler
            .assemble(
                &source(),
                &params(json!({"hostname": "fw1", "bootstrap_template": "Nope"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::TemplateNotFound(name) if name == "Nope"));
    }

    #[tokio::test]
    async fn test_auth_code_produces_license_entry() {
        let (assembler, cache) = assembler_with("");
        let base = assembler
            .assemble(&source(), &params(json!({"hostname": "fw1", "auth_code": "I1234567"})))
            .await
            .unwrap();
        let entry = base.get(logical_file::AUTHCODES).unwrap();
        assert_eq!(entry.archive_path, "license");
        assert_eq!(entry.url, format!("http://bs.local/get/{}", entry.key));
        assert_eq!(cache.get(&entry.key).await.as_deref(), Some("I1234567\n"));
    }

    #[test]
    fn test_auth_alias_precedence() {
        let mut p = params(json!({"authcode": "X", "authcodes": "Y"}));
        assert_eq!(normalize_auth_code(&mut p), Some("authcodes"));
        assert_eq!(p.text("auth_key").as_deref(), Some("Y"));

        let mut p = params(json!({"auth_code": "A", "authcode": "B"}));
        assert_eq!(normalize_auth_code(&mut p), Some("authcode"));
        assert_eq!(p.text("auth_key").as_deref(), Some("B"));

        // empty aliases do not win
        let mut p = params(json!({"authcodes": "", "auth_code": "A"}));
        assert_eq!(normalize_auth_code(&mut p), Some("auth_code"));
        assert_eq!(p.text("auth_key").as_deref(), Some("A"));

        let mut p = params(json!({"auth_key": "K"}));
        assert_eq!(normalize_auth_code(&mut p), None);
        assert_eq!(p.text("auth_key").as_deref(), Some("K"));
    }

    #[test]
    fn test_defaulted_configuration() {
        let defaults = json!({"timezone": "UTC", "ntp": "pool.ntp.org"});
        let defaults = defaults.as_object().unwrap();
        let required: BTreeSet<String> = ["hostname", "timezone", "dns"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let p = params(json!({"hostname": "fw1", "unrelated": "x"}));

        let config = defaulted_configuration(defaults, &required, &p);
        assert_eq!(config["hostname"], "fw1");
        assert_eq!(config["timezone"], "UTC");
        assert_eq!(config["ntp"], "pool.ntp.org");
        assert_eq!(config["dns"], Value::Null);
        assert!(!config.contains_key("unrelated"));
        assert_eq!(unresolved_variables(&config, &required), vec!["dns"]);
    }

    #[tokio::test]
    async fn test_compile_template() {
        let (assembler, _) = assembler_with("");
        let out = assembler
            .compile_template(
                &source(),
                &params(json!({"template_name": "Default Init-Cfg", "hostname": "fw9"})),
            )
            .await
            .unwrap();
        assert!(out.contains("hostname=fw9"));

        let err = assembler
            .compile_template(&source(), &params(json!({"hostname": "fw9"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::RequiredParameters(_)));

        let err = assembler
            .compile_template(&source(), &params(json!({"template_name": "Nope"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::TemplateNotFound(_)));
    }

    #[test]
    fn test_variable_payload_formats() {
        let vars: BTreeSet<String> = ["hostname", "timezone"].iter().map(|s| s.to_string()).collect();
        let plain = variable_payload(&vars, false);
        assert_eq!(plain["hostname"], "");
        let aframe = variable_payload(&vars, true);
        assert_eq!(aframe["hostname"], "{{ hostname }}");
        assert_eq!(aframe["timezone"], "{{ timezone }}");
    }

    #[tokio::test]
    async fn test_bootstrap_variables_union() {
        let (assembler, _) = assembler_with("");
        let vars = assembler
            .bootstrap_variables(
                &source(),
                &params(json!({
                    "init_cfg_template": "Static Init-Cfg",
                    "bootstrap_template": "Default Bootstrap.xml",
                })),
            )
            .await;
        let vars: Vec<&str> = vars.iter().map(|s| s.as_str()).collect();
        assert_eq!(vars, vec!["hostname", "ip_address", "timezone"]);

        let vars = assembler
            .bootstrap_variables(&source(), &params(json!({"bootstrap_template": "None"})))
            .await;
        assert_eq!(vars.into_iter().collect::<Vec<_>>(), vec!["hostname"]);
    }
}
