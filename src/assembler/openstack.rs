use serde_json::{Map, Value};

use super::{builtin, required_variables, render_text, unresolved_variables, Assembler, BootstrapError};
use crate::models::*;

/// Keys the caller must always supply for an OpenStack deployment
const OPENSTACK_REQUIRED: [&str; 3] = ["management_ip", "outside_ip", "inside_ip"];

/// Keys taken from the request when present, otherwise from `defaults.yaml`
const OPENSTACK_OPTIONAL: [&str; 9] = [
    "hostname",
    "image_name",
    "image_flavor",
    "management_network",
    "management_subnet",
    "outside_network",
    "outside_subnet",
    "inside_network",
    "inside_subnet",
];

const HEAT_FILES: [(&str, &str); 3] = [
    (logical_file::HEAT_ENVIRONMENT, builtin::HEAT_ENVIRONMENT),
    (logical_file::HEAT_TEMPLATE, builtin::HEAT_TEMPLATE),
    (logical_file::HEAT_NETWORKS, builtin::HEAT_NETWORKS),
];

impl Assembler {
    /// Add the Heat environment, stack and network templates to `base`.
    ///
    /// In archive mode the stack references the bootstrap files by their
    /// path inside the package; otherwise by their retrieval URL.
    pub async fn build_openstack(
        &self,
        base: &mut BaseConfig,
        parameters: &Parameters,
        archive: bool,
    ) -> Result<(), BootstrapError> {
        let required: Vec<String> = OPENSTACK_REQUIRED.iter().map(|k| k.to_string()).collect();
        let missing = parameters.missing(&required);
        if !missing.is_empty() {
            return Err(BootstrapError::missing("openstack deployment requires", &missing));
        }

        let mut config = openstack_configuration(&self.config.defaults.openstack, parameters);
        for (context_key, file_name) in [
            ("init_cfg", logical_file::INIT_CFG),
            ("bootstrap_xml", logical_file::BOOTSTRAP_XML),
            ("authcodes", logical_file::AUTHCODES),
        ] {
            config.insert(
                context_key.to_string(),
                Value::String(file_reference(base, file_name, archive)),
            );
        }

        let mut rendered = Vec::with_capacity(HEAT_FILES.len());
        for (file_name, template) in HEAT_FILES {
            let required = required_variables(file_name, template)?;
            let unresolved = unresolved_variables(&config, &required);
            if !unresolved.is_empty() {
                return Err(BootstrapError::missing(
                    &format!("{} requires", file_name),
                    &unresolved,
                ));
            }
            rendered.push((file_name, render_text(file_name, template, &config)?));
        }

        for (file_name, contents) in rendered {
            self.store_artifact(base, file_name, archive_path::ROOT, contents)
                .await;
        }
        Ok(())
    }
}

/// Operator openstack defaults overlaid with the recognised request keys
pub fn openstack_configuration(
    defaults: &Map<String, Value>,
    parameters: &Parameters,
) -> Map<String, Value> {
    let mut config = defaults.clone();
    for key in OPENSTACK_REQUIRED.iter().chain(OPENSTACK_OPTIONAL.iter()) {
        if let Some(value) = parameters.get(key) {
            config.insert(key.to_string(), value.clone());
        }
    }
    config
}

fn file_reference(base: &BaseConfig, file_name: &str, archive: bool) -> String {
    match base.get(file_name) {
        Some(entry) if archive => format!("{}/{}", entry.archive_path, file_name),
        Some(entry) => entry.url.clone(),
        None => String::new(),
    }
}
