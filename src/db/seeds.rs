use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::*;

const DEFAULT_INIT_CFG: &str = r#"type=dhcp-client
ip-address=
default-gateway=
netmask=
ipv6-address=
ipv6-default-gateway=
hostname={{ hostname }}
vm-auth-key={{ vm_auth_key | default(value="") }}
panorama-server={{ panorama_server | default(value="") }}
panorama-server-2={{ panorama_server_2 | default(value="") }}
tplname={{ tplname | default(value="") }}
dgname={{ dgname | default(value="") }}
dns-primary={{ dns_primary | default(value="") }}
dns-secondary={{ dns_secondary | default(value="") }}
op-command-modes={{ op_command_modes | default(value="") }}
dhcp-send-hostname=yes
dhcp-send-client-id=yes
dhcp-accept-server-hostname=yes
dhcp-accept-server-domain=yes
"#;

const STATIC_INIT_CFG: &str = r#"type=static
ip-address={{ ip_address }}
default-gateway={{ default_gateway }}
netmask={{ netmask }}
ipv6-address=
ipv6-default-gateway=
hostname={{ hostname }}
vm-auth-key={{ vm_auth_key | default(value="") }}
panorama-server={{ panorama_server | default(value="") }}
panorama-server-2={{ panorama_server_2 | default(value="") }}
tplname={{ tplname | default(value="") }}
dgname={{ dgname | default(value="") }}
dns-primary={{ dns_primary | default(value="") }}
dns-secondary={{ dns_secondary | default(value="") }}
op-command-modes={{ op_command_modes | default(value="") }}
"#;

const DEFAULT_BOOTSTRAP_XML: &str = r#"<?xml version="1.0"?>
<config version="10.1.0" urldb="paloaltonetworks">
  <mgt-config>
    <users>
      <entry name="admin">
        <phash>{{ admin_password | md5_hash }}</phash>
        <permissions>
          <role-based>
            <superuser>yes</superuser>
          </role-based>
        </permissions>
      </entry>
    </users>
  </mgt-config>
  <devices>
    <entry name="localhost.localdomain">
      <deviceconfig>
        <system>
          <hostname>{{ hostname }}</hostname>
          <timezone>{{ timezone }}</timezone>
          <dns-setting>
            <servers>
              <primary>{{ dns_primary }}</primary>
              <secondary>{{ dns_secondary }}</secondary>
            </servers>
          </dns-setting>
          <ntp-servers>
            <primary-ntp-server>
              <ntp-server-address>{{ ntp_primary }}</ntp-server-address>
            </primary-ntp-server>
          </ntp-servers>
          <type>
            <dhcp-client>
              <send-hostname>yes</send-hostname>
              <send-client-id>no</send-client-id>
              <accept-dhcp-hostname>no</accept-dhcp-hostname>
              <accept-dhcp-domain>no</accept-dhcp-domain>
            </dhcp-client>
          </type>
        </system>
      </deviceconfig>
    </entry>
  </devices>
</config>
"#;

/// Templates bundled with the service
pub fn default_templates() -> Vec<TemplateUpsert> {
    vec![
        TemplateUpsert {
            name: "Default Init-Cfg".to_string(),
            description: "Init-Cfg with DHCP management interface".to_string(),
            kind: TemplateKind::InitConfig,
            content: DEFAULT_INIT_CFG.to_string(),
        },
        TemplateUpsert {
            name: "Static Init-Cfg".to_string(),
            description: "Init-Cfg with static management IP".to_string(),
            kind: TemplateKind::InitConfig,
            content: STATIC_INIT_CFG.to_string(),
        },
        TemplateUpsert {
            name: "Default Bootstrap.xml".to_string(),
            description: "Minimal bootstrap.xml with admin user, DNS and NTP".to_string(),
            kind: TemplateKind::Bootstrap,
            content: DEFAULT_BOOTSTRAP_XML.to_string(),
        },
    ]
}

/// One `meta.yaml` entry: a template read from `<type>/<filename>` or fetched from `url`
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: Option<String>,
    description: Option<String>,
    filename: Option<String>,
    url: Option<String>,
}

/// Read `<import_dir>/meta.yaml` and resolve every usable entry.
/// A missing manifest imports nothing; unusable entries are skipped with a warning.
pub async fn load_import_manifest(import_dir: &Path) -> Result<Vec<TemplateUpsert>> {
    let manifest_path = import_dir.join("meta.yaml");
    let text = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No import manifest at {}", manifest_path.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", manifest_path.display()))
        }
    };

    let manifest: BTreeMap<String, Vec<ManifestEntry>> = if text.trim().is_empty() {
        BTreeMap::new()
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse {}", manifest_path.display()))?
    };

    let mut templates = Vec::new();
    for (type_name, entries) in manifest {
        let kind: TemplateKind = match type_name.parse() {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!("Skipping import section: {}", e);
                continue;
            }
        };

        for entry in entries {
            let (Some(name), Some(description)) = (entry.name, entry.description) else {
                tracing::warn!("Skipping {} import entry without name or description", type_name);
                continue;
            };

            let content = if let Some(filename) = &entry.filename {
                read_template_file(&import_dir.join(&type_name).join(filename)).await
            } else if let Some(url) = &entry.url {
                download_template(url).await
            } else {
                tracing::warn!("Skipping template {}: no filename or url", name);
                continue;
            };

            if let Some(content) = content {
                templates.push(TemplateUpsert {
                    name,
                    description,
                    kind,
                    content,
                });
            }
        }
    }
    Ok(templates)
}

async fn read_template_file(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("Could not read template {}: {}", path.display(), e);
            None
        }
    }
}

async fn download_template(url: &str) -> Option<String> {
    let response = match reqwest::get(url).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Could not download template {}: {}", url, e);
            return None;
        }
    };
    if !response.status().is_success() {
        tracing::warn!("Could not download template {}: {}", url, response.status());
        return None;
    }
    match response.text().await {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("Could not read template body from {}: {}", url, e);
            None
        }
    }
}
