mod bootstrap;
mod templates;

pub use bootstrap::*;
pub use templates::*;

/// Canonical logical file names in a base configuration
pub mod logical_file {
    pub const INIT_CFG: &str = "init-cfg.txt";
    pub const BOOTSTRAP_XML: &str = "bootstrap.xml";
    pub const AUTHCODES: &str = "authcodes";
    pub const HEAT_ENVIRONMENT: &str = "heat-environment.yaml";
    pub const HEAT_TEMPLATE: &str = "heat-template.yaml";
    pub const HEAT_NETWORKS: &str = "heat-networks.yaml";
}

/// Canonical top-level directories of a bootstrap package
pub mod archive_path {
    pub const CONFIG: &str = "config";
    pub const CONTENT: &str = "content";
    pub const SOFTWARE: &str = "software";
    pub const LICENSE: &str = "license";
    pub const ROOT: &str = ".";

    pub const SKELETON: &[&str] = &[CONFIG, CONTENT, SOFTWARE, LICENSE];
}

/// Well-known request parameter names
pub mod param {
    pub const HOSTNAME: &str = "hostname";
    pub const INIT_CFG_TEMPLATE: &str = "init_cfg_template";
    pub const BOOTSTRAP_TEMPLATE: &str = "bootstrap_template";
    pub const TEMPLATE_NAME: &str = "template_name";
    pub const AUTH_KEY: &str = "auth_key";
    pub const AUTH_CODE: &str = "auth_code";
    pub const ARCHIVE_TYPE: &str = "archive_type";
    pub const DEPLOYMENT_TYPE: &str = "deployment_type";
    pub const FORMAT: &str = "format";
}
