use crate::assembler::{Assembler, BootstrapError, TemplateSource};
use crate::models::*;
use crate::packager::{PackageOutput, Packager};
use crate::utils::is_valid_hostname;

/// Deployment type that adds the OpenStack Heat overlay
pub const OPENSTACK_DEPLOYMENT: &str = "openstack";

/// How a build request selects its packaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    /// Use `archive_type` from the request, else the operator default
    FromRequest,
    /// Ignore `archive_type`; optionally force the OpenStack overlay
    Fixed { archive_type: ArchiveType, openstack: bool },
}

/// Hostname validated for use as package and directory name
pub fn package_name(parameters: &Parameters) -> Result<String, BootstrapError> {
    let hostname = parameters
        .text(param::HOSTNAME)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| BootstrapError::missing("bootstrap package requires", &[param::HOSTNAME.to_string()]))?;
    if !is_valid_hostname(&hostname) {
        return Err(BootstrapError::RequiredParameters(format!(
            "invalid hostname: {:?}",
            hostname
        )));
    }
    Ok(hostname)
}

/// `archive_type` from the request, falling back to `default`
pub fn archive_type(parameters: &Parameters, default: ArchiveType) -> Result<ArchiveType, BootstrapError> {
    match parameters.text(param::ARCHIVE_TYPE).filter(|t| !t.is_empty()) {
        Some(requested) => requested.parse().map_err(BootstrapError::RequiredParameters),
        None => Ok(default),
    }
}

/// `deployment_type` asks for the OpenStack overlay
pub fn wants_openstack(parameters: &Parameters) -> bool {
    parameters
        .text(param::DEPLOYMENT_TYPE)
        .map(|t| t.eq_ignore_ascii_case(OPENSTACK_DEPLOYMENT))
        .unwrap_or(false)
}

/// Assemble, optionally add the OpenStack overlay, and package
pub async fn build_package(
    assembler: &Assembler,
    packager: &Packager,
    source: &dyn TemplateSource,
    parameters: &Parameters,
    target: BuildTarget,
) -> Result<PackageOutput, BootstrapError> {
    let name = package_name(parameters)?;
    let (archive_type, openstack) = match target {
        BuildTarget::FromRequest => (
            archive_type(parameters, assembler.config().settings.default_archive_type)?,
            wants_openstack(parameters),
        ),
        BuildTarget::Fixed { archive_type, openstack } => (archive_type, openstack),
    };

    let missing = packager.missing_credentials(archive_type, parameters)?;
    if !missing.is_empty() {
        return Err(BootstrapError::missing(
            &format!("{} packaging requires", archive_type),
            &missing,
        ));
    }

    let mut base = assembler.assemble(source, parameters).await?;
    if openstack {
        tracing::info!("Including openstack overlay for {}", name);
        assembler
            .build_openstack(&mut base, parameters, archive_type.is_local())
            .await?;
    }

    let output = packager
        .package(archive_type, &name, &base, parameters)
        .await?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Parameters {
        Parameters::from_value(value).unwrap()
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name(&params(json!({"hostname": "fw1"}))).unwrap(), "fw1");
        assert!(matches!(
            package_name(&params(json!({}))),
            Err(BootstrapError::RequiredParameters(_))
        ));
        assert!(matches!(
            package_name(&params(json!({"hostname": ""}))),
            Err(BootstrapError::RequiredParameters(_))
        ));
        assert!(matches!(
            package_name(&params(json!({"hostname": "../../etc"}))),
            Err(BootstrapError::RequiredParameters(_))
        ));
    }

    #[test]
    fn test_archive_type_resolution() {
        assert_eq!(
            archive_type(&params(json!({})), ArchiveType::Tgz).unwrap(),
            ArchiveType::Tgz
        );
        assert_eq!(
            archive_type(&params(json!({"archive_type": "ISO"})), ArchiveType::Zip).unwrap(),
            ArchiveType::Iso
        );
        assert!(matches!(
            archive_type(&params(json!({"archive_type": "rar"})), ArchiveType::Zip),
            Err(BootstrapError::RequiredParameters(_))
        ));
    }

    #[test]
    fn test_wants_openstack() {
        assert!(wants_openstack(&params(json!({"deployment_type": "openstack"}))));
        assert!(!wants_openstack(&params(json!({"deployment_type": "kvm"}))));
        assert!(!wants_openstack(&params(json!({}))));
    }
}
