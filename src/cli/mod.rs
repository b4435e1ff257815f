use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::assembler::BootstrapError;
use crate::config::Config;
use crate::models::*;
use crate::packager::{PackageError, PackageOutput};
use crate::services::bootstrap::{build_package, wants_openstack, BuildTarget};
use crate::AppState;

#[derive(Parser)]
#[command(name = "bootstrapper")]
#[command(about = "Build bootstrap packages for network appliances")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,

    /// Build a zip package from a YAML parameter file
    BuildZip(BuildArgs),

    /// Build a gzip'd tarball from a YAML parameter file
    BuildTgz(BuildArgs),

    /// Build an ISO image from a YAML parameter file
    BuildIso(BuildArgs),

    /// Upload a package to an S3 bucket named after the host
    BuildAws {
        #[arg(help = "Path to YAML parameter file")]
        file: PathBuf,
    },

    /// Upload a package to an Azure file share named after the host
    BuildAzure {
        #[arg(help = "Path to YAML parameter file")]
        file: PathBuf,
    },

    /// Upload a package to a GCS bucket named after the host
    BuildGcp {
        #[arg(help = "Path to YAML parameter file")]
        file: PathBuf,
    },

    /// Import a template file into the catalog
    ImportTemplate {
        #[arg(help = "Template name")]
        name: String,

        #[arg(help = "Path to template file")]
        file: PathBuf,

        #[arg(long = "type", help = "Template type", default_value = "bootstrap")]
        kind: String,

        #[arg(long, help = "Template description")]
        description: Option<String>,
    },

    /// Print a stored template
    GetTemplate {
        #[arg(help = "Template name")]
        name: String,
    },

    /// List stored templates
    ListTemplates {
        #[arg(long = "type", help = "Template type", default_value = "bootstrap")]
        kind: String,
    },
}

#[derive(clap::Args)]
pub struct BuildArgs {
    #[arg(help = "Path to YAML parameter file")]
    pub file: PathBuf,

    #[arg(short, long, help = "Where to write the archive (default: ./<hostname>.<ext>)")]
    pub output: Option<PathBuf>,
}

/// Cloud credentials read from the environment, by request parameter name
const CREDENTIAL_ENV: [(&str, &str); 7] = [
    ("AWS_LOCATION", "aws_location"),
    ("AWS_ACCESS_KEY", "aws_key"),
    ("AWS_SECRET_KEY", "aws_secret"),
    ("AZURE_STORAGE_ACCOUNT", "azure_account_name"),
    ("AZURE_STORAGE_ACCESS_KEY", "azure_account_key"),
    ("GCP_PROJECT_ID", "gcp_project_id"),
    ("GCP_ACCESS_TOKEN", "gcp_access_token"),
];

/// CLI failures, each with its process exit code
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Failed(String),

    #[error("could not parse {path}: {message}")]
    Unparsable { path: String, message: String },

    #[error("{0}")]
    MissingParameters(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Failed(_) => 1,
            CliError::Unparsable { .. } => 2,
            CliError::MissingParameters(_) => 3,
            CliError::TemplateNotFound(_) => 4,
        }
    }
}

impl From<BootstrapError> for CliError {
    fn from(err: BootstrapError) -> Self {
        match err {
            BootstrapError::RequiredParameters(msg) => CliError::MissingParameters(msg),
            BootstrapError::TemplateNotFound(name) => CliError::TemplateNotFound(name),
            BootstrapError::InvalidConfiguration(msg) => CliError::Unparsable {
                path: "configuration".to_string(),
                message: msg,
            },
            BootstrapError::Package(PackageError::MissingCredentials(msg)) => {
                CliError::MissingParameters(msg)
            }
            BootstrapError::Package(e) => CliError::Failed(e.to_string()),
        }
    }
}

impl From<PackageError> for CliError {
    fn from(err: PackageError) -> Self {
        BootstrapError::from(err).into()
    }
}

/// Run a one-shot command and return the process exit code
pub async fn run(command: Command, cfg: Config) -> i32 {
    match execute(command, cfg).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {}", e);
            e.exit_code()
        }
    }
}

async fn execute(command: Command, cfg: Config) -> Result<(), CliError> {
    let state = AppState::init(cfg)
        .await
        .map_err(|e| CliError::Failed(format!("{:#}", e)))?;

    match command {
        Command::Serve => Ok(()),
        Command::BuildZip(args) => build_archive(&state, ArchiveType::Zip, args).await,
        Command::BuildTgz(args) => build_archive(&state, ArchiveType::Tgz, args).await,
        Command::BuildIso(args) => build_archive(&state, ArchiveType::Iso, args).await,
        Command::BuildAws { file } => upload(&state, ArchiveType::S3, &file).await,
        Command::BuildAzure { file } => upload(&state, ArchiveType::Azure, &file).await,
        Command::BuildGcp { file } => upload(&state, ArchiveType::Gcp, &file).await,
        Command::ImportTemplate {
            name,
            file,
            kind,
            description,
        } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| CliError::Failed(format!("could not read {}: {}", file.display(), e)))?;
            let kind: TemplateKind = kind.parse().map_err(CliError::MissingParameters)?;
            let upsert = TemplateUpsert {
                name: name.clone(),
                description: description.unwrap_or_else(|| "Imported Template".to_string()),
                kind,
                content,
            };
            if !state.store.import_template(&upsert).await {
                return Err(CliError::Failed(format!("could not import template {}", name)));
            }
            println!("Imported {}", name);
            Ok(())
        }
        Command::GetTemplate { name } => {
            let template = state
                .store
                .get_template(&name)
                .await
                .ok_or_else(|| CliError::TemplateNotFound(name.clone()))?;
            print!("{}", template.content);
            Ok(())
        }
        Command::ListTemplates { kind } => {
            let kind: TemplateKind = kind.parse().map_err(CliError::MissingParameters)?;
            for template in state.store.list_templates(kind).await {
                println!("{}\t{}", template.name, template.description);
            }
            Ok(())
        }
    }
}

/// Parse a YAML (or JSON) parameter file
fn parse_parameters(path: &Path, text: &str) -> Result<Parameters, CliError> {
    let unparsable = |message: String| CliError::Unparsable {
        path: path.display().to_string(),
        message,
    };
    let value: serde_json::Value =
        serde_yaml::from_str(text).map_err(|e| unparsable(e.to_string()))?;
    Parameters::from_value(value).map_err(unparsable)
}

async fn load_parameters(path: &Path) -> Result<Parameters, CliError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Failed(format!("could not read {}: {}", path.display(), e)))?;
    parse_parameters(path, &text)
}

/// Fill unset credential parameters from the environment
fn apply_credentials<F>(parameters: &mut Parameters, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (var, name) in CREDENTIAL_ENV {
        if parameters.is_populated(name) {
            continue;
        }
        if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
            parameters.insert(name, value);
        }
    }
}

async fn package(state: &AppState, archive_type: ArchiveType, file: &Path) -> Result<PackageOutput, CliError> {
    let mut parameters = load_parameters(file).await?;
    apply_credentials(&mut parameters, |var| std::env::var(var).ok());

    let target = BuildTarget::Fixed {
        archive_type,
        openstack: wants_openstack(&parameters),
    };
    let output = build_package(&state.assembler, &state.packager, &state.store, &parameters, target).await?;
    Ok(output)
}

async fn build_archive(state: &AppState, archive_type: ArchiveType, args: BuildArgs) -> Result<(), CliError> {
    match package(state, archive_type, &args.file).await? {
        PackageOutput::Archive(archive) => {
            let dest = args
                .output
                .unwrap_or_else(|| PathBuf::from(&archive.file_name));
            let len = archive.persist(&dest).await?;
            println!("Wrote {} ({} bytes)", dest.display(), len);
            Ok(())
        }
        PackageOutput::Uploaded(location) => {
            println!("{}", location);
            Ok(())
        }
    }
}

async fn upload(state: &AppState, archive_type: ArchiveType, file: &Path) -> Result<(), CliError> {
    match package(state, archive_type, file).await? {
        PackageOutput::Uploaded(location) => {
            println!("{}", location);
            Ok(())
        }
        PackageOutput::Archive(archive) => Err(CliError::Failed(format!(
            "{} produced a local archive {}",
            archive_type, archive.file_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_yaml_and_json_parameters() {
        let path = Path::new("fw1.yaml");
        let params = parse_parameters(path, "hostname: fw1\nauth_code: I123\n").unwrap();
        assert_eq!(params.text("hostname").as_deref(), Some("fw1"));

        let params = parse_parameters(path, r#"{"hostname": "fw2"}"#).unwrap();
        assert_eq!(params.text("hostname").as_deref(), Some("fw2"));

        let err = parse_parameters(path, "hostname: [unclosed").unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = parse_parameters(path, "- just\n- a list\n").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_apply_credentials_keeps_explicit_values() {
        let env: HashMap<&str, &str> = [
            ("AWS_LOCATION", "us-west-2"),
            ("AWS_ACCESS_KEY", "AKIDEXAMPLE"),
            ("AWS_SECRET_KEY", ""),
        ]
        .into_iter()
        .collect();
        let mut params = parse_parameters(Path::new("p.yaml"), "hostname: fw1\naws_key: explicit\n").unwrap();
        apply_credentials(&mut params, |var| env.get(var).map(|v| v.to_string()));

        assert_eq!(params.text("aws_location").as_deref(), Some("us-west-2"));
        assert_eq!(params.text("aws_key").as_deref(), Some("explicit"));
        assert!(!params.contains_key("aws_secret"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::from(BootstrapError::RequiredParameters("x".into())).exit_code(), 3);
        assert_eq!(CliError::from(BootstrapError::TemplateNotFound("x".into())).exit_code(), 4);
        assert_eq!(
            CliError::from(PackageError::MissingCredentials("aws_key".into())).exit_code(),
            3
        );
        assert_eq!(CliError::from(PackageError::Archive("boom".into())).exit_code(), 1);
    }
}
