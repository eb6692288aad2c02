use crate::constants::{
    DEFAULT_ANNOTATIONS_FILE, DEFAULT_ANNOTATION_DOMAIN, DEFAULT_LEASES_FILE,
    DEFAULT_LEASES_FILE_PATH, DEFAULT_RESOURCES_FILE, DEFAULT_RESOURCES_FILE_PATH,
    DEFAULT_SECRETS_FILE,
};
use clap::Parser;
use std::path::PathBuf;

/// Resolve a pod's annotated secrets, resources and leases into files
#[derive(Debug, Clone, Parser)]
#[command(name = "secret-lease-init")]
#[command(
    about = "Resolve pod annotations into secret, resource and lease files",
    long_about = None,
    after_help = "\
Every option can also be set through the environment variable shown.
Nothing is written unless every annotated parameter resolves.
"
)]
pub struct InitOptions {
    /// Downward API annotations file
    #[arg(long, env = "ANNOTATIONS_FILE", default_value = DEFAULT_ANNOTATIONS_FILE)]
    pub annotations_file: PathBuf,

    #[arg(long, env = "SECRETS_FILE", default_value = DEFAULT_SECRETS_FILE)]
    pub secrets_file: PathBuf,

    #[arg(long, env = "RESOURCES_FILE", default_value = DEFAULT_RESOURCES_FILE)]
    pub resources_file: PathBuf,

    /// Directory for one decoded file per resource
    #[arg(long, env = "RESOURCES_FILE_PATH", default_value = DEFAULT_RESOURCES_FILE_PATH)]
    pub resources_file_path: PathBuf,

    #[arg(long, env = "LEASES_FILE", default_value = DEFAULT_LEASES_FILE)]
    pub leases_file: PathBuf,

    /// Directory for one file per lease, holding the slot number
    #[arg(long, env = "LEASES_FILE_PATH", default_value = DEFAULT_LEASES_FILE_PATH)]
    pub leases_file_path: PathBuf,

    /// Lease requester identity
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Names the DynamoDB table; required unless the pod is in local mode
    #[arg(long, env = "ENV_LABEL")]
    pub env_label: Option<String>,

    #[arg(long, env = "ANNOTATION_DOMAIN", default_value = DEFAULT_ANNOTATION_DOMAIN)]
    pub annotation_domain: String,
}

impl InitOptions {
    /// Lease requester, with blank values treated as unset.
    #[must_use]
    pub fn requester(&self) -> Option<&str> {
        self.pod_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = InitOptions::try_parse_from(["secret-lease-init"]).unwrap();
        assert_eq!(options.annotations_file, PathBuf::from("/podinfo/annotations"));
        assert_eq!(
            options.secrets_file,
            PathBuf::from("/bsycorp-init/secrets.properties")
        );
        assert_eq!(options.annotation_domain, "bsycorp.com");
    }

    #[test]
    fn test_flags_override_defaults() {
        let options = InitOptions::try_parse_from([
            "secret-lease-init",
            "--leases-file-path",
            "/tmp/leases",
            "--pod-name",
            "api-7d9f",
        ])
        .unwrap();
        assert_eq!(options.leases_file_path, PathBuf::from("/tmp/leases"));
        assert_eq!(options.requester(), Some("api-7d9f"));
    }

    #[test]
    fn test_blank_pod_name_is_no_requester() {
        let options =
            InitOptions::try_parse_from(["secret-lease-init", "--pod-name", "  "]).unwrap();
        assert_eq!(options.requester(), None);
    }
}
