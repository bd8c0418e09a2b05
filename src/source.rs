use std::fmt;

use serde::Serialize;

use crate::context::{ConfigError, EnvironmentContext};

/// Secret-store entry holding the source-control token.
pub const DEFAULT_CREDENTIAL_SECRET: &str = "github-token";

/// Pointer to a credential held outside the pipeline definition. The value is
/// only looked up by the platform at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "store", content = "name", rename_all = "kebab-case")]
pub enum CredentialReference {
    SecretsManager(String),
}

impl CredentialReference {
    pub fn secrets_manager(name: impl Into<String>) -> Self {
        Self::SecretsManager(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::SecretsManager(name) => name,
        }
    }
}

impl Default for CredentialReference {
    fn default() -> Self {
        Self::secrets_manager(DEFAULT_CREDENTIAL_SECRET)
    }
}

impl fmt::Display for CredentialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecretsManager(name) => write!(f, "secretsmanager:{name}"),
        }
    }
}

/// The source trigger every step consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub repo_string: String,
    pub branch: String,
    pub credential: CredentialReference,
}

impl SourceDescriptor {
    pub fn github(
        repo_string: impl Into<String>,
        branch: impl Into<String>,
        credential: CredentialReference,
    ) -> Result<Self, ConfigError> {
        let repo_string = repo_string.into();
        let branch = branch.into();
        validate_repo_string(&repo_string)?;
        if branch.trim().is_empty() {
            return Err(ConfigError::InvalidBranch(repo_string));
        }
        Ok(Self {
            repo_string,
            branch,
            credential,
        })
    }

    pub fn from_context(context: &EnvironmentContext) -> Result<Self, ConfigError> {
        Self::github(
            context.repository.name.clone(),
            context.repository.branch.clone(),
            CredentialReference::default(),
        )
    }

    pub fn owner(&self) -> &str {
        self.repo_string
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or_default()
    }

    pub fn repository(&self) -> &str {
        self.repo_string
            .split_once('/')
            .map(|(_, repo)| repo)
            .unwrap_or_default()
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repo_string, self.branch)
    }
}

fn validate_repo_string(repo_string: &str) -> Result<(), ConfigError> {
    let valid = match repo_string.split_once('/') {
        Some((owner, repo)) => {
            !owner.is_empty()
                && !repo.is_empty()
                && !repo.contains('/')
                && !repo_string.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidRepository(repo_string.to_string()))
    }
}
