use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::space_key::SpaceKey;

pub const DEFAULT_USER_AGENT: &str = "spacetool/0.1";
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_DOCUMENTATION_TITLE: &str = "Documentation";
pub const DEFAULT_DOCUMENTATION_BODY: &str = "<p>Automatically created documentation page</p>";
pub const DEFAULT_SPACE_DESCRIPTION: &str = "Automatically generated space";

pub const ENV_STORE_URL: &str = "STORE_URL";
pub const ENV_STORE_USER_AGENT: &str = "STORE_USER_AGENT";
pub const ENV_STORE_USER: &str = "STORE_USER";
pub const ENV_STORE_API_TOKEN: &str = "STORE_API_TOKEN";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ToolConfig {
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub copy: CopySection,
    #[serde(default)]
    pub ingest: IngestSection,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct StoreSection {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub rate_limit_read_ms: Option<u64>,
    pub rate_limit_write_ms: Option<u64>,
    pub max_retries: Option<usize>,
    pub max_write_retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct CopySection {
    pub source_space: Option<String>,
    #[serde(default)]
    pub excluded_titles: Vec<String>,
    pub page_size: Option<usize>,
    pub space_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct IngestSection {
    pub base_dir: Option<PathBuf>,
    pub documentation_title: Option<String>,
    pub documentation_body: Option<String>,
}

/// Credentials for the content store. Only ever read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = non_empty(lookup_env(ENV_STORE_USER));
        let api_token = non_empty(lookup_env(ENV_STORE_API_TOKEN));
        match (username, api_token) {
            (Some(username), Some(api_token)) => Ok(Self {
                username,
                api_token,
            }),
            (None, _) => bail!("{ENV_STORE_USER} is required to talk to the content store"),
            (_, None) => bail!("{ENV_STORE_API_TOKEN} is required to talk to the content store"),
        }
    }
}

impl ToolConfig {
    /// Resolve the store base URL: env STORE_URL > config > None.
    pub fn base_url(&self) -> Option<String> {
        self.base_url_with_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn base_url_with_lookup<F>(&self, lookup_env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup_env(ENV_STORE_URL))
            .or_else(|| non_empty(self.store.base_url.clone()))
            .map(|url| url.trim_end_matches('/').to_string())
    }

    /// Resolve user agent: env STORE_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        self.user_agent_with_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn user_agent_with_lookup<F>(&self, lookup_env: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup_env(ENV_STORE_USER_AGENT))
            .or_else(|| non_empty(self.store.user_agent.clone()))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn source_space(&self) -> Option<SpaceKey> {
        non_empty(self.copy.source_space.clone()).map(SpaceKey::new)
    }

    pub fn excluded_titles(&self) -> BTreeSet<String> {
        self.copy.excluded_titles.iter().cloned().collect()
    }

    pub fn page_size(&self) -> usize {
        self.copy
            .page_size
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn space_description(&self) -> &str {
        self.copy
            .space_description
            .as_deref()
            .unwrap_or(DEFAULT_SPACE_DESCRIPTION)
    }

    pub fn documentation_title(&self) -> &str {
        self.ingest
            .documentation_title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_DOCUMENTATION_TITLE)
    }

    pub fn documentation_body(&self) -> &str {
        self.ingest
            .documentation_body
            .as_deref()
            .unwrap_or(DEFAULT_DOCUMENTATION_BODY)
    }

    /// Units to process, optionally restricted to `filter` (exact names).
    pub fn selected_units(&self, filter: &[String]) -> Result<Vec<String>> {
        let units: Vec<String> = self
            .units
            .iter()
            .map(|unit| unit.trim().to_string())
            .filter(|unit| !unit.is_empty())
            .collect();
        if units.is_empty() {
            bail!("no organizational units configured (set `units = [...]` in the config file)");
        }
        if filter.is_empty() {
            return Ok(units);
        }
        let mut selected = Vec::new();
        for wanted in filter {
            let wanted = wanted.trim();
            match units.iter().find(|unit| unit.as_str() == wanted) {
                Some(unit) => selected.push(unit.clone()),
                None => bail!("unit `{wanted}` is not in the configured unit list"),
            }
        }
        Ok(selected)
    }

    /// Fails before any remote call when the copy run cannot proceed.
    pub fn validate_for_copy(&self) -> Result<()> {
        self.require_base_url()?;
        if self.source_space().is_none() {
            bail!("[copy].source_space is required for `copy`");
        }
        Ok(())
    }

    /// Fails before any remote call when the ingest run cannot proceed.
    pub fn validate_for_ingest(&self) -> Result<PathBuf> {
        self.require_base_url()?;
        let Some(base_dir) = self.ingest.base_dir.clone() else {
            bail!("[ingest].base_dir is required for `ingest`");
        };
        if !base_dir.is_dir() {
            bail!(
                "[ingest].base_dir does not exist or is not a directory: {}",
                base_dir.display()
            );
        }
        Ok(base_dir)
    }

    pub fn require_base_url(&self) -> Result<String> {
        self.base_url().ok_or_else(|| {
            anyhow::anyhow!("content store URL is not configured (set {ENV_STORE_URL} or [store].base_url)")
        })
    }
}

/// Load and parse a ToolConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ToolConfig> {
    if !config_path.exists() {
        return Ok(ToolConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ToolConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Commented starting point written by `spacetool init`.
pub fn render_config_template() -> String {
    format!(
        "# spacetool configuration (materialized by `spacetool init`)\n# Credentials are read from {ENV_STORE_USER} / {ENV_STORE_API_TOKEN} (environment or .env).\n\nunits = []\n\n[store]\n# base_url = \"https://your-site.atlassian.net/wiki/rest/api\"\nuser_agent = \"{DEFAULT_USER_AGENT}\"\n# rate_limit_read_ms = 200\n# rate_limit_write_ms = 500\n# max_retries = 2\n\n[copy]\n# source_space = \"TEMPLATE\"\nexcluded_titles = []\npage_size = {DEFAULT_PAGE_SIZE}\nspace_description = \"{DEFAULT_SPACE_DESCRIPTION}\"\n\n[ingest]\n# base_dir = \"/path/to/unit/folders\"\ndocumentation_title = \"{DEFAULT_DOCUMENTATION_TITLE}\"\n"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}
