//! Configuration file (`~/.eom/eom.yaml`)
//!
//! Everything here has a built-in default; the file only needs the keys a
//! site wants to change. Run options live in named profiles and are merged
//! under the command line (see [`crate::core::options`]).

use crate::core::options::OptionSet;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Profile used when none is named on the command line
pub const DEFAULT_PROFILE: &str = "default";

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EomConfig {
    pub server: ServerConfig,
    pub tickets: TicketsConfig,
    /// Extra release id → release name mappings
    pub releases: BTreeMap<String, String>,
    pub commands: CommandTemplates,
    pub timing: TimingConfig,
    pub profiles: HashMap<String, OptionSet>,
}

/// Registration host the pipeline drives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prompt installed after login
    pub shell_prompt: String,
    /// Run right after login; all tooling runs as this user
    pub elevation_command: String,
    pub connect_timeout_secs: u64,
    pub login_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "srwd00reg010.stubcorp.dev".to_string(),
            port: 22,
            shell_prompt: r"\$[ ]".to_string(),
            elevation_command: "sudo -i -u relmgt".to_string(),
            connect_timeout_secs: 30,
            login_timeout_secs: 30,
        }
    }
}

/// Issue tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketsConfig {
    pub base_url: String,
    pub verify_tls: bool,
    pub provisioning_project: String,
    pub db_project: String,
    pub link_relation: String,
    pub environment_field: String,
    pub release_field: String,
    pub provisioning_components: Vec<String>,
    pub db_components: Vec<String>,
}

impl Default for TicketsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://jira.stubcorp.dev/".to_string(),
            verify_tls: false,
            provisioning_project: "PROPROJ".to_string(),
            db_project: "DB".to_string(),
            link_relation: "Dependency".to_string(),
            environment_field: "customfield_10170".to_string(),
            release_field: "customfield_10130".to_string(),
            provisioning_components: vec!["decommission".to_string(), "tokenization".to_string()],
            db_components: vec!["General".to_string()],
        }
    }
}

/// Remote tool invocations, with `{{ name }}` placeholders
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub reimage: String,
    pub verify_reimage: String,
    pub dbgen: String,
    pub dbgen_postpatch: String,
    pub validate: String,
    pub envpatch: String,
    pub build_info: String,
    pub deploy: String,
    pub content_tool: String,
    pub bigip: String,
    pub close_tickets: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            reimage: "time provision -e {{ env }} reimage -v 2>&1".to_string(),
            verify_reimage: "verify-reimage {{ env }}".to_string(),
            dbgen: "time dbgen -u {{ user }} -e {{ ENV }} -r {{ release }} {{ options }}".to_string(),
            dbgen_postpatch: "/nas/reg/bin/env_setup_patch/scripts/dbgenpatch".to_string(),
            validate: "env-validate {{ options }} 2>&1".to_string(),
            envpatch: "/nas/reg/bin/env_setup_patch/scripts/envpatch {{ env }}".to_string(),
            build_info: "export P4USER=readonly ; build-id-info {{ build_label }}".to_string(),
            deploy: "eom-rabbit-deploy --env {{ env }} --release {{ release }} --build-label {{ build_label }} {{ options }}".to_string(),
            content_tool: "/nas/reg/bin/jiralab/jcontent -u {{ user }} -e {{ env }} 3 3 {{ release }}_content".to_string(),
            bigip: "/nas/reg/bin/validate_bigip -e {{ env }}".to_string(),
            close_tickets: "jclose -u {{ user }} {{ tickets }}".to_string(),
        }
    }
}

/// Fixed waits, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub reimage_cooldown_secs: u64,
    pub job_poll_interval_secs: u64,
    pub deploy_wait_secs: u64,
    /// Taken off the dbgen timeout so the tool gives up before the channel
    pub dbgen_margin_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reimage_cooldown_secs: 300,
            job_poll_interval_secs: 60,
            deploy_wait_secs: 600,
            dbgen_margin_secs: 10,
        }
    }
}

/// [`TimingConfig`] as durations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub reimage_cooldown: Duration,
    pub job_poll_interval: Duration,
    pub deploy_wait: Duration,
    pub dbgen_margin: Duration,
}

impl From<&TimingConfig> for Timing {
    fn from(config: &TimingConfig) -> Self {
        Self {
            reimage_cooldown: Duration::from_secs(config.reimage_cooldown_secs),
            job_poll_interval: Duration::from_secs(config.job_poll_interval_secs),
            deploy_wait: Duration::from_secs(config.deploy_wait_secs),
            dbgen_margin: Duration::from_secs(config.dbgen_margin_secs),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

/// Release ids the tooling knows, and the tracker name for each
const BUILTIN_RELEASES: &[(&str, &str)] = &[
    ("rb1306", "ecomm_13.6"),
    ("ecomm_13.6", "ecomm_13.6"),
    ("rb_ecomm_13_6", "ecomm_13.6"),
    ("ecomm_13.6.1", "ecomm_13.6.1"),
    ("rb_ecomm_13_6_1", "ecomm_13.6.1"),
    ("ecomm_13.7", "ecomm_13.7"),
    ("rb_ecomm_13_7", "ecomm_13.7"),
];

impl EomConfig {
    /// Default config location: `~/.eom/eom.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".eom").join("eom.yaml"))
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Resolve the configuration for a run
    ///
    /// An explicit path must exist; the default location is optional.
    pub fn load(explicit: Option<&Path>, ignore_file: bool) -> Result<Self, PipelineError> {
        if ignore_file {
            debug!("Ignoring configuration file");
            return Ok(Self::default());
        }

        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            Some(path) => {
                debug!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Options stored under a profile name
    ///
    /// A missing profile is not an error; the run proceeds on command-line
    /// options alone.
    pub fn profile(&self, name: &str) -> Option<&OptionSet> {
        let profile = self.profiles.get(name);
        if profile.is_none() && !self.profiles.is_empty() {
            warn!("No profile named \"{}\" in configuration, ignoring", name);
        }
        profile
    }

    /// Tracker release name for a release id
    pub fn release_name(&self, release: &str) -> Option<String> {
        self.releases.get(release).cloned().or_else(|| {
            BUILTIN_RELEASES
                .iter()
                .find(|(id, _)| *id == release)
                .map(|(_, name)| name.to_string())
        })
    }

    pub fn timing(&self) -> Timing {
        Timing::from(&self.timing)
    }
}

/// Replace `{{ name }}` placeholders in a command template
pub fn render_template(template: &str, variables: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{ {} }}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }

    rendered
}
