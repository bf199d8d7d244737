//! Run options: merging, defaults and validation
//!
//! Options come from the command line and from a config-file profile, both
//! as an [`OptionSet`]. The command line wins; a switch given as `=no` turns
//! off a profile-enabled switch. [`RunOptions::resolve`] validates the merged
//! set before any session work begins.

use crate::error::PipelineError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Partially specified run options
///
/// Field names follow the command-line flags so profiles read the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionSet {
    pub user: Option<String>,
    pub env: Option<String>,
    pub envreq: Option<String>,
    pub release: Option<String>,
    pub build_label: Option<String>,
    pub restart: Option<String>,
    pub deploy: Option<Vec<String>>,
    pub ignorewarnings: Option<bool>,

    pub content_refresh: Option<bool>,
    pub content_tool: Option<bool>,
    pub validate_bigip: Option<bool>,
    pub close_tickets: Option<bool>,
    pub skipreimage: Option<bool>,
    pub skipdbgen: Option<bool>,
    pub noprepatch: Option<bool>,
    pub nopostpatch: Option<bool>,
    pub withsiebel: Option<bool>,

    pub deploy_to: Option<u64>,
    pub reimage_to: Option<u64>,
    pub content_to: Option<u64>,
    pub dbgen_to: Option<u64>,
    pub verify_to: Option<u64>,
}

impl OptionSet {
    /// Fill every unset field from `fallback`
    pub fn or(self, fallback: &OptionSet) -> OptionSet {
        let fb = fallback.clone();
        OptionSet {
            user: self.user.or(fb.user),
            env: self.env.or(fb.env),
            envreq: self.envreq.or(fb.envreq),
            release: self.release.or(fb.release),
            build_label: self.build_label.or(fb.build_label),
            restart: self.restart.or(fb.restart),
            deploy: self.deploy.or(fb.deploy),
            ignorewarnings: self.ignorewarnings.or(fb.ignorewarnings),
            content_refresh: self.content_refresh.or(fb.content_refresh),
            content_tool: self.content_tool.or(fb.content_tool),
            validate_bigip: self.validate_bigip.or(fb.validate_bigip),
            close_tickets: self.close_tickets.or(fb.close_tickets),
            skipreimage: self.skipreimage.or(fb.skipreimage),
            skipdbgen: self.skipdbgen.or(fb.skipdbgen),
            noprepatch: self.noprepatch.or(fb.noprepatch),
            nopostpatch: self.nopostpatch.or(fb.nopostpatch),
            withsiebel: self.withsiebel.or(fb.withsiebel),
            deploy_to: self.deploy_to.or(fb.deploy_to),
            reimage_to: self.reimage_to.or(fb.reimage_to),
            content_to: self.content_to.or(fb.content_to),
            dbgen_to: self.dbgen_to.or(fb.dbgen_to),
            verify_to: self.verify_to.or(fb.verify_to),
        }
    }
}

/// Environment identifier such as `srwd05`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentId {
    lower: String,
}

impl EnvironmentId {
    /// Letters followed by exactly two digits, case-insensitive
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let valid = Regex::new(r"^[A-Za-z]+[0-9]{2}$")
            .map(|re| re.is_match(raw))
            .unwrap_or(false);
        if !valid {
            return Err(PipelineError::InvalidEnvironment(raw.to_string()));
        }
        Ok(Self {
            lower: raw.to_lowercase(),
        })
    }

    pub fn lower(&self) -> &str {
        &self.lower
    }

    pub fn upper(&self) -> String {
        self.lower.to_uppercase()
    }

    /// The two-digit environment number
    pub fn number(&self) -> &str {
        self.lower
            .get(self.lower.len().saturating_sub(2)..)
            .unwrap_or(&self.lower)
    }

    /// Validation domain for environments that need one (`srwe`, `srwq`)
    pub fn validation_domain(&self) -> Option<&'static str> {
        ["srwe", "srwq"]
            .into_iter()
            .find(|domain| self.lower.contains(domain))
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lower)
    }
}

/// One deploy-tool mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployMode {
    FullDeploy,
    Properties,
    Java,
    Restart,
    No,
}

impl DeployMode {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        match raw.trim().to_lowercase().as_str() {
            "full" | "full-deploy" => Ok(DeployMode::FullDeploy),
            "properties" => Ok(DeployMode::Properties),
            "java" => Ok(DeployMode::Java),
            "restart" => Ok(DeployMode::Restart),
            "no" => Ok(DeployMode::No),
            other => Err(PipelineError::Config(format!(
                "unknown deploy mode '{}' (expected full|properties|java|restart|no)",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployMode::FullDeploy => "full-deploy",
            DeployMode::Properties => "properties",
            DeployMode::Java => "java",
            DeployMode::Restart => "restart",
            DeployMode::No => "no",
        }
    }
}

/// What the deploy stage should do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployPlan {
    modes: Vec<DeployMode>,
    build_label: Option<String>,
}

impl DeployPlan {
    /// Defaults to a full deploy; anything but `no` needs a build label
    pub fn resolve(raw_modes: &[String], build_label: Option<String>) -> Result<Self, PipelineError> {
        let mut modes = raw_modes
            .iter()
            .map(|m| DeployMode::parse(m))
            .collect::<Result<Vec<_>, _>>()?;
        if modes.is_empty() {
            modes.push(DeployMode::FullDeploy);
        }

        let deploys = !modes.contains(&DeployMode::No);
        if !deploys && modes.len() > 1 {
            return Err(PipelineError::Config(
                "deploy mode 'no' cannot be combined with other modes".to_string(),
            ));
        }
        if deploys && build_label.as_deref().map_or(true, str::is_empty) {
            return Err(PipelineError::Config(
                "deploy specified without build label".to_string(),
            ));
        }

        Ok(Self { modes, build_label })
    }

    /// `true` when deployment is switched off
    pub fn is_no(&self) -> bool {
        self.modes == [DeployMode::No]
    }

    pub fn modes(&self) -> &[DeployMode] {
        &self.modes
    }

    pub fn build_label(&self) -> Option<&str> {
        self.build_label.as_deref()
    }

    /// `--full-deploy --java ...` as passed to the deploy tool
    pub fn tool_flags(&self) -> String {
        self.modes
            .iter()
            .map(|m| format!("--{}", m.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Per-stage switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    pub skip_reimage: bool,
    pub skip_dbgen: bool,
    pub no_prepatch: bool,
    pub no_postpatch: bool,
    pub with_siebel: bool,
    pub content_refresh: bool,
    pub content_tool: bool,
    pub validate_bigip: bool,
    pub close_tickets: bool,
    pub ignore_warnings: bool,
}

/// Per-operation timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub reimage: Duration,
    pub dbgen: Duration,
    pub verify: Duration,
    pub command: Duration,
    pub deploy: Duration,
    pub content: Duration,
    pub content_tool: Duration,
    pub prepost: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            reimage: Duration::from_secs(3600),
            dbgen: Duration::from_secs(3600),
            verify: Duration::from_secs(720),
            command: Duration::from_secs(120),
            deploy: Duration::from_secs(4800),
            content: Duration::from_secs(1200),
            content_tool: Duration::from_secs(900),
            prepost: Duration::from_secs(240),
        }
    }
}

/// Fully resolved and validated options for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub user: String,
    pub environment: EnvironmentId,
    pub envreq: Option<String>,
    pub release: String,
    pub restart: Option<String>,
    pub deploy: DeployPlan,
    pub flags: StageFlags,
    pub timeouts: Timeouts,
}

impl RunOptions {
    /// Merge command line over profile and validate the result
    pub fn resolve(
        cli: OptionSet,
        profile: Option<&OptionSet>,
        default_user: &str,
    ) -> Result<Self, PipelineError> {
        let merged = match profile {
            Some(profile) => cli.or(profile),
            None => cli,
        };

        let env = merged
            .env
            .filter(|e| !e.is_empty())
            .ok_or_else(|| PipelineError::Config("no environment specified".to_string()))?;
        let environment = EnvironmentId::parse(&env)?;

        let release = merged
            .release
            .filter(|r| !r.is_empty())
            .ok_or_else(|| PipelineError::Config("no release specified".to_string()))?;

        let deploy = DeployPlan::resolve(
            merged.deploy.as_deref().unwrap_or_default(),
            merged.build_label,
        )?;

        let flags = StageFlags {
            skip_reimage: merged.skipreimage.unwrap_or(false),
            skip_dbgen: merged.skipdbgen.unwrap_or(false),
            no_prepatch: merged.noprepatch.unwrap_or(false),
            no_postpatch: merged.nopostpatch.unwrap_or(false),
            with_siebel: merged.withsiebel.unwrap_or(false),
            content_refresh: merged.content_refresh.unwrap_or(false),
            content_tool: merged.content_tool.unwrap_or(false),
            validate_bigip: merged.validate_bigip.unwrap_or(false),
            close_tickets: merged.close_tickets.unwrap_or(false),
            ignore_warnings: merged.ignorewarnings.unwrap_or(false),
        };

        let defaults = Timeouts::default();
        let secs = |value: Option<u64>, default: Duration| value.map(Duration::from_secs).unwrap_or(default);
        let timeouts = Timeouts {
            reimage: secs(merged.reimage_to, defaults.reimage),
            dbgen: secs(merged.dbgen_to, defaults.dbgen),
            verify: secs(merged.verify_to, defaults.verify),
            deploy: secs(merged.deploy_to, defaults.deploy),
            content: secs(merged.content_to, defaults.content),
            ..defaults
        };

        Ok(Self {
            user: merged.user.unwrap_or_else(|| default_user.to_string()),
            environment,
            envreq: merged.envreq.filter(|e| !e.is_empty()),
            release,
            restart: merged.restart.filter(|r| !r.is_empty()),
            deploy,
            flags,
            timeouts,
        })
    }
}
