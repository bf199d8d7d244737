//! CLI command definitions

use crate::core::config::DEFAULT_PROFILE;
use crate::core::OptionSet;
use clap::Args;
use std::path::PathBuf;

/// Options for a provisioning run
///
/// Switches are tri-state: `--skipreimage`, `--skipreimage=yes` and
/// `--skipreimage=no`. Anything left unset falls back to the profile.
#[derive(Debug, Args, Clone, Default)]
pub struct RunArgs {
    /// User to log in and file tickets as
    #[arg(short, long)]
    pub user: Option<String>,

    /// Login password
    #[arg(short, long, env = "EOM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Environment id, e.g. srwd05
    #[arg(short, long)]
    pub env: Option<String>,

    /// Environment request ticket
    #[arg(short = 'q', long)]
    pub envreq: Option<String>,

    /// Release id, e.g. rb1306
    #[arg(short, long)]
    pub release: Option<String>,

    /// Build label to deploy
    #[arg(short, long = "build_label")]
    pub build_label: Option<String>,

    /// Restart from an existing ticket instead of creating new ones
    #[arg(short = 'R', long)]
    pub restart: Option<String>,

    /// Configuration file (default ~/.eom/eom.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Profile in the configuration file
    #[arg(short = 'P', long, default_value = DEFAULT_PROFILE)]
    pub profile: String,

    /// Ignore the configuration file
    #[arg(long)]
    pub ignoreini: bool,

    /// Deploy modes: full, properties, java, restart, no
    #[arg(short, long, value_delimiter = ',', num_args = 1..)]
    pub deploy: Vec<String>,

    /// Continue past validation warnings other than ssh/sudo/database failures
    #[arg(long, alias = "ignorewarning")]
    pub ignorewarnings: bool,

    /// Refresh content as part of the deploy
    #[arg(long = "content_refresh", num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub content_refresh: Option<bool>,

    /// Run the content tool after deploying
    #[arg(long = "content_tool", num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub content_tool: Option<bool>,

    /// Validate the load balancer configuration
    #[arg(long = "validate_bigip", num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub validate_bigip: Option<bool>,

    /// Close the build tickets when everything passed
    #[arg(long = "close_tickets", num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub close_tickets: Option<bool>,

    #[arg(long, num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub skipreimage: Option<bool>,

    #[arg(long, num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub skipdbgen: Option<bool>,

    #[arg(long, num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub noprepatch: Option<bool>,

    #[arg(long, num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub nopostpatch: Option<bool>,

    #[arg(long, num_args = 0..=1, default_missing_value = "yes", value_parser = parse_switch)]
    pub withsiebel: Option<bool>,

    /// Deploy timeout in seconds
    #[arg(long = "deploy_to")]
    pub deploy_to: Option<u64>,

    /// Re-image timeout in seconds
    #[arg(long = "reimage_to")]
    pub reimage_to: Option<u64>,

    /// Extra deploy timeout with --content_refresh, in seconds
    #[arg(long = "content_to")]
    pub content_to: Option<u64>,

    /// dbgen timeout in seconds
    #[arg(long = "dbgen_to")]
    pub dbgen_to: Option<u64>,

    /// Validation timeout in seconds
    #[arg(long = "verify_to")]
    pub verify_to: Option<u64>,
}

impl RunArgs {
    /// Command-line half of the option merge
    pub fn option_set(&self) -> OptionSet {
        OptionSet {
            user: self.user.clone(),
            env: self.env.clone(),
            envreq: self.envreq.clone(),
            release: self.release.clone(),
            build_label: self.build_label.clone(),
            restart: self.restart.clone(),
            deploy: (!self.deploy.is_empty()).then(|| self.deploy.clone()),
            ignorewarnings: self.ignorewarnings.then_some(true),
            content_refresh: self.content_refresh,
            content_tool: self.content_tool,
            validate_bigip: self.validate_bigip,
            close_tickets: self.close_tickets,
            skipreimage: self.skipreimage,
            skipdbgen: self.skipdbgen,
            noprepatch: self.noprepatch,
            nopostpatch: self.nopostpatch,
            withsiebel: self.withsiebel,
            deploy_to: self.deploy_to,
            reimage_to: self.reimage_to,
            content_to: self.content_to,
            dbgen_to: self.dbgen_to,
            verify_to: self.verify_to,
        }
    }
}

/// Parse a switch value: yes/no, true/false, on/off, 1/0
pub fn parse_switch(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "yes" | "y" | "true" | "on" | "1" => Ok(true),
        "no" | "n" | "false" | "off" | "0" => Ok(false),
        _ => Err(format!("Invalid switch value '{}' (expected yes or no)", s)),
    }
}
