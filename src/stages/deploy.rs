//! Stages 600-700: pre-deploy patch and application deployment

use crate::core::{BuildInfo, PipelineContext, Stage, StageOutcome};
use crate::error::PipelineError;
use crate::execution::StageRuntime;
use crate::remote::PatternSet;
use crate::stages::render_command;
use async_trait::async_trait;
use tracing::{info, warn};

/// Deploy tool result line prefix
pub const DEPLOY_SENTINEL: &str = "RABBIT Deployment";
/// Deploy tool line pointing at its logs
pub const DEPLOY_LOGS_SENTINEL: &str = "Deployment logs:";

/// 600: environment patch script ahead of the deploy
pub struct PrepatchStage;

#[async_trait]
impl Stage for PrepatchStage {
    fn name(&self) -> &str {
        "predeploy"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        if ctx.flags.no_prepatch {
            return Ok(StageOutcome::skipped("--noprepatch set"));
        }
        if ctx.deploy.is_no() {
            return Ok(StageOutcome::skipped("no deployment requested"));
        }

        let command = render_command(&rt.config.commands.envpatch, ctx, &[]);
        info!("Running predeploy script: {}", command);
        let result = rt.run_command(&command, ctx.timeouts.prepost).await?;
        if result.is_timed_out() {
            warn!("Predeploy script did not return; continuing");
        }
        rt.comment(ctx, &format!("Automatic predeploy script\n{}", result.before()))
            .await;

        Ok(StageOutcome::Advance)
    }
}

/// Outcome lines picked out of the deploy tool's output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    /// `Some(true)` on SUCCESSFUL, `Some(false)` on FAILED
    pub succeeded: Option<bool>,
    pub logs: Option<String>,
}

impl DeployReport {
    pub fn parse(output: &str) -> Self {
        let mut report = DeployReport::default();
        for line in output.lines() {
            if line.contains(DEPLOY_SENTINEL) {
                if line.contains("SUCCESSFUL") {
                    report.succeeded = Some(true);
                } else if line.contains("FAILED") {
                    report.succeeded = Some(false);
                }
            }
            if line.contains(DEPLOY_LOGS_SENTINEL) {
                report.logs = Some(line.trim_end().to_string());
            }
        }
        report
    }
}

/// 700: look up the build, then run the deploy tool
pub struct DeployStage;

impl DeployStage {
    async fn build_info(
        ctx: &PipelineContext,
        rt: &StageRuntime,
        label: &str,
    ) -> Result<BuildInfo, PipelineError> {
        let command = render_command(&rt.config.commands.build_info, ctx, &[("build_label", label)]);
        let result = rt
            .expect(&command, ctx.timeouts.command, PatternSet::json_or_prompt())
            .await?;
        if result.is_timed_out() {
            return Err(PipelineError::ChannelTimeout {
                command,
                timeout: ctx.timeouts.command,
            });
        }

        BuildInfo::from_output(&result.transcript()).map_err(|reason| PipelineError::BuildInfo {
            label: label.to_string(),
            reason,
        })
    }

    /// Options for the deploy tool
    pub fn options(ctx: &PipelineContext, info: &BuildInfo) -> String {
        let mut options = vec![ctx.deploy.tool_flags()];
        if let Some(iteration) = &info.build_tree_iteration {
            options.push(format!("--tree {}", iteration));
        }
        if ctx.flags.content_refresh {
            options.push("--content-refresh".to_string());
        }
        options.join(" ")
    }
}

#[async_trait]
impl Stage for DeployStage {
    fn name(&self) -> &str {
        "deploy"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        if ctx.deploy.is_no() {
            ctx.deploy_succeeded = false;
            return Ok(StageOutcome::skipped("deploy mode is no"));
        }
        let label = ctx
            .deploy
            .build_label()
            .map(str::to_string)
            .ok_or_else(|| PipelineError::Config("deploy specified without build label".to_string()))?;

        if ctx.resume_from.is_none() {
            if let Some(request) = ctx.tickets.env_request.resolved() {
                match rt.tickets.transition(request, "App Deployment").await {
                    Ok(()) => info!("Env request {} set to App Deployment", request),
                    Err(e) => warn!("Env request {} cannot be set to App Deployment: {}", request, e),
                }
            }
        }

        let info = Self::build_info(ctx, rt, &label).await?;
        info!(
            "Build {} (tree {}, iteration {})",
            info.build_label,
            info.build_tree_id.as_deref().unwrap_or("-"),
            info.build_tree_iteration.as_deref().unwrap_or("-")
        );

        let timeout = if ctx.flags.content_refresh {
            ctx.timeouts.deploy + ctx.timeouts.content
        } else {
            ctx.timeouts.deploy
        };
        let options = Self::options(ctx, &info);
        let title = match &info.build_tree_id {
            Some(tree) => format!("Deploy {} ({})", label, tree),
            None => format!("Deploy {}", label),
        };
        let command = render_command(
            &rt.config.commands.deploy,
            ctx,
            &[("build_label", label.as_str()), ("options", options.as_str())],
        );
        ctx.build_info = Some(info);

        info!("Starting app deploy: {}", command);
        let result = rt.run_command(&command, timeout).await?;
        if result.is_timed_out() {
            rt.comment(
                ctx,
                &format!("App Deploy timed out after {} seconds.", timeout.as_secs()),
            )
            .await;
            return Err(PipelineError::DeployTimeout(timeout));
        }
        rt.comment(ctx, &format!("{}\n{}", title, result.before()))
            .await;

        let report = DeployReport::parse(result.before());
        if let Some(logs) = &report.logs {
            info!("{}", logs);
        }
        ctx.deploy_logs = report.logs;
        match report.succeeded {
            Some(true) => {
                info!("{} deployment SUCCESS", label);
                ctx.deploy_succeeded = true;
                info!(
                    "Sleeping {} seconds after deploy",
                    rt.timing.deploy_wait.as_secs()
                );
                tokio::time::sleep(rt.timing.deploy_wait).await;
            }
            Some(false) => {
                warn!("{} deployment FAIL", label);
                ctx.deploy_succeeded = false;
            }
            None => {
                warn!("Deploy tool printed no result line; assuming success");
                ctx.deploy_succeeded = true;
            }
        }

        Ok(StageOutcome::Advance)
    }
}
