//! Stages 800-1000: post-deploy tooling and ticket closeout

use crate::core::{PipelineContext, Stage, StageOutcome};
use crate::error::PipelineError;
use crate::execution::StageRuntime;
use crate::stages::render_command;
use crate::tickets::TicketId;
use async_trait::async_trait;
use tracing::{info, warn};

/// 800: apply content after a successful (or skipped) deploy
pub struct ContentToolStage;

#[async_trait]
impl Stage for ContentToolStage {
    fn name(&self) -> &str {
        "content-tool"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        if !ctx.flags.content_tool {
            return Ok(StageOutcome::skipped("--content_tool not set"));
        }
        if !(ctx.deploy_succeeded || ctx.deploy.is_no()) {
            return Ok(StageOutcome::skipped("deployment did not succeed"));
        }

        let command = render_command(&rt.config.commands.content_tool, ctx, &[]);
        let timeout = ctx.timeouts.content_tool;
        info!("Running content tool: {}", command);
        let result = rt.run_command(&command, timeout).await?;
        if result.is_timed_out() {
            rt.comment(
                ctx,
                &format!("Content Tool time-out after {} secs", timeout.as_secs()),
            )
            .await;
        } else {
            rt.comment(ctx, &format!("Apply Content Tool\n{}", result.before()))
                .await;
        }

        Ok(StageOutcome::Advance)
    }
}

/// 900: load-balancer validation
pub struct BigIpStage;

#[async_trait]
impl Stage for BigIpStage {
    fn name(&self) -> &str {
        "bigip"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        if !ctx.flags.validate_bigip {
            return Ok(StageOutcome::skipped("--validate_bigip not set"));
        }

        let command = render_command(&rt.config.commands.bigip, ctx, &[]);
        info!("Running BigIP validation: {}", command);
        let result = rt.run_command(&command, ctx.timeouts.command).await?;
        if result.is_timed_out() {
            warn!("BigIP validation did not return");
        }
        rt.comment(ctx, &format!("Big IP validation\n{}", result.before()))
            .await;

        Ok(StageOutcome::Advance)
    }
}

/// 1000: hand the environment over and close the build tickets
pub struct CloseoutStage;

impl CloseoutStage {
    /// Tickets to close, database task first
    pub fn closable(ctx: &PipelineContext) -> Vec<&TicketId> {
        [&ctx.tickets.db_task, &ctx.tickets.provisioning]
            .into_iter()
            .filter_map(|ticket| ticket.resolved())
            .collect()
    }
}

#[async_trait]
impl Stage for CloseoutStage {
    fn name(&self) -> &str {
        "closeout"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        if ctx.resume_from.is_none() && ctx.deploy_succeeded {
            if let Some(request) = ctx.tickets.env_request.resolved() {
                match rt.tickets.transition(request, "Verify").await {
                    Ok(()) => info!("Env request {} set to Verify", request),
                    Err(e) => warn!("Env request {} cannot be set to Verify: {}", request, e),
                }
            }
        }

        if ctx.flags.close_tickets && ctx.validation_passed && ctx.deploy_succeeded {
            let tickets = Self::closable(ctx)
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            if tickets.is_empty() {
                warn!("No build tickets to close");
            } else {
                let command = render_command(
                    &rt.config.commands.close_tickets,
                    ctx,
                    &[("tickets", tickets.as_str())],
                );
                info!("Closing build tickets: {}", command);
                let result = rt.run_command(&command, ctx.timeouts.command).await?;
                if result.is_timed_out() {
                    warn!("Ticket close tool did not return");
                }
            }
        }

        info!("Execution complete for {}", ctx.environment);
        Ok(StageOutcome::Advance)
    }
}
