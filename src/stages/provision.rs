//! Stages 100-410: session, tickets, and the long-running provisioning jobs

use crate::core::{PipelineContext, Stage, StageOutcome};
use crate::error::PipelineError;
use crate::execution::operations::{DbGenOperation, ReimageOperation};
use crate::execution::{ChannelSource, Job, StageRuntime};
use crate::remote::session::open_channel;
use crate::stages::render_command;
use crate::tickets::{TicketFields, TicketId};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

/// 100: resolve the release and open the pipeline channel
pub struct LoginStage;

#[async_trait]
impl Stage for LoginStage {
    fn name(&self) -> &str {
        "login"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        let release_name = rt
            .config
            .release_name(&ctx.release)
            .ok_or_else(|| PipelineError::UnknownRelease(ctx.release.clone()))?;
        info!("Release {} is tracked as {}", ctx.release, release_name);
        ctx.release_name = Some(release_name);

        if rt.session.is_none() {
            let channel = open_channel(rt.connector.clone()).await?;
            rt.session = Some(channel.shared());
        }

        Ok(StageOutcome::Advance)
    }
}

/// 200: create the provisioning tickets, or pick them up on a restart
pub struct TicketStage;

impl TicketStage {
    async fn create(ctx: &mut PipelineContext, rt: &StageRuntime) -> Result<(), PipelineError> {
        let settings = &rt.config.tickets;
        let env = ctx.environment.upper();
        let release_name = ctx.release_label().to_string();

        info!("Creating tickets for {}", env);
        let provisioning_summary = format!("{}: Configure readiness for code deploy", env);
        let provisioning = rt
            .tickets
            .create_ticket(&TicketFields {
                project: settings.provisioning_project.clone(),
                issue_type: "Task".to_string(),
                summary: provisioning_summary.clone(),
                description: provisioning_summary,
                assignee: Some(ctx.user.clone()),
                environment: Some(env.clone()),
                release: Some(release_name.clone()),
                components: settings.provisioning_components.clone(),
            })
            .await
            .map_err(PipelineError::TicketCreation)?;
        info!("Provisioning ticket {}", provisioning);
        ctx.tickets.provisioning = Some(provisioning.clone()).into();

        if !ctx.flags.skip_dbgen {
            let siebel = if ctx.flags.with_siebel { "/Siebel" } else { "" };
            let db_summary = format!(
                "{}: Create Delphix{} Database for {} environment",
                env, siebel, release_name
            );
            let db_task = rt
                .tickets
                .create_ticket(&TicketFields {
                    project: settings.db_project.clone(),
                    issue_type: "Task".to_string(),
                    summary: db_summary.clone(),
                    description: db_summary,
                    assignee: Some(ctx.user.clone()),
                    environment: Some(env.clone()),
                    release: Some(release_name),
                    components: settings.db_components.clone(),
                })
                .await
                .map_err(PipelineError::TicketCreation)?;
            info!("Database task {}", db_task);

            if let Err(e) = rt
                .tickets
                .link(&provisioning, &db_task, &settings.link_relation)
                .await
            {
                warn!("Could not link {} to {}: {}", provisioning, db_task, e);
            }
            ctx.tickets.db_task = Some(db_task).into();
        }

        if let Some(request) = ctx.tickets.env_request.resolved() {
            info!("Linking {} to env request {}", provisioning, request);
            if let Err(e) = rt
                .tickets
                .link(request, &provisioning, &settings.link_relation)
                .await
            {
                warn!("Could not link {} to {}: {}", request, provisioning, e);
            }
            match rt.tickets.transition(request, "Provisioning").await {
                Ok(()) => info!("Env request {} set to Provisioning", request),
                Err(e) => warn!("Env request {} cannot be set to Provisioning: {}", request, e),
            }
        }

        Ok(())
    }

    async fn resume(
        ctx: &mut PipelineContext,
        rt: &StageRuntime,
        restart: TicketId,
    ) -> Result<(), PipelineError> {
        let key = Regex::new(r"^[A-Z][A-Z0-9]*-[0-9]+$")
            .map(|re| re.is_match(restart.as_str()))
            .unwrap_or(false);
        if !key {
            return Err(PipelineError::InvalidResume(restart.to_string()));
        }

        let settings = &rt.config.tickets;
        if restart.project() == settings.provisioning_project {
            ctx.tickets.provisioning = Some(restart.clone()).into();
        } else if !ctx.tickets.env_request.is_resolved() {
            ctx.tickets.env_request = Some(restart.clone()).into();
        }

        if !ctx.tickets.provisioning.is_resolved() {
            if let Some(request) = ctx.tickets.env_request.resolved().cloned() {
                ctx.tickets.provisioning =
                    find_linked(rt, &request, &settings.provisioning_project).await.into();
            }
        }
        if let Some(provisioning) = ctx.tickets.provisioning.resolved().cloned() {
            ctx.tickets.db_task = find_linked(rt, &provisioning, &settings.db_project).await.into();
        }

        if ctx.tickets.primary().is_none() {
            return Err(PipelineError::InvalidResume(restart.to_string()));
        }

        info!(
            "Restarting from {} (provisioning: {:?}, db task: {:?}, env request: {:?})",
            restart,
            ctx.tickets.provisioning.resolved().map(TicketId::as_str),
            ctx.tickets.db_task.resolved().map(TicketId::as_str),
            ctx.tickets.env_request.resolved().map(TicketId::as_str),
        );
        Ok(())
    }
}

/// First ticket linked to `id` in `project`; lookup failures leave it unresolved
async fn find_linked(rt: &StageRuntime, id: &TicketId, project: &str) -> Option<TicketId> {
    match rt.tickets.linked(id).await {
        Ok(links) => links
            .into_iter()
            .map(|link| link.id)
            .find(|linked| linked.project() == project),
        Err(e) => {
            warn!("Could not read links of {}: {}", id, e);
            None
        }
    }
}

#[async_trait]
impl Stage for TicketStage {
    fn name(&self) -> &str {
        "tickets"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        match ctx.resume_from.clone() {
            Some(restart) => Self::resume(ctx, rt, restart).await?,
            None => Self::create(ctx, rt).await?,
        }
        Ok(StageOutcome::Advance)
    }
}

/// 400: start re-imaging on its own channel
pub struct ReimageStage;

#[async_trait]
impl Stage for ReimageStage {
    fn name(&self) -> &str {
        "reimage"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        if ctx.flags.skip_reimage {
            return Ok(StageOutcome::skipped("--skipreimage set"));
        }
        if !ctx.tickets.provisioning.is_resolved() {
            return Ok(StageOutcome::skipped("no provisioning ticket resolved"));
        }

        let commands = &rt.config.commands;
        let operation = ReimageOperation {
            command: render_command(&commands.reimage, ctx, &[]),
            timeout: ctx.timeouts.reimage,
            cooldown: rt.timing.reimage_cooldown,
            verify_command: render_command(&commands.verify_reimage, ctx, &[]),
            verify_timeout: ctx.timeouts.verify,
        };

        info!("Re-imaging {}", ctx.environment);
        let job = Job::new(
            "reimage",
            Arc::new(operation),
            ChannelSource::Fresh(rt.connector.clone()),
            rt.executor,
        );
        rt.launch(job).await?;
        Ok(StageOutcome::Advance)
    }
}

/// 410: start database generation on its own channel
pub struct DbGenStage;

impl DbGenStage {
    /// Options appended to the dbgen command
    pub fn options(ctx: &PipelineContext, rt: &StageRuntime) -> String {
        let mut options = Vec::new();
        if !ctx.flags.no_postpatch {
            options.push(format!("--postpatch=\"{}\"", rt.config.commands.dbgen_postpatch));
        }
        if ctx.flags.with_siebel {
            options.push("--withsiebel".to_string());
        }
        options.push(format!(
            "--timeout={}",
            DbGenOperation::tool_timeout(ctx.timeouts.dbgen, rt.timing.dbgen_margin)
        ));
        if rt.executor.diagnostics() {
            options.push("-D".to_string());
        }
        options.join(" ")
    }
}

#[async_trait]
impl Stage for DbGenStage {
    fn name(&self) -> &str {
        "dbgen"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        if ctx.flags.skip_dbgen {
            return Ok(StageOutcome::skipped("--skipdbgen set"));
        }
        if !ctx.tickets.db_task.is_resolved() {
            return Ok(StageOutcome::skipped("no database task resolved"));
        }

        let options = Self::options(ctx, rt);
        let operation = DbGenOperation {
            command: render_command(&rt.config.commands.dbgen, ctx, &[("options", options.as_str())]),
            timeout: ctx.timeouts.dbgen,
        };

        info!("Generating database for {}", ctx.environment);
        let job = Job::new(
            "dbgen",
            Arc::new(operation),
            ChannelSource::Fresh(rt.connector.clone()),
            rt.executor,
        );
        rt.launch(job).await?;
        Ok(StageOutcome::Advance)
    }
}
