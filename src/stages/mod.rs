//! The canonical stage catalog
//!
//! Sequence numbers leave gaps so new stages can be slotted in between.

pub mod closeout;
pub mod deploy;
pub mod provision;
pub mod validate;

use crate::core::config::render_template;
use crate::core::{PipelineContext, Stage, StageOutcome};
use crate::error::PipelineError;
use crate::execution::StageRuntime;
use async_trait::async_trait;

pub use closeout::{BigIpStage, CloseoutStage, ContentToolStage};
pub use deploy::{DeployStage, PrepatchStage};
pub use provision::{DbGenStage, LoginStage, ReimageStage, TicketStage};
pub use validate::ValidateStage;

/// A numbered slot with no behavior yet
pub struct ReservedStage {
    name: &'static str,
}

impl ReservedStage {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Stage for ReservedStage {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(
        &self,
        _ctx: &mut PipelineContext,
        _rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        Ok(StageOutcome::skipped("reserved"))
    }
}

/// All stages of a provisioning run, in registration order
pub fn catalog() -> Vec<(u32, Box<dyn Stage>)> {
    vec![
        (100, Box::new(LoginStage) as Box<dyn Stage>),
        (200, Box::new(TicketStage)),
        (300, Box::new(ReservedStage::new("prevalidate"))),
        (400, Box::new(ReimageStage)),
        (410, Box::new(DbGenStage)),
        (500, Box::new(ValidateStage)),
        (600, Box::new(PrepatchStage)),
        (700, Box::new(DeployStage)),
        (800, Box::new(ContentToolStage)),
        (810, Box::new(ReservedStage::new("network-deploy"))),
        (900, Box::new(BigIpStage)),
        (950, Box::new(ReservedStage::new("smoke-test"))),
        (1000, Box::new(CloseoutStage)),
    ]
}

/// Render a command template with the run's standard variables
///
/// Available everywhere: `env`, `ENV`, `envnum`, `user`, `release` and
/// `release_name`. `extra` adds or overrides.
pub(crate) fn render_command(
    template: &str,
    ctx: &PipelineContext,
    extra: &[(&str, &str)],
) -> String {
    let upper = ctx.environment.upper();
    let mut variables = vec![
        ("env", ctx.environment.lower()),
        ("ENV", upper.as_str()),
        ("envnum", ctx.environment.number()),
        ("user", ctx.user.as_str()),
        ("release", ctx.release.as_str()),
        ("release_name", ctx.release_label()),
    ];
    variables.extend_from_slice(extra);
    render_template(template, &variables).trim().to_string()
}
