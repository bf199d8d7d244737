//! Ticket system collaborator
//!
//! Provisioning bookkeeping: the pipeline creates, links, transitions and
//! comments on issues through [`TicketSystem`]. Failures are surfaced as
//! [`TicketError`] and most stages only log them.

pub mod jira;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use jira::JiraTicketSystem;

/// Error types for ticket operations
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket request failed: {0}")]
    Request(String),

    #[error("Ticket system returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Ticket {0} not found")]
    NotFound(String),

    #[error("Ticket {id} has no transition matching '{target}'")]
    NoTransition { id: String, target: String },

    #[error("Unexpected ticket system response: {0}")]
    Response(String),
}

/// Issue key such as `PROPROJ-1234`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl TicketId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Project part of the key (`PROPROJ` for `PROPROJ-1234`)
    pub fn project(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fields for a new issue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFields {
    pub project: String,
    pub issue_type: String,
    pub summary: String,
    pub description: String,
    pub assignee: Option<String>,
    /// Environment the issue belongs to, upper case
    pub environment: Option<String>,
    /// Release name the issue is tracked against
    pub release: Option<String>,
    pub components: Vec<String>,
}

/// An issue related to another through a named link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedTicket {
    pub id: TicketId,
    pub relation: String,
}

/// External issue tracker
#[async_trait]
pub trait TicketSystem: Send + Sync {
    async fn create_ticket(&self, fields: &TicketFields) -> Result<TicketId, TicketError>;

    /// Link `inward` to `outward` with the named relation
    async fn link(
        &self,
        inward: &TicketId,
        outward: &TicketId,
        relation: &str,
    ) -> Result<(), TicketError>;

    /// Move the ticket through the first transition whose name contains `target`
    async fn transition(&self, id: &TicketId, target: &str) -> Result<(), TicketError>;

    async fn add_comment(&self, id: &TicketId, text: &str) -> Result<(), TicketError>;

    /// Tickets linked to `id`, in either direction
    async fn linked(&self, id: &TicketId) -> Result<Vec<LinkedTicket>, TicketError>;
}
