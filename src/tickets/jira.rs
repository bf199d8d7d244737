//! JIRA REST v2 client

use crate::core::config::TicketsConfig;
use crate::credentials::Credentials;
use crate::tickets::{LinkedTicket, TicketError, TicketFields, TicketId, TicketSystem};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::debug;

/// Ticket system backed by a JIRA server
pub struct JiraTicketSystem {
    client: Client,
    base_url: String,
    credentials: Credentials,
    environment_field: String,
    release_field: String,
}

impl JiraTicketSystem {
    pub fn new(config: &TicketsConfig, credentials: Credentials) -> Result<Self, TicketError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(http_error)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            environment_field: config.environment_field.clone(),
            release_field: config.release_field.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/rest/api/2/{}", self.base_url, endpoint)
    }

    async fn get(&self, endpoint: &str) -> Result<Value, TicketError> {
        let response = self
            .client
            .get(self.url(endpoint))
            .basic_auth(&self.credentials.user, Some(self.credentials.password()))
            .send()
            .await
            .map_err(http_error)?;
        parse_json_response(response).await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, TicketError> {
        debug!("POST {}: {}", endpoint, body);
        let response = self
            .client
            .post(self.url(endpoint))
            .basic_auth(&self.credentials.user, Some(self.credentials.password()))
            .json(body)
            .send()
            .await
            .map_err(http_error)?;
        parse_json_response(response).await
    }

    /// Request body for issue creation
    fn issue_body(&self, fields: &TicketFields) -> Value {
        let mut body = json!({
            "project": { "key": fields.project },
            "issuetype": { "name": fields.issue_type },
            "summary": fields.summary,
            "description": fields.description,
        });

        if let Some(assignee) = &fields.assignee {
            body["assignee"] = json!({ "name": assignee });
        }
        if let Some(environment) = &fields.environment {
            body[self.environment_field.as_str()] = json!({ "value": environment });
        }
        if let Some(release) = &fields.release {
            body[self.release_field.as_str()] = json!({ "value": release });
        }
        if !fields.components.is_empty() {
            body["components"] = fields
                .components
                .iter()
                .map(|name| json!({ "name": name }))
                .collect();
        }

        json!({ "fields": body })
    }
}

#[async_trait]
impl TicketSystem for JiraTicketSystem {
    async fn create_ticket(&self, fields: &TicketFields) -> Result<TicketId, TicketError> {
        let created = self.post("issue", &self.issue_body(fields)).await?;
        created
            .get("key")
            .and_then(Value::as_str)
            .map(TicketId::new)
            .ok_or_else(|| TicketError::Response(format!("no key in {}", created)))
    }

    async fn link(
        &self,
        inward: &TicketId,
        outward: &TicketId,
        relation: &str,
    ) -> Result<(), TicketError> {
        let body = json!({
            "type": { "name": relation },
            "inwardIssue": { "key": inward.as_str() },
            "outwardIssue": { "key": outward.as_str() },
        });
        self.post("issueLink", &body).await?;
        Ok(())
    }

    async fn transition(&self, id: &TicketId, target: &str) -> Result<(), TicketError> {
        let endpoint = format!("issue/{}/transitions", id);
        let available = self.get(&endpoint).await?;
        let transition_id =
            pick_transition(&available, target).ok_or_else(|| TicketError::NoTransition {
                id: id.to_string(),
                target: target.to_string(),
            })?;

        let body = json!({ "transition": { "id": transition_id } });
        self.post(&endpoint, &body).await?;
        Ok(())
    }

    async fn add_comment(&self, id: &TicketId, text: &str) -> Result<(), TicketError> {
        let body = json!({ "body": text });
        self.post(&format!("issue/{}/comment", id), &body).await?;
        Ok(())
    }

    async fn linked(&self, id: &TicketId) -> Result<Vec<LinkedTicket>, TicketError> {
        let issue = self.get(&format!("issue/{}?fields=issuelinks", id)).await?;
        Ok(parse_links(&issue))
    }
}

/// Id of the first transition whose name contains `target`
fn pick_transition(available: &Value, target: &str) -> Option<String> {
    available
        .get("transitions")?
        .as_array()?
        .iter()
        .find(|t| {
            t.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| name.contains(target))
        })
        .and_then(|t| t.get("id"))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Linked issue keys from an issue's `issuelinks` field
fn parse_links(issue: &Value) -> Vec<LinkedTicket> {
    let Some(links) = issue
        .get("fields")
        .and_then(|f| f.get("issuelinks"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    links
        .iter()
        .filter_map(|link| {
            let relation = link
                .get("type")
                .and_then(|t| t.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let other = link
                .get("inwardIssue")
                .or_else(|| link.get("outwardIssue"))?
                .get("key")?
                .as_str()?;
            Some(LinkedTicket {
                id: TicketId::new(other),
                relation,
            })
        })
        .collect()
}

fn http_error(e: reqwest::Error) -> TicketError {
    TicketError::Request(e.to_string())
}

async fn parse_json_response(response: Response) -> Result<Value, TicketError> {
    let status = response.status();
    let body = response.text().await.map_err(http_error)?;

    if !status.is_success() {
        if status.as_u16() == 404 {
            return Err(TicketError::NotFound(body));
        }
        return Err(TicketError::Api {
            status: status.as_u16(),
            body,
        });
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| TicketError::Response(e.to_string()))
}
