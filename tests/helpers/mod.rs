//! Test utilities for envomatic pipeline scenarios
//!
//! [`ScriptedHost`] stands in for the registration host: each command line
//! is answered by the first matching rule, optionally after a delay, and
//! every line sent is logged with the time it arrived.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use envomatic::core::{OptionSet, RunOptions, StageState, Timing};
use envomatic::credentials::Credentials;
use envomatic::execution::{CommandExecutor, ExecutionEvent, StagePipeline, StageRuntime};
use envomatic::remote::SessionProfile;
use envomatic::tickets::{LinkedTicket, TicketError, TicketFields, TicketId, TicketSystem};
use envomatic::{
    stages, Channel, ChannelConnector, ChannelError, EomConfig, PipelineContext, PipelineError,
    Stage, Transport,
};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const PASS: &str = "env-validate[4242] results: PASS";
pub const SSH_WARNING: &str = "env-validate[4242] PRIORITY=WARNING srwd05app01: ssh test failed";
pub const PLAIN_WARNING: &str = "env-validate[4242] PRIORITY=WARNING srwd05web01: disk at 91%";
pub const BUILD_JSON: &str =
    r#"{"build_label": "rb_ecomm_13_6-186593.209", "build_tree_iteration": 3, "build_tree_id": "T-11"}"#;
pub const DEPLOY_OK: &str =
    "RABBIT Deployment rb_ecomm_13_6-186593.209 SUCCESSFUL\r\nDeployment logs: /logs/9";

struct Rule {
    pattern: Regex,
    output: Option<String>,
    delay: Duration,
}

/// Scripted registration host shared by every channel a connector opens
#[derive(Clone, Default)]
pub struct ScriptedHost {
    rules: Arc<Mutex<Vec<Rule>>>,
    log: Arc<Mutex<Vec<(DateTime<Utc>, String)>>>,
}

impl ScriptedHost {
    /// Host whose tools all succeed
    pub fn standard() -> Self {
        Self::default()
            .reply("^env-validate", PASS)
            .reply("build-id-info", BUILD_JSON)
            .reply("^eom-rabbit-deploy", DEPLOY_OK)
    }

    /// Answer commands matching `pattern` with `output`
    ///
    /// Rules added later take precedence.
    pub fn reply(self, pattern: &str, output: &str) -> Self {
        self.reply_after(pattern, output, Duration::ZERO)
    }

    /// Answer commands matching `pattern` with `output` after `delay`
    pub fn reply_after(self, pattern: &str, output: &str, delay: Duration) -> Self {
        self.push(Rule {
            pattern: Regex::new(pattern).unwrap(),
            output: Some(output.to_string()),
            delay,
        })
    }

    /// Never answer commands matching `pattern`
    pub fn hang(self, pattern: &str) -> Self {
        self.push(Rule {
            pattern: Regex::new(pattern).unwrap(),
            output: None,
            delay: Duration::ZERO,
        })
    }

    fn push(self, rule: Rule) -> Self {
        self.rules.lock().unwrap().insert(0, rule);
        self
    }

    /// Every command line received, in order
    pub fn commands(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Commands matching `pattern`
    pub fn sent(&self, pattern: &str) -> Vec<String> {
        let re = Regex::new(pattern).unwrap();
        self.commands().into_iter().filter(|c| re.is_match(c)).collect()
    }

    /// When the first command matching `pattern` arrived
    pub fn sent_at(&self, pattern: &str) -> Option<DateTime<Utc>> {
        let re = Regex::new(pattern).unwrap();
        self.log
            .lock()
            .unwrap()
            .iter()
            .find(|(_, line)| re.is_match(line))
            .map(|(at, _)| *at)
    }

    /// Reply chunk for one command line, and when it becomes readable
    fn answer(&self, line: &str) -> Option<(Instant, String)> {
        self.log.lock().unwrap().push((Utc::now(), line.to_string()));
        let rules = self.rules.lock().unwrap();
        match rules.iter().find(|rule| rule.pattern.is_match(line)) {
            Some(Rule {
                output: Some(output),
                delay,
                ..
            }) => Some((Instant::now() + *delay, format!("{}\r\n{}\r\n$ ", line, output))),
            Some(Rule { output: None, .. }) => None,
            None => Some((Instant::now(), format!("{}\r\n$ ", line))),
        }
    }
}

/// Transport over a [`ScriptedHost`]
pub struct ScriptedTransport {
    host: ScriptedHost,
    incoming: VecDeque<(Instant, String)>,
}

impl ScriptedTransport {
    pub fn new(host: ScriptedHost) -> Self {
        Self {
            host,
            incoming: VecDeque::new(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn authenticate(&mut self, _user: &str, _password: &str) -> Result<(), ChannelError> {
        self.incoming
            .push_back((Instant::now(), "Last login: today\r\n$ ".to_string()));
        Ok(())
    }

    fn send(&mut self, data: &str) -> Result<(), ChannelError> {
        if let Some(reply) = self.host.answer(data.trim_end()) {
            self.incoming.push_back(reply);
        }
        Ok(())
    }

    fn read(&mut self, wait: Duration) -> Result<Option<String>, ChannelError> {
        let now = Instant::now();
        match self.incoming.front().map(|(ready_at, _)| *ready_at) {
            Some(ready_at) if ready_at <= now => {
                Ok(self.incoming.pop_front().map(|(_, chunk)| chunk))
            }
            Some(ready_at) => {
                std::thread::sleep(wait.min(ready_at - now));
                Ok(None)
            }
            None => {
                std::thread::sleep(wait);
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Opens logged-in, elevated channels to a [`ScriptedHost`]
pub struct ScriptedConnector {
    host: ScriptedHost,
    pub opened: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(host: ScriptedHost) -> Self {
        Self {
            host,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ChannelConnector for ScriptedConnector {
    fn open(&self) -> Result<Channel, ChannelError> {
        let profile = SessionProfile {
            shell_prompt: r"\$[ ]".to_string(),
            elevation_command: Some("sudo -i -u relmgt".to_string()),
            login_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(1),
        };
        let mut channel = Channel::with_transport(
            "reg.test",
            22,
            Box::new(ScriptedTransport::new(self.host.clone())),
        );
        profile.establish(&mut channel, &Credentials::new("relmgt", "secret"))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(channel)
    }
}

/// In-memory ticket system that records every call
#[derive(Default)]
pub struct RecordingTicketSystem {
    pub created: Mutex<Vec<TicketFields>>,
    pub links: Mutex<Vec<(String, String)>>,
    pub transitions: Mutex<Vec<(String, String)>>,
    pub comments: Mutex<Vec<(String, String)>>,
    linked: HashMap<String, Vec<LinkedTicket>>,
}

impl RecordingTicketSystem {
    /// Pre-existing links, `(from, to)`
    pub fn with_links(links: &[(&str, &str)]) -> Self {
        let mut linked: HashMap<String, Vec<LinkedTicket>> = HashMap::new();
        for (from, to) in links {
            linked.entry(from.to_string()).or_default().push(LinkedTicket {
                id: TicketId::new(*to),
                relation: "Dependency".to_string(),
            });
        }
        Self {
            linked,
            ..Self::default()
        }
    }

    pub fn transitions(&self) -> Vec<(String, String)> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn comments_on(&self, id: &str) -> Vec<String> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .filter(|(ticket, _)| ticket == id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl TicketSystem for RecordingTicketSystem {
    async fn create_ticket(&self, fields: &TicketFields) -> Result<TicketId, TicketError> {
        let mut created = self.created.lock().unwrap();
        created.push(fields.clone());
        Ok(TicketId::new(format!("{}-{}", fields.project, created.len())))
    }

    async fn link(
        &self,
        inward: &TicketId,
        outward: &TicketId,
        _relation: &str,
    ) -> Result<(), TicketError> {
        self.links
            .lock()
            .unwrap()
            .push((inward.to_string(), outward.to_string()));
        Ok(())
    }

    async fn transition(&self, id: &TicketId, target: &str) -> Result<(), TicketError> {
        self.transitions
            .lock()
            .unwrap()
            .push((id.to_string(), target.to_string()));
        Ok(())
    }

    async fn add_comment(&self, id: &TicketId, text: &str) -> Result<(), TicketError> {
        self.comments
            .lock()
            .unwrap()
            .push((id.to_string(), text.to_string()));
        Ok(())
    }

    async fn linked(&self, id: &TicketId) -> Result<Vec<LinkedTicket>, TicketError> {
        Ok(self.linked.get(id.as_str()).cloned().unwrap_or_default())
    }
}

/// srwd05 on rb1306 with a build label, as a profile would hold them
pub fn base_options() -> OptionSet {
    OptionSet {
        env: Some("srwd05".to_string()),
        release: Some("rb1306".to_string()),
        build_label: Some("rb_ecomm_13_6-186593.209".to_string()),
        ..OptionSet::default()
    }
}

/// Command-line `options` merged over [`base_options`]
pub fn run_options(options: OptionSet) -> RunOptions {
    RunOptions::resolve(options, Some(&base_options()), "relmgt").unwrap()
}

/// Everything a scenario may want to inspect after a run
pub struct PipelineTestResult {
    pub ctx: PipelineContext,
    pub result: Result<(), PipelineError>,
    pub events: Vec<ExecutionEvent>,
    pub host: ScriptedHost,
    pub tickets: Arc<RecordingTicketSystem>,
    pub channels_opened: usize,
}

impl PipelineTestResult {
    pub fn exit_code(&self) -> i32 {
        self.result.as_ref().err().map_or(0, PipelineError::exit_code)
    }

    pub fn stage_state(&self, sequence: u32) -> &StageState {
        self.ctx
            .stage_state(sequence)
            .unwrap_or_else(|| panic!("stage {} not recorded", sequence))
    }

    pub fn is_skipped(&self, sequence: u32) -> bool {
        self.stage_state(sequence).is_skipped()
    }

    pub fn is_completed(&self, sequence: u32) -> bool {
        matches!(self.stage_state(sequence), StageState::Completed { .. })
    }

    /// Sequence numbers in the order their stages started
    pub fn started_order(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::StageStarted { sequence, .. } => Some(*sequence),
                _ => None,
            })
            .collect()
    }

    pub fn launched_jobs(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExecutionEvent::JobLaunched { name } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Fixed waits cut to nothing so scenarios finish quickly
pub fn fast_timing() -> Timing {
    Timing {
        reimage_cooldown: Duration::ZERO,
        job_poll_interval: Duration::from_millis(20),
        deploy_wait: Duration::ZERO,
        dbgen_margin: Duration::from_secs(10),
    }
}

/// Run the full stage catalog
pub async fn run_pipeline(
    options: RunOptions,
    host: ScriptedHost,
    tickets: RecordingTicketSystem,
) -> PipelineTestResult {
    run_stages(stages::catalog(), options, host, tickets).await
}

/// Run an arbitrary registration list
pub async fn run_stages(
    registrations: Vec<(u32, Box<dyn Stage>)>,
    options: RunOptions,
    host: ScriptedHost,
    tickets: RecordingTicketSystem,
) -> PipelineTestResult {
    let tickets = Arc::new(tickets);
    let connector = ScriptedConnector::new(host.clone());
    let opened = connector.opened.clone();

    let mut rt = StageRuntime::new(
        EomConfig::default(),
        Arc::new(connector),
        tickets.clone(),
        CommandExecutor::default(),
    )
    .with_timing(fast_timing());

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    rt.events
        .add_handler(move |event| sink.lock().unwrap().push(event));

    let pipeline = StagePipeline::new(registrations).unwrap();
    let mut ctx = PipelineContext::new(options);
    let result = pipeline.execute(&mut ctx, &mut rt).await;

    let events = events.lock().unwrap().clone();
    PipelineTestResult {
        ctx,
        result,
        events,
        host,
        tickets,
        channels_opened: opened.load(Ordering::SeqCst),
    }
}

/// Assert the run finished without a fatal stage
pub fn assert_pipeline_completed(result: &PipelineTestResult) {
    assert!(
        result.result.is_ok(),
        "Pipeline should have completed, but failed: {:?}\ncommands: {:#?}",
        result.result,
        result.host.commands()
    );
}

/// Assert the run stopped with the given exit status
pub fn assert_pipeline_failed(result: &PipelineTestResult, exit_code: i32) {
    assert!(
        result.result.is_err(),
        "Pipeline should have failed, but completed"
    );
    assert_eq!(
        result.exit_code(),
        exit_code,
        "unexpected exit status for {:?}",
        result.result
    );
}
