//! In-memory test doubles for hosts and probes.
//!
//! [`RecordingConnector`] hands out hosts that never spawn processes: every
//! command and upload is appended to a shared journal, and scripted rules
//! decide what a command prints or whether it fails.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::adapters::{Connector, Host, Prober};
use crate::domain::HostCommand;
use crate::error::{FleetError, Result};

/// One recorded host interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub host: String,
    pub cwd: Option<String>,
    /// Command line, or `put <file> <dir>` for uploads
    pub line: String,
}

#[derive(Debug, Clone)]
enum Reply {
    Output(String),
    Fail(i32),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    reply: Reply,
}

#[derive(Default)]
struct Shared {
    journal: Mutex<Vec<Entry>>,
    rules: Mutex<Vec<Rule>>,
    connections: Mutex<Vec<String>>,
}

/// Connector producing recording hosts
#[derive(Clone, Default)]
pub struct RecordingConnector {
    shared: Arc<Shared>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` print `output`
    pub fn respond(self, pattern: &str, output: &str) -> Self {
        self.push_rule(pattern, Reply::Output(output.to_string()))
    }

    /// Commands containing `pattern` exit with `exit_code`
    pub fn fail(self, pattern: &str, exit_code: i32) -> Self {
        self.push_rule(pattern, Reply::Fail(exit_code))
    }

    fn push_rule(self, pattern: &str, reply: Reply) -> Self {
        if let Ok(mut rules) = self.shared.rules.lock() {
            rules.push(Rule {
                pattern: pattern.to_string(),
                reply,
            });
        }
        self
    }

    /// Everything recorded so far, in order
    pub fn journal(&self) -> Vec<Entry> {
        self.shared
            .journal
            .lock()
            .map(|j| j.clone())
            .unwrap_or_default()
    }

    /// Only the command lines
    pub fn lines(&self) -> Vec<String> {
        self.journal().into_iter().map(|e| e.line).collect()
    }

    /// Remote connections opened, as `<destination> shell=<bool>`
    pub fn connections(&self) -> Vec<String> {
        self.shared
            .connections
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn host(&self, name: String) -> RecordingHost {
        RecordingHost {
            name,
            cwd: None,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Connector for RecordingConnector {
    fn local(&self) -> Box<dyn Host> {
        Box::new(self.host("localhost".to_string()))
    }

    fn remote(&self, address: &str, user: Option<&str>, shell: bool) -> Result<Box<dyn Host>> {
        let name = match user {
            Some(user) => format!("{}@{}", user, address),
            None => address.to_string(),
        };
        if let Ok(mut connections) = self.shared.connections.lock() {
            connections.push(format!("{} shell={}", name, shell));
        }
        Ok(Box::new(self.host(name)))
    }
}

/// Host recording into its connector's journal
pub struct RecordingHost {
    name: String,
    cwd: Option<String>,
    shared: Arc<Shared>,
}

impl RecordingHost {
    fn record(&self, cwd: Option<&str>, line: String) {
        if let Ok(mut journal) = self.shared.journal.lock() {
            journal.push(Entry {
                host: self.name.clone(),
                cwd: cwd.map(str::to_string),
                line,
            });
        }
    }
}

#[async_trait]
impl Host for RecordingHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, command: &HostCommand, cwd: Option<&str>, _quiet: bool) -> Result<String> {
        let line = command.to_string();
        self.record(cwd.or(self.cwd.as_deref()), line.clone());

        let reply = self
            .shared
            .rules
            .lock()
            .ok()
            .and_then(|rules| {
                rules
                    .iter()
                    .find(|r| line.contains(&r.pattern))
                    .map(|r| r.reply.clone())
            });

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Fail(exit_code)) => Err(FleetError::CommandFailed {
                command: line,
                exit_code,
                stderr: "scripted failure".to_string(),
            }),
            None => Ok(String::new()),
        }
    }

    async fn put(&self, local_path: &Path, remote_dir: &str) -> Result<()> {
        self.record(None, format!("put {} {}", local_path.display(), remote_dir));
        Ok(())
    }

    fn chdir(&mut self, path: &str) -> &mut dyn Host {
        self.cwd = Some(path.to_string());
        self
    }
}

/// Prober answering from a list of unreachable URIs
#[derive(Default)]
pub struct ScriptedProber {
    down: Vec<String>,
    probed: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn with_down(down: &[&str]) -> Self {
        Self {
            down: down.iter().map(|s| s.to_string()).collect(),
            probed: Mutex::new(Vec::new()),
        }
    }

    /// URIs probed so far, in order
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, uri: &str) -> Result<()> {
        if let Ok(mut probed) = self.probed.lock() {
            probed.push(uri.to_string());
        }
        if self.down.iter().any(|d| d == uri) {
            return Err(FleetError::ProbeUnreachable {
                uri: uri.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}
