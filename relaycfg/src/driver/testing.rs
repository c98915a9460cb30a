//! Scripted in-memory jump host for tests.
//!
//! A [`ScriptedShell`] replays queued output and reacts to sent lines with
//! canned replies; [`ScriptedConnection`] and [`ScriptedConnector`] wrap it
//! (plus scripted exec results) behind the transport traits. Everything
//! sent is recorded in a shared [`ScriptLog`].

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::ShellIo;
use crate::error::{Result, TransportError};
use crate::transport::{Connector, ExecOutput, RelayConnection, SshConfig};

/// One chunk of output, delivered after `delay`.
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub data: Vec<u8>,
}

impl Reply {
    pub fn now(text: &str) -> Self {
        Self::after(Duration::ZERO, text)
    }

    pub fn after(delay: Duration, text: &str) -> Self {
        Self {
            delay,
            data: text.as_bytes().to_vec(),
        }
    }
}

/// What a test can inspect after the session consumed the doubles.
#[derive(Debug, Clone, Default)]
pub struct ScriptLog {
    sent: Arc<Mutex<Vec<String>>>,
    execs: Arc<Mutex<Vec<String>>>,
    shell_closed: Arc<AtomicBool>,
    connection_closed: Arc<AtomicBool>,
}

impl ScriptLog {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn execs(&self) -> Vec<String> {
        self.execs.lock().unwrap().clone()
    }

    pub fn shell_closed(&self) -> bool {
        self.shell_closed.load(Ordering::SeqCst)
    }

    pub fn connection_closed(&self) -> bool {
        self.connection_closed.load(Ordering::SeqCst)
    }
}

struct Rule {
    trigger: String,
    echo: bool,
    replies: Vec<Reply>,
    used: bool,
}

pub struct ScriptedShell {
    pending: VecDeque<Reply>,
    rules: Vec<Rule>,
    stream: Option<(Vec<u8>, Duration)>,
    stay_open: bool,
    log: ScriptLog,
}

impl ScriptedShell {
    /// Shell that emits `initial` and then reports the channel closed.
    pub fn new(initial: Vec<Reply>) -> Self {
        Self {
            pending: initial.into(),
            rules: Vec::new(),
            stream: None,
            stay_open: false,
            log: ScriptLog::default(),
        }
    }

    /// Shell that emits `chunk` every `interval`, forever, without a prompt.
    pub fn streaming(chunk: &str, interval: Duration) -> Self {
        let mut shell = Self::new(vec![]);
        shell.stream = Some((chunk.as_bytes().to_vec(), interval));
        shell
    }

    /// Wait forever instead of closing once the queue is drained.
    pub fn stay_open(mut self) -> Self {
        self.stay_open = true;
        self
    }

    /// Reply to the first sent line containing `trigger` (echoed first).
    pub fn on(mut self, trigger: &str, replies: Vec<Reply>) -> Self {
        self.rules.push(Rule {
            trigger: trigger.to_string(),
            echo: true,
            replies,
            used: false,
        });
        self
    }

    /// Like [`on`](Self::on) but without echo, as for a password.
    pub fn on_hidden(mut self, trigger: &str, replies: Vec<Reply>) -> Self {
        self.rules.push(Rule {
            trigger: trigger.to_string(),
            echo: false,
            replies,
            used: false,
        });
        self
    }

    pub fn with_log(mut self, log: &ScriptLog) -> Self {
        self.log = log.clone();
        self
    }
}

impl ShellIo for ScriptedShell {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(data);
        for line in text.split('\n').filter(|l| !l.is_empty()) {
            let line = line.trim_end_matches('\r').to_string();
            self.log.sent.lock().unwrap().push(line.clone());

            let rule = self
                .rules
                .iter_mut()
                .find(|r| !r.used && line.contains(&r.trigger));
            match rule {
                Some(rule) => {
                    rule.used = true;
                    if rule.echo {
                        self.pending.push_back(Reply::now(&format!("{line}\r\n")));
                    }
                    self.pending.extend(rule.replies.iter().cloned());
                }
                None => self.pending.push_back(Reply::now(&format!("{line}\r\n"))),
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(reply) = self.pending.pop_front() {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            return Ok(Some(reply.data));
        }
        if let Some((chunk, interval)) = &self.stream {
            tokio::time::sleep(*interval).await;
            return Ok(Some(chunk.clone()));
        }
        if self.stay_open {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.log.shell_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ScriptedConnection {
    shell: Option<ScriptedShell>,
    exec_results: VecDeque<ExecOutput>,
    log: ScriptLog,
}

impl ScriptedConnection {
    pub fn with_shell(shell: ScriptedShell, log: &ScriptLog) -> Self {
        Self {
            shell: Some(shell.with_log(log)),
            exec_results: VecDeque::new(),
            log: log.clone(),
        }
    }

    pub fn with_exec(results: Vec<ExecOutput>, log: &ScriptLog) -> Self {
        Self {
            shell: None,
            exec_results: results.into(),
            log: log.clone(),
        }
    }
}

impl RelayConnection for ScriptedConnection {
    type Shell = ScriptedShell;

    async fn open_shell(&mut self) -> Result<ScriptedShell> {
        self.shell
            .take()
            .ok_or_else(|| crate::error::ChannelError::ShellRequestFailed.into())
    }

    async fn exec(&mut self, command: &str, _timeout: Duration) -> Result<ExecOutput> {
        self.log.execs.lock().unwrap().push(command.to_string());
        Ok(self.exec_results.pop_front().unwrap_or(ExecOutput {
            stdout: String::new(),
            stderr: "no scripted output left".into(),
            exit_status: Some(255),
        }))
    }

    async fn close(self) -> Result<()> {
        self.log.connection_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out scripted connections in order; fails once they run out.
#[derive(Default)]
pub struct ScriptedConnector {
    connections: Mutex<VecDeque<ScriptedConnection>>,
    refuse: bool,
}

impl ScriptedConnector {
    pub fn new(connections: Vec<ScriptedConnection>) -> Self {
        Self {
            connections: Mutex::new(connections.into()),
            refuse: false,
        }
    }

    /// Connector whose jump host refuses TCP connections.
    pub fn refusing() -> Self {
        Self {
            connections: Mutex::default(),
            refuse: true,
        }
    }
}

impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(&self, config: &SshConfig) -> Result<ScriptedConnection> {
        if self.refuse {
            return Err(TransportError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            }
            .into());
        }
        self.connections
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Disconnected.into())
    }
}
