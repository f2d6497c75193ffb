#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use dfsession::{error::KernelError, ExecutorConfig, Interpreter, KernelMessage};
use serde_json::Value;

/// What the scripted interpreter does on one `receive_next` call.
#[derive(Debug, Clone)]
pub enum Event {
    Msg(KernelMessage),
    /// Nothing arrives within the poll interval.
    Silence,
    /// The process dies.
    Die,
}

#[derive(Default)]
struct Shared {
    alive: bool,
    stops: usize,
    submissions: Vec<String>,
    scripts: VecDeque<Vec<Event>>,
    current: VecDeque<Event>,
}

/// In-memory interpreter that replays one scripted message sequence per
/// submission. Clones share state so tests can inspect it after handing the
/// interpreter to an executor.
#[derive(Clone)]
pub struct ScriptedInterpreter {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedInterpreter {
    pub fn new() -> Self {
        let shared = Shared { alive: true, ..Shared::default() };
        Self { shared: Arc::new(Mutex::new(shared)) }
    }

    /// Queues the events answering the next unscripted submission.
    pub fn script(&self, events: Vec<Event>) {
        self.shared.lock().unwrap().scripts.push_back(events);
    }

    pub fn submissions(&self) -> Vec<String> {
        self.shared.lock().unwrap().submissions.clone()
    }

    pub fn stops(&self) -> usize {
        self.shared.lock().unwrap().stops
    }

    pub fn running(&self) -> bool {
        self.shared.lock().unwrap().alive
    }

    /// Events of the current submission not consumed yet.
    pub fn pending(&self) -> usize {
        self.shared.lock().unwrap().current.len()
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn submit(&mut self, code: &str) -> Result<String, KernelError> {
        let mut shared = self.shared.lock().unwrap();
        shared.submissions.push(code.to_string());
        let events = shared.scripts.pop_front().unwrap_or_else(|| reply(None));
        shared.current = events.into();
        Ok(format!("exec-{}", shared.submissions.len()))
    }

    async fn receive_next(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<KernelMessage>, KernelError> {
        let event = self.shared.lock().unwrap().current.pop_front();
        match event {
            Some(Event::Msg(m)) => Ok(Some(m)),
            Some(Event::Die) => {
                self.shared.lock().unwrap().alive = false;
                Ok(None)
            }
            Some(Event::Silence) | None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
        }
    }

    async fn is_alive(&mut self) -> bool {
        self.shared.lock().unwrap().alive
    }

    async fn stop(&mut self) -> Result<(), KernelError> {
        let mut shared = self.shared.lock().unwrap();
        shared.stops += 1;
        shared.alive = false;
        Ok(())
    }
}

pub fn msg(m: KernelMessage) -> Event {
    Event::Msg(m)
}

/// busy, optional stdout text, idle.
pub fn reply(text: Option<&str>) -> Vec<Event> {
    let mut events = vec![msg(KernelMessage::status("busy"))];
    if let Some(t) = text {
        events.push(msg(KernelMessage::stream(t)));
    }
    events.push(msg(KernelMessage::status("idle")));
    events
}

pub fn error_reply(ename: &str, evalue: &str) -> Vec<Event> {
    let last = format!("{ename}: {evalue}");
    vec![
        msg(KernelMessage::status("busy")),
        msg(KernelMessage::error(ename, evalue, &["Traceback (most recent call last):", last.as_str()])),
        msg(KernelMessage::status("idle")),
    ]
}

pub fn data(value: Value) -> Event {
    msg(KernelMessage::execute_result(value))
}

pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        poll_interval: Duration::from_millis(10),
        call_timeout: Some(Duration::from_secs(5)),
        startup_code: None,
    }
}
