//! Test doubles for the transcription and rewriting ports

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::RewriteConfig;
use crate::error::CaptureError;
use crate::rewrite::{RewriteOutcome, RewritingService};
use crate::transcription::{CaptureContext, EngineKind, TranscriptionSession, TranscriptionSink};

/// What a [`MockSession`] has been asked to do, and how it should answer
pub(crate) struct SessionProbe {
    pub running: bool,
    pub starts: Vec<CaptureContext>,
    pub stops: usize,
    pub rebuilds: Vec<bool>,
    pub retries: usize,
    pub sink: Option<TranscriptionSink>,
    pub engine_kind: EngineKind,
    pub can_retry: bool,
    pub retry_ok: bool,
    /// Keep capturing after `stop`, like a chunked engine mid-utterance
    pub keep_running: bool,
    pub last_request_ms: Option<u64>,
    pub audio_ms: Option<u64>,
    pub start_error: Option<CaptureError>,
}

impl Default for SessionProbe {
    fn default() -> Self {
        Self {
            running: false,
            starts: Vec::new(),
            stops: 0,
            rebuilds: Vec::new(),
            retries: 0,
            sink: None,
            engine_kind: EngineKind::File,
            can_retry: false,
            retry_ok: true,
            keep_running: false,
            last_request_ms: None,
            audio_ms: None,
            start_error: None,
        }
    }
}

/// Scripted transcription session; clones share one probe
#[derive(Clone, Default)]
pub(crate) struct MockSession {
    probe: Arc<Mutex<SessionProbe>>,
}

impl MockSession {
    pub fn probe(&self) -> MutexGuard<'_, SessionProbe> {
        self.probe.lock().unwrap()
    }

    /// Sink handed over by the latest start or retry
    pub fn sink(&self) -> TranscriptionSink {
        self.probe().sink.clone().expect("session was never started")
    }
}

impl TranscriptionSession for MockSession {
    fn start(&mut self, context: CaptureContext, events: TranscriptionSink) -> Result<(), CaptureError> {
        let mut probe = self.probe();
        if let Some(err) = probe.start_error.clone() {
            return Err(err);
        }
        probe.starts.push(context);
        probe.sink = Some(events);
        probe.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut probe = self.probe();
        probe.stops += 1;
        if !probe.keep_running {
            probe.running = false;
        }
    }

    fn is_running(&self) -> bool {
        self.probe().running
    }

    fn engine_kind(&self) -> EngineKind {
        self.probe().engine_kind
    }

    fn rebuild_engine(&mut self, postprocess_enabled: bool) {
        self.probe().rebuilds.push(postprocess_enabled);
    }

    fn last_request_duration_ms(&self) -> Option<u64> {
        self.probe().last_request_ms
    }

    fn can_retry_last_file_recognition(&self) -> bool {
        self.probe().can_retry
    }

    fn retry_last_file_recognition(&mut self, events: TranscriptionSink) -> bool {
        let mut probe = self.probe();
        probe.retries += 1;
        if probe.retry_ok {
            probe.sink = Some(events);
        }
        probe.retry_ok
    }

    fn take_last_audio_ms(&mut self) -> Option<u64> {
        self.probe().audio_ms.take()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Text(String),
    Fail,
}

/// Rewriting service with canned replies, optionally held until released
pub(crate) struct MockRewriter {
    process_reply: Mutex<Reply>,
    edit_reply: Mutex<Reply>,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<String>>,
}

impl MockRewriter {
    pub fn new() -> Self {
        Self {
            process_reply: Mutex::new(Reply::Fail),
            edit_reply: Mutex::new(Reply::Fail),
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn processing(self, reply: Reply) -> Self {
        *self.process_reply.lock().unwrap() = reply;
        self
    }

    pub fn editing(self, reply: Reply) -> Self {
        *self.edit_reply.lock().unwrap() = reply;
        self
    }

    /// Hold every call until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl RewritingService for MockRewriter {
    async fn process(&self, text: &str, _config: &RewriteConfig) -> RewriteOutcome {
        self.calls.lock().unwrap().push(format!("process:{}", text));
        self.wait_for_gate().await;
        let reply = self.process_reply.lock().unwrap().clone();
        match reply {
            Reply::Text(out) => RewriteOutcome::success(out),
            Reply::Fail => RewriteOutcome::fallback(text),
        }
    }

    async fn edit(&self, original: &str, instruction: &str, _config: &RewriteConfig) -> RewriteOutcome {
        self.calls
            .lock()
            .unwrap()
            .push(format!("edit:{}:{}", original, instruction));
        self.wait_for_gate().await;
        let reply = self.edit_reply.lock().unwrap().clone();
        match reply {
            Reply::Text(out) => RewriteOutcome::success(out),
            Reply::Fail => RewriteOutcome::fallback(original),
        }
    }
}

/// Rewrite settings that count as configured
pub(crate) fn rewrite_credentials() -> RewriteConfig {
    RewriteConfig {
        endpoint: "https://llm.invalid/v1".into(),
        api_key: "test-key".into(),
        model: "test-model".into(),
        ..RewriteConfig::default()
    }
}
