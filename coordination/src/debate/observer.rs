//! Observer callbacks for persisting a run as it happens.
//!
//! Observers are fire-and-forget: failures are logged and never reach the
//! debate.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use super::state::{DebateMessage, DebateRound, PhaseResult};

/// Receives debate events in order.
pub trait DebateObserver: Send + Sync {
    fn on_message(&self, _message: &DebateMessage) {}

    fn on_round_complete(&self, _round: &DebateRound) {}

    fn on_phase_complete(&self, _result: &PhaseResult) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DebateObserver for NoopObserver {}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    messages: Mutex<Vec<DebateMessage>>,
    rounds: Mutex<Vec<DebateRound>>,
    phases: Mutex<Vec<PhaseResult>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<DebateMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn rounds(&self) -> Vec<DebateRound> {
        self.rounds.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn phases(&self) -> Vec<PhaseResult> {
        self.phases.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl DebateObserver for CollectingObserver {
    fn on_message(&self, message: &DebateMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
    }

    fn on_round_complete(&self, round: &DebateRound) {
        if let Ok(mut rounds) = self.rounds.lock() {
            rounds.push(round.clone());
        }
    }

    fn on_phase_complete(&self, result: &PhaseResult) {
        if let Ok(mut phases) = self.phases.lock() {
            phases.push(result.clone());
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum TranscriptEvent<'a> {
    Message(&'a DebateMessage),
    RoundComplete(&'a DebateRound),
    PhaseComplete(&'a PhaseResult),
}

/// Appends one JSON object per event to a file.
#[derive(Debug)]
pub struct JsonlObserver {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlObserver {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_event(&self, event: &TranscriptEvent<'_>) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to serialize transcript event");
                return;
            }
        };
        let Ok(mut writer) = self.writer.lock() else {
            warn!(path = %self.path.display(), "Transcript writer lock poisoned");
            return;
        };
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            warn!(path = %self.path.display(), error = %e, "Failed to write transcript event");
        }
    }
}

impl DebateObserver for JsonlObserver {
    fn on_message(&self, message: &DebateMessage) {
        self.write_event(&TranscriptEvent::Message(message));
    }

    fn on_round_complete(&self, round: &DebateRound) {
        self.write_event(&TranscriptEvent::RoundComplete(round));
    }

    fn on_phase_complete(&self, result: &PhaseResult) {
        self.write_event(&TranscriptEvent::PhaseComplete(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::state::{DebatePhase, MessageType, RoundBuilder};

    fn message() -> DebateMessage {
        DebateMessage::new(
            DebatePhase::Divergence,
            1,
            "hacker",
            "The Hacker",
            MessageType::Idea,
            "Title: Something",
        )
    }

    #[test]
    fn test_collecting_observer() {
        let observer = CollectingObserver::new();
        observer.on_message(&message());
        observer.on_round_complete(&RoundBuilder::new(1, DebatePhase::Divergence, "t").finish());
        assert_eq!(observer.messages().len(), 1);
        assert_eq!(observer.rounds().len(), 1);
        assert!(observer.phases().is_empty());
    }

    #[test]
    fn test_jsonl_observer_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        {
            let observer = JsonlObserver::open(&path).unwrap();
            observer.on_message(&message());
            observer.on_round_complete(&RoundBuilder::new(1, DebatePhase::Divergence, "t").finish());
        }
        {
            let observer = JsonlObserver::open(&path).unwrap();
            observer.on_message(&message());
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "message");
        assert_eq!(first["agent_id"], "hacker");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["event"], "round_complete");
    }

    #[test]
    fn test_noop_observer() {
        NoopObserver.on_message(&message());
    }
}
