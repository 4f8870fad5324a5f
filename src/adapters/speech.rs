//! Spoken announcements through the platform speech command.
//!
//! [`SpeechSink`] formats each event and hands it to a background task that
//! runs `say -v <voice> -r <rate> <text>`. A new announcement interrupts the
//! one still playing.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::domain::event::preview;
use crate::domain::CanonicalEvent;

use super::sink::EventSink;

/// Longest message body spoken before truncation
pub const MAX_SPOKEN_CHARS: usize = 200;

/// Speech output settings (`tts` section of the config file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// Voice name (`say -v '?'` lists them)
    pub voice: String,
    /// Words per minute
    pub rate: u32,
    /// Speech command to run
    pub command: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: "Samantha".to_string(),
            rate: 200,
            command: "say".to_string(),
        }
    }
}

impl SpeechConfig {
    /// Arguments passed to the speech command for `text`
    pub fn args(&self, text: &str) -> Vec<String> {
        vec![
            "-v".to_string(),
            self.voice.clone(),
            "-r".to_string(),
            self.rate.to_string(),
            text.to_string(),
        ]
    }
}

/// Sentence spoken for a message
pub fn speech_text(sender: &str, message: &str) -> String {
    sanitize(&format!("Message from {}: {}", sender, preview(message, MAX_SPOKEN_CHARS)))
}

/// Flatten control whitespace and collapse runs of spaces
fn sanitize(text: &str) -> String {
    text.split(|c: char| matches!(c, ' ' | '\n' | '\r' | '\t'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Speaks every accepted event
pub struct SpeechSink {
    tx: mpsc::UnboundedSender<String>,
}

impl SpeechSink {
    /// Spawn the speaker task. Must be called inside a tokio runtime.
    pub fn spawn(config: SpeechConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_speaker(config, rx));
        Self { tx }
    }
}

impl EventSink for SpeechSink {
    fn on_event(&self, event: &CanonicalEvent) {
        let text = speech_text(event.sender(), event.message());
        if self.tx.send(text).is_err() {
            debug!("Speaker task has exited, dropping announcement");
        }
    }
}

async fn run_speaker(config: SpeechConfig, mut rx: mpsc::UnboundedReceiver<String>) {
    let mut current: Option<Child> = None;

    while let Some(text) = rx.recv().await {
        if let Some(child) = current.take() {
            interrupt(child).await;
        }

        let spawned = Command::new(&config.command)
            .args(config.args(&text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                debug!("Speaking: {}", preview(&text, 50));
                current = Some(child);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("'{}' command not found - speech unavailable", config.command);
            }
            Err(e) => error!("Speech error: {}", e),
        }
    }

    if let Some(child) = current {
        interrupt(child).await;
    }
}

/// Stop an utterance that is still playing
async fn interrupt(mut child: Child) {
    if let Ok(None) = child.try_wait() {
        if let Err(e) = child.kill().await {
            debug!("Failed to stop speech process: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventMetadata, EventSource};
    use std::time::Duration;

    #[test]
    fn test_speech_text() {
        assert_eq!(speech_text("Alice", "hi"), "Message from Alice: hi");
        assert_eq!(
            speech_text("Bob", "line one\nline\ttwo\r\n  three  "),
            "Message from Bob: line one line two three"
        );

        let long = "a".repeat(250);
        let text = speech_text("Carol", &long);
        assert!(text.ends_with(&format!("{}...", "a".repeat(MAX_SPOKEN_CHARS))));
    }

    #[test]
    fn test_default_command_line() {
        let config = SpeechConfig::default();
        assert!(config.enabled);
        assert_eq!(
            config.args("hello"),
            vec!["-v", "Samantha", "-r", "200", "hello"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sink_runs_speech_command() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::Builder::new().prefix("slackpulse").tempdir().unwrap();
        let out = dir.path().join("spoken.txt");
        let script = dir.path().join("fake-say");
        std::fs::write(
            &script,
            format!("#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\n", out.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let sink = SpeechSink::spawn(SpeechConfig {
            voice: "Alex".to_string(),
            rate: 180,
            command: script.display().to_string(),
            ..SpeechConfig::default()
        });
        let event = CanonicalEvent::new("Alice", "lunch?", EventMetadata::new(EventSource::Database)).unwrap();
        sink.on_event(&event);

        let mut spoken = String::new();
        for _ in 0..100 {
            spoken = std::fs::read_to_string(&out).unwrap_or_default();
            if !spoken.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(spoken.trim(), "-v Alex -r 180 Message from Alice: lunch?");
    }

    #[tokio::test]
    async fn test_missing_command_is_not_fatal() {
        let sink = SpeechSink::spawn(SpeechConfig {
            command: "slackpulse-no-such-speech-command".to_string(),
            ..SpeechConfig::default()
        });
        let event = CanonicalEvent::new("Alice", "hi", EventMetadata::new(EventSource::Database)).unwrap();

        sink.on_event(&event);
        tokio::time::sleep(Duration::from_millis(50)).await;
        sink.on_event(&event);
        assert!(!sink.tx.is_closed());
    }
}
