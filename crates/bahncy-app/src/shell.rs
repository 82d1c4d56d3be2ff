//! Line-oriented command shell standing in for the touch UI.

use std::str::FromStr;

use bahncy_voice::{SimulatedRemote, VoiceSessionController};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::shortcut::VoiceShortcut;
use crate::surface::{Surface, SurfaceKind};

const HELP: &str = "commands: start [agent], tap, end, mute, dismiss, status, turn, shortcut, close, quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start(Option<String>),
    /// Press the full view's primary button.
    Tap,
    End,
    Mute,
    Dismiss,
    Status,
    /// Play one simulated agent turn.
    Turn,
    /// Fire the voice shortcut.
    Shortcut,
    /// Tap outside the modal.
    Close,
    Help,
    Quit,
}

/// Error returned when parsing an unknown shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCommandError(pub String);

impl std::fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown command: {}", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        match verb.as_str() {
            "start" => Ok(Self::Start(words.next().map(str::to_string))),
            "tap" => Ok(Self::Tap),
            "end" | "stop" => Ok(Self::End),
            "mute" => Ok(Self::Mute),
            "dismiss" => Ok(Self::Dismiss),
            "status" => Ok(Self::Status),
            "turn" => Ok(Self::Turn),
            "shortcut" => Ok(Self::Shortcut),
            "close" => Ok(Self::Close),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            _ => Err(ParseCommandError(s.trim().to_string())),
        }
    }
}

pub struct Shell {
    controller: VoiceSessionController,
    remote: SimulatedRemote,
    shortcut: VoiceShortcut,
    full: Surface,
    modal: Option<Surface>,
}

impl Shell {
    pub fn new(
        controller: VoiceSessionController,
        remote: SimulatedRemote,
        shortcut: VoiceShortcut,
    ) -> Self {
        let full = Surface::attach(SurfaceKind::Full, controller.store().clone());
        Self {
            controller,
            remote,
            shortcut,
            full,
            modal: None,
        }
    }

    pub fn has_modal(&self) -> bool {
        self.modal.is_some()
    }

    /// Runs one command and returns the text to show. `None` means quit.
    pub async fn execute(&mut self, command: Command) -> Option<String> {
        let output = match command {
            Command::Start(agent) => {
                let agent = agent.unwrap_or_else(|| self.shortcut.agent_id().to_string());
                self.controller.start(&agent).await;
                self.full.model().primary_label.to_string()
            }
            Command::Tap => {
                self.full
                    .press_primary(&self.controller, self.shortcut.agent_id())
                    .await;
                self.full.model().primary_label.to_string()
            }
            Command::End => {
                self.controller.end().await;
                self.modal = None;
                "ended".to_string()
            }
            Command::Mute => {
                self.controller.toggle_mute().await;
                format!("muted: {}", self.controller.snapshot().is_muted)
            }
            Command::Dismiss => {
                self.controller.dismiss_error().await;
                "error dismissed".to_string()
            }
            Command::Status => self.status_json(),
            Command::Turn => {
                let remote = self.remote.clone();
                tokio::spawn(async move { remote.play_agent_turn().await });
                "agent turn queued".to_string()
            }
            Command::Shortcut => {
                let modal = self.shortcut.invoke(&self.controller).await;
                let label = modal.model().primary_label;
                self.modal = Some(modal);
                format!("modal: {label}")
            }
            Command::Close => match self.modal.as_ref().map(Surface::request_dismiss) {
                Some(true) => {
                    self.modal = None;
                    "modal closed".to_string()
                }
                Some(false) => "modal stays open while a conversation is in progress".to_string(),
                None => "no modal".to_string(),
            },
            Command::Help => HELP.to_string(),
            Command::Quit => return None,
        };
        Some(output)
    }

    fn status_json(&self) -> String {
        let value = json!({
            "state": self.controller.snapshot(),
            "full": self.full.model(),
            "modal": self.modal.as_ref().map(Surface::model),
        });
        value.to_string()
    }

    /// Reads commands from `input` until EOF or `quit`, writing replies to
    /// `output`. Ends any open conversation before returning.
    pub async fn run<R, W>(mut self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let reply = match line.parse::<Command>() {
                Ok(command) => {
                    debug!(?command, "shell command");
                    match self.execute(command).await {
                        Some(reply) => reply,
                        None => break,
                    }
                }
                Err(e) => format!("{e}\n{HELP}"),
            };
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        self.controller.end().await;
        Ok(())
    }
}
