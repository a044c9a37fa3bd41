//! The turn-taking conversation loop
//!
//! One turn runs strictly in sequence: capture, transcribe, request, speak.
//! Text-side history is updated as soon as each value exists, so a failing
//! audio path never loses what was said.

use std::fmt::Display;
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::sync::mpsc;

use super::history::ConversationHistory;
use crate::Error;
use crate::config::Config;
use crate::services::{AudioContainer, Responder, Synthesizer, Transcriber};
use crate::voice::{AudioSink, AudioSource};

/// Text the user types to end the session
const EXIT_COMMAND: &str = "exit";

/// Everything the loop talks to
pub struct Collaborators {
    pub source: Box<dyn AudioSource>,
    pub sink: Box<dyn AudioSink>,
    pub transcriber: Box<dyn Transcriber>,
    pub responder: Box<dyn Responder>,
    pub synthesizer: Box<dyn Synthesizer>,
}

/// Per-session knobs for the loop
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Length of each recording
    pub record_duration: Duration,

    /// Container requested from the synthesizer
    pub speech_format: AudioContainer,

    /// End the session when the transcript contains the word "exit"
    pub spoken_exit: bool,
}

impl LoopSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            record_duration: config.audio.record_duration,
            speech_format: config.voice.format,
            spoken_exit: config.voice.spoken_exit,
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            record_duration: Duration::from_secs(5),
            speech_format: AudioContainer::Wav,
            spoken_exit: true,
        }
    }
}

/// Where the loop is within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Capturing,
    Transcribing,
    Requesting,
    Synthesizing,
    Playing,
    Terminated,
}

/// User trigger read at the idle prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Start,
    Exit,
}

impl Signal {
    /// Interpret one line of console input
    ///
    /// "exit" in any case ends the session; anything else, including an
    /// empty line, starts a recording.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        if line.trim().eq_ignore_ascii_case(EXIT_COMMAND) {
            Self::Exit
        } else {
            Self::Start
        }
    }
}

/// Pipeline stage a turn stopped at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capture,
    Transcription,
    Response,
    Synthesis,
    Playback,
}

/// How a single signal was handled
#[derive(Debug)]
pub enum TurnOutcome {
    /// Spoken, answered and played back
    Completed,
    /// Transcription came back empty; nothing recorded
    NothingHeard,
    /// A stage before the assistant reply failed
    Failed { stage: Stage, error: Error },
    /// The reply is in history but could not be voiced
    Degraded { stage: Stage, error: Error },
    /// The session ended
    Terminated,
}

/// Owns one session: its history, its devices and its remote clients
pub struct ConversationLoop {
    history: ConversationHistory,
    state: LoopState,
    settings: LoopSettings,
    parts: Collaborators,
    released: bool,
}

impl ConversationLoop {
    /// Start a session whose history opens with `system_prompt`
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, settings: LoopSettings, parts: Collaborators) -> Self {
        Self {
            history: ConversationHistory::new(system_prompt),
            state: LoopState::Idle,
            settings,
            parts,
            released: false,
        }
    }

    /// Conversation so far
    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Current loop state
    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    /// Handle one start or exit signal, running a full turn for `Start`
    ///
    /// Every error is contained here; the loop is back at `Idle` afterwards
    /// unless the session ended.
    pub async fn handle_signal<W: Write>(&mut self, signal: Signal, out: &mut W) -> TurnOutcome {
        if self.state == LoopState::Terminated {
            return TurnOutcome::Terminated;
        }

        if signal == Signal::Exit {
            self.terminate();
            say(out, "Goodbye!");
            return TurnOutcome::Terminated;
        }

        let outcome = self.run_turn(out).await;
        match &outcome {
            TurnOutcome::Terminated => {}
            TurnOutcome::Failed { stage, error } | TurnOutcome::Degraded { stage, error } => {
                tracing::warn!(?stage, error = %error, "turn did not complete");
                self.transition(LoopState::Idle);
            }
            TurnOutcome::Completed | TurnOutcome::NothingHeard => {
                self.transition(LoopState::Idle);
            }
        }
        outcome
    }

    async fn run_turn<W: Write>(&mut self, out: &mut W) -> TurnOutcome {
        self.transition(LoopState::Capturing);
        say(
            out,
            format_args!(
                "Recording for {} seconds... Speak now!",
                self.settings.record_duration.as_secs_f32()
            ),
        );

        let clip = match self.parts.source.record(self.settings.record_duration).await {
            Ok(clip) => clip,
            Err(error) => {
                say(out, format_args!("Recording failed: {error}"));
                return TurnOutcome::Failed {
                    stage: Stage::Capture,
                    error,
                };
            }
        };

        self.transition(LoopState::Transcribing);
        let wav = match clip.to_wav() {
            Ok(wav) => wav,
            Err(error) => {
                say(out, format_args!("Recording failed: {error}"));
                return TurnOutcome::Failed {
                    stage: Stage::Capture,
                    error,
                };
            }
        };
        drop(clip);

        let transcribed = self
            .parts
            .transcriber
            .transcribe(&wav, AudioContainer::Wav)
            .await;
        drop(wav);

        let transcript = match transcribed {
            Ok(text) => text,
            Err(error) => {
                say(out, format_args!("Transcription failed: {error}"));
                return TurnOutcome::Failed {
                    stage: Stage::Transcription,
                    error,
                };
            }
        };

        let text = transcript.trim();
        if text.is_empty() {
            say(out, "I didn't catch that. Please try again.");
            return TurnOutcome::NothingHeard;
        }
        say(out, format_args!("You said: {text}"));

        if self.settings.spoken_exit && is_spoken_exit(text) {
            self.terminate();
            say(out, "Goodbye!");
            return TurnOutcome::Terminated;
        }

        // The user turn survives a failed request so the next attempt keeps it
        self.transition(LoopState::Requesting);
        self.history.push_user(text);

        let reply = match self.parts.responder.complete(self.history.turns()).await {
            Ok(reply) => reply,
            Err(error) => {
                say(out, format_args!("Sorry, I couldn't get a response: {error}"));
                return TurnOutcome::Failed {
                    stage: Stage::Response,
                    error,
                };
            }
        };

        // The assistant turn is kept no matter what happens to the audio
        self.history.push_assistant(reply.as_str());
        say(out, format_args!("Assistant: {reply}"));

        self.transition(LoopState::Synthesizing);
        let audio = match self
            .parts
            .synthesizer
            .synthesize(&reply, self.settings.speech_format)
            .await
        {
            Ok(audio) => audio,
            Err(error) => {
                say(out, format_args!("(voice output unavailable: {error})"));
                return TurnOutcome::Degraded {
                    stage: Stage::Synthesis,
                    error,
                };
            }
        };

        self.transition(LoopState::Playing);
        if let Err(error) = self.parts.sink.play(&audio).await {
            say(out, format_args!("(playback failed: {error})"));
            return TurnOutcome::Degraded {
                stage: Stage::Playback,
                error,
            };
        }

        TurnOutcome::Completed
    }

    /// End the session, releasing both audio devices exactly once
    pub fn terminate(&mut self) {
        if self.released {
            return;
        }
        self.transition(LoopState::Terminated);
        self.parts.source.teardown();
        self.parts.sink.teardown();
        self.released = true;
        tracing::info!(turns = self.history.len(), "session terminated");
    }

    /// Drive the session from console lines until exit, EOF or `shutdown`
    ///
    /// `shutdown` is raced against both the idle prompt and every turn, so
    /// an interrupt abandons an in-flight capture or request immediately.
    pub async fn run<W, S>(&mut self, mut lines: mpsc::UnboundedReceiver<String>, out: &mut W, shutdown: S)
    where
        W: Write,
        S: Future<Output = ()>,
    {
        print_banner(out, self.settings.record_duration);
        tokio::pin!(shutdown);

        while self.state != LoopState::Terminated {
            prompt(out);

            let signal = tokio::select! {
                line = lines.recv() => line.as_deref().map_or(Signal::Exit, Signal::parse),
                () = &mut shutdown => {
                    tracing::info!("interrupted at prompt");
                    break;
                }
            };

            tokio::select! {
                _ = self.handle_signal(signal, out) => {}
                () = &mut shutdown => {
                    tracing::info!("interrupted mid-turn");
                    break;
                }
            }

            if self.state != LoopState::Terminated {
                say(out, "");
            }
        }

        if self.state != LoopState::Terminated {
            self.terminate();
            say(out, "\nGoodbye!");
        }
    }
}

impl Drop for ConversationLoop {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Whether a transcript asks to end the session
#[must_use]
pub fn is_spoken_exit(transcript: &str) -> bool {
    transcript
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case(EXIT_COMMAND))
}

/// Forward stdin lines from a dedicated thread
///
/// A plain thread rather than `tokio::io::stdin` so a pending read never
/// holds up runtime shutdown.
#[must_use]
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_banner<W: Write>(out: &mut W, record_duration: Duration) {
    say(out, "Simple Voice Agent Started!");
    say(out, "Instructions:");
    say(
        out,
        format_args!(
            "- Press Enter to start recording (speak for {} seconds)",
            record_duration.as_secs_f32()
        ),
    );
    say(out, "- Type 'exit' and press Enter to quit");
    say(out, "- The agent will respond with voice");
    say(out, "");
}

fn prompt<W: Write>(out: &mut W) {
    let written = write!(out, "Press Enter to start recording (or type 'exit' to quit): ")
        .and_then(|()| out.flush());
    if let Err(e) = written {
        tracing::warn!(error = %e, "failed to write to console");
    }
}

fn say<W: Write>(out: &mut W, message: impl Display) {
    if let Err(e) = writeln!(out, "{message}") {
        tracing::warn!(error = %e, "failed to write to console");
    }
}
