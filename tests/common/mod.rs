//! Shared test utilities
//!
//! In-process stand-ins for the microphone, speaker and remote services so a
//! whole conversation can be driven without hardware or network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use voice_agent::conversation::{Collaborators, ConversationLoop, LoopSettings, Turn};
use voice_agent::services::{AudioContainer, Responder, Synthesizer, Transcriber};
use voice_agent::voice::{AudioClip, AudioSink, AudioSource, PcmSpec};
use voice_agent::{Error, Result};

pub const SYSTEM_PROMPT: &str = "You are a test assistant.";

/// What each fake should do, in order
///
/// `None` in a transcript or reply list means that call fails. Once a list
/// runs out the fake keeps answering with a fixed value.
#[derive(Default)]
pub struct Script {
    pub capture_fails: bool,
    pub transcripts: Vec<Option<&'static str>>,
    pub hang_transcription: bool,
    pub replies: Vec<Option<&'static str>>,
    pub synthesis_fails: bool,
    pub playback_fails: bool,
    pub spoken_exit_disabled: bool,
}

/// Call counters shared by every fake in one session
#[derive(Default)]
pub struct Calls {
    pub record: AtomicUsize,
    pub source_teardown: AtomicUsize,
    pub transcribe: AtomicUsize,
    pub complete: AtomicUsize,
    pub synthesize: AtomicUsize,
    pub play: AtomicUsize,
    pub sink_teardown: AtomicUsize,
    /// History length seen by each completion request
    pub turns_seen: Mutex<Vec<usize>>,
}

/// Read a call counter
pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

struct FakeSource {
    calls: Arc<Calls>,
    fails: bool,
}

#[async_trait(?Send)]
impl AudioSource for FakeSource {
    async fn record(&mut self, _duration: Duration) -> Result<AudioClip> {
        self.calls.record.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(Error::Recording("microphone unplugged".to_string()));
        }
        let mut clip = AudioClip::new(PcmSpec::pcm16(16_000, 1));
        clip.push_chunk(vec![0; 64]);
        Ok(clip)
    }

    fn teardown(&mut self) {
        self.calls.source_teardown.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeSink {
    calls: Arc<Calls>,
    fails: bool,
}

#[async_trait(?Send)]
impl AudioSink for FakeSink {
    async fn play(&mut self, audio: &[u8]) -> Result<()> {
        self.calls.play.fetch_add(1, Ordering::SeqCst);
        assert!(!audio.is_empty());
        if self.fails {
            return Err(Error::Playback("speaker disappeared".to_string()));
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.calls.sink_teardown.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeTranscriber {
    calls: Arc<Calls>,
    script: Mutex<VecDeque<Option<&'static str>>>,
    hang: bool,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: &[u8], container: AudioContainer) -> Result<String> {
        self.calls.transcribe.fetch_add(1, Ordering::SeqCst);
        assert_eq!(container, AudioContainer::Wav);
        assert!(audio.starts_with(b"RIFF"));
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Some("hello"));
        next.map(str::to_string)
            .ok_or_else(|| Error::Transcription("service unavailable".to_string()))
    }
}

struct FakeResponder {
    calls: Arc<Calls>,
    script: Mutex<VecDeque<Option<&'static str>>>,
}

#[async_trait]
impl Responder for FakeResponder {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        self.calls.complete.fetch_add(1, Ordering::SeqCst);
        self.calls.turns_seen.lock().unwrap().push(turns.len());
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Some("Sure."));
        next.map(str::to_string)
            .ok_or_else(|| Error::Response("rate limited".to_string()))
    }
}

struct FakeSynthesizer {
    calls: Arc<Calls>,
    fails: bool,
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, _container: AudioContainer) -> Result<Vec<u8>> {
        self.calls.synthesize.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(Error::Synthesis("voice model offline".to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Build a session wired to fakes following `script`
pub fn session(script: Script) -> (ConversationLoop, Arc<Calls>) {
    let calls = Arc::new(Calls::default());

    let settings = LoopSettings {
        record_duration: Duration::from_secs(1),
        speech_format: AudioContainer::Wav,
        spoken_exit: !script.spoken_exit_disabled,
    };

    let parts = Collaborators {
        source: Box::new(FakeSource {
            calls: Arc::clone(&calls),
            fails: script.capture_fails,
        }),
        sink: Box::new(FakeSink {
            calls: Arc::clone(&calls),
            fails: script.playback_fails,
        }),
        transcriber: Box::new(FakeTranscriber {
            calls: Arc::clone(&calls),
            script: Mutex::new(script.transcripts.into()),
            hang: script.hang_transcription,
        }),
        responder: Box::new(FakeResponder {
            calls: Arc::clone(&calls),
            script: Mutex::new(script.replies.into()),
        }),
        synthesizer: Box::new(FakeSynthesizer {
            calls: Arc::clone(&calls),
            fails: script.synthesis_fails,
        }),
    };

    (ConversationLoop::new(SYSTEM_PROMPT, settings, parts), calls)
}
