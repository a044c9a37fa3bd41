//! Voice Agent - a spoken conversation loop with an OpenAI-compatible assistant
//!
//! Each turn records a fixed-length clip from the microphone, transcribes it,
//! asks a chat model for a reply with the full history, then speaks the reply.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 ConversationLoop                      │
//! │   Idle → Capturing → Transcribing → Requesting → ...  │
//! └───────┬──────────────┬──────────────┬────────────────┘
//!         │              │              │
//! ┌───────▼──────┐ ┌─────▼──────┐ ┌─────▼──────────────┐
//! │ AudioSource  │ │ Transcriber│ │ Responder          │
//! │ AudioSink    │ │ Synthesizer│ │ (chat completions) │
//! │ (cpal)       │ │ (STT/TTS)  │ │                    │
//! └──────────────┘ └────────────┘ └────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod services;
pub mod voice;

pub use config::Config;
pub use conversation::{ConversationHistory, ConversationLoop};
pub use error::{Error, Result};
