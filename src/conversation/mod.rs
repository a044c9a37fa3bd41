//! Conversation state and the turn-taking loop

mod history;
mod session;

pub use history::{ConversationHistory, Role, Turn};
pub use session::{
    Collaborators, ConversationLoop, LoopSettings, LoopState, Signal, Stage, TurnOutcome, is_spoken_exit,
    stdin_lines,
};
