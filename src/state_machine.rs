//! Session state machine
//!
//! Pure transitions over an explicit [`Session`] value; the runtime executes
//! the resulting effects.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{Candidate, Session, SessionPhase, SessionRecord, TranscriptEntry, TurnRecord};
pub use transition::{transition, TransitionError};
