//! Session runtime executor

use super::traits::{CandidateGenerator, RecordSink};
use super::SessionError;
use crate::state_machine::{transition, Effect, Event, Session, TransitionError, TurnRecord};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a successful selection
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    /// The turn just resolved
    pub turn: TurnRecord,
    pub finalized: bool,
    /// Whether the session record was appended to the sink by this call
    pub persisted: bool,
}

/// What a processed event did beyond the state change
#[derive(Debug, Default)]
struct EffectSummary {
    records_persisted: usize,
}

/// Drives one session. Calls take `&mut self`, so a runtime is never
/// driven by two callers at once.
pub struct SessionRuntime<G, S>
where
    G: CandidateGenerator + 'static,
    S: RecordSink + 'static,
{
    session: Session,
    generator: Arc<G>,
    sink: Arc<S>,
    last_active: Instant,
}

impl<G, S> SessionRuntime<G, S>
where
    G: CandidateGenerator + 'static,
    S: RecordSink + 'static,
{
    pub fn new(session: Session, generator: Arc<G>, sink: Arc<S>) -> Self {
        Self {
            session,
            generator,
            sink,
            last_active: Instant::now(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Time since the last request touched this session
    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Fan `text` out to every backend and open a pending turn.
    ///
    /// On generation failure the session is left exactly as it was, so the
    /// same input can be resubmitted.
    pub async fn submit_input(&mut self, text: &str) -> Result<&TurnRecord, SessionError> {
        self.process_events(vec![Event::UserInput {
            text: text.to_string(),
        }])
        .await?;

        self.session.pending_turn().ok_or_else(|| {
            TransitionError::InvalidTransition("no pending turn after generation".to_string())
                .into()
        })
    }

    /// Record the human's choice for the pending turn, binding
    /// `assignment_id` in the same step. If either part is rejected the
    /// session keeps its previous assignment and pending turn.
    pub async fn select_response(
        &mut self,
        text: &str,
        assignment_id: Option<&str>,
    ) -> Result<SelectionOutcome, SessionError> {
        let mut events = Vec::with_capacity(2);
        if let Some(assignment_id) = assignment_id {
            events.push(Event::AssignmentBound {
                assignment_id: assignment_id.to_string(),
            });
        }
        events.push(Event::ResponseSelected {
            text: text.to_string(),
            selected_at: Utc::now(),
        });
        let summary = self.process_events(events).await?;

        let turn = self.session.turns.last().cloned().ok_or_else(|| {
            SessionError::from(TransitionError::InvalidTransition(
                "no turn after selection".to_string(),
            ))
        })?;

        tracing::info!(
            session_id = %self.session.session_id,
            turn = turn.turn_index,
            backend = ?turn.selected_backend_id(),
            finalized = self.session.is_finalized(),
            "Response selected"
        );

        Ok(SelectionOutcome {
            turn,
            finalized: self.session.is_finalized(),
            persisted: summary.records_persisted > 0,
        })
    }

    /// Bind the crowd-platform assignment; repeating the same id is a no-op
    pub async fn set_assignment_id(&mut self, assignment_id: &str) -> Result<(), SessionError> {
        self.process_events(vec![Event::AssignmentBound {
            assignment_id: assignment_id.to_string(),
        }])
        .await?;
        Ok(())
    }

    /// Run `events` in order, plus every event their effects generate,
    /// against a working copy; the copy replaces the session only if all of
    /// it succeeded.
    async fn process_events(&mut self, events: Vec<Event>) -> Result<EffectSummary, SessionError> {
        self.touch();
        let mut working = self.session.clone();
        let mut summary = EffectSummary::default();
        // Stack: first event on top
        let mut events_to_process: Vec<Event> = events.into_iter().rev().collect();

        while let Some(current_event) = events_to_process.pop() {
            let result = transition(&working, current_event)?;
            working = result.new_state;

            for effect in result.effects {
                if matches!(effect, Effect::PersistRecord { .. }) {
                    summary.records_persisted += 1;
                }
                if let Some(generated_event) = self.execute_effect(effect).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        self.session = working;
        Ok(summary)
    }

    async fn execute_effect(&self, effect: Effect) -> Result<Option<Event>, SessionError> {
        match effect {
            Effect::DispatchGeneration {
                user_input,
                memories,
            } => {
                let candidates = self
                    .generator
                    .generate(&user_input, &memories)
                    .await
                    .inspect_err(|e| {
                        tracing::warn!(
                            session_id = %self.session.session_id,
                            turn = self.session.turn_count + 1,
                            error = %e,
                            "Turn aborted, generation failed"
                        );
                    })?;

                tracing::info!(
                    session_id = %self.session.session_id,
                    turn = self.session.turn_count + 1,
                    candidates = candidates.len(),
                    "Candidates generated"
                );
                Ok(Some(Event::CandidatesGenerated { candidates }))
            }

            Effect::PersistRecord { record } => {
                self.sink
                    .append(&record)
                    .await
                    .map_err(SessionError::Persistence)?;

                tracing::info!(
                    session_id = %record.session_id,
                    assignment_id = %record.assignment_id,
                    turns = record.turns.len(),
                    "Session record persisted"
                );
                Ok(None)
            }
        }
    }
}
