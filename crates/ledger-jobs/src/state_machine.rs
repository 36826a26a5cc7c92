use ledger_core::model::DocumentStatus;

/// Events that drive the per-document state machine (spec §4.11's diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Process,
    Success,
    Retriable,
    Fatal,
    CancelRequested,
}

/// Side effects the driver must perform alongside a transition. Kept as data
/// rather than performed inline so the transition function itself stays pure
/// and trivially testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    WriteProcessingEvent(&'static str),
    EmitAudit(&'static str),
}

/// `(state, event) -> (state', effects[])`, matching spec §4.11's diagram
/// exactly: `UPLOADED --process--> PROCESSING`, then `PROCESSING` branches on
/// `success`/`retriable`/`fatal`, and `cancel_requested` is accepted from any
/// non-terminal state. Invalid combinations return the state unchanged with
/// no effects rather than panicking — the caller decides whether that is a
/// bug worth logging.
pub fn transition(state: DocumentStatus, event: JobEvent) -> (DocumentStatus, Vec<Effect>) {
    use DocumentStatus::*;
    use JobEvent::*;

    if !state.is_terminal() && event == CancelRequested {
        return (Cancelled, vec![Effect::WriteProcessingEvent("cancelled"), Effect::EmitAudit("CANCELLED")]);
    }

    match (state, event) {
        (Uploaded, Process) => (Processing, vec![Effect::WriteProcessingEvent("processing_started")]),
        (Processing, Success) => (
            Completed,
            vec![Effect::WriteProcessingEvent("processing_completed"), Effect::EmitAudit("EXTRACTED")],
        ),
        (Processing, Retriable) => (Retrying, vec![Effect::WriteProcessingEvent("processing_retrying")]),
        (Retrying, Process) => (Processing, vec![Effect::WriteProcessingEvent("processing_started")]),
        (Processing, Fatal) | (Retrying, Fatal) => (
            Failed,
            vec![Effect::WriteProcessingEvent("processing_failed"), Effect::EmitAudit("ERROR")],
        ),
        (other, _) => (other, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentStatus::*;
    use JobEvent::*;

    #[test]
    fn happy_path_reaches_completed() {
        let (s, _) = transition(Uploaded, Process);
        assert_eq!(s, Processing);
        let (s, effects) = transition(s, Success);
        assert_eq!(s, Completed);
        assert!(effects.contains(&Effect::EmitAudit("EXTRACTED")));
    }

    #[test]
    fn retry_returns_to_processing_then_can_still_fail() {
        let (s, _) = transition(Processing, Retriable);
        assert_eq!(s, Retrying);
        let (s, _) = transition(s, Process);
        assert_eq!(s, Processing);
        let (s, effects) = transition(s, Fatal);
        assert_eq!(s, Failed);
        assert!(effects.iter().any(|e| matches!(e, Effect::WriteProcessingEvent("processing_failed"))));
    }

    #[test]
    fn cancellation_preempts_any_non_terminal_state() {
        let (s, _) = transition(Processing, CancelRequested);
        assert_eq!(s, Cancelled);
        let (s, _) = transition(Retrying, CancelRequested);
        assert_eq!(s, Cancelled);
    }

    #[test]
    fn terminal_states_reject_cancellation() {
        let (s, effects) = transition(Completed, CancelRequested);
        assert_eq!(s, Completed);
        assert!(effects.is_empty());
    }
}
