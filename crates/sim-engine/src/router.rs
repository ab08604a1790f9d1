//! Turn Router (C2): classifies raw user input before anything else runs.
//!
//! Classification is first-match-wins over a fixed, small rule set —
//! matching is case-insensitive and whitespace-trimmed, exactly like the
//! teacher's command dispatch in `sa-gateway::cli::chat`.

use sim_domain::entities::SUBMIT_FOR_GRADING;
use sim_domain::mention::extract_mention;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnClass {
    /// Exact `"begin"`. Control class — no turn increment, no log row.
    Begin,
    /// Exact `"help"`. Control class — no turn increment, no log row.
    Help,
    /// Exact `SUBMIT_FOR_GRADING` sentinel. Control class — no log row.
    Submit,
    /// Text containing `@token`; `token` is the raw mention text (not yet
    /// resolved to a persona).
    Mention(String),
    /// Anything else. A user turn routed to the generic orchestrator reply.
    Plain,
}

/// Classify one line of raw user input.
pub fn classify(raw_text: &str) -> TurnClass {
    let trimmed = raw_text.trim();

    if trimmed.eq_ignore_ascii_case("begin") {
        return TurnClass::Begin;
    }
    if trimmed.eq_ignore_ascii_case("help") {
        return TurnClass::Help;
    }
    if trimmed == SUBMIT_FOR_GRADING {
        return TurnClass::Submit;
    }
    if let Some(token) = extract_mention(trimmed) {
        return TurnClass::Mention(token.to_string());
    }
    TurnClass::Plain
}

/// `mention` and `plain` are the only classes that count as user turns —
/// they increment `turn_count` and append a user log row.
pub fn is_user_turn(class: &TurnClass) -> bool {
    matches!(class, TurnClass::Mention(_) | TurnClass::Plain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_case_insensitive_and_trimmed() {
        assert_eq!(classify("  Begin  "), TurnClass::Begin);
        assert_eq!(classify("BEGIN"), TurnClass::Begin);
    }

    #[test]
    fn help_matches_exactly() {
        assert_eq!(classify("help"), TurnClass::Help);
        assert_eq!(classify("Help me understand"), TurnClass::Plain);
    }

    #[test]
    fn submit_sentinel_is_case_sensitive_exact() {
        assert_eq!(classify("SUBMIT_FOR_GRADING"), TurnClass::Submit);
        assert_eq!(classify("submit_for_grading"), TurnClass::Plain);
    }

    #[test]
    fn mention_extracts_raw_token() {
        assert_eq!(
            classify("@cfo good morning"),
            TurnClass::Mention("cfo".to_string())
        );
    }

    #[test]
    fn plain_text_with_no_trigger() {
        assert_eq!(classify("what should I do next?"), TurnClass::Plain);
    }

    #[test]
    fn only_mention_and_plain_count_as_user_turns() {
        assert!(is_user_turn(&TurnClass::Plain));
        assert!(is_user_turn(&TurnClass::Mention("cfo".into())));
        assert!(!is_user_turn(&TurnClass::Begin));
        assert!(!is_user_turn(&TurnClass::Help));
        assert!(!is_user_turn(&TurnClass::Submit));
    }
}
