use crate::models::{RoutingVocabulary, SessionRoute};

/// Classify a session type into its calendar/meeting-provider pairing.
/// Pure and total: every session type maps to exactly one route, and the
/// same input always yields the same answer. Matching is case-insensitive
/// substring search against the configured admin vocabulary; anything that
/// matches nothing is a regular therapy session on the therapist's own
/// calendar.
pub fn classify_session(session_type: &str, vocabulary: &RoutingVocabulary) -> SessionRoute {
    let normalized = session_type.to_lowercase();

    if vocabulary
        .admin_keywords
        .iter()
        .any(|keyword| normalized.contains(keyword.as_str()))
    {
        SessionRoute::AdminOnboarding
    } else {
        SessionRoute::TherapistOwned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_vocabulary_routes_to_admin_calendar() {
        let vocab = RoutingVocabulary::default();
        for session_type in [
            "Introduction Call",
            "Free Consultation",
            "intake session",
            "Initial Assessment",
            "Onboarding chat",
        ] {
            assert_eq!(
                classify_session(session_type, &vocab),
                SessionRoute::AdminOnboarding,
                "{session_type} should route to the admin calendar"
            );
        }
    }

    #[test]
    fn therapy_sessions_route_to_therapist_calendar() {
        let vocab = RoutingVocabulary::default();
        for session_type in ["Therapy Session", "CBT follow-up", "Couples counselling", ""] {
            assert_eq!(
                classify_session(session_type, &vocab),
                SessionRoute::TherapistOwned,
                "{session_type} should route to the therapist calendar"
            );
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let vocab = RoutingVocabulary::default();
        let first = classify_session("Introduction Call", &vocab);
        for _ in 0..100 {
            assert_eq!(classify_session("Introduction Call", &vocab), first);
        }
    }

    #[test]
    fn custom_vocabulary_is_respected() {
        let vocab = RoutingVocabulary {
            admin_keywords: vec!["triage".to_string()],
        };
        assert_eq!(
            classify_session("Triage Call", &vocab),
            SessionRoute::AdminOnboarding
        );
        assert_eq!(
            classify_session("Introduction Call", &vocab),
            SessionRoute::TherapistOwned
        );
    }
}
