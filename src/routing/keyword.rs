//! Keyword-count router.

use super::traits::{MatchedBy, PersonaSet, RouteMatch, Router};

/// Routes by counting keyword hits per persona.
///
/// The first persona with the strictly highest count wins, so ties fall to
/// declaration order. With no hits at all the set's default persona answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordRouter;

impl KeywordRouter {
    pub fn new() -> Self {
        Self
    }
}

impl Router for KeywordRouter {
    fn select<'a>(
        &self,
        query: &str,
        pinned: Option<&str>,
        personas: &'a PersonaSet,
    ) -> RouteMatch<'a> {
        if let Some(name) = pinned {
            match personas.get(name) {
                Some(persona) => {
                    return RouteMatch {
                        persona,
                        matched_by: MatchedBy::Pinned,
                    }
                }
                None => tracing::warn!(pinned = name, "Ignoring pin to unknown persona"),
            }
        }

        let lowered = query.to_lowercase();
        let (persona, count) = personas.iter().fold(
            (personas.default_persona(), 0),
            |(best, best_count), candidate| {
                let count = candidate.match_count(&lowered);
                if count > best_count {
                    (candidate, count)
                } else {
                    (best, best_count)
                }
            },
        );

        let matched_by = if count == 0 {
            MatchedBy::Default
        } else {
            MatchedBy::Keywords { count }
        };

        RouteMatch {
            persona,
            matched_by,
        }
    }

    fn name(&self) -> &str {
        "keyword"
    }
}
