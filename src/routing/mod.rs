//! Persona routing: picks which persona answers a query.

pub mod keyword;
pub mod traits;

pub use keyword::KeywordRouter;
pub use traits::{MatchedBy, Persona, PersonaSet, RouteMatch, Router, DEFAULT_PERSONA};

/// Create the default keyword-count router.
pub fn create_router() -> Box<dyn Router> {
    Box::new(KeywordRouter::new())
}
