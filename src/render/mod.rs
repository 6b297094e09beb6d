//! Presentation of session state.

pub mod terminal;
pub mod traits;

pub use terminal::TerminalRenderer;
pub use traits::ChatRenderer;

/// Create the terminal renderer, styled when stdout supports it.
pub fn create_renderer(recent_agents_limit: usize) -> Box<dyn ChatRenderer> {
    Box::new(TerminalRenderer::for_stdout(recent_agents_limit))
}
