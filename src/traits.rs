//! Shared trait abstractions for common patterns

use crate::core::viewport::{ViewEvent, Viewport};
use crate::Result;

/// Something that follows the view: reacts to the events returned by
/// [`Viewport`] mutators, reading the already-updated viewport.
pub trait ViewObserver {
    fn on_view_event(&mut self, event: &ViewEvent, viewport: &Viewport) -> Result<()>;

    /// Feeds a batch of events in order, stopping at the first error
    fn on_view_events(&mut self, events: &[ViewEvent], viewport: &Viewport) -> Result<()> {
        for event in events {
            self.on_view_event(event, viewport)?;
        }
        Ok(())
    }
}
