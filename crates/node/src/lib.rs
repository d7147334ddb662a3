//! Node glue: configuration, component wiring, and the pulse ticker.

pub mod components;
pub mod ticker;

pub use components::Components;
pub use ticker::PulseTicker;
