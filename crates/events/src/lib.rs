//! Domain events and their distribution.
//!
//! Events are facts emitted by aggregates and by the fulfillment engine. They
//! are published on an [`EventBus`] after the owning transaction commits, so
//! subscribers (notification workers, dashboards) never observe rolled-back
//! state.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
