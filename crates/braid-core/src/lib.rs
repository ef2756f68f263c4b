pub mod config;
pub mod error;
pub mod event;
pub mod rng;
pub mod traits;
pub mod value;

pub use config::BraidConfig;
pub use error::{BraidError, GraphViolation, Result};
pub use event::{BusEvent, EventBus, EventPhase, SubscribeOptions, Subscription};
pub use rng::{SeedSequence, SeededRng};
pub use traits::{ActionInputs, Component, EntityMutation};
pub use value::{Value, Vec2};
