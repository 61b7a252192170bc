//! The three kind-specialized `MemoryComponent` implementations (§4.10).

pub mod durable;
pub mod environmental;
pub mod task;

pub use durable::DurableComponent;
pub use environmental::EnvironmentalComponent;
pub use task::TaskComponent;
