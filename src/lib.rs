#![doc = include_str!("../README.md")]

pub mod bus;
pub mod component;
pub mod dataset;
pub mod error;
pub mod lifecycle;
pub mod listener;
pub mod node;
pub mod reconcile;
pub mod selector;
pub mod style;

pub use bus::{EventBus, Payload};
pub use component::Component;
pub use dataset::ParsedConfig;
pub use error::{LifecycleError, StyleError};
pub use lifecycle::{ComponentHost, ComponentHostBuilder, LifecycleState};
pub use listener::{Bindings, EventCtx};
pub use node::{LiveNode, NodeId, RenderElement, RenderNode, element, text};
pub use style::{StyleSource, Stylesheet};

/// Everything a component author needs.
pub mod prelude {
    pub use crate::bus::Payload;
    pub use crate::component::Component;
    pub use crate::dataset::ParsedConfig;
    pub use crate::error::LifecycleError;
    pub use crate::lifecycle::{ComponentHost, ComponentHostBuilder, LifecycleState};
    pub use crate::listener::{Bindings, EventCtx};
    pub use crate::node::{RenderNode, element, text};
}
