//! The contract a renderable unit implements.

use futures::future::LocalBoxFuture;

use crate::dataset::ParsedConfig;
use crate::listener::Bindings;
use crate::node::RenderNode;

/// A renderable unit driven by a [`ComponentHost`](crate::lifecycle::ComponentHost).
///
/// Only [`build`](Component::build) is required: it produces a fresh
/// [`RenderNode`] tree on every build pass, which the host materializes on
/// mount and reconciles against the live tree on patch. Every other hook
/// has a no-op default.
pub trait Component: Sized + 'static {
    /// Produces the desired tree for the current state.
    fn build(&mut self, config: &ParsedConfig) -> RenderNode;

    /// One-time asynchronous initialization, awaited during mount before
    /// the first build. The only suspension point in the whole pipeline.
    fn setup<'a>(&'a mut self, config: &'a ParsedConfig) -> LocalBoxFuture<'a, ()> {
        let _ = config;
        Box::pin(async {})
    }

    /// Inline CSS adopted by the host at mount. Ignored when empty.
    fn css(&self) -> String {
        String::new()
    }

    /// References to shared stylesheets, resolved through the host's
    /// [`StyleSource`](crate::style::StyleSource) and attached as
    /// auxiliary link nodes before the main subtree.
    fn stylesheets(&self) -> Vec<String> {
        Vec::new()
    }

    /// Declares the local and external listener bindings. Consulted on
    /// every rebind cycle; the returned set fully replaces the previous
    /// one.
    fn bindings(&self) -> Bindings<Self> {
        Bindings::new()
    }

    /// Runs once after the first tree is built and listeners are bound.
    fn after_build(&mut self) {}

    /// Runs after every completed patch.
    fn after_patch(&mut self) {}
}
