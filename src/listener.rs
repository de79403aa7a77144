//! Listener binding declarations and the rebind cycle.
//!
//! Every build/patch cycle first drops all previously attached local and
//! external handlers and then re-derives both sets from the component's
//! declared [`Bindings`] against the now-current live tree. The
//! remove-all/re-add-all discipline guarantees handlers never accumulate
//! across repeated patches, and because every cycle creates fresh handler
//! records, removal always targets exactly what this cycle's predecessor
//! attached.

use std::fmt;
use std::rc::Rc;

use crate::bus::Payload;
use crate::node::{LiveNode, NodeId};
use crate::selector::Selector;

/// Channel through which a handler talks back to its host.
///
/// Handlers run while the host mutably holds the component, so they cannot
/// re-enter lifecycle operations directly; requesting a patch here makes
/// the host run one after the current dispatch completes.
#[derive(Debug, Default)]
pub struct EventCtx {
    patch_requested: bool,
}

impl EventCtx {
    /// Asks the host to patch once the current dispatch finishes.
    pub const fn request_patch(&mut self) {
        self.patch_requested = true;
    }

    /// Whether a patch has been requested.
    #[must_use]
    pub const fn patch_requested(&self) -> bool {
        self.patch_requested
    }
}

/// A declared handler, invoked with the component instance it belongs to.
pub type Handler<C> = Rc<dyn Fn(&mut C, &mut EventCtx, &Payload) -> anyhow::Result<()>>;

pub(crate) struct LocalSpec<C> {
    pub(crate) selector: Selector,
    pub(crate) event: String,
    pub(crate) handler: Handler<C>,
}

pub(crate) struct ExternalSpec<C> {
    pub(crate) topic: String,
    pub(crate) handler: Handler<C>,
}

/// The declared binding set of a component: local bindings scoped to the
/// rendered tree plus external bindings against the process-wide bus.
///
/// This is the explicit declaration interface the listener manager
/// consumes at bind time; nothing else reads it.
pub struct Bindings<C> {
    pub(crate) local: Vec<LocalSpec<C>>,
    pub(crate) external: Vec<ExternalSpec<C>>,
}

impl<C> Bindings<C> {
    /// An empty declaration set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            local: Vec::new(),
            external: Vec::new(),
        }
    }

    /// Declares a local binding: `handler` is attached to every element in
    /// the live subtree matching `selector`, for events of type `event`.
    #[must_use]
    pub fn on(
        mut self,
        selector: &str,
        event: impl Into<String>,
        handler: impl Fn(&mut C, &mut EventCtx, &Payload) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.local.push(LocalSpec {
            selector: Selector::parse(selector),
            event: event.into(),
            handler: Rc::new(handler),
        });
        self
    }

    /// Declares an external binding: `handler` is registered on the
    /// process-wide bus under `topic` until the next rebind or unmount.
    #[must_use]
    pub fn on_topic(
        mut self,
        topic: impl Into<String>,
        handler: impl Fn(&mut C, &mut EventCtx, &Payload) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.external.push(ExternalSpec {
            topic: topic.into(),
            handler: Rc::new(handler),
        });
        self
    }

    /// Number of declared local bindings.
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Number of declared external bindings.
    #[must_use]
    pub fn external_len(&self) -> usize {
        self.external.len()
    }
}

impl<C> Default for Bindings<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for Bindings<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("local", &self.local.len())
            .field("external", &self.external.len())
            .finish()
    }
}

/// A local binding attached during the last rebind cycle.
pub(crate) struct AttachedListener<C> {
    pub(crate) node: NodeId,
    pub(crate) event: String,
    pub(crate) handler: Handler<C>,
}

/// Resolves the declared local bindings against the current live root,
/// producing one attachment per matching element per declared binding.
pub(crate) fn resolve_local<C>(
    specs: &[LocalSpec<C>],
    root: Option<&LiveNode>,
) -> Vec<AttachedListener<C>> {
    let mut attached = Vec::new();
    let Some(root) = root else {
        return attached;
    };
    for spec in specs {
        root.walk_elements(&mut |el| {
            if spec.selector.matches(el) {
                attached.push(AttachedListener {
                    node: el.id(),
                    event: spec.event.clone(),
                    handler: Rc::clone(&spec.handler),
                });
            }
        });
    }
    attached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::element;

    struct Dummy;

    #[test]
    fn resolves_one_attachment_per_match() {
        let root = LiveNode::materialize(
            &element("div")
                .child(element("button").attr("class", "a"))
                .child(element("button").attr("class", "b"))
                .into(),
        );
        let bindings: Bindings<Dummy> =
            Bindings::new().on("button", "press", |_, _, _| Ok(()));

        let attached = resolve_local(&bindings.local, Some(&root));
        assert_eq!(attached.len(), 2);
        assert!(attached.iter().all(|a| a.event == "press"));
        assert_ne!(attached[0].node, attached[1].node);
    }

    #[test]
    fn no_root_resolves_nothing() {
        let bindings: Bindings<Dummy> = Bindings::new().on("*", "press", |_, _, _| Ok(()));
        assert!(resolve_local(&bindings.local, None).is_empty());
    }

    #[test]
    fn root_element_itself_can_match() {
        let root = LiveNode::materialize(&element("form").attr("id", "f").into());
        let bindings: Bindings<Dummy> = Bindings::new().on("#f", "submit", |_, _, _| Ok(()));
        let attached = resolve_local(&bindings.local, Some(&root));
        assert_eq!(attached.len(), 1);
        assert_eq!(attached[0].node, root.id());
    }
}
