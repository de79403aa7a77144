//! The lifecycle controller.
//!
//! A [`ComponentHost`] owns one component instance and its mounted tree,
//! and drives the state machine
//! `Constructed → Mounting → Mounted ⇄ Patching → Unmounted`. Mounting is
//! the only asynchronous operation (it awaits the component's setup hook);
//! everything else runs synchronously to completion, so an observer never
//! sees a partially patched tree. A host whose surrounding document goes
//! away while setup is still pending may be unmounted mid-mount: the
//! in-flight mount observes the `Mounting → Unmounted` transition when it
//! resumes and abandons without building or binding anything.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, error, warn};

use crate::bus::{self, BusHandler, Payload};
use crate::component::Component;
use crate::dataset::ParsedConfig;
use crate::error::LifecycleError;
use crate::listener::{AttachedListener, EventCtx, Handler, resolve_local};
use crate::node::{LiveNode, NodeId};
use crate::reconcile::reconcile;
use crate::selector::Selector;
use crate::style::{self, StyleSource, Stylesheet};

/// The lifecycle states of a hosted component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, not yet part of the active document.
    Constructed,
    /// `mount` is in flight; its setup hook may be suspended.
    Mounting,
    /// Mounted with a live tree and bound listeners.
    Mounted,
    /// A synchronous patch is running.
    Patching,
    /// Terminal: the tree is gone and every binding is released.
    Unmounted,
}

/// An external handler registered on the bus during the last rebind cycle,
/// kept so the next cycle (or unmount) can unregister it by identity.
struct AttachedExternal {
    topic: String,
    handler: BusHandler,
}

struct Body<C: Component> {
    /// `None` only while a mount has the component out for its setup hook.
    component: Option<C>,
    attributes: IndexMap<String, String>,
    config: ParsedConfig,
    /// Auxiliary stylesheet links followed by the single live root.
    container: Vec<LiveNode>,
    local: Vec<AttachedListener<C>>,
    external: Vec<AttachedExternal>,
    adopted: Option<Stylesheet>,
    style_source: Option<Rc<dyn StyleSource>>,
}

struct Shared<C: Component> {
    state: Cell<LifecycleState>,
    body: RefCell<Body<C>>,
}

/// Builder for [`ComponentHost`].
pub struct ComponentHostBuilder<C: Component> {
    component: C,
    attributes: IndexMap<String, String>,
    style_source: Option<Rc<dyn StyleSource>>,
}

impl<C: Component> ComponentHostBuilder<C> {
    /// Starts a builder around the component instance.
    #[must_use]
    pub fn new(component: C) -> Self {
        Self {
            component,
            attributes: IndexMap::new(),
            style_source: None,
        }
    }

    /// Sets a raw host-element attribute. Attributes in the `data-`
    /// namespace become the component's [`ParsedConfig`] at mount.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Supplies the style provider used to resolve declared stylesheet
    /// references. Without one, declared references are skipped.
    #[must_use]
    pub fn style_source(mut self, source: Rc<dyn StyleSource>) -> Self {
        self.style_source = Some(source);
        self
    }

    /// Finalizes the builder.
    #[must_use]
    pub fn build(self) -> ComponentHost<C> {
        ComponentHost {
            shared: Rc::new(Shared {
                state: Cell::new(LifecycleState::Constructed),
                body: RefCell::new(Body {
                    component: Some(self.component),
                    attributes: self.attributes,
                    config: ParsedConfig::default(),
                    container: Vec::new(),
                    local: Vec::new(),
                    external: Vec::new(),
                    adopted: None,
                    style_source: self.style_source,
                }),
            }),
        }
    }
}

impl<C: Component> fmt::Debug for ComponentHostBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHostBuilder")
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Hosts one component instance and drives its lifecycle.
///
/// Cloning a host is cheap and yields another handle to the same instance;
/// externally bound handlers hold such handles, which is why skipping
/// [`unmount`](ComponentHost::unmount) leaks the registration (and the
/// instance) for the process lifetime.
pub struct ComponentHost<C: Component> {
    shared: Rc<Shared<C>>,
}

impl<C: Component> Clone for ComponentHost<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<C: Component> fmt::Debug for ComponentHost<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHost")
            .field("state", &self.shared.state.get())
            .finish_non_exhaustive()
    }
}

impl<C: Component> ComponentHost<C> {
    /// Hosts `component` with no host attributes and no style provider.
    #[must_use]
    pub fn new(component: C) -> Self {
        ComponentHostBuilder::new(component).build()
    }

    /// Starts a [`ComponentHostBuilder`].
    #[must_use]
    pub fn builder(component: C) -> ComponentHostBuilder<C> {
        ComponentHostBuilder::new(component)
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.shared.state.get()
    }

    /// Mounts the component: decodes configuration, resolves declared
    /// stylesheets, awaits the setup hook, builds and materializes the
    /// first tree, binds listeners and runs `after_build`.
    ///
    /// # Errors
    ///
    /// Fails unless the host is still `Constructed`, or when re-entered
    /// from within another lifecycle operation.
    pub async fn mount(&self) -> Result<(), LifecycleError> {
        match self.shared.state.get() {
            LifecycleState::Constructed => {}
            LifecycleState::Mounting => return Err(LifecycleError::AlreadyMounting),
            LifecycleState::Unmounted => return Err(LifecycleError::Unmounted),
            LifecycleState::Mounted | LifecycleState::Patching => {
                return Err(LifecycleError::AlreadyMounted);
            }
        }
        debug!("mount started");

        let (mut component, config, source) = {
            let mut body = self
                .shared
                .body
                .try_borrow_mut()
                .map_err(|_| LifecycleError::Reentrant)?;
            self.shared.state.set(LifecycleState::Mounting);
            body.config = ParsedConfig::from_attributes(
                body.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
            let Some(component) = body.component.take() else {
                return Err(LifecycleError::Reentrant);
            };
            (component, body.config.clone(), body.style_source.clone())
        };

        let mut links = Vec::new();
        let references = component.stylesheets();
        if !references.is_empty() {
            if let Some(source) = source.as_deref() {
                for reference in &references {
                    match style::resolve(reference, source).await {
                        Ok(sheet) => links.push(LiveNode::stylesheet_link(sheet.reference())),
                        Err(err) => {
                            warn!(reference = %reference, error = %err, "skipping stylesheet");
                        }
                    }
                }
            } else {
                warn!("stylesheet references declared but no style source configured");
            }
        }

        // The only suspension point in the pipeline. The component is out
        // of the shared cell here, so `unmount` stays callable while the
        // hook is pending.
        component.setup(&config).await;

        let mut body = self
            .shared
            .body
            .try_borrow_mut()
            .map_err(|_| LifecycleError::Reentrant)?;
        if self.shared.state.get() == LifecycleState::Unmounted {
            debug!("mount abandoned: host unmounted while setup was pending");
            body.component = Some(component);
            return Ok(());
        }

        for link in links {
            let href = link
                .as_element()
                .and_then(|el| el.attribute("href"))
                .unwrap_or_default()
                .to_owned();
            let already_attached = body.container.iter().any(|node| {
                node.is_auxiliary()
                    && node.as_element().and_then(|el| el.attribute("href"))
                        == Some(href.as_str())
            });
            if !already_attached {
                body.container.push(link);
            }
        }

        let css = component.css();
        let css = css.trim();
        if !css.is_empty() {
            body.adopted = Some(Stylesheet::inline(css));
        }

        let tree = component.build(&body.config);
        body.container.push(LiveNode::materialize(&tree));
        body.component = Some(component);
        drop(body);

        self.rebind()?;
        {
            let mut body = self
                .shared
                .body
                .try_borrow_mut()
                .map_err(|_| LifecycleError::Reentrant)?;
            if let Some(component) = body.component.as_mut() {
                component.after_build();
            }
        }

        self.shared.state.set(LifecycleState::Mounted);
        debug!("mount complete");
        Ok(())
    }

    /// Re-runs the build hook and converges the live tree onto its result,
    /// then rebinds listeners and runs `after_patch`.
    ///
    /// # Errors
    ///
    /// Fails with [`LifecycleError::NotMounted`] before mount completes,
    /// with [`LifecycleError::RootCount`] when the container does not hold
    /// exactly one non-auxiliary root (checked before any mutation), and
    /// with [`LifecycleError::Reentrant`] when called from within a
    /// running lifecycle operation.
    pub fn patch(&self) -> Result<(), LifecycleError> {
        match self.shared.state.get() {
            LifecycleState::Mounted => {}
            LifecycleState::Patching => return Err(LifecycleError::Reentrant),
            LifecycleState::Unmounted => return Err(LifecycleError::Unmounted),
            LifecycleState::Constructed | LifecycleState::Mounting => {
                return Err(LifecycleError::NotMounted);
            }
        }

        let mut body = self
            .shared
            .body
            .try_borrow_mut()
            .map_err(|_| LifecycleError::Reentrant)?;
        self.shared.state.set(LifecycleState::Patching);
        debug!("patch started");

        let result = Self::build_and_reconcile(&mut body);
        drop(body);
        if let Err(err) = result {
            self.shared.state.set(LifecycleState::Mounted);
            return Err(err);
        }

        if let Err(err) = self.rebind() {
            self.shared.state.set(LifecycleState::Mounted);
            return Err(err);
        }

        {
            let mut body = self
                .shared
                .body
                .try_borrow_mut()
                .map_err(|_| LifecycleError::Reentrant)?;
            if let Some(component) = body.component.as_mut() {
                component.after_patch();
            }
        }

        self.shared.state.set(LifecycleState::Mounted);
        debug!("patch complete");
        Ok(())
    }

    fn build_and_reconcile(body: &mut Body<C>) -> Result<(), LifecycleError> {
        let roots = body
            .container
            .iter()
            .filter(|node| !node.is_auxiliary())
            .count();
        if roots != 1 {
            return Err(LifecycleError::RootCount(roots));
        }

        let Body {
            component,
            config,
            container,
            ..
        } = body;
        let Some(component) = component.as_mut() else {
            return Err(LifecycleError::Reentrant);
        };
        let tree = component.build(config);
        if let Some(root) = container.iter_mut().find(|node| !node.is_auxiliary()) {
            reconcile(root, &tree);
        }
        Ok(())
    }

    /// Removes the live tree and releases every binding this instance
    /// owns. This is the only path that prevents process-wide leakage of
    /// external bus registrations. Idempotent: unmounting twice is a safe
    /// no-op, and unmounting while a mount's setup hook is pending makes
    /// the in-flight mount abandon when it resumes.
    ///
    /// # Errors
    ///
    /// Fails only when re-entered from within a running lifecycle
    /// operation.
    pub fn unmount(&self) -> Result<(), LifecycleError> {
        match self.shared.state.get() {
            LifecycleState::Unmounted => return Ok(()),
            LifecycleState::Mounting => {
                self.shared.state.set(LifecycleState::Unmounted);
                debug!("unmounted while mount in flight");
                return Ok(());
            }
            _ => {}
        }

        let mut body = self
            .shared
            .body
            .try_borrow_mut()
            .map_err(|_| LifecycleError::Reentrant)?;
        for attached in body.external.drain(..) {
            bus::unlisten(&attached.topic, &attached.handler);
        }
        body.local.clear();
        body.container.clear();
        body.adopted = None;
        drop(body);

        self.shared.state.set(LifecycleState::Unmounted);
        debug!("unmount complete");
        Ok(())
    }

    /// Delivers a local event to the listeners bound at `target`.
    ///
    /// Handlers run one at a time against a snapshot of the bound set; a
    /// failing handler is reported and does not stop the rest. When any
    /// handler requested a patch, one patch runs after the dispatch.
    ///
    /// # Errors
    ///
    /// Fails when the host is not mounted or the dispatch re-enters a
    /// running lifecycle operation.
    pub fn dispatch<T: 'static>(
        &self,
        target: NodeId,
        event: &str,
        detail: T,
    ) -> Result<(), LifecycleError> {
        match self.shared.state.get() {
            LifecycleState::Mounted => {}
            LifecycleState::Unmounted => return Err(LifecycleError::Unmounted),
            _ => return Err(LifecycleError::NotMounted),
        }

        let payload = Payload::new(detail);
        let handlers: Vec<Handler<C>> = {
            let body = self
                .shared
                .body
                .try_borrow()
                .map_err(|_| LifecycleError::Reentrant)?;
            body.local
                .iter()
                .filter(|attached| attached.node == target && attached.event == event)
                .map(|attached| Rc::clone(&attached.handler))
                .collect()
        };

        let mut ctx = EventCtx::default();
        for handler in handlers {
            let mut body = self
                .shared
                .body
                .try_borrow_mut()
                .map_err(|_| LifecycleError::Reentrant)?;
            let Some(component) = body.component.as_mut() else {
                continue;
            };
            if let Err(err) = handler(component, &mut ctx, &payload) {
                error!(event, error = %err, "listener handler failed");
            }
        }

        if ctx.patch_requested() {
            self.patch()?;
        }
        Ok(())
    }

    /// Finds every element in the live subtree matching `selector`.
    ///
    /// # Errors
    ///
    /// Fails when called from within a running lifecycle operation.
    pub fn find_all(&self, selector: &str) -> Result<Vec<NodeId>, LifecycleError> {
        let selector = Selector::parse(selector);
        let body = self
            .shared
            .body
            .try_borrow()
            .map_err(|_| LifecycleError::Reentrant)?;
        let mut ids = Vec::new();
        for node in body.container.iter().filter(|node| !node.is_auxiliary()) {
            node.walk_elements(&mut |el| {
                if selector.matches(el) {
                    ids.push(el.id());
                }
            });
        }
        Ok(ids)
    }

    /// Finds the first element in the live subtree matching `selector`.
    ///
    /// # Errors
    ///
    /// Fails when called from within a running lifecycle operation.
    pub fn find_one(&self, selector: &str) -> Result<Option<NodeId>, LifecycleError> {
        Ok(self.find_all(selector)?.into_iter().next())
    }

    /// Runs `f` against the current non-auxiliary live root, if any.
    ///
    /// # Errors
    ///
    /// Fails when called from within a running lifecycle operation.
    pub fn with_root<R>(&self, f: impl FnOnce(Option<&LiveNode>) -> R) -> Result<R, LifecycleError> {
        let body = self
            .shared
            .body
            .try_borrow()
            .map_err(|_| LifecycleError::Reentrant)?;
        Ok(f(body.container.iter().find(|node| !node.is_auxiliary())))
    }

    /// Runs `f` against the full container, auxiliary nodes included.
    ///
    /// # Errors
    ///
    /// Fails when called from within a running lifecycle operation.
    pub fn with_container<R>(&self, f: impl FnOnce(&[LiveNode]) -> R) -> Result<R, LifecycleError> {
        let body = self
            .shared
            .body
            .try_borrow()
            .map_err(|_| LifecycleError::Reentrant)?;
        Ok(f(&body.container))
    }

    /// Runs `f` against the component instance.
    ///
    /// # Errors
    ///
    /// Fails when called from within a running lifecycle operation or
    /// while the instance is out for its setup hook.
    pub fn with_component<R>(&self, f: impl FnOnce(&C) -> R) -> Result<R, LifecycleError> {
        let body = self
            .shared
            .body
            .try_borrow()
            .map_err(|_| LifecycleError::Reentrant)?;
        body.component
            .as_ref()
            .map(f)
            .ok_or(LifecycleError::Reentrant)
    }

    /// The configuration decoded at mount.
    ///
    /// # Errors
    ///
    /// Fails when called from within a running lifecycle operation.
    pub fn parsed_config(&self) -> Result<ParsedConfig, LifecycleError> {
        let body = self
            .shared
            .body
            .try_borrow()
            .map_err(|_| LifecycleError::Reentrant)?;
        Ok(body.config.clone())
    }

    /// The stylesheet adopted from the component's `css()` hook, if any.
    ///
    /// # Errors
    ///
    /// Fails when called from within a running lifecycle operation.
    pub fn adopted_stylesheet(&self) -> Result<Option<Stylesheet>, LifecycleError> {
        let body = self
            .shared
            .body
            .try_borrow()
            .map_err(|_| LifecycleError::Reentrant)?;
        Ok(body.adopted.clone())
    }

    /// Drops all previous local and external attachments, then re-derives
    /// both sets from the component's declared bindings against the
    /// current live tree. Fresh wrappers every cycle keep removal aimed at
    /// exactly what this manager attached.
    fn rebind(&self) -> Result<(), LifecycleError> {
        let mut body = self
            .shared
            .body
            .try_borrow_mut()
            .map_err(|_| LifecycleError::Reentrant)?;
        let body = &mut *body;

        body.local.clear();
        for attached in body.external.drain(..) {
            bus::unlisten(&attached.topic, &attached.handler);
        }

        let Some(component) = body.component.as_ref() else {
            return Ok(());
        };
        let bindings = component.bindings();

        let root = body.container.iter().find(|node| !node.is_auxiliary());
        body.local = resolve_local(&bindings.local, root);

        let mut externals = Vec::with_capacity(bindings.external.len());
        for spec in bindings.external {
            let wrapped = self.wrap_external(&spec.topic, spec.handler);
            bus::listen(&spec.topic, Rc::clone(&wrapped));
            externals.push(AttachedExternal {
                topic: spec.topic,
                handler: wrapped,
            });
        }
        body.external = externals;

        debug!(
            local = body.local.len(),
            external = body.external.len(),
            "listeners rebound"
        );
        Ok(())
    }

    /// Adapts a declared external handler into a bus handler bound to this
    /// instance. Deliveries after unmount are ignored; bindings attached
    /// against a tree whose host went away stay removable because the next
    /// rebind or unmount still holds their identity.
    fn wrap_external(&self, topic: &str, handler: Handler<C>) -> BusHandler {
        let host = self.clone();
        let topic = topic.to_owned();
        Rc::new(move |payload: &Payload| {
            if host.shared.state.get() == LifecycleState::Unmounted {
                return Ok(());
            }
            let mut ctx = EventCtx::default();
            {
                let mut body = host
                    .shared
                    .body
                    .try_borrow_mut()
                    .map_err(|_| anyhow::anyhow!("component busy while handling `{topic}`"))?;
                let Some(component) = body.component.as_mut() else {
                    return Ok(());
                };
                handler(component, &mut ctx, payload)?;
            }
            if ctx.patch_requested() {
                host.patch().map_err(anyhow::Error::new)?;
            }
            Ok(())
        })
    }
}
