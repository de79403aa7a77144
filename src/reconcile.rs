//! In-place tree reconciliation.
//!
//! [`reconcile`] converges a mounted [`LiveNode`] subtree onto the shape a
//! build pass described, preserving node identity wherever the patch can be
//! applied in place. The walk is depth-first, top-down and synchronous, and
//! there is no keyed matching: reordering a child list is indistinguishable
//! from replacing it.

use crate::node::{CONFIG_ATTRIBUTE_PREFIX, LiveElement, LiveNode, RenderElement, RenderNode};

/// Mutates `old` so that its observable shape matches `new`.
///
/// Replacement is always a valid outcome, so this never fails. Identity
/// ([`NodeId`](crate::node::NodeId)) survives in-place patches and changes
/// on replacement.
pub fn reconcile(old: &mut LiveNode, new: &RenderNode) {
    if needs_replacement(old, new) {
        *old = LiveNode::materialize(new);
        return;
    }

    match (old, new) {
        (LiveNode::Text(live), RenderNode::Text(value)) => {
            if live.value != *value {
                live.value.clone_from(value);
            }
        }
        (LiveNode::Element(live), RenderNode::Element(next)) => patch_element(live, next),
        // Kind mismatches were handled by replacement above.
        _ => {}
    }
}

/// A node must be replaced wholesale when its kind or tag differs, or when
/// any configuration attribute changed. Configuration attributes carry
/// structured per-instance data, and a change there usually invalidates
/// descendant state that an attribute patch cannot repair.
fn needs_replacement(old: &LiveNode, new: &RenderNode) -> bool {
    match (old, new) {
        (LiveNode::Text(_), RenderNode::Text(_)) => false,
        (LiveNode::Element(live), RenderNode::Element(next)) => {
            live.tag != next.tag || config_attributes_changed(live, next)
        }
        _ => true,
    }
}

fn config_attributes_changed(live: &LiveElement, next: &RenderElement) -> bool {
    let mut live_count = 0;
    for (name, value) in &live.attributes {
        if !name.starts_with(CONFIG_ATTRIBUTE_PREFIX) {
            continue;
        }
        live_count += 1;
        if next.attributes.get(name) != Some(value) {
            return true;
        }
    }
    let next_count = next
        .attributes
        .keys()
        .filter(|name| name.starts_with(CONFIG_ATTRIBUTE_PREFIX))
        .count();
    live_count != next_count
}

fn patch_element(live: &mut LiveElement, next: &RenderElement) {
    sync_attributes(live, next);

    if live.value != next.value {
        live.value.clone_from(&next.value);
    }

    // Opaque composites own their internals; stop at the boundary.
    if live.opaque || next.opaque {
        return;
    }

    if child_signature_differs(&live.children, &next.children) {
        live.children = next.children.iter().map(LiveNode::materialize).collect();
    } else {
        for (old_child, new_child) in live.children.iter_mut().zip(&next.children) {
            reconcile(old_child, new_child);
        }
    }
}

/// Attributes converge to exactly `next`'s set, values and order.
fn sync_attributes(live: &mut LiveElement, next: &RenderElement) {
    if !live.attributes.iter().eq(&next.attributes) {
        live.attributes = next.attributes.clone();
    }
}

/// The child list is rebuilt from scratch when the count differs or the
/// positional sequence of kinds/tags diverges anywhere.
fn child_signature_differs(old: &[LiveNode], new: &[RenderNode]) -> bool {
    old.len() != new.len() || old.iter().zip(new).any(|(o, n)| !same_kind(o, n))
}

fn same_kind(old: &LiveNode, new: &RenderNode) -> bool {
    match (old, new) {
        (LiveNode::Text(_), RenderNode::Text(_)) => true,
        (LiveNode::Element(o), RenderNode::Element(n)) => o.tag == n.tag,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{element, text};

    fn live(render: impl Into<RenderNode>) -> LiveNode {
        LiveNode::materialize(&render.into())
    }

    #[test]
    fn text_update_preserves_identity() {
        let mut old = live(element("div").attr("id", "a").text("Hello"));
        let before = old.clone();
        reconcile(
            &mut old,
            &element("div").attr("id", "a").attr("class", "x").text("World").into(),
        );

        assert_eq!(old.id(), before.id());
        let el = old.as_element().unwrap();
        assert_eq!(el.attribute("id"), Some("a"));
        assert_eq!(el.attribute("class"), Some("x"));
        let child = el.children()[0].as_text().unwrap();
        assert_eq!(child.value(), "World");
        assert_eq!(child.id(), before.as_element().unwrap().children()[0].id());
    }

    #[test]
    fn tag_change_replaces_node() {
        let mut old = live(element("div").attr("id", "a"));
        let before_id = old.id();
        reconcile(&mut old, &element("span").into());

        assert_ne!(old.id(), before_id);
        let el = old.as_element().unwrap();
        assert_eq!(el.tag(), "span");
        assert_eq!(el.attribute("id"), None);
    }

    #[test]
    fn kind_change_replaces_node() {
        let mut old = live(element("div"));
        reconcile(&mut old, &text("plain"));
        assert_eq!(old.as_text().unwrap().value(), "plain");
    }

    #[test]
    fn attributes_converge_exactly() {
        let mut old = live(element("div").attr("a", "1").attr("b", "2").attr("c", "3"));
        reconcile(
            &mut old,
            &element("div").attr("b", "changed").attr("d", "4").into(),
        );

        let attrs = old.as_element().unwrap().attributes();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("b").map(String::as_str), Some("changed"));
        assert_eq!(attrs.get("d").map(String::as_str), Some("4"));
    }

    #[test]
    fn attribute_order_follows_the_new_tree() {
        let mut old = live(element("div").attr("a", "1").attr("b", "2"));
        let before_id = old.id();
        reconcile(&mut old, &element("div").attr("b", "2").attr("a", "1").into());

        assert_eq!(old.id(), before_id);
        let keys: Vec<_> = old.as_element().unwrap().attributes().keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn bound_value_is_synced() {
        let mut old = live(element("input").value("draft"));
        reconcile(&mut old, &element("input").value("final").into());
        assert_eq!(old.as_element().unwrap().value(), Some("final"));
    }

    #[test]
    fn child_count_mismatch_rebuilds_whole_level() {
        let mut old = live(
            element("ul")
                .child(element("li").text("a"))
                .child(element("li").text("b")),
        );
        let first_id = old.as_element().unwrap().children()[0].id();
        reconcile(&mut old, &element("ul").child(element("li").text("a")).into());

        let el = old.as_element().unwrap();
        assert_eq!(el.children().len(), 1);
        // The surviving "a" item is a rebuild, not the original node.
        assert_ne!(el.children()[0].id(), first_id);
    }

    #[test]
    fn matching_signature_patches_children_pairwise() {
        let mut old = live(
            element("ul")
                .child(element("li").text("a"))
                .child(element("li").text("b")),
        );
        let ids: Vec<_> = old
            .as_element()
            .unwrap()
            .children()
            .iter()
            .map(LiveNode::id)
            .collect();
        reconcile(
            &mut old,
            &element("ul")
                .child(element("li").text("a"))
                .child(element("li").text("c"))
                .into(),
        );

        let el = old.as_element().unwrap();
        let new_ids: Vec<_> = el.children().iter().map(LiveNode::id).collect();
        assert_eq!(ids, new_ids);
        let second = el.children()[1].as_element().unwrap();
        assert_eq!(second.children()[0].as_text().unwrap().value(), "c");
    }

    #[test]
    fn config_attribute_change_forces_replacement() {
        let mut old = live(element("div").attr("data-id", "1").child(element("span")));
        let before_id = old.id();
        reconcile(
            &mut old,
            &element("div").attr("data-id", "2").child(element("span")).into(),
        );
        assert_ne!(old.id(), before_id);
        assert_eq!(old.as_element().unwrap().attribute("data-id"), Some("2"));
    }

    #[test]
    fn config_attribute_removal_forces_replacement() {
        let mut old = live(element("div").attr("data-id", "1"));
        let before_id = old.id();
        reconcile(&mut old, &element("div").into());
        assert_ne!(old.id(), before_id);
    }

    #[test]
    fn unchanged_config_attribute_patches_in_place() {
        let mut old = live(element("div").attr("data-id", "1").attr("class", "a"));
        let before_id = old.id();
        reconcile(
            &mut old,
            &element("div").attr("data-id", "1").attr("class", "b").into(),
        );
        assert_eq!(old.id(), before_id);
        assert_eq!(old.as_element().unwrap().attribute("class"), Some("b"));
    }

    #[test]
    fn opaque_composites_keep_their_internals() {
        let mut old = live(element("x-widget").opaque().child(element("div").text("state")));
        reconcile(
            &mut old,
            &element("x-widget").opaque().attr("class", "wide").into(),
        );

        let el = old.as_element().unwrap();
        assert_eq!(el.attribute("class"), Some("wide"));
        assert_eq!(el.children().len(), 1);
        let inner = el.children()[0].as_element().unwrap();
        assert_eq!(inner.children()[0].as_text().unwrap().value(), "state");
    }

    #[test]
    fn reconcile_is_idempotent() {
        let target: RenderNode = element("div")
            .attr("class", "x")
            .child(element("p").text("body"))
            .into();
        let mut old = live(element("div").text("stale"));
        reconcile(&mut old, &target);
        let once = old.clone();
        reconcile(&mut old, &target);
        assert_eq!(old, once);
    }
}
