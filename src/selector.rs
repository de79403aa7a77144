//! Minimal selector matching for local listener bindings.
//!
//! Supports exactly what binding resolution needs: a tag name, an `#id`,
//! any number of `.class` segments, compound forms such as
//! `button.primary#save`, and the universal `*`. Parsing is lenient and
//! never fails; an empty selector simply matches nothing.

use crate::node::LiveElement;

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    universal: bool,
}

impl Selector {
    /// Parses a selector string.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input == "*" {
            return Self {
                universal: true,
                ..Self::default()
            };
        }

        let mut selector = Self::default();
        let mut rest = input;
        while !rest.is_empty() {
            let (marker, tail) = match rest.as_bytes()[0] {
                b'#' => (Some('#'), &rest[1..]),
                b'.' => (Some('.'), &rest[1..]),
                _ => (None, rest),
            };
            let end = tail
                .find(['#', '.'])
                .unwrap_or(tail.len());
            let name = &tail[..end];
            rest = &tail[end..];
            if name.is_empty() {
                continue;
            }
            match marker {
                Some('#') => selector.id = Some(name.to_owned()),
                Some('.') => selector.classes.push(name.to_owned()),
                _ => selector.tag = Some(name.to_owned()),
            }
        }
        selector
    }

    /// Whether the element satisfies every segment of this selector.
    #[must_use]
    pub fn matches(&self, element: &LiveElement) -> bool {
        if self.universal {
            return true;
        }
        if self.tag.is_none() && self.id.is_none() && self.classes.is_empty() {
            return false;
        }
        if let Some(tag) = &self.tag
            && element.tag() != tag
        {
            return false;
        }
        if let Some(id) = &self.id
            && element.attribute("id") != Some(id)
        {
            return false;
        }
        if !self.classes.is_empty() {
            let class_attr = element.attribute("class").unwrap_or("");
            let classes: Vec<&str> = class_attr.split_whitespace().collect();
            if !self
                .classes
                .iter()
                .all(|class| classes.contains(&class.as_str()))
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{LiveNode, element};

    fn live_element(render: crate::node::RenderElement) -> LiveElement {
        match LiveNode::materialize(&render.into()) {
            LiveNode::Element(el) => el,
            LiveNode::Text(_) => unreachable!(),
        }
    }

    #[test]
    fn matches_by_tag() {
        let el = live_element(element("button"));
        assert!(Selector::parse("button").matches(&el));
        assert!(!Selector::parse("div").matches(&el));
    }

    #[test]
    fn matches_by_id_and_class() {
        let el = live_element(element("button").attr("id", "save").attr("class", "primary wide"));
        assert!(Selector::parse("#save").matches(&el));
        assert!(Selector::parse(".primary").matches(&el));
        assert!(Selector::parse(".primary.wide").matches(&el));
        assert!(Selector::parse("button.primary#save").matches(&el));
        assert!(!Selector::parse(".narrow").matches(&el));
        assert!(!Selector::parse("#other").matches(&el));
    }

    #[test]
    fn universal_matches_everything() {
        let el = live_element(element("p"));
        assert!(Selector::parse("*").matches(&el));
    }

    #[test]
    fn empty_selector_matches_nothing() {
        let el = live_element(element("p"));
        assert!(!Selector::parse("").matches(&el));
        assert!(!Selector::parse("  ").matches(&el));
    }
}
