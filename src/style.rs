//! Stylesheet resolution and the process-wide compiled-sheet cache.
//!
//! Components declare stylesheet references; the host environment supplies
//! a [`StyleSource`] that can turn a reference into raw CSS text. Compiled
//! sheets are cached by reference, so every component asking for the same
//! reference shares one [`Stylesheet`]. While compiling from a remote
//! source, relative `url(...)` references inside the text are rewritten to
//! be absolute against the stylesheet's own location — references that are
//! already absolute, rooted or `data:`-embedded stay untouched.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use tracing::debug;

use crate::error::StyleError;

/// A compiled stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stylesheet {
    reference: String,
    css: String,
}

impl Stylesheet {
    /// The reference this sheet was resolved from. Empty for sheets
    /// adopted from a component's inline `css()` hook.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The compiled CSS text.
    #[must_use]
    pub fn css(&self) -> &str {
        &self.css
    }

    pub(crate) fn compile(reference: &str, text: &str) -> Self {
        Self {
            reference: reference.to_owned(),
            css: rewrite_relative_urls(text, reference),
        }
    }

    pub(crate) fn inline(css: &str) -> Self {
        Self {
            reference: String::new(),
            css: css.to_owned(),
        }
    }
}

/// The collaborator that turns a stylesheet reference into CSS text.
pub trait StyleSource {
    /// Fetches the raw text behind `reference`.
    fn fetch<'a>(&'a self, reference: &'a str) -> LocalBoxFuture<'a, Result<String, StyleError>>;
}

thread_local! {
    static CACHE: RefCell<HashMap<String, Rc<Stylesheet>>> = RefCell::new(HashMap::new());
}

/// Resolves `reference` through the process-wide cache, fetching and
/// compiling it on first use. Repeated calls for the same reference return
/// the same compiled sheet.
///
/// # Errors
///
/// Returns the source's [`StyleError`] when the text cannot be fetched;
/// nothing is cached in that case.
pub async fn resolve(
    reference: &str,
    source: &dyn StyleSource,
) -> Result<Rc<Stylesheet>, StyleError> {
    if let Some(sheet) = CACHE.with(|cache| cache.borrow().get(reference).cloned()) {
        debug!(reference, "stylesheet cache hit");
        return Ok(sheet);
    }

    let text = source.fetch(reference).await?;
    let sheet = Rc::new(Stylesheet::compile(reference, &text));
    CACHE.with(|cache| {
        cache
            .borrow_mut()
            .insert(reference.to_owned(), Rc::clone(&sheet));
    });
    debug!(reference, "stylesheet compiled and cached");
    Ok(sheet)
}

fn rewrite_relative_urls(css: &str, reference: &str) -> String {
    let base = reference
        .rfind('/')
        .map_or("", |index| &reference[..=index]);

    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(pos) = rest.find("url(") {
        let after = &rest[pos + 4..];
        let Some(end) = after.find(')') else {
            break;
        };
        out.push_str(&rest[..pos + 4]);
        let inner = &after[..end];
        let target = inner.trim().trim_matches(|c| c == '"' || c == '\'');
        if target.is_empty() || is_absolute(target) {
            out.push_str(inner);
        } else {
            out.push_str(base);
            out.push_str(target);
        }
        out.push(')');
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn is_absolute(target: &str) -> bool {
    target.starts_with('/') || target.starts_with("data:") || target.contains("://")
}
