//! Exclusion matching: Rust has no runtime exception hierarchy, so "category
//! or any refinement thereof" is modeled explicitly as an ordered path of
//! tags, with one category "refining" another if the other is a prefix of
//! it (e.g. `["io", "timeout"]` refines `["io"]`).

use std::fmt;

/// An error's place in a notional hierarchy, expressed as a path of tags
/// from the root category down to the most specific one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category(Vec<&'static str>);

impl Category {
    /// Builds a category from a root-to-leaf path, e.g. `Category::new(&["io", "timeout"])`.
    pub fn new(path: &[&'static str]) -> Self {
        assert!(!path.is_empty(), "a category path must not be empty");
        Category(path.to_vec())
    }

    /// `true` if `self` is `ancestor` or a refinement of it, i.e. `ancestor`'s
    /// path is a prefix of `self`'s path.
    pub fn is_or_refines(&self, ancestor: &Category) -> bool {
        self.0.len() >= ancestor.0.len() && self.0[..ancestor.0.len()] == ancestor.0[..]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Implemented by the error type a `Breaker` wraps, so the exclusion list
/// can decide whether a given error should be accounted as a failure.
pub trait ExceptionClass {
    /// This error's category.
    fn category(&self) -> Category;
}

/// `true` if any entry in `excluded` is an ancestor of (or equal to) `category`.
pub(crate) fn is_excluded(excluded: &[Category], category: &Category) -> bool {
    excluded.iter().any(|ancestor| category.is_or_refines(ancestor))
}
