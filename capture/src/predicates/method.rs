//! `method()` predicate factory.

use predicates::{
    reflection::{Case, PredicateReflection},
    Predicate,
};

use std::fmt;

use crate::MethodSnapshot;

/// Creates a predicate for the unqualified name of a [`MethodSnapshot`]
/// (e.g., `/pkg.Service/Method`).
///
/// # Arguments
///
/// The argument of this function can be any `str`ing predicate, e.g. `eq("/test.Echo/Say")`
/// for exact comparison.
///
/// # Examples
///
/// ```
/// # use predicates::{ord::eq, str::ends_with};
/// # use rpcz_capture::{predicates::{method, ScannerExt}, CallContext, Direction, SharedRegistry};
/// let registry = SharedRegistry::default();
/// let context = CallContext::new();
/// registry.begin_call("/test.Echo/Say", Direction::Inbound, &context, None);
/// registry.begin_call("/test.Echo/Shout", Direction::Inbound, &context, None);
///
/// let snapshot = registry.snapshot();
/// let methods = snapshot.methods().scanner();
/// let say = methods.single(&method(eq("/test.Echo/Say")));
/// assert_eq!(say.calls().len(), 1);
/// let _ = methods.single(&method(ends_with("/Shout")));
/// ```
pub fn method<P: Predicate<str>>(matches: P) -> MethodPredicate<P> {
    MethodPredicate { matches }
}

/// Predicate for the name of a [`MethodSnapshot`] returned by the [`method()`] function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodPredicate<P> {
    matches: P,
}

impl_bool_ops!(MethodPredicate<P>);

impl<P: Predicate<str>> fmt::Display for MethodPredicate<P> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "method({})", self.matches)
    }
}

impl<P: Predicate<str>> PredicateReflection for MethodPredicate<P> {}

impl<P: Predicate<str>> Predicate<MethodSnapshot> for MethodPredicate<P> {
    fn eval(&self, variable: &MethodSnapshot) -> bool {
        self.matches.eval(variable.method())
    }

    fn find_case(&self, expected: bool, variable: &MethodSnapshot) -> Option<Case<'_>> {
        let child = self.matches.find_case(expected, variable.method())?;
        Some(Case::new(Some(self), expected).add_child(child))
    }
}
