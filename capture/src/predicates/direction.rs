//! `direction()` predicate factory.

use predicates::{
    reflection::{Case, PredicateReflection, Product},
    Predicate,
};

use std::fmt;

use crate::{CallSnapshot, Direction, MethodSnapshot};

/// Creates a predicate for the [`Direction`] of a [`MethodSnapshot`] or [`CallSnapshot`].
///
/// # Examples
///
/// ```
/// # use rpcz_capture::{
/// #     predicates::{direction, ScannerExt}, CallContext, Direction, SharedRegistry,
/// # };
/// let registry = SharedRegistry::default();
/// let context = CallContext::new();
/// registry.begin_call("/test.Echo/Say", Direction::Inbound, &context, None);
/// registry.begin_call("/test.Echo/Say", Direction::Outbound, &context, None);
///
/// let snapshot = registry.snapshot();
/// let server_side = snapshot.methods().scanner().single(&direction(Direction::Inbound));
/// assert_eq!(server_side.name(), "recv: /test.Echo/Say");
/// ```
pub fn direction(expected: Direction) -> DirectionPredicate {
    DirectionPredicate { expected }
}

/// Predicate for the [`Direction`] of a [`MethodSnapshot`] or [`CallSnapshot`] returned by
/// the [`direction()`] function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionPredicate {
    expected: Direction,
}

impl_bool_ops!(DirectionPredicate);

impl fmt::Display for DirectionPredicate {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "direction == {}", self.expected)
    }
}

impl PredicateReflection for DirectionPredicate {}

impl DirectionPredicate {
    fn case(&self, expected: bool, actual: Direction) -> Option<Case<'_>> {
        if (actual == self.expected) == expected {
            let product = Product::new("direction", actual.as_str());
            Some(Case::new(Some(self), expected).add_product(product))
        } else {
            None
        }
    }
}

impl Predicate<MethodSnapshot> for DirectionPredicate {
    fn eval(&self, variable: &MethodSnapshot) -> bool {
        variable.direction() == self.expected
    }

    fn find_case(&self, expected: bool, variable: &MethodSnapshot) -> Option<Case<'_>> {
        self.case(expected, variable.direction())
    }
}

impl Predicate<CallSnapshot> for DirectionPredicate {
    fn eval(&self, variable: &CallSnapshot) -> bool {
        variable.direction() == self.expected
    }

    fn find_case(&self, expected: bool, variable: &CallSnapshot) -> Option<Case<'_>> {
        self.case(expected, variable.direction())
    }
}
