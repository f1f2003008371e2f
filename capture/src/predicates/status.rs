//! `status()` predicate factory.

use predicates::{
    reflection::{Case, PredicateReflection, Product},
    Predicate,
};

use std::fmt;

use crate::{CallSnapshot, Code};

/// Conversion into a predicate for [`Code`]s used in the [`status()`] function.
pub trait IntoStatusPredicate {
    /// Predicate output of the conversion. The exact type should be considered an implementation
    /// detail and should not be relied upon.
    type Predicate: Predicate<Code>;
    /// Performs the conversion.
    fn into_predicate(self) -> Self::Predicate;
}

impl<P: Predicate<Code>> IntoStatusPredicate for [P; 1] {
    type Predicate = P;

    fn into_predicate(self) -> Self::Predicate {
        let [predicate] = self;
        predicate
    }
}

impl IntoStatusPredicate for Code {
    type Predicate = predicates::ord::EqPredicate<Code>;

    fn into_predicate(self) -> Self::Predicate {
        predicates::ord::eq(self)
    }
}

/// Creates a predicate for the status [`Code`] of a completed [`CallSnapshot`].
/// Calls that are not completed never match the predicate.
///
/// # Arguments
///
/// The argument of this function may be:
///
/// - [`Code`]: will be compared exactly
/// - Any `Predicate` for [`Code`]. To bypass Rust orphaning rules, the predicate
///   must be enclosed in square brackets (i.e., a one-value array).
///
/// # Examples
///
/// ```
/// # use predicates::ord::ne;
/// # use rpcz_capture::{
/// #     predicates::{status, ScannerExt}, CallContext, Code, Direction, SharedRegistry, Status,
/// # };
/// let registry = SharedRegistry::default();
/// let context = CallContext::new();
/// let call = registry.begin_call("/test.Store/Get", Direction::Inbound, &context, None);
/// call.complete(Status::new(Code::NotFound, "no such key"), None, None);
/// registry.begin_call("/test.Store/Get", Direction::Inbound, &context, None);
///
/// let snapshot = registry.snapshot();
/// let calls = snapshot.methods()[0].calls().scanner();
/// let failed = calls.single(&status([ne(Code::Ok)]));
/// assert_eq!(failed.status().unwrap().message(), "no such key");
/// // The second call is not completed and does not match either predicate.
/// assert_eq!(calls.count(&(status(Code::Ok) | status(Code::NotFound))), 1);
/// ```
pub fn status<P: IntoStatusPredicate>(matches: P) -> StatusPredicate<P::Predicate> {
    StatusPredicate {
        matches: matches.into_predicate(),
    }
}

/// Predicate for the status [`Code`] of a [`CallSnapshot`] returned by the [`status()`] function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPredicate<P> {
    matches: P,
}

impl_bool_ops!(StatusPredicate<P>);

impl<P: Predicate<Code>> fmt::Display for StatusPredicate<P> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "status({})", self.matches)
    }
}

impl<P: Predicate<Code>> PredicateReflection for StatusPredicate<P> {}

impl<P: Predicate<Code>> Predicate<CallSnapshot> for StatusPredicate<P> {
    fn eval(&self, variable: &CallSnapshot) -> bool {
        variable
            .status()
            .is_some_and(|status| self.matches.eval(&status.code()))
    }

    fn find_case(&self, expected: bool, variable: &CallSnapshot) -> Option<Case<'_>> {
        if let Some(status) = variable.status() {
            let child = self.matches.find_case(expected, &status.code())?;
            Some(Case::new(Some(self), expected).add_child(child))
        } else if expected {
            None
        } else {
            let product = Product::new("status", "(in progress)");
            Some(Case::new(Some(self), expected).add_product(product))
        }
    }
}
