//! `peer()` predicate factory.

use predicates::{
    reflection::{Case, PredicateReflection, Product},
    Predicate,
};

use std::{fmt, net::SocketAddr};

use crate::CallSnapshot;

/// Conversion into a predicate for peer addresses used in the [`peer()`] function.
pub trait IntoPeerPredicate {
    /// Predicate output of the conversion. The exact type should be considered an implementation
    /// detail and should not be relied upon.
    type Predicate: Predicate<SocketAddr>;
    /// Performs the conversion.
    fn into_predicate(self) -> Self::Predicate;
}

impl<P: Predicate<SocketAddr>> IntoPeerPredicate for [P; 1] {
    type Predicate = P;

    fn into_predicate(self) -> Self::Predicate {
        let [predicate] = self;
        predicate
    }
}

impl IntoPeerPredicate for SocketAddr {
    type Predicate = predicates::ord::EqPredicate<SocketAddr>;

    fn into_predicate(self) -> Self::Predicate {
        predicates::ord::eq(self)
    }
}

/// Creates a predicate for the remote party address of a [`CallSnapshot`]. Calls without
/// a known peer never match the predicate.
///
/// # Arguments
///
/// The argument of this function may be a [`SocketAddr`] compared exactly, or any `Predicate`
/// for [`SocketAddr`] enclosed in square brackets (i.e., a one-value array).
///
/// # Examples
///
/// ```
/// # use std::net::SocketAddr;
/// # use predicates::function::function;
/// # use rpcz_capture::{predicates::{peer, ScannerExt}, CallContext, Direction, SharedRegistry};
/// let registry = SharedRegistry::default();
/// let addr: SocketAddr = "10.0.0.1:50051".parse()?;
/// let context = CallContext::new().with_peer(addr);
/// registry.begin_call("/test.Echo/Say", Direction::Inbound, &context, None);
///
/// let snapshot = registry.snapshot();
/// let calls = snapshot.methods()[0].calls().scanner();
/// let _ = calls.single(&peer(addr));
/// let is_private = function(|addr: &SocketAddr| match addr {
///     SocketAddr::V4(addr) => addr.ip().is_private(),
///     SocketAddr::V6(_) => false,
/// });
/// let _ = calls.single(&peer([is_private]));
/// # Ok::<_, std::net::AddrParseError>(())
/// ```
pub fn peer<P: IntoPeerPredicate>(matches: P) -> PeerPredicate<P::Predicate> {
    PeerPredicate {
        matches: matches.into_predicate(),
    }
}

/// Predicate for the peer address of a [`CallSnapshot`] returned by the [`peer()`] function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerPredicate<P> {
    matches: P,
}

impl_bool_ops!(PeerPredicate<P>);

impl<P: Predicate<SocketAddr>> fmt::Display for PeerPredicate<P> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "peer({})", self.matches)
    }
}

impl<P: Predicate<SocketAddr>> PredicateReflection for PeerPredicate<P> {}

impl<P: Predicate<SocketAddr>> Predicate<CallSnapshot> for PeerPredicate<P> {
    fn eval(&self, variable: &CallSnapshot) -> bool {
        variable.peer().is_some_and(|addr| self.matches.eval(&addr))
    }

    fn find_case(&self, expected: bool, variable: &CallSnapshot) -> Option<Case<'_>> {
        if let Some(addr) = variable.peer() {
            let child = self.matches.find_case(expected, &addr)?;
            Some(Case::new(Some(self), expected).add_child(child))
        } else if expected {
            None
        } else {
            let product = Product::new("peer", "(unknown)");
            Some(Case::new(Some(self), expected).add_product(product))
        }
    }
}
