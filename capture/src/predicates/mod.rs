//! Predicates for [`MethodSnapshot`]s and [`CallSnapshot`]s.
//!
//! # Overview
//!
//! A predicate can be created with the functions from this module:
//!
//! - [`method()`] checks the method name
//! - [`direction()`] checks the method / call direction
//! - [`status()`] checks the status code of a completed call
//! - [`peer()`] checks the remote party address of a call
//!
//! These predicates can be combined with bitwise operators, `&`, `|` and `!`.
//! The [`ScannerExt`] trait may be used to simplify assertions with predicates.
//!
//! [`MethodSnapshot`]: crate::MethodSnapshot
//! [`CallSnapshot`]: crate::CallSnapshot
//!
//! # Examples
//!
//! ```
//! # use predicates::str::starts_with;
//! # use rpcz_capture::{predicates::*, Code, Direction, Snapshot};
//! # fn test_wrapper(snapshot: &Snapshot) {
//! // Predicates can be combined using bitwise operators:
//! let predicate = method(starts_with("/test.Store/")) & direction(Direction::Inbound);
//! let snapshot: &Snapshot = // ...
//! #   snapshot;
//! let store_method = snapshot.methods().scanner().first(&predicate);
//! let _ = store_method.calls().scanner().single(&!status(Code::Ok));
//!
//! // ...or converted back to a closure:
//! let predicate = into_fn(status(Code::Unavailable));
//! let _ = snapshot.calls().filter(|&call| predicate(call));
//! # }
//! ```

use predicates::Predicate;

#[macro_use]
mod combinators;
mod direction;
mod ext;
mod method;
mod peer;
mod status;


pub use self::{
    combinators::{And, Not, Or},
    direction::{direction, DirectionPredicate},
    ext::{Scanner, ScannerExt},
    method::{method, MethodPredicate},
    peer::{peer, IntoPeerPredicate, PeerPredicate},
    status::{status, IntoStatusPredicate, StatusPredicate},
};

/// Converts a predicate into an `Fn(_) -> bool` closure.
///
/// This can be used in APIs (e.g., [`Iterator`] combinators) that expect a closure
/// as an argument.
pub fn into_fn<Item>(predicate: impl Predicate<Item>) -> impl Fn(&Item) -> bool {
    move |variable| predicate.eval(variable)
}
