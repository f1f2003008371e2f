//! Extension trait for asserting against collections of snapshots.

use predicates::Predicate;

use std::{borrow::Borrow, fmt, marker::PhantomData};

use crate::Captured;

/// Helper to wrap collections of [`CallSnapshot`]s or [`MethodSnapshot`]s so that they are
/// more convenient to use with `Predicate`s.
///
/// See [the module-level docs](crate::predicates) for examples of usage.
///
/// [`CallSnapshot`]: crate::CallSnapshot
/// [`MethodSnapshot`]: crate::MethodSnapshot
pub trait ScannerExt: IntoIterator + Sized {
    /// Type argument for the `Predicate`s used in the created [`Scanner`].
    type PredicateArg: Captured;
    /// Wraps this collection into a [`Scanner`].
    ///
    /// The collection is converted into an iterator on each call to the `Scanner`,
    /// so a `Scanner` over a slice is `Copy`.
    fn scanner(self) -> Scanner<Self::PredicateArg, Self>;
}

impl<'a, T: Captured + 'a, I: 'a + IntoIterator<Item = &'a T>> ScannerExt for I {
    type PredicateArg = T;

    fn scanner(self) -> Scanner<Self::PredicateArg, Self> {
        Scanner::new(self)
    }
}

/// Collection wrapper that allows using `Predicate`s rather than closures to find matching
/// snapshots, and panics with informative messages if the expectations are not met.
///
/// Returned by [`ScannerExt::scanner()`].
#[derive(Debug)]
pub struct Scanner<Item: ?Sized, I> {
    items: I,
    _item: PhantomData<fn() -> Item>,
}

impl<Item: ?Sized, I: Clone> Clone for Scanner<Item, I> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            _item: PhantomData,
        }
    }
}

impl<Item: ?Sized, I: Copy> Copy for Scanner<Item, I> {}

impl<Item, I: IntoIterator> Scanner<Item, I>
where
    Item: fmt::Debug + ?Sized,
    I::Item: Borrow<Item>,
{
    fn new(items: I) -> Self {
        Self {
            items,
            _item: PhantomData,
        }
    }

    /// Finds the single item matching the predicate.
    ///
    /// # Panics
    ///
    /// Panics if no items, or multiple items match the predicate.
    pub fn single<P: Predicate<Item> + ?Sized>(self, predicate: &P) -> I::Item {
        let mut matching = self
            .items
            .into_iter()
            .filter(|item| predicate.eval(item.borrow()));
        let first = matching
            .next()
            .unwrap_or_else(|| panic!("no items have matched predicate {predicate}"));
        if let Some(second) = matching.next() {
            panic!(
                "multiple items match predicate {predicate}: {:#?}",
                [first.borrow(), second.borrow()]
            );
        }
        first
    }

    /// Finds the first item matching the predicate.
    ///
    /// # Panics
    ///
    /// Panics if no items match the predicate.
    pub fn first<P: Predicate<Item> + ?Sized>(self, predicate: &P) -> I::Item {
        self.items
            .into_iter()
            .find(|item| predicate.eval(item.borrow()))
            .unwrap_or_else(|| panic!("no items have matched predicate {predicate}"))
    }

    /// Checks that all items match the predicate.
    ///
    /// # Panics
    ///
    /// Panics with the first non-matching item if there is one.
    pub fn all<P: Predicate<Item> + ?Sized>(self, predicate: &P) {
        let mismatch = self
            .items
            .into_iter()
            .find(|item| !predicate.eval(item.borrow()));
        if let Some(item) = mismatch {
            panic!(
                "item does not match predicate {predicate}: {:#?}",
                item.borrow()
            );
        }
    }

    /// Counts items matching the predicate.
    pub fn count<P: Predicate<Item> + ?Sized>(self, predicate: &P) -> usize {
        self.items
            .into_iter()
            .filter(|item| predicate.eval(item.borrow()))
            .count()
    }
}

impl<Item, I: IntoIterator> Scanner<Item, I>
where
    Item: fmt::Debug + ?Sized,
    I::Item: Borrow<Item>,
    I::IntoIter: DoubleEndedIterator,
{
    /// Finds the last item matching the predicate.
    ///
    /// # Panics
    ///
    /// Panics if no items match the predicate.
    pub fn last<P: Predicate<Item> + ?Sized>(self, predicate: &P) -> I::Item {
        self.items
            .into_iter()
            .rev()
            .find(|item| predicate.eval(item.borrow()))
            .unwrap_or_else(|| panic!("no items have matched predicate {predicate}"))
    }
}
