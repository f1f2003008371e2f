//! `And` / `Or` / `Not` combinators for snapshot predicates.

use predicates::{
    reflection::{Case, PredicateReflection},
    Predicate,
};

use std::fmt;

/// Case in which both child predicates must produce a case.
fn both_cases<'a, Item: ?Sized>(
    parent: &'a dyn PredicateReflection,
    first: &'a impl Predicate<Item>,
    second: &'a impl Predicate<Item>,
    expected: bool,
    variable: &Item,
) -> Option<Case<'a>> {
    let first = first.find_case(expected, variable)?;
    let second = second.find_case(expected, variable)?;
    let case = Case::new(Some(parent), expected)
        .add_child(first)
        .add_child(second);
    Some(case)
}

/// Case in which any child predicate producing a case is enough.
fn either_case<'a, Item: ?Sized>(
    parent: &'a dyn PredicateReflection,
    first: &'a impl Predicate<Item>,
    second: &'a impl Predicate<Item>,
    expected: bool,
    variable: &Item,
) -> Option<Case<'a>> {
    let child = first
        .find_case(expected, variable)
        .or_else(|| second.find_case(expected, variable))?;
    Some(Case::new(Some(parent), expected).add_child(child))
}

/// Boolean "and" combinator for snapshot predicates. Produced by the `&` operator
/// on the base predicates from this module, e.g. `method(eq("Get")) & direction(Direction::Inbound)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct And<T, U> {
    first: T,
    second: U,
}

impl<T: PredicateReflection, U: PredicateReflection> And<T, U> {
    pub(crate) fn new(first: T, second: U) -> Self {
        Self { first, second }
    }
}

impl<T: fmt::Display, U: fmt::Display> fmt::Display for And<T, U> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "({} && {})", self.first, self.second)
    }
}

impl<T: PredicateReflection, U: PredicateReflection> PredicateReflection for And<T, U> {}

impl<T, U, Item: ?Sized> Predicate<Item> for And<T, U>
where
    T: Predicate<Item>,
    U: Predicate<Item>,
{
    fn eval(&self, variable: &Item) -> bool {
        self.first.eval(variable) && self.second.eval(variable)
    }

    fn find_case(&self, expected: bool, variable: &Item) -> Option<Case<'_>> {
        if expected {
            both_cases(self, &self.first, &self.second, expected, variable)
        } else {
            either_case(self, &self.first, &self.second, expected, variable)
        }
    }
}

/// Boolean "or" combinator for snapshot predicates. Produced by the `|` operator
/// on the base predicates from this module, e.g. `status(Code::NotFound) | status(Code::Internal)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Or<T, U> {
    first: T,
    second: U,
}

impl<T: PredicateReflection, U: PredicateReflection> Or<T, U> {
    pub(crate) fn new(first: T, second: U) -> Self {
        Self { first, second }
    }
}

impl<T: fmt::Display, U: fmt::Display> fmt::Display for Or<T, U> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "({} || {})", self.first, self.second)
    }
}

impl<T: PredicateReflection, U: PredicateReflection> PredicateReflection for Or<T, U> {}

impl<T, U, Item: ?Sized> Predicate<Item> for Or<T, U>
where
    T: Predicate<Item>,
    U: Predicate<Item>,
{
    fn eval(&self, variable: &Item) -> bool {
        self.first.eval(variable) || self.second.eval(variable)
    }

    fn find_case(&self, expected: bool, variable: &Item) -> Option<Case<'_>> {
        if expected {
            either_case(self, &self.first, &self.second, expected, variable)
        } else {
            both_cases(self, &self.first, &self.second, expected, variable)
        }
    }
}

/// Boolean negation for snapshot predicates. Produced by the `!` operator
/// on the base predicates from this module, e.g. `!status(Code::Ok)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Not<T> {
    inner: T,
}

impl<T: PredicateReflection> Not<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: fmt::Display> fmt::Display for Not<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "!{}", self.inner)
    }
}

impl<T: PredicateReflection> PredicateReflection for Not<T> {}

impl<T, Item: ?Sized> Predicate<Item> for Not<T>
where
    T: Predicate<Item>,
{
    fn eval(&self, variable: &Item) -> bool {
        !self.inner.eval(variable)
    }

    fn find_case(&self, expected: bool, variable: &Item) -> Option<Case<'_>> {
        let child = self.inner.find_case(!expected, variable)?;
        Some(Case::new(Some(self), expected).add_child(child))
    }
}

macro_rules! impl_bool_ops {
    ($name:ident $(<$($ty_var:ident),+>)?) => {
        impl<Rhs, $($($ty_var,)+)?> core::ops::BitAnd<Rhs> for $name$(<$($ty_var,)+>)?
        where
            Self: predicates::reflection::PredicateReflection,
            Rhs: predicates::reflection::PredicateReflection,
        {
            type Output = $crate::predicates::And<Self, Rhs>;

            fn bitand(self, rhs: Rhs) -> Self::Output {
                $crate::predicates::And::new(self, rhs)
            }
        }

        impl<Rhs, $($($ty_var,)+)?> core::ops::BitOr<Rhs> for $name$(<$($ty_var,)+>)?
        where
            Self: predicates::reflection::PredicateReflection,
            Rhs: predicates::reflection::PredicateReflection,
        {
            type Output = $crate::predicates::Or<Self, Rhs>;

            fn bitor(self, rhs: Rhs) -> Self::Output {
                $crate::predicates::Or::new(self, rhs)
            }
        }

        impl<$($($ty_var,)+)?> core::ops::Not for $name$(<$($ty_var,)+>)?
        where
            Self: predicates::reflection::PredicateReflection,
        {
            type Output = $crate::predicates::Not<Self>;

            fn not(self) -> Self::Output {
                $crate::predicates::Not::new(self)
            }
        }
    };
}

impl_bool_ops!(And<T, U>);
impl_bool_ops!(Or<T, U>);
impl_bool_ops!(Not<T>);
