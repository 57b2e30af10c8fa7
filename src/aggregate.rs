use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// The count of items in a subtree and the sum of their summands.
///
/// Every node caches the aggregate of its whole subtree, which is what makes
/// `count`, `sum`, rank and range counting O(log n).
///
/// # Examples
///
/// ```
/// use agg_btree::Aggregate;
///
/// let a = Aggregate::new(2, 3.0);
/// let b = Aggregate::new(1, 1.5);
/// assert_eq!(a + b, Aggregate::new(3, 4.5));
/// assert_eq!(a - b, Aggregate::new(1, 1.5));
/// assert_eq!([a, b].into_iter().sum::<Aggregate>(), Aggregate::new(3, 4.5));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Number of items.
    pub count: u64,
    /// Total of the items' summands.
    pub sum: f64,
}

impl Aggregate {
    pub const ZERO: Self = Self { count: 0, sum: 0.0 };

    #[must_use]
    pub const fn new(count: u64, sum: f64) -> Self {
        Self { count, sum }
    }
}

impl Add for Aggregate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            count: self.count + rhs.count,
            sum: self.sum + rhs.sum,
        }
    }
}

impl AddAssign for Aggregate {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Removes a contribution previously added.
///
/// # Panics
///
/// Panics in debug builds if `rhs.count > self.count`.
impl Sub for Aggregate {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            count: self.count - rhs.count,
            sum: self.sum - rhs.sum,
        }
    }
}

impl SubAssign for Aggregate {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Sum for Aggregate {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Aggregate> for Aggregate {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_sum_is_zero() {
        let empty: [Aggregate; 0] = [];
        assert_eq!(empty.iter().sum::<Aggregate>(), Aggregate::ZERO);
        assert_eq!(Aggregate::default(), Aggregate::ZERO);
    }

    proptest! {
        #[test]
        fn sub_undoes_add(a in (0u64..1 << 40, -1e6f64..1e6), b in (0u64..1 << 40, -1e6f64..1e6)) {
            let a = Aggregate::new(a.0, a.1.round());
            let b = Aggregate::new(b.0, b.1.round());
            prop_assert_eq!((a + b) - b, a);

            let mut c = a;
            c += b;
            c -= a;
            prop_assert_eq!(c, b);
        }
    }
}
