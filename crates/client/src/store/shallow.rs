//! Shallow equality used for change detection.
//!
//! Scalars and strings compare by value. Shared composites compare by
//! identity: a selector that wants subscribers to re-run must hand out a new
//! `Arc`, and one that returns the same `Arc` is treated as unchanged even if
//! someone mutated through interior mutability.

use std::sync::Arc;

use chrono::{DateTime, TimeZone};

pub trait ShallowEq {
    fn shallow_eq(&self, other: &Self) -> bool;
}

/// Implements [`ShallowEq`] as plain `==` for value-like types.
#[macro_export]
macro_rules! shallow_eq_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::store::ShallowEq for $ty {
                fn shallow_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

shallow_eq_by_value!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
    f32,
    f64,
    String,
    &'static str,
    serde_json::Value,
    gruzreis_shared::CargoStatus,
);

impl<T: ?Sized> ShallowEq for Arc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ShallowEq> ShallowEq for Option<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.shallow_eq(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<Tz: TimeZone> ShallowEq for DateTime<Tz> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self == other
    }
}

impl<A: ShallowEq, B: ShallowEq> ShallowEq for (A, B) {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.0.shallow_eq(&other.0) && self.1.shallow_eq(&other.1)
    }
}

impl<A: ShallowEq, B: ShallowEq, C: ShallowEq> ShallowEq for (A, B, C) {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.0.shallow_eq(&other.0) && self.1.shallow_eq(&other.1) && self.2.shallow_eq(&other.2)
    }
}
