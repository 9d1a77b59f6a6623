//! Byte-range math: splitting a download into slices and choosing how many.

mod range;

pub use range::{plan_slices, slice_count_for_length, Slice};
