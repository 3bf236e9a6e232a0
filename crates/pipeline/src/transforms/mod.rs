//! Built-in transforms.

pub mod accumulate;
pub mod annotate;
pub mod decode;
pub mod prefix;

pub use accumulate::{AccumulatorThresholds, TextAccumulator};
pub use annotate::Annotate;
pub use decode::{DecodeBytesToText, TextEncoding};
pub use prefix::PrefixText;
