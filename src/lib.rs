//! Assigns colors from a candidate pool to the fixed semantic elements of a
//! theme, under constraints learned from a reference palette.

pub mod cli;
pub mod color;
pub mod constraints;
pub mod element;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod preview;
pub mod record;
