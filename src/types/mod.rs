//! Core types for thoughtline.

pub mod fragment;
pub mod generation;
pub mod results;
pub mod stream;
pub mod usage;

pub use fragment::*;
pub use generation::*;
pub use results::*;
pub use stream::*;
pub use usage::*;
