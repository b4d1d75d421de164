//! Built-in catalog actions.

pub mod park_telescope;
