//! Command implementations for the Strata CLI.

pub mod inspect;
pub mod score;
pub mod train;
