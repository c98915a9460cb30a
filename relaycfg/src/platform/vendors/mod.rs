//! Built-in vendor profiles.

pub mod cisco;
pub mod juniper;
