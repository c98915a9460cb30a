//! Vendor profiles and the command-variant catalog.
//!
//! A [`VendorProfile`] tells the shell automaton how to reach the CLI and
//! which command dumps the configuration; a [`CommandCatalog`] lists the
//! variants the prober tries, each with its [`ContentValidator`].

mod catalog;
mod definition;
mod validator;
pub mod vendors;

pub use catalog::{CommandAttempt, CommandCatalog};
pub use definition::{VendorFamily, VendorProfile};
pub use validator::{ContentValidator, MIN_CONFIG_LEN, Validation};
