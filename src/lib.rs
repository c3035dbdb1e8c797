//! Catalog and evaluation protocols for the polarimetric thermal face dataset.
//!
//! The dataset directory tree is ingested by [`scanner::Scanner`] into a
//! SQLite catalog ([`db::Database`]). [`protocols::ProtocolBuilder`] then
//! writes the named evaluation protocols, which are read back through
//! [`db::Database::query`] or exported per model with [`export`].

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod logging;
pub mod model;
pub mod protocols;
pub mod scanner;

pub use db::{Database, UnitOfWork};
pub use error::{Error, Result};
pub use model::{Annotation, Capture, Client, Condition, File, Group, Modality, Polarization, Purpose};
pub use protocols::{ProtocolBuilder, SearchParams};
