//! CouchDB backend for docbank.
//!
//! [`CouchDbDatabank`] implements [`docbank_storage::Databank`] on top of a
//! single CouchDB database:
//! - `(kind, id)` pairs map to document ids via [`document_key`]
//! - CouchDB `not_found`/`conflict` become `NoSuchThing`/`AlreadyExists`,
//!   every other failure is wrapped once with a message naming the operation
//! - search compiles criteria into a temporary map query ([`ViewQuery`])
//!
//! The database itself is reached through the [`CouchDatabase`] trait, with
//! an HTTP implementation ([`HttpCouchDatabase`]) and an in-process one
//! ([`MemoryCouch`]) for tests.

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod key;
pub mod memory;
pub mod operation;
pub mod view;

pub use adapter::CouchDbDatabank;
pub use client::{AllDocsRow, Connector, CouchDatabase, DatabaseInfo, Document, ViewRow};
pub use config::{ConfigLayer, CouchConfig, DEFAULT_LOCATION};
pub use error::{ConfigError, CouchError, CouchResult};
pub use http::{HttpConnector, HttpCouchDatabase};
pub use key::{document_key, kind_prefix, SEPARATOR};
pub use memory::{CouchCall, MemoryCouch, MemoryCouchDatabase};
pub use operation::{Failure, Operation};
pub use view::ViewQuery;
