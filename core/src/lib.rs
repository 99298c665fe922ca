//! Synchronous client for an entity-oriented JSON REST service.
//!
//! # Overview
//! Reads, lists, counts, deletes and batch-writes records of named remote
//! entities. Every response is wrapped in an envelope
//! (`{"response": {"status": .., ...}}`) that is validated before its payload
//! is returned.
//!
//! # Design
//! - `EntityClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network.
//! - `Transport` performs the round-trip; `UreqTransport` is the blocking
//!   implementation used in production.
//! - `EntityService` joins the two and exposes the operations.
//! - Per-call behaviour (`CallOptions`) is passed explicitly, so a shared
//!   service carries no mutable session state.

pub mod batch;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod http;
pub mod mapping;
pub mod query;
pub mod service;
pub mod transport;
pub mod types;

pub use batch::{BatchOutcome, RowOutcome};
pub use client::EntityClient;
pub use config::{CallOptions, Credentials, ServiceConfig};
pub use envelope::Envelope;
pub use error::{Error, ProtocolError, ServiceError, TransportError};
pub use filter::{format_arguments, Argument, Filter};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use mapping::{EntityMapping, EntityShape};
pub use query::{QueryOptions, Sort};
pub use service::EntityService;
pub use transport::{Transport, TransportConfig, UreqTransport};
pub use types::{Record, StringRecord};
