//! pcs-core - Domain model and transport core for pcs-api-rs
//!
//! This crate contains the provider-neutral heart of the library:
//! - **Domain model** - `RemotePath`, `RemoteFile`, `Quota`, upload/download requests
//! - **Byte pipeline** - `ByteSource`/`ByteSink` factories, range windows, progress reporting
//! - **Error taxonomy** - `StorageError` and the retry/authentication/not-found variants
//! - **Retry strategy** - bounded exponential backoff shared by every provider adapter
//! - **Credentials** - `AppInfo`/`UserCredentials` plus their default file-backed repositories
//! - **Session managers** - `SessionManager` plus the Basic/Digest auth implementations
//! - **Request invoker** - sends one logical request, recovers from one `401`, classifies the result
//! - **Transfer** - bridges the blocking byte pipeline to `reqwest`'s async transport
//! - **Registry** - `StorageBuilder`/`register_provider`, the provider-neutral entry point
//! - **Ports** - trait boundaries implemented by the provider adapters in `pcs-providers`
//!
//! # Architecture
//!
//! This crate follows the same hexagonal split as the rest of the workspace: it owns the
//! domain types, the ports adapters must honor, and the transport machinery (HTTP client,
//! session managers, request invoker) that every adapter shares. What it does *not* own is
//! anything provider-specific: wire formats, per-provider error quirks, and OAuth2's token
//! exchange live in `pcs-oauth` and `pcs-providers`, both of which depend on this crate.

pub mod bytes;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod invoker;
pub mod ports;
pub mod registry;
pub mod retry;
pub mod session;
pub mod transfer;

pub use domain::errors::StorageError;
