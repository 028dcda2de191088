//! # floatlease-core
//!
//! Client-side floating license leasing: acquire a seat from a counted
//! pool on a lease server, hold it through background renewal, and give
//! it back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FloatingClient                            │
//! │                                                              │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────┐  │
//! │  │ RenewalSched │  │ CallbackDispatch │  │ MeterTracker │  │
//! │  │ (one timer)  │  │ (one slot)       │  │ (bounded)    │  │
//! │  └──────────────┘  └──────────────────┘  └──────────────┘  │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌──────────────────────────────────────────────────┐      │
//! │  │              Lease state machine                  │      │
//! │  │  Unleased → Acquiring → Active ⇄ Renewing        │      │
//! │  │            (→ Expired, → Dropped)                │      │
//! │  └──────────────────────────────────────────────────┘      │
//! │                           │                                  │
//! │                           ▼                                  │
//! │  ┌───────────┐  ┌─────────────┐  ┌──────────────────┐      │
//! │  │ Transport │  │ HostRuntime │  │ OfflineStore     │      │
//! │  │ (server)  │  │ (machine)   │  │ (encrypted file) │      │
//! │  └───────────┘  └─────────────┘  └──────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Behavioral Properties
//!
//! - **One lock**: all lease state behind a single mutex, released
//!   across every network call and callback invocation
//! - **Stale-renewal safe**: an epoch counter discards renewal results
//!   that raced an acquire or drop
//! - **Grace on outage**: a transient renewal failure keeps the lease
//!   active until its own expiry, retrying in the meantime
//! - **Seat never double-counted**: drop clears local state even when
//!   the release round trip fails

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod callback;
pub mod config;
pub mod entitlements;
pub mod host;
pub mod lease;
pub mod manager;
pub mod meter;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod transport;

pub use callback::{CallbackDispatcher, FloatingLicenseCallback};
pub use config::ClientConfig;
pub use entitlements::{
    EntitlementCache, EntitlementSet, FeatureEntitlement, FeatureFlag, HostConfig, ProductVersion,
};
pub use host::{EnvHostRuntime, HostRuntime, StaticHostRuntime};
pub use lease::{Lease, LeaseIdentity, LeaseMode, LeaseState, PermissionFlag};
pub use manager::FloatingClient;
pub use meter::{MeterAttribute, MeterAttributeTracker};
pub use scheduler::RenewalScheduler;
pub use status::StatusCode;
pub use store::{EncryptedFileStore, NullStore, OfflineCredential, OfflineStore};
pub use transport::{InMemoryServer, LeaseGrant, MeterDelta, Transport};
