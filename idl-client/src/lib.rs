//! Dynamic clients for Anchor programs, generated at runtime from their IDL.
//!
//! A [Schema] validates an IDL document. A [ProgramClient] pairs a schema with a
//! program address and a [Connection], and exposes each declared instruction as an
//! [InstructionHandle] and each declared account type as an [AccountAccessor].
//! Arguments and account contents are `serde_json::Value`s, encoded with Borsh
//! exactly as the program's Anchor code lays them out.
//!
//! A [Workspace] opens a set of clients together, as `anchor test` does, and closes
//! them together.
pub mod account;
pub mod client;
pub mod coder;
pub mod config;
pub mod connection;
pub mod context;
pub mod discovery;
pub mod discriminator;
pub mod error;
pub mod idl;
pub mod idl_account;
pub mod mock_runtime;
pub mod request;
pub mod schema;
pub mod workspace;

pub use account::{AccountAccessor, TypedRecord};
pub use client::ProgramClient;
pub use config::ProviderConfig;
pub use connection::{Connection, Connector, InstructionRequest, SubmitOutcome};
#[cfg(feature = "client")]
pub use connection::{RpcConnection, RpcConnector};
pub use context::ExecutionContext;
pub use discovery::{AnchorWorkspaceDiscovery, DiscoveredProgram, ProgramDiscovery, StaticDiscovery};
pub use error::{IdlClientError, ProgramErrorCode, Result};
pub use idl::{Idl, IdlType};
pub use request::{InstructionHandle, Receipt, ReturnValue};
pub use schema::Schema;
pub use workspace::Workspace;
