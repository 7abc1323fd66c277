//! The seam between program clients and the network.
//!
//! Every [ProgramClient](crate::ProgramClient) owns exactly one [Connection].
//! A [Connector] mints a fresh one per program when a workspace is opened.
#[cfg(feature = "client")]
mod rpc;

#[cfg(feature = "client")]
pub use rpc::{RpcConnection, RpcConnector};

use crate::error::{IdlClientError, Result};
use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A single instruction, ready to be signed and submitted as its own transaction.
#[derive(Clone)]
pub struct InstructionRequest {
    pub instruction: Instruction,
    pub signers: Vec<Arc<dyn Signer + Send + Sync>>,
    /// Set when the instruction declares a return type, so the connection knows
    /// whether the return data is worth an extra round trip.
    pub return_data_expected: bool,
}

impl Debug for InstructionRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionRequest")
            .field("instruction", &self.instruction)
            .field(
                "signers",
                &self.signers.iter().map(|s| s.pubkey()).collect::<Vec<_>>(),
            )
            .field("return_data_expected", &self.return_data_expected)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub signature: Signature,
    /// The transaction's return data and the program that set it last.
    /// May carry zero padding past the end of the encoded value.
    pub return_data: Option<(Pubkey, Vec<u8>)>,
}

#[async_trait]
pub trait Connection: Send + Sync {
    /// Pays for and co-signs every submitted transaction.
    fn payer(&self) -> Pubkey;

    async fn submit_instruction(&self, request: InstructionRequest) -> Result<SubmitOutcome>;

    /// `None` when no account exists at the address.
    async fn fetch_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    /// Release the connection. Any later call fails with
    /// [Closed](crate::IdlClientError::Closed).
    async fn close(&self) -> Result<()>;
}

/// Produces one independent connection for each program a workspace opens.
pub trait Connector {
    fn connect(&self, program: &str) -> Result<Box<dyn Connection>>;
}

impl<F> Connector for F
where
    F: Fn(&str) -> Result<Box<dyn Connection>>,
{
    fn connect(&self, program: &str) -> Result<Box<dyn Connection>> {
        self(program)
    }
}

/// Fails with [IdlClientError::Timeout] if `fut` has not resolved within `after`.
/// Connection errors are relabelled with `operation`, keeping the failed
/// network step in parentheses.
pub(crate) async fn with_deadline<T, F>(operation: impl Into<String>, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let operation = operation.into();
    match tokio::time::timeout(after, fut).await {
        Ok(Err(IdlClientError::Connection {
            operation: step,
            message,
            program_error,
        })) => Err(IdlClientError::Connection {
            operation: format!("{operation} ({step})"),
            message,
            program_error,
        }),
        Ok(result) => result,
        Err(_) => Err(IdlClientError::Timeout { operation, after }),
    }
}
