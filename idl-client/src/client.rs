use crate::account::{AccountAccessor, TypedRecord};
use crate::config::DEFAULT_TIMEOUT;
use crate::connection::{with_deadline, Connection};
use crate::context::ExecutionContext;
use crate::error::{IdlClientError, Result};
use crate::idl::Idl;
use crate::idl_account::fetch_idl;
use crate::request::{state_address, InstructionHandle, Receipt};
use crate::schema::Schema;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// A client for one deployed program, generated from its IDL.
///
/// Owns its connection. [close](Self::close) consumes the client,
/// so nothing can be called on it afterwards.
pub struct ProgramClient {
    address: Pubkey,
    schema: Arc<Schema>,
    connection: Box<dyn Connection>,
    default_timeout: Duration,
}

impl ProgramClient {
    pub fn generate(schema: impl Into<Arc<Schema>>, address: Pubkey, connection: Box<dyn Connection>) -> Self {
        let schema = schema.into();
        log::debug!(
            "generated client for {} at {address}: {} instruction(s), {} account type(s)",
            schema.name,
            schema.instructions().count(),
            schema.accounts().count()
        );
        Self {
            address,
            schema,
            connection,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_idl(idl: Idl, address: Pubkey, connection: Box<dyn Connection>) -> Result<Self> {
        Ok(Self::generate(Schema::new(idl)?, address, connection))
    }

    /// Build a client from the IDL the program published on chain.
    pub async fn at(address: Pubkey, connection: Box<dyn Connection>) -> Result<Self> {
        Self::at_with_timeout(address, connection, DEFAULT_TIMEOUT).await
    }

    /// Like [at](Self::at), with `timeout` bounding the IDL fetch and
    /// every later call made through the client.
    pub async fn at_with_timeout(
        address: Pubkey,
        connection: Box<dyn Connection>,
        timeout: Duration,
    ) -> Result<Self> {
        let operation = format!("fetch IDL of {address}");
        let idl = with_deadline(operation, timeout, fetch_idl(connection.as_ref(), &address)).await?;
        Ok(Self::from_idl(idl, address, connection)?.with_timeout(timeout))
    }

    /// Bound every call made through this client by `timeout`, unless a call overrides it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    pub fn instruction(&self, name: &str) -> Result<InstructionHandle<'_>> {
        let definition = self.schema.instruction(name).ok_or_else(|| IdlClientError::NotFound {
            kind: "instruction",
            name: format!("{}::{name}", self.name()),
        })?;
        Ok(InstructionHandle::new(
            self.address,
            &self.schema,
            definition,
            self.connection.as_ref(),
            self.default_timeout,
        ))
    }

    pub fn account(&self, name: &str) -> Result<AccountAccessor<'_>> {
        let definition = self.schema.account(name).ok_or_else(|| IdlClientError::NotFound {
            kind: "account type",
            name: format!("{}::{name}", self.name()),
        })?;
        Ok(AccountAccessor::new(
            &self.schema,
            definition,
            self.connection.as_ref(),
            self.default_timeout,
        ))
    }

    /// Shorthand for `instruction(name)?.invoke(args, ctx)`.
    pub async fn rpc(&self, name: &str, args: &[Value], ctx: &ExecutionContext) -> Result<Receipt> {
        self.instruction(name)?.invoke(args, ctx).await
    }

    /// Shorthand for `account(account_type)?.fetch(address)`.
    pub async fn fetch(&self, account_type: &str, address: &Pubkey) -> Result<TypedRecord> {
        self.account(account_type)?.fetch(address).await
    }

    /// Raw bytes of any account, `None` if it does not exist.
    pub async fn fetch_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let operation = format!("fetch account {address}");
        with_deadline(operation, self.default_timeout, self.connection.fetch_account_bytes(address)).await
    }

    pub fn state_address(&self) -> Result<Pubkey> {
        state_address(&self.address)
    }

    /// Fetch and decode the program-global `#[state]` account.
    pub async fn fetch_state(&self) -> Result<TypedRecord> {
        let definition = self.schema.state().ok_or_else(|| IdlClientError::NotFound {
            kind: "state account",
            name: self.name().to_string(),
        })?;
        let address = self.state_address()?;
        AccountAccessor::new(&self.schema, definition, self.connection.as_ref(), self.default_timeout)
            .fetch(&address)
            .await
    }

    /// Release the connection.
    pub async fn close(self) -> Result<()> {
        log::debug!("closing client for {}", self.name());
        let operation = format!("close {}", self.name());
        with_deadline(operation, self.default_timeout, self.connection.close()).await
    }
}

impl Debug for ProgramClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramClient")
            .field("name", &self.schema.name)
            .field("address", &self.address)
            .field("payer", &self.connection.payer())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
