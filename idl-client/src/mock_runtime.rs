//! An in-process stand-in for a cluster, for exercising clients in tests.
//!
//! Programs are native Rust handlers ([MockProgram]), not BPF. Each submitted
//! instruction runs as its own transaction against an in-memory account map:
//! all account writes commit together, or not at all.
use crate::connection::{Connection, Connector, InstructionRequest, SubmitOutcome};
use crate::error::{IdlClientError, ProgramErrorCode, Result};
use async_trait::async_trait;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Deepest allowed nesting of cross-program invocations, the outer instruction included.
pub const MAX_INVOKE_DEPTH: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockProgramError {
    #[error("custom program error: {0:#x}")]
    Custom(u32),
    #[error("invalid instruction data: {0}")]
    InvalidInstructionData(String),
    #[error("missing required signature for {0}")]
    MissingRequiredSignature(Pubkey),
    #[error("account {0} was not passed to the instruction")]
    MissingAccount(Pubkey),
    #[error("program {program} may not modify account {account}")]
    ReadonlyDataModified { program: Pubkey, account: Pubkey },
    #[error("cross-program invocation escalates privileges of {0}")]
    PrivilegeEscalation(Pubkey),
    #[error("cross-program invocation exceeds depth {}", MAX_INVOKE_DEPTH)]
    CallDepthExceeded,
    #[error("no program registered at {0}")]
    UnknownProgram(Pubkey),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockAccount {
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// A native program handler.
pub trait MockProgram: Send + Sync {
    fn process(
        &self,
        ctx: &mut InvokeContext<'_>,
        accounts: &[AccountMeta],
        data: &[u8],
    ) -> std::result::Result<(), MockProgramError>;
}

impl<F> MockProgram for F
where
    F: Fn(&mut InvokeContext<'_>, &[AccountMeta], &[u8]) -> std::result::Result<(), MockProgramError>
        + Send
        + Sync,
{
    fn process(
        &self,
        ctx: &mut InvokeContext<'_>,
        accounts: &[AccountMeta],
        data: &[u8],
    ) -> std::result::Result<(), MockProgramError> {
        self(ctx, accounts, data)
    }
}

/// Transaction-wide state: the working copy of every account, and the return data.
struct TransactionState {
    accounts: HashMap<Pubkey, MockAccount>,
    return_data: Option<(Pubkey, Vec<u8>)>,
}

/// What a running program can see and do.
pub struct InvokeContext<'t> {
    state: &'t mut TransactionState,
    programs: &'t HashMap<Pubkey, Arc<dyn MockProgram>>,
    program_id: Pubkey,
    metas: Vec<AccountMeta>,
    depth: usize,
}

impl<'t> InvokeContext<'t> {
    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    fn meta(&self, address: &Pubkey) -> std::result::Result<&AccountMeta, MockProgramError> {
        self.metas
            .iter()
            .find(|meta| &meta.pubkey == address)
            .ok_or(MockProgramError::MissingAccount(*address))
    }

    pub fn is_signer(&self, address: &Pubkey) -> bool {
        self.metas.iter().any(|meta| &meta.pubkey == address && meta.is_signer)
    }

    /// Data of an account passed to this instruction. Empty if it does not exist yet.
    pub fn account_data(&self, address: &Pubkey) -> std::result::Result<&[u8], MockProgramError> {
        self.meta(address)?;
        Ok(self
            .state
            .accounts
            .get(address)
            .map(|account| account.data.as_slice())
            .unwrap_or_default())
    }

    pub fn owner(&self, address: &Pubkey) -> Option<Pubkey> {
        self.state.accounts.get(address).map(|account| account.owner)
    }

    /// Replace an account's data. The account must be writable in this instruction,
    /// and either owned by the running program or still empty (it is then assigned to it).
    pub fn write_account(&mut self, address: &Pubkey, data: Vec<u8>) -> std::result::Result<(), MockProgramError> {
        let meta = self.meta(address)?;
        let denied = MockProgramError::ReadonlyDataModified {
            program: self.program_id,
            account: *address,
        };
        if !meta.is_writable {
            return Err(denied);
        }
        let program_id = self.program_id;
        let account = self.state.accounts.entry(*address).or_default();
        if account.owner != program_id {
            if !account.data.is_empty() {
                return Err(denied);
            }
            account.owner = program_id;
        }
        account.data = data;
        Ok(())
    }

    /// Call another program. The callee and its accounts must have been passed to
    /// this instruction, with at least the signer and writable privileges requested.
    pub fn invoke(&mut self, instruction: &Instruction) -> std::result::Result<(), MockProgramError> {
        if self.depth >= MAX_INVOKE_DEPTH {
            return Err(MockProgramError::CallDepthExceeded);
        }
        self.meta(&instruction.program_id)?;
        for callee_meta in &instruction.accounts {
            let caller_meta = self.meta(&callee_meta.pubkey)?;
            if (callee_meta.is_signer && !caller_meta.is_signer)
                || (callee_meta.is_writable && !caller_meta.is_writable)
            {
                return Err(MockProgramError::PrivilegeEscalation(callee_meta.pubkey));
            }
        }
        let program = self
            .programs
            .get(&instruction.program_id)
            .cloned()
            .ok_or(MockProgramError::UnknownProgram(instruction.program_id))?;
        let mut callee = InvokeContext {
            state: &mut *self.state,
            programs: self.programs,
            program_id: instruction.program_id,
            metas: instruction.accounts.clone(),
            depth: self.depth + 1,
        };
        program.process(&mut callee, &instruction.accounts, &instruction.data)
    }

    /// Transaction-wide: whatever is set last, by any program, is what the caller sees.
    pub fn set_return_data(&mut self, data: Vec<u8>) {
        self.state.return_data = Some((self.program_id, data));
    }
}

#[derive(Default)]
pub struct MockRuntime {
    accounts: HashMap<Pubkey, MockAccount>,
    programs: HashMap<Pubkey, Arc<dyn MockProgram>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program_id: Pubkey, program: impl MockProgram + 'static) -> Self {
        self.add_program(program_id, program);
        self
    }

    pub fn add_program(&mut self, program_id: Pubkey, program: impl MockProgram + 'static) {
        self.programs.insert(program_id, Arc::new(program));
    }

    pub fn account(&self, address: &Pubkey) -> Option<&MockAccount> {
        self.accounts.get(address)
    }

    pub fn set_account(&mut self, address: Pubkey, account: MockAccount) {
        self.accounts.insert(address, account);
    }

    /// Run one instruction as a transaction signed by `signers`.
    /// Returns the transaction's return data.
    pub fn process_instruction(
        &mut self,
        instruction: &Instruction,
        signers: &HashSet<Pubkey>,
    ) -> std::result::Result<Option<(Pubkey, Vec<u8>)>, MockProgramError> {
        if let Some(meta) = instruction
            .accounts
            .iter()
            .find(|meta| meta.is_signer && !signers.contains(&meta.pubkey))
        {
            return Err(MockProgramError::MissingRequiredSignature(meta.pubkey));
        }
        let program = self
            .programs
            .get(&instruction.program_id)
            .cloned()
            .ok_or(MockProgramError::UnknownProgram(instruction.program_id))?;
        let mut state = TransactionState {
            accounts: self.accounts.clone(),
            return_data: None,
        };
        let mut ctx = InvokeContext {
            state: &mut state,
            programs: &self.programs,
            program_id: instruction.program_id,
            metas: instruction.accounts.clone(),
            depth: 1,
        };
        program.process(&mut ctx, &instruction.accounts, &instruction.data)?;
        self.accounts = state.accounts;
        Ok(state.return_data)
    }
}

/// Counts of calls made through a [MockConnection].
#[derive(Debug, Default)]
pub struct CallLog {
    submits: AtomicUsize,
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

impl CallLog {
    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A [Connection] to a shared [MockRuntime].
pub struct MockConnection {
    runtime: Arc<Mutex<MockRuntime>>,
    payer: Pubkey,
    log: Arc<CallLog>,
    latency: Option<Duration>,
    fail_on_close: bool,
    closed: AtomicBool,
}

impl MockConnection {
    pub fn new(runtime: Arc<Mutex<MockRuntime>>, payer: Pubkey) -> Self {
        Self {
            runtime,
            payer,
            log: Arc::default(),
            latency: None,
            fail_on_close: false,
            closed: AtomicBool::new(false),
        }
    }

    /// Delay every submit and fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make [close](Connection::close) fail (after marking the connection closed).
    pub fn failing_close(mut self) -> Self {
        self.fail_on_close = true;
        self
    }

    pub fn with_call_log(mut self, log: Arc<CallLog>) -> Self {
        self.log = log;
        self
    }

    pub fn call_log(&self) -> Arc<CallLog> {
        self.log.clone()
    }

    pub fn runtime(&self) -> Arc<Mutex<MockRuntime>> {
        self.runtime.clone()
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IdlClientError::Closed(format!("{operation} on mock connection")));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn payer(&self) -> Pubkey {
        self.payer
    }

    async fn submit_instruction(&self, request: InstructionRequest) -> Result<SubmitOutcome> {
        self.ensure_open("submit_instruction")?;
        self.log.submits.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let signers: HashSet<Pubkey> = std::iter::once(self.payer)
            .chain(request.signers.iter().map(|signer| signer.pubkey()))
            .collect();
        let result = self
            .runtime
            .lock()
            .await
            .process_instruction(&request.instruction, &signers);
        match result {
            Ok(return_data) => Ok(SubmitOutcome {
                signature: Signature::new_unique(),
                return_data,
            }),
            Err(e) => Err(IdlClientError::Connection {
                operation: "submit_instruction".to_string(),
                message: e.to_string(),
                program_error: match e {
                    MockProgramError::Custom(code) => Some(ProgramErrorCode {
                        code,
                        name: None,
                        msg: None,
                    }),
                    _ => None,
                },
            }),
        }
    }

    async fn fetch_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        self.ensure_open("fetch_account_bytes")?;
        self.log.fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self
            .runtime
            .lock()
            .await
            .account(address)
            .map(|account| account.data.clone()))
    }

    async fn close(&self) -> Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(IdlClientError::Closed("mock connection was already closed".to_string()));
        }
        if self.fail_on_close {
            return Err(IdlClientError::connection("close", "injected close failure"));
        }
        Ok(())
    }
}

/// Hands out [MockConnection]s to one shared runtime, all recording into one [CallLog].
pub struct MockConnector {
    runtime: Arc<Mutex<MockRuntime>>,
    payer: Pubkey,
    log: Arc<CallLog>,
    latency: Option<Duration>,
    failing_close: HashSet<String>,
}

impl MockConnector {
    pub fn new(runtime: Arc<Mutex<MockRuntime>>, payer: Pubkey) -> Self {
        Self {
            runtime,
            payer,
            log: Arc::default(),
            latency: None,
            failing_close: HashSet::new(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Connections made for `program` fail to close.
    pub fn failing_close_for(mut self, program: impl Into<String>) -> Self {
        self.failing_close.insert(program.into());
        self
    }

    pub fn call_log(&self) -> Arc<CallLog> {
        self.log.clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, program: &str) -> Result<Box<dyn Connection>> {
        let mut connection =
            MockConnection::new(self.runtime.clone(), self.payer).with_call_log(self.log.clone());
        if let Some(latency) = self.latency {
            connection = connection.with_latency(latency);
        }
        if self.failing_close.contains(program) {
            connection = connection.failing_close();
        }
        Ok(Box::new(connection))
    }
}
