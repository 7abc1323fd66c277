//! Native stand-ins for the Anchor tutorial programs, plus fixture loading.
#![allow(dead_code)]

use solana_devtools_idl_client::discriminator::{
    account_discriminator, ix_discriminator, ix_state_discriminator,
};
use solana_devtools_idl_client::mock_runtime::{
    InvokeContext, MockAccount, MockConnection, MockConnector, MockProgramError, MockRuntime,
};
use solana_devtools_idl_client::request::state_address;
use solana_devtools_idl_client::{Idl, StaticDiscovery};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

type ProgramResult = Result<(), MockProgramError>;

/// Anchor's `ConstraintHasOne`.
pub const CONSTRAINT_HAS_ONE: u32 = 2001;
/// Anchor's `AccountDiscriminatorMismatch`.
pub const ACCOUNT_DISCRIMINATOR_MISMATCH: u32 = 3002;
pub const UNAUTHORIZED: u32 = 6000;
pub const DIVIDE_BY_ZERO: u32 = 6000;
pub const ORACLE_ANSWER: u64 = 7;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(format!("{name}.json"))
}

pub fn fixture(name: &str) -> Idl {
    Idl::from_file(fixture_path(name)).unwrap()
}

/// Program ids of every tutorial program loaded into a [Cluster].
#[derive(Debug, Clone, Copy)]
pub struct ProgramIds {
    pub basic_0: Pubkey,
    pub basic_1: Pubkey,
    pub basic_2: Pubkey,
    pub basic_4: Pubkey,
    pub puppet: Pubkey,
    pub puppet_master: Pubkey,
    pub calculator: Pubkey,
    pub oracle: Pubkey,
}

pub struct Cluster {
    pub runtime: Arc<Mutex<MockRuntime>>,
    pub payer: Pubkey,
    pub ids: ProgramIds,
}

impl Cluster {
    pub fn new() -> Self {
        let ids = ProgramIds {
            basic_0: Pubkey::new_unique(),
            basic_1: Pubkey::new_unique(),
            basic_2: Pubkey::new_unique(),
            basic_4: Pubkey::new_unique(),
            puppet: Pubkey::new_unique(),
            puppet_master: Pubkey::new_unique(),
            calculator: Pubkey::new_unique(),
            oracle: Pubkey::new_unique(),
        };
        let payer = Pubkey::new_unique();
        let mut runtime = MockRuntime::new()
            .with_program(ids.basic_0, basic_0)
            .with_program(ids.basic_1, basic_1)
            .with_program(ids.basic_2, basic_2)
            .with_program(ids.basic_4, basic_4)
            .with_program(ids.puppet, puppet)
            .with_program(ids.puppet_master, puppet_master)
            .with_program(ids.calculator, calculator)
            .with_program(ids.oracle, oracle);

        // basic_4's constructor ran at deploy time, with the payer as authority.
        runtime.set_account(
            state_address(&ids.basic_4).unwrap(),
            MockAccount {
                owner: ids.basic_4,
                data: record("Counter", &[payer.to_bytes().as_slice(), &0u64.to_le_bytes()].concat()),
            },
        );
        Self {
            runtime: Arc::new(Mutex::new(runtime)),
            payer,
            ids,
        }
    }

    pub fn connection(&self) -> MockConnection {
        MockConnection::new(self.runtime.clone(), self.payer)
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector::new(self.runtime.clone(), self.payer)
    }

    pub fn discovery(&self) -> StaticDiscovery {
        let ids = self.ids;
        [
            ("basic_0", ids.basic_0),
            ("basic_1", ids.basic_1),
            ("basic_2", ids.basic_2),
            ("basic_4", ids.basic_4),
            ("puppet", ids.puppet),
            ("puppet_master", ids.puppet_master),
            ("calculator", ids.calculator),
        ]
        .into_iter()
        .fold(StaticDiscovery::new(), |discovery, (name, id)| {
            discovery.with_program(name, id, fixture(name))
        })
    }

    pub async fn account_data(&self, address: &Pubkey) -> Option<Vec<u8>> {
        self.runtime
            .lock()
            .await
            .account(address)
            .map(|account| account.data.clone())
    }
}

/// Account data as Anchor lays it out: discriminator, then the Borsh body.
pub fn record(account_type: &str, body: &[u8]) -> Vec<u8> {
    [account_discriminator(account_type).as_slice(), body].concat()
}

fn args<'a>(data: &'a [u8], instruction: &str) -> Option<&'a [u8]> {
    data.strip_prefix(ix_discriminator(instruction).as_slice())
}

fn state_args<'a>(data: &'a [u8], method: &str) -> Option<&'a [u8]> {
    data.strip_prefix(ix_state_discriminator(method).as_slice())
}

fn bad_data(reason: &str) -> MockProgramError {
    MockProgramError::InvalidInstructionData(reason.to_string())
}

fn take<'a>(data: &mut &'a [u8], n: usize) -> Result<&'a [u8], MockProgramError> {
    if data.len() < n {
        return Err(bad_data("instruction data too short"));
    }
    let (head, rest) = data.split_at(n);
    *data = rest;
    Ok(head)
}

fn read_u64(data: &mut &[u8]) -> Result<u64, MockProgramError> {
    Ok(u64::from_le_bytes(take(data, 8)?.try_into().unwrap()))
}

fn read_i64(data: &mut &[u8]) -> Result<i64, MockProgramError> {
    Ok(i64::from_le_bytes(take(data, 8)?.try_into().unwrap()))
}

fn read_pubkey(data: &mut &[u8]) -> Result<Pubkey, MockProgramError> {
    Ok(Pubkey::try_from(take(data, 32)?).unwrap())
}

fn account(accounts: &[AccountMeta], index: usize) -> Result<Pubkey, MockProgramError> {
    accounts
        .get(index)
        .map(|meta| meta.pubkey)
        .ok_or_else(|| bad_data("not enough accounts"))
}

/// The body of an existing account of the given type.
fn existing<'a>(ctx: &'a InvokeContext<'_>, address: &Pubkey, account_type: &str) -> Result<&'a [u8], MockProgramError> {
    ctx.account_data(address)?
        .strip_prefix(account_discriminator(account_type).as_slice())
        .ok_or(MockProgramError::Custom(ACCOUNT_DISCRIMINATOR_MISMATCH))
}

pub fn basic_0(_: &mut InvokeContext<'_>, _: &[AccountMeta], data: &[u8]) -> ProgramResult {
    args(data, "initialize").ok_or_else(|| bad_data("unknown instruction"))?;
    Ok(())
}

pub fn basic_1(ctx: &mut InvokeContext<'_>, accounts: &[AccountMeta], data: &[u8]) -> ProgramResult {
    let my_account = account(accounts, 0)?;
    if let Some(mut data) = args(data, "initialize") {
        let value = read_u64(&mut data)?;
        ctx.write_account(&my_account, record("MyAccount", &value.to_le_bytes()))
    } else if let Some(mut data) = args(data, "update") {
        let value = read_u64(&mut data)?;
        existing(ctx, &my_account, "MyAccount")?;
        ctx.write_account(&my_account, record("MyAccount", &value.to_le_bytes()))
    } else {
        Err(bad_data("unknown instruction"))
    }
}

pub fn basic_2(ctx: &mut InvokeContext<'_>, accounts: &[AccountMeta], data: &[u8]) -> ProgramResult {
    let counter = account(accounts, 0)?;
    if let Some(mut data) = args(data, "create") {
        let authority = read_pubkey(&mut data)?;
        let body = [authority.to_bytes().as_slice(), &0u64.to_le_bytes()].concat();
        ctx.write_account(&counter, record("Counter", &body))
    } else if args(data, "increment").is_some() {
        let authority = account(accounts, 1)?;
        let mut body = existing(ctx, &counter, "Counter")?;
        let stored_authority = read_pubkey(&mut body)?;
        let count = read_u64(&mut body)?;
        if stored_authority != authority || !ctx.is_signer(&authority) {
            return Err(MockProgramError::Custom(CONSTRAINT_HAS_ONE));
        }
        let body = [authority.to_bytes().as_slice(), &(count + 1).to_le_bytes()].concat();
        ctx.write_account(&counter, record("Counter", &body))
    } else {
        Err(bad_data("unknown instruction"))
    }
}

pub fn basic_4(ctx: &mut InvokeContext<'_>, accounts: &[AccountMeta], data: &[u8]) -> ProgramResult {
    let state = account(accounts, 0)?;
    if state != state_address(&ctx.program_id()).unwrap() {
        return Err(bad_data("first account is not the state account"));
    }
    if state_args(data, "increment").is_none() {
        return Err(bad_data("unknown state method"));
    }
    let authority = account(accounts, 1)?;
    let mut body = existing(ctx, &state, "Counter")?;
    let stored_authority = read_pubkey(&mut body)?;
    let count = read_u64(&mut body)?;
    if stored_authority != authority || !ctx.is_signer(&authority) {
        return Err(MockProgramError::Custom(UNAUTHORIZED));
    }
    let body = [authority.to_bytes().as_slice(), &(count + 1).to_le_bytes()].concat();
    ctx.write_account(&state, record("Counter", &body))
}

pub fn puppet(ctx: &mut InvokeContext<'_>, accounts: &[AccountMeta], data: &[u8]) -> ProgramResult {
    let puppet = account(accounts, 0)?;
    if args(data, "initialize").is_some() {
        ctx.write_account(&puppet, record("Data", &0u64.to_le_bytes()))
    } else if let Some(mut data) = args(data, "set_data") {
        let value = read_u64(&mut data)?;
        existing(ctx, &puppet, "Data")?;
        ctx.write_account(&puppet, record("Data", &value.to_le_bytes()))
    } else {
        Err(bad_data("unknown instruction"))
    }
}

pub fn puppet_master(ctx: &mut InvokeContext<'_>, accounts: &[AccountMeta], data: &[u8]) -> ProgramResult {
    let mut data = args(data, "pull_strings").ok_or_else(|| bad_data("unknown instruction"))?;
    let value = read_u64(&mut data)?;
    let puppet = account(accounts, 0)?;
    let puppet_program = account(accounts, 1)?;
    let set_data = Instruction::new_with_bytes(
        puppet_program,
        &[ix_discriminator("set_data").as_slice(), &value.to_le_bytes()].concat(),
        vec![AccountMeta::new(puppet, false)],
    );
    ctx.invoke(&set_data)
}

pub fn calculator(ctx: &mut InvokeContext<'_>, accounts: &[AccountMeta], data: &[u8]) -> ProgramResult {
    if let Some(mut data) = args(data, "add") {
        let (a, b) = (read_u64(&mut data)?, read_u64(&mut data)?);
        ctx.set_return_data((a + b).to_le_bytes().to_vec());
    } else if let Some(mut data) = args(data, "checked_div") {
        let (a, b) = (read_u64(&mut data)?, read_u64(&mut data)?);
        let quotient = a.checked_div(b).ok_or(MockProgramError::Custom(DIVIDE_BY_ZERO))?;
        ctx.set_return_data(quotient.to_le_bytes().to_vec());
    } else if let Some(mut data) = args(data, "describe") {
        let (label, result): (&str, Option<i128>) = match take(&mut data, 1)?[0] {
            0 => {
                let (a, b) = (read_u64(&mut data)?, read_u64(&mut data)?);
                ("sum", Some(a as i128 + b as i128))
            }
            1 => ("negation", Some(-(read_i64(&mut data)? as i128))),
            2 => ("noop", None),
            _ => return Err(bad_data("unknown operation")),
        };
        let mut summary = (label.len() as u32).to_le_bytes().to_vec();
        summary.extend(label.as_bytes());
        match result {
            Some(result) => {
                summary.push(1);
                summary.extend(result.to_le_bytes());
            }
            None => summary.push(0),
        }
        ctx.set_return_data(summary);
    } else if args(data, "relay").is_some() {
        let oracle = account(accounts, 0)?;
        ctx.invoke(&Instruction::new_with_bytes(oracle, &[], vec![]))?;
    } else if args(data, "forgetful").is_none() {
        return Err(bad_data("unknown instruction"));
    }
    Ok(())
}

/// Not an Anchor program: answers every call with return data of its own.
pub fn oracle(ctx: &mut InvokeContext<'_>, _: &[AccountMeta], _: &[u8]) -> ProgramResult {
    ctx.set_return_data(ORACLE_ANSWER.to_le_bytes().to_vec());
    Ok(())
}
