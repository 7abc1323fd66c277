mod invoke;

use anyhow::{anyhow, Result};
use clap::Parser;
use serde_json::json;
use solana_devtools_cli_config::ProviderArgs;
use solana_devtools_idl_client::schema::InstructionKind;
use solana_devtools_idl_client::{Connection, Idl, ProgramClient, ProviderConfig, RpcConnection};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::null_signer::NullSigner;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::invoke::InvokeArgs;

#[derive(Debug, Parser)]
#[clap(name = "solana-idl", about = "Call Anchor programs and read their accounts through their IDL")]
struct Opt {
    #[clap(flatten)]
    provider: ProviderArgs,
    /// Read the IDL from this file instead of the program's on-chain IDL account.
    #[clap(long, global = true)]
    idl: Option<PathBuf>,
    #[clap(subcommand)]
    cmd: Subcommand,
}

#[derive(Debug, Parser)]
enum Subcommand {
    /// Print the IDL a program published on chain.
    FetchIdl {
        program_id: Pubkey,
        outfile: Option<PathBuf>,
    },
    /// List a program's instructions, with their arguments and accounts.
    Instructions { program_id: Pubkey },
    /// Fetch and decode an account owned by a program.
    Account {
        program_id: Pubkey,
        address: Pubkey,
        /// Account type to decode as. Inferred from the discriminator when omitted.
        #[clap(long = "type")]
        account_type: Option<String>,
    },
    /// Fetch and decode a program's `#[state]` account.
    State { program_id: Pubkey },
    /// Submit one instruction as its own transaction, signed by the configured wallet.
    Invoke(InvokeArgs),
}

impl Opt {
    async fn process(self) -> Result<()> {
        let config = self.provider.resolve()?;
        match &self.cmd {
            Subcommand::FetchIdl { program_id, outfile } => {
                let client = self.client(&config, *program_id, read_only(&config)).await?;
                let json = serde_json::to_string_pretty(client.schema().idl())?;
                client.close().await?;
                write_output(&json, outfile.as_ref())?;
            }
            Subcommand::Instructions { program_id } => {
                let client = self.client(&config, *program_id, read_only(&config)).await?;
                for ix in client.schema().instructions() {
                    let args = ix
                        .args
                        .iter()
                        .map(|arg| format!("{}: {}", arg.name, arg.ty))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let returns = ix.returns.as_ref().map(|ty| format!(" -> {ty}")).unwrap_or_default();
                    let kind = match ix.kind {
                        InstructionKind::State if ix.is_state_constructor() => " [state constructor]",
                        InstructionKind::State => " [state]",
                        InstructionKind::Global => "",
                    };
                    println!("{}({args}){returns}{kind}", ix.name);
                    for role in &ix.accounts {
                        let mut flags = vec![];
                        if role.is_mut {
                            flags.push("mut");
                        }
                        if role.is_signer {
                            flags.push("signer");
                        }
                        if role.is_optional {
                            flags.push("optional");
                        }
                        println!("    {} [{}]", role.name, flags.join(", "));
                    }
                }
                client.close().await?;
            }
            Subcommand::Account {
                program_id,
                address,
                account_type,
            } => {
                let client = self.client(&config, *program_id, read_only(&config)).await?;
                let record = match account_type {
                    Some(account_type) => client.fetch(account_type, address).await?,
                    None => {
                        let data = client
                            .fetch_account_bytes(address)
                            .await?
                            .ok_or_else(|| anyhow!("no account found at {address}"))?;
                        client.schema().try_account_data_to_value(address, &data)?
                    }
                };
                client.close().await?;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "type": record.account_type,
                        "address": record.address.to_string(),
                        "value": record.value,
                    }))?
                );
            }
            Subcommand::State { program_id } => {
                let client = self.client(&config, *program_id, read_only(&config)).await?;
                let record = client.fetch_state().await?;
                client.close().await?;
                println!("{}", serde_json::to_string_pretty(&record.value)?);
            }
            Subcommand::Invoke(args) => {
                let connection = Box::new(RpcConnection::from_config(&config)?);
                let client = self.client(&config, args.program_id, connection).await?;
                let outcome = args.process(&client).await;
                client.close().await?;
                println!("{}", serde_json::to_string_pretty(&outcome?)?);
            }
        }
        Ok(())
    }

    async fn client(
        &self,
        config: &ProviderConfig,
        program_id: Pubkey,
        connection: Box<dyn Connection>,
    ) -> Result<ProgramClient> {
        Ok(match &self.idl {
            Some(path) => {
                ProgramClient::from_idl(Idl::from_file(path)?, program_id, connection)?.with_timeout(config.timeout)
            }
            None => ProgramClient::at_with_timeout(program_id, connection, config.timeout).await?,
        })
    }
}

/// A connection for commands that never sign, so no wallet file is needed.
fn read_only(config: &ProviderConfig) -> Box<dyn Connection> {
    Box::new(RpcConnection::new(
        config.rpc_client(),
        Arc::new(NullSigner::new(&Pubkey::default())),
    ))
}

fn write_output(json: &str, outfile: Option<&PathBuf>) -> Result<()> {
    if let Some(outfile) = outfile {
        let mut file = File::create(outfile)?;
        file.write_all(json.as_bytes())?;
    } else {
        println!("{json}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    opt.process().await?;
    Ok(())
}
