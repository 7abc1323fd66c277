use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use solana_devtools_idl_client::{ExecutionContext, ProgramClient};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Parser)]
pub struct InvokeArgs {
    pub program_id: Pubkey,
    /// Instruction or state method name, in the IDL's spelling or snake_case.
    pub instruction: String,
    /// Arguments as a JSON array, in declaration order.
    #[clap(long, default_value = "[]")]
    pub args: String,
    /// Bind an account role, e.g. `--account counter=<PUBKEY>`. Repeatable.
    #[clap(long = "account", value_name = "ROLE=PUBKEY")]
    pub accounts: Vec<String>,
    /// Extra keypair file to sign with, besides the wallet. Repeatable.
    #[clap(long = "signer", value_name = "KEYPAIR")]
    pub signers: Vec<PathBuf>,
}

impl InvokeArgs {
    pub async fn process(&self, client: &ProgramClient) -> Result<Value> {
        let args = parse_args(&self.args)?;
        let mut ctx = ExecutionContext::new();
        for binding in &self.accounts {
            let (role, address) = parse_binding(binding)?;
            ctx = ctx.account(role, address);
        }
        for path in &self.signers {
            let keypair = read_keypair_file(path)
                .map_err(|e| anyhow!("could not read keypair file {}: {e}", path.display()))?;
            ctx = ctx.signer(keypair);
        }
        let receipt = client.rpc(&self.instruction, &args, &ctx).await?;
        Ok(json!({
            "signature": receipt.signature.to_string(),
            "instruction": receipt.instruction,
            "returns": receipt.return_value.value(),
        }))
    }
}

fn parse_args(args: &str) -> Result<Vec<Value>> {
    serde_json::from_str(args).context("--args must be a JSON array")
}

fn parse_binding(binding: &str) -> Result<(&str, Pubkey)> {
    let (role, address) = binding
        .split_once('=')
        .ok_or_else(|| anyhow!("expected ROLE=PUBKEY, found {binding:?}"))?;
    let address = Pubkey::from_str(address.trim())
        .map_err(|e| anyhow!("invalid address for account `{role}`: {e}"))?;
    Ok((role.trim(), address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_bindings() {
        let key = Pubkey::new_unique();
        let binding = format!("systemProgram={key}");
        let (role, address) = parse_binding(&binding).unwrap();
        assert_eq!(role, "systemProgram");
        assert_eq!(address, key);
        assert!(parse_binding("counter").is_err());
        assert!(parse_binding("counter=not-a-key").is_err());
    }

    #[test]
    fn args_are_a_json_array() {
        assert_eq!(
            parse_args(r#"[42, "7RJ7c3E3rxFD3NScPVssfKk5psBVXEWjQBwPdex2DACE", {"Noop": null}]"#).unwrap(),
            vec![
                json!(42),
                json!("7RJ7c3E3rxFD3NScPVssfKk5psBVXEWjQBwPdex2DACE"),
                json!({"Noop": null})
            ]
        );
        assert!(parse_args("42").is_err());
    }
}
