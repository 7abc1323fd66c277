use crate::connection::{with_deadline, Connection, InstructionRequest};
use crate::context::ExecutionContext;
use crate::error::{IdlClientError, Result};
use crate::schema::{InstructionDefinition, InstructionKind, Schema};
use serde_json::Value;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashSet;
use std::time::Duration;

pub const STATE_SEED: &str = "unversioned";

/// Address of the program-global `#[state]` account.
pub fn state_address(program_id: &Pubkey) -> Result<Pubkey> {
    let base = Pubkey::find_program_address(&[], program_id).0;
    Pubkey::create_with_seed(&base, STATE_SEED, program_id)
        .map_err(|e| IdlClientError::schema_violation("state", e.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    Void,
    Value(Value),
}

impl ReturnValue {
    pub fn value(&self) -> Option<&Value> {
        match self {
            ReturnValue::Void => None,
            ReturnValue::Value(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub signature: Signature,
    pub instruction: String,
    pub return_value: ReturnValue,
}

/// A callable instruction (or state method) of one program.
pub struct InstructionHandle<'a> {
    program_id: Pubkey,
    schema: &'a Schema,
    definition: &'a InstructionDefinition,
    connection: &'a dyn Connection,
    default_timeout: Duration,
}

impl<'a> InstructionHandle<'a> {
    pub(crate) fn new(
        program_id: Pubkey,
        schema: &'a Schema,
        definition: &'a InstructionDefinition,
        connection: &'a dyn Connection,
        default_timeout: Duration,
    ) -> Self {
        Self {
            program_id,
            schema,
            definition,
            connection,
            default_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &InstructionDefinition {
        self.definition
    }

    /// Check arity and account roles without touching the network.
    pub fn validate(&self, args: &[Value], ctx: &ExecutionContext) -> Result<()> {
        let ix = self.definition;
        if ix.is_state_constructor() {
            return Err(IdlClientError::Unsupported(format!(
                "state constructor `{}` of {} cannot be invoked by this client",
                ix.idl_name, self.schema.name
            )));
        }
        if args.len() != ix.args.len() {
            return Err(IdlClientError::invalid_call(
                &ix.name,
                format!("expected {} argument(s), found {}", ix.args.len(), args.len()),
            ));
        }
        if let Some(role) = ctx.duplicate_roles.first() {
            return Err(IdlClientError::invalid_call(
                &ix.name,
                format!("account role `{role}` is bound more than once"),
            ));
        }
        let declared: HashSet<&str> = ix.accounts.iter().map(|r| r.name.as_str()).collect();
        if let Some(unknown) = ctx.accounts.keys().find(|role| !declared.contains(role.as_str())) {
            return Err(IdlClientError::invalid_call(
                &ix.name,
                format!("unknown account role `{unknown}`"),
            ));
        }
        let payer = self.connection.payer();
        for role in &ix.accounts {
            match ctx.accounts.get(&role.name) {
                None if role.is_optional => {}
                None => {
                    return Err(IdlClientError::invalid_call(
                        &ix.name,
                        format!("missing account `{}`", role.name),
                    ))
                }
                Some(address) if role.is_signer && *address != payer && !ctx.signs_for(address) => {
                    return Err(IdlClientError::invalid_call(
                        &ix.name,
                        format!("account `{}` ({address}) must sign, but no signer was given for it", role.name),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Discriminator followed by each argument, in declaration order.
    pub fn encode_args(&self, args: &[Value]) -> Result<Vec<u8>> {
        let mut data = self.definition.discriminator.to_vec();
        for (arg, value) in self.definition.args.iter().zip(args) {
            let path = format!("{}.{}", self.definition.name, arg.name);
            self.schema.encode_idl_type(&arg.ty, value, &mut data, &path)?;
        }
        Ok(data)
    }

    fn account_metas(&self, ctx: &ExecutionContext) -> Result<Vec<AccountMeta>> {
        let mut metas = Vec::with_capacity(self.definition.accounts.len() + ctx.remaining_accounts.len() + 1);
        if self.definition.kind == InstructionKind::State {
            metas.push(AccountMeta::new(state_address(&self.program_id)?, false));
        }
        for role in &self.definition.accounts {
            let meta = match ctx.accounts.get(&role.name) {
                Some(address) => {
                    let is_signer = role.is_signer || ctx.signs_for(address);
                    if role.is_mut {
                        AccountMeta::new(*address, is_signer)
                    } else {
                        AccountMeta::new_readonly(*address, is_signer)
                    }
                }
                // An omitted optional account is passed as the program id.
                None => AccountMeta::new_readonly(self.program_id, false),
            };
            metas.push(meta);
        }
        metas.extend(ctx.remaining_accounts.iter().cloned());
        Ok(metas)
    }

    /// Validate and encode into an [Instruction], without sending it.
    pub fn build(&self, args: &[Value], ctx: &ExecutionContext) -> Result<Instruction> {
        self.validate(args, ctx)?;
        let data = self.encode_args(args)?;
        Ok(Instruction {
            program_id: self.program_id,
            accounts: self.account_metas(ctx)?,
            data,
        })
    }

    /// Submit the instruction as its own transaction and wait for confirmation.
    pub async fn invoke(&self, args: &[Value], ctx: &ExecutionContext) -> Result<Receipt> {
        let instruction = self.build(args, ctx)?;
        let request = InstructionRequest {
            instruction,
            signers: ctx.signers.clone(),
            return_data_expected: self.definition.returns.is_some(),
        };
        log::debug!(
            "invoking {}::{} with {} account(s)",
            self.schema.name,
            self.definition.name,
            request.instruction.accounts.len()
        );
        let timeout = ctx.timeout.unwrap_or(self.default_timeout);
        let operation = format!("invoke {}", self.definition.name);
        let outcome = with_deadline(operation, timeout, self.connection.submit_instruction(request))
            .await
            .map_err(|e| self.resolve_program_error(e))?;

        let return_value = match &self.definition.returns {
            None => ReturnValue::Void,
            Some(ty) => {
                let path = format!("{}.returns", self.definition.name);
                let data = match outcome.return_data {
                    Some((program_id, data)) if program_id == self.program_id => data,
                    Some((program_id, _)) => {
                        return Err(IdlClientError::schema_violation(
                            &path,
                            format!("return data was set by {program_id}, not {}", self.program_id),
                        ))
                    }
                    None => {
                        return Err(IdlClientError::schema_violation(
                            &path,
                            "the program set no return data",
                        ))
                    }
                };
                let mut data = data.as_slice();
                ReturnValue::Value(self.schema.decode_idl_type(ty, &mut data, &path)?)
            }
        };
        Ok(Receipt {
            signature: outcome.signature,
            instruction: self.definition.name.clone(),
            return_value,
        })
    }

    /// Attach the IDL's name and message to a custom program error code.
    fn resolve_program_error(&self, err: IdlClientError) -> IdlClientError {
        match err {
            IdlClientError::Connection {
                operation,
                message,
                program_error: Some(mut code),
            } => {
                if let Some(declared) = self.schema.error_code(code.code) {
                    code.name = Some(declared.name.clone());
                    code.msg = declared.msg.clone();
                }
                IdlClientError::Connection {
                    operation,
                    message,
                    program_error: Some(code),
                }
            }
            other => other,
        }
    }
}
