use crate::config::ProviderConfig;
use crate::connection::{Connection, Connector, InstructionRequest, SubmitOutcome};
use crate::error::{IdlClientError, ProgramErrorCode, Result};
use async_trait::async_trait;
use base64::Engine;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_client::rpc_request::RpcError::RpcResponseError;
use solana_client::rpc_request::RpcResponseErrorData::SendTransactionPreflightFailure;
use solana_client::rpc_response::RpcSimulateTransactionResult;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{Instruction, InstructionError};
use solana_sdk::message::Message;
use solana_sdk::program::MAX_RETURN_DATA;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::{Transaction, TransactionError};
use solana_transaction_status::{UiReturnDataEncoding, UiTransactionEncoding, UiTransactionReturnData};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A [Connection] to a live cluster over JSON-RPC.
pub struct RpcConnection {
    client: RpcClient,
    payer: Arc<dyn Signer + Send + Sync>,
    closed: AtomicBool,
}

impl RpcConnection {
    pub fn new(client: RpcClient, payer: Arc<dyn Signer + Send + Sync>) -> Self {
        Self {
            client,
            payer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let payer = config.load_wallet()?;
        Ok(Self::new(config.rpc_client(), Arc::new(payer)))
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.client
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IdlClientError::Closed(format!(
                "{operation} on connection to {}",
                self.client.url()
            )));
        }
        Ok(())
    }

    /// Signs with the payer, plus whichever request signers the message actually requires.
    fn sign(
        &self,
        instruction: Instruction,
        extra_signers: &[Arc<dyn Signer + Send + Sync>],
        blockhash: Hash,
    ) -> Result<Transaction> {
        let payer = self.payer.pubkey();
        let message = Message::new(&[instruction], Some(&payer));
        let required = &message.account_keys[..message.header.num_required_signatures as usize];

        let mut signers: Vec<&dyn Signer> = Vec::with_capacity(1 + extra_signers.len());
        signers.push(self.payer.as_ref());
        for signer in extra_signers {
            let pubkey = signer.pubkey();
            if required.contains(&pubkey) && !signers.iter().any(|s| s.pubkey() == pubkey) {
                signers.push(signer.as_ref());
            }
        }

        let mut tx = Transaction::new_unsigned(message);
        tx.try_sign(&signers, blockhash)
            .map_err(|e| IdlClientError::connection("sign transaction", e))?;
        Ok(tx)
    }

    async fn fetch_return_data(&self, signature: &Signature) -> Result<Option<(Pubkey, Vec<u8>)>> {
        let commitment = if self.client.commitment().is_at_least_confirmed() {
            self.client.commitment()
        } else {
            CommitmentConfig::confirmed()
        };
        let tx = self
            .client
            .get_transaction_with_config(
                signature,
                RpcTransactionConfig {
                    encoding: Some(UiTransactionEncoding::Base64),
                    commitment: Some(commitment),
                    max_supported_transaction_version: Some(0),
                },
            )
            .await
            .map_err(|e| IdlClientError::connection("get_transaction", e))?;
        let return_data: Option<UiTransactionReturnData> = tx
            .transaction
            .meta
            .and_then(|meta| meta.return_data.into());
        return_data.map(decode_return_data).transpose()
    }
}

#[async_trait]
impl Connection for RpcConnection {
    fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    async fn submit_instruction(&self, request: InstructionRequest) -> Result<SubmitOutcome> {
        self.ensure_open("submit_instruction")?;
        let blockhash = self
            .client
            .get_latest_blockhash()
            .await
            .map_err(|e| IdlClientError::connection("get_latest_blockhash", e))?;
        let tx = self.sign(request.instruction, &request.signers, blockhash)?;

        let signature = self
            .client
            .send_and_confirm_transaction(&tx)
            .await
            .map_err(|e| {
                let e = maybe_log_preflight_simulation_logs(e);
                IdlClientError::Connection {
                    operation: "send_and_confirm_transaction".to_string(),
                    program_error: custom_program_error(&e),
                    message: e.to_string(),
                }
            })?;
        log::debug!("confirmed transaction {signature}");

        let return_data = if request.return_data_expected {
            self.fetch_return_data(&signature).await?
        } else {
            None
        };
        Ok(SubmitOutcome {
            signature,
            return_data,
        })
    }

    async fn fetch_account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        self.ensure_open("fetch_account_bytes")?;
        let response = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .await
            .map_err(|e| IdlClientError::connection(format!("get_account {address}"), e))?;
        Ok(response.value.map(|account| account.data))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(IdlClientError::Closed(format!(
                "connection to {} was already closed",
                self.client.url()
            )));
        }
        Ok(())
    }
}

/// Opens one [RpcConnection] per program, all paid for by the same wallet.
pub struct RpcConnector {
    config: ProviderConfig,
    payer: Arc<dyn Signer + Send + Sync>,
}

impl RpcConnector {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let payer = Arc::new(config.load_wallet()?);
        Ok(Self { config, payer })
    }

    pub fn with_payer(config: ProviderConfig, payer: Arc<dyn Signer + Send + Sync>) -> Self {
        Self { config, payer }
    }
}

impl Connector for RpcConnector {
    fn connect(&self, program: &str) -> Result<Box<dyn Connection>> {
        log::debug!("connecting {program} to {}", self.config.url);
        Ok(Box::new(RpcConnection::new(
            self.config.rpc_client(),
            self.payer.clone(),
        )))
    }
}

/// Logs the transaction logs of a failed preflight simulation,
/// and hands the error back for further processing.
fn maybe_log_preflight_simulation_logs(err: ClientError) -> ClientError {
    if let ClientErrorKind::RpcError(RpcResponseError {
        data: SendTransactionPreflightFailure(RpcSimulateTransactionResult { logs: Some(logs), .. }),
        ..
    }) = &err.kind
    {
        logs.iter().for_each(|line| log::error!("{line}"));
    }
    err
}

fn custom_program_error(err: &ClientError) -> Option<ProgramErrorCode> {
    let tx_err = match &err.kind {
        ClientErrorKind::RpcError(RpcResponseError {
            data:
                SendTransactionPreflightFailure(RpcSimulateTransactionResult {
                    err: Some(tx_err), ..
                }),
            ..
        }) => tx_err,
        ClientErrorKind::TransactionError(tx_err) => tx_err,
        _ => return None,
    };
    match tx_err {
        TransactionError::InstructionError(_, InstructionError::Custom(code)) => Some(ProgramErrorCode {
            code: *code,
            name: None,
            msg: None,
        }),
        _ => None,
    }
}

/// The ledger records return data with its trailing zero bytes trimmed.
/// Padding back out to [MAX_RETURN_DATA] restores any encoding that was cut short,
/// and the decoder ignores whatever it does not consume.
fn decode_return_data(return_data: UiTransactionReturnData) -> Result<(Pubkey, Vec<u8>)> {
    let UiTransactionReturnData {
        program_id,
        data: (data, encoding),
    } = return_data;
    let program_id = Pubkey::from_str(&program_id)
        .map_err(|e| IdlClientError::connection("decode return data", e))?;
    let mut data = match encoding {
        UiReturnDataEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| IdlClientError::connection("decode return data", e))?,
    };
    if data.len() < MAX_RETURN_DATA {
        data.resize(MAX_RETURN_DATA, 0);
    }
    Ok((program_id, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn return_data(program_id: &Pubkey, base64: &str) -> (Pubkey, Vec<u8>) {
        decode_return_data(UiTransactionReturnData {
            program_id: program_id.to_string(),
            data: (base64.to_string(), UiReturnDataEncoding::Base64),
        })
        .unwrap()
    }

    #[test]
    fn return_data_is_base64() {
        let program_id = Pubkey::new_unique();
        let (id, data) = return_data(&program_id, "KgAAAAAAAAA=");
        assert_eq!(id, program_id);
        assert_eq!(&data[..8], 42u64.to_le_bytes().as_slice());
    }

    #[test]
    fn trimmed_return_data_is_padded_back_out() {
        let program_id = Pubkey::new_unique();
        // 42u64 as the ledger records it: a single byte.
        let (_, data) = return_data(&program_id, "Kg==");
        assert_eq!(data.len(), MAX_RETURN_DATA);
        assert_eq!(u64::from_le_bytes(data[..8].try_into().unwrap()), 42);

        // A zero return value is recorded as nothing at all.
        let (_, data) = return_data(&program_id, "");
        assert_eq!(data, vec![0; MAX_RETURN_DATA]);

        // Full-size data is left alone.
        let full = base64::engine::general_purpose::STANDARD.encode(vec![1u8; MAX_RETURN_DATA]);
        let (_, data) = return_data(&program_id, &full);
        assert_eq!(data, vec![1; MAX_RETURN_DATA]);
    }

    #[test]
    fn custom_codes_are_extracted() {
        let err = ClientError::from(TransactionError::InstructionError(
            0,
            InstructionError::Custom(6000),
        ));
        assert_eq!(custom_program_error(&err).unwrap().code, 6000);
        let err = ClientError::from(TransactionError::AccountNotFound);
        assert!(custom_program_error(&err).is_none());
    }

    #[tokio::test]
    async fn closed_connections_reject_calls() {
        let connection = RpcConnection::new(
            RpcClient::new("http://127.0.0.1:8899".to_string()),
            Arc::new(solana_sdk::signature::Keypair::new()),
        );
        connection.close().await.unwrap();
        let err = connection
            .fetch_account_bytes(&Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, IdlClientError::Closed(_)));
        assert!(matches!(connection.close().await, Err(IdlClientError::Closed(_))));
    }
}
