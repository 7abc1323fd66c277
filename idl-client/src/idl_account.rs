//! The on-chain IDL account written by `anchor idl init`:
//! an 8-byte discriminator, the upgrade authority, a `u32` length,
//! and the zlib-compressed JSON document.
use crate::connection::Connection;
use crate::discriminator::{account_discriminator, partition_discriminator_from_data, DISCRIMINATOR_LEN};
use crate::error::{IdlClientError, Result};
use crate::idl::Idl;
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use solana_sdk::pubkey::Pubkey;
use std::io::{Read, Write};

pub const IDL_SEED: &str = "anchor:idl";
pub const IDL_ACCOUNT_NAME: &str = "IdlAccount";
/// Discriminator, authority and length prefix.
pub const IDL_HEADER_LEN: usize = DISCRIMINATOR_LEN + 32 + 4;

pub fn idl_address(program_id: &Pubkey) -> Result<Pubkey> {
    let base = Pubkey::find_program_address(&[], program_id).0;
    Pubkey::create_with_seed(&base, IDL_SEED, program_id)
        .map_err(|e| IdlClientError::InvalidIdl(format!("cannot derive IDL address: {e}")))
}

/// Deserialize (and decompress) an IDL account, including its header.
/// Returns the authority along with the document.
pub fn deserialize_idl_account(data: &[u8]) -> Result<(Pubkey, Idl)> {
    let (discriminator, rest) =
        partition_discriminator_from_data(data).ok_or_else(|| IdlClientError::TruncatedData {
            path: IDL_ACCOUNT_NAME.to_string(),
            needed: IDL_HEADER_LEN,
            available: data.len(),
        })?;
    if discriminator != account_discriminator(IDL_ACCOUNT_NAME) {
        return Err(IdlClientError::InvalidIdl(
            "account data is not an Anchor IDL account".to_string(),
        ));
    }
    if data.len() < IDL_HEADER_LEN {
        return Err(IdlClientError::TruncatedData {
            path: IDL_ACCOUNT_NAME.to_string(),
            needed: IDL_HEADER_LEN,
            available: data.len(),
        });
    }
    let (authority, rest) = rest.split_at(32);
    let authority = Pubkey::try_from(authority)
        .map_err(|e| IdlClientError::InvalidIdl(e.to_string()))?;
    let (len, compressed) = rest.split_at(4);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(len);
    let compressed_len = u32::from_le_bytes(len_bytes) as usize;
    let compressed = compressed.get(..compressed_len).ok_or_else(|| IdlClientError::TruncatedData {
        path: format!("{IDL_ACCOUNT_NAME}.data"),
        needed: compressed_len,
        available: compressed.len(),
    })?;

    let mut json = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut json)
        .map_err(|e| IdlClientError::InvalidIdl(format!("cannot decompress IDL: {e}")))?;
    Ok((authority, Idl::from_slice(&json)?))
}

/// Serialize an IDL account, including the header.
pub fn serialize_idl_account(idl: &Idl, authority: &Pubkey) -> Result<Vec<u8>> {
    let idl_data = serialize_and_compress_idl(idl)?;
    let data_len = u32::try_from(idl_data.len())
        .map_err(|_| IdlClientError::InvalidIdl("compressed IDL exceeds u32::MAX bytes".to_string()))?;
    let mut account_data = Vec::with_capacity(IDL_HEADER_LEN + idl_data.len());
    account_data.extend(account_discriminator(IDL_ACCOUNT_NAME));
    account_data.extend(authority.to_bytes());
    account_data.extend(data_len.to_le_bytes());
    account_data.extend(idl_data);
    Ok(account_data)
}

/// Serialize and compress an [Idl] (the account body, without the header).
pub fn serialize_and_compress_idl(idl: &Idl) -> Result<Vec<u8>> {
    let json_bytes = serde_json::to_vec(idl).map_err(|e| IdlClientError::InvalidIdl(e.to_string()))?;
    let mut e = ZlibEncoder::new(Vec::new(), Compression::default());
    e.write_all(&json_bytes)
        .map_err(|e| IdlClientError::InvalidIdl(format!("cannot compress IDL: {e}")))?;
    e.finish()
        .map_err(|e| IdlClientError::InvalidIdl(format!("cannot compress IDL: {e}")))
}

/// Fetch and decode the IDL a program published on chain.
pub async fn fetch_idl(connection: &dyn Connection, program_id: &Pubkey) -> Result<Idl> {
    let address = idl_address(program_id)?;
    log::debug!("fetching IDL of {program_id} from {address}");
    let data = connection
        .fetch_account_bytes(&address)
        .await?
        .ok_or_else(|| IdlClientError::NotFound {
            kind: "IDL account",
            name: format!("{address} (program {program_id})"),
        })?;
    Ok(deserialize_idl_account(&data)?.1)
}
