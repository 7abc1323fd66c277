use crate::connection::{with_deadline, Connection};
use crate::discriminator::{partition_discriminator_from_data, to_hex, Discriminator, DISCRIMINATOR_LEN};
use crate::error::{IdlClientError, Result};
use crate::schema::{AccountDefinition, Schema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// A decoded account, tagged with the account type it was checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRecord {
    pub account_type: String,
    pub address: Pubkey,
    pub value: Value,
}

impl TypedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }

    /// Convert into any type with a matching `serde` shape.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            IdlClientError::schema_violation(&self.account_type, format!("cannot deserialize: {e}"))
        })
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}

impl Schema {
    /// Check the discriminator of some account data against the named account type,
    /// then decode the remainder. Bytes past the end of the struct are ignored.
    pub fn decode_account(&self, definition: &AccountDefinition, address: &Pubkey, data: &[u8]) -> Result<Value> {
        let (discriminator, mut rest) =
            partition_discriminator_from_data(data).ok_or_else(|| IdlClientError::TruncatedData {
                path: definition.name().to_string(),
                needed: DISCRIMINATOR_LEN,
                available: data.len(),
            })?;
        if discriminator != definition.discriminator {
            return Err(IdlClientError::TypeMismatch {
                address: address.to_string(),
                expected: definition.name().to_string(),
                found: self.describe_discriminator(&discriminator),
            });
        }
        self.decode_struct_or_enum(&definition.type_definition, &mut rest, definition.name())
    }

    /// Deserialize account data to a [Value] by inferring its type from the discriminator.
    pub fn try_account_data_to_value(&self, address: &Pubkey, data: &[u8]) -> Result<TypedRecord> {
        let definition = self.account_by_discriminator(data).ok_or_else(|| {
            let found = partition_discriminator_from_data(data)
                .map(|(discriminator, _)| self.describe_discriminator(&discriminator))
                .unwrap_or_else(|| format!("{} bytes of data", data.len()));
            IdlClientError::TypeMismatch {
                address: address.to_string(),
                expected: format!("any account type of {}", self.name),
                found,
            }
        })?;
        Ok(TypedRecord {
            account_type: definition.name().to_string(),
            address: *address,
            value: self.decode_account(definition, address, data)?,
        })
    }

    fn describe_discriminator(&self, discriminator: &Discriminator) -> String {
        match self.account_by_discriminator(discriminator) {
            Some(other) => other.name().to_string(),
            None => format!("unknown discriminator {}", to_hex(discriminator)),
        }
    }
}

/// Reads and decodes accounts of one declared type.
///
/// Every [fetch](Self::fetch) goes to the connection. Nothing is cached.
pub struct AccountAccessor<'a> {
    schema: &'a Schema,
    definition: &'a AccountDefinition,
    connection: &'a dyn Connection,
    timeout: Duration,
}

impl<'a> AccountAccessor<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        definition: &'a AccountDefinition,
        connection: &'a dyn Connection,
        timeout: Duration,
    ) -> Self {
        Self {
            schema,
            definition,
            connection,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn discriminator(&self) -> Discriminator {
        self.definition.discriminator
    }

    /// Bound this accessor's fetches by `timeout` instead of the client default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn fetch(&self, address: &Pubkey) -> Result<TypedRecord> {
        log::debug!("fetching {} account {address}", self.name());
        let operation = format!("fetch {} {address}", self.name());
        let data = with_deadline(operation, self.timeout, self.connection.fetch_account_bytes(address))
            .await?
            .filter(|data| !data.is_empty())
            .ok_or(IdlClientError::AccountNotFound(*address))?;
        self.decode(address, &data)
    }

    /// Same checks as [fetch](Self::fetch), on bytes already in hand.
    pub fn decode(&self, address: &Pubkey, data: &[u8]) -> Result<TypedRecord> {
        Ok(TypedRecord {
            account_type: self.name().to_string(),
            address: *address,
            value: self.schema.decode_account(self.definition, address, data)?,
        })
    }

    /// Encode a value of this account type, discriminator first.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut data = self.definition.discriminator.to_vec();
        self.schema.encode_struct_or_enum(
            &self.definition.type_definition,
            value,
            &mut data,
            self.name(),
        )?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discriminator::account_discriminator;
    use crate::idl::Idl;
    use serde::Deserialize;
    use serde_json::json;

    fn schema() -> Schema {
        let idl: Idl = serde_json::from_value(json!({
            "name": "basic_2",
            "instructions": [],
            "accounts": [
                {"name": "Counter", "type": {"kind": "struct", "fields": [
                    {"name": "authority", "type": "publicKey"},
                    {"name": "count", "type": "u64"}
                ]}},
                {"name": "Data", "type": {"kind": "struct", "fields": [
                    {"name": "data", "type": "u64"}
                ]}}
            ]
        }))
        .unwrap();
        Schema::new(idl).unwrap()
    }

    fn counter_bytes(authority: &Pubkey, count: u64) -> Vec<u8> {
        let mut data = account_discriminator("Counter").to_vec();
        data.extend(authority.to_bytes());
        data.extend(count.to_le_bytes());
        data
    }

    #[test]
    fn decodes_with_trailing_bytes() {
        let schema = schema();
        let authority = Pubkey::new_unique();
        let mut data = counter_bytes(&authority, 7);
        data.extend([0u8; 16]);
        let definition = schema.account("Counter").unwrap();
        let value = schema.decode_account(definition, &Pubkey::new_unique(), &data).unwrap();
        assert_eq!(value, json!({"authority": authority.to_string(), "count": 7}));
    }

    #[test]
    fn wrong_discriminator_names_the_actual_type() {
        let schema = schema();
        let address = Pubkey::new_unique();
        let mut data = account_discriminator("Data").to_vec();
        data.extend(1u64.to_le_bytes());
        let err = schema
            .decode_account(schema.account("Counter").unwrap(), &address, &data)
            .unwrap_err();
        match err {
            IdlClientError::TypeMismatch {
                address: a,
                expected,
                found,
            } => {
                assert_eq!(a, address.to_string());
                assert_eq!(expected, "Counter");
                assert_eq!(found, "Data");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = schema
            .decode_account(schema.account("Counter").unwrap(), &address, &[0; 48])
            .unwrap_err();
        assert!(matches!(err, IdlClientError::TypeMismatch { ref found, .. } if found.starts_with("unknown discriminator 0000")));
    }

    #[test]
    fn short_data_is_truncated() {
        let schema = schema();
        let err = schema
            .decode_account(schema.account("Counter").unwrap(), &Pubkey::new_unique(), &[1, 2])
            .unwrap_err();
        assert!(matches!(err, IdlClientError::TruncatedData { needed: 8, available: 2, .. }));

        let data = &counter_bytes(&Pubkey::new_unique(), 1)[..20];
        let err = schema
            .decode_account(schema.account("Counter").unwrap(), &Pubkey::new_unique(), data)
            .unwrap_err();
        assert!(matches!(err, IdlClientError::TruncatedData { ref path, .. } if path == "Counter.authority"));
    }

    #[test]
    fn infers_the_account_type() {
        let schema = schema();
        let authority = Pubkey::new_unique();
        let address = Pubkey::new_unique();
        let record = schema
            .try_account_data_to_value(&address, &counter_bytes(&authority, 3))
            .unwrap();
        assert_eq!(record.account_type, "Counter");
        assert_eq!(record.address, address);
        assert_eq!(record.get("count"), Some(&json!(3)));

        #[derive(Deserialize)]
        struct Counter {
            authority: String,
            count: u64,
        }
        let counter: Counter = record.deserialize().unwrap();
        assert_eq!(counter.authority, authority.to_string());
        assert_eq!(counter.count, 3);
    }
}
