//! Borsh-encoded bytes --(using some IDL type)--> `serde_json::Value`
use crate::error::{IdlClientError, Result};
use crate::idl::{EnumFields, IdlField, IdlType, IdlTypeDefinition, IdlTypeDefinitionTy};
use crate::schema::Schema;
use borsh::BorshDeserialize;
use serde_json::{Map, Number, Value};
use solana_sdk::pubkey::Pubkey;

use super::{descend, LENGTH_PREFIX, PUBKEY_LEN};

impl Schema {
    /// Top level deserialization routine for some data against a named type definition.
    pub fn decode_struct_or_enum(
        &self,
        type_definition: &IdlTypeDefinition,
        data: &mut &[u8],
        path: &str,
    ) -> Result<Value> {
        self.decode_definition(type_definition, data, path, 0)
    }

    /// Deserialize from raw byte data based on a given [IdlType],
    /// advancing `data` past the bytes consumed.
    pub fn decode_idl_type(&self, idl_type: &IdlType, data: &mut &[u8], path: &str) -> Result<Value> {
        self.decode_value(idl_type, data, path, 0)
    }

    /// Deserialize a collection of named fields, on a struct or a struct-like enum variant.
    pub fn decode_named_fields(&self, fields: &[IdlField], data: &mut &[u8], path: &str) -> Result<Value> {
        self.decode_fields(fields, data, path, 0)
    }

    fn decode_definition(
        &self,
        type_definition: &IdlTypeDefinition,
        data: &mut &[u8],
        path: &str,
        depth: usize,
    ) -> Result<Value> {
        match &type_definition.ty {
            IdlTypeDefinitionTy::Struct { fields } => self.decode_fields(fields, data, path, depth),
            IdlTypeDefinitionTy::Enum { variants } => {
                let tag: u8 = read_borsh(data, 1, path)?;
                let variant = variants.get(tag as usize).ok_or_else(|| {
                    IdlClientError::schema_violation(
                        path,
                        format!(
                            "variant index {tag} out of range for {} ({} variants)",
                            type_definition.name,
                            variants.len()
                        ),
                    )
                })?;
                let path = format!("{path}::{}", variant.name);
                let payload = match &variant.fields {
                    None => Value::Null,
                    Some(EnumFields::Named(fields)) => self.decode_fields(fields, data, &path, depth)?,
                    Some(EnumFields::Tuple(types)) => Value::Array(
                        types
                            .iter()
                            .enumerate()
                            .map(|(i, ty)| self.decode_value(ty, data, &format!("{path}.{i}"), depth))
                            .collect::<Result<Vec<_>>>()?,
                    ),
                };
                let mut map = Map::new();
                map.insert(variant.name.clone(), payload);
                Ok(Value::Object(map))
            }
            IdlTypeDefinitionTy::Alias { value } => self.decode_value(value, data, path, depth),
        }
    }

    fn decode_value(&self, idl_type: &IdlType, data: &mut &[u8], path: &str, depth: usize) -> Result<Value> {
        let depth = descend(depth, path)?;
        Ok(match idl_type {
            IdlType::Bool => Value::Bool(read_borsh(data, 1, path)?),
            IdlType::U8 => read_borsh::<u8>(data, 1, path)?.into(),
            IdlType::I8 => read_borsh::<i8>(data, 1, path)?.into(),
            IdlType::U16 => read_borsh::<u16>(data, 2, path)?.into(),
            IdlType::I16 => read_borsh::<i16>(data, 2, path)?.into(),
            IdlType::U32 => read_borsh::<u32>(data, 4, path)?.into(),
            IdlType::I32 => read_borsh::<i32>(data, 4, path)?.into(),
            IdlType::U64 => read_borsh::<u64>(data, 8, path)?.into(),
            IdlType::I64 => read_borsh::<i64>(data, 8, path)?.into(),
            IdlType::F32 => float(read_borsh::<f32>(data, 4, path)? as f64, path)?,
            IdlType::F64 => float(read_borsh::<f64>(data, 8, path)?, path)?,
            IdlType::U128 => Value::String(read_borsh::<u128>(data, 16, path)?.to_string()),
            IdlType::I128 => Value::String(read_borsh::<i128>(data, 16, path)?.to_string()),
            IdlType::U256 | IdlType::I256 => {
                return Err(IdlClientError::schema_violation(
                    path,
                    format!("{idl_type} is not supported"),
                ))
            }
            IdlType::Bytes => {
                let len = read_len(data, path)?;
                let bytes = take(data, len, path)?;
                Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
            }
            IdlType::String => {
                let len = read_len(data, path)?;
                let bytes = take(data, len, path)?;
                let s = std::str::from_utf8(bytes).map_err(|e| {
                    IdlClientError::schema_violation(path, format!("invalid UTF-8 string: {e}"))
                })?;
                Value::String(s.to_string())
            }
            IdlType::PublicKey => {
                let bytes = take(data, PUBKEY_LEN, path)?;
                let pubkey = Pubkey::try_from(bytes)
                    .map_err(|e| IdlClientError::schema_violation(path, e.to_string()))?;
                Value::String(pubkey.to_string())
            }
            IdlType::Defined(name) => {
                let ty_def = self.find_type_definition_by_name(name).ok_or_else(|| {
                    IdlClientError::schema_violation(path, format!("unresolved type reference: {name}"))
                })?;
                self.decode_definition(ty_def, data, path, depth)?
            }
            IdlType::Option(inner) => match read_borsh::<u8>(data, 1, path)? {
                0 => Value::Null,
                1 => self.decode_value(inner, data, path, depth)?,
                tag => {
                    return Err(IdlClientError::schema_violation(
                        path,
                        format!("invalid option tag {tag}"),
                    ))
                }
            },
            IdlType::Vec(inner) => {
                let len = read_len(data, path)?;
                // Zero-sized elements are charged one byte each, so the prefix
                // can never claim more elements than there are bytes left.
                self.check_elements(inner, len, data, path, 1)?;
                let mut values = Vec::with_capacity(len);
                for i in 0..len {
                    values.push(self.decode_value(inner, data, &format!("{path}[{i}]"), depth)?);
                }
                Value::Array(values)
            }
            IdlType::Array(inner, len) => {
                self.check_elements(inner, *len, data, path, 0)?;
                let mut values = Vec::with_capacity((*len).min(data.len()));
                for i in 0..*len {
                    values.push(self.decode_value(inner, data, &format!("{path}[{i}]"), depth)?);
                }
                Value::Array(values)
            }
        })
    }

    fn decode_fields(&self, fields: &[IdlField], data: &mut &[u8], path: &str, depth: usize) -> Result<Value> {
        let mut map = Map::new();
        for field in fields {
            let value = self.decode_value(&field.ty, data, &format!("{path}.{}", field.name), depth)?;
            map.insert(field.name.clone(), value);
        }
        Ok(Value::Object(map))
    }

    /// Fails unless `data` holds at least `len` elements of `inner`, each taking
    /// no fewer than `floor` bytes.
    fn check_elements(&self, inner: &IdlType, len: usize, data: &[u8], path: &str, floor: usize) -> Result<()> {
        let needed = len.saturating_mul(self.min_len_of_idl_type(inner).max(floor));
        if needed > data.len() {
            return Err(IdlClientError::TruncatedData {
                path: path.to_string(),
                needed,
                available: data.len(),
            });
        }
        Ok(())
    }
}

/// Split `len` bytes off the front of `data`.
pub(super) fn take<'a>(data: &mut &'a [u8], len: usize, path: &str) -> Result<&'a [u8]> {
    if data.len() < len {
        return Err(IdlClientError::TruncatedData {
            path: path.to_string(),
            needed: len,
            available: data.len(),
        });
    }
    let (head, rest) = data.split_at(len);
    *data = rest;
    Ok(head)
}

fn read_borsh<T: BorshDeserialize>(data: &mut &[u8], width: usize, path: &str) -> Result<T> {
    let mut bytes = take(data, width, path)?;
    T::deserialize(&mut bytes).map_err(|e| IdlClientError::schema_violation(path, e.to_string()))
}

fn read_len(data: &mut &[u8], path: &str) -> Result<usize> {
    Ok(read_borsh::<u32>(data, LENGTH_PREFIX, path)? as usize)
}

fn float(value: f64, path: &str) -> Result<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| IdlClientError::schema_violation(path, format!("non-finite float {value}")))
}
