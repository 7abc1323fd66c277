//! `serde_json::Value` --(using some IDL type)--> Borsh-encoded bytes
use crate::error::{IdlClientError, Result};
use crate::idl::{EnumFields, IdlField, IdlType, IdlTypeDefinition, IdlTypeDefinitionTy};
use crate::schema::Schema;
use borsh::BorshSerialize;
use serde_json::{Map, Value};
use solana_sdk::pubkey::Pubkey;
use std::io::Write;
use std::str::FromStr;

use super::descend;

impl Schema {
    pub fn encode_struct_or_enum<W: Write>(
        &self,
        type_definition: &IdlTypeDefinition,
        value: &Value,
        out: &mut W,
        path: &str,
    ) -> Result<()> {
        self.encode_definition(type_definition, value, out, path, 0)
    }

    /// Serialize a [Value] to raw byte data based on a given [IdlType].
    pub fn encode_idl_type<W: Write>(
        &self,
        idl_type: &IdlType,
        value: &Value,
        out: &mut W,
        path: &str,
    ) -> Result<()> {
        self.encode_value(idl_type, value, out, path, 0)
    }

    /// Fields are written in declaration order. Missing or unknown keys are rejected.
    pub fn encode_named_fields<W: Write>(
        &self,
        fields: &[IdlField],
        value: &Value,
        out: &mut W,
        path: &str,
    ) -> Result<()> {
        self.encode_fields(fields, value, out, path, 0)
    }

    fn encode_definition<W: Write>(
        &self,
        type_definition: &IdlTypeDefinition,
        value: &Value,
        out: &mut W,
        path: &str,
        depth: usize,
    ) -> Result<()> {
        match &type_definition.ty {
            IdlTypeDefinitionTy::Struct { fields } => self.encode_fields(fields, value, out, path, depth),
            IdlTypeDefinitionTy::Enum { variants } => {
                let (variant_name, payload) = from_tagged_enum(value, path)?;
                let (idx, variant) = variants
                    .iter()
                    .enumerate()
                    .find(|(_, v)| v.name == variant_name)
                    .ok_or_else(|| {
                        IdlClientError::schema_violation(
                            path,
                            format!("no variant named {variant_name} in {}", type_definition.name),
                        )
                    })?;
                let idx = u8::try_from(idx).map_err(|_| {
                    IdlClientError::schema_violation(path, format!("variant index {idx} exceeds u8"))
                })?;
                write_borsh(&idx, out, path)?;
                let path = format!("{path}::{variant_name}");
                match &variant.fields {
                    None => match payload {
                        None | Some(Value::Null) => Ok(()),
                        Some(Value::Object(m)) if m.is_empty() => Ok(()),
                        Some(other) => Err(IdlClientError::schema_violation(
                            path,
                            format!("unit variant takes no payload, found {other}"),
                        )),
                    },
                    Some(EnumFields::Named(fields)) => {
                        let payload = payload.ok_or_else(|| {
                            IdlClientError::schema_violation(&path, "missing variant fields")
                        })?;
                        self.encode_fields(fields, payload, out, &path, depth)
                    }
                    Some(EnumFields::Tuple(types)) => {
                        let items = payload.and_then(Value::as_array).ok_or_else(|| {
                            IdlClientError::schema_violation(&path, "expected an array of variant fields")
                        })?;
                        if items.len() != types.len() {
                            return Err(IdlClientError::schema_violation(
                                path,
                                format!("expected {} variant fields, found {}", types.len(), items.len()),
                            ));
                        }
                        for (i, (ty, item)) in types.iter().zip(items).enumerate() {
                            self.encode_value(ty, item, out, &format!("{path}.{i}"), depth)?;
                        }
                        Ok(())
                    }
                }
            }
            IdlTypeDefinitionTy::Alias { value: ty } => self.encode_value(ty, value, out, path, depth),
        }
    }

    fn encode_value<W: Write>(
        &self,
        idl_type: &IdlType,
        value: &Value,
        out: &mut W,
        path: &str,
        depth: usize,
    ) -> Result<()> {
        let depth = descend(depth, path)?;
        match idl_type {
            IdlType::Bool => {
                let b = value
                    .as_bool()
                    .ok_or_else(|| expected(path, "a bool", value))?;
                write_borsh(&b, out, path)
            }
            IdlType::U8 => write_borsh(&unsigned_int::<u8>(value, path, "u8")?, out, path),
            IdlType::U16 => write_borsh(&unsigned_int::<u16>(value, path, "u16")?, out, path),
            IdlType::U32 => write_borsh(&unsigned_int::<u32>(value, path, "u32")?, out, path),
            IdlType::U64 => write_borsh(&unsigned_int::<u64>(value, path, "u64")?, out, path),
            IdlType::I8 => write_borsh(&signed_int::<i8>(value, path, "i8")?, out, path),
            IdlType::I16 => write_borsh(&signed_int::<i16>(value, path, "i16")?, out, path),
            IdlType::I32 => write_borsh(&signed_int::<i32>(value, path, "i32")?, out, path),
            IdlType::I64 => write_borsh(&signed_int::<i64>(value, path, "i64")?, out, path),
            IdlType::U128 => write_borsh(&wide_int::<u128>(value, path, "u128")?, out, path),
            IdlType::I128 => write_borsh(&wide_int::<i128>(value, path, "i128")?, out, path),
            IdlType::F32 => {
                let f = finite_float(value, path)?;
                let narrowed = f as f32;
                if narrowed.is_infinite() {
                    return Err(IdlClientError::schema_violation(
                        path,
                        format!("{f} is out of range for f32"),
                    ));
                }
                write_borsh(&narrowed, out, path)
            }
            IdlType::F64 => write_borsh(&finite_float(value, path)?, out, path),
            IdlType::U256 | IdlType::I256 => Err(IdlClientError::schema_violation(
                path,
                format!("{idl_type} is not supported"),
            )),
            IdlType::Bytes => {
                let items = value
                    .as_array()
                    .ok_or_else(|| expected(path, "an array of bytes", value))?;
                let bytes = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| unsigned_int::<u8>(item, &format!("{path}[{i}]"), "u8"))
                    .collect::<Result<Vec<u8>>>()?;
                write_len(bytes.len(), out, path)?;
                write_all(&bytes, out, path)
            }
            IdlType::String => {
                let s = value
                    .as_str()
                    .ok_or_else(|| expected(path, "a string", value))?;
                write_len(s.len(), out, path)?;
                write_all(s.as_bytes(), out, path)
            }
            IdlType::PublicKey => {
                let s = value
                    .as_str()
                    .ok_or_else(|| expected(path, "a base58 public key", value))?;
                let pubkey = Pubkey::from_str(s).map_err(|e| {
                    IdlClientError::schema_violation(path, format!("invalid public key {s:?}: {e}"))
                })?;
                write_all(&pubkey.to_bytes(), out, path)
            }
            IdlType::Defined(name) => {
                let ty_def = self.find_type_definition_by_name(name).ok_or_else(|| {
                    IdlClientError::schema_violation(path, format!("unresolved type reference: {name}"))
                })?;
                self.encode_definition(ty_def, value, out, path, depth)
            }
            IdlType::Option(inner) => match value {
                Value::Null => write_borsh(&0u8, out, path),
                some => {
                    write_borsh(&1u8, out, path)?;
                    self.encode_value(inner, some, out, path, depth)
                }
            },
            IdlType::Vec(inner) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| expected(path, "an array", value))?;
                write_len(items.len(), out, path)?;
                for (i, item) in items.iter().enumerate() {
                    self.encode_value(inner, item, out, &format!("{path}[{i}]"), depth)?;
                }
                Ok(())
            }
            IdlType::Array(inner, len) => {
                let items = value
                    .as_array()
                    .ok_or_else(|| expected(path, "an array", value))?;
                if items.len() != *len {
                    return Err(IdlClientError::schema_violation(
                        path,
                        format!("expected exactly {len} elements, found {}", items.len()),
                    ));
                }
                for (i, item) in items.iter().enumerate() {
                    self.encode_value(inner, item, out, &format!("{path}[{i}]"), depth)?;
                }
                Ok(())
            }
        }
    }

    fn encode_fields<W: Write>(
        &self,
        fields: &[IdlField],
        value: &Value,
        out: &mut W,
        path: &str,
        depth: usize,
    ) -> Result<()> {
        let map = value
            .as_object()
            .ok_or_else(|| expected(path, "an object", value))?;
        reject_unknown_fields(fields, map, path)?;
        for field in fields {
            let field_path = format!("{path}.{}", field.name);
            let inner = map.get(&field.name).ok_or_else(|| {
                IdlClientError::schema_violation(&field_path, "missing field")
            })?;
            self.encode_value(&field.ty, inner, out, &field_path, depth)?;
        }
        Ok(())
    }
}

/// Accepts `{"Variant": payload}`, or a bare `"Variant"` string for unit variants.
fn from_tagged_enum<'a>(value: &'a Value, path: &str) -> Result<(&'a str, Option<&'a Value>)> {
    match value {
        Value::String(name) => Ok((name.as_str(), None)),
        Value::Object(map) if map.len() == 1 => {
            let (name, payload) = map
                .iter()
                .next()
                .ok_or_else(|| expected(path, "a single-key enum object", value))?;
            Ok((name.as_str(), Some(payload)))
        }
        other => Err(expected(path, "a single-key enum object", other)),
    }
}

fn reject_unknown_fields(fields: &[IdlField], map: &Map<String, Value>, path: &str) -> Result<()> {
    match map.keys().find(|key| !fields.iter().any(|f| &f.name == *key)) {
        Some(unknown) => Err(IdlClientError::schema_violation(
            format!("{path}.{unknown}"),
            "unknown field",
        )),
        None => Ok(()),
    }
}

fn expected(path: &str, what: &str, found: &Value) -> IdlClientError {
    IdlClientError::schema_violation(path, format!("expected {what}, found {found}"))
}

fn write_borsh<T: BorshSerialize, W: Write>(value: &T, out: &mut W, path: &str) -> Result<()> {
    value
        .serialize(out)
        .map_err(|e| IdlClientError::schema_violation(path, e.to_string()))
}

fn write_all<W: Write>(bytes: &[u8], out: &mut W, path: &str) -> Result<()> {
    out.write_all(bytes)
        .map_err(|e| IdlClientError::schema_violation(path, e.to_string()))
}

fn write_len<W: Write>(len: usize, out: &mut W, path: &str) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| {
        IdlClientError::schema_violation(path, format!("length {len} does not fit a u32 prefix"))
    })?;
    write_borsh(&len, out, path)
}

/// Integers up to 64 bits are taken from JSON numbers.
fn unsigned_int<T: TryFrom<u64>>(value: &Value, path: &str, name: &str) -> Result<T> {
    let n = value
        .as_u64()
        .ok_or_else(|| expected(path, &format!("an unsigned integer ({name})"), value))?;
    T::try_from(n)
        .map_err(|_| IdlClientError::schema_violation(path, format!("{n} is out of range for {name}")))
}

fn signed_int<T: TryFrom<i64>>(value: &Value, path: &str, name: &str) -> Result<T> {
    let n = value
        .as_i64()
        .ok_or_else(|| expected(path, &format!("an integer ({name})"), value))?;
    T::try_from(n)
        .map_err(|_| IdlClientError::schema_violation(path, format!("{n} is out of range for {name}")))
}

/// 128-bit integers are decimal strings, though plain JSON numbers are accepted too.
fn wide_int<T>(value: &Value, path: &str, name: &str) -> Result<T>
where
    T: FromStr + TryFrom<u64> + TryFrom<i64>,
{
    let parsed = match value {
        Value::String(s) => s.trim().parse::<T>().ok(),
        Value::Number(n) => match (n.as_u64(), n.as_i64()) {
            (Some(u), _) => T::try_from(u).ok(),
            (None, Some(i)) => T::try_from(i).ok(),
            _ => None,
        },
        _ => return Err(expected(path, &format!("a decimal string ({name})"), value)),
    };
    parsed.ok_or_else(|| IdlClientError::schema_violation(path, format!("{value} is not a valid {name}")))
}

fn finite_float(value: &Value, path: &str) -> Result<f64> {
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .ok_or_else(|| expected(path, "a finite number", value))
}
