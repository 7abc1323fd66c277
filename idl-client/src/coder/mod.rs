//! Conversion between Borsh bytes and `serde_json::Value`, driven by a [Schema].
//!
//! | IDL type            | JSON value                                  |
//! |---------------------|---------------------------------------------|
//! | bool                | `true` / `false`                            |
//! | u8 ..= u64, i8 ..= i64, f32, f64 | number                         |
//! | u128, i128          | decimal string (numbers accepted on encode) |
//! | string              | string                                      |
//! | bytes               | array of numbers                            |
//! | publicKey           | base58 string                               |
//! | option              | `null` or the inner value                   |
//! | vec, array          | array                                       |
//! | struct              | object, keys in declaration order           |
//! | enum                | `{"Variant": payload}`, payload `null`, object or array |
mod decode;
mod encode;

use crate::error::{IdlClientError, Result};
use crate::idl::{IdlType, IdlTypeDefinition, IdlTypeDefinitionTy};
use crate::schema::Schema;
use serde_json::Value;

pub(crate) const LENGTH_PREFIX: usize = 4;
pub(crate) const PUBKEY_LEN: usize = 32;

/// Deepest nesting of IDL types the coder will follow. Types may recurse
/// through `option`, `vec` and enums, so the data decides how deep a value goes.
pub const MAX_DEPTH: usize = 128;

impl Schema {
    /// Encode `value` as `ty`. Never writes partial output on failure.
    pub fn encode(&self, ty: &IdlType, value: &Value) -> Result<Vec<u8>> {
        let mut out = vec![];
        self.encode_idl_type(ty, value, &mut out, &ty.to_string())?;
        Ok(out)
    }

    /// Encode `value` against a named type, account type, or the state struct.
    pub fn encode_type(&self, type_name: &str, value: &Value) -> Result<Vec<u8>> {
        let type_def = self.type_definition(type_name)?;
        let mut out = vec![];
        self.encode_struct_or_enum(type_def, value, &mut out, type_name)?;
        Ok(out)
    }

    /// Decode one `ty` starting at `offset`.
    /// Returns the value and the number of bytes consumed.
    pub fn decode(&self, ty: &IdlType, bytes: &[u8], offset: usize) -> Result<(Value, usize)> {
        let mut data = remaining(bytes, offset, &ty.to_string())?;
        let start = data.len();
        let value = self.decode_idl_type(ty, &mut data, &ty.to_string())?;
        Ok((value, start - data.len()))
    }

    pub fn decode_type(&self, type_name: &str, bytes: &[u8], offset: usize) -> Result<(Value, usize)> {
        let type_def = self.type_definition(type_name)?;
        let mut data = remaining(bytes, offset, type_name)?;
        let start = data.len();
        let value = self.decode_struct_or_enum(type_def, &mut data, type_name)?;
        Ok((value, start - data.len()))
    }

    fn type_definition(&self, type_name: &str) -> Result<&IdlTypeDefinition> {
        self.find_type_definition_by_name(type_name)
            .ok_or_else(|| IdlClientError::NotFound {
                kind: "type",
                name: type_name.to_string(),
            })
    }

    /// The fewest bytes any encoding of `ty` can occupy.
    pub fn min_len_of_idl_type(&self, ty: &IdlType) -> usize {
        match ty {
            IdlType::Bool | IdlType::U8 | IdlType::I8 => 1,
            IdlType::U16 | IdlType::I16 => 2,
            IdlType::U32 | IdlType::I32 | IdlType::F32 => 4,
            IdlType::U64 | IdlType::I64 | IdlType::F64 => 8,
            IdlType::U128 | IdlType::I128 => 16,
            IdlType::U256 | IdlType::I256 | IdlType::PublicKey => 32,
            IdlType::Bytes | IdlType::String | IdlType::Vec(_) => LENGTH_PREFIX,
            IdlType::Option(_) => 1,
            IdlType::Array(inner, len) => self.min_len_of_idl_type(inner).saturating_mul(*len),
            // Terminates because the schema has no unprefixed cycles.
            IdlType::Defined(name) => match self.find_type_definition_by_name(name) {
                Some(ty_def) => self.min_len_of_type_definition(ty_def),
                None => 0,
            },
        }
    }

    fn min_len_of_type_definition(&self, ty_def: &IdlTypeDefinition) -> usize {
        match &ty_def.ty {
            IdlTypeDefinitionTy::Struct { fields } => fields
                .iter()
                .map(|f| self.min_len_of_idl_type(&f.ty))
                .fold(0, usize::saturating_add),
            IdlTypeDefinitionTy::Alias { value } => self.min_len_of_idl_type(value),
            // Only the tag counts, since payloads may recurse.
            IdlTypeDefinitionTy::Enum { .. } => 1,
        }
    }
}

/// One level further down, or a [SchemaViolation](IdlClientError::SchemaViolation)
/// past [MAX_DEPTH].
pub(crate) fn descend(depth: usize, path: &str) -> Result<usize> {
    if depth >= MAX_DEPTH {
        return Err(IdlClientError::schema_violation(
            path,
            format!("value nests deeper than {MAX_DEPTH} levels"),
        ));
    }
    Ok(depth + 1)
}

fn remaining<'a>(bytes: &'a [u8], offset: usize, path: &str) -> Result<&'a [u8]> {
    bytes.get(offset..).ok_or_else(|| IdlClientError::TruncatedData {
        path: path.to_string(),
        needed: offset,
        available: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::Idl;
    use serde_json::json;
    use solana_sdk::pubkey::Pubkey;

    fn schema() -> Schema {
        let idl: Idl = serde_json::from_value(json!({
            "name": "coder",
            "instructions": [],
            "accounts": [{
                "name": "Counter",
                "type": {"kind": "struct", "fields": [
                    {"name": "authority", "type": "publicKey"},
                    {"name": "count", "type": "u64"}
                ]}
            }],
            "types": [
                {"name": "Side", "type": {"kind": "enum", "variants": [
                    {"name": "Bid"},
                    {"name": "Ask", "fields": [{"name": "price", "type": "u64"}]},
                    {"name": "Both", "fields": ["u8", "string"]}
                ]}},
                {"name": "Order", "type": {"kind": "struct", "fields": [
                    {"name": "side", "type": {"defined": "Side"}},
                    {"name": "size", "type": "u128"},
                    {"name": "memo", "type": {"option": "string"}},
                    {"name": "tags", "type": {"vec": "u16"}},
                    {"name": "seed", "type": {"array": ["u8", 4]}},
                    {"name": "blob", "type": "bytes"},
                    {"name": "delta", "type": "i32"},
                    {"name": "ratio", "type": "f64"},
                    {"name": "live", "type": "bool"}
                ]}},
                {"name": "Price", "type": {"kind": "alias", "value": "u64"}}
            ]
        }))
        .unwrap();
        Schema::new(idl).unwrap()
    }

    #[test]
    fn struct_round_trip_consumes_every_byte() {
        let schema = schema();
        let order = json!({
            "side": {"Ask": {"price": 17}},
            "size": "340282366920938463463374607431768211455",
            "memo": "hello",
            "tags": [1, 2, 65535],
            "seed": [9, 8, 7, 6],
            "blob": [0, 255],
            "delta": -42,
            "ratio": 0.5,
            "live": true
        });
        let bytes = schema.encode_type("Order", &order).unwrap();
        let (decoded, consumed) = schema.decode_type("Order", &bytes, 0).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, order);
        // Object keys come back in declaration order.
        let keys: Vec<_> = decoded.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys[0], "side");
        assert_eq!(keys[8], "live");
    }

    #[test]
    fn borsh_layout() {
        let schema = schema();
        assert_eq!(schema.encode(&IdlType::U16, &json!(258)).unwrap(), vec![2, 1]);
        assert_eq!(
            schema.encode(&IdlType::String, &json!("ab")).unwrap(),
            vec![2, 0, 0, 0, b'a', b'b']
        );
        assert_eq!(
            schema
                .encode(&IdlType::Option(Box::new(IdlType::U8)), &json!(null))
                .unwrap(),
            vec![0]
        );
        assert_eq!(
            schema
                .encode(&IdlType::Defined("Side".into()), &json!({"Both": [3, "x"]}))
                .unwrap(),
            vec![2, 3, 1, 0, 0, 0, b'x']
        );
        // Unit variants may be given as a bare string.
        assert_eq!(
            schema.encode(&IdlType::Defined("Side".into()), &json!("Bid")).unwrap(),
            vec![0]
        );
        assert_eq!(
            schema.encode(&IdlType::Defined("Price".into()), &json!(5)).unwrap(),
            5u64.to_le_bytes().to_vec()
        );
        let authority = Pubkey::new_unique();
        let bytes = schema
            .encode_type("Counter", &json!({"authority": authority.to_string(), "count": 1}))
            .unwrap();
        assert_eq!(&bytes[..32], authority.as_ref());
        assert_eq!(bytes.len(), 40);
    }

    #[test]
    fn decode_at_offset() {
        let schema = schema();
        let bytes = [0xff, 0xff, 7, 0, 0, 0];
        let (value, consumed) = schema.decode(&IdlType::U32, &bytes, 2).unwrap();
        assert_eq!(value, json!(7));
        assert_eq!(consumed, 4);
        assert!(matches!(
            schema.decode(&IdlType::U8, &bytes, 7),
            Err(IdlClientError::TruncatedData { .. })
        ));
    }

    #[test]
    fn truncated_input() {
        let schema = schema();
        let err = schema.decode(&IdlType::U64, &[1, 2, 3], 0).unwrap_err();
        assert!(matches!(
            err,
            IdlClientError::TruncatedData { needed: 8, available: 3, .. }
        ));
        // A length prefix promising more than is left.
        let err = schema.decode(&IdlType::String, &[5, 0, 0, 0, b'a'], 0).unwrap_err();
        assert!(matches!(err, IdlClientError::TruncatedData { needed: 5, available: 1, .. }));
        let err = schema
            .decode(&IdlType::Vec(Box::new(IdlType::U64)), &[200, 0, 0, 0, 1], 0)
            .unwrap_err();
        assert!(matches!(err, IdlClientError::TruncatedData { needed: 1600, .. }));
    }

    #[test]
    fn malformed_bytes_are_schema_violations() {
        let schema = schema();
        for (ty, bytes) in [
            (IdlType::Bool, vec![2]),
            (IdlType::Option(Box::new(IdlType::U8)), vec![3, 0]),
            (IdlType::Defined("Side".into()), vec![9]),
            (IdlType::String, vec![2, 0, 0, 0, 0xc3, 0x28]),
        ] {
            let err = schema.decode(&ty, &bytes, 0).unwrap_err();
            assert!(
                matches!(err, IdlClientError::SchemaViolation { .. }),
                "{ty}: {err}"
            );
        }
    }

    #[test]
    fn values_that_do_not_fit_are_rejected() {
        let schema = schema();
        let cases = [
            (IdlType::U8, json!(256)),
            (IdlType::U64, json!(-1)),
            (IdlType::I8, json!(-129)),
            (IdlType::U128, json!("not a number")),
            (IdlType::Bool, json!(1)),
            (IdlType::PublicKey, json!("not base58!")),
            (IdlType::Array(Box::new(IdlType::U8), 4), json!([1, 2, 3])),
            (IdlType::Defined("Side".into()), json!({"Sell": null})),
            (IdlType::Defined("Side".into()), json!({"Bid": null, "Ask": null})),
            (IdlType::U256, json!(1)),
        ];
        for (ty, value) in cases {
            let err = schema.encode(&ty, &value).unwrap_err();
            assert!(
                matches!(err, IdlClientError::SchemaViolation { .. }),
                "{ty} <- {value}: {err}"
            );
        }
    }

    #[test]
    fn struct_fields_must_match_exactly() {
        let schema = schema();
        let authority = Pubkey::new_unique().to_string();
        let err = schema
            .encode_type("Counter", &json!({"authority": authority}))
            .unwrap_err();
        assert!(matches!(err, IdlClientError::SchemaViolation { ref path, .. } if path == "Counter.count"));
        let err = schema
            .encode_type("Counter", &json!({"authority": authority, "count": 0, "bump": 1}))
            .unwrap_err();
        assert!(matches!(err, IdlClientError::SchemaViolation { ref path, .. } if path == "Counter.bump"));
    }

    #[test]
    fn wide_integers_accept_numbers() {
        let schema = schema();
        let bytes = schema.encode(&IdlType::I128, &json!(-5)).unwrap();
        assert_eq!(bytes, (-5i128).to_le_bytes().to_vec());
        let (value, _) = schema.decode(&IdlType::I128, &bytes, 0).unwrap();
        assert_eq!(value, json!("-5"));
    }

    #[test]
    fn unknown_type_names() {
        let err = schema().encode_type("Missing", &json!({})).unwrap_err();
        assert!(matches!(err, IdlClientError::NotFound { kind: "type", .. }));
    }
}
