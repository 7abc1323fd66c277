use crate::discriminator::{
    self, partition_discriminator_from_data, Discriminator, DISCRIMINATOR_LEN,
};
use crate::error::{IdlClientError, Result};
use crate::idl::{
    EnumFields, Idl, IdlAccountItem, IdlErrorCode, IdlField, IdlInstruction, IdlType,
    IdlTypeDefinition, IdlTypeDefinitionTy,
};
use heck::SnakeCase;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Deref;
use std::path::Path;

/// Anchor's name for the constructor of a program-global `#[state]` struct.
pub const STATE_CONSTRUCTOR: &str = "new";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    /// An ordinary `#[program]` instruction.
    Global,
    /// A method on the program-global `#[state]` struct.
    State,
}

/// One account an instruction expects, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRole {
    pub name: String,
    pub is_mut: bool,
    pub is_signer: bool,
    pub is_optional: bool,
}

#[derive(Debug, Clone)]
pub struct InstructionDefinition {
    /// Snake-cased name, used for lookup and for the sighash.
    pub name: String,
    /// Name as written in the IDL.
    pub idl_name: String,
    pub kind: InstructionKind,
    pub discriminator: Discriminator,
    pub args: Vec<IdlField>,
    pub accounts: Vec<AccountRole>,
    pub returns: Option<IdlType>,
}

impl InstructionDefinition {
    pub fn is_state_constructor(&self) -> bool {
        self.kind == InstructionKind::State && self.name == STATE_CONSTRUCTOR
    }
}

#[derive(Debug, Clone)]
pub struct AccountDefinition {
    pub discriminator: Discriminator,
    pub type_definition: IdlTypeDefinition,
}

impl AccountDefinition {
    pub fn name(&self) -> &str {
        &self.type_definition.name
    }
}

/// A validated IDL, with every instruction and account type indexed by name.
///
/// Construction fails on duplicate declarations, unresolved `defined` references,
/// and types that would have infinite size. Read-only once built.
#[derive(Debug, Clone)]
pub struct Schema {
    idl: Idl,
    instructions: BTreeMap<String, InstructionDefinition>,
    accounts: BTreeMap<String, AccountDefinition>,
    types: BTreeMap<String, IdlTypeDefinition>,
    state: Option<AccountDefinition>,
    errors: BTreeMap<u32, IdlErrorCode>,
}

impl Schema {
    pub fn new(idl: Idl) -> Result<Self> {
        let mut instructions = BTreeMap::new();
        for ix in &idl.instructions {
            let definition = instruction_definition(ix, InstructionKind::Global)?;
            insert_unique(&mut instructions, "instruction", definition.name.clone(), definition)?;
        }

        let mut types = BTreeMap::new();
        for ty_def in &idl.types {
            insert_unique(&mut types, "type", ty_def.name.clone(), ty_def.clone())?;
        }

        let mut accounts = BTreeMap::new();
        for act in &idl.accounts {
            if types.contains_key(&act.name) {
                return Err(IdlClientError::DuplicateDeclaration {
                    kind: "type",
                    name: act.name.clone(),
                });
            }
            let definition = AccountDefinition {
                discriminator: explicit_discriminator(&act.discriminator, &act.name)?
                    .unwrap_or_else(|| discriminator::account_discriminator(&act.name)),
                type_definition: act.clone(),
            };
            insert_unique(&mut accounts, "account type", act.name.clone(), definition)?;
        }

        let mut state = None;
        if let Some(idl_state) = &idl.state {
            let name = &idl_state.strct.name;
            if types.contains_key(name) || accounts.contains_key(name) {
                return Err(IdlClientError::DuplicateDeclaration {
                    kind: "type",
                    name: name.clone(),
                });
            }
            for method in &idl_state.methods {
                let definition = instruction_definition(method, InstructionKind::State)?;
                insert_unique(&mut instructions, "instruction", definition.name.clone(), definition)?;
            }
            state = Some(AccountDefinition {
                discriminator: discriminator::account_discriminator(name),
                type_definition: idl_state.strct.clone(),
            });
        }

        let mut errors = BTreeMap::new();
        for error in idl.errors.iter().flatten() {
            insert_unique(&mut errors, "error code", error.code, error.clone())
                .map_err(|_| IdlClientError::DuplicateDeclaration {
                    kind: "error code",
                    name: format!("{} ({})", error.name, error.code),
                })?;
        }

        let schema = Self {
            idl,
            instructions,
            accounts,
            types,
            state,
            errors,
        };
        schema.check_references()?;
        schema.check_sized()?;
        Ok(schema)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Idl::from_file(path)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(Idl::from_json(json)?)
    }

    pub fn idl(&self) -> &Idl {
        &self.idl
    }

    /// Look up an instruction or state method. Accepts the IDL spelling or snake_case.
    pub fn instruction(&self, name: &str) -> Option<&InstructionDefinition> {
        self.instructions.get(&name.to_snake_case())
    }

    pub fn instructions(&self) -> impl Iterator<Item = &InstructionDefinition> {
        self.instructions.values()
    }

    pub fn account(&self, name: &str) -> Option<&AccountDefinition> {
        self.accounts.get(name)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountDefinition> {
        self.accounts.values()
    }

    /// Find which declared account type (or the state struct) some account data belongs to.
    pub fn account_by_discriminator(&self, data: &[u8]) -> Option<&AccountDefinition> {
        let (discriminator, _) = partition_discriminator_from_data(data)?;
        self.accounts
            .values()
            .chain(self.state.iter())
            .find(|def| def.discriminator == discriminator)
    }

    /// The program-global `#[state]` struct, if the program declares one.
    pub fn state(&self) -> Option<&AccountDefinition> {
        self.state.as_ref()
    }

    /// Find any type definition a `defined` reference may point at:
    /// custom types first, then account types, then the state struct.
    pub fn find_type_definition_by_name(&self, name: &str) -> Option<&IdlTypeDefinition> {
        self.types
            .get(name)
            .or_else(|| self.accounts.get(name).map(|def| &def.type_definition))
            .or_else(|| {
                self.state
                    .as_ref()
                    .filter(|def| def.name() == name)
                    .map(|def| &def.type_definition)
            })
    }

    pub fn error_code(&self, code: u32) -> Option<&IdlErrorCode> {
        self.errors.get(&code)
    }

    fn check_references(&self) -> Result<()> {
        let check = |ty: &IdlType, path: String| -> Result<()> {
            let mut names = vec![];
            collect_defined(ty, &mut names);
            for name in names {
                if self.find_type_definition_by_name(name).is_none() {
                    return Err(IdlClientError::schema_violation(
                        path,
                        format!("unresolved type reference: {name}"),
                    ));
                }
            }
            Ok(())
        };
        for ix in self.instructions.values() {
            for arg in &ix.args {
                check(&arg.ty, format!("{}.{}", ix.name, arg.name))?;
            }
            if let Some(returns) = &ix.returns {
                check(returns, format!("{}.returns", ix.name))?;
            }
        }
        let definitions = self
            .types
            .values()
            .chain(self.accounts.values().map(|def| &def.type_definition))
            .chain(self.state.iter().map(|def| &def.type_definition));
        for ty_def in definitions {
            for (path, ty) in type_definition_members(ty_def) {
                check(ty, path)?;
            }
        }
        for event in self.idl.events.iter().flatten() {
            for field in &event.fields {
                check(&field.ty, format!("{}.{}", event.name, field.name))?;
            }
        }
        Ok(())
    }

    /// Reject types that contain themselves without a length prefix or tag in between,
    /// since neither side could ever finish reading or writing them.
    fn check_sized(&self) -> Result<()> {
        let mut inline_edges: HashMap<&str, Vec<&str>> = HashMap::new();
        let definitions = self
            .types
            .values()
            .chain(self.accounts.values().map(|def| &def.type_definition))
            .chain(self.state.iter().map(|def| &def.type_definition));
        for ty_def in definitions {
            let mut edges = vec![];
            match &ty_def.ty {
                IdlTypeDefinitionTy::Struct { fields } => {
                    fields.iter().for_each(|f| collect_inline(&f.ty, &mut edges))
                }
                IdlTypeDefinitionTy::Alias { value } => collect_inline(value, &mut edges),
                // Each nesting level costs a variant tag.
                IdlTypeDefinitionTy::Enum { .. } => {}
            }
            inline_edges.insert(ty_def.name.as_str(), edges);
        }

        fn visit<'a>(
            name: &'a str,
            edges: &HashMap<&'a str, Vec<&'a str>>,
            visiting: &mut Vec<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<()> {
            if done.contains(name) {
                return Ok(());
            }
            if visiting.contains(&name) {
                visiting.push(name);
                return Err(IdlClientError::schema_violation(
                    visiting.join(" -> "),
                    "recursive type has infinite size",
                ));
            }
            visiting.push(name);
            for &next in edges.get(name).into_iter().flatten() {
                visit(next, edges, visiting, done)?;
            }
            visiting.pop();
            done.insert(name);
            Ok(())
        }

        let mut done = HashSet::new();
        for name in inline_edges.keys().copied() {
            visit(name, &inline_edges, &mut vec![], &mut done)?;
        }
        Ok(())
    }
}

impl Deref for Schema {
    type Target = Idl;

    fn deref(&self) -> &Self::Target {
        &self.idl
    }
}

impl TryFrom<Idl> for Schema {
    type Error = IdlClientError;

    fn try_from(idl: Idl) -> Result<Self> {
        Self::new(idl)
    }
}

fn insert_unique<K: Ord, V>(
    map: &mut BTreeMap<K, V>,
    kind: &'static str,
    key: K,
    value: V,
) -> Result<()>
where
    K: ToString,
{
    if map.contains_key(&key) {
        return Err(IdlClientError::DuplicateDeclaration {
            kind,
            name: key.to_string(),
        });
    }
    map.insert(key, value);
    Ok(())
}

fn instruction_definition(ix: &IdlInstruction, kind: InstructionKind) -> Result<InstructionDefinition> {
    let name = ix.name.to_snake_case();
    let mut accounts = vec![];
    flatten_account_roles(&ix.accounts, &mut accounts);
    let mut seen = HashSet::new();
    for role in &accounts {
        if !seen.insert(role.name.as_str()) {
            return Err(IdlClientError::DuplicateDeclaration {
                kind: "account role",
                name: format!("{name}.{}", role.name),
            });
        }
    }
    let mut arg_names = HashSet::new();
    for arg in &ix.args {
        if !arg_names.insert(arg.name.as_str()) {
            return Err(IdlClientError::DuplicateDeclaration {
                kind: "argument",
                name: format!("{name}.{}", arg.name),
            });
        }
    }
    let discriminator = match explicit_discriminator(&ix.discriminator, &ix.name)? {
        Some(discriminator) => discriminator,
        None if kind == InstructionKind::State => discriminator::ix_state_discriminator(&name),
        None => discriminator::ix_discriminator(&name),
    };
    Ok(InstructionDefinition {
        name,
        idl_name: ix.name.clone(),
        kind,
        discriminator,
        args: ix.args.clone(),
        accounts,
        returns: ix.returns.clone(),
    })
}

fn flatten_account_roles(items: &[IdlAccountItem], out: &mut Vec<AccountRole>) {
    for item in items {
        match item {
            IdlAccountItem::IdlAccount(act) => out.push(AccountRole {
                name: act.name.to_snake_case(),
                is_mut: act.is_mut,
                is_signer: act.is_signer,
                is_optional: act.is_optional,
            }),
            IdlAccountItem::IdlAccounts(group) => flatten_account_roles(&group.accounts, out),
        }
    }
}

fn explicit_discriminator(bytes: &Option<Vec<u8>>, name: &str) -> Result<Option<Discriminator>> {
    match bytes {
        None => Ok(None),
        Some(bytes) => Discriminator::try_from(bytes.as_slice()).map(Some).map_err(|_| {
            IdlClientError::InvalidIdl(format!(
                "discriminator of {name} must be {DISCRIMINATOR_LEN} bytes, found {}",
                bytes.len()
            ))
        }),
    }
}

fn type_definition_members(ty_def: &IdlTypeDefinition) -> Vec<(String, &IdlType)> {
    match &ty_def.ty {
        IdlTypeDefinitionTy::Struct { fields } => fields
            .iter()
            .map(|f| (format!("{}.{}", ty_def.name, f.name), &f.ty))
            .collect(),
        IdlTypeDefinitionTy::Alias { value } => vec![(ty_def.name.clone(), value)],
        IdlTypeDefinitionTy::Enum { variants } => variants
            .iter()
            .flat_map(|variant| {
                let path = format!("{}::{}", ty_def.name, variant.name);
                match &variant.fields {
                    None => vec![],
                    Some(EnumFields::Named(fields)) => fields
                        .iter()
                        .map(|f| (format!("{path}.{}", f.name), &f.ty))
                        .collect(),
                    Some(EnumFields::Tuple(types)) => types
                        .iter()
                        .enumerate()
                        .map(|(i, ty)| (format!("{path}.{i}"), ty))
                        .collect(),
                }
            })
            .collect(),
    }
}

fn collect_defined<'a>(ty: &'a IdlType, out: &mut Vec<&'a str>) {
    match ty {
        IdlType::Defined(name) => out.push(name.as_str()),
        IdlType::Option(inner) | IdlType::Vec(inner) | IdlType::Array(inner, _) => {
            collect_defined(inner, out)
        }
        _ => {}
    }
}

fn collect_inline<'a>(ty: &'a IdlType, out: &mut Vec<&'a str>) {
    match ty {
        IdlType::Defined(name) => out.push(name.as_str()),
        IdlType::Array(inner, len) if *len > 0 => collect_inline(inner, out),
        _ => {}
    }
}
