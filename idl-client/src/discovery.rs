//! Resolving a logical program name to its address and IDL.
use crate::config::{AnchorToml, ProgramEntry};
use crate::error::{IdlClientError, Result};
use crate::idl::Idl;
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct DiscoveredProgram {
    pub name: String,
    pub address: Pubkey,
    pub idl: Idl,
}

pub trait ProgramDiscovery {
    /// Fails with [IdlClientError::NotFound] when nothing is deployed under `name`.
    fn discover(&self, name: &str) -> Result<DiscoveredProgram>;
}

/// Finds programs the way `anchor test` lays them out:
/// addresses under `[programs.<cluster>]` in `Anchor.toml`,
/// IDLs in `target/idl/<name>.json`.
#[derive(Debug, Clone)]
pub struct AnchorWorkspaceDiscovery {
    root: PathBuf,
    cluster: String,
    programs: BTreeMap<String, ProgramEntry>,
}

impl AnchorWorkspaceDiscovery {
    pub fn new(root: impl Into<PathBuf>, cluster: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let cluster = cluster.into();
        let anchor_toml = root.join("Anchor.toml");
        let programs = if anchor_toml.exists() {
            AnchorToml::load(&anchor_toml)?
                .programs
                .remove(&cluster)
                .unwrap_or_default()
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            root,
            cluster,
            programs,
        })
    }

    /// The `localnet` programs of the workspace at `root`.
    pub fn localnet(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(root, "localnet")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn idl_path(&self, name: &str) -> PathBuf {
        match self.programs.get(name).and_then(ProgramEntry::idl) {
            Some(path) => self.root.join(path),
            None => self.root.join("target").join("idl").join(format!("{name}.json")),
        }
    }
}

impl ProgramDiscovery for AnchorWorkspaceDiscovery {
    fn discover(&self, name: &str) -> Result<DiscoveredProgram> {
        let idl_path = self.idl_path(name);
        if !idl_path.exists() {
            return Err(IdlClientError::NotFound {
                kind: "program",
                name: format!("{name} (no IDL at {})", idl_path.display()),
            });
        }
        let idl = Idl::from_file(&idl_path)?;
        let address = match self.programs.get(name) {
            Some(entry) => entry.address().to_string(),
            None => idl.metadata_address().map(str::to_string).ok_or_else(|| {
                IdlClientError::NotFound {
                    kind: "program",
                    name: format!(
                        "{name} (no address in [programs.{}] or the IDL metadata)",
                        self.cluster
                    ),
                }
            })?,
        };
        let address = Pubkey::from_str(&address).map_err(|e| {
            IdlClientError::Config(format!("invalid address {address:?} for program {name}: {e}"))
        })?;
        Ok(DiscoveredProgram {
            name: name.to_string(),
            address,
            idl,
        })
    }
}

/// Programs registered up front, e.g. for tests against a mock runtime.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    programs: BTreeMap<String, (Pubkey, Idl)>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, name: impl Into<String>, address: Pubkey, idl: Idl) -> Self {
        self.programs.insert(name.into(), (address, idl));
        self
    }
}

impl ProgramDiscovery for StaticDiscovery {
    fn discover(&self, name: &str) -> Result<DiscoveredProgram> {
        let (address, idl) = self.programs.get(name).ok_or_else(|| IdlClientError::NotFound {
            kind: "program",
            name: name.to_string(),
        })?;
        Ok(DiscoveredProgram {
            name: name.to_string(),
            address: *address,
            idl: idl.clone(),
        })
    }
}
