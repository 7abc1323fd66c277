use crate::client::ProgramClient;
use crate::connection::Connector;
use crate::discovery::ProgramDiscovery;
use crate::error::{IdlClientError, Result};
use crate::schema::Schema;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::time::Duration;

/// A set of program clients opened together and closed together.
///
/// Opening is all-or-nothing. Every client gets its own connection from the [Connector].
#[derive(Debug)]
pub struct Workspace {
    programs: BTreeMap<String, ProgramClient>,
    closed: bool,
}

impl Workspace {
    pub async fn open<I, S>(
        names: I,
        discovery: &dyn ProgramDiscovery,
        connector: &dyn Connector,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut programs: BTreeMap<String, ProgramClient> = BTreeMap::new();
        for name in names {
            if let Err(e) = Self::open_one(name.as_ref(), discovery, connector, &mut programs) {
                // Nothing survives a failed open.
                for (name, client) in programs {
                    if let Err(close_err) = client.close().await {
                        log::warn!("failed to close {name} after a failed open: {close_err}");
                    }
                }
                return Err(e);
            }
        }
        log::info!(
            "opened workspace with {}",
            programs.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(Self {
            programs,
            closed: false,
        })
    }

    fn open_one(
        name: &str,
        discovery: &dyn ProgramDiscovery,
        connector: &dyn Connector,
        programs: &mut BTreeMap<String, ProgramClient>,
    ) -> Result<()> {
        if programs.contains_key(name) {
            return Err(IdlClientError::DuplicateDeclaration {
                kind: "program",
                name: name.to_string(),
            });
        }
        let discovered = discovery.discover(name)?;
        let schema = Schema::new(discovered.idl)?;
        let connection = connector.connect(name)?;
        programs.insert(
            name.to_string(),
            ProgramClient::generate(schema, discovered.address, connection),
        );
        Ok(())
    }

    /// Apply the same default timeout to every client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.programs = std::mem::take(&mut self.programs)
            .into_iter()
            .map(|(name, client)| (name, client.with_timeout(timeout)))
            .collect();
        self
    }

    pub fn program(&self, name: &str) -> Result<&ProgramClient> {
        self.programs.get(name).ok_or_else(|| IdlClientError::NotFound {
            kind: "program",
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    /// Close every client, even if some fail.
    /// Fails with [IdlClientError::Teardown] listing both the failures and the clients that did close.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        let mut failures = vec![];
        let mut closed = vec![];
        for (name, client) in std::mem::take(&mut self.programs) {
            match client.close().await {
                Ok(()) => closed.push(name),
                Err(e) => failures.push((name, e)),
            }
        }
        log::info!("closed workspace: {} closed, {} failed", closed.len(), failures.len());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(IdlClientError::Teardown { failures, closed })
        }
    }

    /// Open a workspace, run `body` against it, and close it however `body` exits.
    ///
    /// If both `body` and the close fail, the error from `body` is returned
    /// and the teardown failure is logged.
    pub async fn scoped<I, S, T, F>(
        names: I,
        discovery: &dyn ProgramDiscovery,
        connector: &dyn Connector,
        body: F,
    ) -> Result<T>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: for<'a> FnOnce(&'a Workspace) -> BoxFuture<'a, Result<T>>,
    {
        let workspace = Self::open(names, discovery, connector).await?;
        let result = body(&workspace).await;
        let teardown = workspace.close().await;
        match (result, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => {
                log::error!("workspace teardown failed after an earlier error: {teardown}");
                Err(e)
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.closed && !self.programs.is_empty() {
            log::warn!(
                "workspace dropped without close(): releasing {} connection(s) without closing them",
                self.programs.len()
            );
        }
    }
}
