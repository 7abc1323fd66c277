use heck::SnakeCase;
use solana_sdk::instruction::AccountMeta;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Everything an instruction call needs besides its arguments:
/// the address for each account role, extra signers, and trailing accounts.
///
/// ```ignore
/// let ctx = ExecutionContext::new()
///     .account("counter", counter.pubkey())
///     .account("user", payer)
///     .account("system_program", system_program::ID)
///     .signer(counter);
/// ```
#[derive(Clone, Default)]
pub struct ExecutionContext {
    pub(crate) accounts: BTreeMap<String, Pubkey>,
    pub(crate) duplicate_roles: Vec<String>,
    pub(crate) signers: Vec<Arc<dyn Signer + Send + Sync>>,
    pub(crate) remaining_accounts: Vec<AccountMeta>,
    pub(crate) timeout: Option<Duration>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an account role. Role names are matched in snake_case,
    /// so `systemProgram` and `system_program` are the same role.
    pub fn account(mut self, role: impl AsRef<str>, address: Pubkey) -> Self {
        let role = role.as_ref().to_snake_case();
        if self.accounts.insert(role.clone(), address).is_some() {
            self.duplicate_roles.push(role);
        }
        self
    }

    pub fn accounts<I, S>(self, accounts: I) -> Self
    where
        I: IntoIterator<Item = (S, Pubkey)>,
        S: AsRef<str>,
    {
        accounts
            .into_iter()
            .fold(self, |ctx, (role, address)| ctx.account(role, address))
    }

    /// Sign with `signer` in addition to the connection's fee payer.
    pub fn signer<S: Signer + Send + Sync + 'static>(self, signer: S) -> Self {
        self.shared_signer(Arc::new(signer))
    }

    pub fn shared_signer(mut self, signer: Arc<dyn Signer + Send + Sync>) -> Self {
        self.signers.push(signer);
        self
    }

    /// Appended after the declared roles, in the order given.
    pub fn remaining_account(mut self, meta: AccountMeta) -> Self {
        self.remaining_accounts.push(meta);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn address_of(&self, role: &str) -> Option<Pubkey> {
        self.accounts.get(&role.to_snake_case()).copied()
    }

    pub(crate) fn signs_for(&self, address: &Pubkey) -> bool {
        self.signers.iter().any(|s| &s.pubkey() == address)
    }
}

impl Debug for ExecutionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("accounts", &self.accounts)
            .field(
                "signers",
                &self.signers.iter().map(|s| s.pubkey()).collect::<Vec<_>>(),
            )
            .field("remaining_accounts", &self.remaining_accounts)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Keypair;

    #[test]
    fn roles_are_snake_cased_and_duplicates_recorded() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let ctx = ExecutionContext::new()
            .account("systemProgram", a)
            .account("system_program", b);
        assert_eq!(ctx.address_of("systemProgram"), Some(b));
        assert_eq!(ctx.duplicate_roles, vec!["system_program".to_string()]);
    }

    #[test]
    fn signers() {
        let keypair = Keypair::new();
        let pubkey = keypair.pubkey();
        let ctx = ExecutionContext::new().signer(keypair);
        assert!(ctx.signs_for(&pubkey));
        assert!(!ctx.signs_for(&Pubkey::new_unique()));
        assert!(format!("{ctx:?}").contains(&pubkey.to_string()));
    }
}
