use heck::SnakeCase;
use solana_sdk::hash::hash;

pub type Discriminator = [u8; 8];

pub const DISCRIMINATOR_LEN: usize = 8;

const SIGHASH_GLOBAL_NAMESPACE: &str = "global";
const SIGHASH_STATE_NAMESPACE: &str = "state";

/// Calculates the discriminator for an account based on its name,
/// which would be found in an IDL.
pub fn account_discriminator(name: &str) -> Discriminator {
    sighash("account", name)
}

/// Calculates the discriminator for an instruction based on its name,
/// which would be found in an IDL.
pub fn ix_discriminator(name: &str) -> Discriminator {
    sighash(SIGHASH_GLOBAL_NAMESPACE, &name.to_snake_case())
}

/// Calculates the discriminator for a program-global state method based on its name.
pub fn ix_state_discriminator(name: &str) -> Discriminator {
    sighash(SIGHASH_STATE_NAMESPACE, &name.to_snake_case())
}

fn sighash(namespace: &str, name: &str) -> Discriminator {
    let mut discriminator = [0u8; DISCRIMINATOR_LEN];
    discriminator
        .copy_from_slice(&hash(format!("{namespace}:{name}").as_bytes()).to_bytes()[..DISCRIMINATOR_LEN]);
    discriminator
}

/// Splits off the leading discriminator. `None` if the data is too short to carry one.
pub fn partition_discriminator_from_data(data: &[u8]) -> Option<(Discriminator, &[u8])> {
    if data.len() < DISCRIMINATOR_LEN {
        return None;
    }
    let (head, rest) = data.split_at(DISCRIMINATOR_LEN);
    let mut discriminator = [0u8; DISCRIMINATOR_LEN];
    discriminator.copy_from_slice(head);
    Some((discriminator, rest))
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
