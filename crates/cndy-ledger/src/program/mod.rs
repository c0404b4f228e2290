//! The candy machine program contract: ids, account layout, instruction
//! encoding and PDA derivation.
//!
//! Instructions are Anchor-encoded: an 8-byte discriminator
//! (`sha256("global:<name>")[..8]`) followed by borsh-encoded arguments.

pub mod accounts;
pub mod instructions;
pub mod token;

use cndy_types::CONFIG_LINE_SIZE;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

/// The candy machine program.
pub const CANDY_MACHINE_PROGRAM_ID: Pubkey = pubkey!("cndy3Z4yapfJBmL3ShUp5exZKqR3z33thTzeNMm2gRZ");

/// Program passed as `nft_candy_machine` to the sweep-variant withdraw.
pub const DEFAULT_SECONDARY_PROGRAM_ID: Pubkey =
    pubkey!("cndyAnrLdpjq1Ssp1z8xxDsB8dxe7u4HL5Nxi2K5WXZ");

pub const TOKEN_METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// Offset of the config-line array in a config account.
pub const CONFIG_ARRAY_START: usize = 8 // discriminator
    + 32 // authority
    + 4 + 6 // uuid
    + 4 + 10 // symbol
    + 2 // seller fee basis points
    + 4 + 5 * 34 + 1 // creators
    + 8 // max supply
    + 1 // is mutable
    + 1 // retain authority
    + 4; // max number of lines

/// Config lines written per `add_config_lines` transaction. Keeps the
/// transaction under the packet size limit.
pub const CONFIG_LINES_PER_TX: usize = 10;

/// Length of the uuid derived from the config address.
pub const UUID_LEN: usize = 6;

pub const MAX_CREATORS: usize = 5;

/// Anchor instruction discriminator for `name`.
pub fn discriminator(name: &str) -> [u8; 8] {
    let hash = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

/// Space for a config account holding `lines` config lines: header, line
/// count, lines, then the redemption bitmask with its length prefix.
pub fn config_account_size(lines: u32) -> usize {
    let lines = lines as usize;
    CONFIG_ARRAY_START + 4 + lines * CONFIG_LINE_SIZE + 4 + lines.div_ceil(8)
}

/// The uuid for a config account: a prefix of its address.
pub fn uuid_from_config(config: &Pubkey) -> String {
    config.to_string().chars().take(UUID_LEN).collect()
}

/// Candy machine PDA for a config and uuid under `program_id`.
pub fn candy_machine_address(config: &Pubkey, uuid: &str, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[b"candy_machine", config.as_ref(), uuid.as_bytes()],
        program_id,
    )
}

pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            mint.as_ref(),
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

pub fn master_edition_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            TOKEN_METADATA_PROGRAM_ID.as_ref(),
            mint.as_ref(),
            b"edition",
        ],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_start_matches_program_layout() {
        assert_eq!(CONFIG_ARRAY_START, 255);
    }

    #[test]
    fn account_size() {
        assert_eq!(config_account_size(0), 255 + 4 + 4);
        assert_eq!(config_account_size(10), 255 + 4 + 2400 + 4 + 2);
        assert_eq!(config_account_size(16), 255 + 4 + 16 * 240 + 4 + 2);
    }

    #[test]
    fn discriminator_is_stable() {
        let d = discriminator("add_config_lines");
        assert_eq!(d, discriminator("add_config_lines"));
        assert_ne!(d, discriminator("initialize_config"));
    }

    #[test]
    fn uuid_is_address_prefix() {
        let config = Pubkey::new_unique();
        let uuid = uuid_from_config(&config);
        assert_eq!(uuid.len(), UUID_LEN);
        assert!(config.to_string().starts_with(&uuid));
    }

    #[test]
    fn candy_machine_pda_depends_on_uuid_and_program() {
        let config = Pubkey::new_unique();
        let (a, _) = candy_machine_address(&config, "abcdef", &CANDY_MACHINE_PROGRAM_ID);
        let (b, _) = candy_machine_address(&config, "abcdeg", &CANDY_MACHINE_PROGRAM_ID);
        let (c, _) = candy_machine_address(&config, "abcdef", &DEFAULT_SECONDARY_PROGRAM_ID);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
