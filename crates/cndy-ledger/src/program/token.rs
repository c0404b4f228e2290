//! The few SPL token and associated-token-account operations a mint needs,
//! encoded by hand against the token program's fixed layouts.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::{system_program, sysvar};

use crate::error::{LedgerError, LedgerResult};

pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Size of a mint account.
pub const MINT_LEN: usize = 82;
/// Size of a token account.
pub const TOKEN_ACCOUNT_LEN: usize = 165;

const INITIALIZE_MINT: u8 = 0;
const MINT_TO: u8 = 7;

/// Decoded fields of a mint account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MintInfo {
    pub decimals: u8,
    pub is_initialized: bool,
}

/// Decoded fields of a token account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenAccountInfo {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub is_initialized: bool,
}

pub fn parse_mint(data: &[u8]) -> LedgerResult<MintInfo> {
    if data.len() < MINT_LEN {
        return Err(LedgerError::InvalidAccountData(format!(
            "mint account is {} bytes, expected {MINT_LEN}",
            data.len()
        )));
    }
    Ok(MintInfo {
        decimals: data[44],
        is_initialized: data[45] != 0,
    })
}

pub fn parse_token_account(data: &[u8]) -> LedgerResult<TokenAccountInfo> {
    if data.len() < TOKEN_ACCOUNT_LEN {
        return Err(LedgerError::InvalidAccountData(format!(
            "token account is {} bytes, expected {TOKEN_ACCOUNT_LEN}",
            data.len()
        )));
    }
    let key = |at: usize| {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&data[at..at + 32]);
        Pubkey::new_from_array(bytes)
    };
    Ok(TokenAccountInfo {
        mint: key(0),
        owner: key(32),
        // 0 = uninitialized, 1 = initialized, 2 = frozen
        is_initialized: data[108] != 0,
    })
}

pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[wallet.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

/// Initialize a mint with `authority` as both mint and freeze authority.
pub fn initialize_mint(mint: &Pubkey, authority: &Pubkey, decimals: u8) -> Instruction {
    let mut data = Vec::with_capacity(67);
    data.push(INITIALIZE_MINT);
    data.push(decimals);
    data.extend_from_slice(authority.as_ref());
    data.push(1);
    data.extend_from_slice(authority.as_ref());
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*mint, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ],
        data,
    }
}

pub fn mint_to(mint: &Pubkey, destination: &Pubkey, authority: &Pubkey, amount: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(MINT_TO);
    data.extend_from_slice(&amount.to_le_bytes());
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*mint, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data,
    }
}

pub fn create_associated_token_account(payer: &Pubkey, wallet: &Pubkey, mint: &Pubkey) -> Instruction {
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(associated_token_address(wallet, mint), false),
            AccountMeta::new_readonly(*wallet, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ],
        data: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_fields() {
        let mut data = vec![0u8; MINT_LEN];
        data[44] = 6;
        data[45] = 1;
        assert_eq!(
            parse_mint(&data).unwrap(),
            MintInfo {
                decimals: 6,
                is_initialized: true
            }
        );
        assert!(parse_mint(&data[..40]).is_err());
    }

    #[test]
    fn token_account_fields() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
        data[..32].copy_from_slice(mint.as_ref());
        data[32..64].copy_from_slice(owner.as_ref());
        let info = parse_token_account(&data).unwrap();
        assert_eq!(info.mint, mint);
        assert_eq!(info.owner, owner);
        assert!(!info.is_initialized);

        data[108] = 1;
        assert!(parse_token_account(&data).unwrap().is_initialized);
    }

    #[test]
    fn initialize_mint_layout() {
        let mint = Pubkey::new_unique();
        let auth = Pubkey::new_unique();
        let ix = initialize_mint(&mint, &auth, 0);
        assert_eq!(ix.data.len(), 67);
        assert_eq!(ix.data[0], INITIALIZE_MINT);
        assert_eq!(&ix.data[2..34], auth.as_ref());
        assert_eq!(ix.data[34], 1);
    }

    #[test]
    fn mint_to_amount() {
        let ix = mint_to(&Pubkey::new_unique(), &Pubkey::new_unique(), &Pubkey::new_unique(), 1);
        assert_eq!(ix.data, vec![MINT_TO, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(ix.accounts[2].is_signer);
    }
}
