use borsh::{BorshDeserialize, BorshSerialize};
use cndy_types::ConfigLine;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::{system_program, sysvar};

use super::{discriminator, token, TOKEN_METADATA_PROGRAM_ID};
use crate::error::{LedgerError, LedgerResult};

/// Creator entry as the program stores it.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Creator {
    pub address: [u8; 32],
    pub verified: bool,
    pub share: u8,
}

/// Arguments of `initialize_config`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConfigData {
    pub uuid: String,
    pub symbol: String,
    pub seller_fee_basis_points: u16,
    pub creators: Vec<Creator>,
    pub max_supply: u64,
    pub is_mutable: bool,
    pub retain_authority: bool,
    pub max_number_of_lines: u32,
}

/// Arguments of `initialize_candy_machine`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CandyMachineData {
    pub uuid: String,
    pub price: u64,
    pub items_available: u64,
    pub go_live_date: Option<i64>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct LineArg {
    name: String,
    uri: String,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct AddConfigLinesArgs {
    index: u32,
    config_lines: Vec<LineArg>,
}

#[derive(BorshSerialize)]
struct InitializeCandyMachineArgs {
    bump: u8,
    data: CandyMachineData,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct UpdateCandyMachineArgs {
    price: Option<u64>,
    go_live_date: Option<i64>,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct SweepWithdrawArgs {
    bump1: u8,
    bump2: u8,
    uuid: String,
}

fn encode<T: BorshSerialize>(name: &str, args: &T) -> LedgerResult<Vec<u8>> {
    let mut data = discriminator(name).to_vec();
    borsh::to_writer(&mut data, args)
        .map_err(|e| LedgerError::Configuration(format!("cannot encode {name}: {e}")))?;
    Ok(data)
}

pub fn initialize_config(
    program_id: &Pubkey,
    config: &Pubkey,
    authority: &Pubkey,
    payer: &Pubkey,
    data: &ConfigData,
) -> LedgerResult<Instruction> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*config, false),
            AccountMeta::new_readonly(*authority, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ],
        data: encode("initialize_config", data)?,
    })
}

/// Write `lines` into the config starting at slot `index`.
pub fn add_config_lines(
    program_id: &Pubkey,
    config: &Pubkey,
    authority: &Pubkey,
    index: u32,
    lines: &[ConfigLine],
) -> LedgerResult<Instruction> {
    for line in lines {
        line.validate()?;
    }
    let args = AddConfigLinesArgs {
        index,
        config_lines: lines
            .iter()
            .map(|l| LineArg {
                name: l.name.clone(),
                uri: l.uri.clone(),
            })
            .collect(),
    };
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*config, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data: encode("add_config_lines", &args)?,
    })
}

/// Accounts of `initialize_candy_machine`.
#[derive(Clone, Debug)]
pub struct InitializeCandyMachineAccounts {
    pub candy_machine: Pubkey,
    /// Treasury receiving mint payments.
    pub wallet: Pubkey,
    pub config: Pubkey,
    pub authority: Pubkey,
    pub payer: Pubkey,
    /// Set when mints are paid in an SPL token.
    pub token_mint: Option<Pubkey>,
}

pub fn initialize_candy_machine(
    program_id: &Pubkey,
    accounts: &InitializeCandyMachineAccounts,
    bump: u8,
    data: &CandyMachineData,
) -> LedgerResult<Instruction> {
    let mut metas = vec![
        AccountMeta::new(accounts.candy_machine, false),
        AccountMeta::new_readonly(accounts.wallet, false),
        AccountMeta::new_readonly(accounts.config, false),
        AccountMeta::new_readonly(accounts.authority, true),
        AccountMeta::new(accounts.payer, true),
        AccountMeta::new_readonly(system_program::ID, false),
        AccountMeta::new_readonly(sysvar::rent::ID, false),
    ];
    if let Some(mint) = accounts.token_mint {
        metas.push(AccountMeta::new_readonly(mint, false));
    }
    Ok(Instruction {
        program_id: *program_id,
        accounts: metas,
        data: encode(
            "initialize_candy_machine",
            &InitializeCandyMachineArgs {
                bump,
                data: data.clone(),
            },
        )?,
    })
}

pub fn update_candy_machine(
    program_id: &Pubkey,
    candy_machine: &Pubkey,
    authority: &Pubkey,
    price: Option<u64>,
    go_live_date: Option<i64>,
) -> LedgerResult<Instruction> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*candy_machine, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data: encode(
            "update_candy_machine",
            &UpdateCandyMachineArgs {
                price,
                go_live_date,
            },
        )?,
    })
}

/// Accounts of `mint_nft`. The payer also acts as mint and update
/// authority.
#[derive(Clone, Debug)]
pub struct MintNftAccounts {
    pub config: Pubkey,
    pub candy_machine: Pubkey,
    pub payer: Pubkey,
    pub wallet: Pubkey,
    pub mint: Pubkey,
    pub metadata: Pubkey,
    pub master_edition: Pubkey,
}

pub fn mint_nft(program_id: &Pubkey, accounts: &MintNftAccounts) -> LedgerResult<Instruction> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(accounts.config, false),
            AccountMeta::new(accounts.candy_machine, false),
            AccountMeta::new(accounts.payer, true),
            AccountMeta::new(accounts.wallet, false),
            AccountMeta::new(accounts.metadata, false),
            AccountMeta::new(accounts.mint, false),
            AccountMeta::new_readonly(accounts.payer, true),
            AccountMeta::new_readonly(accounts.payer, true),
            AccountMeta::new(accounts.master_edition, false),
            AccountMeta::new_readonly(TOKEN_METADATA_PROGRAM_ID, false),
            AccountMeta::new_readonly(token::TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
            AccountMeta::new_readonly(sysvar::clock::ID, false),
        ],
        data: discriminator("mint_nft").to_vec(),
    })
}

/// Withdraw the candy machine's balance to its authority.
pub fn withdraw_funds(
    program_id: &Pubkey,
    candy_machine: &Pubkey,
    authority: &Pubkey,
) -> LedgerResult<Instruction> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*candy_machine, false),
            AccountMeta::new(*authority, true),
        ],
        data: discriminator("withdraw_funds").to_vec(),
    })
}

/// Accounts and arguments of the sweep variant of `withdraw_funds`, which
/// withdraws from a config owned by another authority through a
/// secondary program.
#[derive(Clone, Debug)]
pub struct SweepWithdraw {
    /// The signing operator.
    pub operator: Pubkey,
    pub config: Pubkey,
    /// The config's recorded authority.
    pub authority: Pubkey,
    pub secondary_program: Pubkey,
    pub candy_machine: Pubkey,
    pub candy_machine_secondary: Pubkey,
    pub secondary_bump: u8,
    pub candy_machine_bump: u8,
    pub uuid: String,
}

pub fn sweep_withdraw_funds(program_id: &Pubkey, w: &SweepWithdraw) -> LedgerResult<Instruction> {
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(w.operator, true),
            AccountMeta::new(w.config, false),
            AccountMeta::new(w.authority, false),
            AccountMeta::new_readonly(w.secondary_program, false),
            AccountMeta::new(w.candy_machine, false),
            AccountMeta::new(w.candy_machine_secondary, false),
        ],
        data: encode(
            "withdraw_funds",
            &SweepWithdrawArgs {
                bump1: w.secondary_bump,
                bump2: w.candy_machine_bump,
                uuid: w.uuid.clone(),
            },
        )?,
    })
}
