//! Decoding of candy machine program accounts.

use borsh::BorshDeserialize;
use cndy_types::{ConfigLine, CONFIG_LINE_SIZE};
use solana_sdk::pubkey::Pubkey;

use super::CONFIG_ARRAY_START;
use crate::error::{LedgerError, LedgerResult};

const DISCRIMINATOR_LEN: usize = 8;

/// The leading fields of a config account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigHeader {
    pub authority: Pubkey,
    pub uuid: String,
}

/// A decoded candy machine account.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize)]
pub struct CandyMachineAccount {
    pub authority: [u8; 32],
    pub wallet: [u8; 32],
    pub token_mint: Option<[u8; 32]>,
    pub config: [u8; 32],
    pub uuid: String,
    pub price: u64,
    pub items_available: u64,
    pub go_live_date: Option<i64>,
    pub bump: u8,
    pub items_redeemed: u64,
}

impl CandyMachineAccount {
    pub fn parse(data: &[u8]) -> LedgerResult<Self> {
        let body = data.get(DISCRIMINATOR_LEN..).ok_or_else(|| {
            LedgerError::InvalidAccountData("candy machine account too short".into())
        })?;
        let mut reader = body;
        Ok(Self::deserialize(&mut reader)?)
    }

    pub fn authority(&self) -> Pubkey {
        Pubkey::new_from_array(self.authority)
    }

    pub fn wallet(&self) -> Pubkey {
        Pubkey::new_from_array(self.wallet)
    }

    pub fn token_mint(&self) -> Option<Pubkey> {
        self.token_mint.map(Pubkey::new_from_array)
    }

    pub fn config(&self) -> Pubkey {
        Pubkey::new_from_array(self.config)
    }
}

pub fn parse_config_header(data: &[u8]) -> LedgerResult<ConfigHeader> {
    let too_short = || LedgerError::InvalidAccountData("config account too short".into());
    let authority: [u8; 32] = data
        .get(DISCRIMINATOR_LEN..DISCRIMINATOR_LEN + 32)
        .ok_or_else(too_short)?
        .try_into()
        .map_err(|_| too_short())?;
    let mut reader = data.get(DISCRIMINATOR_LEN + 32..).ok_or_else(too_short)?;
    let uuid = String::deserialize(&mut reader)?;
    Ok(ConfigHeader {
        authority: Pubkey::new_from_array(authority),
        uuid,
    })
}

/// Number of config lines the program reports as written.
pub fn config_line_count(data: &[u8]) -> LedgerResult<u32> {
    let bytes = data
        .get(CONFIG_ARRAY_START..CONFIG_ARRAY_START + 4)
        .ok_or_else(|| LedgerError::InvalidAccountData("config account has no line array".into()))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decode the written config lines in slot order. A slot that was never
/// written decodes as `None`.
pub fn parse_config_lines(data: &[u8]) -> LedgerResult<Vec<Option<ConfigLine>>> {
    let count = config_line_count(data)? as usize;
    let start = CONFIG_ARRAY_START + 4;
    let end = start + count * CONFIG_LINE_SIZE;
    if data.len() < end {
        return Err(LedgerError::InvalidAccountData(format!(
            "config reports {count} lines but holds only {} bytes",
            data.len()
        )));
    }
    data[start..end]
        .chunks_exact(CONFIG_LINE_SIZE)
        .map(|slot| {
            if ConfigLine::is_blank_slot(slot) {
                Ok(None)
            } else {
                ConfigLine::from_slot(slot)
                    .map(Some)
                    .map_err(|e| LedgerError::InvalidAccountData(e.to_string()))
            }
        })
        .collect()
}

/// Write `lines` into a config account image starting at slot `index`,
/// raising the line count the way the program does. Used by test doubles.
pub fn write_config_lines(data: &mut [u8], index: u32, lines: &[ConfigLine]) -> LedgerResult<()> {
    let start = CONFIG_ARRAY_START + 4 + index as usize * CONFIG_LINE_SIZE;
    let end = start + lines.len() * CONFIG_LINE_SIZE;
    if data.len() < end {
        return Err(LedgerError::Rejected(format!(
            "config lines {index}..{} exceed account capacity",
            index as usize + lines.len()
        )));
    }
    for (slot, line) in data[start..end].chunks_exact_mut(CONFIG_LINE_SIZE).zip(lines) {
        slot.copy_from_slice(&line.to_slot()?);
    }
    let new_count = index + lines.len() as u32;
    if new_count > config_line_count(data)? {
        data[CONFIG_ARRAY_START..CONFIG_ARRAY_START + 4].copy_from_slice(&new_count.to_le_bytes());
    }
    Ok(())
}
