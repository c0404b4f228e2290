//! Ledger access for cndy.
//!
//! This crate is everything that touches the chain:
//! - `LedgerClient` trait boundary over a node, with `RpcLedgerClient`
//!   for real clusters and `InMemoryLedgerClient` for tests
//! - `TransactionSubmitter`: sign, send, confirm, bounded retry that never
//!   double-submits a transaction that already landed
//! - the candy machine program contract (`program`): instruction encoding,
//!   PDA derivation, config account layout, SPL token helpers
//! - `ConfigRegistry`: the config-line registry the upload loop writes to,
//!   with `CandyMachineRegistry` and `InMemoryRegistry`

pub mod client;
pub mod error;
pub mod memory;
pub mod program;
pub mod registry;
pub mod submitter;

pub use client::{LedgerClient, RpcLedgerClient, SignatureStatus};
pub use error::{LedgerError, LedgerResult};
pub use memory::{InMemoryLedgerClient, InMemoryRegistry, RegistryFault, SendOutcome};
pub use program::{CANDY_MACHINE_PROGRAM_ID, CONFIG_LINES_PER_TX, DEFAULT_SECONDARY_PROGRAM_ID};
pub use registry::{CandyMachineRegistry, ConfigRegistry, ConfigSettings, CreatedConfig};
pub use submitter::{SubmitPolicy, TransactionSubmitter};

pub use solana_sdk::pubkey::Pubkey;
pub use solana_sdk::signature::{Keypair, Signature};
