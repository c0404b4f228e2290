//! The cndy upload-and-register pipeline.
//!
//! - [`items`]: discovery of `<i>.png` / `<i>.json` pairs
//! - [`scheduler`]: chunk planning and concurrent uploads with bounded retry
//! - [`reconcile`]: the bounded `Scanning -> Working -> Done` pass that
//!   uploads items and writes their config lines, saving the cache after
//!   every step
//! - [`lifecycle`]: candy machine creation, updates, minting, withdrawal and
//!   the multi-deployment sweep

pub mod error;
pub mod items;
pub mod lifecycle;
pub mod reconcile;
pub mod scheduler;

pub use error::{SyncError, SyncResult};
pub use items::{discover, ItemSet};
pub use lifecycle::{
    parse_key_list, read_key_list, sweep, CreateOptions, CreatedCandyMachine, Deployment, ListedConfig, SweepReport,
    SweepSettings, SweptConfig, WithdrawReport,
};
pub use reconcile::{
    verify, Consistency, FailedItem, PassReport, PassState, Reconciler, SyncSettings, VerifyReport,
};
pub use scheduler::{plan, ItemOutcome, UploadScheduler};
