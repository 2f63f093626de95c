//! Account access layers for isolab
//!
//! Two thin layers over the same sessions:
//! - [`AccountDao`]: explicit per-call transactions at one fixed level
//! - [`AccountRepository`]: per-method levels through [`TransactionTemplate`]
//!
//! Plus a concurrent transfer workload that samples the total balance.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dao;
pub mod model;
pub mod repository;
pub mod template;
pub mod workload;

pub use dao::AccountDao;
pub use model::{Account, Page};
pub use repository::AccountRepository;
pub use template::{TransactionScope, TransactionTemplate};
pub use workload::{TransferWorkload, WorkloadReport};
