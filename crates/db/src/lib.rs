pub mod blobs;
pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use blobs::FsReceiptStore;
pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{ClaimSeedInfo, DemoSeedDataset, SeedResult, VerificationResult};
pub use repositories::{
    RepositoryError, SqlCategoryRepository, SqlClaimRepository, SqlUserRepository, UserRecord,
    UserRepository,
};
