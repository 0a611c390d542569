pub mod account;
pub mod blob;
pub mod client;
pub mod container;
pub mod error;
pub mod multipart;
pub mod sign;
pub mod vhd;
mod xml;

#[cfg(test)]
mod testing;

pub use account::{
    blob_client, create_storage_account, delete_storage_account, get_storage_account, is_storage_account_name_available,
    list_storage_accounts, storage_account_key, storage_skus, unique_storage_account_name, AccessUrl, StorageAccount,
    StorageAccountOptions, StorageSkuInfo,
};
pub use blob::{BlobItem, BlobListing, BlobProperties, ListBlobsOptions};
pub use client::BlobClient;
pub use container::Container;
pub use error::BlobError;
pub use multipart::{block_id, MAX_PART_COUNT, MAX_PART_SIZE_BYTES};
