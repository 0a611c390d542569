pub mod bucket;
pub mod error;
pub mod provider;
pub mod resource;

pub use bucket::{Bucket, CloudObject, ListObjectsResult, DEFAULT_LIST_MAX};
pub use error::FacadeError;
pub use provider::{AzureProvider, CreateBucketOptions, CAPABILITIES};
pub use resource::{CloudResource, GenericResource, ResourceKind};
