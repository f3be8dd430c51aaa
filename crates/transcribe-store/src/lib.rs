//! Object-store access for the transcription worker: download job input,
//! upload the transcript artifact, and write progress/heartbeat documents.
//! Everything is addressed by `s3://bucket/key` URI; the bucket determines
//! which underlying `object_store::ObjectStore` handles the request.

pub mod client;
pub mod error;
pub mod s3;
pub mod uri;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ObjectStoreClient, StoreFactory};
pub use error::StoreError;
pub use s3::S3StoreFactory;
pub use uri::S3Uri;
