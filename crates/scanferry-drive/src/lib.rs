//! Google Drive backend for scanferry.
//!
//! [`DriveStore`] implements [`scanferry_watch::RemoteStore`] over the Drive v3
//! REST API using resumable uploads. Requests are authorized by a
//! [`CredentialProvider`]; [`OAuthCredentials`] covers the usual installed
//! application setup with a client secrets file and a cached token file.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod credentials;
pub mod error;
pub mod store;

pub use credentials::{
    ClientSecrets, CredentialProvider, OAuthCredentials, StaticToken, Token, TokenCache,
    DRIVE_SCOPE,
};
pub use error::{DriveError, Result};
pub use store::{DriveStore, CHUNK_ALIGNMENT, DEFAULT_BASE_URL, DEFAULT_CHUNK_SIZE};
