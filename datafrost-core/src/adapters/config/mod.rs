//! Configuration types for database adapters.
//!
//! - `Credentials`: validated, backend-specific connection settings
//! - `CredentialMap`: the open JSON form stored on connection records
//!
//! # Security
//! Secret-bearing values are wrapped in `Secret` and never logged.

mod credentials;

pub use credentials::{
    BackendKind, BigQueryCredentials, CredentialMap, Credentials, PostgresCredentials,
    PostgresFields, Secret, SnowflakeAuth, SnowflakeCredentials, SqliteCredentials,
    TursoCredentials, deserialize_credentials, serialize_credentials,
};
