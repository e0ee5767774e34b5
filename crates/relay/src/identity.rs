// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token → user identity resolution.
//!
//! Tokens are HS256 JWTs carrying a `username` claim and an optional `exp`
//! (epoch seconds). The username is mapped to a numeric [`UserId`] through a
//! [`UserDirectory`] loaded at startup.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::protocol::UserId;

/// Validates an opaque token and returns the identity it belongs to.
///
/// Object-safe for use as `Arc<dyn IdentityResolver>`.
pub trait IdentityResolver: Send + Sync {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UserId, AuthError>> + Send + 'a>>;
}

/// Known users, keyed by username.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    by_name: HashMap<String, UserId>,
}

/// On-disk shape of the user directory file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDirectoryFile {
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
}

impl UserDirectory {
    pub fn from_records(records: impl IntoIterator<Item = UserRecord>) -> Self {
        Self { by_name: records.into_iter().map(|r| (r.username, r.id)).collect() }
    }

    /// Load `{"users": [{"id": 1, "username": "alice"}, ...]}` from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: UserDirectoryFile = serde_json::from_str(&contents)?;
        Ok(Self::from_records(file.users))
    }

    pub fn get(&self, username: &str) -> Option<UserId> {
        self.by_name.get(username).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct Claims {
    username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
}

/// HS256 token verifier backed by a [`UserDirectory`].
pub struct TokenResolver {
    key: DecodingKey,
    validation: Validation,
    directory: UserDirectory,
}

impl TokenResolver {
    pub fn new(secret: &[u8], directory: UserDirectory) -> Self {
        // `exp` is optional; when present it is enforced without leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.leeway = 0;
        Self { key: DecodingKey::from_secret(secret), validation, directory }
    }

    /// Verify `token` and return the username it was issued for.
    pub fn verify_username(&self, token: &str) -> Result<String, AuthError> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token);

        let header = decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidAlgorithm => {
                AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg))
            }
            _ => AuthError::Malformed(e.to_string()),
        })?;
        Ok(data.claims.username)
    }
}

impl IdentityResolver for TokenResolver {
    fn validate<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UserId, AuthError>> + Send + 'a>> {
        Box::pin(async move {
            let username = self.verify_username(token)?;
            self.directory.get(&username).ok_or(AuthError::UnknownUser(username))
        })
    }
}

/// Mint an HS256 token for `username`, expiring at `exp` epoch seconds.
pub fn encode_token(secret: &[u8], username: &str, exp: Option<u64>) -> anyhow::Result<String> {
    let claims = Claims { username: username.to_owned(), exp };
    Ok(encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret))?)
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
