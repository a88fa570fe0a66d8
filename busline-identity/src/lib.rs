//! Accounts, admins, credential hashing and bearer tokens.

pub mod accounts;
pub mod hasher;
pub mod token;

pub use accounts::{
    AccountService, AdminCandidate, AdminPatch, DeletedAccount, LoginOutcome, Registration,
    UserProfile,
};
pub use hasher::{Argon2Hasher, CredentialHasher};
pub use token::{decode_bearer, Claims, JwtCodec, TokenCodec};
