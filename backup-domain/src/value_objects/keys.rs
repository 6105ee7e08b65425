// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Key material value objects. Bytes are zeroed on drop via `ZeroizeOnDrop`;
//! these wrappers never implement `Debug` in a way that would print raw key
//! bytes.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Base64-decoded raw shared-secret bytes for the symmetric envelope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymKey(Vec<u8>);

impl SymKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SymKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymKey(..)")
    }
}

/// A recipient's 32-byte X25519 public key, loaded at backup time. Not
/// secret (it's a public key), so it's `Copy` and not zeroized.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecipientKey([u8; 32]);

impl RecipientKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecipientKey(..)")
    }
}

/// A 32-byte X25519 private key. Loaded from disk on restore (process
/// lifetime); generated fresh per stream on backup and never persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IdentityKey([u8; 32]);

impl IdentityKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityKey(..)")
    }
}
