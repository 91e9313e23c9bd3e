//! The `Record` seam `Store<T>` is generic over: how a `T` gets a key,
//! how it serializes to and from its §6.1 wire layout, and which
//! `WalEntryKind`s mutate it.

use amftpd_core::{Result, WalEntryKind};
use std::collections::HashMap;

/// A type storable in a `Store<T>`.
pub trait Record: Clone + Sized {
    /// The record's unique, case-insensitively-compared key.
    fn name(&self) -> &str;

    /// Serialize to the exact on-disk record body from §6.1, including
    /// any leading record-type byte the layout specifies.
    fn encode(&self) -> Vec<u8>;

    /// Parse a record body. Returns `Ok(None)` (not an error) when the
    /// record declares a type this build does not recognize, e.g. a
    /// future user-record type byte — callers skip these with a
    /// warning rather than fail the whole snapshot load.
    fn decode(bytes: &[u8]) -> Result<Option<Self>>;

    fn add_kind() -> WalEntryKind;
    fn update_kind() -> WalEntryKind;
    fn delete_kind() -> WalEntryKind;

    /// Canonicalize fields that have more than one valid spelling,
    /// run before `validate`. Defaults to a no-op; `Section` overrides
    /// this to normalize `virtual_root`.
    fn normalize(&mut self) {}

    /// Domain validation run before a record is admitted to the store.
    /// Defaults to always-valid; entities with constraints override it.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Apply a rename WAL entry to `map`. Only `Group` supports this;
    /// other record types keep the default, which is simply never
    /// invoked because `Store<T>::try_rename` is not part of their
    /// public trait surface.
    fn apply_rename(map: &mut HashMap<String, Self>, old_key: &str, new_name: &str) -> Result<()> {
        let _ = (map, old_key, new_name);
        unreachable!("rename is not supported for this record type")
    }
}
