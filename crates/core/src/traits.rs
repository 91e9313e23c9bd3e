//! Store contracts consumed by collaborators outside the durable-state
//! core (§6.6). `amftpd-storage::Store<T>` implements all three for its
//! respective record type; collaborators should depend on these traits
//! rather than the concrete `Store<T>`.

use crate::entities::{Group, Section, User};
use crate::error::Result;

/// Common read/write surface shared by every record store.
pub trait RecordStore<T> {
    /// Look up a record by name, case-insensitively.
    fn find(&self, name: &str) -> Option<T>;

    /// Snapshot of every live record, in no particular order.
    fn all(&self) -> Vec<T>;

    /// Number of live records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a brand-new record. Fails with `AlreadyExists` if the name
    /// collides (case-insensitively) with an existing record.
    fn try_add(&self, record: T) -> Result<()>;

    /// Replace an existing record in place. Fails with `NotFound` if no
    /// record with that name exists.
    fn try_update(&self, record: T) -> Result<()>;

    /// Remove a record by name. Fails with `NotFound` if absent.
    fn try_delete(&self, name: &str) -> Result<()>;
}

/// User store contract.
pub trait UserStore: RecordStore<User> {}

/// Group store contract. Groups additionally support renaming, which
/// users and sections do not (§4.4).
pub trait GroupStore: RecordStore<Group> {
    /// Rename a group in place, preserving its members and credits.
    fn try_rename(&self, old_name: &str, new_name: &str) -> Result<()>;
}

/// Section store contract.
pub trait SectionStore: RecordStore<Section> {}
