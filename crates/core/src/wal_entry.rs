//! The typed WAL entry kinds every `Store<T>` appends (§3, §6.2).

/// Discriminant byte stored as the first byte of each WAL frame's
/// plaintext payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalEntryKind {
    AddUser = 0,
    UpdateUser = 1,
    DeleteUser = 2,
    AddGroup = 3,
    UpdateGroup = 4,
    DeleteGroup = 5,
    RenameGroup = 6,
    AddSection = 7,
    UpdateSection = 8,
    DeleteSection = 9,
}

impl WalEntryKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::AddUser,
            1 => Self::UpdateUser,
            2 => Self::DeleteUser,
            3 => Self::AddGroup,
            4 => Self::UpdateGroup,
            5 => Self::DeleteGroup,
            6 => Self::RenameGroup,
            7 => Self::AddSection,
            8 => Self::UpdateSection,
            9 => Self::DeleteSection,
            _ => return None,
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A single decoded WAL entry: a kind tag plus its raw payload. The
/// payload's meaning depends on `kind` (§3 WalEntry): a snapshot record
/// body for Add/Update, a UTF-8 name for Delete, or `"old|new"` for
/// RenameGroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    pub kind: WalEntryKind,
    pub payload: Vec<u8>,
}

impl WalEntry {
    pub fn new(kind: WalEntryKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }
}
