use crate::handle::Handle;
use crate::wasi::{Errno, Fdflags, Filetype, Rights, RightsExt};
use crate::Result;
use bitflags::bitflags;
use std::fmt;
use std::sync::RwLock;

bitflags! {
    /// The access mode a descriptor (or a preopen) was granted on the host.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct AccessMode: u32 {
        const READ = 0b1;
        const WRITE = 0b10;
    }
}

/// Represents rights of an `Entry`, either already held or required.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct EntryRights {
    pub(crate) base: Rights,
    pub(crate) inheriting: Rights,
}

impl EntryRights {
    pub(crate) fn new(base: Rights, inheriting: Rights) -> Self {
        Self { base, inheriting }
    }

    /// Create a new `EntryRights` instance from `base` rights only, keeping
    /// `inheriting` set to none.
    pub(crate) fn from_base(base: Rights) -> Self {
        Self {
            base,
            inheriting: Rights::empty(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            base: Rights::empty(),
            inheriting: Rights::empty(),
        }
    }

    /// Check if `other` is a subset of those rights.
    pub(crate) fn contains(&self, other: &Self) -> bool {
        self.base.contains(other.base) && self.inheriting.contains(other.inheriting)
    }

    /// Bitwise restriction: what survives of `self` under `mask`.
    pub(crate) fn restrict(&self, mask: &Self) -> Self {
        Self {
            base: self.base & mask.base,
            inheriting: self.inheriting & mask.inheriting,
        }
    }

    /// The full rights set a freshly bound descriptor of `filetype` starts
    /// with, narrowed by the host access mode and the create/delete policy.
    pub(crate) fn initial_for(
        filetype: Filetype,
        access: AccessMode,
        allow_create: bool,
        allow_delete: bool,
    ) -> Self {
        let mut rights = match filetype {
            Filetype::Directory => {
                Self::new(Rights::directory_base(), Rights::directory_inheriting())
            }
            Filetype::RegularFile => Self::new(
                Rights::regular_file_base(),
                Rights::regular_file_inheriting(),
            ),
            _ => Self::new(
                Rights::character_device_base(),
                Rights::character_device_inheriting(),
            ),
        };
        if !access.contains(AccessMode::READ) {
            rights = rights.without(Rights::FD_READ | Rights::FD_READDIR);
        }
        if !access.contains(AccessMode::WRITE) {
            rights = rights.without(
                Rights::FD_WRITE
                    | Rights::FD_ALLOCATE
                    | Rights::FD_DATASYNC
                    | Rights::FD_FILESTAT_SET_SIZE
                    | Rights::FD_FILESTAT_SET_TIMES
                    | Rights::PATH_CREATE_DIRECTORY
                    | Rights::PATH_CREATE_FILE
                    | Rights::PATH_LINK_SOURCE
                    | Rights::PATH_LINK_TARGET
                    | Rights::PATH_RENAME_SOURCE
                    | Rights::PATH_RENAME_TARGET
                    | Rights::PATH_FILESTAT_SET_SIZE
                    | Rights::PATH_FILESTAT_SET_TIMES
                    | Rights::PATH_SYMLINK
                    | Rights::PATH_UNLINK_FILE
                    | Rights::PATH_REMOVE_DIRECTORY,
            );
        }
        if !allow_create {
            rights = rights.without(
                Rights::PATH_CREATE_DIRECTORY
                    | Rights::PATH_CREATE_FILE
                    | Rights::PATH_LINK_TARGET
                    | Rights::PATH_SYMLINK,
            );
        }
        if !allow_delete {
            rights =
                rights.without(Rights::PATH_UNLINK_FILE | Rights::PATH_REMOVE_DIRECTORY);
        }
        rights
    }

    fn without(&self, removed: Rights) -> Self {
        Self {
            base: self.base & !removed,
            inheriting: self.inheriting & !removed,
        }
    }
}

impl fmt::Display for EntryRights {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "EntryRights {{ base: {}, inheriting: {} }}",
            self.base, self.inheriting
        )
    }
}

/// A descriptor table record: the backing handle plus the metadata the guest
/// can observe through `fd_fdstat_get` and `fd_prestat_*`.
///
/// Rights and fdflags take interior locks so concurrent hostcalls can narrow
/// rights or toggle flags on shared entries; the table hands out `Arc<Entry>`
/// clones.
pub(crate) struct Entry {
    pub(crate) file_type: Filetype,
    pub(crate) guest_path: String,
    pub(crate) handle: Handle,
    pub(crate) access: AccessMode,
    pub(crate) rights: RwLock<EntryRights>,
    pub(crate) fdflags: RwLock<Fdflags>,
    pub(crate) preopen: bool,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("file_type", &self.file_type)
            .field("guest_path", &self.guest_path)
            .field("access", &self.access)
            .field("rights", &self.rights)
            .field("fdflags", &self.fdflags)
            .field("preopen", &self.preopen)
            .finish()
    }
}

impl Entry {
    pub(crate) fn new(
        file_type: Filetype,
        guest_path: String,
        handle: Handle,
        access: AccessMode,
        rights: EntryRights,
        preopen: bool,
    ) -> Self {
        Self {
            file_type,
            guest_path,
            handle,
            access,
            rights: RwLock::new(rights),
            fdflags: RwLock::new(Fdflags::empty()),
            preopen,
        }
    }

    /// Check if this entry satisfies the specified rights; i.e., if the
    /// rights attached to it are a superset.
    ///
    /// Upon unsuccessful check, `Errno::Notcapable` is returned.
    pub(crate) fn validate_rights(&self, required: &EntryRights) -> Result<()> {
        let held = *self.rights.read().unwrap();
        if held.contains(required) {
            Ok(())
        } else {
            tracing::trace!(
                "validate_rights failed: required rights = {}; actual rights = {}",
                required,
                held,
            );
            Err(Errno::Notcapable.into())
        }
    }

    /// `fd_fdstat_set_rights`: a monotonic narrowing. The new pair must be a
    /// subset of what is currently held.
    pub(crate) fn narrow_rights(&self, requested: EntryRights) -> Result<()> {
        let mut held = self.rights.write().unwrap();
        if !held.contains(&requested) {
            return Err(Errno::Notcapable.into());
        }
        *held = requested;
        Ok(())
    }

    pub(crate) fn rights(&self) -> EntryRights {
        *self.rights.read().unwrap()
    }

    pub(crate) fn fdflags(&self) -> Fdflags {
        *self.fdflags.read().unwrap()
    }

    pub(crate) fn set_fdflags(&self, flags: Fdflags) {
        *self.fdflags.write().unwrap() = flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_entry(rights: EntryRights) -> Entry {
        Entry::new(
            Filetype::RegularFile,
            "/tmp/x".to_owned(),
            Handle::DevNull,
            AccessMode::READ | AccessMode::WRITE,
            rights,
            false,
        )
    }

    #[test]
    fn validate_rights_is_subset_check() {
        let entry = file_entry(EntryRights::from_base(Rights::FD_READ | Rights::FD_SEEK));
        assert!(entry
            .validate_rights(&EntryRights::from_base(Rights::FD_READ))
            .is_ok());
        assert!(entry
            .validate_rights(&EntryRights::from_base(Rights::FD_WRITE))
            .is_err());
    }

    #[test]
    fn narrowing_is_monotonic() {
        let entry = file_entry(EntryRights::from_base(Rights::FD_READ | Rights::FD_WRITE));
        entry
            .narrow_rights(EntryRights::from_base(Rights::FD_READ))
            .unwrap();
        // Regaining a dropped right must fail.
        let err = entry
            .narrow_rights(EntryRights::from_base(Rights::FD_READ | Rights::FD_WRITE))
            .unwrap_err();
        assert_eq!(err.as_wasi_errno(), Errno::Notcapable);
        assert_eq!(entry.rights().base, Rights::FD_READ);
    }

    #[test]
    fn initial_rights_respect_policy() {
        let rights = EntryRights::initial_for(
            Filetype::Directory,
            AccessMode::READ | AccessMode::WRITE,
            true,
            false,
        );
        assert!(rights.base.contains(Rights::PATH_OPEN));
        assert!(rights.base.contains(Rights::PATH_CREATE_FILE));
        assert!(!rights.base.contains(Rights::PATH_UNLINK_FILE));
        assert!(!rights.base.contains(Rights::PATH_REMOVE_DIRECTORY));

        let readonly =
            EntryRights::initial_for(Filetype::Directory, AccessMode::READ, true, true);
        assert!(!readonly.base.contains(Rights::PATH_CREATE_FILE));
        assert!(!readonly.inheriting.contains(Rights::FD_WRITE));
        assert!(readonly.base.contains(Rights::FD_READDIR));
    }
}
