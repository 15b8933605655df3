use crate::entry::{AccessMode, Entry, EntryRights};
use crate::handle::Handle;
use crate::path::{self, PathMapper};
use crate::pipe::{ReadPipe, WritePipe};
use crate::table::Table;
use crate::wasi::{Errno, Fd, Filetype, Rights, RightsExt};
use anyhow::Context;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) const DEFAULT_MAX_OPEN_FILES: u32 = 1024;

/// A builder allowing customizable construction of `WasiFs` instances.
pub struct WasiFsBuilder {
    root: PathBuf,
    preopens: Vec<(PathBuf, String, AccessMode)>,
    max_open_files: u32,
    stdin: Option<ReadPipe>,
    stdout: Option<WritePipe>,
    stderr: Option<WritePipe>,
    default_access: AccessMode,
    allow_create: bool,
    allow_delete: bool,
}

impl WasiFsBuilder {
    pub fn new(host_root: impl AsRef<Path>) -> Self {
        Self {
            root: host_root.as_ref().to_owned(),
            preopens: Vec::new(),
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            stdin: None,
            stdout: None,
            stderr: None,
            default_access: AccessMode::READ | AccessMode::WRITE,
            allow_create: true,
            allow_delete: true,
        }
    }

    /// Add a preopened directory, granted with the default access mode.
    pub fn preopened_dir(self, host_path: impl AsRef<Path>, guest_path: impl AsRef<str>) -> Self {
        let access = self.default_access;
        self.preopened_dir_with(host_path, guest_path, access)
    }

    /// Add a preopened directory with an explicit access mode.
    pub fn preopened_dir_with(
        mut self,
        host_path: impl AsRef<Path>,
        guest_path: impl AsRef<str>,
        access: AccessMode,
    ) -> Self {
        self.preopens.push((
            host_path.as_ref().to_owned(),
            guest_path.as_ref().to_owned(),
            access,
        ));
        self
    }

    /// Cap the number of simultaneously open descriptors (default 1024).
    pub fn max_open_files(mut self, max: u32) -> Self {
        self.max_open_files = max;
        self
    }

    /// Provide a byte stream to use as stdin.
    pub fn stdin(mut self, stdin: ReadPipe) -> Self {
        self.stdin = Some(stdin);
        self
    }

    /// Provide a byte stream to use as stdout.
    pub fn stdout(mut self, stdout: WritePipe) -> Self {
        self.stdout = Some(stdout);
        self
    }

    /// Provide a byte stream to use as stderr.
    pub fn stderr(mut self, stderr: WritePipe) -> Self {
        self.stderr = Some(stderr);
        self
    }

    /// Access mode granted to preopens and newly bound files unless
    /// overridden per preopen.
    pub fn default_access(mut self, access: AccessMode) -> Self {
        self.default_access = access;
        self
    }

    /// Permit or forbid creating files, directories and links. When
    /// forbidden, the corresponding `PATH_*` rights never enter any initial
    /// rights set, so the operations fail `Notcapable` uniformly.
    pub fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    /// Permit or forbid unlinking files and removing directories.
    pub fn allow_delete(mut self, allow: bool) -> Self {
        self.allow_delete = allow;
        self
    }

    /// Build a `WasiFs`, consuming this builder.
    ///
    /// Configuration problems (missing root, unreadable preopen) surface
    /// here as embedder errors; the guest only ever sees errnos.
    pub fn build(self) -> anyhow::Result<WasiFs> {
        let root = fs::canonicalize(&self.root)
            .with_context(|| format!("root host directory {:?}", self.root))?;
        if !root.is_dir() {
            anyhow::bail!("root host directory {:?} is not a directory", root);
        }

        let fs = WasiFs {
            table: Table::new(self.max_open_files),
            paths: PathMapper::new(root),
            default_access: self.default_access,
            allow_create: self.allow_create,
            allow_delete: self.allow_delete,
        };

        let stdio_base = Rights::character_device_base();
        fs.insert_stdio(
            0,
            "/dev/stdin",
            match self.stdin {
                Some(pipe) => Handle::ReadPipe(pipe),
                None => Handle::DevNull,
            },
            AccessMode::READ,
            stdio_base & !Rights::FD_WRITE,
        )?;
        fs.insert_stdio(
            1,
            "/dev/stdout",
            match self.stdout {
                Some(pipe) => Handle::WritePipe(pipe),
                None => Handle::DevNull,
            },
            AccessMode::WRITE,
            stdio_base & !Rights::FD_READ,
        )?;
        fs.insert_stdio(
            2,
            "/dev/stderr",
            match self.stderr {
                Some(pipe) => Handle::WritePipe(pipe),
                None => Handle::DevNull,
            },
            AccessMode::WRITE,
            stdio_base & !Rights::FD_READ,
        )?;

        // Guest startup code starts looking at fd 3 for preopens.
        for (host_path, guest_path, access) in self.preopens {
            let fd = fs
                .bind_dir_with(&guest_path, &host_path, access)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("preopen {guest_path:?} -> {host_path:?}"))?;
            tracing::debug!("preopen {:?} bound at fd {}", guest_path, fd);
        }
        Ok(fs)
    }
}

/// An instance of the filesystem subsystem: the descriptor table, the
/// preopen path mappings, and the permission policy. One `WasiFs` may be
/// shared by several guest instances; all state is per-instance and
/// in-memory.
pub struct WasiFs {
    pub(crate) table: Table,
    pub(crate) paths: PathMapper,
    pub(crate) default_access: AccessMode,
    pub(crate) allow_create: bool,
    pub(crate) allow_delete: bool,
}

impl fmt::Debug for WasiFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WasiFs")
            .field("default_access", &self.default_access)
            .field("allow_create", &self.allow_create)
            .field("allow_delete", &self.allow_delete)
            .finish()
    }
}

impl WasiFs {
    /// Start building an instance rooted at `host_root`.
    pub fn builder(host_root: impl AsRef<Path>) -> WasiFsBuilder {
        WasiFsBuilder::new(host_root)
    }

    fn insert_stdio(
        &self,
        fd: Fd,
        guest_path: &str,
        handle: Handle,
        access: AccessMode,
        base: Rights,
    ) -> anyhow::Result<()> {
        self.table
            .insert_at(
                fd,
                Entry::new(
                    Filetype::CharacterDevice,
                    guest_path.to_owned(),
                    handle,
                    access,
                    EntryRights::from_base(base),
                    true,
                ),
            )
            .map_err(|e| anyhow::anyhow!("binding stdio fd {fd}: {e}"))
    }

    /// Bind an already-open host file at `guest_path`, returning the new
    /// descriptor id.
    pub fn bind_file(&self, guest_path: &str, file: fs::File) -> crate::Result<Fd> {
        let guest_path = path::normalize_guest(guest_path)?;
        let meta = file.metadata()?;
        let file_type = crate::sys::filetype_from_metadata(&meta);
        if file_type == Filetype::Directory {
            return Err(Errno::Isdir.into());
        }
        let handle = Handle::OsFile(std::sync::Mutex::new(file));
        // The granted mode is the configured default, clipped to what the
        // stream can actually do.
        let mut access = self.default_access;
        if !handle.can_read() {
            access &= !AccessMode::READ;
        }
        if !handle.can_write() {
            access &= !AccessMode::WRITE;
        }
        let rights =
            EntryRights::initial_for(file_type, access, self.allow_create, self.allow_delete);
        self.table
            .push(Entry::new(file_type, guest_path, handle, access, rights, false))
    }

    /// Bind a host directory at `guest_path` as a preopen: the directory
    /// enters both the descriptor table and the path mapping table.
    pub fn bind_dir(&self, guest_path: &str, host_path: impl AsRef<Path>) -> crate::Result<Fd> {
        self.bind_dir_with(guest_path, host_path, self.default_access)
    }

    pub(crate) fn bind_dir_with(
        &self,
        guest_path: &str,
        host_path: impl AsRef<Path>,
        access: AccessMode,
    ) -> crate::Result<Fd> {
        let guest_path = path::normalize_guest(guest_path)?;
        let host = fs::canonicalize(host_path.as_ref())?;
        if !host.is_dir() {
            return Err(Errno::Notdir.into());
        }
        self.paths.add_mapping(&guest_path, &host)?;
        let rights = EntryRights::initial_for(
            Filetype::Directory,
            access,
            self.allow_create,
            self.allow_delete,
        );
        self.table.push(Entry::new(
            Filetype::Directory,
            guest_path,
            Handle::Dir(host),
            access,
            rights,
            true,
        ))
    }

    /// Release whatever is bound at `guest_path`: the first matching
    /// descriptor leaves the table, and a directory's path mapping goes with
    /// it. Returns whether anything was unbound.
    pub fn unbind(&self, guest_path: &str) -> bool {
        let guest_path = match path::normalize_guest(guest_path) {
            Ok(p) => p,
            Err(_) => return false,
        };
        match self.table.get_by_path(&guest_path) {
            Some((fd, entry)) => {
                if entry.file_type == Filetype::Directory {
                    self.paths.remove_mapping(&guest_path);
                }
                self.table.delete(fd).is_ok()
            }
            None => false,
        }
    }

    /// The preopened directories currently visible to the guest, in
    /// ascending descriptor order.
    pub fn preopens(&self) -> Vec<(Fd, String)> {
        self.table
            .entries()
            .into_iter()
            .filter(|(_, entry)| entry.preopen && entry.file_type == Filetype::Directory)
            .map(|(fd, entry)| (fd, entry.guest_path.clone()))
            .collect()
    }

    /// Number of live descriptors, stdio included.
    pub fn num_open(&self) -> usize {
        self.table.len()
    }
}

impl Drop for WasiFs {
    // Teardown closes regular-file descriptors; directory and device
    // entries release only their table slot.
    fn drop(&mut self) {
        self.table.clear();
    }
}
