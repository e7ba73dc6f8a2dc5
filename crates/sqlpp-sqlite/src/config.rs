//! Connection configuration.

use std::ffi::c_int;

use crate::ffi;

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for a private in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Name of the VFS module to use, or `None` for the default.
    pub vfs: Option<String>,
    /// Busy timeout in milliseconds. Zero leaves the engine default (no waiting).
    pub busy_timeout_ms: u32,
    /// Foreign key enforcement; `None` keeps the compile-time default.
    pub foreign_keys: Option<bool>,
    /// Trigger execution; `None` keeps the compile-time default.
    pub triggers: Option<bool>,
    /// Report extended result codes from `error_code()` and statuses.
    pub extended_result_codes: bool,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open an in-memory database regardless of the path.
    pub memory: bool,
    /// Open in multi-thread mode (connections not shared between threads).
    pub no_mutex: bool,
    /// Open in serialized mode (connections can be shared).
    pub full_mutex: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Translate to the engine's `SQLITE_OPEN_*` bit set.
    pub fn to_sqlite_flags(self) -> c_int {
        let bits = [
            (self.read_only, ffi::SQLITE_OPEN_READONLY),
            (self.read_write, ffi::SQLITE_OPEN_READWRITE),
            (self.create, ffi::SQLITE_OPEN_CREATE),
            (self.uri, ffi::SQLITE_OPEN_URI),
            (self.memory, ffi::SQLITE_OPEN_MEMORY),
            (self.no_mutex, ffi::SQLITE_OPEN_NOMUTEX),
            (self.full_mutex, ffi::SQLITE_OPEN_FULLMUTEX),
            (self.shared_cache, ffi::SQLITE_OPEN_SHAREDCACHE),
            (self.private_cache, ffi::SQLITE_OPEN_PRIVATECACHE),
        ];
        let mut flags = bits
            .into_iter()
            .filter(|&(set, _)| set)
            .fold(0, |acc, (_, bit)| acc | bit);

        // no access mode means read-write, created on demand
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            vfs: None,
            busy_timeout_ms: 0,
            foreign_keys: None,
            triggers: None,
            extended_result_codes: false,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Use a named VFS module.
    pub fn vfs(mut self, name: impl Into<String>) -> Self {
        self.vfs = Some(name.into());
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Turn foreign key enforcement on or off after opening.
    pub fn foreign_keys(mut self, enable: bool) -> Self {
        self.foreign_keys = Some(enable);
        self
    }

    /// Turn trigger execution on or off after opening.
    pub fn triggers(mut self, enable: bool) -> Self {
        self.triggers = Some(enable);
        self
    }

    /// Report extended result codes.
    pub fn extended_result_codes(mut self, enable: bool) -> Self {
        self.extended_result_codes = enable;
        self
    }
}
