//! Translation between POSIX mode bits and host file attributes.
//!
//! The store speaks POSIX modes; the host virtualization driver speaks a
//! `FILE_ATTRIBUTE_*`-style bitmask. Both directions lose information, so
//! the conversions here only promise to preserve directory-ness and
//! read-only-ness across a round trip.

use bitflags::bitflags;

/// POSIX file type and permission bit constants, host-independent.
pub mod mode {
    pub const TYPE_MASK: u32 = 0o170_000;
    pub const REGULAR: u32 = 0o100_000;
    pub const DIRECTORY: u32 = 0o040_000;
    pub const SYMLINK: u32 = 0o120_000;

    pub const OWNER_WRITE: u32 = 0o200;
    pub const PERMISSION_MASK: u32 = 0o777;
}

bitflags! {
    /// Host-side file attribute bitmask (`FILE_ATTRIBUTE_*` layout).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HostAttributes: u32 {
        const READONLY = 0x0001;
        const HIDDEN = 0x0002;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
        const NORMAL = 0x0080;
        const REPARSE_POINT = 0x0400;
    }
}

/// Convert POSIX mode bits into the host attribute bitmask.
#[must_use]
pub fn mode_to_host_attributes(mode: u32) -> HostAttributes {
    let mut attrs = HostAttributes::empty();
    match mode & mode::TYPE_MASK {
        mode::DIRECTORY => attrs |= HostAttributes::DIRECTORY,
        mode::SYMLINK => attrs |= HostAttributes::REPARSE_POINT,
        mode::REGULAR => attrs |= HostAttributes::ARCHIVE,
        _ => {}
    }
    if mode & mode::OWNER_WRITE == 0 {
        attrs |= HostAttributes::READONLY;
    }
    if attrs.is_empty() {
        attrs = HostAttributes::NORMAL;
    }
    attrs
}

/// Host attributes for an entry, including the HIDDEN bit for dotfiles.
#[must_use]
pub fn attributes_for(mode: u32, name: &str) -> HostAttributes {
    let mut attrs = mode_to_host_attributes(mode);
    if is_hidden_file(name) {
        attrs |= HostAttributes::HIDDEN;
    }
    attrs
}

/// Convert a host attribute bitmask back into POSIX mode bits.
///
/// READONLY yields `r--r--r--`, everything else `rw-rw-r--`; directories
/// additionally get execute bits for owner, group, and other.
#[must_use]
pub fn host_attributes_to_mode(attrs: HostAttributes, is_directory: bool) -> u32 {
    let perms = if attrs.contains(HostAttributes::READONLY) {
        0o444
    } else {
        0o664
    };
    if is_directory || attrs.contains(HostAttributes::DIRECTORY) {
        mode::DIRECTORY | perms | 0o111
    } else if attrs.contains(HostAttributes::REPARSE_POINT) {
        mode::SYMLINK | perms
    } else {
        mode::REGULAR | perms
    }
}

/// Whether `name` is hidden by dotfile convention (`.` and `..` excluded).
#[must_use]
pub fn is_hidden_file(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

#[must_use]
pub fn default_file_mode() -> u32 {
    mode::REGULAR | 0o664
}

#[must_use]
pub fn default_directory_mode() -> u32 {
    mode::DIRECTORY | 0o775
}

/// Render the nine permission bits as an `rwxrwxrwx`-style string.
#[must_use]
pub fn format_permissions(mode: u32) -> String {
    let mut out = String::with_capacity(9);
    for shift in [6_u32, 3, 0] {
        let triplet = (mode >> shift) & 0o7;
        out.push(if triplet & 0o4 != 0 { 'r' } else { '-' });
        out.push(if triplet & 0o2 != 0 { 'w' } else { '-' });
        out.push(if triplet & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
