use utils_accessors_derive::{Getters, Setters};

/// Access rights of a leaf mapping.
///
/// Only the bits meaningful for a leaf are modelled; validity and the
/// accessed/dirty bits are managed by [`PageEntry`](crate::PageEntry) and the
/// hardware.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Getters, Setters)]
#[allow(clippy::struct_excessive_bools)]
pub struct PagePermissions {
    /// **R**: loads allowed.
    read: bool,

    /// **W**: stores allowed.
    write: bool,

    /// **X**: instruction fetch allowed.
    execute: bool,

    /// **U**: accessible in user mode (and, without `SUM`, not in supervisor mode).
    user: bool,

    /// **G**: present in every address space.
    global: bool,
}

impl PagePermissions {
    pub const NONE: Self = Self {
        read: false,
        write: false,
        execute: false,
        user: false,
        global: false,
    };

    /// Kernel data and device registers.
    pub const READ_WRITE: Self = Self::NONE.with_read(true).with_write(true);

    /// Kernel text and the trampoline.
    pub const READ_EXECUTE: Self = Self::NONE.with_read(true).with_execute(true);

    /// Eagerly allocated user memory.
    pub const USER_RWX: Self = Self::NONE
        .with_read(true)
        .with_write(true)
        .with_execute(true)
        .with_user(true);

    /// Whether a leaf with these permissions would be distinguishable from
    /// a table pointer.
    #[inline]
    #[must_use]
    pub const fn has_access(self) -> bool {
        self.read || self.write || self.execute
    }
}
