//! Both address spaces of one process, kept in step.

use crate::kernel::{KernelImage, make_process_kernel_table};
use crate::mirror::{mirror_kernel_range, release_mirror, unmirror_kernel_range};
use crate::{AddressSpace, FrameAlloc, PhysMapper, VmError};
use kernel_info::memory::{PAGE_SIZE, PLIC};
use log::warn;

/// A process's user table, its private kernel view and the size of its
/// user memory.
///
/// Every change to the user range below `size` is mirrored into the kernel
/// view before the call returns.
pub struct ProcessMemory<'m, M: PhysMapper> {
    user: AddressSpace<'m, M>,
    kernel: AddressSpace<'m, M>,
    size: u64,
}

impl<'m, M: PhysMapper> ProcessMemory<'m, M> {
    /// Empty user table plus a fresh kernel view.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; nothing stays allocated.
    pub fn new<A: FrameAlloc + ?Sized>(
        mapper: &'m M,
        alloc: &A,
        image: &KernelImage,
    ) -> Result<Self, VmError> {
        let user = AddressSpace::create(mapper, alloc)?;
        match make_process_kernel_table(mapper, alloc, image) {
            Ok(kernel) => Ok(Self {
                user,
                kernel,
                size: 0,
            }),
            Err(e) => {
                user.free_tree(alloc);
                Err(e)
            }
        }
    }

    #[inline]
    pub const fn user(&self) -> &AddressSpace<'m, M> {
        &self.user
    }

    /// The table the kernel runs on while serving this process.
    #[inline]
    pub const fn kernel_view(&self) -> &AddressSpace<'m, M> {
        &self.kernel
    }

    /// Bytes of user memory, starting at address zero.
    #[inline]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Install the first user image at address zero; the process then has
    /// one page of memory.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`].
    ///
    /// # Panics
    /// If memory was already set up, or the image does not fit in a page.
    pub fn load_first<A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &A,
        image: &[u8],
    ) -> Result<(), VmError> {
        assert_eq!(self.size, 0, "load_first: process already has memory");
        self.user.load_first(alloc, image)?;
        if let Err(e) = mirror_kernel_range(&self.user, &self.kernel, alloc, 0, PAGE_SIZE) {
            self.user.shrink(alloc, PAGE_SIZE, 0);
            return Err(e);
        }
        self.size = PAGE_SIZE;
        Ok(())
    }

    /// Grow or shrink user memory to `new_size` bytes (the `sbrk` path).
    /// Returns the new size.
    ///
    /// # Errors
    /// - [`VmError::MirrorOverlapsKernel`] if `new_size` reaches `PLIC`.
    /// - [`VmError::OutOfMemory`]; the size is unchanged by then.
    pub fn resize<A: FrameAlloc + ?Sized>(
        &mut self,
        alloc: &A,
        new_size: u64,
    ) -> Result<u64, VmError> {
        let old_size = self.size;
        if new_size > old_size {
            if new_size > PLIC {
                return Err(VmError::MirrorOverlapsKernel { end: new_size });
            }
            self.user.grow(alloc, old_size, new_size)?;
            if let Err(e) = mirror_kernel_range(&self.user, &self.kernel, alloc, old_size, new_size)
            {
                warn!("resize: {e} mirroring up to {new_size:#x}");
                self.user.shrink(alloc, new_size, old_size);
                return Err(e);
            }
        } else if new_size < old_size {
            unmirror_kernel_range(&self.kernel, old_size, new_size);
            self.user.shrink(alloc, old_size, new_size);
        }
        self.size = new_size;
        Ok(new_size)
    }

    /// A child with a private copy of this process's user memory.
    ///
    /// # Errors
    /// [`VmError::OutOfMemory`]; the partial child has been released.
    pub fn fork<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &A,
        image: &KernelImage,
    ) -> Result<Self, VmError> {
        let mut child = Self::new(self.user.mapper(), alloc, image)?;

        if let Err(e) = self.user.duplicate(&child.user, alloc, self.size) {
            child.release(alloc);
            return Err(e);
        }
        child.size = self.size;

        if let Err(e) = mirror_kernel_range(&child.user, &child.kernel, alloc, 0, self.size) {
            child.release(alloc);
            return Err(e);
        }
        Ok(child)
    }

    /// Release both tables and all user memory.
    pub fn release<A: FrameAlloc + ?Sized>(self, alloc: &A) {
        release_mirror(self.kernel, alloc);
        self.user.free_user(alloc, self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestMemory;
    use kernel_info::memory::KERNBASE;
    use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};

    const IMAGE: KernelImage = KernelImage {
        text_end: PhysicalAddress::new(KERNBASE + 0x1_0000),
        trampoline: PhysicalPage::from_number(KERNBASE / PAGE_SIZE),
    };

    fn va(v: u64) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    /// The kernel view maps exactly the user pages below `size`.
    fn assert_mirrored(p: &ProcessMemory<'_, TestMemory>) {
        let mut addr = 0;
        while addr < p.size() {
            let u = *p.user().lookup(va(addr)).unwrap();
            let k = *p.kernel_view().lookup(va(addr)).unwrap();
            assert!(crate::mirror::is_mirror_of(k, u), "{addr:#x} not mirrored");
            addr += PAGE_SIZE;
        }
        if let Some(k) = p.kernel_view().lookup(va(addr)) {
            assert!(!k.is_valid(), "{addr:#x} mirrored past the end");
        }
    }

    #[test]
    fn lifecycle_returns_every_frame() {
        let mem = TestMemory::new(200);
        let mut p = ProcessMemory::new(&mem, &mem, &IMAGE).unwrap();
        p.load_first(&mem, b"init").unwrap();
        assert_eq!(p.size(), PAGE_SIZE);
        assert_mirrored(&p);

        assert_eq!(p.resize(&mem, 5 * PAGE_SIZE + 12), Ok(5 * PAGE_SIZE + 12));
        assert_mirrored(&p);
        assert_eq!(p.resize(&mem, 2 * PAGE_SIZE), Ok(2 * PAGE_SIZE));
        assert_mirrored(&p);

        // The kernel reads user memory through its own view.
        p.user().copy_out(va(0x1008), b"via kernel").unwrap();
        let pa = p.kernel_view().translate_kernel(va(0x1008));
        assert_eq!(&mem.read_frame(pa.page())[8..18], b"via kernel");

        p.release(&mem);
        assert_eq!(mem.outstanding(), 0);
    }

    #[test]
    fn resize_rejects_kernel_overlap() {
        let mem = TestMemory::new(200);
        let mut p = ProcessMemory::new(&mem, &mem, &IMAGE).unwrap();
        let before = mem.outstanding();
        assert_eq!(
            p.resize(&mem, PLIC + PAGE_SIZE),
            Err(VmError::MirrorOverlapsKernel { end: PLIC + PAGE_SIZE })
        );
        assert_eq!(p.size(), 0);
        assert_eq!(mem.outstanding(), before);
        p.release(&mem);
    }

    #[test]
    fn failed_growth_keeps_the_old_size() {
        let mem = TestMemory::new(200);
        let mut p = ProcessMemory::new(&mem, &mem, &IMAGE).unwrap();
        p.resize(&mem, PAGE_SIZE).unwrap();
        let before = mem.outstanding();

        assert_eq!(p.resize(&mem, 1000 * PAGE_SIZE), Err(VmError::OutOfMemory));
        assert_eq!(p.size(), PAGE_SIZE);
        assert_eq!(mem.outstanding(), before);
        assert_mirrored(&p);
        p.release(&mem);
        assert_eq!(mem.outstanding(), 0);
    }

    #[test]
    fn fork_copies_and_mirrors() {
        let mem = TestMemory::new(300);
        let mut parent = ProcessMemory::new(&mem, &mem, &IMAGE).unwrap();
        parent.resize(&mem, 3 * PAGE_SIZE).unwrap();
        parent.user().copy_out(va(0x2000), b"inherited").unwrap();

        let child = parent.fork(&mem, &IMAGE).unwrap();
        assert_eq!(child.size(), parent.size());
        assert_mirrored(&child);

        let mut buf = [0u8; 9];
        child.user().copy_in(&mut buf, va(0x2000)).unwrap();
        assert_eq!(&buf, b"inherited");
        assert_ne!(
            child.user().translate(va(0x2000)),
            parent.user().translate(va(0x2000))
        );

        child.release(&mem);
        parent.release(&mem);
        assert_eq!(mem.outstanding(), 0);
    }

    #[test]
    fn failed_fork_releases_the_child() {
        let mem = TestMemory::new(200);
        let mut parent = ProcessMemory::new(&mem, &mem, &IMAGE).unwrap();
        let room = mem.available() as u64;
        // Leave too little for the child's tables plus a full copy.
        parent.resize(&mem, (room - 80) * PAGE_SIZE).unwrap();
        let before = mem.outstanding();

        assert_eq!(parent.fork(&mem, &IMAGE).err(), Some(VmError::OutOfMemory));
        assert_eq!(mem.outstanding(), before);
        parent.release(&mem);
    }
}
