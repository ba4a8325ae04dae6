//! Copying between kernel buffers and user virtual memory.
//!
//! Every copy goes page by page through [`AddressSpace::translate`]-style
//! checks: the page must be a valid user leaf below `MAXVA`.

use super::AddressSpace;
use crate::{PhysMapper, VmError};
use kernel_info::memory::{MAXVA, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalPage, VirtualAddress};

impl<M: PhysMapper> AddressSpace<'_, M> {
    /// The frame behind the user page containing `va`.
    pub(crate) fn user_page(&self, va: VirtualAddress) -> Result<PhysicalPage, VmError> {
        if va.as_u64() >= MAXVA {
            return Err(VmError::AddressOutOfRange { va });
        }
        match self.lookup(va).map(|slot| *slot) {
            Some(entry) if entry.is_leaf() && entry.user() => Ok(entry.page()),
            _ => Err(VmError::Unmapped { va }),
        }
    }

    /// Walk `[va, va + len)` in page-sized chunks, handing each chunk's
    /// bytes in user memory to `f` along with its offset into the range.
    fn for_each_chunk(
        &self,
        va: VirtualAddress,
        len: usize,
        mut f: impl FnMut(usize, &mut [u8]) -> bool,
    ) -> Result<(), VmError> {
        let mut done = 0;
        while done < len {
            let addr = va
                .checked_add(done as u64)
                .ok_or(VmError::AddressOutOfRange { va })?;
            let page = self.user_page(addr)?;
            let offset = addr.offset() as usize;
            let n = (PAGE_SIZE as usize - offset).min(len - done);

            // SAFETY: `page` is a mapped user frame owned by this tree.
            let bytes = unsafe { self.mapper.frame_bytes(page) };
            if !f(done, &mut bytes[offset..offset + n]) {
                return Ok(());
            }
            done += n;
        }
        Ok(())
    }

    /// Copy `src` into user memory at `dst_va`.
    ///
    /// # Errors
    /// [`VmError::Unmapped`] or [`VmError::AddressOutOfRange`] for the first
    /// page that cannot be written; earlier pages have been written already.
    pub fn copy_out(&self, dst_va: VirtualAddress, src: &[u8]) -> Result<(), VmError> {
        self.for_each_chunk(dst_va, src.len(), |at, user| {
            user.copy_from_slice(&src[at..at + user.len()]);
            true
        })
    }

    /// Fill `dst` from user memory at `src_va`.
    ///
    /// # Errors
    /// [`VmError::Unmapped`] or [`VmError::AddressOutOfRange`] for the first
    /// page that cannot be read.
    pub fn copy_in(&self, dst: &mut [u8], src_va: VirtualAddress) -> Result<(), VmError> {
        let len = dst.len();
        self.for_each_chunk(src_va, len, |at, user| {
            dst[at..at + user.len()].copy_from_slice(user);
            true
        })
    }

    /// Copy a NUL-terminated string of at most `max` bytes (terminator
    /// included) from user memory at `src_va` into `dst`.
    ///
    /// Returns the string length without the terminator; `dst` holds the
    /// string followed by NUL.
    ///
    /// # Errors
    /// - [`VmError::BufferTooSmall`] if `max` exceeds `dst.len()`.
    /// - [`VmError::MissingTerminator`] if no NUL occurs within `max` bytes.
    /// - [`VmError::Unmapped`] / [`VmError::AddressOutOfRange`] if a page
    ///   is reached that cannot be read.
    pub fn copy_in_str(
        &self,
        dst: &mut [u8],
        src_va: VirtualAddress,
        max: usize,
    ) -> Result<usize, VmError> {
        if max > dst.len() {
            return Err(VmError::BufferTooSmall);
        }

        let mut found = None;
        self.for_each_chunk(src_va, max, |at, user| {
            match user.iter().position(|&b| b == 0) {
                Some(nul) => {
                    dst[at..=at + nul].copy_from_slice(&user[..=nul]);
                    found = Some(at + nul);
                    false
                }
                None => {
                    dst[at..at + user.len()].copy_from_slice(user);
                    true
                }
            }
        })?;

        found.ok_or(VmError::MissingTerminator { max })
    }
}
