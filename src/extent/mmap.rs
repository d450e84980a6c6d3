use std::io;
use std::ptr::{self, NonNull};

use crate::extent::{Extent, ExtentSource, PageSize};
use crate::{ErrorKind, Result};

/// 匿名`mmap`をバックエンドとする`ExtentSource`の実装.
///
/// 取得したエクステントは、明示的に`return_extent`が呼ばれない限り解放されない
/// (i.e., インスタンスが破棄されてもマッピングは残り続け、プロセス終了時にOSによって回収される).
#[derive(Debug)]
pub struct MmapExtentSource {
    page_size: PageSize,
    mapped_bytes: usize,
}
impl MmapExtentSource {
    /// 新しい`MmapExtentSource`インスタンスを生成する.
    ///
    /// ページサイズはOS(`sysconf(_SC_PAGESIZE)`)から取得される.
    pub fn new() -> Result<Self> {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size < 0 {
            return track_io!(Err(io::Error::last_os_error()));
        }
        let page_size = track!(PageSize::new(page_size as usize))?;
        Ok(MmapExtentSource {
            page_size,
            mapped_bytes: 0,
        })
    }

    /// 現在マッピングされているバイト数を返す.
    pub fn mapped_bytes(&self) -> usize {
        self.mapped_bytes
    }
}
impl ExtentSource for MmapExtentSource {
    fn page_size(&self) -> PageSize {
        self.page_size
    }
    fn request_extent(&mut self, len: usize) -> Result<Extent> {
        track_assert_ne!(len, 0, ErrorKind::InvalidInput);
        track_assert!(self.page_size.is_aligned(len), ErrorKind::InvalidInput; len);

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            // `ENOMEM`は`ErrorKind::OutOfMemory`に変換される
            return track_io!(Err(io::Error::last_os_error()));
        }
        let ptr = track_assert_some!(NonNull::new(ptr as *mut u8), ErrorKind::Other);
        self.mapped_bytes += len;
        Ok(unsafe { Extent::from_raw_parts(ptr, len) })
    }
    fn return_extent(&mut self, extent: Extent) -> Result<()> {
        track_assert!(
            self.page_size.is_aligned(extent.as_ptr().as_ptr() as usize),
            ErrorKind::InvalidInput; extent
        );
        track_assert!(extent.len() <= self.mapped_bytes, ErrorKind::InvalidInput; extent);
        if unsafe { libc::munmap(extent.as_ptr().as_ptr() as *mut libc::c_void, extent.len()) } != 0
        {
            return track_io!(Err(io::Error::last_os_error()));
        }
        self.mapped_bytes -= extent.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn it_works() -> TestResult {
        let mut source = track!(MmapExtentSource::new())?;
        let len = source.page_size().as_usize() * 2;

        let extent = track!(source.request_extent(len))?;
        assert_eq!(extent.len(), len);
        assert_eq!(source.mapped_bytes(), len);
        assert!(source
            .page_size()
            .is_aligned(extent.as_ptr().as_ptr() as usize));

        // 領域全体が読み書き可能
        unsafe {
            ptr::write_bytes(extent.as_ptr().as_ptr(), 0xAB, len);
            assert_eq!(*extent.as_ptr().as_ptr().add(len - 1), 0xAB);
        }

        track!(source.return_extent(extent))?;
        assert_eq!(source.mapped_bytes(), 0);
        Ok(())
    }

    #[test]
    fn unaligned_request_fails() -> TestResult {
        let mut source = track!(MmapExtentSource::new())?;
        let e = source.request_extent(100).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
        Ok(())
    }
}
