use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::extent::{Extent, ExtentSource, PageSize};
use crate::{ErrorKind, Result};

/// グローバルアロケータをバックエンドとする`ExtentSource`の実装.
///
/// 生成時に指定された容量を使い切ると、以降の要求は`ErrorKind::OutOfMemory`で失敗する.
///
/// # 注意
///
/// これは主にテストや性能計測用途を意図した実装である.
/// `ExtentSource`が本来想定している「返却されない」エクステントとは異なり、
/// インスタンスの破棄時には、取得済みの全てのエクステントが解放される.
#[derive(Debug)]
pub struct MemoryExtentSource {
    page_size: PageSize,
    capacity: usize,
    extents: Vec<Extent>,
    requested_extents: u64,
}
impl MemoryExtentSource {
    /// 新しい`MemoryExtentSource`インスタンスを生成する.
    ///
    /// `capacity`は、同時に保持可能なエクステントのバイト数の上限.
    pub fn new(capacity: usize) -> Self {
        Self::with_page_size(capacity, PageSize::min())
    }

    /// ページサイズを指定して`MemoryExtentSource`インスタンスを生成する.
    pub fn with_page_size(capacity: usize, page_size: PageSize) -> Self {
        MemoryExtentSource {
            page_size,
            capacity,
            extents: Vec::new(),
            requested_extents: 0,
        }
    }

    /// 現在保持しているエクステントの合計バイト数を返す.
    pub fn usage(&self) -> usize {
        self.extents.iter().map(|e| e.len()).sum()
    }

    /// これまでに成功した`request_extent`の呼び出し回数を返す.
    pub fn requested_extents(&self) -> u64 {
        self.requested_extents
    }

    fn layout(&self, len: usize) -> Result<Layout> {
        track_assert_ne!(len, 0, ErrorKind::InvalidInput);
        track_assert!(self.page_size.is_aligned(len), ErrorKind::InvalidInput; len);
        let layout = Layout::from_size_align(len, self.page_size.as_usize());
        Ok(track_assert_some!(layout.ok(), ErrorKind::InvalidInput; len))
    }
}
impl ExtentSource for MemoryExtentSource {
    fn page_size(&self) -> PageSize {
        self.page_size
    }
    fn request_extent(&mut self, len: usize) -> Result<Extent> {
        let layout = track!(self.layout(len))?;
        track_assert!(
            self.usage() + len <= self.capacity,
            ErrorKind::OutOfMemory; len, self.usage(), self.capacity
        );

        let ptr = unsafe { alloc::alloc(layout) };
        let ptr = track_assert_some!(NonNull::new(ptr), ErrorKind::OutOfMemory; len);
        let extent = unsafe { Extent::from_raw_parts(ptr, len) };
        self.extents.push(extent);
        self.requested_extents += 1;
        Ok(extent)
    }
    fn return_extent(&mut self, extent: Extent) -> Result<()> {
        let layout = track!(self.layout(extent.len()))?;
        let i = self.extents.iter().position(|e| *e == extent);
        let i = track_assert_some!(i, ErrorKind::InvalidInput; extent);
        self.extents.swap_remove(i);
        unsafe { alloc::dealloc(extent.as_ptr().as_ptr(), layout) };
        Ok(())
    }
}
impl Drop for MemoryExtentSource {
    fn drop(&mut self) {
        let page_size = self.page_size.as_usize();
        for extent in self.extents.drain(..) {
            if let Ok(layout) = Layout::from_size_align(extent.len(), page_size) {
                unsafe { alloc::dealloc(extent.as_ptr().as_ptr(), layout) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn it_works() -> TestResult {
        let mut source = MemoryExtentSource::new(4096 * 3);
        assert_eq!(source.page_size(), PageSize::min());

        let a = track!(source.request_extent(4096))?;
        let b = track!(source.request_extent(8192))?;
        assert_eq!(a.len(), 4096);
        assert_eq!(b.len(), 8192);
        assert!(source.page_size().is_aligned(a.as_ptr().as_ptr() as usize));
        assert!(source.page_size().is_aligned(b.as_ptr().as_ptr() as usize));
        assert!(a.end() <= b.as_ptr().as_ptr() as usize || b.end() <= a.as_ptr().as_ptr() as usize);
        assert_eq!(source.usage(), 4096 * 3);
        assert_eq!(source.requested_extents(), 2);

        // 容量超過
        let e = source.request_extent(4096).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::OutOfMemory));

        // 返却すれば再度取得可能
        track!(source.return_extent(a))?;
        assert_eq!(source.usage(), 8192);
        track!(source.request_extent(4096))?;
        assert_eq!(source.requested_extents(), 3);
        Ok(())
    }

    #[test]
    fn error_handlings_works() {
        let mut source = MemoryExtentSource::new(4096 * 4);

        // ページ境界に揃っていない
        let e = source.request_extent(100).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        let e = source.request_extent(0).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        // 未知のエクステントの返却
        let mut other = MemoryExtentSource::new(4096);
        let extent = other.request_extent(4096).expect("Never fails");
        let e = source.return_extent(extent).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    }
}
