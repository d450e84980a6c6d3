//! OSからのメモリ領域(エクステント)取得のインタフェース定義と実装群.
//!
//! このモジュールは[Heap](../heap/struct.Heap.html)が割当対象とする
//! メモリ領域を提供する.
use std::ptr::NonNull;

pub use self::memory::MemoryExtentSource;
pub use self::mmap::MmapExtentSource;
pub use self::page_size::PageSize;

use crate::Result;

mod memory;
mod mmap;
mod page_size;

/// OSから一度に取得された連続したメモリ領域.
///
/// 内容の初期値は不定として扱われる.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    ptr: NonNull<u8>,
    len: usize,
}
impl Extent {
    /// 新しい`Extent`インスタンスを生成する.
    ///
    /// # Safety
    ///
    /// `ptr`から`len`バイトの領域は、読み書き可能かつ他から参照されていない必要がある.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Extent { ptr, len }
    }

    /// 領域の先頭アドレスを返す.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// 領域のバイト数を返す.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 領域の終端(排他的)アドレスを返す.
    pub fn end(&self) -> usize {
        self.ptr.as_ptr() as usize + self.len
    }
}

/// エクステントの供給元を表すトレイト.
///
/// 典型的にはOSのページマッピング(e.g., `mmap`)を抽象化したもの.
///
/// 取得されたエクステントは、プロセスの生存期間中ずっと使われ続けることが想定されており、
/// [`Heap`]が`return_extent`を呼び出すことはない.
///
/// [`Heap`]: ../heap/struct.Heap.html
pub trait ExtentSource {
    /// このインスタンスのページサイズを返す.
    ///
    /// 要求されるエクステントのサイズは、常にこの値の倍数となる.
    fn page_size(&self) -> PageSize;

    /// `len`バイトのエクステントを取得する.
    ///
    /// 返されるエクステントの先頭アドレスはページ境界に揃っており、サイズはちょうど`len`となる.
    ///
    /// # Errors
    ///
    /// - 供給元のメモリが枯渇している場合には、種類が`ErrorKind::OutOfMemory`のエラーが返される
    /// - `len`がページ境界に揃っていない場合には、種類が`ErrorKind::InvalidInput`のエラーが返される
    fn request_extent(&mut self, len: usize) -> Result<Extent>;

    /// 以前に`request_extent`で取得したエクステントを返却する.
    fn return_extent(&mut self, extent: Extent) -> Result<()>;
}
