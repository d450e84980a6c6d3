//! ブロックヘッダ.
//!
//! 全てのブロック(割当済み・空きの両方)は、ペイロードの直前に`BlockHeader`を持つ:
//!
//! ```text
//! ... | header | payload (size bytes) | header | payload | ... | fence |
//!     ^        ^
//!     block    payload()
//! ```
//!
//! 空きブロックは、ペイロードの末尾のワードに自身のサイズ(フッタ)を保持しており、
//! 後続ブロックのヘッダからは、フラグを通して「直前のブロックが空きかどうか」が分かるようになっている.
use std::mem;
use std::ptr::NonNull;

/// ブロックサイズおよびヘッダのアライメント.
pub const ALIGNMENT: usize = 8;

/// `BlockHeader`のバイト数.
pub const HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

// `tagged_size`の下位ビットに埋め込まれるフラグ群.
// サイズは常に`ALIGNMENT`の倍数なので、下位3bitは空いている.
const PREV_FREE: usize = 0b001;
const ALLOCATED: usize = 0b010;
const FLAG_MASK: usize = ALIGNMENT - 1;

/// 各ブロックの先頭に配置されるメタデータ.
///
/// `next`と`prev`は、ブロックが空きリストに繋がれている間のみ`Some`となる.
#[repr(C, align(8))]
#[derive(Debug)]
pub struct BlockHeader {
    tagged_size: usize,
    next: Option<NonNull<BlockHeader>>,
    prev: Option<NonNull<BlockHeader>>,
}
impl BlockHeader {
    /// 空きリストの番兵用のヘッダを生成する.
    pub fn sentinel() -> Self {
        BlockHeader {
            tagged_size: 0,
            next: None,
            prev: None,
        }
    }
}

/// メモリ上に配置された`BlockHeader`に対する型付きのビュー.
///
/// インスタンスは、有効なヘッダを指していることが分かっているアドレスからのみ生成される
/// (i.e., エクステントの整形時、ブロック分割時、あるいは以前に割り当てたペイロードの解放時).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef(NonNull<BlockHeader>);
impl BlockRef {
    /// `addr`の位置に、リンクを持たない新しいヘッダを書き込む.
    ///
    /// # Safety
    ///
    /// `addr`から`HEADER_SIZE + size`バイトの領域は、書き込み可能かつ`ALIGNMENT`に揃っている必要がある.
    pub unsafe fn format(addr: NonNull<u8>, size: usize) -> Self {
        debug_assert_eq!(addr.as_ptr() as usize % ALIGNMENT, 0);
        debug_assert_eq!(size % ALIGNMENT, 0);
        let header = addr.cast::<BlockHeader>();
        header.as_ptr().write(BlockHeader {
            tagged_size: size,
            next: None,
            prev: None,
        });
        BlockRef(header)
    }

    /// 既存のヘッダを指すビューを生成する.
    ///
    /// # Safety
    ///
    /// `header`は初期化済みの`BlockHeader`を指している必要がある.
    pub unsafe fn from_header(header: NonNull<BlockHeader>) -> Self {
        BlockRef(header)
    }

    /// ペイロードの先頭アドレスから、そのブロックのビューを復元する.
    ///
    /// # Safety
    ///
    /// `payload`は、以前に`payload()`が返したアドレスである必要がある.
    pub unsafe fn from_payload(payload: NonNull<u8>) -> Self {
        let header = payload.as_ptr().sub(HEADER_SIZE) as *mut BlockHeader;
        BlockRef(NonNull::new_unchecked(header))
    }

    pub fn as_ptr(self) -> NonNull<BlockHeader> {
        self.0
    }

    /// ペイロードのバイト数(ヘッダは含まない).
    pub fn size(self) -> usize {
        unsafe { (*self.0.as_ptr()).tagged_size & !FLAG_MASK }
    }

    /// フラグを保ったままサイズを更新する.
    pub fn set_size(self, size: usize) {
        debug_assert_eq!(size % ALIGNMENT, 0);
        unsafe {
            let header = self.0.as_ptr();
            (*header).tagged_size = size | ((*header).tagged_size & FLAG_MASK);
        }
    }

    /// 物理的に直前に位置するブロックが空きかどうか.
    pub fn is_prev_free(self) -> bool {
        unsafe { (*self.0.as_ptr()).tagged_size & PREV_FREE != 0 }
    }

    pub fn set_prev_free(self, free: bool) {
        self.set_flag(PREV_FREE, free);
    }

    /// 利用者に割り当てられている(i.e., `release`可能な)ブロックかどうか.
    ///
    /// 結合によって他のブロックに吸収されたヘッダは、このフラグが落ちたまま残る.
    pub fn is_allocated(self) -> bool {
        unsafe { (*self.0.as_ptr()).tagged_size & ALLOCATED != 0 }
    }

    pub fn set_allocated(self, allocated: bool) {
        self.set_flag(ALLOCATED, allocated);
    }

    fn set_flag(self, flag: usize, on: bool) {
        unsafe {
            let header = self.0.as_ptr();
            if on {
                (*header).tagged_size |= flag;
            } else {
                (*header).tagged_size &= !flag;
            }
        }
    }

    /// いずれかの空きリストに繋がれているかどうか.
    pub fn is_linked(self) -> bool {
        unsafe { (*self.0.as_ptr()).next.is_some() }
    }

    pub fn next(self) -> Option<BlockRef> {
        unsafe { (*self.0.as_ptr()).next.map(BlockRef) }
    }

    pub fn prev(self) -> Option<BlockRef> {
        unsafe { (*self.0.as_ptr()).prev.map(BlockRef) }
    }

    pub fn set_next(self, next: Option<BlockRef>) {
        unsafe { (*self.0.as_ptr()).next = next.map(|b| b.0) }
    }

    pub fn set_prev(self, prev: Option<BlockRef>) {
        unsafe { (*self.0.as_ptr()).prev = prev.map(|b| b.0) }
    }

    /// ペイロードの先頭アドレス.
    pub fn payload(self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked((self.0.as_ptr() as *mut u8).add(HEADER_SIZE)) }
    }

    /// ペイロードの終端(排他的)アドレス.
    ///
    /// これは物理的に直後に位置するブロックのヘッダのアドレスと等しい.
    pub fn payload_end(self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.payload().as_ptr().add(self.size())) }
    }

    /// 物理的に直後に位置するブロック.
    ///
    /// エクステントの末尾にはフェンスが置かれているので、番兵以外のブロックに対しては常に有効.
    pub fn following(self) -> BlockRef {
        BlockRef(self.payload_end().cast())
    }

    /// 空きブロックのフッタ(ペイロード末尾のワード)に、現在のサイズを書き込む.
    pub fn write_footer(self) {
        debug_assert!(self.size() >= ALIGNMENT);
        unsafe {
            let footer = self.payload_end().as_ptr().sub(ALIGNMENT) as *mut usize;
            footer.write(self.size());
        }
    }

    /// 物理的に直前に位置するブロックが空きであれば、それを返す.
    pub fn preceding(self) -> Option<BlockRef> {
        if !self.is_prev_free() {
            return None;
        }
        unsafe {
            let footer = (self.0.as_ptr() as *mut u8).sub(ALIGNMENT) as *const usize;
            let header = (self.0.as_ptr() as *mut u8).sub(footer.read() + HEADER_SIZE);
            Some(BlockRef(NonNull::new_unchecked(header as *mut BlockHeader)))
        }
    }
}
