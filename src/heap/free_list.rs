//! Free List.
use std::ptr::NonNull;

use super::block::{BlockHeader, BlockRef};

/// 一つのサイズクラスに属する空きブロック群を保持するリスト.
///
/// 番兵を持つ循環双方向リストで、要素は常にサイズの昇順に並んでいる.
/// そのため、先頭から走査して最初に見つかった要求サイズ以上のブロックが、
/// そのままBestFitとなる.
///
/// リストはリンクのみを所有しており、ブロックのメモリ自体はエクステントが所有している.
#[derive(Debug)]
pub struct FreeList {
    sentinel: BlockRef,
    len: usize,
}
impl FreeList {
    /// 空のリストを生成する.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let header = Box::into_raw(Box::new(BlockHeader::sentinel()));
        let sentinel = unsafe { BlockRef::from_header(NonNull::new_unchecked(header)) };
        let mut list = FreeList { sentinel, len: 0 };
        list.clear();
        list
    }

    /// リストを空にする(i.e., 番兵のみが残る).
    ///
    /// 繋がっていたブロック群のリンクは更新されないので、以後それらを参照してはならない.
    pub fn clear(&mut self) {
        self.sentinel.set_next(Some(self.sentinel));
        self.sentinel.set_prev(Some(self.sentinel));
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// サイズの昇順を保つ位置に`block`を挿入する.
    ///
    /// 同じサイズのブロックが既に存在する場合には、それらの後ろに挿入される.
    ///
    /// # Panics
    ///
    /// `block`が既にいずれかのリストに繋がれている場合には、現在のスレッドがパニックする.
    pub fn insert_sorted(&mut self, block: BlockRef) {
        assert!(!block.is_linked(), "already linked: {:?}", block);

        let mut cur = successor(self.sentinel);
        while cur != self.sentinel && cur.size() <= block.size() {
            cur = successor(cur);
        }

        // `cur`の直前に挿入する
        let prev = predecessor(cur);
        block.set_next(Some(cur));
        block.set_prev(Some(prev));
        prev.set_next(Some(block));
        cur.set_prev(Some(block));
        self.len += 1;
    }

    /// サイズが`min_size`以上のブロックのうち、最小のものをリストから取り除いて返す.
    ///
    /// 該当するブロックが存在しない場合には`None`が返される.
    pub fn remove_best_fit(&mut self, min_size: usize) -> Option<BlockRef> {
        let block = self.iter().find(|b| b.size() >= min_size)?;
        self.remove(block);
        Some(block)
    }

    /// 指定のブロックをリストから取り除く.
    ///
    /// # Panics
    ///
    /// `block`がリストに繋がれていない場合には、現在のスレッドがパニックする.
    pub fn remove(&mut self, block: BlockRef) {
        assert!(block.is_linked(), "not linked: {:?}", block);
        assert_ne!(block, self.sentinel);

        let next = successor(block);
        let prev = predecessor(block);
        prev.set_next(Some(next));
        next.set_prev(Some(prev));
        block.set_next(None);
        block.set_prev(None);
        self.len -= 1;
    }

    /// 先頭(最小サイズ)から順にブロックを走査するイテレータを返す.
    pub fn iter(&self) -> Iter {
        Iter {
            cur: successor(self.sentinel),
            sentinel: self.sentinel,
        }
    }
}
impl Drop for FreeList {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(self.sentinel.as_ptr().as_ptr()));
        }
    }
}

/// `FreeList`の要素を走査するためのイテレータ.
#[derive(Debug)]
pub struct Iter {
    cur: BlockRef,
    sentinel: BlockRef,
}
impl Iterator for Iter {
    type Item = BlockRef;
    fn next(&mut self) -> Option<Self::Item> {
        if self.cur == self.sentinel {
            None
        } else {
            let block = self.cur;
            self.cur = successor(block);
            Some(block)
        }
    }
}

fn successor(block: BlockRef) -> BlockRef {
    block.next().expect("free list is broken: missing `next` link")
}

fn predecessor(block: BlockRef) -> BlockRef {
    block.prev().expect("free list is broken: missing `prev` link")
}
