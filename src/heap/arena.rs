//! Heap Arena.
use slog::Logger;
use std::cmp;

use super::block::{BlockRef, ALIGNMENT, HEADER_SIZE};
use super::free_list::FreeList;
use super::size_class::SizeClassTable;
use crate::extent::ExtentSource;
use crate::metrics::HeapMetrics;
use crate::{ErrorKind, Result};

/// サイズクラス毎の空きリスト群と、エクステントの供給元を保持する構造体.
///
/// 空きリストに要求を満たすブロックが存在しない場合には、
/// 新しいエクステントを取得して、それ全体を一つの空きブロックとして登録する.
///
/// 各エクステントの末尾には、サイズ`0`の割当済みブロック(フェンス)が置かれる:
///
/// ```text
/// | header | free payload (len - 2 * HEADER_SIZE) | fence |
/// ^                                                       ^
/// extent.as_ptr()                                         extent.end()
/// ```
///
/// これにより、任意のブロックは物理的な後続ブロックを(同一エクステント内に)持つことが保証される.
#[derive(Debug)]
pub struct HeapArena<S> {
    source: S,
    size_classes: SizeClassTable,
    free_lists: Vec<FreeList>,
    extent_size: usize,
    metrics: HeapMetrics,
    logger: Logger,
}
impl<S: ExtentSource> HeapArena<S> {
    pub fn new(
        source: S,
        size_classes: SizeClassTable,
        extent_size: usize,
        metrics: HeapMetrics,
        logger: Logger,
    ) -> Self {
        let free_lists = (0..size_classes.class_count())
            .map(|_| FreeList::new())
            .collect();
        HeapArena {
            source,
            size_classes,
            free_lists,
            extent_size,
            metrics,
            logger,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn size_classes(&self) -> &SizeClassTable {
        &self.size_classes
    }

    pub fn free_lists(&self) -> &[FreeList] {
        &self.free_lists
    }

    /// 全ての空きリストを空にする.
    pub fn reset(&mut self) {
        for list in &mut self.free_lists {
            list.clear();
        }
    }

    /// ペイロードが`size`バイト以上の空きブロックを、空きリストから取り除いて返す.
    ///
    /// 該当するブロックがない場合には、エクステントを一つ取得した上で探索をやり直す.
    /// 二度目の探索は必ず成功する.
    pub fn ensure_free_block(&mut self, size: usize) -> Result<BlockRef> {
        if let Some(block) = self.take_best_fit(size) {
            return Ok(block);
        }
        track!(self.grow(size))?;

        let block = self.take_best_fit(size);
        Ok(track_assert_some!(block, ErrorKind::InconsistentState; size))
    }

    /// `block`を空きブロックとして、サイズに対応する空きリストに登録する.
    pub fn insert_free(&mut self, block: BlockRef) {
        debug_assert!(!block.is_allocated());
        block.write_footer();
        block.following().set_prev_free(true);

        let class = self.size_classes.class_index_for(block.size());
        self.free_lists[class].insert_sorted(block);
        self.metrics.inserted_free_blocks.increment();
    }

    /// 空きブロック`block`を、所属する空きリストから取り除く.
    pub fn detach(&mut self, block: BlockRef) {
        let class = self.size_classes.class_index_for(block.size());
        self.free_lists[class].remove(block);
        self.after_detach(block);
    }

    // 要求サイズのクラスから順に、より大きなクラスを探索する.
    // クラスの上限値は昇順なので、最初に見つかったブロックが全体でのBestFitとなる.
    fn take_best_fit(&mut self, size: usize) -> Option<BlockRef> {
        let first = self.size_classes.class_index_for(size);
        let block = self.free_lists[first..]
            .iter_mut()
            .find_map(|list| list.remove_best_fit(size))?;
        self.after_detach(block);
        Some(block)
    }

    fn after_detach(&mut self, block: BlockRef) {
        block.following().set_prev_free(false);
        self.metrics.removed_free_blocks.increment();
    }

    fn grow(&mut self, size: usize) -> Result<()> {
        let len = self.extent_len_for(size);
        let extent = match track!(self.source.request_extent(len)) {
            Err(e) => {
                if *e.kind() == ErrorKind::OutOfMemory {
                    self.metrics.out_of_memory_failures.increment();
                }
                crit!(
                    self.logger,
                    "Cannot obtain a new extent: {}", e;
                    "len" => len,
                    "request_size" => size
                );
                return Err(e);
            }
            Ok(extent) => extent,
        };
        track_assert!(extent.len() >= len, ErrorKind::InconsistentState; extent, len);
        self.metrics.count_extent(extent.len());

        let block = unsafe { BlockRef::format(extent.as_ptr(), extent.len() - 2 * HEADER_SIZE) };
        let fence = unsafe { BlockRef::format(block.payload_end(), 0) };
        fence.set_allocated(true);
        debug_assert_eq!(fence.payload_end().as_ptr() as usize, extent.end());

        debug!(
            self.logger,
            "New extent is obtained";
            "len" => extent.len(),
            "request_size" => size,
            "class" => self.size_classes.class_index_for(block.size()),
            "free_blocks" => self.free_lists.iter().map(|l| l.len()).sum::<usize>()
        );
        self.insert_free(block);
        Ok(())
    }

    // 通常は固定長だが、それに収まらない大きな要求に対しては、サイズに比例したエクステントを用いる
    fn extent_len_for(&self, size: usize) -> usize {
        let page_size = self.source.page_size();
        let size = cmp::max(size, ALIGNMENT);
        cmp::max(self.extent_size, page_size.ceil_align(size + 2 * HEADER_SIZE))
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;
    use slog::{Discard, Logger};
    use trackable::result::TestResult;

    use super::*;
    use crate::extent::MemoryExtentSource;
    use crate::ErrorKind;

    fn arena(capacity: usize) -> HeapArena<MemoryExtentSource> {
        HeapArena::new(
            MemoryExtentSource::new(capacity),
            SizeClassTable::default(),
            4096,
            HeapMetrics::new(&MetricBuilder::new()),
            Logger::root(Discard, o!()),
        )
    }

    fn list_sizes(arena: &HeapArena<MemoryExtentSource>, class: usize) -> Vec<usize> {
        arena.free_lists()[class].iter().map(|b| b.size()).collect()
    }

    #[test]
    fn it_works() -> TestResult {
        let mut arena = arena(4096 * 4);
        let overflow = arena.size_classes().overflow_class();

        let block = track!(arena.ensure_free_block(100))?;
        assert_eq!(arena.source().requested_extents(), 1);
        assert_eq!(block.size(), 4096 - 2 * HEADER_SIZE);
        assert!(!block.is_linked());
        assert!(list_sizes(&arena, overflow).is_empty());

        // フェンス
        let fence = block.following();
        assert_eq!(fence.size(), 0);
        assert!(fence.is_allocated());
        assert!(!fence.is_linked());
        assert!(!fence.is_prev_free());

        arena.insert_free(block);
        assert!(fence.is_prev_free());
        assert_eq!(list_sizes(&arena, overflow), vec![4096 - 2 * HEADER_SIZE]);

        // 既存の空きブロックで足りるので、新規の取得は発生しない
        let block = track!(arena.ensure_free_block(8))?;
        assert_eq!(arena.source().requested_extents(), 1);
        assert!(!fence.is_prev_free());

        arena.insert_free(block);
        arena.detach(block);
        assert!(!block.is_linked());
        assert!(list_sizes(&arena, overflow).is_empty());
        Ok(())
    }

    #[test]
    fn large_request_uses_proportional_extent() -> TestResult {
        let mut arena = arena(4096 * 4);
        let block = track!(arena.ensure_free_block(5000))?;
        assert_eq!(block.size(), 8192 - 2 * HEADER_SIZE);
        assert_eq!(arena.source().usage(), 8192);
        Ok(())
    }

    #[test]
    fn searches_larger_classes() -> TestResult {
        let mut arena = arena(4096 * 4);
        let block = track!(arena.ensure_free_block(8))?;
        arena.insert_free(block);

        // クラス0は空だが、溢れクラスのブロックが選ばれる
        let block = track!(arena.ensure_free_block(8))?;
        assert_eq!(block.size(), 4096 - 2 * HEADER_SIZE);
        assert_eq!(arena.source().requested_extents(), 1);
        Ok(())
    }

    #[test]
    fn out_of_memory() -> TestResult {
        let mut arena = arena(4096);
        track!(arena.ensure_free_block(8))?;

        let e = arena.ensure_free_block(8).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::OutOfMemory));
        assert_eq!(arena.metrics.out_of_memory_failures(), 1);
        Ok(())
    }

    #[test]
    fn reset_works() -> TestResult {
        let mut arena = arena(4096 * 2);
        let block = track!(arena.ensure_free_block(8))?;
        arena.insert_free(block);

        arena.reset();
        arena.reset();
        assert!(arena.free_lists().iter().all(|l| l.len() == 0));
        Ok(())
    }
}
