//! ヒープ(アロケータ本体)とその構成要素群.
//!
//! # 割当戦略
//!
//! ヒープは"Segregated BestFit"戦略を採用している.
//!
//! 空きブロックは、サイズに応じて複数のクラスに分類され、クラス毎の空きリストでサイズ順に管理される.
//!
//! 新規割当要求が発行された際には、要求サイズのクラスから順に空きリストを探索し、
//! 要求サイズを満たす空きブロックの中で、一番サイズが小さいものが選択される.
//! 該当するブロックが存在しない場合には、OSから新しいエクステントを取得してから探索をやり直す.
//!
//! 選択されたブロックは、要求サイズ分だけを割り当て、
//! もし新たなブロックを作れるだけの余剰分がある場合には、それを切り出して空きリストに戻す.
//!
//! 解放されたブロックは、物理的に隣接する空きブロックと結合された上で、空きリストに戻される.
//!
//! # 注意
//!
//! ヒープはスレッドセーフではない.
//! また、取得したエクステントがOSに返却されることはない.
use slog::Logger;
use std::cmp;
use std::ptr::NonNull;
use uuid::Uuid;

pub use self::builder::HeapBuilder;
pub use self::size_class::{SizeClassTable, DEFAULT_SIZE_CLASS_BOUNDS};

use self::arena::HeapArena;
use self::block::{BlockRef, ALIGNMENT, HEADER_SIZE};
use crate::extent::ExtentSource;
use crate::metrics::HeapMetrics;
use crate::Result;

mod arena;
mod block;
mod builder;
mod free_list;
mod size_class;

/// 割当要求サイズの下限(利用者側が保証する).
pub const MIN_REQUEST_SIZE: usize = 8;

/// 割当要求サイズの上限(利用者側が保証する).
pub const MAX_REQUEST_SIZE: usize = 4000;

/// 各ブロックの先頭に置かれるヘッダのバイト数.
pub const BLOCK_HEADER_SIZE: usize = HEADER_SIZE;

/// メモリアロケータ.
///
/// `allocate`と`release`を提供する.
///
/// # Examples
///
/// ```
/// use segfit::extent::MemoryExtentSource;
/// use segfit::heap::Heap;
///
/// let mut heap = Heap::new(MemoryExtentSource::new(1024 * 1024)).unwrap();
/// let ptr = heap.allocate(100).unwrap();
/// unsafe {
///     ptr.as_ptr().write_bytes(0xFF, 100);
///     heap.release(ptr);
/// }
/// heap.finalize();
/// ```
#[derive(Debug)]
pub struct Heap<S> {
    arena: HeapArena<S>,
    instance_uuid: Uuid,
    metrics: HeapMetrics,
    logger: Logger,
}
impl<S: ExtentSource> Heap<S> {
    /// デフォルト設定で、新しい`Heap`インスタンスを生成する.
    ///
    /// 設定を変更したい場合には`HeapBuilder`を使用すること.
    pub fn new(source: S) -> Result<Self> {
        track!(HeapBuilder::new().finish(source))
    }

    /// 全ての空きリストを空の状態にリセットする.
    ///
    /// 既に取得済みのエクステントはOSには返却されず、以後参照されることもない.
    /// そのため、この呼び出しより前に割り当てたポインタを`release`してはならない.
    ///
    /// 何度呼び出しても結果は同じ.
    pub fn initialize(&mut self) {
        self.arena.reset();
        info!(self.logger, "Heap is initialized";
              "size_classes" => format!("{:?}", self.arena.size_classes().bounds()));
    }

    /// ヒープの利用を終える.
    ///
    /// メトリクスの要約をログに出力する以外には何も行わない
    /// (エクステントはプロセスの終了時にOSによって回収される).
    pub fn finalize(&mut self) {
        info!(self.logger, "Heap is finalized";
              "extents" => self.metrics.extents(),
              "extent_bytes" => self.metrics.extent_bytes(),
              "usage_bytes" => self.metrics.usage_bytes(),
              "utilization" => self.metrics.utilization());
    }

    /// `size`バイトの領域を割り当てる.
    ///
    /// 返されるアドレスは`8`バイト境界に揃っている.
    ///
    /// `size`は`MIN_REQUEST_SIZE..=MAX_REQUEST_SIZE`の範囲内であることが期待されている
    /// (デバッグビルドでのみ検査される).
    /// また`size`は`8`の倍数に切り上げた上で処理される.
    ///
    /// # Errors
    ///
    /// エクステントの供給元が枯渇している場合には、種類が`ErrorKind::OutOfMemory`のエラーが返される.
    /// これは致命的なエラーであり、以後の割当要求も成功しないと想定すべきである.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>> {
        debug_assert!(
            MIN_REQUEST_SIZE <= size && size <= MAX_REQUEST_SIZE,
            "out-of-contract allocation size: {}",
            size
        );
        let size = cmp::max(ALIGNMENT, (size + ALIGNMENT - 1) / ALIGNMENT * ALIGNMENT);

        let block = track!(self.arena.ensure_free_block(size))?;
        let remaining = block.size() - size;
        if remaining > HEADER_SIZE {
            // 余剰分を新しい空きブロックとして切り出す
            //
            // ... | block | object | rest | free payload | ...
            //                      <----------------------->
            //                              remaining
            block.set_size(size);
            let rest = unsafe { BlockRef::format(block.payload_end(), remaining - HEADER_SIZE) };
            self.arena.insert_free(rest);
            self.metrics.splits.increment();
        }
        block.set_allocated(true);
        self.metrics.count_allocation(block.size());
        Ok(block.payload())
    }

    /// 以前に割り当てた領域を解放する.
    ///
    /// 解放されたブロックは、物理的に前後に隣接する空きブロックと結合された上で、空きリストに戻される.
    ///
    /// # Safety
    ///
    /// `ptr`は、このヒープの`allocate`が返したアドレスで、かつ未解放である必要がある.
    ///
    /// # Panics
    ///
    /// 既に解放済みのブロックが指定された場合には、現在のスレッドがパニックする.
    /// これは、解放後に隣接ブロックと結合済みのものも含む.
    pub unsafe fn release(&mut self, ptr: NonNull<u8>) {
        let mut block = BlockRef::from_payload(ptr);
        assert!(block.is_allocated(), "double release: {:?}", ptr);
        debug_assert!(!block.is_linked());
        block.set_allocated(false);
        self.metrics.count_releasion(block.size());

        let following = block.following();
        if following.is_linked() {
            self.arena.detach(following);
            block.set_size(block.size() + HEADER_SIZE + following.size());
            self.metrics.coalesces.increment();
        }
        if let Some(preceding) = block.preceding() {
            self.arena.detach(preceding);
            preceding.set_size(preceding.size() + HEADER_SIZE + block.size());
            block = preceding;
            self.metrics.coalesces.increment();
        }
        self.arena.insert_free(block);
    }

    /// 割当済みの領域の実際のサイズを返す.
    ///
    /// これは常に、割当時の要求サイズ以上となる.
    ///
    /// # Safety
    ///
    /// `ptr`は、このヒープの`allocate`が返したアドレスで、かつ未解放である必要がある.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        BlockRef::from_payload(ptr).size()
    }

    /// 指定クラスの空きリストに含まれるブロックのサイズ群を、リスト内の順番で返す.
    ///
    /// 存在しないクラスが指定された場合には、空の`Vec`が返される.
    pub fn free_block_sizes(&self, class: usize) -> Vec<usize> {
        self.arena
            .free_lists()
            .get(class)
            .map(|list| list.iter().map(|b| b.size()).collect())
            .unwrap_or_default()
    }

    /// サイズクラスのテーブルを返す.
    pub fn size_classes(&self) -> &SizeClassTable {
        self.arena.size_classes()
    }

    /// エクステントの供給元への参照を返す.
    pub fn source(&self) -> &S {
        self.arena.source()
    }

    /// インスタンスのUUIDを返す.
    pub fn instance_uuid(&self) -> Uuid {
        self.instance_uuid
    }

    /// ヒープのメトリクスを返す.
    pub fn metrics(&self) -> &HeapMetrics {
        &self.metrics
    }
}
