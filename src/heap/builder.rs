use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::cmp;
use uuid::Uuid;

use super::arena::HeapArena;
use super::block::HEADER_SIZE;
use super::size_class::{SizeClassTable, DEFAULT_SIZE_CLASS_BOUNDS};
use super::Heap;
use crate::extent::ExtentSource;
use crate::metrics::HeapMetrics;
use crate::{ErrorKind, Result};

const DEFAULT_EXTENT_SIZE: usize = 4096;

/// `Heap`のビルダ.
#[derive(Debug, Clone)]
pub struct HeapBuilder {
    extent_size: Option<usize>,
    size_classes: Vec<usize>,
    instance_uuid: Option<Uuid>,
    metrics: MetricBuilder,
    logger: Logger,
}
impl HeapBuilder {
    /// デフォルト設定で`HeapBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        HeapBuilder {
            extent_size: None,
            size_classes: DEFAULT_SIZE_CLASS_BOUNDS.to_vec(),
            instance_uuid: None,
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// 空きブロックが不足した際に、OSから一度に取得するエクステントのサイズを設定する.
    ///
    /// この値は、エクステントの供給元のページサイズの倍数である必要がある.
    /// そうではない値が指定された場合には、ヒープの構築時(i.e., `finish()`呼び出し時)にエラーが返される.
    ///
    /// なお、このサイズに収まらない大きな割当要求に対しては、要求サイズに比例したエクステントが取得される.
    ///
    /// デフォルト値は`4096`と供給元のページサイズのうち、大きい方.
    pub fn extent_size(&mut self, size: usize) -> &mut Self {
        self.extent_size = Some(size);
        self
    }

    /// サイズクラスの上限値の列を設定する.
    ///
    /// 値は昇順かつ`8`の倍数である必要がある.
    /// 最後の上限値を超えるサイズは、溢れクラスに分類される.
    ///
    /// デフォルト値は`[32, 128, 512, 1024]`.
    pub fn size_classes(&mut self, bounds: Vec<usize>) -> &mut Self {
        self.size_classes = bounds;
        self
    }

    /// ヒープインスタンスを識別するためのUUIDを設定する.
    ///
    /// ログの出力時に使用される.
    /// 本メソッドが呼ばれていない場合は、ランダムなUUIDが割り当てられる.
    pub fn instance_uuid(&mut self, uuid: Uuid) -> &mut Self {
        self.instance_uuid = Some(uuid);
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// ヒープ用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// `source`からエクステントを取得する`Heap`を構築する.
    ///
    /// 返されるヒープは初期化済み(i.e., 全ての空きリストが空)で、エクステントはまだ一つも取得されていない.
    pub fn finish<S>(&self, source: S) -> Result<Heap<S>>
    where
        S: ExtentSource,
    {
        let page_size = source.page_size();
        let extent_size = self
            .extent_size
            .unwrap_or_else(|| cmp::max(DEFAULT_EXTENT_SIZE, page_size.as_usize()));
        track_assert!(
            page_size.is_aligned(extent_size),
            ErrorKind::InvalidInput; extent_size, page_size
        );
        track_assert!(
            extent_size > 2 * HEADER_SIZE,
            ErrorKind::InvalidInput; extent_size
        );
        let size_classes = track!(SizeClassTable::new(self.size_classes.clone()))?;

        let instance_uuid = self.instance_uuid.unwrap_or_else(Uuid::new_v4);
        let logger = self
            .logger
            .new(o!("heap" => instance_uuid.to_string()));
        let metrics = HeapMetrics::new(&self.metrics);
        let arena = HeapArena::new(
            source,
            size_classes,
            extent_size,
            metrics.clone(),
            logger.clone(),
        );
        let mut heap = Heap {
            arena,
            instance_uuid,
            metrics,
            logger,
        };
        heap.initialize();
        Ok(heap)
    }
}
impl Default for HeapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;
    use uuid::Uuid;

    use super::*;
    use crate::extent::{MemoryExtentSource, PageSize};
    use crate::ErrorKind;

    #[test]
    fn it_works() -> TestResult {
        let uuid = Uuid::new_v4();
        let heap = track!(HeapBuilder::new()
            .extent_size(8192)
            .size_classes(vec![64, 256])
            .instance_uuid(uuid)
            .finish(MemoryExtentSource::new(8192)))?;
        assert_eq!(heap.instance_uuid(), uuid);
        assert_eq!(heap.size_classes().class_count(), 3);
        assert_eq!(heap.source().requested_extents(), 0);
        Ok(())
    }

    #[test]
    fn invalid_extent_size() -> TestResult {
        let source = MemoryExtentSource::with_page_size(1 << 20, track!(PageSize::new(8192))?);
        let e = HeapBuilder::new().extent_size(4096).finish(source).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        let e = HeapBuilder::new()
            .extent_size(4000)
            .finish(MemoryExtentSource::new(1 << 20))
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
        Ok(())
    }

    #[test]
    fn default_extent_size_follows_page_size() -> TestResult {
        let page_size = track!(PageSize::new(16 * 1024))?;
        let source = MemoryExtentSource::with_page_size(1 << 20, page_size);
        let mut heap = track!(HeapBuilder::new().finish(source))?;

        let p = track!(heap.allocate(100))?;
        assert_eq!(heap.source().requested_extents(), 1);
        assert_eq!(heap.source().usage(), 16 * 1024);
        assert_eq!(
            heap.free_block_sizes(heap.size_classes().overflow_class()),
            vec![16 * 1024 - 2 * HEADER_SIZE - 104 - HEADER_SIZE]
        );
        unsafe { heap.release(p) };
        Ok(())
    }

    #[test]
    fn invalid_size_classes() {
        let e = HeapBuilder::new()
            .size_classes(vec![128, 32])
            .finish(MemoryExtentSource::new(4096))
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    }
}
