//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, MetricBuilder};

/// [`Heap`]のメトリクス.
///
/// [`Heap`]: ../heap/struct.Heap.html
#[derive(Debug, Clone)]
pub struct HeapMetrics {
    pub(crate) extents: Counter,
    pub(crate) extent_bytes: Counter,
    pub(crate) allocated_blocks: Counter,
    pub(crate) allocated_bytes: Counter,
    pub(crate) released_blocks: Counter,
    pub(crate) released_bytes: Counter,
    pub(crate) splits: Counter,
    pub(crate) coalesces: Counter,
    pub(crate) inserted_free_blocks: Counter,
    pub(crate) removed_free_blocks: Counter,
    pub(crate) out_of_memory_failures: Counter,
}
impl HeapMetrics {
    /// OSから取得したエクステントの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_extents_total <COUNTER>
    /// ```
    pub fn extents(&self) -> u64 {
        self.extents.value() as u64
    }

    /// OSから取得したエクステントの合計バイト数.
    ///
    /// エクステントは返却されないので、これは現在マッピングされているバイト数と等しい.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_extent_bytes_total <COUNTER>
    /// ```
    pub fn extent_bytes(&self) -> u64 {
        self.extent_bytes.value() as u64
    }

    /// ブロックの割当回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_allocated_blocks_total <COUNTER>
    /// ```
    pub fn allocated_blocks(&self) -> u64 {
        self.allocated_blocks.value() as u64
    }

    /// これまでに割り当てたブロックのペイロードのバイト数.
    ///
    /// 分割されずに丸ごと割り当てられたブロックの場合には、要求サイズよりも大きくなることがある.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_allocated_bytes_total <COUNTER>
    /// ```
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes.value() as u64
    }

    /// ブロックの解放回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_released_blocks_total <COUNTER>
    /// ```
    pub fn released_blocks(&self) -> u64 {
        self.released_blocks.value() as u64
    }

    /// これまでに解放されたブロックのペイロードのバイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_released_bytes_total <COUNTER>
    /// ```
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes.value() as u64
    }

    /// 割当時にブロックが分割された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_splits_total <COUNTER>
    /// ```
    pub fn splits(&self) -> u64 {
        self.splits.value() as u64
    }

    /// 解放時に隣接する空きブロックと結合された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_coalesces_total <COUNTER>
    /// ```
    pub fn coalesces(&self) -> u64 {
        self.coalesces.value() as u64
    }

    /// 空きリストに挿入されたブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_inserted_free_blocks_total <COUNTER>
    /// ```
    pub fn inserted_free_blocks(&self) -> u64 {
        self.inserted_free_blocks.value() as u64
    }

    /// 空きリストから削除されたブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_removed_free_blocks_total <COUNTER>
    /// ```
    pub fn removed_free_blocks(&self) -> u64 {
        self.removed_free_blocks.value() as u64
    }

    /// エクステントが取得できずに割当に失敗した回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_out_of_memory_failures_total <COUNTER>
    /// ```
    pub fn out_of_memory_failures(&self) -> u64 {
        self.out_of_memory_failures.value() as u64
    }

    /// 全空きリストの長さの合計.
    ///
    /// `Heap::initialize()`による空きリストのリセットは反映されない.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_inserted_free_blocks_total - segfit_heap_removed_free_blocks_total
    /// ```
    pub fn free_list_len(&self) -> usize {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.removed_free_blocks();
        let inc = self.inserted_free_blocks();
        (inc - dec) as usize
    }

    /// 割当中のブロックのペイロードの合計バイト数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// segfit_heap_allocated_bytes_total - segfit_heap_released_bytes_total
    /// ```
    pub fn usage_bytes(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_bytes();
        let inc = self.allocated_bytes();
        inc - dec
    }

    /// メモリ使用率(`usage_bytes / extent_bytes`).
    ///
    /// まだエクステントを一つも取得していない場合には`0.0`を返す.
    pub fn utilization(&self) -> f64 {
        let extent_bytes = self.extent_bytes();
        if extent_bytes == 0 {
            0.0
        } else {
            self.usage_bytes() as f64 / extent_bytes as f64
        }
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("segfit").subsystem("heap");
        HeapMetrics {
            extents: builder
                .counter("extents_total")
                .help("Number of extents obtained from the OS")
                .finish()
                .expect("Never fails"),
            extent_bytes: builder
                .counter("extent_bytes_total")
                .help("Number of bytes obtained from the OS")
                .finish()
                .expect("Never fails"),
            allocated_blocks: builder
                .counter("allocated_blocks_total")
                .help("Number of allocated blocks")
                .finish()
                .expect("Never fails"),
            allocated_bytes: builder
                .counter("allocated_bytes_total")
                .help("Number of allocated payload bytes")
                .finish()
                .expect("Never fails"),
            released_blocks: builder
                .counter("released_blocks_total")
                .help("Number of released blocks")
                .finish()
                .expect("Never fails"),
            released_bytes: builder
                .counter("released_bytes_total")
                .help("Number of released payload bytes")
                .finish()
                .expect("Never fails"),
            splits: builder
                .counter("splits_total")
                .help("Number of blocks split on allocation")
                .finish()
                .expect("Never fails"),
            coalesces: builder
                .counter("coalesces_total")
                .help("Number of adjacent free blocks merged on release")
                .finish()
                .expect("Never fails"),
            inserted_free_blocks: builder
                .counter("inserted_free_blocks_total")
                .help("Number of inserted blocks into free lists")
                .finish()
                .expect("Never fails"),
            removed_free_blocks: builder
                .counter("removed_free_blocks_total")
                .help("Number of removed blocks from free lists")
                .finish()
                .expect("Never fails"),
            out_of_memory_failures: builder
                .counter("out_of_memory_failures_total")
                .help("Number of allocation failures caused by extent exhaustion")
                .finish()
                .expect("Never fails"),
        }
    }

    pub(crate) fn count_allocation(&self, size: usize) {
        self.allocated_blocks.increment();
        self.allocated_bytes.add_u64(size as u64);
    }

    pub(crate) fn count_releasion(&self, size: usize) {
        self.released_blocks.increment();
        self.released_bytes.add_u64(size as u64);
    }

    pub(crate) fn count_extent(&self, len: usize) {
        self.extents.increment();
        self.extent_bytes.add_u64(len as u64);
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;

    use super::*;

    #[test]
    fn it_works() {
        let metrics = HeapMetrics::new(&MetricBuilder::new());
        assert_eq!(metrics.utilization(), 0.0);

        metrics.count_extent(4096);
        metrics.count_allocation(1024);
        metrics.count_allocation(1024);
        metrics.count_releasion(1024);
        assert_eq!(metrics.extents(), 1);
        assert_eq!(metrics.allocated_blocks(), 2);
        assert_eq!(metrics.released_blocks(), 1);
        assert_eq!(metrics.usage_bytes(), 1024);
        assert_eq!(metrics.utilization(), 0.25);

        metrics.inserted_free_blocks.add_u64(3);
        metrics.removed_free_blocks.increment();
        assert_eq!(metrics.free_list_len(), 2);
    }
}
