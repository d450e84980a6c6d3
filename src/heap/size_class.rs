use super::block::ALIGNMENT;
use crate::{ErrorKind, Result};

/// デフォルトのサイズクラスの上限値群.
pub const DEFAULT_SIZE_CLASS_BOUNDS: [usize; 4] = [32, 128, 512, 1024];

/// 要求サイズから、対応するサイズクラス(空きリスト)を決定するためのテーブル.
///
/// 昇順に並んだ上限値の列と、最後の上限値を超えるサイズ用の「溢れクラス」から構成される.
///
/// サイズ`s`は、`b >= s`を満たす最小の上限値`b`のクラスに属する.
///
/// # Examples
///
/// ```
/// use segfit::heap::SizeClassTable;
///
/// let table = SizeClassTable::default();
/// assert_eq!(table.class_count(), 5);
/// assert_eq!(table.class_index_for(8), 0);
/// assert_eq!(table.class_index_for(32), 0);
/// assert_eq!(table.class_index_for(40), 1);
/// assert_eq!(table.class_index_for(1024), 3);
/// assert_eq!(table.class_index_for(4000), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeClassTable {
    bounds: Vec<usize>,
}
impl SizeClassTable {
    /// 上限値の列を指定して`SizeClassTable`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - `bounds`が空
    /// - `bounds`が狭義単調増加になっていない
    /// - `bounds`の要素が`8`の倍数ではない
    pub fn new(bounds: Vec<usize>) -> Result<Self> {
        track_assert!(!bounds.is_empty(), ErrorKind::InvalidInput);
        for &bound in &bounds {
            track_assert_ne!(bound, 0, ErrorKind::InvalidInput);
            track_assert_eq!(bound % ALIGNMENT, 0, ErrorKind::InvalidInput; bound);
        }
        for pair in bounds.windows(2) {
            track_assert!(pair[0] < pair[1], ErrorKind::InvalidInput; pair[0], pair[1]);
        }
        Ok(SizeClassTable { bounds })
    }

    /// 溢れクラスを含めたクラスの数を返す.
    pub fn class_count(&self) -> usize {
        self.bounds.len() + 1
    }

    /// 溢れクラスのインデックスを返す.
    pub fn overflow_class(&self) -> usize {
        self.bounds.len()
    }

    /// `size`が属するクラスのインデックスを返す.
    pub fn class_index_for(&self, size: usize) -> usize {
        self.bounds
            .iter()
            .position(|&bound| size <= bound)
            .unwrap_or_else(|| self.overflow_class())
    }

    /// 上限値の列を返す.
    pub fn bounds(&self) -> &[usize] {
        &self.bounds
    }
}
impl Default for SizeClassTable {
    fn default() -> Self {
        SizeClassTable {
            bounds: DEFAULT_SIZE_CLASS_BOUNDS.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn class_index_for_works() {
        let table = SizeClassTable::default();
        for size in (8..=4000).step_by(8) {
            let class = table.class_index_for(size);
            match table.bounds().get(class) {
                Some(&bound) => {
                    assert!(size <= bound);
                    if class > 0 {
                        assert!(size > table.bounds()[class - 1]);
                    }
                }
                None => {
                    assert_eq!(class, table.overflow_class());
                    assert!(size > 1024);
                }
            }
        }
    }

    #[test]
    fn custom_bounds_works() -> TestResult {
        let table = track!(SizeClassTable::new(vec![16, 64]))?;
        assert_eq!(table.class_count(), 3);
        assert_eq!(table.class_index_for(16), 0);
        assert_eq!(table.class_index_for(24), 1);
        assert_eq!(table.class_index_for(72), 2);
        Ok(())
    }

    #[test]
    fn invalid_bounds() {
        let kind = |bounds: Vec<usize>| SizeClassTable::new(bounds).err().map(|e| *e.kind());
        assert_eq!(kind(vec![]), Some(ErrorKind::InvalidInput));
        assert_eq!(kind(vec![0, 32]), Some(ErrorKind::InvalidInput));
        assert_eq!(kind(vec![32, 30]), Some(ErrorKind::InvalidInput));
        assert_eq!(kind(vec![32, 32]), Some(ErrorKind::InvalidInput));
        assert_eq!(kind(vec![12]), Some(ErrorKind::InvalidInput));
    }
}
