use crate::{ErrorKind, Result};

/// [`ExtentSource`]が扱うページのサイズを表現するための構造体.
///
/// エクステントの開始位置およびサイズは、`PageSize`によって指定された境界にアライメントされている必要がある.
///
/// 指定されたサイズのページ境界にアライメントを行うための補助メソッド群も提供している.
///
/// [`ExtentSource`]: ./trait.ExtentSource.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageSize(usize);
impl PageSize {
    /// 許容されるページサイズの最小値.
    ///
    /// また`PageSize::default()`で使われる値でもある.
    pub const MIN: usize = 4096;

    /// 許容可能な最小のページサイズを持つ`PageSize`インスタンスを返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use segfit::extent::PageSize;
    ///
    /// assert_eq!(PageSize::min().as_usize(), PageSize::MIN);
    /// ```
    pub fn min() -> Self {
        PageSize(Self::MIN)
    }

    /// 指定された値のページサイズを表現する`PageSize`インスタンスを生成する.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - `page_size`が`PageSize::MIN`未満
    /// - `page_size`が2の冪ではない
    ///
    /// # Examples
    ///
    /// ```
    /// use segfit::ErrorKind;
    /// use segfit::extent::PageSize;
    ///
    /// assert_eq!(PageSize::new(4096).ok().map(|a| a.as_usize()), Some(4096));
    /// assert_eq!(PageSize::new(16384).ok().map(|a| a.as_usize()), Some(16384));
    ///
    /// assert_eq!(PageSize::new(512).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// assert_eq!(PageSize::new(6144).err().map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
    /// ```
    #[allow(clippy::new_ret_no_self)]
    pub fn new(page_size: usize) -> Result<Self> {
        track_assert!(page_size >= Self::MIN, ErrorKind::InvalidInput; page_size);
        track_assert!(page_size.is_power_of_two(), ErrorKind::InvalidInput; page_size);
        Ok(PageSize(page_size))
    }

    /// 指定位置より後方の最初のページ境界位置を返す.
    ///
    /// # Examples
    ///
    /// ```
    /// use segfit::extent::PageSize;
    ///
    /// let page_size = PageSize::min();
    /// assert_eq!(page_size.ceil_align(0), 0);
    /// assert_eq!(page_size.ceil_align(1), 4096);
    /// assert_eq!(page_size.ceil_align(4096), 4096);
    /// ```
    pub fn ceil_align(self, position: usize) -> usize {
        (position + self.0 - 1) / self.0 * self.0
    }

    /// ページサイズ値を`usize`に変換して返す.
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// 指定位置がページ境界に沿っているかどうかを判定する.
    ///
    /// # Examples
    ///
    /// ```
    /// use segfit::extent::PageSize;
    ///
    /// let page_size = PageSize::min();
    /// assert!(page_size.is_aligned(0));
    /// assert!(page_size.is_aligned(8192));
    ///
    /// assert!(!page_size.is_aligned(4095));
    /// assert!(!page_size.is_aligned(4097));
    /// ```
    pub fn is_aligned(self, position: usize) -> bool {
        position % self.0 == 0
    }
}
impl Default for PageSize {
    fn default() -> Self {
        Self::min()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn alignment_works() -> TestResult {
        let page_size = track!(PageSize::new(8192))?;
        assert_eq!(page_size.ceil_align(100), 8192);
        assert_eq!(page_size.ceil_align(8193), 16384);
        assert!(page_size.is_aligned(16384));
        assert!(!page_size.is_aligned(4096));
        Ok(())
    }
}
