use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else if e.raw_os_error() == Some(libc::ENOMEM) {
            ErrorKind::OutOfMemory.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// OSからエクステント(メモリ領域)を取得できなかった.
    ///
    /// アロケータはこれ以上処理を進めることができないので、致命的なエラーとして扱われる.
    /// より小さなサイズでのリトライ等は行われない.
    ///
    /// # 典型的な対応策
    ///
    /// - プロセスを終了する
    OutOfMemory,

    /// 入力が不正.
    ///
    /// E.g., ページ境界に揃っていないエクステントサイズが指定された
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// 内部状態が不整合に陥っている.
    ///
    /// プログラムにバグがあることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    InconsistentState,

    /// その他エラー.
    ///
    /// E.g., `mmap`が`ENOMEM`以外の理由で失敗した
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn io_error_conversion_works() {
        let e = Error::from(io::Error::new(io::ErrorKind::InvalidInput, "foo"));
        assert_eq!(*e.kind(), ErrorKind::InvalidInput);

        let e = Error::from(io::Error::from_raw_os_error(libc::ENOMEM));
        assert_eq!(*e.kind(), ErrorKind::OutOfMemory);

        let e = Error::from(io::Error::from_raw_os_error(libc::EACCES));
        assert_eq!(*e.kind(), ErrorKind::Other);

        let e = io::Error::from(Error::from(ErrorKind::InvalidInput.error()));
        assert_eq!(e.kind(), io::ErrorKind::InvalidInput);
    }
}
