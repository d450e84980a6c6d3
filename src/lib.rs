//! Segregated Fit Allocator.
//!
//! `segfit`は、OSから取得したページ単位の領域(エクステント)の上に構築された、ユーザ空間のメモリアロケータ.
//!
//! # 特徴
//!
//! - `allocate(size)`と`release(ptr)`のみを提供するシンプルなインタフェース
//!   - 要求サイズは`8`から`4000`バイトの範囲であることが想定されている
//! - 空きブロックはサイズクラス毎の空きリストで管理され、各リストはサイズ順にソートされている
//!   - リストを先頭から走査するだけで、真のBestFitが得られる
//! - 割当時には余剰分の分割を、解放時には隣接する空きブロックとの結合を行い、断片化を抑える
//! - スレッドセーフではない
//! - 取得したエクステントがOSに返却されることはない
//!
//! # モジュールの依存関係
//!
//! ```text
//! heap => extent
//! ```
//!
//! - [heap]モジュール:
//!   - 主に[Heap]構造体を提供
//!   - `segfit`の利用者が直接触るのはこの構造体
//!   - ブロックのヘッダ、サイズクラス、空きリスト群の管理を担当する
//! - [extent]モジュール:
//!   - 主に[ExtentSource]トレイトとその実装である[MmapExtentSource]を提供
//!   - [heap]に対して、割当対象となるメモリ領域を供給するのが目的
//!
//! [heap]: ./heap/index.html
//! [Heap]: ./heap/struct.Heap.html
//! [extent]: ./extent/index.html
//! [ExtentSource]: ./extent/trait.ExtentSource.html
//! [MmapExtentSource]: ./extent/struct.MmapExtentSource.html
#![warn(missing_docs)]
extern crate libc;
extern crate prometrics;
#[macro_use]
extern crate slog;
#[macro_use]
extern crate trackable;
extern crate uuid;

pub use crate::error::{Error, ErrorKind};

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod extent;
pub mod heap;
pub mod metrics;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
