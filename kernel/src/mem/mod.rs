// kernel/src/mem/mod.rs
//
// 役割:
// - メモリ関連の「型と定数」だけを集めた中継点。
// - addr.rs / paging.rs / layout.rs を公開する。
// - 実際にテーブルを組み立てたり書き換えたりするのは mm 側。

pub mod addr;
pub mod paging;
pub mod layout;
