// kernel/src/lib.rs
//
// dt-kernel: 1 枚のイメージを物理メモリ上に N 個複製し、共有窓の PTE を
// 付け替えることで協調的に切り替えるカーネルコア。
//
// - mem:     アドレス・ページエントリ・メモリレイアウト
// - mm:      ページング構造（構築、窓の付け替え、物理メモリ覗き窓）
// - arch:    ハードウェア境界（Machine トレイト、コンテキスト、ポート、リセット）
// - kernel:  KernelState、fork、switch_task、シェル向けサービス
// - config:  ブート時に検証する構成
// - logging: VGA + COM1 への行ログ

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod kernel;
pub mod logging;
pub mod mem;
pub mod mm;

#[cfg(all(target_os = "none", not(test)))]
mod panic;
