// kernel/src/config.rs
//
// 役割:
// - ブート時に一度だけ検証するカーネル構成（プロセス数、共有窓の開始アドレス、TLB 無効化方式）。
//
// 方針:
// - プロセス数 0 は 1 に丸める（縮退しても安全に動く方を選ぶ）。
// - 物理メモリ不足やアドレスの不整合はここで ConfigError にし、実行時には持ち込まない。

use crate::mem::addr::{VirtAddr, PAGE_SIZE};
use crate::mem::layout::{
    identity_mapped_pages, page_tables_needed, ProcessWindow, MAX_PAGE_TABLES, SLOT_STRIDE,
    WINDOW_CEILING,
};

/// 保存コンテキストを静的に確保する上限
pub const MAX_PROCESSES: usize = 8;

/// 既定のプロセス数（fork でスロット 1 を 1 つ作る構成）
pub const DEFAULT_PROCESS_COUNT: usize = 2;

/// 書き換えた窓のアドレス変換キャッシュをどう捨てるか
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationStrategy {
    /// 書き換えたページごとに invlpg
    PerPage,
    /// CR3 を再ロードして全体を flush
    FullFlush,
}

impl InvalidationStrategy {
    pub const fn default_for_build() -> Self {
        if cfg!(feature = "tlb_full_flush") {
            InvalidationStrategy::FullFlush
        } else {
            InvalidationStrategy::PerPage
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    TooManyProcesses { requested: usize, max: usize },
    ImageStartMisaligned(VirtAddr),
    ImageStartOutsideWindow(VirtAddr),
    InsufficientMemory { required_bytes: u32, available_bytes: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelConfig {
    process_count: usize,
    window: ProcessWindow,
    invalidation: InvalidationStrategy,
}

impl KernelConfig {
    /// 構成を検証する。
    ///
    /// - process_count: 0 は 1 扱い。MAX_PROCESSES と 16MiB のテーブル上限を超えるとエラー。
    /// - image_start: 共有窓の先頭。ページ境界で、[1MiB, 2MiB) にあること
    ///   （スロット同士が重ならない条件）。
    /// - physical_memory_bytes: 実装メモリ量。(N+1)MiB 未満ならエラー。
    pub fn new(
        process_count: usize,
        image_start: VirtAddr,
        physical_memory_bytes: u32,
        invalidation: InvalidationStrategy,
    ) -> Result<Self, ConfigError> {
        let process_count = process_count.max(1);

        if process_count > MAX_PROCESSES || page_tables_needed(process_count) > MAX_PAGE_TABLES {
            return Err(ConfigError::TooManyProcesses {
                requested: process_count,
                max: MAX_PROCESSES,
            });
        }

        if !image_start.is_page_aligned() {
            return Err(ConfigError::ImageStartMisaligned(image_start));
        }

        let start = image_start.as_u32();
        if start < SLOT_STRIDE || start >= WINDOW_CEILING {
            return Err(ConfigError::ImageStartOutsideWindow(image_start));
        }

        let required_bytes = identity_mapped_pages(process_count) * PAGE_SIZE;
        if physical_memory_bytes < required_bytes {
            return Err(ConfigError::InsufficientMemory {
                required_bytes,
                available_bytes: physical_memory_bytes,
            });
        }

        Ok(KernelConfig {
            process_count,
            window: ProcessWindow::new(image_start),
            invalidation,
        })
    }

    pub fn process_count(&self) -> usize {
        self.process_count
    }

    pub fn window(&self) -> ProcessWindow {
        self.window
    }

    pub fn invalidation(&self) -> InvalidationStrategy {
        self.invalidation
    }

    /// fork / switch_task が意味を持つか（2 プロセス以上）
    pub fn is_multiprocess(&self) -> bool {
        self.process_count >= 2
    }
}
