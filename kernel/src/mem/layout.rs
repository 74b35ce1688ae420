// kernel/src/mem/layout.rs
//
// death-track: 物理メモリのスロット配置（仕様レベルの定数と純粋関数）
//
// 想定レイアウト（identity map, 物理 = 仮想）:
//
//   0x0000_0000 ..= 0x000f_ffff
//     - boot MB（ページ 0 は常に not-present）
//     - VGA テキストバッファ(0xb8000) など
//
//   0x0010_0000 ..= 0x001f_ffff
//     - カーネル本体（.text / .boot_shared）と、
//       _data_start から 2MiB 天井までの「共有窓」（.data / .bss / スタック）
//     - 共有窓はプロセス 0 のスロット
//
//   0x0010_0000 + k MiB ..
//     - プロセス k のスロット。共有窓の内容を k MiB ずらした物理位置に fork でコピーする
//
// 窓は常に同じ仮想アドレス範囲 [image_start, WINDOW_CEILING) にあり、
// switch_task はその範囲の PTE だけを書き換えてスロットを差し替える。

use crate::mem::addr::{PhysFrame, VirtAddr, VirtPage, PAGE_SIZE};

/// 1MiB
pub const MIB: u32 = 0x10_0000;

/// 1MiB あたりのページ数
pub const PAGES_PER_MIB: u32 = MIB / PAGE_SIZE;

/// スロット間隔（プロセス index 1 つにつき 1MiB ずれる）
pub const SLOT_STRIDE: u32 = MIB;

/// 共有窓の上端（スタックの天井）
pub const WINDOW_CEILING: u32 = 2 * MIB;

/// 構築するページテーブルの上限（4MiB x 4 = 16MiB）
pub const MAX_PAGE_TABLES: usize = 4;

/// 1 枚のページテーブルがカバーするページ数
pub const PAGES_PER_TABLE: u32 = 1024;

/// identity map すべきページ数: boot MB + プロセスごとに 1MiB
pub const fn identity_mapped_pages(process_count: usize) -> u32 {
    (process_count as u32 + 1) * PAGES_PER_MIB
}

/// 必要なページテーブル枚数（最低 1 枚）
pub const fn page_tables_needed(process_count: usize) -> usize {
    let pages = identity_mapped_pages(process_count);
    let tables = pages.div_ceil(PAGES_PER_TABLE) as usize;
    if tables == 0 {
        1
    } else {
        tables
    }
}

/// プロセス index のスロット基点（フレーム番号）。共有窓からの差分として使う。
pub fn slot_base(index: usize) -> PhysFrame {
    PhysFrame::from_index(index as u32 * (SLOT_STRIDE / PAGE_SIZE))
}

/// 共有窓（データ + スタック）の仮想範囲
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessWindow {
    start: VirtAddr,
}

impl ProcessWindow {
    /// start はページ境界かつ [SLOT_STRIDE, WINDOW_CEILING) にあること（KernelConfig が検証する）。
    pub const fn new(start: VirtAddr) -> Self {
        ProcessWindow { start }
    }

    pub fn start(&self) -> VirtAddr {
        self.start
    }

    pub fn end(&self) -> VirtAddr {
        VirtAddr::new(WINDOW_CEILING)
    }

    pub fn len_bytes(&self) -> u32 {
        WINDOW_CEILING.saturating_sub(self.start.as_u32())
    }

    pub fn first_page(&self) -> VirtPage {
        self.start.page()
    }

    pub fn page_count(&self) -> u32 {
        self.len_bytes() / PAGE_SIZE
    }

    pub fn contains(&self, addr: VirtAddr) -> bool {
        addr >= self.start && addr < self.end()
    }

    pub fn pages(&self) -> impl Iterator<Item = VirtPage> {
        let first = self.first_page().number;
        (first..first + self.page_count()).map(VirtPage::from_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_process_still_needs_one_table() {
        assert_eq!(page_tables_needed(0), 1);
        assert_eq!(page_tables_needed(1), 1);
        assert_eq!(identity_mapped_pages(1), 512);
    }

    #[test]
    fn tables_cover_boot_mb_plus_one_mb_per_process() {
        assert_eq!(page_tables_needed(3), 1);
        assert_eq!(page_tables_needed(4), 2);
        assert_eq!(page_tables_needed(8), 3);
        assert_eq!(identity_mapped_pages(3), 4 * 256);
    }

    #[test]
    fn slot_bases_are_one_mib_apart() {
        assert_eq!(slot_base(0).number, 0);
        assert_eq!(slot_base(2).number, 512);
        assert_eq!(slot_base(2).start_address().as_u32(), 2 * MIB);
    }

    #[test]
    fn window_spans_up_to_the_ceiling() {
        let window = ProcessWindow::new(VirtAddr::new(0x18_0000));
        assert_eq!(window.page_count(), 128);
        assert_eq!(window.first_page().number, 0x180);
        assert!(window.contains(VirtAddr::new(0x1f_fffc)));
        assert!(!window.contains(VirtAddr::new(WINDOW_CEILING)));
        assert_eq!(window.pages().last().map(|p| p.number), Some(0x1ff));
    }
}
