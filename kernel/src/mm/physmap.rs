// kernel/src/mm/physmap.rs
//
// 物理メモリ覗き窓。
// - 4 ページの固定仮想窓を、任意の物理アドレスへ向け直せるようにする（デバイスレジスタ、
//   他スロットの中身の確認など）。
// - 窓のページは init でキャッシュ無効にする。
// - 窓は共有窓（プロセスのデータ + スタック）と重なってはいけない。重なると
//   switch_task の検証が失敗する。

use crate::mem::addr::{PhysAddr, VirtAddr, VirtPage, PAGE_SIZE};
use crate::mem::layout::ProcessWindow;
use crate::mm::window::PatchedRange;
use crate::mm::{MapError, PagingStructures};

/// 覗き窓のページ数
pub const PHYS_WINDOW_PAGES: u32 = 4;

/// 覗き窓のバイト数
pub const PHYS_WINDOW_BYTES: usize = (PHYS_WINDOW_PAGES * PAGE_SIZE) as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhysMemWindow {
    base: VirtAddr,
}

impl PhysMemWindow {
    /// 窓の位置を検証してキャッシュを無効にする。
    pub fn init(
        pg: &mut PagingStructures,
        base: VirtAddr,
        process_window: ProcessWindow,
    ) -> Result<Self, MapError> {
        let window = PhysMemWindow { base };

        for page in window.pages() {
            if page.number == 0 {
                return Err(MapError::NullPage);
            }
            if process_window.contains(page.start_address()) {
                return Err(MapError::OverlapsProcessWindow(page));
            }
            if pg.entry(page).is_none() {
                return Err(MapError::NotMapped(page));
            }
        }

        for page in window.pages() {
            pg.disable_cache_for_page(page.start_address())?;
        }

        Ok(window)
    }

    pub fn base(&self) -> VirtAddr {
        self.base
    }

    pub fn pages(&self) -> impl Iterator<Item = VirtPage> {
        let first = self.base.page().number;
        (first..first + PHYS_WINDOW_PAGES).map(VirtPage::from_index)
    }

    /// 窓を phys から始まる 4 ページへ向ける（phys はページ境界に切り下げる）。
    ///
    /// 4 ページ分の付け替え先をすべて検証してから書き込む。失敗時は PTE に触らない。
    pub fn map(&self, pg: &mut PagingStructures, phys: PhysAddr) -> Result<PatchedRange, MapError> {
        let phys = phys.align_down();
        let mut targets = [PhysAddr::new(0); PHYS_WINDOW_PAGES as usize];
        for (i, page) in self.pages().enumerate() {
            let target = phys
                .checked_add(i as u32 * PAGE_SIZE)
                .ok_or(MapError::FrameOutOfRange(phys))?;
            if pg.entry(page).is_none() {
                return Err(MapError::NotMapped(page));
            }
            targets[i] = target;
        }

        for (page, target) in self.pages().zip(targets) {
            pg.map_physical_page(page.start_address(), target)?;
        }
        Ok(PatchedRange {
            first: self.base.page(),
            count: PHYS_WINDOW_PAGES,
        })
    }
}
