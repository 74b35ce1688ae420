// kernel/src/mm/mod.rs
//
// ページング構造の所有者。
// - ページディレクトリ 1 枚 + ページテーブル MAX_PAGE_TABLES 枚を 1 つの構造体に閉じ込める。
// - 物理アドレス base は「この構造体が実際に置かれている物理位置」。
//   実機では identity map 上の static なので仮想 = 物理、テストでは任意の値を渡す。
// - 書き換えはすべてこの構造体のメソッド経由（単一 writer）。
// - TLB の無効化はここではやらない（Machine 側の責務）。

pub mod pagetable_init;
pub mod physmap;
pub mod window;

use crate::mem::addr::{PhysAddr, PhysFrame, VirtAddr, VirtPage, PAGE_SIZE};
use crate::mem::layout::MAX_PAGE_TABLES;
use crate::mem::paging::{MemAction, PageDirectory, PageFlags, PageTable, PageTableEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapError {
    /// ページテーブルが構築されていない範囲
    NotMapped(VirtPage),
    /// ページ 0 は null 参照検出用に常に not-present
    NullPage,
    /// フレーム番号が 20bit を超える
    FrameOutOfRange(PhysAddr),
    /// 共有窓の PTE は switch_task 専用
    OverlapsProcessWindow(VirtPage),
    /// 物理メモリ覗き窓が init されていない
    PhysWindowUninitialized,
}

#[repr(C)]
pub struct PagingStructures {
    directory: PageDirectory,
    tables: [PageTable; MAX_PAGE_TABLES],
    table_count: usize,
    base: PhysAddr,
}

impl PagingStructures {
    pub const fn new() -> Self {
        const EMPTY_TABLE: PageTable = PageTable::zeroed();
        PagingStructures {
            directory: PageDirectory::zeroed(),
            tables: [EMPTY_TABLE; MAX_PAGE_TABLES],
            table_count: 0,
            base: PhysAddr::new(0),
        }
    }

    /// ページディレクトリの物理アドレス（CR3 に入れる値）
    pub fn directory_address(&self) -> PhysAddr {
        self.base
    }

    /// i 番目のページテーブルの物理フレーム
    pub(crate) fn table_frame(&self, index: usize) -> PhysFrame {
        // directory の直後に tables が 4KiB ずつ並ぶ（repr(C)）
        PhysFrame::from_index(self.base.frame().number + 1 + index as u32)
    }

    pub fn table_count(&self) -> usize {
        self.table_count
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    /// 仮想ページに対応する PTE（テーブルが無ければ None）
    pub fn entry(&self, page: VirtPage) -> Option<&PageTableEntry> {
        let dir = page.directory_index();
        if dir >= self.table_count || !self.directory.entries[dir].is_present() {
            return None;
        }
        Some(&self.tables[dir].entries[page.table_index()])
    }

    pub(crate) fn entry_mut(&mut self, page: VirtPage) -> Option<&mut PageTableEntry> {
        let dir = page.directory_index();
        if dir >= self.table_count || !self.directory.entries[dir].is_present() {
            return None;
        }
        Some(&mut self.tables[dir].entries[page.table_index()])
    }

    /// 仮想アドレス → 物理アドレス（ソフトウェアでテーブルを辿る）
    pub fn translate(&self, virt: VirtAddr) -> Option<PhysAddr> {
        let pte = self.entry(virt.page())?;
        if !pte.is_present() {
            return None;
        }
        let offset = virt.as_u32() & (PAGE_SIZE - 1);
        pte.frame().start_address().checked_add(offset)
    }

    /// present な PTE の総数
    pub fn present_page_count(&self) -> usize {
        self.tables[..self.table_count]
            .iter()
            .flat_map(|t| t.entries.iter())
            .filter(|e| e.is_present())
            .count()
    }

    /// 単一ページ操作の入口。
    pub fn apply(&mut self, action: MemAction) -> Result<(), MapError> {
        match action {
            MemAction::Map { page, frame, flags } => {
                if page.number == 0 {
                    return Err(MapError::NullPage);
                }
                let entry = self.entry_mut(page).ok_or(MapError::NotMapped(page))?;
                entry.set_frame(frame);
                entry.insert_flags(flags);
                Ok(())
            }
            MemAction::DisableCache { page } => {
                let entry = self.entry_mut(page).ok_or(MapError::NotMapped(page))?;
                entry.insert_flags(PageFlags::CACHE_DISABLE);
                Ok(())
            }
        }
    }

    /// virt を含むページを phys を含むフレームに向ける。
    pub fn map_physical_page(&mut self, virt: VirtAddr, phys: PhysAddr) -> Result<(), MapError> {
        let frame = PhysFrame::checked_from_index(phys.frame().number)
            .ok_or(MapError::FrameOutOfRange(phys))?;
        self.apply(MemAction::Map {
            page: virt.page(),
            frame,
            flags: PageFlags::PRESENT | PageFlags::WRITABLE,
        })
    }

    /// virt を含むページのキャッシュを無効にする。
    pub fn disable_cache_for_page(&mut self, virt: VirtAddr) -> Result<(), MapError> {
        self.apply(MemAction::DisableCache { page: virt.page() })
    }
}

impl Default for PagingStructures {
    fn default() -> Self {
        Self::new()
    }
}
