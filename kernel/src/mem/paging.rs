// kernel/src/mem/paging.rs
//
// 32bit（非 PAE）2 段ページングのエントリ型とテーブル型。
// - PageDirectoryEntry: 4MiB ごとに 1 つ。PageTable を 4KiB 境界のフレーム番号で参照する。
// - PageTableEntry:     4KiB ごとに 1 つ。物理フレームを参照する。
// - ここはビット表現だけを持ち、CR3 などのハードウェア操作はしない。

use crate::mem::addr::{PhysFrame, VirtPage, MAX_FRAME_NUMBER, PAGE_SHIFT};

/// ページディレクトリ 1 つあたりのエントリ数
pub const DIRECTORY_ENTRY_COUNT: usize = 1024;

/// ページテーブル 1 つあたりのエントリ数
pub const TABLE_ENTRY_COUNT: usize = 1024;

const FRAME_MASK: u32 = MAX_FRAME_NUMBER << PAGE_SHIFT;
const FLAGS_MASK: u32 = !FRAME_MASK;

bitflags::bitflags! {
    /// PTE の属性ビット（bits 11..0）
    ///
    /// - PRESENT: 4KiB ページをマップしている
    /// - WRITABLE: 書き込み可能
    /// - USER: ユーザモードからアクセス可能（このカーネルでは常に 0）
    /// - WRITE_THROUGH / CACHE_DISABLE: メモリタイプ
    /// - ACCESSED / DIRTY: CPU が立てる
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED = 1 << 5;
        const DIRTY = 1 << 6;
        const PAT = 1 << 7;
        const GLOBAL = 1 << 8;
    }
}

bitflags::bitflags! {
    /// PDE の属性ビット（bits 11..0）
    ///
    /// PAGE_SIZE が 1 だと 4MiB ページになる。ここでは常に 0（テーブル参照）にして、
    /// 属性を 4KiB 単位で後から書き換えられるようにしておく。
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DirectoryFlags: u32 {
        const PRESENT = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED = 1 << 5;
        const PAGE_SIZE = 1 << 7;
    }
}

/// ページディレクトリエントリ
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PageDirectoryEntry(u32);

impl PageDirectoryEntry {
    pub const fn empty() -> Self {
        PageDirectoryEntry(0)
    }

    pub fn new(table: PhysFrame, flags: DirectoryFlags) -> Self {
        PageDirectoryEntry(((table.number << PAGE_SHIFT) & FRAME_MASK) | (flags.bits() & FLAGS_MASK))
    }

    pub fn flags(self) -> DirectoryFlags {
        DirectoryFlags::from_bits_truncate(self.0)
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(DirectoryFlags::PRESENT)
    }

    pub fn table_frame(self) -> PhysFrame {
        PhysFrame::from_index((self.0 & FRAME_MASK) >> PAGE_SHIFT)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// ページテーブルエントリ
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry(u32);

impl PageTableEntry {
    pub const fn empty() -> Self {
        PageTableEntry(0)
    }

    pub fn new(frame: PhysFrame, flags: PageFlags) -> Self {
        PageTableEntry(((frame.number << PAGE_SHIFT) & FRAME_MASK) | (flags.bits() & FLAGS_MASK))
    }

    pub fn flags(self) -> PageFlags {
        PageFlags::from_bits_truncate(self.0)
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(PageFlags::PRESENT)
    }

    pub fn frame(self) -> PhysFrame {
        PhysFrame::from_index((self.0 & FRAME_MASK) >> PAGE_SHIFT)
    }

    /// フラグは保ったままフレームだけ差し替える。
    pub fn set_frame(&mut self, frame: PhysFrame) {
        self.0 = ((frame.number << PAGE_SHIFT) & FRAME_MASK) | (self.0 & FLAGS_MASK);
    }

    pub fn insert_flags(&mut self, flags: PageFlags) {
        self.0 |= flags.bits() & FLAGS_MASK;
    }

    pub fn remove_flags(&mut self, flags: PageFlags) {
        self.0 &= !(flags.bits() & FLAGS_MASK);
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl core::fmt::Debug for PageDirectoryEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PDE({:?}, {:?})", self.table_frame(), self.flags())
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PTE({:?}, {:?})", self.frame(), self.flags())
    }
}

/// ページディレクトリ（4KiB 境界）
#[repr(C, align(4096))]
pub struct PageDirectory {
    pub entries: [PageDirectoryEntry; DIRECTORY_ENTRY_COUNT],
}

/// ページテーブル（4KiB 境界）
#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [PageTableEntry; TABLE_ENTRY_COUNT],
}

impl PageDirectory {
    pub const fn zeroed() -> Self {
        PageDirectory {
            entries: [PageDirectoryEntry::empty(); DIRECTORY_ENTRY_COUNT],
        }
    }

    pub fn zero(&mut self) {
        self.entries.fill(PageDirectoryEntry::empty());
    }
}

impl PageTable {
    pub const fn zeroed() -> Self {
        PageTable {
            entries: [PageTableEntry::empty(); TABLE_ENTRY_COUNT],
        }
    }

    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::empty());
    }
}

/// ページ単位のメモリ操作を表現する抽象イベント。
///
/// - Map: 「この仮想ページを、この物理フレームに、この属性でマップしたい」
/// - DisableCache: 「この仮想ページをキャッシュ無効にしたい」
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemAction {
    Map {
        page: VirtPage,
        frame: PhysFrame,
        flags: PageFlags,
    },
    DisableCache {
        page: VirtPage,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_entry_keeps_flags_when_frame_changes() {
        let flags = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::WRITE_THROUGH;
        let mut pte = PageTableEntry::new(PhysFrame::from_index(0x123), flags);
        assert_eq!(pte.frame().number, 0x123);

        pte.set_frame(PhysFrame::from_index(0x323));
        assert_eq!(pte.frame().number, 0x323);
        assert_eq!(pte.flags(), flags);
        assert_eq!(pte.raw(), 0x0032_300b);
    }

    #[test]
    fn directory_entry_references_table_frame() {
        let pde = PageDirectoryEntry::new(
            PhysFrame::from_index(0x91),
            DirectoryFlags::PRESENT | DirectoryFlags::WRITABLE,
        );
        assert!(pde.is_present());
        assert!(!pde.flags().contains(DirectoryFlags::PAGE_SIZE));
        assert_eq!(pde.table_frame().number, 0x91);
        assert_eq!(pde.raw(), 0x0009_1003);
    }

    #[test]
    fn structures_are_page_sized_and_aligned() {
        assert_eq!(core::mem::size_of::<PageTable>(), 4096);
        assert_eq!(core::mem::align_of::<PageTable>(), 4096);
        assert_eq!(core::mem::size_of::<PageDirectory>(), 4096);
    }

    #[test]
    fn removing_present_clears_only_that_bit() {
        let mut pte = PageTableEntry::new(
            PhysFrame::from_index(0),
            PageFlags::PRESENT | PageFlags::WRITABLE,
        );
        pte.remove_flags(PageFlags::PRESENT);
        assert!(!pte.is_present());
        assert!(pte.flags().contains(PageFlags::WRITABLE));
    }
}
