// kernel/src/mm/pagetable_init.rs
//
// 役割：
// - ページング無効の状態で、ブート時の唯一のページディレクトリとページテーブルを組み立てる。
// - boot MB + プロセスごとに 1MiB を identity map する（物理ページ p → 仮想ページ p）。
//
// 仕様:
// - まずディレクトリと全テーブルをゼロクリアする。
// - 必要な 4MiB 窓ごとに PDE を 1 つ作る。PAGE_SIZE ビットは 0（4KiB 単位で後から書き換えるため）。
// - PTE は writable / supervisor / write-through / cache-enabled。
// - 最後にページ 0 を not-present にする（null 参照を拾う）。
// - プロセス数が 2 未満でもテーブルは必ず 1 枚作る。
//

use crate::mem::addr::{PhysAddr, PhysFrame};
use crate::mem::layout::{identity_mapped_pages, page_tables_needed, PAGES_PER_TABLE};
use crate::mem::paging::{DirectoryFlags, PageDirectoryEntry, PageFlags, PageTableEntry};
use crate::mm::PagingStructures;

/// 構築結果（ログ・イベント用）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildSummary {
    pub tables: usize,
    pub mapped_pages: u32,
}

const INITIAL_PDE_FLAGS: DirectoryFlags = DirectoryFlags::PRESENT
    .union(DirectoryFlags::WRITABLE)
    .union(DirectoryFlags::WRITE_THROUGH);

const INITIAL_PTE_FLAGS: PageFlags = PageFlags::PRESENT
    .union(PageFlags::WRITABLE)
    .union(PageFlags::WRITE_THROUGH);

/// 初期ページディレクトリを構築する。
///
/// - base: `pg` が置かれている物理アドレス（4KiB 境界）。PDE はここから計算したフレームを参照する。
/// - 失敗経路は持たない。構成の妥当性は KernelConfig が事前に保証する。
pub fn populate_initial_page_directory(
    pg: &mut PagingStructures,
    base: PhysAddr,
    process_count: usize,
) -> BuildSummary {
    debug_assert!(base.is_page_aligned());

    pg.directory.zero();
    for table in pg.tables.iter_mut() {
        table.zero();
    }

    let table_count = page_tables_needed(process_count).min(pg.tables.len());
    let mapped_pages = identity_mapped_pages(process_count).min(table_count as u32 * PAGES_PER_TABLE);

    pg.base = base;
    pg.table_count = table_count;

    for index in 0..table_count {
        let frame = pg.table_frame(index);
        pg.directory.entries[index] = PageDirectoryEntry::new(frame, INITIAL_PDE_FLAGS);
    }

    for page in 0..mapped_pages {
        let table = (page / PAGES_PER_TABLE) as usize;
        let slot = (page % PAGES_PER_TABLE) as usize;
        pg.tables[table].entries[slot] =
            PageTableEntry::new(PhysFrame::from_index(page), INITIAL_PTE_FLAGS);
    }

    // ページ 0 は null pointer 検出用に not-present
    pg.tables[0].entries[0].remove_flags(PageFlags::PRESENT);

    BuildSummary {
        tables: table_count,
        mapped_pages,
    }
}
