//! 文件系统一致性检查。
//!
//! 从位图文件头、根目录头以及目录可达的所有文件头
//! 重建一张影子位图，逐项核对：重名、越界扇区、
//! 被多处认领的扇区、影子与落盘位图的分歧。

use log::{debug, error};
use sector_fs::{
    Bitmap, Directory, FileHeader, DIRECTORY_SECTOR, FILE_NAME_MAX_LEN, FREE_MAP_FILE_SIZE,
    FREE_MAP_SECTOR, NUM_DIRECT, NUM_SECTORS, PARENT_NAME, SECTOR_SIZE,
};

use super::FileSystem;

impl FileSystem {
    /// 全盘核对，有任何不一致即返回假
    pub fn check(&self) -> bool {
        debug!("performing file system check");

        let mut shadow = Bitmap::new(NUM_SECTORS);
        shadow.mark(FREE_MAP_SECTOR);
        shadow.mark(DIRECTORY_SECTOR);

        let mut error = false;

        let map_header = self.header(FREE_MAP_SECTOR);
        error |= check_for(
            map_header.len() == FREE_MAP_FILE_SIZE,
            "bad bitmap header: wrong file size",
        );
        error |= check_for(
            map_header.raw().num_sectors as usize == FREE_MAP_FILE_SIZE / SECTOR_SIZE,
            "bad bitmap header: wrong number of sectors",
        );
        error |= check_header(&map_header, &mut shadow);

        let dir_header = self.header(DIRECTORY_SECTOR);
        error |= check_header(&dir_header, &mut shadow);
        error |= self.check_directory(DIRECTORY_SECTOR, &mut shadow);

        let mut free_map = Bitmap::new(NUM_SECTORS);
        free_map.fetch_from(self.cache(), &map_header);
        error |= check_bitmaps(&free_map, &shadow);

        if error {
            error!("file system check failed");
        } else {
            debug!("file system check succeeded");
        }
        !error
    }

    /// 核对一个目录并递归进入子目录
    fn check_directory(&self, sector: usize, shadow: &mut Bitmap) -> bool {
        let dir = Directory::fetch_from(self.cache(), sector);
        let mut error = false;
        let mut known_names: Vec<&str> = Vec::new();

        for entry in dir.entries().iter().filter(|entry| entry.in_use()) {
            let name = entry.name();
            // 父项属于上级名字空间，已在上级记过账
            if name == PARENT_NAME {
                continue;
            }

            if name.len() > FILE_NAME_MAX_LEN {
                error!("file name too long: {name:?}");
                error = true;
            }
            if known_names.contains(&name) {
                error!("repeated file name: {name:?}");
                error = true;
            } else {
                known_names.push(name);
            }

            error |= check_sector(entry.sector(), shadow);
            let header = self.header(entry.sector());
            error |= check_header(&header, shadow);

            if entry.is_dir() {
                error |= self.check_directory(entry.sector(), shadow);
            }
        }

        error
    }
}

/// 条件不成立时记下错误，返回是否出错
fn check_for(ok: bool, message: &str) -> bool {
    if !ok {
        error!("{message}");
    }
    !ok
}

/// 认领一个扇区进影子位图
fn check_sector(sector: usize, shadow: &mut Bitmap) -> bool {
    if check_for(sector < NUM_SECTORS, "sector number out of range") {
        return true;
    }
    if shadow.test(sector) {
        error!("sector {sector} claimed twice");
        return true;
    }
    shadow.mark(sector);
    false
}

/// 核对一个文件头并认领其引用的所有扇区
fn check_header(header: &FileHeader, shadow: &mut Bitmap) -> bool {
    let raw = header.raw();
    let data_sectors = FileHeader::count_data_sectors(header.len());
    let mut error = check_for(
        raw.num_sectors as usize >= data_sectors,
        "sector count not compatible with file size",
    );

    if header.is_direct() {
        // 满长度的直接头恰好用满槽位，取等号
        error |= check_for(
            raw.num_sectors as usize <= NUM_DIRECT,
            "too many sectors in a direct header",
        );
        for &sector in &raw.data_sectors[..data_sectors] {
            error |= check_sector(sector as usize, shadow);
        }
    } else {
        let indirection = FileHeader::count_indirection_sectors(header.len());
        for &sector in &raw.data_sectors[..indirection] {
            error |= check_sector(sector as usize, shadow);
        }
        for child in header.children() {
            error |= check_header(child, shadow);
        }
    }

    error
}

/// 影子位图与落盘位图必须完全一致
fn check_bitmaps(free_map: &Bitmap, shadow: &Bitmap) -> bool {
    let mut error = false;
    for sector in 0..NUM_SECTORS {
        if free_map.test(sector) != shadow.test(sector) {
            error!(
                "inconsistent bitmap at sector {sector}: on disk {}, reachable {}",
                free_map.test(sector),
                shadow.test(sector)
            );
            error = true;
        }
    }
    error
}
