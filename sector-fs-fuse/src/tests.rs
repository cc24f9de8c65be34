use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use os::fs::FileSystem;
use sector_fs::{FsError, MAX_FILE_SIZE, NUM_DIRECT, NUM_SECTORS, SECTOR_SIZE};

use crate::SectorFile;

static IMAGE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// 每个测试一份独立镜像，互不串扰
fn image_path(tag: &str) -> PathBuf {
    let seq = IMAGE_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "sector-fs-{}-{tag}-{seq}.img",
        std::process::id()
    ))
}

fn open_fs(path: &PathBuf, format: bool) -> Arc<FileSystem> {
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .unwrap();
    fd.set_len((NUM_SECTORS * SECTOR_SIZE) as u64).unwrap();
    FileSystem::new(Arc::new(SectorFile(Mutex::new(fd))), format)
}

#[test]
fn format_is_consistent() {
    let image = image_path("format");
    let fs = open_fs(&image, true);

    assert!(fs.check());
    assert_eq!(fs.list(), vec![String::from("..")]);
}

#[test]
fn write_then_read_back() {
    let image = image_path("roundtrip");
    let fs = open_fs(&image, true);

    fs.create("/a", 0).unwrap();
    let mut file = fs.open("/a").unwrap();
    assert_eq!(file.write(b"hello"), 5);
    drop(file);

    let mut file = fs.open("/a").unwrap();
    assert_eq!(file.length(), 5);
    let mut buf = [0u8; 5];
    assert_eq!(file.read(&mut buf), 5);
    assert_eq!(&buf, b"hello");
}

#[test]
fn survives_reopen_of_image() {
    let image = image_path("persist");
    {
        let fs = open_fs(&image, true);
        fs.create("/keep", 0).unwrap();
        let mut file = fs.open("/keep").unwrap();
        file.write(b"durable bytes");
    }

    let fs = open_fs(&image, false);
    assert!(fs.check());
    let mut file = fs.open("/keep").unwrap();
    let mut buf = vec![0u8; file.length()];
    file.read(&mut buf);
    assert_eq!(buf, b"durable bytes");
}

#[test]
fn directories_nest_and_empty_only_removal() {
    let image = image_path("dirs");
    let fs = open_fs(&image, true);

    fs.create_dir("/d").unwrap();
    fs.cd("/d").unwrap();
    fs.create("x", 0).unwrap();
    fs.cd("..").unwrap();

    assert!(fs.open("/d/x").is_ok());
    assert_eq!(fs.remove_dir("/d"), Err(FsError::DirectoryNotEmpty));
    fs.remove("/d/x").unwrap();
    fs.remove_dir("/d").unwrap();
    assert!(fs.check());
}

#[test]
fn full_direct_file_then_promotion_preserves_content() {
    let image = image_path("promotion");
    let fs = open_fs(&image, true);

    let clear_before = fs.free_map_snapshot().count_clear();

    // 恰好填满直接头的文件：一个头扇区加满槽的数据扇区
    fs.create("/full", MAX_FILE_SIZE).unwrap();
    let clear_after = fs.free_map_snapshot().count_clear();
    assert_eq!(clear_before - clear_after, 1 + NUM_DIRECT);

    let pattern: Vec<u8> = (0..MAX_FILE_SIZE).map(|i| (i % 251) as u8).collect();
    let file = fs.open("/full").unwrap();
    assert_eq!(file.write_at(&pattern, 0), MAX_FILE_SIZE);

    // 再写一字节就要提升为间接头
    assert_eq!(file.write_at(b"!", MAX_FILE_SIZE), 1);
    assert_eq!(file.length(), MAX_FILE_SIZE + 1);

    // 既有内容的偏移原样保留
    let mut read_back = vec![0u8; MAX_FILE_SIZE + 1];
    assert_eq!(file.read_at(&mut read_back, 0), MAX_FILE_SIZE + 1);
    assert_eq!(&read_back[..MAX_FILE_SIZE], &pattern[..]);
    assert_eq!(read_back[MAX_FILE_SIZE], b'!');

    drop(file);
    assert!(fs.check());
}

#[test]
fn write_past_end_is_rejected_at_end_extends() {
    let image = image_path("extend");
    let fs = open_fs(&image, true);

    fs.create("/f", 4).unwrap();
    let file = fs.open("/f").unwrap();

    // 越过文件尾：一字不写
    assert_eq!(file.write_at(b"xx", 5), 0);
    // 恰在文件尾：扩容
    assert_eq!(file.write_at(b"xx", 4), 2);
    assert_eq!(file.length(), 6);
}

#[test]
fn remove_reclaims_all_sectors() {
    let image = image_path("reclaim");
    let fs = open_fs(&image, true);

    let baseline = fs.free_map_snapshot().count_clear();

    // 间接文件把两级索引都用上
    fs.create("/big", MAX_FILE_SIZE * 3 + 17).unwrap();
    assert!(fs.free_map_snapshot().count_clear() < baseline);
    assert!(fs.check());

    fs.remove("/big").unwrap();
    assert_eq!(fs.free_map_snapshot().count_clear(), baseline);
    assert!(fs.check());
}

#[test]
fn disk_exhaustion_fails_cleanly() {
    let image = image_path("exhaust");
    let fs = open_fs(&image, true);

    fs.create("/big", sector_fs::MAX_FILE_SIZE_W_INDIR).unwrap();
    // 剩余空间放不下第二个满配文件
    assert_eq!(
        fs.create("/big2", sector_fs::MAX_FILE_SIZE_W_INDIR),
        Err(FsError::NoSpace)
    );
    // 失败不留半成品
    assert!(fs.check());
    assert!(fs.open("/big2").is_err());

    fs.remove("/big").unwrap();
    fs.create("/big2", sector_fs::MAX_FILE_SIZE_W_INDIR).unwrap();
    assert!(fs.check());
}

#[test]
fn deferred_delete_until_last_close() {
    let image = image_path("deferred");
    let fs = open_fs(&image, true);

    fs.create("/victim", 0).unwrap();
    let file = fs.open("/victim").unwrap();
    let written = file.write_at(b"still readable", 0);
    assert_eq!(written, 14);

    let baseline = fs.free_map_snapshot().count_clear();
    fs.remove("/victim").unwrap();

    // 名字立刻消失，句柄继续工作
    assert_eq!(fs.open("/victim").err(), Some(FsError::NotFound));
    let mut buf = [0u8; 14];
    assert_eq!(file.read_at(&mut buf, 0), 14);
    assert_eq!(&buf, b"still readable");

    // 最后一次关闭才回收扇区
    drop(file);
    assert!(fs.free_map_snapshot().count_clear() > baseline);
    assert!(fs.check());
}

#[test]
fn path_components_must_be_directories() {
    let image = image_path("badpath");
    let fs = open_fs(&image, true);

    fs.create("/plain", 0).unwrap();
    assert_eq!(fs.open("/plain/x").err(), Some(FsError::PathInvalid));
    assert_eq!(fs.create("/nowhere/x", 0), Err(FsError::PathInvalid));
}

#[test]
fn close_of_unknown_sector_reports_failure() {
    let image = image_path("unknown-close");
    let fs = open_fs(&image, true);

    assert!(!fs.close(999));
}

#[test]
fn stat_reports_kind_and_length() {
    let image = image_path("stat");
    let fs = open_fs(&image, true);

    fs.create("/f", 300).unwrap();
    fs.create_dir("/d").unwrap();

    let file_stat = fs.stat("/f").unwrap();
    assert!(!file_stat.is_dir);
    assert_eq!(file_stat.length, 300);

    let dir_stat = fs.stat("/d").unwrap();
    assert!(dir_stat.is_dir);

    assert_eq!(fs.stat("/missing").err(), Some(FsError::NotFound));
}

#[test]
fn check_flags_corrupted_header() {
    let image = image_path("corrupt");
    let fs = open_fs(&image, true);

    fs.create("/f", 256).unwrap();
    assert!(fs.check());
    let stat = fs.stat("/f").unwrap();
    drop(fs);

    // 绕过文件系统，把文件头指向的首个数据扇区改成越界编号
    {
        let mut fd = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&image)
            .unwrap();
        use std::io::{Read, Seek, SeekFrom, Write};
        let mut header = [0u8; SECTOR_SIZE];
        fd.seek(SeekFrom::Start((stat.sector * SECTOR_SIZE) as u64))
            .unwrap();
        fd.read_exact(&mut header).unwrap();
        header[8..12].copy_from_slice(&(NUM_SECTORS as u32 + 7).to_le_bytes());
        fd.seek(SeekFrom::Start((stat.sector * SECTOR_SIZE) as u64))
            .unwrap();
        fd.write_all(&header).unwrap();
    }

    let fs = open_fs(&image, false);
    assert!(!fs.check());
}
