//! 文件系统门面的并发行为：打开中的删除、读写互斥、
//! 目录表容量。跑在内存盘上。

use std::sync::Arc;

use block_dev::BlockDevice;
use os::drivers::RamDisk;
use os::fs::FileSystem;
use os::thread;
use sector_fs::{FsError, NUM_DIR_ENTRIES, NUM_SECTORS};

fn fresh_fs() -> Arc<FileSystem> {
    let _ = env_logger::builder().is_test(true).try_init();
    let device: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(NUM_SECTORS));
    FileSystem::new(device, true)
}

#[test]
fn remove_while_other_threads_hold_handles() {
    let fs = fresh_fs();

    fs.create("/shared", 0).unwrap();
    {
        let writer = fs.open("/shared").unwrap();
        assert_eq!(writer.write_at(b"payload", 0), 7);
    }
    let baseline_clear = fs.free_map_snapshot().count_clear();

    let handle_a = fs.open("/shared").unwrap();
    let handle_b = fs.open("/shared").unwrap();
    assert_eq!(fs.open_files().open_instances(handle_a.sector()), 2);

    // 线程A删除；两个句柄都照常读
    let remover = {
        let fs = fs.clone();
        thread::spawn("remover", 0, move || fs.remove("/shared"))
    };
    remover.join().unwrap().unwrap();

    let mut buf = [0u8; 7];
    assert_eq!(handle_a.read_at(&mut buf, 0), 7);
    assert_eq!(&buf, b"payload");
    assert_eq!(handle_b.read_at(&mut buf, 0), 7);
    assert_eq!(&buf, b"payload");

    // 第三次按路径打开失败：名字已经不在目录里
    assert_eq!(fs.open("/shared").err(), Some(FsError::NotFound));

    // 扇区尚未回收
    assert_eq!(fs.free_map_snapshot().count_clear(), baseline_clear);

    let sector = handle_a.sector();
    drop(handle_a);
    assert_eq!(fs.open_files().open_instances(sector), 1);
    drop(handle_b);

    // 最后一次关闭之后位图立刻干净
    assert_eq!(fs.free_map_snapshot().count_clear(), baseline_clear + 2);
    assert!(fs.check());
}

#[test]
fn readers_see_single_writer_output() {
    const FILE_SIZE: usize = 256;
    const WRITES: usize = 10;
    const READS: usize = 100;

    let fs = fresh_fs();
    fs.create("/arena", FILE_SIZE).unwrap();

    // 写者把整个文件刷成同一个字节；读者任何时刻
    // 都只许看到某一次完整的写
    let writers: Vec<_> = (0..WRITES)
        .map(|i| {
            let fs = fs.clone();
            thread::spawn("writer", 0, move || {
                let file = fs.open("/arena").unwrap();
                let block = [b'a' + i as u8; FILE_SIZE];
                assert_eq!(file.write_at(&block, 0), FILE_SIZE);
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let fs = fs.clone();
            thread::spawn("reader", 0, move || {
                let file = fs.open("/arena").unwrap();
                for _ in 0..READS / 4 {
                    let mut buf = [0u8; FILE_SIZE];
                    assert_eq!(file.read_at(&mut buf, 0), FILE_SIZE);
                    // 不得混进两次写的字节
                    assert!(
                        buf.iter().all(|&b| b == buf[0]),
                        "torn read: saw {:?} and {:?}",
                        buf[0],
                        buf.iter().find(|&&b| b != buf[0])
                    );
                }
            })
        })
        .collect();

    for handle in writers {
        handle.join().unwrap();
    }
    for handle in readers {
        handle.join().unwrap();
    }
}

#[test]
fn directory_table_fills_up() {
    let fs = fresh_fs();

    // 根目录已有 `..` 一项
    for i in 0..NUM_DIR_ENTRIES - 1 {
        fs.create(&format!("/f{i}"), 0).unwrap();
    }
    assert_eq!(fs.create("/straw", 0), Err(FsError::DirectoryFull));
    assert!(fs.check());
}

#[test]
fn dot_dot_walks_up_the_tree() {
    let fs = fresh_fs();

    fs.create_dir("/a").unwrap();
    fs.create_dir("/a/b").unwrap();
    fs.create("/a/marker", 0).unwrap();

    fs.cd("/a/b").unwrap();
    assert!(fs.open("../marker").is_ok());
    fs.cd("..").unwrap();
    assert!(fs.open("marker").is_ok());
    fs.cd("..").unwrap();
    // 根的 `..` 还是根
    fs.cd("..").unwrap();
    assert!(fs.open("a/marker").is_ok());
}

#[test]
fn concurrent_creates_in_one_directory() {
    let fs = fresh_fs();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let fs = fs.clone();
            thread::spawn("creator", 0, move || fs.create(&format!("/c{i}"), 64))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    for i in 0..8 {
        assert!(fs.open(&format!("/c{i}")).is_ok());
    }
    assert!(fs.check());
}
