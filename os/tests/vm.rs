//! 虚存子系统：按需装载、FIFO换页、交换文件往返、
//! 只读页保护、地址空间拆除。跑在内存盘上。

use std::sync::Arc;

use block_dev::BlockDevice;
use os::config::{ReplacementPolicy, VmConfig, PAGE_SIZE};
use os::drivers::RamDisk;
use os::fs::FileSystem;
use os::memory::executable::EXEC_MAGIC;
use os::memory::machine::Stats;
use os::memory::mmu::{read_user, write_user};
use os::memory::{Executable, VmError, IN_SWAP};
use os::Kernel;
use sector_fs::{FsError, NUM_SECTORS};

fn boot(config: VmConfig) -> Arc<Kernel> {
    let _ = env_logger::builder().is_test(true).try_init();
    let device: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(NUM_SECTORS));
    Kernel::new(device, config, true)
}

/// 组装一个映像：代码从0起，已初始化数据紧随其后
fn install_program(fs: &Arc<FileSystem>, path: &str, code: &[u8], init_data: &[u8]) {
    let mut image = Vec::new();
    let header = Executable::HEADER_SIZE as u32;

    image.extend_from_slice(&EXEC_MAGIC.to_le_bytes());
    for (vaddr, in_file, size) in [
        (0u32, header, code.len() as u32),
        (code.len() as u32, header + code.len() as u32, init_data.len() as u32),
        ((code.len() + init_data.len()) as u32, 0, 0),
    ] {
        image.extend_from_slice(&vaddr.to_le_bytes());
        image.extend_from_slice(&in_file.to_le_bytes());
        image.extend_from_slice(&size.to_le_bytes());
    }
    image.extend_from_slice(code);
    image.extend_from_slice(init_data);

    fs.create(path, 0).unwrap();
    let mut file = fs.open(path).unwrap();
    assert_eq!(file.write(&image), image.len());
}

fn code_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 249) as u8 + 1).collect()
}

#[test]
fn fifo_paging_with_swap_round_trip() {
    let kernel = boot(VmConfig {
        num_phys_pages: 4,
        demand_loading: true,
        swap: true,
        use_tlb: true,
        policy: ReplacementPolicy::Fifo,
        ..VmConfig::default()
    });

    // 代码4页 + 用户栈8页 = 12页的地址空间，只有4个页帧
    let code = code_pattern(4 * PAGE_SIZE);
    install_program(&kernel.fs, "/prog", &code, &[]);
    let space = kernel.exec("/prog", 1).unwrap();
    assert_eq!(space.num_pages(), 12);

    // 前4次缺页都是从映像装载
    for vpn in 0..4 {
        let byte = read_user(&space, vpn * PAGE_SIZE).unwrap();
        assert_eq!(byte, code[vpn * PAGE_SIZE]);
    }
    assert_eq!(kernel.vm.coremap.owned_frames(1).len(), 4);
    assert_eq!(kernel.vm.coremap.count_clear(), 0);
    assert_eq!(Stats::count(&kernel.vm.stats.page_ins), 4);
    assert_eq!(Stats::count(&kernel.vm.stats.swap_writes), 0);

    // 第5页起要换页：装入次序最早的代码页逐个被逐出
    for vpn in 4..8 {
        write_user(&space, vpn * PAGE_SIZE, 0xa0 + vpn as u8).unwrap();
    }
    assert_eq!(Stats::count(&kernel.vm.stats.swap_writes), 4);
    assert_eq!(space.entry(0).ppn, IN_SWAP);
    assert_eq!(kernel.vm.coremap.owned_frames(1).len(), 4);

    // 被逐出的代码页读回来还是原来的字节
    assert_eq!(read_user(&space, 0).unwrap(), code[0]);

    // 栈页上的标记经过换出-换入仍逐字节一致
    for vpn in 4..8 {
        assert_eq!(read_user(&space, vpn * PAGE_SIZE).unwrap(), 0xa0 + vpn as u8);
    }
    assert!(Stats::count(&kernel.vm.stats.swap_reads) >= 4);
    assert!(Stats::count(&kernel.vm.stats.tlb_misses) > 0);

    drop(space);
    kernel.halt();
}

#[test]
fn out_of_frames_without_swap_is_fatal() {
    let kernel = boot(VmConfig {
        num_phys_pages: 4,
        demand_loading: true,
        swap: false,
        ..VmConfig::default()
    });

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 2).unwrap();

    // 栈页可写；代码页只读所以避开0号页
    for vpn in 1..5 {
        write_user(&space, vpn * PAGE_SIZE + 64, 1).unwrap_or_else(|_| {
            panic!("page {vpn} should still fit in memory")
        });
    }
    // 第5页装不下也换不出去
    assert!(matches!(
        write_user(&space, 5 * PAGE_SIZE, 1),
        Err(VmError::OutOfMemory)
    ));
}

#[test]
fn preload_whole_space_without_demand_loading() {
    let kernel = boot(VmConfig {
        demand_loading: false,
        swap: false,
        ..VmConfig::default()
    });

    let code = code_pattern(2 * PAGE_SIZE);
    let data = vec![0x5a; PAGE_SIZE];
    install_program(&kernel.fs, "/prog", &code, &data);
    let space = kernel.exec("/prog", 3).unwrap();

    // Exec一结束所有页都已驻留
    assert_eq!(
        kernel.vm.coremap.owned_frames(3).len(),
        space.num_pages()
    );
    assert_eq!(Stats::count(&kernel.vm.stats.page_ins), space.num_pages());

    // 代码与数据都装对了位置
    assert_eq!(read_user(&space, 0).unwrap(), code[0]);
    assert_eq!(read_user(&space, 2 * PAGE_SIZE).unwrap(), 0x5a);
}

#[test]
fn preload_with_too_few_frames_tears_down() {
    let kernel = boot(VmConfig {
        num_phys_pages: 4,
        demand_loading: false,
        swap: false,
        ..VmConfig::default()
    });

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let result = kernel.exec("/prog", 4);
    assert!(matches!(result, Err(VmError::OutOfMemory)));

    // 半成品已拆净：页帧全回来了，交换文件也没留下
    assert_eq!(kernel.vm.coremap.count_clear(), 4);
    assert_eq!(kernel.fs.open("/SWAP.4").err(), Some(FsError::NotFound));
    assert!(kernel.fs.check());
}

#[test]
fn store_to_code_page_kills_the_process() {
    let kernel = boot(VmConfig::default());

    install_program(&kernel.fs, "/prog", &code_pattern(2 * PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 5).unwrap();

    assert!(matches!(
        write_user(&space, 8, 0xff),
        Err(VmError::ReadOnlyViolation)
    ));
    // 读依旧合法
    assert!(read_user(&space, 8).is_ok());
}

#[test]
fn context_switch_flushes_tlb() {
    let kernel = boot(VmConfig::default());

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 6).unwrap();

    read_user(&space, 0).unwrap();
    assert!(kernel.vm.tlb.lookup(0).is_some());

    space.restore_state();
    assert!(kernel.vm.tlb.lookup(0).is_none());
}

#[test]
fn page_table_walk_mode_without_tlb() {
    let kernel = boot(VmConfig {
        use_tlb: false,
        ..VmConfig::default()
    });

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 7).unwrap();

    write_user(&space, 2 * PAGE_SIZE, 0x42).unwrap();
    assert_eq!(read_user(&space, 2 * PAGE_SIZE).unwrap(), 0x42);
    // 翻译从未经过TLB
    assert!(kernel.vm.tlb.lookup(2).is_none());
}

#[test]
fn exit_releases_frames_and_swap_file() {
    let kernel = boot(VmConfig::default());

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 8).unwrap();

    read_user(&space, 0).unwrap();
    assert!(kernel.fs.open("/SWAP.8").is_ok());
    assert!(kernel.vm.coremap.count_clear() < kernel.vm.config.num_phys_pages);

    drop(space);

    assert_eq!(
        kernel.vm.coremap.count_clear(),
        kernel.vm.config.num_phys_pages
    );
    assert_eq!(kernel.fs.open("/SWAP.8").err(), Some(FsError::NotFound));
    assert!(kernel.fs.check());
}

#[test]
fn bad_address_is_reported() {
    let kernel = boot(VmConfig::default());

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 9).unwrap();

    let way_out = space.num_pages() * PAGE_SIZE + PAGE_SIZE;
    assert!(matches!(
        read_user(&space, way_out),
        Err(VmError::BadAddress)
    ));
}

#[test]
fn two_processes_evict_each_other() {
    let kernel = boot(VmConfig {
        num_phys_pages: 4,
        demand_loading: true,
        swap: true,
        use_tlb: true,
        policy: ReplacementPolicy::Fifo,
        ..VmConfig::default()
    });

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let first = kernel.exec("/prog", 21).unwrap();
    let second = kernel.exec("/prog", 22).unwrap();

    // 甲进程在栈页上留下记号并占满内存
    for vpn in 1..5 {
        write_user(&first, vpn * PAGE_SIZE, 0x11).unwrap();
    }
    assert_eq!(kernel.vm.coremap.owned_frames(21).len(), 4);

    // 乙进程把甲全部挤出去；换出走的是甲自己的交换文件
    for vpn in 1..5 {
        write_user(&second, vpn * PAGE_SIZE, 0x22).unwrap();
    }
    assert_eq!(kernel.vm.coremap.owned_frames(21).len(), 0);
    assert_eq!(kernel.vm.coremap.owned_frames(22).len(), 4);
    assert_eq!(first.entry(1).ppn, IN_SWAP);

    // 双方的记号都经受住了往返
    for vpn in 1..5 {
        assert_eq!(read_user(&first, vpn * PAGE_SIZE).unwrap(), 0x11);
    }
    for vpn in 1..5 {
        assert_eq!(read_user(&second, vpn * PAGE_SIZE).unwrap(), 0x22);
    }

    // 甲退出不碰乙的页帧
    drop(first);
    assert_eq!(kernel.vm.coremap.owned_frames(22).len(), 4);
    assert!(kernel.fs.open("/SWAP.21").is_err());
}

#[test]
fn clock_policy_completes_under_pressure() {
    let kernel = boot(VmConfig {
        num_phys_pages: 4,
        demand_loading: true,
        swap: true,
        use_tlb: true,
        policy: ReplacementPolicy::Clock,
        ..VmConfig::default()
    });

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 23).unwrap();

    // 反复越过物理内存容量地触页，时钟指针必须总能找到牺牲帧
    for round in 0..3u8 {
        for vpn in 1..7 {
            write_user(&space, vpn * PAGE_SIZE, round).unwrap();
        }
        for vpn in 1..7 {
            assert_eq!(read_user(&space, vpn * PAGE_SIZE).unwrap(), round);
        }
    }
    assert_eq!(kernel.vm.coremap.owned_frames(23).len(), 4);
}

#[test]
fn random_policy_is_seeded_and_complete() {
    let kernel = boot(VmConfig {
        num_phys_pages: 4,
        demand_loading: true,
        swap: true,
        use_tlb: true,
        policy: ReplacementPolicy::Random,
        seed: 7,
        ..VmConfig::default()
    });

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 24).unwrap();

    for vpn in 1..8 {
        write_user(&space, vpn * PAGE_SIZE, vpn as u8).unwrap();
    }
    for vpn in 1..8 {
        assert_eq!(read_user(&space, vpn * PAGE_SIZE).unwrap(), vpn as u8);
    }
}

#[test]
fn user_transfer_round_trip() {
    use os::memory::transfer::{
        read_buffer_from_user, read_string_from_user, write_buffer_to_user,
    };

    let kernel = boot(VmConfig::default());
    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 25).unwrap();

    // 跨页边界写一段字符串再读回
    let vaddr = 2 * PAGE_SIZE - 4;
    write_buffer_to_user(&space, vaddr, b"boundary\0").unwrap();
    assert_eq!(
        read_string_from_user(&space, vaddr, 32).unwrap(),
        "boundary"
    );
    assert_eq!(
        read_buffer_from_user(&space, vaddr, 8).unwrap(),
        b"boundary"
    );

    // 上限之内等不到NUL就是坏指针
    write_buffer_to_user(&space, vaddr, b"unterminated").unwrap();
    assert!(matches!(
        read_string_from_user(&space, vaddr, 4),
        Err(VmError::BadAddress)
    ));
}

#[test]
fn initial_registers_point_at_entry_and_stack() {
    use os::memory::machine::{Registers, NEXT_PC_REG, PC_REG, STACK_REG};

    let kernel = boot(VmConfig::default());
    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 26).unwrap();

    let mut regs = Registers::new();
    space.init_registers(&mut regs);
    assert_eq!(regs.read(PC_REG), 0);
    assert_eq!(regs.read(NEXT_PC_REG), 4);
    assert_eq!(
        regs.read(STACK_REG) as usize,
        space.num_pages() * PAGE_SIZE - 16
    );
}

#[test]
fn coremap_and_page_tables_agree() {
    let kernel = boot(VmConfig {
        num_phys_pages: 4,
        demand_loading: true,
        swap: true,
        use_tlb: true,
        policy: ReplacementPolicy::Fifo,
        ..VmConfig::default()
    });

    install_program(&kernel.fs, "/prog", &code_pattern(PAGE_SIZE), &[]);
    let space = kernel.exec("/prog", 31).unwrap();

    for vpn in 1..7 {
        write_user(&space, vpn * PAGE_SIZE, 1).unwrap();
    }

    // 每个被占的帧，其属主页表都指回这个帧；反之亦然
    for frame in kernel.vm.coremap.owned_frames(31) {
        let info = kernel.vm.coremap.frame_info(frame);
        assert_eq!(info.owner, Some(31));
        assert_eq!(space.entry(info.vpn).ppn, frame as i32);
    }
    let resident: Vec<usize> = (0..space.num_pages())
        .filter(|&vpn| space.entry(vpn).is_resident())
        .collect();
    assert_eq!(resident.len(), kernel.vm.coremap.owned_frames(31).len());
    for vpn in resident {
        let frame = space.entry(vpn).ppn as usize;
        let info = kernel.vm.coremap.frame_info(frame);
        assert_eq!((info.owner, info.vpn), (Some(31), vpn));
    }
}
