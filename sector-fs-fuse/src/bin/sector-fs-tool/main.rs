mod cli;

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use log::error;

use cli::{Cli, Command};
use os::fs::FileSystem;
use os::memory::executable::EXEC_MAGIC;
use os::memory::Executable;
use sector_fs::{NUM_SECTORS, SECTOR_SIZE};
use sector_fs_fuse::SectorFile;

fn main() -> io::Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    let device = Arc::new(SectorFile(Mutex::new({
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&cli.image)?;
        fd.set_len((NUM_SECTORS * SECTOR_SIZE) as u64)?;
        fd
    })));

    let fs = FileSystem::new(device, matches!(cli.command, Command::Format));

    match cli.command {
        Command::Format => {
            println!("formatted {:?}: {} sectors", cli.image, NUM_SECTORS);
        }
        Command::Mkdir { path } => {
            if let Err(err) = fs.create_dir(&path) {
                error!("mkdir {path:?}: {err}");
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Put { source, path } => {
            let mut bytes = Vec::new();
            std::fs::File::open(&source)?.read_to_end(&mut bytes)?;

            if let Err(err) = fs.create(&path, 0) {
                error!("create {path:?}: {err}");
                return Ok(ExitCode::FAILURE);
            }
            let mut file = fs.open(&path).expect("file was just created");
            let written = file.write(&bytes);
            if written < bytes.len() {
                error!("put {path:?}: short write, {written} of {} bytes", bytes.len());
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::PutExec { source, path } => {
            let mut code = Vec::new();
            std::fs::File::open(&source)?.read_to_end(&mut code)?;

            // 40字节映像头：魔数 + 代码/已初始化/未初始化三段
            let mut image = Vec::with_capacity(Executable::HEADER_SIZE + code.len());
            image.extend_from_slice(&EXEC_MAGIC.to_le_bytes());
            for (vaddr, in_file, size) in [
                (0u32, Executable::HEADER_SIZE as u32, code.len() as u32),
                (code.len() as u32, 0, 0),
                (code.len() as u32, 0, 0),
            ] {
                image.extend_from_slice(&vaddr.to_le_bytes());
                image.extend_from_slice(&in_file.to_le_bytes());
                image.extend_from_slice(&size.to_le_bytes());
            }
            image.extend_from_slice(&code);

            if let Err(err) = fs.create(&path, 0) {
                error!("create {path:?}: {err}");
                return Ok(ExitCode::FAILURE);
            }
            let mut file = fs.open(&path).expect("file was just created");
            if file.write(&image) < image.len() {
                error!("put-exec {path:?}: image does not fit");
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Get { path, dest } => {
            let Ok(file) = fs.open(&path) else {
                error!("no such file: {path:?}");
                return Ok(ExitCode::FAILURE);
            };
            std::fs::File::create(&dest)?.write_all(&file.read_all())?;
        }
        Command::Ls { path } => {
            if let Err(err) = fs.cd(&path) {
                error!("ls {path:?}: {err}");
                return Ok(ExitCode::FAILURE);
            }
            for (name, is_dir) in fs.list_entries() {
                if is_dir {
                    println!("{name}/");
                } else {
                    println!("{name}");
                }
            }
        }
        Command::Check => {
            if !fs.check() {
                error!("file system check failed");
                return Ok(ExitCode::FAILURE);
            }
            println!("file system is consistent");
        }
    }

    Ok(ExitCode::SUCCESS)
}
