use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 磁盘镜像工具：格式化、存取文件、列目录、一致性检查
#[derive(Parser)]
pub struct Cli {
    /// 磁盘镜像文件
    #[arg(long, short)]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// 格式化为空文件系统
    Format,
    /// 建目录
    Mkdir { path: String },
    /// 把宿主文件放进镜像
    Put { source: PathBuf, path: String },
    /// 把宿主文件包成用户程序映像（纯代码段）放进镜像
    PutExec { source: PathBuf, path: String },
    /// 把镜像里的文件取到宿主
    Get { path: String, dest: PathBuf },
    /// 列目录
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// 一致性检查
    Check,
}
