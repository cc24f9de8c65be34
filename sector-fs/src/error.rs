use core::fmt;

/// 文件系统操作的失败缘由，
/// 系统调用边界将其统一映射为 -1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    AlreadyExists,
    NotFound,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    /// 目录项表已满
    DirectoryFull,
    /// 空闲扇区不足
    NoSpace,
    /// 路径含有非目录的中间项，或形式非法
    PathInvalid,
    NameTooLong,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::AlreadyExists => "name already exists",
            Self::NotFound => "no such file or directory",
            Self::IsADirectory => "is a directory",
            Self::NotADirectory => "not a directory",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::DirectoryFull => "directory is full",
            Self::NoSpace => "no space left on disk",
            Self::PathInvalid => "invalid path",
            Self::NameTooLong => "file name too long",
        };
        f.write_str(reason)
    }
}
