//! 路径的字符串侧工具；真正的逐级解析在门面里进行

/// `str` 上的路径拆解
pub trait Path {
    fn is_absolute(&self) -> bool;

    /// 去掉前导 `/` 后拆成 `(目录部分, 末项)`；
    /// 没有目录部分时目录为空串
    fn dir_file(&self) -> (&Self, &Self);
}

impl Path for str {
    #[inline]
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn dir_file(&self) -> (&Self, &Self) {
        let trimmed = self.trim_start_matches('/');
        trimmed.rsplit_once('/').unwrap_or(("", trimmed))
    }
}
