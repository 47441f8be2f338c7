use serde::{Deserialize, Serialize};

/// 分页配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PaginationConfig {
    pub default_page: u64,
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page: 1,
            default_limit: 50,
            max_limit: 100,
        }
    }
}

/// 规范化之后的分页参数，`page` 从 1 开始
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    /// 从查询字符串中的原始值构造
    ///
    /// - limit 缺失、不是数字或为 0 时取默认值；负数取 1；超过上限取上限
    /// - page 缺失、不是数字或为 0 时取默认值；负数取 1
    pub fn from_raw(page: Option<&str>, limit: Option<&str>, config: &PaginationConfig) -> Self {
        let max_limit = config.max_limit.max(1);
        let limit = match parse(limit) {
            None | Some(0) => config.default_limit,
            Some(n) if n < 0 => 1,
            Some(n) => n as u64,
        }
        .clamp(1, max_limit);

        let page = match parse(page) {
            None | Some(0) => config.default_page,
            Some(n) if n < 0 => 1,
            Some(n) => n as u64,
        }
        .max(1);

        Self { page, limit }
    }

    /// 跳过的记录数，不超过 `i64::MAX`，保证可以作为 SQL 的 OFFSET
    pub fn offset(&self) -> u64 {
        (self.page - 1)
            .saturating_mul(self.limit)
            .min(i64::MAX as u64)
    }

    pub fn info(&self, total: u64) -> PageInfo {
        PageInfo {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: total.div_ceil(self.limit),
        }
    }
}

fn parse(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

/// 分页信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}
