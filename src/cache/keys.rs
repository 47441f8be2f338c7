use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::database::FieldValue;

/// 缓存键前缀
const CACHE_PREFIX: &str = "cache:";

/// 限流计数键前缀
const ADMISSION_POINTS_PREFIX: &str = "admission:points:";

/// 限流封禁键前缀
const ADMISSION_BLOCK_PREFIX: &str = "admission:block:";

/// 资源族下所有缓存键的公共前缀
///
/// 资源族名称不能包含 `:`，否则会和其他资源族的前缀重叠。
pub fn family_prefix(family: &str) -> String {
    debug_assert!(!family.contains(':'), "resource family must not contain ':'");
    format!("{}{}:", CACHE_PREFIX, family)
}

/// 由 (资源族, 操作, 有序参数) 生成缓存键
///
/// 参数先编码成带类型标记的 JSON 数组再取 SHA-256，
/// 所以 `("ab", "c")` 和 `("a", "bc")`、文本 `"1"` 和整数 `1` 都不会得到同一个键。
pub fn cache_key(family: &str, operation: &str, params: &[FieldValue]) -> String {
    #[derive(Serialize)]
    struct Encoded<'a> {
        op: &'a str,
        params: &'a [FieldValue],
    }

    // FieldValue 只包含可序列化的基本类型，这里不会失败
    let encoded = serde_json::to_vec(&Encoded {
        op: operation,
        params,
    })
    .unwrap_or_default();
    let digest = Sha256::digest(&encoded);

    format!("{}{}:{:x}", family_prefix(family), operation, digest)
}

/// 客户端当前窗口的计数键
pub fn admission_points_key(client_key: &str) -> String {
    format!("{}{}", ADMISSION_POINTS_PREFIX, client_key)
}

/// 客户端的封禁键
pub fn admission_block_key(client_key: &str) -> String {
    format!("{}{}", ADMISSION_BLOCK_PREFIX, client_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn same_inputs_yield_same_key() {
        let a = cache_key("user", "findOneBy", &[text("email"), text("a@b.c")]);
        let b = cache_key("user", "findOneBy", &[text("email"), text("a@b.c")]);
        assert_eq!(a, b);
        assert!(a.starts_with("cache:user:findOneBy:"));
    }

    #[test]
    fn substring_overlap_does_not_collide() {
        let a = cache_key("user", "findOneBy", &[text("ab"), text("c")]);
        let b = cache_key("user", "findOneBy", &[text("a"), text("bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn value_types_are_part_of_the_key() {
        let a = cache_key("user", "findOneBy", &[text("id"), text("1")]);
        let b = cache_key("user", "findOneBy", &[text("id"), FieldValue::Int(1)]);
        assert_ne!(a, b);

        let id = Uuid::new_v4();
        let c = cache_key("user", "findOneBy", &[text("id"), FieldValue::Uuid(id)]);
        let d = cache_key("user", "findOneBy", &[text("id"), text(&id.to_string())]);
        assert_ne!(c, d);
    }

    #[test]
    fn parameter_order_matters() {
        let a = cache_key("user", "op", &[text("x"), text("y")]);
        let b = cache_key("user", "op", &[text("y"), text("x")]);
        assert_ne!(a, b);
    }

    #[test]
    fn keys_live_under_their_family_prefix() {
        let key = cache_key("user", "findOneBy", &[]);
        assert!(key.starts_with(&family_prefix("user")));
        assert!(!key.starts_with(&family_prefix("users")));
    }

    #[test]
    fn admission_keys_are_disjoint() {
        assert_ne!(admission_points_key("::1"), admission_block_key("::1"));
        assert_eq!(admission_points_key("10.0.0.1"), "admission:points:10.0.0.1");
    }
}
