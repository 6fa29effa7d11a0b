//! Identifier generation for tags, Call-IDs and Via branches

use rand::Rng;
use uuid::Uuid;

/// RFC 3261 magic cookie that prefixes every compliant branch
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// A random From/To tag
pub fn generate_tag() -> String {
    let mut rng = rand::thread_rng();
    format!("{:08x}", rng.gen::<u32>())
}

/// A globally unique Call-ID
pub fn generate_call_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A globally unique Via branch carrying the magic cookie
pub fn generate_branch() -> String {
    format!("{}{}", BRANCH_MAGIC_COOKIE, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_values_are_distinct() {
        assert_ne!(generate_call_id(), generate_call_id());
        assert_ne!(generate_branch(), generate_branch());
        assert_eq!(generate_tag().len(), 8);
        assert!(generate_branch().starts_with(BRANCH_MAGIC_COOKIE));
    }
}
