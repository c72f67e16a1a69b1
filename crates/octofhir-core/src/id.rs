//! Identifier generation for runs and audit artifacts.

use uuid::Uuid;

/// Fresh random identifier, used to name audit artifacts.
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Fresh random identifier in its hyphenated string form.
pub fn generate_id() -> String {
    generate_uuid().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_uuid_is_v4() {
        assert_eq!(generate_uuid().get_version_num(), 4);
    }
}
