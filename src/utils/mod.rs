//! Small helpers shared by the domain and the HTTP modules.

use uuid::Uuid;

/// Time-ordered identifier for new documents.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_parse_as_uuids() {
        let (a, b) = (new_id(), new_id());
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
