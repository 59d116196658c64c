pub mod local;
pub mod provider;

pub use local::*;
pub use provider::*;

use uuid::Uuid;

/// New opaque blob location, sharded by the first two hex digits
pub fn new_blob_location() -> String {
    let blob_id = Uuid::new_v4().simple().to_string();
    format!("{}/{}", &blob_id[..2], blob_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_locations_are_sharded_and_unique() {
        let a = new_blob_location();
        let b = new_blob_location();
        assert_ne!(a, b);
        let (shard, name) = a.split_once('/').unwrap();
        assert_eq!(shard.len(), 2);
        assert!(name.starts_with(shard));
        assert_eq!(name.len(), 32);
    }
}
