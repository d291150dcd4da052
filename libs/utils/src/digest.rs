use sha2::{Digest, Sha256};

/// Hashes `fields` and returns the lowercase hex SHA-256.
///
/// Each field is preceded by its byte length (u64, big-endian), so no
/// content of one field can shift into its neighbour.
pub fn sha256_fields<I, T>(fields: I) -> String
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut hasher = Sha256::new();
    for field in fields {
        let field = field.as_ref();
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field);
    }

    hex::encode(hasher.finalize())
}
