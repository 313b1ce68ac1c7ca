/// Compare a client-supplied credential digest with the stored one.
///
/// Digests are opaque: equality is exact byte equality, evaluated in
/// constant time over the common length so the comparison does not leak
/// how many leading bytes matched.
pub fn digests_match(provided: &[u8], stored: &[u8]) -> bool {
    provided.len() == stored.len()
        && provided
            .iter()
            .zip(stored.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
