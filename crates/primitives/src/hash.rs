use hybridd_consensus::Hash256;
use ripemd::{Digest, Ripemd160};
use sha2::Sha256;

pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

pub fn sha256d(data: &[u8]) -> Hash256 {
    Sha256::digest(Sha256::digest(data)).into()
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybridd_consensus::hash256_to_hex;

    #[test]
    fn sha256d_of_empty_input() {
        // Internal byte order, so the display form is reversed.
        assert_eq!(
            hash256_to_hex(&sha256d(b"")),
            "56944c5d3f98413ef45cf54545538103cc9f298e0575820ad3591376e2e0f65d"
        );
    }
}
