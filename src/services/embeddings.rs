//! Embeddings provider seam for the Vector Store (§4.6). No concrete
//! embedding API is specified, so the default implementation is a
//! deterministic offline hashing embedder — stable across runs, no network
//! dependency, good enough for cosine-similarity retrieval over our own
//! corpus without committing to a specific vendor.

pub const EMBEDDING_DIM: usize = 256;

pub trait Embeddings: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Hashes overlapping word shingles into a fixed-size bag-of-features vector,
/// then L2-normalizes it so cosine distance behaves sensibly.
pub struct HashingEmbeddings;

impl Embeddings for HashingEmbeddings {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        for token in text.to_lowercase().split_whitespace() {
            let bucket = fnv1a(token) as usize % EMBEDDING_DIM;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let e = HashingEmbeddings;
        assert_eq!(e.embed("hello world"), e.embed("hello world"));
    }

    #[test]
    fn embedding_is_unit_length() {
        let e = HashingEmbeddings;
        let v = e.embed("some page title about widgets");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
