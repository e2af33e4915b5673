// src/utils.rs
// Utility functions for the address balance monitor

/// Splits `items` into consecutive chunks of at most `chunk_size`, preserving order.
/// A `chunk_size` of 0 is treated as 1.
pub fn create_chunks<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    items
        .chunks(chunk_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("addr{i:03}")).collect()
    }

    #[test]
    fn test_120_addresses_make_50_50_20() {
        let chunks = create_chunks(&addresses(120), 50);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![50, 50, 20]);
    }

    #[test]
    fn test_chunks_reconstruct_input() {
        for n in [0, 1, 49, 50, 51, 99, 100, 101, 257] {
            let input = addresses(n);
            for size in [1, 7, 50] {
                let chunks = create_chunks(&input, size);
                assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
                let flat: Vec<String> = chunks.into_iter().flatten().collect();
                assert_eq!(flat, input);
                assert!(flat.iter().all_unique());
            }
        }
    }

    #[test]
    fn test_zero_chunk_size() {
        let chunks = create_chunks(&addresses(3), 0);
        assert_eq!(chunks.len(), 3);
    }
}
