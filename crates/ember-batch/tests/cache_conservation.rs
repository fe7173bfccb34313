//! Property tests for the spill-backed data cache: whatever goes in comes
//! back out, byte for byte, across every tier combination.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ember_batch::{DataCache, BUFFER_LIMIT, RAM_BATCH};

fn drain(cache: &mut DataCache) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let n = cache.get().expect("window load");
        if n == 0 {
            break;
        }
        out.extend_from_slice(cache.window());
        cache.remained(0, 0);
    }
    out
}

/// Chunk plans covering RAM-only, partial-fill, and direct-to-spill paths;
/// total stays under 4 * RAM_BATCH.
fn chunk_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(
        prop_oneof![
            1usize..64,
            4_000usize..12_000,
            (RAM_BATCH / 4)..(RAM_BATCH / 2),
        ],
        1..12,
    )
    .prop_filter("stay under the cache limit", |sizes| {
        sizes.iter().sum::<usize>() <= 4 * RAM_BATCH
    })
}

fn fill(sizes: &[usize], seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    sizes
        .iter()
        .map(|&len| (0..len).map(|_| rng.random()).collect())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn reads_partition_writes(sizes in chunk_sizes(), seed in any::<u64>()) {
        let chunks = fill(&sizes, seed);
        let mut cache = DataCache::new(BUFFER_LIMIT);
        let mut expected = Vec::new();
        for chunk in &chunks {
            cache.put(chunk).unwrap();
            expected.extend_from_slice(chunk);
        }
        prop_assert_eq!(cache.size(), expected.len() as u64);
        cache.done().unwrap();
        prop_assert_eq!(drain(&mut cache), expected);
    }

    #[test]
    fn alignment_padding_is_zero_filled(sizes in chunk_sizes(), seed in any::<u64>()) {
        let chunks = fill(&sizes, seed);
        let mut cache = DataCache::new(BUFFER_LIMIT);
        let mut expected = Vec::new();
        for chunk in &chunks {
            cache.align(8).unwrap();
            while expected.len() % 8 != 0 {
                expected.push(0);
            }
            cache.put(chunk).unwrap();
            expected.extend_from_slice(chunk);
        }
        cache.done().unwrap();
        prop_assert_eq!(drain(&mut cache), expected);
    }

    #[test]
    fn patched_length_lands_at_exact_offset(
        prefix in 0usize..6,
        payload_len in 1usize..9_000,
        patch in any::<u32>(),
        seed in any::<u64>(),
    ) {
        // A frame-shaped stream: some 8-aligned frames, then one whose
        // 4-byte length field at header offset 8 gets back-patched.
        let mut cache = DataCache::new(BUFFER_LIMIT);
        let mut expected = Vec::new();
        let filler = fill(&vec![48; prefix], seed);
        for chunk in &filler {
            cache.put(chunk).unwrap();
            expected.extend_from_slice(chunk);
        }

        let header_at = expected.len() as u64;
        let frame = fill(&[12 + payload_len], seed ^ 0x5EED)[0].clone();
        cache.put(&frame).unwrap();
        expected.extend_from_slice(&frame);

        cache.put_at(&patch.to_le_bytes(), header_at + 8).unwrap();
        expected[header_at as usize + 8..header_at as usize + 12]
            .copy_from_slice(&patch.to_le_bytes());

        cache.done().unwrap();
        prop_assert_eq!(drain(&mut cache), expected);
    }
}
