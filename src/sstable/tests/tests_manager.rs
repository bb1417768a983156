#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::error::StoreError;
    use crate::iterator::{PairIterator, TOMBSTONE};
    use crate::manifest::{self, Manifest};
    use crate::memtable::Memtable;
    use crate::sstable::tests::helpers::{dir_str, small_options, write_ssts};
    use crate::sstable::SstManager;

    /// Builds a manifest-backed manager whose levels hold the given
    /// pre-sorted pair lists.
    fn manager_with_levels(
        dir: &str,
        levels: &[&[(Vec<u8>, Vec<u8>)]],
    ) -> SstManager {
        let options = small_options(dir, 1 << 16, 4);
        let mut level_paths = Vec::new();
        for pairs in levels {
            let params = options.level_params(level_paths.len());
            let ssts = write_ssts(dir, params, pairs);
            level_paths.push(ssts.iter().map(|sst| sst.path().to_string()).collect());
        }
        let manifest = Manifest {
            version: 1,
            levels: level_paths,
        };
        manifest::write_manifest(&manifest::manifest_path(dir, 1), &manifest.levels).unwrap();
        SstManager::open(manifest, &options).unwrap()
    }

    fn memtable_of(pairs: &[(Vec<u8>, Vec<u8>)]) -> Arc<Memtable> {
        let memtable = Memtable::new();
        for (key, value) in pairs {
            memtable.write(key.clone(), value.clone()).unwrap();
        }
        Arc::new(memtable)
    }

    // ------------------------------------------------------------------
    // Point lookup
    // ------------------------------------------------------------------

    #[test]
    fn get_finds_keys_in_any_level() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with_levels(
            &dir_str(&dir),
            &[
                &[(vec![1u8], vec![0x0a]), (vec![3], vec![0x0c])],
                &[(vec![2u8], vec![0x0b]), (vec![4], vec![0x0d])],
            ],
        );

        assert_eq!(manager.get(&[1]).unwrap(), Some(vec![0x0a]));
        assert_eq!(manager.get(&[2]).unwrap(), Some(vec![0x0b]));
        assert_eq!(manager.get(&[3]).unwrap(), Some(vec![0x0c]));
        assert_eq!(manager.get(&[4]).unwrap(), Some(vec![0x0d]));
        assert_eq!(manager.get(&[5]).unwrap(), None);
    }

    #[test]
    fn shallower_level_wins() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with_levels(
            &dir_str(&dir),
            &[
                &[(vec![1u8], vec![0xaa])],
                &[(vec![1u8], vec![0xbb])],
            ],
        );
        assert_eq!(manager.get(&[1]).unwrap(), Some(vec![0xaa]));
    }

    #[test]
    fn tombstones_are_returned_as_is() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with_levels(
            &dir_str(&dir),
            &[
                &[(vec![1u8], Vec::new())],
                &[(vec![1u8], vec![0xbb])],
            ],
        );
        // The manager does not interpret deletion markers.
        assert_eq!(manager.get(&[1]).unwrap(), Some(TOMBSTONE.to_vec()));
    }

    #[test]
    fn repeated_gets_ride_the_block_cache() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with_levels(&dir_str(&dir), &[&[(vec![1u8], vec![0x0a])]]);

        for _ in 0..16 {
            assert_eq!(manager.get(&[1]).unwrap(), Some(vec![0x0a]));
        }
    }

    // ------------------------------------------------------------------
    // Range iteration
    // ------------------------------------------------------------------

    #[test]
    fn iterator_merges_levels_in_priority_order() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with_levels(
            &dir_str(&dir),
            &[
                &[(vec![1u8], vec![0xaa]), (vec![3], vec![0x03])],
                &[(vec![1u8], vec![0xbb]), (vec![2], vec![0x02])],
            ],
        );

        let mut iter = manager.iterator(&[1], &[3]).unwrap();
        let mut read = Vec::new();
        while iter.next().unwrap() {
            read.push(iter.get().unwrap().unwrap());
        }
        iter.close().unwrap();

        assert_eq!(read.len(), 3);
        assert_eq!(read[0].key, vec![1]);
        assert_eq!(read[0].value, vec![0xaa]);
        assert_eq!(read[1].key, vec![2]);
        assert_eq!(read[2].key, vec![3]);
    }

    #[test]
    fn iterator_hides_deletions() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with_levels(
            &dir_str(&dir),
            &[&[(vec![1u8], vec![0x01]), (vec![2], Vec::new()), (vec![3], vec![0x03])]],
        );

        let mut iter = manager.iterator(&[1], &[3]).unwrap();
        let mut keys = Vec::new();
        while iter.next().unwrap() {
            keys.push(iter.get().unwrap().unwrap().key);
        }
        assert_eq!(keys, vec![vec![1], vec![3]]);
    }

    // ------------------------------------------------------------------
    // Flush pipeline
    // ------------------------------------------------------------------

    #[test]
    fn flush_requires_a_source() {
        let dir = TempDir::new().unwrap();
        let options = small_options(&dir_str(&dir), 1 << 16, 4);
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();
        assert!(matches!(manager.flush(&[]), Err(StoreError::EmptyFlush)));
    }

    #[test]
    fn first_flush_fills_the_first_level() {
        let dir = TempDir::new().unwrap();
        let options = small_options(&dir_str(&dir), 1 << 16, 4);
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();

        let memtable = memtable_of(&[(vec![1u8], vec![0x01]), (vec![2], vec![0x02])]);
        let flushed = manager.flush(&[memtable]).unwrap();

        assert_eq!(flushed.manifest_version(), 1);
        assert_eq!(flushed.get(&[1]).unwrap(), Some(vec![0x01]));
        assert_eq!(flushed.get(&[2]).unwrap(), Some(vec![0x02]));
        assert_eq!(flushed.get(&[3]).unwrap(), None);

        // The manifest on disk matches what the manager reopened.
        let manifest = manifest::most_recent_manifest(&dir_str(&dir))
            .unwrap()
            .unwrap();
        assert_eq!(manifest.version, 1);
        // One configured level plus the sink.
        assert_eq!(manifest.levels.len(), 2);
        assert_eq!(manifest.levels[0].len(), 1);
        assert!(manifest.levels[1].is_empty());
    }

    #[test]
    fn repeated_flushes_bump_the_version_and_merge() {
        let dir = TempDir::new().unwrap();
        let options = small_options(&dir_str(&dir), 1 << 16, 4);
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();

        let first = manager
            .flush(&[memtable_of(&[(vec![1u8], vec![0x01])])])
            .unwrap();
        let second = first
            .flush(&[memtable_of(&[(vec![2u8], vec![0x02])])])
            .unwrap();

        assert_eq!(second.manifest_version(), 2);
        assert_eq!(second.get(&[1]).unwrap(), Some(vec![0x01]));
        assert_eq!(second.get(&[2]).unwrap(), Some(vec![0x02]));
    }

    #[test]
    fn newer_memtables_shadow_level_contents() {
        let dir = TempDir::new().unwrap();
        let options = small_options(&dir_str(&dir), 1 << 16, 4);
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();

        let first = manager
            .flush(&[memtable_of(&[(vec![1u8], vec![0x01])])])
            .unwrap();
        let second = first
            .flush(&[memtable_of(&[(vec![1u8], vec![0xff])])])
            .unwrap();

        assert_eq!(second.get(&[1]).unwrap(), Some(vec![0xff]));
    }

    #[test]
    fn most_recent_memtable_wins_within_a_flush() {
        let dir = TempDir::new().unwrap();
        let options = small_options(&dir_str(&dir), 1 << 16, 4);
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();

        // Most recent first, as the engine queues them.
        let newest = memtable_of(&[(vec![1u8], vec![0xff])]);
        let oldest = memtable_of(&[(vec![1u8], vec![0x01]), (vec![2], vec![0x02])]);
        let flushed = manager.flush(&[newest, oldest]).unwrap();

        assert_eq!(flushed.get(&[1]).unwrap(), Some(vec![0xff]));
        assert_eq!(flushed.get(&[2]).unwrap(), Some(vec![0x02]));
    }

    #[test]
    fn overflow_cascades_into_the_sink() {
        let dir = TempDir::new().unwrap();
        // Level 0 holds at most one 20-byte SST: two blocks of two
        // four-byte records each.
        let options = small_options(&dir_str(&dir), 20, 1);
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();

        let pairs: Vec<_> = (0u8..10).map(|i| (vec![i], vec![i])).collect();
        let flushed = manager.flush(&[memtable_of(&pairs)]).unwrap();

        // Everything is readable, wherever it landed.
        for i in 0u8..10 {
            assert_eq!(flushed.get(&[i]).unwrap(), Some(vec![i]), "key {i}");
        }

        // The sink actually received the overflow.
        let manifest = manifest::most_recent_manifest(&dir_str(&dir))
            .unwrap()
            .unwrap();
        assert!(!manifest.levels[1].is_empty());
    }

    #[test]
    fn tombstones_survive_into_capped_levels() {
        let dir = TempDir::new().unwrap();
        let options = small_options(&dir_str(&dir), 1 << 16, 4);
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();

        let flushed = manager
            .flush(&[memtable_of(&[(vec![1u8], Vec::new())])])
            .unwrap();

        // The deletion marker sits in level 0, still masking.
        assert_eq!(flushed.get(&[1]).unwrap(), Some(TOMBSTONE.to_vec()));
    }

    #[test]
    fn tombstones_are_dropped_at_the_sink() {
        let dir = TempDir::new().unwrap();
        // No configured levels: flushes go straight to the sink.
        let mut options = small_options(&dir_str(&dir), 1 << 16, 4);
        options.levels.clear();
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();

        let flushed = manager
            .flush(&[memtable_of(&[
                (vec![1u8], vec![0x01]),
                (vec![2], Vec::new()),
            ])])
            .unwrap();

        assert_eq!(flushed.get(&[1]).unwrap(), Some(vec![0x01]));
        assert_eq!(flushed.get(&[2]).unwrap(), None);
    }

    #[test]
    fn sink_tombstone_masks_older_sink_values() {
        let dir = TempDir::new().unwrap();
        let mut options = small_options(&dir_str(&dir), 1 << 16, 4);
        options.levels.clear();
        let manager = SstManager::open(Manifest::empty(), &options).unwrap();

        // First flush lands the value in the sink; the second cascades a
        // deletion for it. The old value must not resurface.
        let first = manager
            .flush(&[memtable_of(&[(vec![1u8], vec![0x01])])])
            .unwrap();
        let second = first
            .flush(&[memtable_of(&[(vec![1u8], Vec::new())])])
            .unwrap();

        assert_eq!(second.get(&[1]).unwrap(), None);

        let manifest = manifest::most_recent_manifest(&dir_str(&dir))
            .unwrap()
            .unwrap();
        assert_eq!(manifest.version, 2);
        assert!(manifest.levels[0].is_empty());
    }
}
