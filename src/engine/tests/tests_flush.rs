#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::config::{LevelOptions, Options, SinkOptions};
    use crate::engine::Lsmt;
    use crate::iterator::PairIterator;
    use crate::manifest;

    /// Options sized so a handful of writes crosses the flush threshold.
    fn tiny_options(dir: &TempDir) -> Options {
        Options {
            levels: vec![LevelOptions {
                block_size: 32,
                block_cache_size: 1024,
                block_cache_shards: 2,
                sst_size: 64,
                maximum_sst_files: 2,
                bloom_filter_size: 4096,
            }],
            sink: SinkOptions {
                block_size: 32,
                block_cache_size: 1024,
                block_cache_shards: 2,
                sst_size: 1 << 16,
                bloom_filter_size: 4096,
            },
            path: dir.path().to_string_lossy().into_owned(),
            memtable_maximum_size: 64,
            key_maximum_size: 10,
            value_maximum_size: 10,
        }
    }

    #[test]
    fn data_survives_close_and_reopen() {
        let dir = TempDir::new().unwrap();

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01; 6], vec![0x01; 6]).unwrap();
        store.close().unwrap();
        drop(store);

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        assert_eq!(store.get(&[0x01; 6]).unwrap(), Some(vec![0x01; 6]));
        store.close().unwrap();
    }

    #[test]
    fn many_writes_survive_background_flushes() {
        let dir = TempDir::new().unwrap();

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        // Well past several memtable thresholds, forcing background
        // flushes and level cascades along the way.
        for i in 0u8..64 {
            store.write(vec![0x10, i], vec![i, i, i]).unwrap();
        }
        // Everything is readable before close, wherever it lives.
        for i in 0u8..64 {
            assert_eq!(
                store.get(&[0x10, i]).unwrap(),
                Some(vec![i, i, i]),
                "key {i} before close"
            );
        }
        store.close().unwrap();
        drop(store);

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        for i in 0u8..64 {
            assert_eq!(
                store.get(&[0x10, i]).unwrap(),
                Some(vec![i, i, i]),
                "key {i} after reopen"
            );
        }
        store.close().unwrap();
    }

    #[test]
    fn close_writes_a_manifest() {
        let dir = TempDir::new().unwrap();
        let path = tiny_options(&dir).path.clone();

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01], vec![0x01]).unwrap();
        store.close().unwrap();

        let manifest = manifest::most_recent_manifest(&path).unwrap().unwrap();
        assert!(manifest.version >= 1);
        // One configured level plus the sink.
        assert_eq!(manifest.levels.len(), 2);
    }

    #[test]
    fn deletes_survive_the_flush_boundary() {
        let dir = TempDir::new().unwrap();

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01], vec![0x01]).unwrap();
        store.write(vec![0x02], vec![0x02]).unwrap();
        store.close().unwrap();
        drop(store);

        // Delete one flushed key, close (flushing the tombstone), reopen.
        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.delete(vec![0x01]).unwrap();
        assert_eq!(store.get(&[0x01]).unwrap(), None);
        store.close().unwrap();
        drop(store);

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        assert_eq!(store.get(&[0x01]).unwrap(), None);
        assert_eq!(store.get(&[0x02]).unwrap(), Some(vec![0x02]));
        store.close().unwrap();
    }

    #[test]
    fn overwrites_survive_the_flush_boundary() {
        let dir = TempDir::new().unwrap();

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01], vec![0x01]).unwrap();
        store.close().unwrap();
        drop(store);

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01], vec![0xff]).unwrap();
        assert_eq!(store.get(&[0x01]).unwrap(), Some(vec![0xff]));
        store.close().unwrap();
        drop(store);

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        assert_eq!(store.get(&[0x01]).unwrap(), Some(vec![0xff]));
        store.close().unwrap();
    }

    #[test]
    fn iterator_spans_memtable_and_levels() {
        let dir = TempDir::new().unwrap();

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01], vec![0x01]).unwrap();
        store.write(vec![0x03], vec![0x03]).unwrap();
        store.close().unwrap();
        drop(store);

        // One key on disk, one fresh in the memtable.
        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x02], vec![0x02]).unwrap();

        let mut iter = store.iterator(&[0x01], &[0x03]).unwrap();
        let mut read = Vec::new();
        while iter.next().unwrap() {
            read.push(iter.get().unwrap().unwrap());
        }
        iter.close().unwrap();

        let keys: Vec<_> = read.iter().map(|pair| pair.key.clone()).collect();
        assert_eq!(keys, vec![vec![0x01], vec![0x02], vec![0x03]]);
        store.close().unwrap();
    }

    #[test]
    fn memtable_shadows_flushed_values_in_scans() {
        let dir = TempDir::new().unwrap();

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01], vec![0x01]).unwrap();
        store.close().unwrap();
        drop(store);

        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01], vec![0xff]).unwrap();

        let mut iter = store.iterator(&[0x01], &[0x02]).unwrap();
        assert!(iter.next().unwrap());
        assert_eq!(iter.get().unwrap().unwrap().value, vec![0xff]);
        assert!(!iter.next().unwrap());
        store.close().unwrap();
    }

    #[test]
    fn close_twice_is_harmless() {
        let dir = TempDir::new().unwrap();
        let store = Lsmt::open(tiny_options(&dir)).unwrap();
        store.write(vec![0x01], vec![0x01]).unwrap();
        store.close().unwrap();
        store.close().unwrap();
    }
}
