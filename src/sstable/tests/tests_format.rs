#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::error::StoreError;
    use crate::sstable::tests::helpers::{byte_pairs, dir_str, params, write_ssts};
    use crate::sstable::{decode_record, Block, Sst};

    #[test]
    fn open_round_trips_the_block_index() {
        let dir = TempDir::new().unwrap();
        let written = write_ssts(&dir_str(&dir), params(10, 1 << 20), &byte_pairs(5));
        let sst = &written[0];

        let opened = Sst::open(sst.path()).unwrap();
        assert_eq!(opened.path(), sst.path());
        assert_eq!(opened.meta_offset, sst.meta_offset);
        assert_eq!(opened.blocks.len(), sst.blocks.len());
        for (read, wrote) in opened.blocks.iter().zip(&sst.blocks) {
            assert_eq!(read.start, wrote.start);
            assert_eq!(read.end, wrote.end);
            assert_eq!(read.used_bytes, wrote.used_bytes);
            assert_eq!(read.offset, wrote.offset);
        }
    }

    #[test]
    fn open_missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let path = format!("{}/missing.sst", dir_str(&dir));
        assert!(matches!(Sst::open(&path), Err(StoreError::Io(_))));
    }

    #[test]
    fn get_block_selects_by_key_range() {
        let dir = TempDir::new().unwrap();
        // Blocks: [0,1], [2,3], [4,4].
        let ssts = write_ssts(&dir_str(&dir), params(10, 1 << 20), &byte_pairs(5));
        let sst = &ssts[0];

        assert_eq!(sst.get_block(&[0]).unwrap().offset, 0);
        assert_eq!(sst.get_block(&[1]).unwrap().offset, 0);
        assert_eq!(sst.get_block(&[2]).unwrap().offset, 10);
        assert_eq!(sst.get_block(&[4]).unwrap().offset, 20);
        assert!(sst.get_block(&[5]).is_none());
    }

    #[test]
    fn get_block_misses_in_a_range_gap() {
        let dir = TempDir::new().unwrap();
        let pairs = vec![
            (vec![0u8], vec![0u8]),
            (vec![1], vec![1]),
            (vec![5], vec![5]),
            (vec![6], vec![6]),
        ];
        // Blocks: [0,1] and [5,6]; key 3 falls between them.
        let ssts = write_ssts(&dir_str(&dir), params(10, 1 << 20), &pairs);
        assert!(ssts[0].get_block(&[3]).is_none());
    }

    #[test]
    fn read_block_returns_exactly_the_used_bytes() {
        let dir = TempDir::new().unwrap();
        let ssts = write_ssts(&dir_str(&dir), params(10, 1 << 20), &byte_pairs(3));
        let sst = &ssts[0];

        let buf = sst.read_block(&sst.blocks[0]).unwrap();
        assert_eq!(buf.as_ref(), &[1, 0, 1, 0, 1, 1, 1, 1]);

        // The decoded records come back intact.
        let (first, next) = decode_record(&buf, 0).unwrap();
        assert_eq!(first.key, vec![0]);
        assert_eq!(first.value, vec![0]);
        let (second, end) = decode_record(&buf, next).unwrap();
        assert_eq!(second.key, vec![1]);
        assert_eq!(end, buf.len());
        assert!(decode_record(&buf, end).is_none());
    }

    #[test]
    fn short_read_is_a_block_underflow() {
        let dir = TempDir::new().unwrap();
        let ssts = write_ssts(&dir_str(&dir), params(10, 1 << 20), &byte_pairs(3));

        // A descriptor claiming more bytes than the file holds.
        let broken = Sst {
            file: Arc::clone(&ssts[0].file),
            blocks: vec![Block {
                start: vec![0],
                end: vec![2],
                used_bytes: 1 << 20,
                offset: 0,
            }],
            meta_offset: ssts[0].meta_offset,
        };
        let result = broken.read_block(&broken.blocks[0]);
        assert!(matches!(
            result,
            Err(StoreError::BlockUnderflow { expected, .. }) if expected == 1 << 20
        ));
    }

    #[test]
    fn bloom_filter_covers_every_key() {
        let dir = TempDir::new().unwrap();
        let ssts = write_ssts(&dir_str(&dir), params(10, 1 << 20), &byte_pairs(16));

        let filter = ssts[0].populate_bloom_filter(4096).unwrap();
        for i in 0u8..16 {
            assert!(filter.test(&[i]));
        }
    }

    #[test]
    fn decode_record_treats_zero_key_length_as_padding() {
        let buf = [1u8, 7, 1, 9, 0, 0, 0];
        let (pair, next) = decode_record(&buf, 0).unwrap();
        assert_eq!(pair.key, vec![7]);
        assert_eq!(pair.value, vec![9]);
        assert!(decode_record(&buf, next).is_none());
    }

    #[test]
    fn decode_record_reads_tombstones() {
        let buf = [1u8, 7, 0];
        let (pair, next) = decode_record(&buf, 0).unwrap();
        assert!(pair.is_tombstone());
        assert_eq!(next, 3);
    }
}
