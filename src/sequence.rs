//! File-to-frame preparation for the send side.
//!
//! Before a transfer starts, the server reads the whole requested file and
//! cuts it into a [`TransferSequence`]: an ordered run of ready-to-send TRN
//! frames, each carrying up to [`MAX_PAYLOAD`] bytes, followed by one
//! zero-length TRN sentinel that tells the receiver the stream is complete.
//!
//! ```text
//!  file bytes:  [..........................................]
//!                ▼ chunk      ▼ chunk      ▼ chunk
//!  frames:      TRN seq=0    TRN seq=1    TRN seq=2    TRN seq=3 (len=0)
//!                                                      └─ sentinel
//! ```
//!
//! Wire sequence numbers wrap modulo [`SEQ_SPACE`], so frame `i` carries
//! `i % 32` on the wire while the window bookkeeping tracks the unwrapped
//! index.  Checksums are computed here, once, at frame construction; a
//! retransmitted frame is bit-identical to the first transmission.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::packet::{Packet, PacketType, MAX_PAYLOAD, SEQ_SPACE};

/// All TRN frames for one file, in transmission order, sentinel included.
#[derive(Debug, Clone)]
pub struct TransferSequence {
    frames: Vec<Packet>,
    total_bytes: usize,
}

impl TransferSequence {
    /// Chunk an in-memory byte slice into frames plus the trailing sentinel.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut frames: Vec<Packet> = data
            .chunks(MAX_PAYLOAD)
            .enumerate()
            .map(|(i, chunk)| Packet::data(PacketType::Trn, wire_seq(i), chunk))
            .collect();
        frames.push(Packet::control(PacketType::Trn, wire_seq(frames.len())));

        TransferSequence {
            frames,
            total_bytes: data.len(),
        }
    }

    /// Read `reader` to the end and chunk the contents.
    ///
    /// The whole file is buffered up front: retransmission needs random
    /// access to any frame still inside the window, and the transfers this
    /// protocol is built for are small enough to hold in memory.
    pub async fn from_reader<R>(reader: &mut R) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(Self::from_bytes(&data))
    }

    /// Number of frames in the sequence, sentinel included.  Always ≥ 1.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Size of the original file in bytes.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// The frame at unwrapped index `index`, or `None` past the sentinel.
    pub fn frame(&self, index: usize) -> Option<&Packet> {
        self.frames.get(index)
    }
}

/// Wire sequence number for unwrapped frame index `i`.
fn wire_seq(i: usize) -> u8 {
    (i % SEQ_SPACE as usize) as u8
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn small_file_is_one_frame_plus_sentinel() {
        let seq = TransferSequence::from_bytes(b"hello");
        assert_eq!(seq.frame_count(), 2);
        assert_eq!(seq.total_bytes(), 5);

        let data = seq.frame(0).unwrap();
        assert_eq!(data.kind, PacketType::Trn);
        assert_eq!(data.sequence, 0);
        assert_eq!(data.payload, b"hello");

        let sentinel = seq.frame(1).unwrap();
        assert!(sentinel.is_sentinel());
        assert_eq!(sentinel.sequence, 1);
    }

    #[test]
    fn empty_input_yields_only_the_sentinel() {
        let seq = TransferSequence::from_bytes(&[]);
        assert_eq!(seq.frame_count(), 1);
        assert_eq!(seq.total_bytes(), 0);
        assert!(seq.frame(0).unwrap().is_sentinel());
    }

    #[test]
    fn exact_multiple_of_frame_capacity_keeps_sentinel_separate() {
        let data = vec![0xAB_u8; MAX_PAYLOAD * 3];
        let seq = TransferSequence::from_bytes(&data);
        assert_eq!(seq.frame_count(), 4);
        for i in 0..3 {
            assert_eq!(seq.frame(i).unwrap().length as usize, MAX_PAYLOAD);
        }
        assert!(seq.frame(3).unwrap().is_sentinel());
        assert_eq!(seq.frame(3).unwrap().sequence, 3);
    }

    #[test]
    fn short_tail_chunk_keeps_its_own_frame() {
        let data = vec![1_u8; MAX_PAYLOAD + 10];
        let seq = TransferSequence::from_bytes(&data);
        assert_eq!(seq.frame_count(), 3);
        assert_eq!(seq.frame(0).unwrap().length as usize, MAX_PAYLOAD);
        assert_eq!(seq.frame(1).unwrap().length, 10);
    }

    #[test]
    fn wire_sequence_wraps_modulo_thirty_two() {
        // 40 full chunks: indices 0..39, so seq must wrap at 32.
        let data = vec![0_u8; MAX_PAYLOAD * 40];
        let seq = TransferSequence::from_bytes(&data);
        assert_eq!(seq.frame_count(), 41);
        assert_eq!(seq.frame(31).unwrap().sequence, 31);
        assert_eq!(seq.frame(32).unwrap().sequence, 0);
        assert_eq!(seq.frame(39).unwrap().sequence, 7);
        // Sentinel is index 40 -> wire seq 8.
        assert_eq!(seq.frame(40).unwrap().sequence, 8);
    }

    #[test]
    fn frames_reassemble_to_the_original_bytes() {
        let data: Vec<u8> = (0..2000_u32).map(|i| (i % 251) as u8).collect();
        let seq = TransferSequence::from_bytes(&data);

        let mut rebuilt = Vec::new();
        for i in 0..seq.frame_count() {
            rebuilt.extend_from_slice(&seq.frame(i).unwrap().payload);
        }
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn out_of_range_index_is_none() {
        let seq = TransferSequence::from_bytes(b"x");
        assert!(seq.frame(2).is_none());
    }

    #[tokio::test]
    async fn from_reader_matches_from_bytes() {
        let data = vec![0x42_u8; 1200];
        let mut slice: &[u8] = &data;
        let from_reader = TransferSequence::from_reader(&mut slice).await.unwrap();
        let from_bytes = TransferSequence::from_bytes(&data);

        assert_eq!(from_reader.frame_count(), from_bytes.frame_count());
        for i in 0..from_reader.frame_count() {
            assert_eq!(from_reader.frame(i), from_bytes.frame(i));
        }
    }

    #[tokio::test]
    async fn from_reader_reads_a_real_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![7_u8; MAX_PAYLOAD + 1]).unwrap();
        tmp.flush().unwrap();

        let mut file = tokio::fs::File::open(tmp.path()).await.unwrap();
        let seq = TransferSequence::from_reader(&mut file).await.unwrap();
        assert_eq!(seq.frame_count(), 3);
        assert_eq!(seq.total_bytes(), MAX_PAYLOAD + 1);
    }
}
