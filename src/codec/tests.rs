//! Unit tests for the link framing codecs.
//!
//! Covers fixed-length chunking, delimiter scanning across read boundaries,
//! and residual-byte handling at end of stream.

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};

use super::*;

fn decode_all(decoder: &mut LinkDecoder, src: &mut BytesMut) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while let Some(frame) = decoder.decode(src).expect("decode should not fail") {
        frames.push(frame.to_vec());
    }
    frames
}

#[test]
fn fixed_length_emits_one_frame_per_chunk() {
    let mut decoder = LinkDecoder::new(FrameMode::fixed(4));
    let mut src = BytesMut::from(&b"abcdefgh"[..]);

    let frames = decode_all(&mut decoder, &mut src);
    assert_eq!(frames, vec![b"abcd".to_vec(), b"efgh".to_vec()]);
    assert!(src.is_empty());
}

#[test]
fn fixed_length_waits_for_full_frame() {
    let mut decoder = LinkDecoder::new(FrameMode::fixed(4));
    let mut src = BytesMut::from(&b"abc"[..]);

    assert!(decoder.decode(&mut src).expect("decode").is_none());
    src.extend_from_slice(b"defg");
    let frames = decode_all(&mut decoder, &mut src);
    assert_eq!(frames, vec![b"abcd".to_vec()]);
    assert_eq!(&src[..], b"efg");
}

#[test]
fn fixed_length_clamps_zero_to_one_byte() {
    let mut decoder = LinkDecoder::new(FrameMode::FixedLength(0));
    let mut src = BytesMut::from(&b"xy"[..]);

    let frames = decode_all(&mut decoder, &mut src);
    assert_eq!(frames, vec![b"x".to_vec(), b"y".to_vec()]);
}

#[rstest]
#[case(&b"\n"[..])]
#[case(&b"\r\n"[..])]
#[case(&b"::"[..])]
fn delimiter_is_never_part_of_a_frame(#[case] delimiter: &[u8]) {
    let mut decoder = LinkDecoder::new(FrameMode::delimited(delimiter));
    let mut src = BytesMut::new();
    src.extend_from_slice(b"one");
    src.extend_from_slice(delimiter);
    src.extend_from_slice(b"two");
    src.extend_from_slice(delimiter);

    let frames = decode_all(&mut decoder, &mut src);
    assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
    assert!(src.is_empty());
}

#[test]
fn delimiter_split_across_reads_is_found() {
    let mut decoder = LinkDecoder::new(FrameMode::delimited(&b"\r\n"[..]));
    let mut src = BytesMut::from(&b"hello\r"[..]);

    assert!(decoder.decode(&mut src).expect("decode").is_none());
    src.extend_from_slice(b"\nworld\r\n");

    let frames = decode_all(&mut decoder, &mut src);
    assert_eq!(frames, vec![b"hello".to_vec(), b"world".to_vec()]);
}

#[test]
fn back_to_back_delimiters_yield_empty_frames() {
    let mut decoder = LinkDecoder::new(FrameMode::delimited(&b"\n"[..]));
    let mut src = BytesMut::from(&b"a\n\nb\n"[..]);

    let frames = decode_all(&mut decoder, &mut src);
    assert_eq!(frames, vec![b"a".to_vec(), Vec::new(), b"b".to_vec()]);
}

#[test]
fn empty_delimiter_falls_back_to_newline() {
    let mut decoder = LinkDecoder::new(FrameMode::Delimiter(Vec::new()));
    let mut src = BytesMut::from(&b"line\n"[..]);

    let frames = decode_all(&mut decoder, &mut src);
    assert_eq!(frames, vec![b"line".to_vec()]);
}

#[test]
fn decode_eof_discards_partial_frame() {
    let mut decoder = LinkDecoder::new(FrameMode::fixed(8));
    let mut src = BytesMut::from(&b"abc"[..]);

    assert!(decoder.decode_eof(&mut src).expect("decode_eof").is_none());
    assert!(src.is_empty());
}

#[test]
fn encoder_appends_frames_verbatim() {
    let mut encoder = LinkEncoder;
    let mut dst = BytesMut::new();
    encoder
        .encode(Bytes::from_static(b"abcd"), &mut dst)
        .expect("encode");
    encoder
        .encode(Bytes::from_static(b"efgh"), &mut dst)
        .expect("encode");
    assert_eq!(&dst[..], b"abcdefgh");
}

proptest! {
    // Fixed-length framing must be loss- and duplication-free however the
    // stream is segmented into reads.
    #[test]
    fn fixed_length_chunking_is_lossless(
        data in proptest::collection::vec(any::<u8>(), 0..256),
        frame_len in 1_usize..16,
        splits in proptest::collection::vec(0_usize..256, 0..8),
    ) {
        let mut decoder = LinkDecoder::new(FrameMode::fixed(frame_len));
        let mut src = BytesMut::new();
        let mut frames: Vec<Vec<u8>> = Vec::new();

        let mut cuts: Vec<usize> = splits.iter().map(|s| s % (data.len() + 1)).collect();
        cuts.sort_unstable();
        cuts.push(data.len());

        let mut offset = 0;
        for cut in cuts {
            if cut > offset {
                src.extend_from_slice(&data[offset..cut]);
                offset = cut;
            }
            while let Some(frame) = decoder.decode(&mut src).expect("decode") {
                prop_assert_eq!(frame.len(), frame_len);
                frames.push(frame.to_vec());
            }
        }

        let emitted: Vec<u8> = frames.concat();
        let whole_frames = data.len() / frame_len * frame_len;
        prop_assert_eq!(&emitted[..], &data[..whole_frames]);
        prop_assert_eq!(src.len(), data.len() - whole_frames);
    }

    // Delimiter framing must reassemble the original stream regardless of
    // where read boundaries fall, including inside the delimiter itself.
    #[test]
    fn delimited_frames_survive_arbitrary_segmentation(
        frames in proptest::collection::vec(
            proptest::collection::vec(0_u8..=b'z', 0..32), 1..8),
        split in 1_usize..64,
    ) {
        let delimiter = b"\r\n";
        let mut stream = Vec::new();
        let mut expected: Vec<Vec<u8>> = Vec::new();
        for frame in &frames {
            // The generated range includes \r and \n; replace them so no
            // frame carries delimiter bytes.
            let mut cleaned = frame.clone();
            for byte in &mut cleaned {
                if *byte == b'\r' || *byte == b'\n' {
                    *byte = b'.';
                }
            }
            stream.extend_from_slice(&cleaned);
            stream.extend_from_slice(delimiter);
            expected.push(cleaned);
        }

        let mut decoder = LinkDecoder::new(FrameMode::delimited(&delimiter[..]));
        let mut src = BytesMut::new();
        let mut decoded = Vec::new();
        for chunk in stream.chunks(split) {
            src.extend_from_slice(chunk);
            while let Some(frame) = decoder.decode(&mut src).expect("decode") {
                decoded.push(frame.to_vec());
            }
        }

        prop_assert_eq!(decoded, expected);
        prop_assert!(src.is_empty());
    }
}
