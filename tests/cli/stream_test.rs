//! Tests for stream decoding.

use ralph_supervisor::cli::StreamDecoder;

const STREAM: &str = concat!(
    "{\"type\":\"step_start\"}\n",
    "{\"type\":\"text\",\"text\":\"héllo → wörld\"}\r\n",
    "\n",
    "   \n",
    "{\"type\":\"step_finish\"}\n",
    "{\"type\":\"text\",\"text\":\"tail\"}",
);

fn decode_whole(bytes: &[u8]) -> Vec<String> {
    let mut decoder = StreamDecoder::new();
    let mut out = decoder.push(bytes);
    out.extend(decoder.flush());
    out
}

#[test]
fn decode_drops_blank_records_and_carriage_returns() {
    let records = decode_whole(STREAM.as_bytes());
    assert_eq!(records.len(), 4);
    assert_eq!(records[1], "{\"type\":\"text\",\"text\":\"héllo → wörld\"}");
    assert_eq!(records[3], "{\"type\":\"text\",\"text\":\"tail\"}");
}

#[test]
fn split_at_every_byte_offset_yields_same_records() {
    let bytes = STREAM.as_bytes();
    let expected = decode_whole(bytes);

    for split in 0..=bytes.len() {
        let mut decoder = StreamDecoder::new();
        let mut records = decoder.push(&bytes[..split]);
        records.extend(decoder.push(&bytes[split..]));
        records.extend(decoder.flush());
        assert_eq!(records, expected, "split at {split}");
    }
}

#[test]
fn byte_at_a_time_yields_same_records() {
    let bytes = STREAM.as_bytes();
    let mut decoder = StreamDecoder::new();
    let mut records = Vec::new();
    for b in bytes {
        records.extend(decoder.push(std::slice::from_ref(b)));
    }
    records.extend(decoder.flush());
    assert_eq!(records, decode_whole(bytes));
}

#[test]
fn reset_discards_partial_record() {
    let mut decoder = StreamDecoder::new();
    assert!(decoder.push(b"{\"type\":").is_empty());
    assert!(decoder.pending_len() > 0);
    decoder.reset();
    assert_eq!(decoder.pending_len(), 0);
    assert!(decoder.flush().is_none());
}
