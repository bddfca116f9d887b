use nova_adb_jdwp::{encode_command, JdwpPacket, RewindableChannel};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 127) as u8).collect()
}

#[tokio::test]
async fn large_streamed_payload_is_forwarded_intact() {
    let bytes = encode_command(11, 9, 2, &payload(40_000));
    let expected = bytes.clone();

    let (mut wire_tx, wire_rx) = duplex(1024);
    let writer = tokio::spawn(async move {
        wire_tx.write_all(&bytes).await.unwrap();
    });

    let mut packet = JdwpPacket::read_streaming(wire_rx).await.unwrap().unwrap();
    assert_eq!(packet.payload_len(), 40_000);

    let (mut out_tx, mut out_rx) = duplex(1024);
    let reader = tokio::spawn(async move {
        let mut out = Vec::new();
        out_rx.read_to_end(&mut out).await.unwrap();
        out
    });

    packet.write_final_to(&mut out_tx).await.unwrap();
    drop(out_tx);
    writer.await.unwrap();

    assert_eq!(reader.await.unwrap(), expected);
    assert_eq!(packet.payload_mut().buffered_len(), 0);
}

#[tokio::test]
async fn streamed_packet_replays_and_clones_before_finalizing() {
    let bytes = encode_command(3, 1, 1, &payload(3_000));
    let (mut tx, rx) = duplex(256);
    let feeder = {
        let bytes = bytes.clone();
        tokio::spawn(async move { tx.write_all(&bytes).await.unwrap() })
    };

    let mut packet = JdwpPacket::read_streaming(rx).await.unwrap().unwrap();

    let mut first = Vec::new();
    packet.write_to(&mut first).await.unwrap();
    feeder.await.unwrap();

    let mut scratch = Vec::new();
    let mut clone = packet.deep_clone(&mut scratch).await.unwrap();
    let mut second = Vec::new();
    clone.write_to(&mut second).await.unwrap();
    let mut third = Vec::new();
    packet.write_final_to(&mut third).await.unwrap();

    assert_eq!(first, bytes);
    assert_eq!(second, bytes);
    assert_eq!(third, bytes);
    assert!(packet.deep_clone(&mut scratch).await.unwrap_err().is_invalid_state());
}

#[tokio::test]
async fn consecutive_packets_read_from_one_stream() {
    let mut wire = encode_command(1, 1, 7, &[]);
    wire.extend(encode_command(2, 11, 1, &[0, 0, 0, 5]));
    let mut input: &[u8] = &wire;

    let first = JdwpPacket::read_from(&mut input).await.unwrap().unwrap();
    let second = JdwpPacket::read_from(&mut input).await.unwrap().unwrap();
    assert!(JdwpPacket::read_from(&mut input).await.unwrap().is_none());

    assert_eq!(first.id(), 1);
    assert_eq!(second.cmd_set().unwrap(), 11);
    assert!(second.to_string().contains("cmdSet=ThreadReference[11], cmd=Name[1]"));
}

#[tokio::test]
async fn channel_from_duplex_rewinds_without_rereading() {
    let (mut tx, rx) = duplex(64);
    tx.write_all(b"digest me, then forward me").await.unwrap();
    drop(tx);

    let mut channel = RewindableChannel::from_reader(rx);
    let mut once = Vec::new();
    channel.read_to_end(&mut once).await.unwrap();
    channel.final_rewind().unwrap();
    let mut twice = Vec::new();
    channel.read_to_end(&mut twice).await.unwrap();

    assert_eq!(once, twice);
    assert!(channel.rewind().unwrap_err().is_invalid_state());
}
