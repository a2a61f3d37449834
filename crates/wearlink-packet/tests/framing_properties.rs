//! Property tests for packet framing.

use proptest::prelude::*;
use wearlink_packet::{slice_packet, Packet, SliceReassembler, Tlv};

fn tlv() -> impl Strategy<Value = Tlv> {
    proptest::collection::vec((0u8..0x7C, proptest::collection::vec(any::<u8>(), 0..300)), 0..6)
        .prop_map(|entries| {
            entries
                .into_iter()
                .fold(Tlv::new(), |tlv, (tag, value)| tlv.put_bytes(tag, value))
        })
}

proptest! {
    #[test]
    fn sliced_packets_reassemble(
        service in any::<u8>(),
        command in any::<u8>(),
        body in tlv(),
        slice_size in 1usize..64,
        write_size in 1usize..40,
    ) {
        let packet = Packet::new(service, command, body);
        let encoded = packet.encode();
        prop_assume!(encoded.len() <= slice_size * 256);

        let stream = slice_packet(&encoded, slice_size).unwrap().concat();
        let mut reassembler = SliceReassembler::default();
        let mut packets = Vec::new();
        for chunk in stream.chunks(write_size) {
            reassembler.push(chunk);
            while let Some(result) = reassembler.next_packet() {
                packets.push(result.unwrap());
            }
        }

        prop_assert_eq!(packets.len(), 1);
        prop_assert_eq!(Packet::decode(&packets[0]).unwrap(), packet);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut reassembler = SliceReassembler::new(1024);
        reassembler.push(&data);
        while reassembler.next_packet().is_some() {}
        let _ = Packet::decode(&data);
    }
}
