//! Integration tests exercising the crate's public surface end to end, rather than one module
//! at a time.

use fieldring::config::MasterConfig;
use fieldring::device_id;
use fieldring::domain::{DomainAllocator, DomainBuilder, DomainStatus};
use fieldring::gateway;
use fieldring::loopback::LoopbackDevice;
use fieldring::master::Master;
use fieldring::slave::{Identity, SyncManagerDirection};
use fieldring::wire::{self, Address, Opcode, SubcommandRequest};

#[test]
fn autoincrement_read_round_trips_through_the_wire_codec() {
    let request = SubcommandRequest {
        opcode: Opcode::AutoIncrementRead,
        index: 0x00,
        address: Address::Autoincrement {
            ring_position: 3,
            offset: 0x0130,
        },
        payload_len: 2,
        outbound_payload: None,
    };

    let mut buf = [0u8; wire::MAX_FRAME_LEN];
    let len = wire::encode_frame(&mut buf, &[request]).unwrap();
    assert!((46..=1500).contains(&len));

    let (_, decoded) = wire::decode_frame(&buf[..len]).unwrap();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].opcode, Opcode::AutoIncrementRead);
    assert_eq!(decoded[0].address, request.address);
}

#[test]
fn domains_share_one_allocator_with_disjoint_logical_ranges() {
    let mut allocator = DomainAllocator::new();

    let mut outputs = DomainBuilder::new();
    outputs.declare(0, 2, 6, SyncManagerDirection::MasterOut).unwrap();
    let outputs = outputs.activate(&mut allocator).unwrap();

    let mut inputs = DomainBuilder::new();
    inputs.declare(1, 3, 10, SyncManagerDirection::MasterIn).unwrap();
    let inputs = inputs.activate(&mut allocator).unwrap();

    let outputs_range = outputs.entries()[0].logical_start..outputs.entries()[0].logical_start + outputs.entries()[0].length;
    let inputs_range = inputs.entries()[0].logical_start..inputs.entries()[0].logical_start + inputs.entries()[0].length;

    assert!(outputs_range.end <= inputs_range.start || inputs_range.end <= outputs_range.start);
    assert_eq!(outputs.image().len(), 6);
    assert_eq!(inputs.image().len(), 10);
}

#[test]
fn domain_status_moves_from_incomplete_to_complete_as_more_slaves_respond() {
    let expected = 3;

    assert_eq!(DomainStatus::from_working_counter(0, expected), DomainStatus::Zero);
    assert_eq!(DomainStatus::from_working_counter(2, expected), DomainStatus::Incomplete);
    assert_eq!(DomainStatus::from_working_counter(3, expected), DomainStatus::Complete);
}

#[test]
fn device_id_list_parses_mixed_empty_and_mac_segments() {
    let entries = device_id::parse_list(";M01:23:45:67:89:AB").unwrap();
    assert_eq!(entries.len(), 2);
    assert!(device_id::parse_list("M00:11").is_err());
}

#[test]
fn gateway_reply_header_carries_request_type_and_correct_length() {
    let request = [(0x3u16 << 11).to_le_bytes()[0], (0x3u16 << 11).to_le_bytes()[1]];
    let request_type = gateway::request_type(&request).unwrap();

    let mut reply = [0u8; 18];
    gateway::rewrite_reply_header(&mut reply, request_type).unwrap();

    let header = u16::from_le_bytes([reply[0], reply[1]]);
    assert_eq!(header & 0x07ff, 16);
    assert_eq!((header >> 11) & 0x1f, u16::from(request_type));
}

#[test]
fn master_ticks_with_a_mapped_domain_over_a_loopback_device() {
    let config = MasterConfig::builder().interface_name("lo").build().unwrap();
    let mut master: Master<8> = Master::new(config);

    let identity = Identity { vendor_id: 1, product_code: 2, revision: 0, serial: 0x1234 };
    let slave = master.register_slave(0, 1, 2, identity).unwrap();
    master
        .declare_mapping(slave, 0, 3, 4, SyncManagerDirection::MasterOut)
        .unwrap();
    master.activate().unwrap();

    let mut device = LoopbackDevice::new();

    // No real slave is listening on the loopback, so every tick's logical-read-write sub-command
    // goes unanswered; this exercises that ticking never panics and keeps reporting a status
    // rather than wedging.
    for _ in 0..3 {
        let status = master.tick(&mut device).unwrap();
        assert_ne!(status, fieldring::cyclic::TickStatus::Ok);
    }

    let counters = master.anomaly_counters();
    assert_eq!(counters.protocol_violation, 0);
}
