#![cfg(feature = "std")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nexus_api::message::Tcode;
use nexus_api::nrr::RegisterMap;
use nexus_api::sim::{Region, SimConfig, SimProbe, SimTarget};
use nexus_api::{
    AccessSize, Capability, Comparator, CtrlData, Endian, Error, EventIdRange, EventKind, Handle, LogSink, PortType,
    ReceivedEvent, RwMode, SetEvent, Status, Substitution, TargetSpec, TraceTriggers, VendorCtrl,
};

fn open(config: SimConfig) -> (Handle<SimTarget>, SimProbe) {
    let target = SimTarget::new(config);
    let probe = target.probe();
    let handle = Handle::open(TargetSpec::jtag(Endian::Little), target, LogSink).unwrap();
    (handle, probe)
}

fn open_counting() -> (Handle<SimTarget>, SimProbe, Arc<AtomicUsize>) {
    let reports = Arc::new(AtomicUsize::new(0));
    let counter = reports.clone();
    let target = SimTarget::default();
    let probe = target.probe();
    let sink = move |_: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
    };
    let handle = Handle::open(TargetSpec::jtag(Endian::Little), target, sink).unwrap();
    (handle, probe, reports)
}

fn next_message(handle: &mut Handle<SimTarget>) -> nexus_api::message::Message {
    match handle.get_event(1024, false).unwrap() {
        Some(ReceivedEvent::Message(msg)) => msg,
        other => panic!("expected a message, got {:?}", other),
    }
}

fn expect_break(handle: &mut Handle<SimTarget>) -> Box<nexus_api::Registers> {
    match handle.get_event(1024, false).unwrap() {
        Some(ReceivedEvent::BreakStep(regs)) => regs,
        other => panic!("expected a break, got {:?}", other),
    }
}

#[test]
fn open_reports_a_consistent_capability() {
    let (handle, _probe) = open(SimConfig::default());
    let cap = handle.capability();
    assert_eq!(cap.api_version, "nxAPIv1.0");
    assert_eq!(cap.device_id, 0x0a5e_5001);
    assert_eq!(cap.target_endian, Endian::Little);
    assert!(cap.hal_info.contains("simulated"));
    assert!(cap.validate().is_ok());
    assert_eq!((cap.breakpoint.min, cap.breakpoint.max), (1, 4));
    handle.close().unwrap();
}

#[test]
fn open_rejects_unusable_ports() {
    let unavailable = Handle::open(TargetSpec::default(), SimTarget::default(), LogSink);
    assert_eq!(unavailable.err().map(|e| e.status()), Some(Status::NoCapability));

    let spec = TargetSpec { unsolicited_port: PortType::Other, ..TargetSpec::jtag(Endian::Little) };
    let other = Handle::open(spec, SimTarget::default(), LogSink);
    assert_eq!(other.err().map(|e| e.status()), Some(Status::NoCapability));

    let big = Handle::open(TargetSpec::jtag(Endian::Big), SimTarget::default(), LogSink);
    assert_eq!(big.err().map(|e| e.status()), Some(Status::NoCapability));
}

#[test]
fn memory_round_trips_at_every_size() {
    let (mut handle, probe) = open(SimConfig::default());
    let data: Vec<u8> = (0..32u8).map(|b| b.wrapping_mul(37)).collect();
    for (i, size) in AccessSize::ALL.into_iter().enumerate() {
        let addr = 0x200 + 0x40 * i as u64;
        handle.write_mem(0, 0, addr, size, &data).unwrap();
        assert_eq!(handle.read_mem(0, 0, addr, data.len(), size).unwrap(), data);
        assert_eq!(probe.peek(0, addr, data.len()).unwrap(), data);
    }

    handle.write_mem(1, 1, 0x2000_0010, AccessSize::Word, &[0xde, 0xad, 0xbe, 0xef]).unwrap();
    assert_eq!(probe.peek(1, 0x2000_0010, 4).unwrap(), [0xde, 0xad, 0xbe, 0xef]);
}

#[test]
fn reads_see_target_byte_order() {
    let (mut handle, probe) = open(SimConfig::default());
    assert!(probe.store(0x80, AccessSize::Word, 0x1122_3344));
    assert_eq!(handle.read_mem(0, 0, 0x80, 4, AccessSize::Word).unwrap(), [0x44, 0x33, 0x22, 0x11]);
    assert_eq!(handle.read_mem(0, 0, 0x80, 2, AccessSize::Half).unwrap(), [0x44, 0x33]);
}

#[test]
fn bad_accesses_are_reported() {
    let (mut handle, _probe, reports) = open_counting();

    let misaligned = handle.write_mem(0, 0, 0x201, AccessSize::Word, &[0; 4]);
    assert_eq!(misaligned.unwrap_err().status(), Status::Failed);
    let short = handle.read_mem(0, 0, 0x200, 6, AccessSize::Word);
    assert_eq!(short.unwrap_err().status(), Status::Failed);

    let map = handle.read_mem(2, 0, 0, 4, AccessSize::Word);
    assert_eq!(map.unwrap_err().status(), Status::NoCapability);
    let priority = handle.read_mem(0, 2, 0, 4, AccessSize::Word);
    assert_eq!(priority.unwrap_err().status(), Status::NoCapability);

    assert_eq!(reports.load(Ordering::SeqCst), 4);
}

#[test]
fn unmapped_reads_fail() {
    let (mut handle, _probe) = open(SimConfig::default());
    let result = handle.read_mem(0, 0, 0x2_0000, 4, AccessSize::Word);
    assert_eq!(result.unwrap_err().status(), Status::Failed);
}

#[test]
fn transfers_stop_at_the_top_of_the_address_space() {
    let (mut handle, _probe) = open(SimConfig::default());
    let wrapped = handle.write_mem(0, 0, u64::MAX - 3, AccessSize::Word, &[0; 8]);
    assert_eq!(wrapped.unwrap_err().status(), Status::Failed);
    let wrapped = handle.read_mem(0, 0, u64::MAX - 3, 8, AccessSize::Word);
    assert_eq!(wrapped.unwrap_err().status(), Status::Failed);
}

#[test]
fn memory_may_end_at_the_last_address() {
    let config = SimConfig { regions: vec![Region::new(0, u64::MAX - 7, 8)], ..SimConfig::default() };
    let (mut handle, probe) = open(config);
    let data = [1, 2, 3, 4, 5, 6, 7, 8];
    handle.write_mem(0, 0, u64::MAX - 7, AccessSize::Word, &data).unwrap();
    assert_eq!(probe.peek(0, u64::MAX - 7, 8).unwrap(), data);
    assert_eq!(handle.read_mem(0, 0, u64::MAX - 7, 8, AccessSize::Word).unwrap(), data);
    assert_eq!(handle.read_mem(0, 0, u64::MAX, 1, AccessSize::Byte).unwrap(), [8]);
}

#[test]
fn write_across_the_end_of_memory_is_partial() {
    let (mut handle, probe) = open(SimConfig::default());
    let data: Vec<u8> = (1..=16).collect();
    let result = handle.write_mem(0, 0, 0xfff8, AccessSize::Word, &data);
    match result {
        Err(Error::PartialWrite { written, .. }) => assert_eq!(written, 8),
        other => panic!("expected a partial write, got {:?}", other),
    }
    assert_eq!(probe.peek(0, 0xfff8, 8).unwrap(), &data[..8]);
}

#[test]
fn event_ids_must_come_from_their_range() {
    let (mut handle, _probe) = open(SimConfig::default());
    let outside = SetEvent::new(20, EventKind::Breakpoint(Comparator::instruction(0x100)));
    assert_eq!(handle.set_event(&outside).unwrap_err().status(), Status::NoCapability);

    // 5 is a watchpoint id
    let wrong_kind = SetEvent::new(5, EventKind::Breakpoint(Comparator::instruction(0x100)));
    assert_eq!(handle.set_event(&wrong_kind).unwrap_err().status(), Status::NoCapability);

    let bad_trigger = SetEvent::new(11, EventKind::BranchTrace(TraceTriggers { start: 12, end: 0 }));
    assert_eq!(handle.set_event(&bad_trigger).unwrap_err().status(), Status::NoCapability);

    let reversed = SetEvent::new(
        9,
        EventKind::DataTrace {
            rw_mode: RwMode::Read,
            triggers: TraceTriggers::ALWAYS,
            start_addr: 0x200,
            end_addr: 0x100,
        },
    );
    assert_eq!(handle.set_event(&reversed).unwrap_err().status(), Status::Failed);
    assert_eq!(handle.armed_events().count(), 0);
}

#[test]
fn only_comparators_count_before_triggering() {
    let (mut handle, _probe) = open(SimConfig::default());
    let counted_trace = SetEvent::new(11, EventKind::BranchTrace(TraceTriggers::ALWAYS)).after(1);
    assert_eq!(handle.set_event(&counted_trace).unwrap_err().status(), Status::NoCapability);
    assert_eq!(handle.armed_events().count(), 0);
}

#[test]
fn counts_stop_at_255() {
    let (mut handle, _probe) = open(SimConfig::default());
    let too_many = SetEvent::new(1, EventKind::Breakpoint(Comparator::instruction(0x100))).after(256);
    assert_eq!(handle.set_event(&too_many).unwrap_err().status(), Status::NoCapability);
    let most = SetEvent::new(1, EventKind::Breakpoint(Comparator::instruction(0x100))).after(255);
    handle.set_event(&most).unwrap();
}

#[test]
fn trigger_ids_must_fit_the_trigger_fields() {
    let capability = Capability { watch: EventIdRange::new(0x100, 0x103), ..Capability::reference_client() };
    let (mut handle, _probe) = open(SimConfig { capability, ..SimConfig::default() });
    let wide = SetEvent::new(11, EventKind::BranchTrace(TraceTriggers { start: 0x100, end: 0 }));
    assert_eq!(handle.set_event(&wide).unwrap_err().status(), Status::NoCapability);
    assert_eq!(handle.armed_events().count(), 0);
}

#[test]
fn open_needs_a_comparator_per_event_id() {
    let mut spec = TargetSpec::jtag(Endian::Little);
    spec.vendor.register_map.breakpoints.slots = 2;
    let result = Handle::open(spec, SimTarget::default(), LogSink);
    assert_eq!(result.err().map(|e| e.status()), Some(Status::NoCapability));
}

#[test]
fn open_needs_a_single_data_trace_id() {
    let capability = Capability { dtm: EventIdRange::new(9, 10), ..Capability::reference_client() };
    let target = SimTarget::new(SimConfig { capability, ..SimConfig::default() });
    let result = Handle::open(TargetSpec::jtag(Endian::Little), target, LogSink);
    assert_eq!(result.err().map(|e| e.status()), Some(Status::NoCapability));
}

#[test]
fn watchpoint_sends_a_message() {
    let (mut handle, probe) = open(SimConfig::default());
    let watch = SetEvent::new(5, EventKind::Watchpoint(Comparator::data_access(0x300, RwMode::Write)));
    handle.set_event(&watch).unwrap();

    assert!(probe.store(0x304, AccessSize::Word, 1));
    assert!(probe.load(0x300, AccessSize::Word).is_some());
    assert_eq!(handle.get_event(1024, false).unwrap(), None);

    assert!(probe.store(0x300, AccessSize::Word, 7));
    let msg = next_message(&mut handle);
    assert_eq!(msg.tcode(), Some(Tcode::Watchpoint as u8));
    assert_eq!(msg.packets()[1].value(), Some(0));
    assert_eq!(msg.packets()[2].value(), Some(5));
}

#[test]
fn watchpoint_counts_before_firing() {
    let (mut handle, probe) = open(SimConfig::default());
    let watch = SetEvent::new(6, EventKind::Watchpoint(Comparator::data_access(0x40, RwMode::ReadOrWrite))).after(2);
    handle.set_event(&watch).unwrap();

    probe.load(0x40, AccessSize::Byte);
    probe.store(0x40, AccessSize::Byte, 1);
    assert_eq!(probe.pending_events(), 0);
    probe.load(0x40, AccessSize::Byte);
    assert_eq!(next_message(&mut handle).packets()[2].value(), Some(6));
}

#[test]
fn data_value_watchpoint_honours_the_mask() {
    let (mut handle, probe) = open(SimConfig::default());
    let comparator = Comparator {
        op: nexus_api::event::Operand::DataValue,
        rw_mode: RwMode::Write,
        data: 0xab00,
        mask: 0x00ff,
        ..Comparator::default()
    };
    handle.set_event(&SetEvent::new(7, EventKind::Watchpoint(comparator))).unwrap();

    probe.store(0x10, AccessSize::Half, 0xac12);
    assert_eq!(probe.pending_events(), 0);
    probe.store(0x20, AccessSize::Half, 0xab12);
    assert_eq!(next_message(&mut handle).packets()[2].value(), Some(7));
}

#[test]
fn breakpoint_halts_and_restart_loads_registers() {
    let (mut handle, probe) = open(SimConfig::default());
    let mut regs = nexus_api::Registers::default();
    regs.int_regs[1] = 0x1234;
    probe.set_registers(regs);

    let bp = SetEvent::new(1, EventKind::Breakpoint(Comparator::instruction(0x1000)));
    handle.set_event(&bp).unwrap();
    assert!(probe.execute(0xffc));
    assert!(!probe.execute(0x1000));
    assert!(probe.is_halted());

    let mut stopped = expect_break(&mut handle);
    assert_eq!(stopped.int_regs[1], 0x1234);
    // Reported once
    assert_eq!(handle.get_event(1024, false).unwrap(), None);

    stopped.int_regs[3] = 42;
    stopped.float_regs[0] = 2.5;
    handle.control(&CtrlData::RestartFromBreakStep(stopped)).unwrap();
    assert!(!probe.is_halted());
    assert_eq!(probe.registers().int_regs[3], 42);
    assert_eq!(probe.registers().float_regs[0], 2.5);

    handle.clear_event(1);
    assert!(probe.execute(0x1000));
    assert_eq!(handle.armed_events().count(), 0);
}

#[test]
fn step_halts_after_one_instruction() {
    let (mut handle, probe) = open(SimConfig::default());
    handle.set_event(&SetEvent::new(2, EventKind::Step)).unwrap();
    assert!(probe.execute(0x100));
    assert!(probe.is_halted());
    expect_break(&mut handle);
    assert!(!probe.execute(0x104));

    handle.clear_event(2);
    handle.control(&CtrlData::RestartFromBreakStep(Box::new(probe.registers()))).unwrap();
    assert!(probe.execute(0x104));
    assert!(!probe.is_halted());
}

#[test]
fn step_stays_armed_while_any_step_event_is_set() {
    let (mut handle, probe) = open(SimConfig::default());
    handle.set_event(&SetEvent::new(1, EventKind::Step)).unwrap();
    handle.set_event(&SetEvent::new(2, EventKind::Step)).unwrap();
    handle.clear_event(1);
    assert!(probe.execute(0x100));
    assert!(probe.is_halted());
    expect_break(&mut handle);

    handle.clear_event(2);
    handle.control(&CtrlData::RestartFromBreakStep(Box::new(probe.registers()))).unwrap();
    assert!(probe.execute(0x104));
    assert!(probe.execute(0x108));
    assert!(!probe.is_halted());
}

#[test]
fn restart_needs_a_halted_target() {
    let (mut handle, _probe) = open(SimConfig::default());
    let result = handle.control(&CtrlData::RestartFromBreakStep(Box::default()));
    assert_eq!(result.unwrap_err().status(), Status::Failed);
}

#[test]
fn evto_follows_the_break() {
    let (mut handle, probe) = open(SimConfig::default());
    let bp = SetEvent::new(3, EventKind::Breakpoint(Comparator::instruction(0x20).with_evto()));
    handle.set_event(&bp).unwrap();
    probe.execute(0x20);
    expect_break(&mut handle);
    assert_eq!(handle.get_event(64, false).unwrap(), Some(ReceivedEvent::InputPin { level: true }));
}

#[test]
fn halt_and_reset_controls() {
    let (mut handle, probe) = open(SimConfig::default());
    let mut regs = nexus_api::Registers::default();
    regs.int_regs[0] = 7;
    probe.set_registers(regs);

    handle.control(&CtrlData::ResetOrHalt { perform_reset_sequence: true, halt: false }).unwrap();
    assert_eq!(probe.registers(), nexus_api::Registers::default());
    assert!(!probe.is_halted());

    handle.control(&CtrlData::halt()).unwrap();
    assert!(probe.is_halted());
    expect_break(&mut handle);

    // Neither flag set does nothing
    handle.control(&CtrlData::ResetOrHalt { perform_reset_sequence: false, halt: false }).unwrap();
    assert!(probe.is_halted());
}

#[test]
fn event_in_stops_the_core_only_with_client_break() {
    let (mut handle, probe) = open(SimConfig::default());
    handle.control(&CtrlData::EventIn { level: true }).unwrap();
    assert!(!probe.is_halted());
    handle.control(&CtrlData::EventIn { level: false }).unwrap();

    handle.control(&CtrlData::ClientBreak { enabled: true }).unwrap();
    handle.control(&CtrlData::EventIn { level: true }).unwrap();
    assert!(probe.is_halted());
    expect_break(&mut handle);
}

#[test]
fn empty_poll_is_not_an_error() {
    let (mut handle, _probe, reports) = open_counting();
    assert_eq!(handle.get_event(1024, false).unwrap(), None);
    assert_eq!(reports.load(Ordering::SeqCst), 0);
}

#[test]
fn small_buffer_keeps_the_event() {
    let (mut handle, probe, reports) = open_counting();
    handle.control(&CtrlData::halt()).unwrap();
    assert!(probe.is_halted());

    match handle.get_event(16, false) {
        Err(Error::NoSpace { needed, available }) => {
            assert_eq!(needed, 388);
            assert_eq!(available, 16);
        }
        other => panic!("expected NoSpace, got {:?}", other),
    }
    assert_eq!(reports.load(Ordering::SeqCst), 0);

    expect_break(&mut handle);
    assert_eq!(handle.get_event(1024, false).unwrap(), None);
}

#[test]
fn blocking_read_waits_for_the_target() {
    let (mut handle, probe) = open(SimConfig::default());
    let raiser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        probe.raise_event(ReceivedEvent::InputPin { level: false });
    });
    let event = handle.get_event(64, true).unwrap();
    assert_eq!(event, Some(ReceivedEvent::InputPin { level: false }));
    raiser.join().unwrap();
}

#[test]
fn data_trace_starts_on_its_watchpoint() {
    let (mut handle, probe) = open(SimConfig::default());
    let watch = SetEvent::new(5, EventKind::Watchpoint(Comparator::data_access(0x400, RwMode::Write)));
    let trace = SetEvent::new(
        9,
        EventKind::DataTrace {
            rw_mode: RwMode::ReadOrWrite,
            triggers: TraceTriggers { start: 5, end: 0 },
            start_addr: 0x400,
            end_addr: 0x500,
        },
    );
    handle.set_event(&watch).unwrap();
    handle.set_event(&trace).unwrap();

    probe.store(0x410, AccessSize::Word, 1);
    assert_eq!(handle.get_event(1024, false).unwrap(), None);

    probe.store(0x400, AccessSize::Word, 2);
    assert_eq!(next_message(&mut handle).tcode(), Some(Tcode::Watchpoint as u8));
    let write = next_message(&mut handle);
    assert_eq!(write.tcode(), Some(Tcode::DataWrite as u8));
    assert_eq!(write.packets()[3].value(), Some(0x400));
    assert_eq!(write.packets()[4].value(), Some(2));

    probe.load(0x410, AccessSize::Word);
    let read = next_message(&mut handle);
    assert_eq!(read.tcode(), Some(Tcode::DataRead as u8));
    assert_eq!(read.packets()[3].value(), Some(0x410));
    assert_eq!(read.packets()[4].value(), Some(1));

    // Outside the range: end is exclusive
    probe.load(0x500, AccessSize::Word);
    assert_eq!(handle.get_event(1024, false).unwrap(), None);
}

#[test]
fn branch_and_ownership_trace() {
    let (mut handle, probe) = open(SimConfig::default());
    probe.branch(0x3000);
    assert_eq!(probe.pending_events(), 0);

    handle.set_event(&SetEvent::new(11, EventKind::BranchTrace(TraceTriggers::ALWAYS))).unwrap();
    handle.set_event(&SetEvent::new(12, EventKind::OwnershipTrace(TraceTriggers::ALWAYS))).unwrap();
    handle.control(&CtrlData::SetClient { client_id: 3 }).unwrap();

    probe.branch(0x3000);
    let branch = next_message(&mut handle);
    assert_eq!(branch.tcode(), Some(Tcode::IndirectBranch as u8));
    assert_eq!(branch.packets()[1].value(), Some(3));
    assert_eq!(branch.packets()[2].value(), Some(0x3000));

    probe.set_owner(0x42);
    let owner = next_message(&mut handle);
    assert_eq!(owner.tcode(), Some(Tcode::Ownership as u8));
    assert_eq!(owner.packets()[2].value(), Some(0x42));

    handle.clear_event(11);
    probe.branch(0x3004);
    assert_eq!(probe.pending_events(), 0);
}

#[test]
fn set_client_checks_the_id_width() {
    let (mut handle, _probe) = open(SimConfig::default());
    let result = handle.control(&CtrlData::SetClient { client_id: 16 });
    assert_eq!(result.unwrap_err().status(), Status::Failed);
}

#[test]
fn substitution_starts_on_its_trigger() {
    let (mut handle, probe) = open(SimConfig::default());
    handle.set_event(&SetEvent::new(13, EventKind::Substitution { start_trigger: 1 })).unwrap();
    handle.set_event(&SetEvent::new(1, EventKind::Breakpoint(Comparator::instruction(0x50)))).unwrap();
    handle
        .control(&CtrlData::SubstitutionMode(Some(Substitution { instructions: true, data: false })))
        .unwrap();
    assert!(!probe.substituting());

    probe.execute(0x50);
    assert!(probe.substituting());

    handle.control(&CtrlData::SubstitutionMode(None)).unwrap();
    assert!(!probe.substituting());
}

#[test]
fn overrun_drops_messages_and_reports_the_loss() {
    let (mut handle, probe) = open(SimConfig { queue_depth: 2, ..SimConfig::default() });
    handle.set_event(&SetEvent::new(12, EventKind::OwnershipTrace(TraceTriggers::ALWAYS))).unwrap();
    for process in 1..=4 {
        probe.set_owner(process);
    }
    assert_eq!(probe.pending_events(), 2);

    assert_eq!(next_message(&mut handle).packets()[2].value(), Some(1));
    assert_eq!(next_message(&mut handle).packets()[2].value(), Some(2));
    let lost = next_message(&mut handle);
    assert_eq!(lost.tcode(), Some(Tcode::Error as u8));
    assert_eq!(lost.packets()[2].value(), Some(1));
    assert_eq!(lost.packets()[3].value(), Some(2));
    assert_eq!(handle.get_event(1024, false).unwrap(), None);

    handle.control(&CtrlData::OverrunMode { delay: 4 }).unwrap();
    assert!(probe.set_owner(5));
    assert!(probe.set_owner(6));
    // Full queue: the core waits instead of losing the switch
    assert!(!probe.set_owner(7));
    assert!(!probe.execute(0x100));
    assert_eq!(probe.pending_events(), 2);

    assert_eq!(next_message(&mut handle).packets()[2].value(), Some(5));
    assert!(probe.set_owner(7));
    assert_eq!(next_message(&mut handle).packets()[2].value(), Some(6));
    assert_eq!(next_message(&mut handle).packets()[2].value(), Some(7));
    assert_eq!(handle.get_event(1024, false).unwrap(), None);

    let result = handle.control(&CtrlData::OverrunMode { delay: 0x100 });
    assert_eq!(result.unwrap_err().status(), Status::NoCapability);
}

#[test]
fn vendor_controls_and_events() {
    let (mut handle, probe) = open(SimConfig::default());
    let map = RegisterMap::default();
    let led = map.led.unwrap().index;
    let trace_buffer = map.trace_buffer.unwrap().index;
    let perf = map.perf_count.unwrap().index;
    let watchdog = map.watchdog.unwrap().index;

    handle.control(&CtrlData::Vendor(VendorCtrl::FlashLed { how_fast: 3 })).unwrap();
    assert_eq!(probe.nrr(led), 3);
    handle.control(&CtrlData::Vendor(VendorCtrl::ConfigureTraceBuffer { size: 4096 })).unwrap();
    assert_eq!(probe.nrr(trace_buffer), 4096);

    let perf_event = SetEvent::new(14, EventKind::PerfCount { what_to_monitor: 1, what_to_do: 2 });
    handle.set_event(&perf_event).unwrap();
    assert_eq!(probe.nrr(perf), 1 | 2 << 16);
    handle.set_event(&SetEvent::new(15, EventKind::WatchdogCount { count: 1000 })).unwrap();
    assert_eq!(probe.nrr(watchdog), 1000);

    handle.clear_event(14);
    assert_eq!(probe.nrr(perf), 0);
}

#[test]
fn vendor_control_without_a_register_is_refused() {
    let target = SimTarget::default();
    let mut spec = TargetSpec::jtag(Endian::Little);
    spec.vendor.register_map.led = None;
    let mut handle = Handle::open(spec, target, LogSink).unwrap();
    let result = handle.control(&CtrlData::Vendor(VendorCtrl::FlashLed { how_fast: 1 }));
    assert_eq!(result.unwrap_err().status(), Status::NoCapability);
}

#[test]
fn clear_event_disarms_and_forgets() {
    let (mut handle, probe, reports) = open_counting();
    handle.set_event(&SetEvent::new(4, EventKind::Breakpoint(Comparator::instruction(0x600)))).unwrap();
    assert_eq!(handle.armed_events().count(), 1);
    handle.clear_event(4);
    assert_eq!(handle.armed_events().count(), 0);
    assert!(probe.execute(0x600));

    // Never set
    handle.clear_event(3);
    assert_eq!(reports.load(Ordering::SeqCst), 0);
}

#[test]
fn rearming_an_id_replaces_the_event() {
    let (mut handle, probe) = open(SimConfig::default());
    handle.set_event(&SetEvent::new(1, EventKind::Breakpoint(Comparator::instruction(0x10)))).unwrap();
    handle.set_event(&SetEvent::new(1, EventKind::Breakpoint(Comparator::instruction(0x20)))).unwrap();
    assert_eq!(handle.armed_events().count(), 1);
    assert!(probe.execute(0x10));
    assert!(!probe.execute(0x20));
}

#[test]
fn handles_are_independent() {
    let (mut first, first_probe) = open(SimConfig::default());
    let (mut second, second_probe) = open(SimConfig::default());

    first.write_mem(0, 0, 0x100, AccessSize::Byte, &[1, 2]).unwrap();
    second.write_mem(0, 0, 0x100, AccessSize::Byte, &[3, 4]).unwrap();
    first.set_event(&SetEvent::new(1, EventKind::Breakpoint(Comparator::instruction(0x8)))).unwrap();

    assert!(second_probe.execute(0x8));
    assert!(!first_probe.execute(0x8));

    first.close().unwrap();
    assert_eq!(second.read_mem(0, 0, 0x100, 2, AccessSize::Byte).unwrap(), [3, 4]);
    assert_eq!(second.get_event(1024, false).unwrap(), None);
}

#[test]
fn close_disarms_everything() {
    let target = SimTarget::default();
    let probe = target.probe();
    let mut handle = Handle::open(TargetSpec::jtag(Endian::Little), target, LogSink).unwrap();
    handle.set_event(&SetEvent::new(2, EventKind::Breakpoint(Comparator::instruction(0x44)))).unwrap();
    handle.close().unwrap();
    assert!(probe.execute(0x44));
}
