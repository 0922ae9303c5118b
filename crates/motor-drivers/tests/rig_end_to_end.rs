use can_dispatch::{drain, pump_once, BusRegistry, DispatchOutcome};
use can_transport::{BusPair, BusSelector, CanBus, CanFrame, CanId, MockBus};
use motor_drivers::dji::{self, DjiModel, DjiMotor};
use motor_drivers::vesc::{vesc_id, VescMotor, VescPacket};
use motor_drivers::{parse_rig, BufferWriter, MeteredTransport, MetricsHub, MotorHandle, Rig};

fn std_frame(id: u16, data: &[u8]) -> anyhow::Result<CanFrame> {
    let id = CanId::standard(id).ok_or_else(|| anyhow::anyhow!("id"))?;
    CanFrame::new(id, data).ok_or_else(|| anyhow::anyhow!("len"))
}

fn ext_frame(id: u32, data: &[u8]) -> anyhow::Result<CanFrame> {
    let id = CanId::extended(id).ok_or_else(|| anyhow::anyhow!("id"))?;
    CanFrame::new(id, data).ok_or_else(|| anyhow::anyhow!("len"))
}

fn dji_feedback(angle: u16) -> [u8; 8] {
    let a = angle.to_be_bytes();
    [a[0], a[1], 0x01, 0xF4, 0, 0, 30, 0]
}

#[test]
fn test_feedback_flows_from_bus_to_snapshot() -> anyhow::Result<()> {
    let registry = BusRegistry::new();
    let motor = DjiMotor::init(&registry, BusSelector::Can1, DjiModel::M3508, 0x201)?;
    let mut bus = MockBus::open("mock0")?;

    for angle in [100, 8100, 100] {
        bus.inject(std_frame(0x201, &dji_feedback(angle))?);
    }
    bus.inject(std_frame(0x202, &dji_feedback(0))?);
    assert_eq!(drain(&registry, BusSelector::Can1, &mut bus, 64)?, 4);

    let st = motor.state();
    assert_eq!(st.frames, 3);
    assert_eq!(st.round_count, 0);
    assert_eq!(st.total_angle, 0);
    assert_eq!(st.speed_rpm, 500);

    let stats = registry.stats().snapshot();
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.unmatched, 1);
    Ok(())
}

#[test]
fn test_deinit_stops_delivery_and_drop_is_pruned() -> anyhow::Result<()> {
    let registry = BusRegistry::new();
    let mut bus = MockBus::open("mock0")?;

    let a = DjiMotor::init(&registry, BusSelector::Can1, DjiModel::M2006, 0x203)?;
    a.deinit(&registry)?;
    bus.inject(std_frame(0x203, &dji_feedback(10))?);
    let (_, outcome) = pump_once(&registry, BusSelector::Can1, &mut bus, Some(0))?
        .ok_or_else(|| anyhow::anyhow!("no frame"))?;
    assert_eq!(outcome, DispatchOutcome::Unmatched);
    assert_eq!(a.state().frames, 0);

    let b = DjiMotor::init(&registry, BusSelector::Can1, DjiModel::M2006, 0x204)?;
    drop(b);
    bus.inject(std_frame(0x204, &dji_feedback(10))?);
    let (_, outcome) = pump_once(&registry, BusSelector::Can1, &mut bus, Some(0))?
        .ok_or_else(|| anyhow::anyhow!("no frame"))?;
    assert_eq!(outcome, DispatchOutcome::Stale);
    assert!(registry.is_empty(BusSelector::Can1));
    Ok(())
}

#[test]
fn test_vesc_status_over_mock_bus() -> anyhow::Result<()> {
    let registry = BusRegistry::new();
    let vesc = VescMotor::init(&registry, BusSelector::Can2, 42)?;
    let mut bus = MockBus::open("mock1")?;

    let mut w = BufferWriter::new();
    w.put_f32(1000.0, 1.0).put_f16(5.0, 10.0).put_f16(0.5, 1000.0);
    bus.inject(ext_frame(vesc_id(42, VescPacket::Status), w.as_slice())?);
    bus.inject(ext_frame(vesc_id(43, VescPacket::Status), w.as_slice())?);
    drain(&registry, BusSelector::Can2, &mut bus, 8)?;

    let st = vesc.state();
    assert_eq!(st.erpm, 1000.0);
    assert_eq!(st.total_current, 5.0);
    assert_eq!(st.duty, 0.5);
    assert_eq!(st.frames, 1);

    vesc.deinit(&registry)?;
    assert!(registry.is_empty(BusSelector::Can2));
    Ok(())
}

#[test]
fn test_commands_reach_the_selected_bus() -> anyhow::Result<()> {
    let can1 = MockBus::open("mock0")?;
    let can2 = MockBus::open("mock1")?;
    let metrics = MetricsHub::new()?;
    let tx = MeteredTransport::new(
        BusPair::new(Some(can1.clone()), Some(can2.clone())),
        metrics.clone(),
    );

    dji::set_current(&tx, BusSelector::Can2, dji::GROUP_CURRENT_LOW, [100, 0, 0, 0])?;
    assert!(dji::set_current(&tx, BusSelector::Can2, 0x123, [0; 4]).is_err());

    let sent = can2.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id.raw(), 0x200);
    assert_eq!(&sent[0].payload()[..2], &[0x00, 0x64]);
    assert!(can1.sent().is_empty());
    assert_eq!(metrics.bus.tx_frames.get(), 1);

    can2.set_fail_sends(true);
    assert!(dji::set_current(&tx, BusSelector::Can2, dji::GROUP_CURRENT_HIGH, [0; 4]).is_err());
    assert_eq!(metrics.bus.tx_errors.get(), 1);
    Ok(())
}

#[test]
fn test_rig_from_yaml_decodes_and_commands() -> anyhow::Result<()> {
    let cfg = parse_rig(
        r#"
motors:
  - { name: yaw, bus: can1, driver: dji, model: gm6020, id: "0x206" }
  - { name: knee, bus: can1, driver: ak, model: ak80-9, mode: mit, id: 3 }
  - { name: lift, bus: can2, driver: mlds, id: 5 }
"#,
    )?;
    let registry = BusRegistry::new();
    let rig = Rig::bind(&cfg, &registry)?;
    let mut can1 = MockBus::open("mock0")?;
    let can2 = MockBus::open("mock1")?;
    let tx = BusPair::new(Some(can1.clone()), Some(can2.clone()));

    can1.inject(std_frame(0x206, &dji_feedback(4096))?);
    // MIT feedback: byte 0 echoes the id, then pos16 spd12 torque12
    can1.inject(std_frame(0x003, &[0x03, 0x80, 0x00, 0x80, 0x08, 0x00, 25, 0])?);
    drain(&registry, BusSelector::Can1, &mut can1, 8)?;

    let records = rig.telemetry();
    assert_eq!(records.len(), 2);
    let yaw = records
        .iter()
        .find(|r| r.name == "yaw")
        .ok_or_else(|| anyhow::anyhow!("yaw"))?;
    assert_eq!(yaw.state["angle"], 4096);
    assert_eq!(yaw.state["temperature"], 30);

    match rig.get("knee") {
        Some(MotorHandle::Ak(knee)) => {
            let st = knee.state();
            assert_eq!(st.frames, 1);
            assert_eq!(st.temperature, 25);
            knee.mit_enter(&tx)?;
        }
        other => anyhow::bail!("unexpected handle: {other:?}"),
    }
    match rig.get("lift") {
        Some(MotorHandle::Mlds(lift)) => lift.run_speed(&tx, 300)?,
        other => anyhow::bail!("unexpected handle: {other:?}"),
    }

    assert_eq!(can1.sent().len(), 1);
    assert_eq!(can1.sent()[0].payload()[7], 0xFC);
    assert_eq!(can2.sent()[0].payload()[2], 0x90);
    Ok(())
}

#[test]
fn test_shipped_sample_rig_binds() -> anyhow::Result<()> {
    let cfg = motor_drivers::load_rig_file(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../configs/rig.yaml"
    ))?;
    let registry = BusRegistry::new();
    let mut rig = Rig::bind(&cfg, &registry)?;
    assert_eq!(rig.len(), cfg.motors.len());
    // MLDS drives are send-only and never register
    assert_eq!(
        registry.len(BusSelector::Can1) + registry.len(BusSelector::Can2),
        rig.len() - 1
    );
    rig.unbind(&registry);
    Ok(())
}
