use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info, warn};

use can_dispatch::{pump_once, BusRegistry, DispatchOutcome};
use can_transport as can;
use can_transport::{BusPair, BusSelector, CanBus};
use motor_drivers::ak::{AkMode, AkModel, AkMotor, MitCommand, OriginMode};
use motor_drivers::dji::{self, ControlKind};
use motor_drivers::mlds::{ControlMode, MldsMotor, SignalSource};
use motor_drivers::vesc::VescMotor;
use motor_drivers::{
    load_rig_file, Backend as RigBackend, MeteredTransport, MetricsHub, Rig, RigConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "mc",
    version,
    about = "Motor control CLI: CAN bus tools, rig checks and motor commands",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Backend {
    Mock,
    Slcan,
}

impl From<RigBackend> for Backend {
    fn from(b: RigBackend) -> Self {
        match b {
            RigBackend::Mock => Backend::Mock,
            RigBackend::Slcan => Backend::Slcan,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Bus {
    Can1,
    Can2,
}

impl From<Bus> for BusSelector {
    fn from(b: Bus) -> Self {
        match b {
            Bus::Can1 => BusSelector::Can1,
            Bus::Can2 => BusSelector::Can2,
        }
    }
}

/// Where a single-motor command goes.
#[derive(Args, Debug)]
struct Target {
    /// Bus slot the motor hangs off
    #[arg(long, value_enum, default_value_t = Bus::Can1)]
    bus: Bus,
    /// Device path or name (e.g., /dev/ttyACM0 or mock0)
    #[arg(long, default_value = "mock0")]
    device: String,
    #[arg(long, value_enum, default_value_t = Backend::Mock)]
    backend: Backend,
    /// Bitrate for SLCAN (only when backend=slcan)
    #[arg(long, value_enum)]
    bitrate: Option<Bitrate>,
    /// Milliseconds to wait for one feedback frame after sending (0 to skip)
    #[arg(long, default_value_t = 0u32)]
    recv_ms: u32,
}

/// Command-side transport: one interface, every send counted.
type Tx = MeteredTransport<BusPair<Iface>>;

impl Target {
    fn open(&self) -> Result<(BusSelector, Tx)> {
        let bus = BusSelector::from(self.bus);
        let iface = open_iface(self.backend, &self.device, self.bitrate)?;
        let tx = MeteredTransport::new(BusPair::single(bus, iface), MetricsHub::new()?);
        Ok((bus, tx))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List CAN interfaces
    CanList {
        #[arg(long, value_enum, default_value_t = Backend::Mock)]
        backend: Backend,
        /// Bitrate for SLCAN (only when backend=slcan)
        #[arg(long, value_enum)]
        bitrate: Option<Bitrate>,
    },
    /// Sniff CAN frames, optionally decoding them through a rig's motors
    CanSniff {
        #[arg(long, default_value = "mock0")]
        device: String,
        /// Number of frames to read
        #[arg(long, default_value_t = 10u32)]
        count: u32,
        #[arg(long, value_enum, default_value_t = Backend::Mock)]
        backend: Backend,
        #[arg(long, value_enum)]
        bitrate: Option<Bitrate>,
        /// Rig file whose motors decode the frames
        #[arg(long)]
        rig: Option<String>,
        /// Which rig bus the sniffed device is
        #[arg(long, value_enum, default_value_t = Bus::Can1)]
        bus: Bus,
    },
    /// Send a raw CAN frame
    CanSend {
        #[arg(long, default_value = "mock0")]
        device: String,
        /// CAN ID in hex (e.g., 0x123); above 0x7FF is sent extended
        #[arg(long)]
        id: String,
        /// Data bytes as hex, space-separated (e.g., "01 02 03")
        #[arg(long, value_delimiter = ' ')]
        data: Vec<String>,
        #[arg(long, value_enum, default_value_t = Backend::Mock)]
        backend: Backend,
        #[arg(long, value_enum)]
        bitrate: Option<Bitrate>,
    },
    /// Validate a rig file and show how its motors register for dispatch
    RigCheck {
        #[arg(long, default_value = "configs/rig.yaml")]
        rig: String,
    },
    /// Pump every bus of a rig and print motor telemetry as JSON lines
    Monitor {
        #[arg(long, default_value = "configs/rig.yaml")]
        rig: String,
        /// Receive rounds across all buses
        #[arg(long, default_value_t = 100u32)]
        polls: u32,
        /// Receive timeout per bus and round
        #[arg(long, default_value_t = 50u64)]
        timeout_ms: u64,
        /// Print Prometheus metrics when done
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Send one DJI setpoint; the other three slots of the group get zero
    DjiCurrent {
        #[command(flatten)]
        target: Target,
        /// Feedback id of the motor (0x201..)
        #[arg(long)]
        motor: String,
        #[arg(long, allow_negative_numbers = true)]
        value: i16,
        #[arg(long, value_enum, default_value_t = DjiKind::Current)]
        kind: DjiKind,
    },
    /// CubeMars AK in MIT mode
    AkMit {
        #[command(flatten)]
        target: Target,
        #[arg(long, value_parser = parse_ak_model, default_value = "ak80-9")]
        model: AkModel,
        #[arg(long)]
        id: String,
        #[arg(long, value_enum)]
        action: MitAction,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        pos: f32,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        spd: f32,
        #[arg(long, default_value_t = 0.0)]
        kp: f32,
        #[arg(long, default_value_t = 0.0)]
        kd: f32,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        torque: f32,
    },
    /// CubeMars AK in servo mode
    AkServo {
        #[command(flatten)]
        target: Target,
        #[arg(long, value_parser = parse_ak_model, default_value = "ak80-9")]
        model: AkModel,
        #[arg(long)]
        id: String,
        #[arg(long, value_enum)]
        action: ServoAction,
        /// Duty, amps, ERPM or degrees depending on the action
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        value: f32,
        /// Speed for pos-spd (ERPM)
        #[arg(long, default_value_t = 0.0)]
        spd: f32,
        /// Acceleration for pos-spd (ERPM/s)
        #[arg(long, default_value_t = 0.0)]
        rpa: f32,
        #[arg(long, value_enum, default_value_t = OriginArg::Temporary)]
        origin: OriginArg,
    },
    /// VESC setpoints
    VescSet {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: String,
        #[arg(long, value_enum)]
        action: VescAction,
        /// Setpoint; the lower limit for current-limit
        #[arg(long, allow_negative_numbers = true)]
        value: f32,
        /// Upper limit for current-limit
        #[arg(long, allow_negative_numbers = true)]
        max: Option<f32>,
        /// Persist the current limits on the controller
        #[arg(long, action = ArgAction::SetTrue)]
        store: bool,
    },
    /// MLDS3605 speed run
    MldsSpeed {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: String,
        #[arg(long, allow_negative_numbers = true)]
        speed: i32,
        /// Switch the drive to digital speed control first
        #[arg(long, action = ArgAction::SetTrue)]
        set_mode: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DjiKind {
    Current,
    Gm6020Voltage,
    Gm6020Current,
}

impl DjiKind {
    fn into_control(self) -> ControlKind {
        match self {
            DjiKind::Current => ControlKind::Current,
            DjiKind::Gm6020Voltage => ControlKind::Gm6020Voltage,
            DjiKind::Gm6020Current => ControlKind::Gm6020Current,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum MitAction {
    Enter,
    Exit,
    Origin,
    Command,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ServoAction {
    Duty,
    Current,
    Brake,
    Rpm,
    Pos,
    Origin,
    PosSpd,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OriginArg {
    Temporary,
    Permanent,
    RestoreDefault,
}

impl From<OriginArg> for OriginMode {
    fn from(o: OriginArg) -> Self {
        match o {
            OriginArg::Temporary => OriginMode::Temporary,
            OriginArg::Permanent => OriginMode::Permanent,
            OriginArg::RestoreDefault => OriginMode::RestoreDefault,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum VescAction {
    Duty,
    Current,
    Brake,
    Erpm,
    Pos,
    RelCurrent,
    RelBrake,
    CurrentLimit,
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::CanList { backend, bitrate } => can_list_backend(backend, bitrate),
        Commands::CanSniff {
            device,
            count,
            backend,
            bitrate,
            rig,
            bus,
        } => can_sniff_backend(backend, &device, count, bitrate, rig.as_deref(), bus.into()),
        Commands::CanSend {
            device,
            id,
            data,
            backend,
            bitrate,
        } => can_send_backend(backend, &device, &id, &data, bitrate),
        Commands::RigCheck { rig } => rig_check(&rig),
        Commands::Monitor {
            rig,
            polls,
            timeout_ms,
            metrics,
        } => monitor(&rig, polls, timeout_ms, metrics),
        Commands::DjiCurrent {
            target,
            motor,
            value,
            kind,
        } => dji_current(&target, &motor, value, kind.into_control()),
        Commands::AkMit {
            target,
            model,
            id,
            action,
            pos,
            spd,
            kp,
            kd,
            torque,
        } => {
            let cmd = MitCommand {
                pos,
                spd,
                kp,
                kd,
                torque,
            };
            ak_mit(&target, model, &id, action, &cmd)
        }
        Commands::AkServo {
            target,
            model,
            id,
            action,
            value,
            spd,
            rpa,
            origin,
        } => ak_servo(&target, model, &id, action, value, (spd, rpa), origin.into()),
        Commands::VescSet {
            target,
            id,
            action,
            value,
            max,
            store,
        } => vesc_set(&target, &id, action, value, max, store),
        Commands::MldsSpeed {
            target,
            id,
            speed,
            set_mode,
        } => mlds_speed(&target, &id, speed, set_mode),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// One opened interface, whichever backend it came from.
enum Iface {
    Mock(can::MockBus),
    Slcan(can::SlcanBus),
}

impl CanBus for Iface {
    fn open(name: &str) -> can::Result<Self> {
        can::MockBus::open(name).map(Iface::Mock)
    }

    fn list() -> can::Result<Vec<can::BusInfo>> {
        let mut all = can::MockBus::list()?;
        all.extend(can::SlcanBus::list()?);
        Ok(all)
    }

    fn recv(&mut self, timeout_ms: Option<u64>) -> can::Result<can::CanFrame> {
        match self {
            Iface::Mock(b) => b.recv(timeout_ms),
            Iface::Slcan(b) => b.recv(timeout_ms),
        }
    }

    fn send(&mut self, frame: &can::CanFrame) -> can::Result<()> {
        match self {
            Iface::Mock(b) => b.send(frame),
            Iface::Slcan(b) => b.send(frame),
        }
    }
}

fn open_iface(backend: Backend, device: &str, bitrate: Option<Bitrate>) -> Result<Iface> {
    let iface = match backend {
        Backend::Mock => Iface::Mock(can::MockBus::open(device)?),
        Backend::Slcan => {
            let br = bitrate.map(|b| b.into_transport());
            Iface::Slcan(can::SlcanBus::open_with(device, br)?)
        }
    };
    Ok(iface)
}

/// Open every bus the rig configures; unconfigured slots stay empty.
fn open_rig_buses(cfg: &RigConfig) -> Result<BusPair<Iface>> {
    let mut slots: [Option<Iface>; 2] = [None, None];
    for bus in BusSelector::ALL {
        let Some(bc) = cfg.bus(bus) else { continue };
        let bitrate = bc
            .bitrate
            .as_deref()
            .map(|s| Bitrate::from_str(s, true).map_err(|e| anyhow!("{bus}: bitrate {s}: {e}")))
            .transpose()?;
        let iface = open_iface(bc.backend.into(), &bc.device, bitrate)
            .with_context(|| format!("opening {bus} on {}", bc.device))?;
        slots[bus.index()] = Some(iface);
    }
    let [can1, can2] = slots;
    Ok(BusPair::new(can1, can2))
}

/// Print what a mock interface recorded; real adapters only get a log line.
fn report_sent(tx: &Tx, bus: BusSelector) -> Result<()> {
    let counters = &tx.metrics().bus;
    debug!(
        %bus,
        sent = counters.tx_frames.get(),
        failed = counters.tx_errors.get(),
        "tx counters"
    );
    let iface = tx.inner().lock(bus)?;
    match &*iface {
        Iface::Mock(m) => {
            for f in m.take_sent() {
                print!("sent: ");
                print_frame(&f);
            }
        }
        Iface::Slcan(_) => info!(%bus, "sent (slcan)"),
    }
    Ok(())
}

/// Pump one frame through `registry`. True if a motor took it.
fn await_feedback(
    registry: &BusRegistry,
    pair: &BusPair<Iface>,
    bus: BusSelector,
    recv_ms: u32,
) -> Result<bool> {
    if recv_ms == 0 {
        return Ok(false);
    }
    let mut iface = pair.lock(bus)?;
    match pump_once(registry, bus, &mut *iface, Some(u64::from(recv_ms)))? {
        Some((frame, outcome)) => {
            print!("recv: ");
            print_frame(&frame);
            if let DispatchOutcome::Malformed(e) = &outcome {
                warn!(%bus, error = %e, "feedback rejected");
            }
            Ok(outcome == DispatchOutcome::Delivered)
        }
        None => {
            eprintln!("recv: no frame within {recv_ms} ms");
            Ok(false)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn can_list_backend(backend: Backend, bitrate: Option<Bitrate>) -> Result<()> {
    match backend {
        Backend::Mock => {
            for bus in can::MockBus::list()? {
                println!("{}\t{}", bus.name, bus.driver);
            }
        }
        Backend::Slcan => {
            let suffix = bitrate
                .map(|b| format!("\tbitrate={}", b.as_str()))
                .unwrap_or_default();
            for bus in can::SlcanBus::list()? {
                println!("{}\t{}{}", bus.name, bus.driver, suffix);
            }
        }
    }
    Ok(())
}

fn can_sniff_backend(
    backend: Backend,
    device: &str,
    count: u32,
    bitrate: Option<Bitrate>,
    rig_path: Option<&str>,
    bus: BusSelector,
) -> Result<()> {
    let mut iface = open_iface(backend, device, bitrate)?;
    let registry = BusRegistry::new();
    let mut rig = match rig_path {
        Some(p) => Rig::bind(&load_rig_file(p)?, &registry)?,
        None => Rig::default(),
    };
    let timeout = match backend {
        Backend::Mock => 250,
        Backend::Slcan => 500,
    };

    for _ in 0..count {
        let Some((frame, outcome)) = pump_once(&registry, bus, &mut iface, Some(timeout))? else {
            break;
        };
        print_frame(&frame);
        match outcome {
            DispatchOutcome::Delivered => {
                for rec in rig.telemetry().iter().filter(|r| r.bus == bus) {
                    print_json(rec)?;
                }
            }
            DispatchOutcome::Unmatched => {}
            other => eprintln!("\t{other:?}"),
        }
    }
    rig.unbind(&registry);
    Ok(())
}

fn can_send_backend(
    backend: Backend,
    device: &str,
    id_str: &str,
    data_hex: &[String],
    bitrate: Option<Bitrate>,
) -> Result<()> {
    let id = parse_can_id(id_str).ok_or_else(|| anyhow!("invalid CAN id: {id_str}"))?;
    let bytes = parse_hex_bytes(data_hex)?;
    let frame = can::CanFrame::new(id, &bytes).ok_or_else(|| anyhow!("invalid frame length"))?;

    let mut iface = open_iface(backend, device, bitrate)?;
    iface.send(&frame)?;
    info!(device, ?backend, "sent frame");
    Ok(())
}

#[derive(Serialize)]
struct MotorRow<'a> {
    name: &'a str,
    driver: &'static str,
    bus: BusSelector,
    id: u32,
}

fn rig_check(path: &str) -> Result<()> {
    let cfg = load_rig_file(path)?;
    for bus in BusSelector::ALL {
        match cfg.bus(bus) {
            Some(bc) => println!(
                "{bus}\t{:?}\t{}\tbitrate={}",
                bc.backend,
                bc.device,
                bc.bitrate.as_deref().unwrap_or("default")
            ),
            None => println!("{bus}\tunconfigured"),
        }
    }
    for m in &cfg.motors {
        print_json(&MotorRow {
            name: &m.name,
            driver: m.driver.kind(),
            bus: m.bus,
            id: m.driver.id(),
        })?;
    }

    let registry = BusRegistry::new();
    let mut rig = Rig::bind(&cfg, &registry)?;
    for bus in BusSelector::ALL {
        for e in registry.entries(bus) {
            println!(
                "{bus}\t{:?}\tid=0x{:X}\tmask=0x{:X}",
                e.id_type, e.id, e.mask
            );
        }
    }
    rig.unbind(&registry);
    println!("rig ok: {} motors", cfg.motors.len());
    Ok(())
}

fn monitor(path: &str, polls: u32, timeout_ms: u64, show_metrics: bool) -> Result<()> {
    let cfg = load_rig_file(path)?;
    let pair = open_rig_buses(&cfg)?;
    let attached: Vec<BusSelector> = BusSelector::ALL
        .into_iter()
        .filter(|b| pair.is_attached(*b))
        .collect();
    if attached.is_empty() {
        bail!("{path} configures no buses");
    }

    let registry = BusRegistry::new();
    let mut rig = Rig::bind(&cfg, &registry)?;
    let metrics = MetricsHub::new()?;
    metrics.bus.motors_bound.set(rig.len() as i64);

    for _ in 0..polls {
        let mut delivered = false;
        for &bus in &attached {
            let mut iface = pair.lock(bus)?;
            if let Some((_, outcome)) = pump_once(&registry, bus, &mut *iface, Some(timeout_ms))? {
                metrics.observe(&outcome);
                delivered |= outcome == DispatchOutcome::Delivered;
            }
        }
        if delivered {
            for rec in rig.telemetry() {
                print_json(&rec)?;
            }
        }
    }

    info!(stats = ?registry.stats().snapshot(), "monitor done");
    if show_metrics {
        print!("{}", metrics.encode_text());
    }
    rig.unbind(&registry);
    Ok(())
}

fn dji_current(target: &Target, motor: &str, value: i16, kind: ControlKind) -> Result<()> {
    let motor_id = motor_id::<u16>(motor)?;
    let (group, slot) = dji::command_slot(kind, motor_id)?;
    let mut values = [0i16; 4];
    values[slot] = value;

    let (bus, tx) = target.open()?;
    match kind {
        ControlKind::Current => dji::set_current(&tx, bus, group, values)?,
        ControlKind::Gm6020Voltage => dji::gm6020_voltage_control(&tx, bus, group, values)?,
        ControlKind::Gm6020Current => dji::gm6020_current_control(&tx, bus, group, values)?,
    }
    info!(%bus, group = %format!("0x{group:03X}"), slot, value, "dji setpoint sent");
    report_sent(&tx, bus)
}

fn ak_mit(
    target: &Target,
    model: AkModel,
    id: &str,
    action: MitAction,
    cmd: &MitCommand,
) -> Result<()> {
    let (bus, tx) = target.open()?;
    let registry = BusRegistry::new();
    let motor = AkMotor::init(&registry, bus, model, AkMode::Mit, motor_id(id)?)?;
    match action {
        MitAction::Enter => motor.mit_enter(&tx)?,
        MitAction::Exit => motor.mit_exit(&tx)?,
        MitAction::Origin => motor.mit_set_origin(&tx)?,
        MitAction::Command => motor.mit_send(&tx, cmd)?,
    }
    report_sent(&tx, bus)?;
    if await_feedback(&registry, tx.inner(), bus, target.recv_ms)? {
        print_json(&*motor.state())?;
    }
    motor.deinit(&registry)?;
    Ok(())
}

fn ak_servo(
    target: &Target,
    model: AkModel,
    id: &str,
    action: ServoAction,
    value: f32,
    (spd, rpa): (f32, f32),
    origin: OriginMode,
) -> Result<()> {
    let (bus, tx) = target.open()?;
    let registry = BusRegistry::new();
    let motor = AkMotor::init(&registry, bus, model, AkMode::Servo, motor_id(id)?)?;
    match action {
        ServoAction::Duty => motor.set_duty(&tx, value)?,
        ServoAction::Current => motor.set_current(&tx, value)?,
        ServoAction::Brake => motor.set_brake_current(&tx, value)?,
        ServoAction::Rpm => motor.set_rpm(&tx, value)?,
        ServoAction::Pos => motor.set_pos(&tx, value)?,
        ServoAction::Origin => motor.set_origin(&tx, origin)?,
        ServoAction::PosSpd => motor.set_pos_spd(&tx, value, spd, rpa)?,
    }
    report_sent(&tx, bus)?;
    if await_feedback(&registry, tx.inner(), bus, target.recv_ms)? {
        print_json(&*motor.state())?;
    }
    motor.deinit(&registry)?;
    Ok(())
}

fn vesc_set(
    target: &Target,
    id: &str,
    action: VescAction,
    value: f32,
    max: Option<f32>,
    store: bool,
) -> Result<()> {
    let (bus, tx) = target.open()?;
    let registry = BusRegistry::new();
    let vesc = VescMotor::init(&registry, bus, motor_id(id)?)?;
    match action {
        VescAction::Duty => vesc.set_duty(&tx, value)?,
        VescAction::Current => vesc.set_current(&tx, value)?,
        VescAction::Brake => vesc.set_brake_current(&tx, value)?,
        VescAction::Erpm => vesc.set_erpm(&tx, value)?,
        VescAction::Pos => vesc.set_pos(&tx, value)?,
        VescAction::RelCurrent => vesc.set_relative_current(&tx, value)?,
        VescAction::RelBrake => vesc.set_relative_brake_current(&tx, value)?,
        VescAction::CurrentLimit => {
            let max = max.ok_or_else(|| anyhow!("current-limit needs --max"))?;
            vesc.set_current_limit(&tx, value, max, store)?
        }
    }
    report_sent(&tx, bus)?;
    if await_feedback(&registry, tx.inner(), bus, target.recv_ms)? {
        print_json(&*vesc.state())?;
    }
    vesc.deinit(&registry)?;
    Ok(())
}

fn mlds_speed(target: &Target, id: &str, speed: i32, set_mode: bool) -> Result<()> {
    let (bus, tx) = target.open()?;
    let drive = MldsMotor::new(bus, motor_id(id)?);
    if set_mode {
        drive.set_mode(&tx, SignalSource::Digital, ControlMode::Speed)?;
    }
    drive.run_speed(&tx, speed)?;
    report_sent(&tx, bus)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Bitrate {
    #[value(name = "10k")]
    B10k,
    #[value(name = "20k")]
    B20k,
    #[value(name = "50k")]
    B50k,
    #[value(name = "100k")]
    B100k,
    #[value(name = "125k")]
    B125k,
    #[value(name = "250k")]
    B250k,
    #[value(name = "500k")]
    B500k,
    #[value(name = "800k")]
    B800k,
    #[value(name = "1m")]
    B1M,
}

impl Bitrate {
    fn into_transport(self) -> can::SlcanBitrate {
        match self {
            Bitrate::B10k => can::SlcanBitrate::B10k,
            Bitrate::B20k => can::SlcanBitrate::B20k,
            Bitrate::B50k => can::SlcanBitrate::B50k,
            Bitrate::B100k => can::SlcanBitrate::B100k,
            Bitrate::B125k => can::SlcanBitrate::B125k,
            Bitrate::B250k => can::SlcanBitrate::B250k,
            Bitrate::B500k => can::SlcanBitrate::B500k,
            Bitrate::B800k => can::SlcanBitrate::B800k,
            Bitrate::B1M => can::SlcanBitrate::B1M,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Bitrate::B10k => "10k",
            Bitrate::B20k => "20k",
            Bitrate::B50k => "50k",
            Bitrate::B100k => "100k",
            Bitrate::B125k => "125k",
            Bitrate::B250k => "250k",
            Bitrate::B500k => "500k",
            Bitrate::B800k => "800k",
            Bitrate::B1M => "1m",
        }
    }
}

fn parse_ak_model(s: &str) -> Result<AkModel, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|e| e.to_string())
}

/// Motor ids accept decimal or `0x` hex, narrowed to what the driver addresses.
fn motor_id<T: TryFrom<u32>>(s: &str) -> Result<T> {
    let raw = motor_drivers::parse_id(s).ok_or_else(|| anyhow!("invalid motor id: {s}"))?;
    T::try_from(raw).map_err(|_| anyhow!("motor id out of range: {s}"))
}

/// Raw CAN ids are always hex; anything above 0x7FF is extended.
fn parse_can_id(s: &str) -> Option<can::CanId> {
    let s_trim = s.trim();
    let no_prefix = s_trim.strip_prefix("0x").unwrap_or(s_trim);
    let parsed = u32::from_str_radix(no_prefix, 16).ok()?;
    if parsed <= 0x7FF {
        can::CanId::standard(parsed as u16)
    } else {
        can::CanId::extended(parsed)
    }
}

fn parse_hex_bytes(items: &[String]) -> Result<Vec<u8>> {
    items
        .iter()
        .map(|s| {
            let t = s.trim();
            let no_prefix = t.strip_prefix("0x").unwrap_or(t);
            u8::from_str_radix(no_prefix, 16).map_err(|e| anyhow!("invalid hex byte '{t}': {e}"))
        })
        .collect()
}

fn print_frame(f: &can::CanFrame) {
    let ts = f
        .timestamp
        .and_then(|t| {
            t.0.format(&time::format_description::well_known::Rfc3339)
                .ok()
        })
        .unwrap_or_default();
    let data = f
        .payload()
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{}\tlen={}\t{data}\t{ts}", f.id, f.len);
}
