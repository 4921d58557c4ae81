use std::cell::RefCell;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glow_core::beacon::{AdvertisingKind, BeaconAddress, TxPowerStep};
use glow_core::collaborators::{
    BeaconRadio, BringUpError, Collaborators, EnvelopeTickControl, LightOutputs, LivenessWatchdog,
    PatternEmitter, Platform, TransportEvent, TransportFault, UpdateTransport,
};
use glow_core::config::{EnvelopeConfig, TimingConfig};
use glow_core::debounce::Level;
use glow_core::device::{BootReport, DeviceContext};
use glow_core::emission::{EmissionPattern, POWER_CODES};
use glow_core::envelope::{PwmTick, SharedBrightness};
use glow_core::mode::Mode;
use glow_core::telemetry::EventId;
use glow_core::time::Instant;
use rand::SeedableRng;
use rand::rngs::SmallRng;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("press", "press                          - drive the button high"),
    ("release", "release                        - drive the button low"),
    ("wait", "wait <ms>                      - run loop passes for <ms>"),
    ("status", "status                         - show device and collaborator state"),
    (
        "transfer",
        "transfer <start|complete|fail> - queue an update-transport event",
    ),
    ("radio", "radio down                     - unfit the beacon radio from the next boot"),
    ("stall", "stall <ms>                     - block the loop for <ms>, then run one pass"),
    ("help", "help [topic]                   - show help for a command"),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferCommand {
    Start,
    Complete,
    Fail,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Press,
    Release,
    Wait(u64),
    Status,
    Transfer(TransferCommand),
    RadioDown,
    Stall(u64),
    Help(Option<String>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    Empty,
    UnknownCommand(String),
    MissingArgument(&'static str),
    InvalidArgument(String),
    UnexpectedArgument(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::UnknownCommand(word) => write!(f, "unknown command `{word}`"),
            ParseError::MissingArgument(what) => write!(f, "missing {what}"),
            ParseError::InvalidArgument(word) => write!(f, "invalid argument `{word}`"),
            ParseError::UnexpectedArgument(word) => write!(f, "unexpected argument `{word}`"),
        }
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut words = line.split_whitespace();
        let head = words.next().ok_or(ParseError::Empty)?.to_ascii_lowercase();

        let command = match head.as_str() {
            "press" => Command::Press,
            "release" => Command::Release,
            "status" => Command::Status,
            "wait" => Command::Wait(parse_millis(words.next())?),
            "stall" => Command::Stall(parse_millis(words.next())?),
            "transfer" => {
                let action = words
                    .next()
                    .ok_or(ParseError::MissingArgument("transfer action"))?;
                Command::Transfer(match action.to_ascii_lowercase().as_str() {
                    "start" => TransferCommand::Start,
                    "complete" => TransferCommand::Complete,
                    "fail" => TransferCommand::Fail,
                    _ => return Err(ParseError::InvalidArgument(action.to_string())),
                })
            }
            "radio" => match words.next() {
                Some(word) if word.eq_ignore_ascii_case("down") => Command::RadioDown,
                Some(word) => return Err(ParseError::InvalidArgument(word.to_string())),
                None => return Err(ParseError::MissingArgument("radio action")),
            },
            "help" => Command::Help(words.next().map(str::to_string)),
            _ => return Err(ParseError::UnknownCommand(head)),
        };

        match words.next() {
            Some(extra) => Err(ParseError::UnexpectedArgument(extra.to_string())),
            None => Ok(command),
        }
    }
}

fn parse_millis(word: Option<&str>) -> Result<u64, ParseError> {
    let word = word.ok_or(ParseError::MissingArgument("duration in ms"))?;
    word.trim_end_matches("ms")
        .parse()
        .map_err(|_| ParseError::InvalidArgument(word.to_string()))
}

/// Boot-time settings taken from the command line.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    pub maintenance: bool,
    pub seed: u64,
    pub radio_fitted: bool,
    pub transcript: Option<PathBuf>,
}

/// Running totals of collaborator activity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    pub transmits: u64,
    pub rotations: u64,
    pub feeds: u64,
    pub services: u64,
}

/// Simulated hardware shared by every collaborator.
#[derive(Debug, Default)]
struct Board {
    clock_ms: u64,
    radio_fitted: bool,
    advertising: bool,
    transport_open: bool,
    pending_transfer: Option<TransferCommand>,
    watchdog_released: bool,
    tick_suspended: bool,
    lights_on: bool,
    last_pattern: Option<EmissionPattern>,
    counters: Counters,
}

type SharedBoard = Rc<RefCell<Board>>;

struct SimEmitter(SharedBoard);

impl PatternEmitter for SimEmitter {
    fn transmit(&mut self, pattern: &EmissionPattern) {
        let mut board = self.0.borrow_mut();
        board.counters.transmits += 1;
        board.last_pattern = Some(*pattern);
    }
}

struct SimRadio(SharedBoard);

impl BeaconRadio for SimRadio {
    fn bring_up(&mut self) -> Result<(), BringUpError> {
        if self.0.borrow().radio_fitted {
            Ok(())
        } else {
            Err(BringUpError::Unavailable)
        }
    }

    fn set_address(&mut self, _: BeaconAddress) {}

    fn set_advertisement_payload(&mut self, _: &[u8]) {}

    fn set_advertising_kind(&mut self, _: AdvertisingKind) {}

    fn set_tx_power(&mut self, _: TxPowerStep) {}

    fn start(&mut self) {
        let mut board = self.0.borrow_mut();
        board.advertising = true;
        board.counters.rotations += 1;
    }

    fn stop(&mut self) {
        self.0.borrow_mut().advertising = false;
    }
}

struct SimTransport(SharedBoard);

impl UpdateTransport for SimTransport {
    fn begin(&mut self) -> Result<(), BringUpError> {
        self.0.borrow_mut().transport_open = true;
        Ok(())
    }

    fn service_once(&mut self) -> Result<TransportEvent, TransportFault> {
        let mut board = self.0.borrow_mut();
        board.counters.services += 1;
        match board.pending_transfer.take() {
            None => Ok(TransportEvent::Idle),
            Some(TransferCommand::Start) => Ok(TransportEvent::TransferStarted),
            Some(TransferCommand::Complete) => Ok(TransportEvent::TransferComplete),
            Some(TransferCommand::Fail) => Err(TransportFault::Fatal),
        }
    }

    fn end(&mut self) {
        self.0.borrow_mut().transport_open = false;
    }
}

struct SimWatchdog(SharedBoard);

impl LivenessWatchdog for SimWatchdog {
    fn feed(&mut self) {
        let mut board = self.0.borrow_mut();
        if !board.watchdog_released {
            board.counters.feeds += 1;
        }
    }

    fn release(&mut self) {
        self.0.borrow_mut().watchdog_released = true;
    }
}

struct SimLights(SharedBoard);

impl LightOutputs for SimLights {
    fn drive(&mut self, on: bool) {
        self.0.borrow_mut().lights_on = on;
    }
}

struct SimTick(SharedBoard);

impl EnvelopeTickControl for SimTick {
    fn suspend(&mut self) {
        self.0.borrow_mut().tick_suspended = true;
    }
}

struct SimPlatform;

impl Platform for SimPlatform {
    type Emitter = SimEmitter;
    type Radio = SimRadio;
    type Transport = SimTransport;
    type Watchdog = SimWatchdog;
    type Lights = SimLights;
    type Tick = SimTick;
    type Rng = SmallRng;
}

/// Lit share of the envelope ticks run during the last pass.
#[derive(Clone, Copy, Debug, Default)]
struct DutyWindow {
    lit: u32,
    ticks: u32,
}

impl DutyWindow {
    fn percent(self) -> u32 {
        if self.ticks == 0 {
            0
        } else {
            self.lit * 100 / self.ticks
        }
    }
}

pub struct Session {
    options: SessionOptions,
    timing: TimingConfig,
    envelope: EnvelopeConfig,
    board: SharedBoard,
    brightness: &'static SharedBrightness,
    device: DeviceContext<'static, SimPlatform>,
    pwm: PwmTick,
    tick_lights: SimLights,
    ticks_per_pass: u32,
    duty: DutyWindow,
    button_high: bool,
    boots: u64,
    last_seen: Option<EventId>,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    /// Boots a fresh device. Returns the session and the boot narration.
    pub fn start(options: SessionOptions) -> io::Result<(Self, Vec<String>)> {
        let timing = TimingConfig::default()
            .validated()
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error.to_string()))?;
        let envelope = EnvelopeConfig::default();

        let board = Rc::new(RefCell::new(Board {
            radio_fitted: options.radio_fitted,
            ..Board::default()
        }));
        // One allocation per session; reboots reuse it.
        let brightness: &'static SharedBrightness = Box::leak(Box::new(SharedBrightness::new()));
        let device = build_device(&timing, &envelope, &board, brightness, options.seed);
        let transcript = options
            .transcript
            .as_deref()
            .map(|path| TranscriptLogger::new(path, &options))
            .transpose()?;
        let ticks_per_pass = ticks_per_pass(&timing);

        let mut session = Self {
            tick_lights: SimLights(Rc::clone(&board)),
            pwm: PwmTick::new(envelope.pwm_steps),
            options,
            timing,
            envelope,
            board,
            brightness,
            device,
            ticks_per_pass,
            duty: DutyWindow::default(),
            button_high: false,
            boots: 0,
            last_seen: None,
            transcript,
        };

        let mut lines = Vec::new();
        session.boot(&mut lines);
        session.record_output(&lines)?;
        Ok((session, lines))
    }

    pub fn now(&self) -> Instant {
        Instant::from_millis(self.board.borrow().clock_ms)
    }

    pub fn mode(&self) -> Mode {
        self.device.mode()
    }

    pub fn counters(&self) -> Counters {
        self.board.borrow().counters
    }

    pub fn boots(&self) -> u64 {
        self.boots
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let at = self.now();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(at, TranscriptRole::Host, trimmed)?;
        }

        let mut lines = Vec::new();
        match Command::parse(trimmed) {
            Ok(command) => self.execute(command, &mut lines),
            Err(error) => lines.push(format!("ERR syntax {error}")),
        }

        self.record_output(&lines)?;
        Ok(lines)
    }

    fn execute(&mut self, command: Command, lines: &mut Vec<String>) {
        match command {
            Command::Press => {
                self.button_high = true;
                self.step(lines);
            }
            Command::Release => {
                self.button_high = false;
                self.step(lines);
            }
            Command::Wait(ms) => self.run_for(ms, lines),
            Command::Stall(ms) => {
                self.board.borrow_mut().clock_ms += ms;
                self.step(lines);
            }
            Command::Status => self.describe_status(lines),
            Command::Transfer(action) => {
                let mut board = self.board.borrow_mut();
                if board.transport_open {
                    board.pending_transfer = Some(action);
                    lines.push(format!("OK transfer {action:?} queued for the next poll"));
                } else {
                    lines.push("ERR transport not running".to_string());
                }
            }
            Command::RadioDown => {
                self.board.borrow_mut().radio_fitted = false;
                lines.push("OK radio unfitted from the next boot".to_string());
            }
            Command::Help(topic) => describe_help(topic.as_deref(), lines),
        }
    }

    fn run_for(&mut self, ms: u64, lines: &mut Vec<String>) {
        let until = self.board.borrow().clock_ms + ms;
        while self.board.borrow().clock_ms < until {
            self.step(lines);
        }
    }

    /// One loop pass followed by the envelope ticks that fit into the loop delay.
    fn step(&mut self, lines: &mut Vec<String>) {
        let now = self.now();
        let pass = self.device.poll(now, self.button_high);
        self.run_ticks();
        self.flush_telemetry(lines);

        if let Some(request) = pass.restart
            && request.is_due(now)
        {
            lines.push(format!("[{now}] restart: {}", request.reason));
            self.reboot(lines);
        }

        let delay = u64::try_from(self.timing.loop_delay.as_millis()).unwrap_or(u64::MAX);
        self.board.borrow_mut().clock_ms += delay;
    }

    fn run_ticks(&mut self) {
        self.duty = DutyWindow::default();
        if self.board.borrow().tick_suspended {
            return;
        }
        for _ in 0..self.ticks_per_pass {
            if self.pwm.tick(self.brightness, &mut self.tick_lights) {
                self.duty.lit += 1;
            }
            self.duty.ticks += 1;
        }
    }

    fn boot(&mut self, lines: &mut Vec<String>) {
        self.boots += 1;
        let now = self.now();
        let report = self
            .device
            .boot(now, self.options.maintenance);
        lines.push(describe_boot(self.boots, now, &report));
        self.flush_telemetry(lines);
    }

    fn reboot(&mut self, lines: &mut Vec<String>) {
        {
            let mut board = self.board.borrow_mut();
            board.advertising = false;
            board.transport_open = false;
            board.pending_transfer = None;
            board.watchdog_released = false;
            board.tick_suspended = false;
            board.lights_on = false;
        }
        let seed = self.options.seed.wrapping_add(self.boots);
        self.device = build_device(
            &self.timing,
            &self.envelope,
            &self.board,
            self.brightness,
            seed,
        );
        self.pwm = PwmTick::new(self.envelope.pwm_steps);
        self.last_seen = None;
        self.boot(lines);
    }

    fn flush_telemetry(&mut self, lines: &mut Vec<String>) {
        for record in self.device.telemetry().newer_than(self.last_seen) {
            lines.push(record.to_string());
            self.last_seen = Some(record.id);
        }
    }

    fn describe_status(&self, lines: &mut Vec<String>) {
        let board = self.board.borrow();
        lines.push(format!("[{}] {}", self.now(), self.device.status()));
        lines.push(format!(
            "  lights={} duty={}% tick={} liveness={} beacon={} advertising={} transport={}",
            if board.lights_on { "on" } else { "off" },
            self.duty.percent(),
            if board.tick_suspended { "suspended" } else { "running" },
            if self.device.liveness_enabled() { "fed" } else { "released" },
            if self.device.beacon_enabled() { "enabled" } else { "disabled" },
            board.advertising,
            if board.transport_open { "open" } else { "closed" },
        ));
        let counters = board.counters;
        lines.push(format!(
            "  transmits={} rotations={} feeds={} services={} boots={}",
            counters.transmits, counters.rotations, counters.feeds, counters.services, self.boots,
        ));
        if let Some(pattern) = board.last_pattern {
            lines.push(format!(
                "  last pattern {} {:#x}/{}",
                pattern.protocol, pattern.code, pattern.bits
            ));
        }
        if let Some(request) = self.device.pending_restart() {
            lines.push(format!(
                "  restart pending: {} at {}",
                request.reason,
                request.due_at()
            ));
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let at = self.now();
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(at, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

fn build_device(
    timing: &TimingConfig,
    envelope: &EnvelopeConfig,
    board: &SharedBoard,
    brightness: &'static SharedBrightness,
    seed: u64,
) -> DeviceContext<'static, SimPlatform> {
    let io = Collaborators::<SimPlatform> {
        emitter: SimEmitter(Rc::clone(board)),
        radio: SimRadio(Rc::clone(board)),
        transport: SimTransport(Rc::clone(board)),
        watchdog: SimWatchdog(Rc::clone(board)),
        lights: SimLights(Rc::clone(board)),
        tick: SimTick(Rc::clone(board)),
        rng: SmallRng::seed_from_u64(seed),
    };
    let now = Instant::from_millis(board.borrow().clock_ms);
    DeviceContext::new(
        *timing,
        *envelope,
        &POWER_CODES,
        brightness,
        io,
        Level::Low,
        now,
    )
}

fn ticks_per_pass(timing: &TimingConfig) -> u32 {
    let tick = timing.pwm_tick.as_micros().max(1);
    u32::try_from(timing.loop_delay.as_micros() / tick).unwrap_or(u32::MAX)
}

fn describe_boot(boots: u64, now: Instant, report: &BootReport) -> String {
    let radio = match report.radio {
        Ok(()) => "up".to_string(),
        Err(error) => format!("disabled ({error})"),
    };
    let transport = match report.transport {
        None => "off".to_string(),
        Some(Ok(())) => "open".to_string(),
        Some(Err(error)) => format!("disabled ({error})"),
    };
    format!(
        "[{now}] boot #{boots}: mode={} radio={radio} transport={transport}",
        report.mode
    )
}

fn describe_help(topic: Option<&str>, lines: &mut Vec<String>) {
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, options: &SessionOptions) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        logger.write_header(options)?;
        Ok(logger)
    }

    fn write_header(&mut self, options: &SessionOptions) -> io::Result<()> {
        writeln!(self.writer, "# Glow emulator transcript")?;
        writeln!(
            self.writer,
            "# mode-switch={} seed={} radio={}",
            if options.maintenance { "maintenance" } else { "normal" },
            options.seed,
            if options.radio_fitted { "fitted" } else { "unfitted" },
        )?;
        writeln!(self.writer, "# Timestamps are simulated milliseconds since boot")?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, at: Instant, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            at.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
