//! The single-threaded, cooperative event loop (spec §4.6, §5).
//!
//! Readiness multiplexing uses [`mio`] rather than a hand-rolled
//! `select()`/`fd_set` loop: `mio::Poll` is exactly "a readiness primitive
//! with a short timeout" (spec §2 item 7), and is how a production Rust
//! daemon expresses the same non-blocking, single-threaded I/O model the
//! source's `select()`-based loop uses (see the `mio`-based poller pattern
//! this crate is grounded on, noted in DESIGN.md). One real difference:
//! `mio`/epoll readiness is edge-triggered, so the listener is drained in a
//! loop until `WouldBlock` on every readable event instead of accepting a
//! single connection per iteration — see DESIGN.md for why that is the
//! correct adaptation rather than a deviation.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::clock::Clock;
use crate::config::Config;
use crate::connection::{Connection, Monitor};
use crate::devices::Devices;
use crate::error::ErrorCode;
use crate::motor::MotorTable;
use crate::protocol::{self, Command};
use crate::registry::Registry;
use crate::sim::Simulation;

const LISTENER_TOKEN: Token = Token(0);

fn token_for(idx: usize) -> Token {
    Token(idx + 1)
}

fn index_for(token: Token) -> Option<usize> {
    token.0.checked_sub(1)
}

/// Side effect a dispatched command has on its *connection* (as opposed to
/// the registry/motor state, which [`Server::dispatch`] mutates directly).
/// Kept separate from the response string so `dispatch` stays a pure
/// function of registry + motor state and is directly unit-testable.
enum Effect {
    None,
    InstallMonitor { pv_name: String, interval_ms: u64 },
    ClearMonitor,
    Close,
}

struct DispatchResult {
    response: String,
    effect: Effect,
}

impl DispatchResult {
    fn ok(data: &str) -> Self {
        Self {
            response: protocol::format_ok(data),
            effect: Effect::None,
        }
    }

    fn err(code: ErrorCode) -> Self {
        Self {
            response: protocol::format_err(code),
            effect: Effect::None,
        }
    }
}

pub struct Server {
    config: Config,
    registry: Registry,
    motors: MotorTable,
    sim: Simulation,
    connections: Vec<Option<Connection>>,
    poll: Poll,
    events: Events,
    listener: TcpListener,
    clock: Box<dyn Clock>,
    last_tick_ms: u64,
}

impl Server {
    pub fn bind(config: Config, devices: Devices, clock: Box<dyn Clock>) -> io::Result<Self> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{e}")))?;
        let mut listener = TcpListener::bind(addr)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        log::info!("listening on {addr}");

        let max_clients = config.max_clients;
        let now_ms = clock.now_ms();
        Ok(Self {
            config,
            registry: devices.registry,
            motors: devices.motors,
            sim: devices.sim,
            connections: (0..max_clients).map(|_| None).collect(),
            poll,
            events: Events::with_capacity(128),
            listener,
            clock,
            last_tick_ms: now_ms,
        })
    }

    /// The bound listener address. Mainly useful for tests that bind to
    /// port 0 and need to discover the ephemeral port chosen.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until `shutdown` is observed set. On return, all client sockets
    /// and the listener have been closed (spec §4.6).
    pub fn run(&mut self, shutdown: &AtomicBool) -> io::Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            self.run_once()?;
        }
        self.shutdown();
        Ok(())
    }

    /// One iteration of the loop (spec §4.6, steps 1-6). Split out from
    /// [`Server::run`] so tests can single-step it.
    pub fn run_once(&mut self) -> io::Result<()> {
        let timeout = Duration::from_millis(self.config.select_timeout_ms);
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let tokens: Vec<Token> = self.events.iter().map(|e| e.token()).collect();
        for token in tokens {
            if token == LISTENER_TOKEN {
                self.accept_all();
            } else if let Some(idx) = index_for(token) {
                self.handle_readable(idx);
            }
        }

        self.scan_monitors();
        self.maybe_tick();
        Ok(())
    }

    /// Drains the accept backlog (see module docs on edge-triggering).
    /// Policy: reject, never evict, when the client table is full.
    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.accept_one(stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("accept() failed: {e}");
                    break;
                }
            }
        }
    }

    fn accept_one(&mut self, mut stream: TcpStream, addr: SocketAddr) {
        let Some(slot) = self.connections.iter().position(Option::is_none) else {
            log::warn!("max clients reached, rejecting connection from {addr}");
            return;
        };
        let token = token_for(slot);
        if let Err(e) = self.poll.registry().register(
            &mut stream,
            token,
            Interest::READABLE,
        ) {
            log::error!("failed to register client socket: {e}");
            return;
        }
        log::info!("client connected (slot={slot}, addr={addr})");
        self.connections[slot] = Some(Connection::new(stream, self.config.buffer_size));
    }

    fn handle_readable(&mut self, idx: usize) {
        let mut buf = vec![0u8; self.config.buffer_size];
        let read_result = match self.connections[idx].as_mut() {
            Some(conn) => conn.stream.read(&mut buf),
            None => return,
        };
        match read_result {
            Ok(0) => {
                self.disconnect(idx);
                return;
            }
            Ok(n) => {
                if let Some(conn) = self.connections[idx].as_mut() {
                    conn.feed(&buf[..n]);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                log::error!("recv() failed on slot {idx}: {e}");
                self.disconnect(idx);
                return;
            }
        }
        self.drain_lines(idx);
    }

    fn drain_lines(&mut self, idx: usize) {
        loop {
            let line = match self.connections[idx].as_mut() {
                Some(conn) => conn.next_line(),
                None => return,
            };
            let Some(line) = line else { break };

            let result = match protocol::parse(&line, self.config.pv_name_max) {
                Ok(command) => self.dispatch(&command),
                Err(e) => DispatchResult {
                    response: protocol::format_err(e.code()),
                    effect: Effect::None,
                },
            };

            let now_ms = self.clock.now_ms();
            let Some(conn) = self.connections[idx].as_mut() else {
                return;
            };
            let _ = conn.stream.write(result.response.as_bytes());
            match result.effect {
                Effect::None => {}
                Effect::InstallMonitor {
                    pv_name,
                    interval_ms,
                } => {
                    conn.monitor = Some(Monitor {
                        pv_name,
                        interval_ms,
                        last_emit_ms: now_ms,
                    });
                }
                Effect::ClearMonitor => conn.monitor = None,
                Effect::Close => {
                    self.disconnect(idx);
                    return;
                }
            }
        }
    }

    /// Maps one parsed command to registry/motor mutation plus a response
    /// and connection-level side effect (spec §4.5 dispatch table).
    fn dispatch(&mut self, command: &Command) -> DispatchResult {
        match command {
            Command::Get { pv } => match self.registry.find(pv) {
                Some(h) => DispatchResult::ok(&protocol::format_g6(self.registry.get(h))),
                None => DispatchResult::err(ErrorCode::UnknownPv),
            },
            Command::Put { pv, value } => match self.registry.find(pv) {
                None => DispatchResult::err(ErrorCode::UnknownPv),
                Some(h) => match self.registry.set(h, *value) {
                    Ok(()) => DispatchResult::ok("PUT"),
                    Err(e) => DispatchResult::err(e.code()),
                },
            },
            Command::Ping => DispatchResult::ok("PONG"),
            Command::Quit => DispatchResult {
                response: protocol::format_ok("BYE"),
                effect: Effect::Close,
            },
            Command::Monitor { pv, interval_ms } => DispatchResult {
                response: protocol::format_ok("MONITORING"),
                effect: Effect::InstallMonitor {
                    pv_name: pv.clone(),
                    interval_ms: *interval_ms,
                },
            },
            Command::Stop => DispatchResult {
                response: protocol::format_ok("STOPPED"),
                effect: Effect::ClearMonitor,
            },
            Command::List { pattern } => {
                let data = self
                    .registry
                    .list(pattern.as_deref(), self.config.buffer_size - 16);
                DispatchResult::ok(&data)
            }
            Command::Move { motor, target } => {
                match self.motors.find_by_setpoint_name(&self.registry, motor) {
                    // A missing motor reports as INVALID_VALUE, not
                    // UNKNOWN_PV (spec §4.5: MOVE's only error code).
                    None => DispatchResult::err(ErrorCode::InvalidValue),
                    Some(h) => match self.motors.move_to(&mut self.registry, h, *target) {
                        Ok(()) => DispatchResult::ok("MOVING"),
                        Err(e) => DispatchResult::err(e.code()),
                    },
                }
            }
            Command::Status { motor } => {
                match self.motors.find_by_setpoint_name(&self.registry, motor) {
                    None => DispatchResult::err(ErrorCode::UnknownPv),
                    Some(h) => {
                        let data = if self.motors.is_moving(h) {
                            "MOVING"
                        } else {
                            "IDLE"
                        };
                        DispatchResult::ok(data)
                    }
                }
            }
        }
    }

    /// Emits a `DATA:` frame for every connection whose monitor deadline
    /// has elapsed (spec §4.6 step 5). A subscription on a nonexistent PV
    /// silently no-ops forever (spec §7).
    fn scan_monitors(&mut self) {
        let now_ms = self.clock.now_ms();
        for conn in self.connections.iter_mut().flatten() {
            let Some(monitor) = conn.monitor.as_mut() else {
                continue;
            };
            if now_ms.saturating_sub(monitor.last_emit_ms) < monitor.interval_ms {
                continue;
            }
            monitor.last_emit_ms = now_ms;
            if let Some(h) = self.registry.find(&monitor.pv_name) {
                let frame = protocol::format_data(self.registry.get(h));
                let _ = conn.stream.write(frame.as_bytes());
            }
        }
    }

    /// Advances the simulation + motor kinematics if the tick period has
    /// elapsed (spec §4.6 step 6).
    fn maybe_tick(&mut self) {
        let now_ms = self.clock.now_ms();
        let elapsed_ms = now_ms.saturating_sub(self.last_tick_ms);
        if elapsed_ms < self.config.tick_period_ms {
            return;
        }
        let dt = elapsed_ms as f64 / 1000.0;
        self.sim.tick(&mut self.registry, dt);
        self.motors.tick(&mut self.registry, dt);
        self.last_tick_ms = now_ms;
    }

    fn disconnect(&mut self, idx: usize) {
        if let Some(mut conn) = self.connections[idx].take() {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            log::info!("client disconnected (slot={idx})");
        }
    }

    fn shutdown(&mut self) {
        for idx in 0..self.connections.len() {
            self.disconnect(idx);
        }
        let _ = self.poll.registry().deregister(&mut self.listener);
    }
}
