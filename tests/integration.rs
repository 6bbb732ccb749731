//! End-to-end protocol tests driven over real TCP sockets against a live
//! [`bl02sim::server::Server`], covering the worked scenarios in spec §7.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bl02sim::clock::MonotonicClock;
use bl02sim::config::Config;
use bl02sim::devices;
use bl02sim::server::Server;
use rand::rngs::StdRng;
use rand::SeedableRng;

struct Harness {
    addr: std::net::SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Harness {
    fn start(max_clients: usize) -> Self {
        let config = Config {
            listen: "127.0.0.1:0".to_owned(),
            max_clients,
            ..Config::default()
        };
        let devices = devices::init(StdRng::seed_from_u64(1234));
        let mut server =
            Server::bind(config, devices, Box::new(MonotonicClock::new())).unwrap();
        let addr = server.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                server.run_once().unwrap();
            }
        });
        // Give the listener a moment to start accepting.
        thread::sleep(Duration::from_millis(20));
        Self {
            addr,
            stop,
            handle: Some(handle),
        }
    }

    fn connect(&self) -> BufReader<TcpStream> {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        BufReader::new(stream)
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn send_line(conn: &mut BufReader<TcpStream>, line: &str) -> String {
    conn.get_mut().write_all(format!("{line}\n").as_bytes()).unwrap();
    let mut response = String::new();
    conn.read_line(&mut response).unwrap();
    response
}

#[test]
fn ping_pong() {
    let harness = Harness::start(8);
    let mut conn = harness.connect();
    assert_eq!(send_line(&mut conn, "PING"), "OK:PONG\n");
}

#[test]
fn get_unknown_pv_reports_error() {
    let harness = Harness::start(8);
    let mut conn = harness.connect();
    assert_eq!(send_line(&mut conn, "GET:NO:SUCH:PV"), "ERR:UNKNOWN_PV\n");
}

#[test]
fn put_then_get_mono_energy_and_readback() {
    let harness = Harness::start(8);
    let mut conn = harness.connect();
    assert_eq!(send_line(&mut conn, "PUT:BL02:MONO:ENERGY:7112"), "OK:PUT\n");
    assert_eq!(send_line(&mut conn, "GET:BL02:MONO:ENERGY"), "OK:7112\n");
    assert_eq!(send_line(&mut conn, "GET:BL02:MONO:ENERGY.RBV"), "OK:7112\n");
}

#[test]
fn put_out_of_range_is_rejected() {
    let harness = Harness::start(8);
    let mut conn = harness.connect();
    assert_eq!(
        send_line(&mut conn, "PUT:BL02:MONO:ENERGY:99999"),
        "ERR:INVALID_VALUE\n"
    );
}

#[test]
fn move_transitions_from_moving_to_idle() {
    let harness = Harness::start(8);
    let mut conn = harness.connect();
    assert_eq!(send_line(&mut conn, "MOVE:BL02:SAMPLE:X:100"), "OK:MOVING\n");
    assert_eq!(send_line(&mut conn, "STATUS:BL02:SAMPLE:X"), "OK:MOVING\n");

    // velocity 1000 units/s, 100 units away: well under 0.2s to converge.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(send_line(&mut conn, "STATUS:BL02:SAMPLE:X"), "OK:IDLE\n");
    assert_eq!(send_line(&mut conn, "GET:BL02:SAMPLE:X.RBV"), "OK:100\n");
}

#[test]
fn list_all_and_by_pattern() {
    let harness = Harness::start(8);
    let mut conn = harness.connect();
    let all = send_line(&mut conn, "LIST");
    assert!(all.contains("BL02:RING:CURRENT"));
    assert!(all.contains("BL02:SAMPLE:X"));

    let filtered = send_line(&mut conn, "LIST:BL02:SAMPLE:*");
    assert!(filtered.contains("BL02:SAMPLE:X"));
    assert!(!filtered.contains("BL02:RING:CURRENT"));
}

#[test]
fn monitor_emits_data_frames_until_stopped() {
    let harness = Harness::start(8);
    let mut conn = harness.connect();
    assert_eq!(
        send_line(&mut conn, "MONITOR:BL02:RING:CURRENT:20"),
        "OK:MONITORING\n"
    );

    let mut frame = String::new();
    conn.read_line(&mut frame).unwrap();
    assert!(frame.starts_with("DATA:"));

    assert_eq!(send_line(&mut conn, "STOP"), "OK:STOPPED\n");
}

#[test]
fn quit_closes_the_connection() {
    let harness = Harness::start(8);
    let mut conn = harness.connect();
    assert_eq!(send_line(&mut conn, "QUIT"), "OK:BYE\n");

    let mut buf = [0u8; 8];
    use std::io::Read;
    let n = conn.get_mut().read(&mut buf).unwrap();
    assert_eq!(n, 0, "socket should be closed after QUIT");
}

#[test]
fn connection_table_full_rejects_new_clients() {
    let harness = Harness::start(1);
    let _first = harness.connect();
    thread::sleep(Duration::from_millis(50));

    let mut second = harness.connect();
    let mut buf = [0u8; 8];
    use std::io::Read;
    let n = second.get_mut().read(&mut buf).unwrap();
    assert_eq!(n, 0, "second connection should be closed immediately");
}
