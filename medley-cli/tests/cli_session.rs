//! End-to-end: `medley daemon start` in a temp home, driven by `medley server …`.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const FEED: &str = r#"<rss version="2.0"><channel>
  <item><title>Pilot</title><enclosure url="http://example.com/pilot.mp3"/></item>
</channel></rss>"#;

fn medley_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_medley"))
}

fn medley_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(medley_bin());
    cmd.env("HOME", home).env_remove("MEDLEY_PATH");
    cmd
}

struct DaemonProcess {
    child: Child,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(home: &Path) -> Self {
        let child = medley_cmd(home)
            .args(["daemon", "start", "--no-log"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self {
            child,
            home: home.to_path_buf(),
        }
    }

    /// Wait for a clean exit after `server shutdown`.
    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        wait_until(timeout, || matches!(self.child.try_wait(), Ok(Some(_))))
    }

    fn stop(&mut self) {
        let _ = medley_cmd(&self.home).args(["daemon", "stop"]).status();
        if !self.wait_for_exit(Duration::from_secs(2)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn daemon_answers(home: &Path) -> bool {
    medley_cmd(home)
        .args(["server", "stats"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run medley");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf-8 output")
}

#[test]
fn server_commands_against_running_daemon() {
    let home = TempDir::new().expect("home");
    let music = home.path().join("music");
    std::fs::create_dir_all(music.join("live")).unwrap();
    std::fs::write(music.join("a.ogg"), b"OggS").unwrap();
    std::fs::write(music.join("live/b.ogg"), b"OggS").unwrap();
    std::fs::write(music.join("c.mp3"), b"ID3").unwrap();
    let feed = home.path().join("show.rss");
    std::fs::write(&feed, FEED).unwrap();

    let mut daemon = DaemonProcess::start(home.path());
    assert!(
        wait_until(Duration::from_secs(10), || daemon_answers(home.path())),
        "daemon did not answer in time"
    );

    medley_cmd(home.path())
        .args(["server", "plugins"])
        .assert()
        .success()
        .stdout(contains("rss             - reader for rss podcasts"));

    medley_cmd(home.path())
        .args(["server", "browse", &format!("file://{}", feed.display())])
        .assert()
        .success()
        .stdout(contains("http://example.com/pilot.mp3"));

    // Recursive directory import, then a wildcard that only picks c.mp3.
    medley_cmd(home.path())
        .args(["server", "import", "--non-recursive"])
        .arg(music.join("*.mp3"))
        .assert()
        .success();
    medley_cmd(home.path())
        .args(["server", "import"])
        .arg(music.join("live"))
        .arg(music.join("a.ogg"))
        .assert()
        .success();

    let info = stdout_of(medley_cmd(home.path()).args(["info", "*"]));
    assert_eq!(info.matches("[server] url = ").count(), 3, "{info}");
    assert!(info.contains("c.mp3") && info.contains("live/b.ogg"));
    assert!(info.contains("\n\n"), "entries are separated by a blank line");

    medley_cmd(home.path())
        .args(["server", "property", "1", "rating", "0x05"])
        .assert()
        .success();
    medley_cmd(home.path())
        .args(["server", "property", "1", "rating"])
        .assert()
        .success()
        .stdout(contains("[client/medley-cli] rating = 5"));
    medley_cmd(home.path())
        .args(["server", "property", "--source", "server", "1"])
        .assert()
        .success()
        .stdout(contains("[server] url = ").and(contains("rating").not()));
    medley_cmd(home.path())
        .args(["server", "property", "--source", "server", "1", "url", "x"])
        .assert()
        .failure()
        .stderr(contains("read-only"));

    medley_cmd(home.path())
        .args(["server", "volume", "--channel", "left", "30"])
        .assert()
        .success();
    medley_cmd(home.path())
        .args(["server", "volume", "--channel", "left", "-5"])
        .assert()
        .success();
    medley_cmd(home.path())
        .args(["server", "volume"])
        .assert()
        .success()
        .stdout("left = 25\nright = 100\n");

    medley_cmd(home.path())
        .args(["server", "config", "null.*"])
        .assert()
        .success()
        .stdout("null.volume.left = 25\nnull.volume.right = 100\n");
    medley_cmd(home.path())
        .args(["server", "config", "output.plugin", "pulse"])
        .assert()
        .failure()
        .stderr(contains("pulse"));

    medley_cmd(home.path())
        .args(["server", "remove", "url:*c.mp3"])
        .assert()
        .success();
    let info = stdout_of(medley_cmd(home.path()).args(["info", "*"]));
    assert!(!info.contains("c.mp3"));

    medley_cmd(home.path())
        .args(["server", "stats"])
        .assert()
        .success()
        .stdout(contains("uptime = ").and(contains(concat!("version = ", env!("CARGO_PKG_VERSION")))));

    medley_cmd(home.path())
        .args(["server", "shutdown"])
        .assert()
        .success();
    assert!(daemon.wait_for_exit(Duration::from_secs(10)), "daemon did not exit");

    let saved = std::fs::read_to_string(home.path().join(".medley/medialib.json")).unwrap();
    assert!(saved.contains("a.ogg") && !saved.contains("c.mp3"));
    assert!(!home.path().join(".medley/medley.sock").exists());
}

#[test]
fn commands_without_daemon() {
    let home = TempDir::new().expect("home");

    medley_cmd(home.path())
        .arg("info")
        .assert()
        .failure()
        .stderr(contains("not running"));

    medley_cmd(home.path())
        .args(["server", "import"])
        .assert()
        .failure()
        .stderr(contains("no path to import"));

    medley_cmd(home.path())
        .args(["server", "property", "--int", "--string", "1", "rating", "3"])
        .assert()
        .failure()
        .stderr(contains("mutually exclusive"));

    medley_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("not running"));

    medley_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));
}

#[test]
fn socket_flag_and_env_override_default() {
    let home = TempDir::new().expect("home");
    let elsewhere = home.path().join("other.sock");

    medley_cmd(home.path())
        .args(["server", "stats", "--socket"])
        .arg(&elsewhere)
        .assert()
        .failure()
        .stderr(contains("other.sock"));

    medley_cmd(home.path())
        .env("MEDLEY_PATH", &elsewhere)
        .args(["server", "stats"])
        .assert()
        .failure()
        .stderr(contains("other.sock"));
}

/// Stops a detached daemon through `socket` if a test bails out early.
struct DetachedDaemon {
    home: PathBuf,
    socket: PathBuf,
}

impl Drop for DetachedDaemon {
    fn drop(&mut self) {
        if self.socket.exists() {
            let _ = medley_cmd(&self.home)
                .env("MEDLEY_PATH", &self.socket)
                .args(["daemon", "stop"])
                .status();
        }
    }
}

#[test]
fn detached_daemon_listens_on_env_socket() {
    let home = TempDir::new().expect("home");
    let socket = home.path().join("other.sock");
    let _guard = DetachedDaemon {
        home: home.path().to_path_buf(),
        socket: socket.clone(),
    };

    medley_cmd(home.path())
        .env("MEDLEY_PATH", &socket)
        .args(["daemon", "start", "--detach"])
        .assert()
        .success()
        .stdout(contains("daemon started"));
    assert!(socket.exists());
    assert!(!home.path().join(".medley/medley.sock").exists());

    medley_cmd(home.path())
        .env("MEDLEY_PATH", &socket)
        .args(["server", "stats"])
        .assert()
        .success()
        .stdout(contains("uptime = "));

    medley_cmd(home.path())
        .env("MEDLEY_PATH", &socket)
        .args(["server", "shutdown"])
        .assert()
        .success();
    assert!(
        wait_until(Duration::from_secs(10), || !socket.exists()),
        "detached daemon did not exit"
    );
}
