//! End-to-end bridge tests against a fake guest agent on Unix sockets.

use hyperbridge::agent::{AgentBridge, BridgeState, UnixConnector};
use hyperbridge::config::{HyperConfig, Socket};
use hyperbridge::network::NetworkInterface;
use hyperbridge::pause::PauseProvisioner;
use hyperbridge::protocol::{
    encode_message, read_message, AgentRequest, AgentResponse, Pod, DEFAULT_ROUTE_LABEL,
    PAUSE_BIN_NAME, PAUSE_CONTAINER_NAME, ROOTFS_DIR,
};
use hyperbridge::Error;
use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tempfile::TempDir;

const POD_ID: &str = "testPodID";
const PAUSE_CONTENTS: &[u8] = b"\x7fELF static pause";

struct Env {
    dir: TempDir,
    config: HyperConfig,
    provisioner: Arc<PauseProvisioner>,
}

impl Env {
    fn new(auxiliary: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let pause_bin = dir.path().join("pause-src");
        std::fs::write(&pause_bin, PAUSE_CONTENTS).unwrap();

        let config = HyperConfig {
            sock_ctl_name: sock(&dir, "ctl").to_string_lossy().into_owned(),
            sock_tty_name: sock(&dir, "tty").to_string_lossy().into_owned(),
            sockets: (0..auxiliary)
                .map(|i| Socket {
                    device_id: format!("channel{}", i),
                    id: format!("charch{}", i),
                    host_path: sock(&dir, &format!("aux{}", i)),
                    name: format!("sh.hyper.channel.{}", i),
                })
                .collect(),
            pause_bin_path: pause_bin,
        };

        let provisioner = Arc::new(PauseProvisioner::new(dir.path().join("shared")));
        Self {
            dir,
            config,
            provisioner,
        }
    }

    fn bridge(&self) -> AgentBridge {
        AgentBridge::new(
            POD_ID,
            self.config.clone(),
            Arc::clone(&self.provisioner),
            Arc::new(UnixConnector::new()),
        )
    }

    fn listen(&self, name: &str) -> UnixListener {
        UnixListener::bind(sock(&self.dir, name)).unwrap()
    }
}

fn sock(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(format!("{}.sock", name))
}

/// Guest agent that acknowledges every control command until the host
/// hangs up, returning the commands it saw.
fn fake_agent(ctl: UnixListener, others: Vec<UnixListener>) -> JoinHandle<Vec<AgentRequest>> {
    std::thread::spawn(move || {
        let (mut stream, _) = ctl.accept().unwrap();
        let _held: Vec<UnixStream> = others.iter().map(|l| l.accept().unwrap().0).collect();

        let mut seen = Vec::new();
        while let Ok(req) = read_message::<AgentRequest>(&mut stream) {
            let resp = match req {
                AgentRequest::Ping => AgentResponse::Pong { version: 1 },
                _ => AgentResponse::Ack { data: None },
            };
            seen.push(req);
            if stream.write_all(&encode_message(&resp).unwrap()).is_err() {
                break;
            }
        }
        seen
    })
}

fn interfaces() -> Vec<NetworkInterface> {
    serde_json::from_str(
        r#"[{
            "device": "eth0",
            "addresses": ["192.168.10.2/24", "2001:db8::2/64"],
            "mtu": 1500,
            "routes": [
                {"dst": "192.168.10.1/32"},
                {"dst": "0.0.0.0/0", "gw": "192.168.0.0"},
                {"dst": "2001:db8::/32"}
            ]
        }]"#,
    )
    .unwrap()
}

fn start_pod(seen: &[AgentRequest]) -> &Pod {
    match &seen[0] {
        AgentRequest::StartPod(pod) => pod,
        other => panic!("expected start_pod first, got {:?}", other),
    }
}

#[test]
fn test_full_lifecycle_with_auxiliary_channels() {
    let env = Env::new(2);
    let agent = fake_agent(
        env.listen("ctl"),
        vec![env.listen("tty"), env.listen("aux0"), env.listen("aux1")],
    );

    let mut bridge = env.bridge();
    bridge.start(&interfaces()).unwrap();
    assert_eq!(bridge.state(), BridgeState::Running);
    assert_eq!(bridge.auxiliary_count(), 2);

    let staged = env
        .dir
        .path()
        .join("shared")
        .join(POD_ID)
        .join(PAUSE_CONTAINER_NAME)
        .join(ROOTFS_DIR)
        .join(PAUSE_BIN_NAME);
    assert_eq!(std::fs::read(&staged).unwrap(), PAUSE_CONTENTS);

    bridge.remove_container("app").unwrap();
    assert_eq!(bridge.ping().unwrap(), 1);

    bridge.stop();
    assert_eq!(bridge.state(), BridgeState::Stopped);
    assert!(!staged.exists());

    let seen = agent.join().unwrap();
    let pod = start_pod(&seen);
    assert_eq!(pod.routes.len(), 2);
    assert_eq!(pod.routes[0].dest, "192.168.10.1/32");
    assert_eq!(pod.routes[0].gateway, "");
    assert_eq!(pod.routes[0].device, "eth0");
    assert_eq!(pod.routes[1].dest, DEFAULT_ROUTE_LABEL);
    assert_eq!(pod.routes[1].gateway, "192.168.0.0");
    assert_eq!(pod.interfaces[0].ip_addresses.len(), 1);
    assert_eq!(pod.containers[0].id, PAUSE_CONTAINER_NAME);

    assert_eq!(seen.last(), Some(&AgentRequest::DestroyPod));
}

#[test]
fn test_lifecycle_without_auxiliary_channels() {
    let env = Env::new(0);
    let agent = fake_agent(env.listen("ctl"), vec![env.listen("tty")]);

    let mut bridge = env.bridge();
    bridge.start(&[]).unwrap();
    assert_eq!(bridge.auxiliary_count(), 0);
    bridge.stop();

    let seen = agent.join().unwrap();
    assert!(start_pod(&seen).routes.is_empty());
}

#[test]
fn test_missing_console_socket_is_fatal() {
    let env = Env::new(0);
    let _ctl = env.listen("ctl");

    let mut bridge = env.bridge();
    bridge.validate_channels().unwrap();
    let err = bridge.open_channels().unwrap_err();

    match err {
        Error::ChannelOpen { channel, path, .. } => {
            assert_eq!(channel, "console");
            assert_eq!(path, Path::new(&env.config.sock_tty_name));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(bridge.state(), BridgeState::Error);
    assert!(bridge.failure().unwrap().contains("console"));

    // Nothing was staged for the aborted pod.
    assert!(!env.provisioner.destination(POD_ID).exists());
}

#[test]
fn test_bad_channel_count_stops_before_io() {
    let env = Env::new(2);
    let mut config = env.config.clone();
    config.sockets.pop();

    let mut bridge = AgentBridge::new(
        POD_ID,
        config,
        Arc::clone(&env.provisioner),
        Arc::new(UnixConnector::new()),
    );

    // No listeners exist; validation fails before any connect.
    let err = bridge.start(&[]).unwrap_err();
    assert!(err.is_config());
    assert_eq!(bridge.state(), BridgeState::Error);
}
