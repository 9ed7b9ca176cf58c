//! Session accounting for the bastion hop, using a scripted transport

use async_trait::async_trait;
use skyfleet_remote::{RawOutput, RemoteError, RemoteExecutor, RemoteShell, Result, Transport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BASTION: &str = "203.0.113.5";

type Events = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct FakeSession {
    host: String,
    via: Option<String>,
    events: Events,
    closed: bool,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if !self.closed {
            self.events
                .lock()
                .unwrap()
                .push(format!("dropped {}", self.host));
        }
    }
}

#[derive(Default)]
struct FakeTransport {
    events: Events,
    open: Mutex<i32>,
    refuse_host: Option<String>,
    fail_exec: bool,
    exec_error: bool,
    hang_exec: bool,
    stderr: Option<String>,
}

impl FakeTransport {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn open_sessions(&self) -> i32 {
        *self.open.lock().unwrap()
    }

    fn log(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Session = FakeSession;

    async fn connect(&self, host: &str) -> Result<FakeSession> {
        self.log(format!("connect {}", host));
        *self.open.lock().unwrap() += 1;
        Ok(FakeSession {
            host: host.to_string(),
            via: None,
            events: self.events.clone(),
            closed: false,
        })
    }

    async fn connect_via(&self, via: &FakeSession, host: &str) -> Result<FakeSession> {
        self.log(format!("connect {} via {}", host, via.host));
        if self.refuse_host.as_deref() == Some(host) {
            return Err(RemoteError::Connect {
                host: host.to_string(),
                message: "handshake failed".to_string(),
            });
        }
        *self.open.lock().unwrap() += 1;
        Ok(FakeSession {
            host: host.to_string(),
            via: Some(via.host.clone()),
            events: self.events.clone(),
            closed: false,
        })
    }

    async fn exec(&self, session: &FakeSession, script: &str) -> Result<RawOutput> {
        self.log(format!("exec on {} ({:?}): {}", session.host, session.via, script));
        if self.hang_exec {
            std::future::pending::<()>().await;
        }
        if self.exec_error {
            return Err(RemoteError::Session("control socket vanished".to_string()));
        }
        Ok(RawOutput {
            stdout: "uid=1000(ubuntu)\n".to_string(),
            stderr: self.stderr.clone().unwrap_or_default(),
            exit_code: Some(if self.fail_exec { 1 } else { 0 }),
        })
    }

    async fn disconnect(&self, mut session: FakeSession) -> Result<()> {
        session.closed = true;
        self.log(format!("disconnect {}", session.host));
        *self.open.lock().unwrap() -= 1;
        Ok(())
    }
}

#[tokio::test]
async fn test_bastion_is_reached_directly() {
    let executor = RemoteExecutor::new(FakeTransport::default(), BASTION);

    let result = executor.exec(BASTION, "id").await;

    assert!(result.is_ok());
    assert_eq!(
        executor.transport().events(),
        vec![
            format!("connect {}", BASTION),
            format!("exec on {} (None): id", BASTION),
            format!("disconnect {}", BASTION),
        ]
    );
    assert_eq!(executor.transport().open_sessions(), 0);
}

#[tokio::test]
async fn test_private_host_opens_two_nested_sessions() {
    let executor = RemoteExecutor::new(FakeTransport::default(), BASTION);

    let result = executor.exec("10.5.1.20", "id").await;

    assert!(result.is_ok());
    assert_eq!(result.last_line(), "uid=1000(ubuntu)");
    assert_eq!(
        executor.transport().events(),
        vec![
            format!("connect {}", BASTION),
            format!("connect 10.5.1.20 via {}", BASTION),
            format!("exec on 10.5.1.20 (Some(\"{}\")): id", BASTION),
            "disconnect 10.5.1.20".to_string(),
            format!("disconnect {}", BASTION),
        ]
    );
    assert_eq!(executor.transport().open_sessions(), 0);
}

#[tokio::test]
async fn test_sessions_released_when_command_fails() {
    let transport = FakeTransport {
        fail_exec: true,
        stderr: Some("mount: wrong fs type".to_string()),
        ..Default::default()
    };
    let executor = RemoteExecutor::new(transport, BASTION);

    let result = executor.exec("10.5.1.20", "mount /dev/nvme1n1 /data").await;

    assert!(matches!(
        result.error,
        Some(RemoteError::CommandFailed { code: 1, .. })
    ));
    assert_eq!(executor.transport().open_sessions(), 0);
}

#[tokio::test]
async fn test_outer_session_released_when_tunnel_fails() {
    let transport = FakeTransport {
        refuse_host: Some("10.5.1.20".to_string()),
        ..Default::default()
    };
    let executor = RemoteExecutor::new(transport, BASTION);

    let result = executor.exec("10.5.1.20", "id").await;

    assert!(matches!(result.error, Some(RemoteError::Connect { .. })));
    assert_eq!(executor.transport().open_sessions(), 0);
    assert_eq!(
        executor.transport().events().last().unwrap(),
        &format!("disconnect {}", BASTION)
    );
}

#[tokio::test]
async fn test_stderr_with_success_is_an_error() {
    let transport = FakeTransport {
        stderr: Some("sudo: unable to resolve host".to_string()),
        ..Default::default()
    };
    let executor = RemoteExecutor::new(transport, BASTION);

    let err = executor.exec_and_last_line(BASTION, "id").await.unwrap_err();
    assert!(matches!(err, RemoteError::Stderr(_)));
}

#[tokio::test(start_paused = true)]
async fn test_ping_retries_then_gives_up() {
    let transport = FakeTransport {
        fail_exec: true,
        ..Default::default()
    };
    let executor = RemoteExecutor::new(transport, BASTION);

    let started = tokio::time::Instant::now();
    let result = executor.ping(BASTION, 3, Duration::from_secs(5)).await;

    assert!(!result.is_ok());
    let execs = executor
        .transport()
        .events()
        .iter()
        .filter(|e| e.starts_with("exec"))
        .count();
    assert_eq!(execs, 3);
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test]
async fn test_unknown_bastion_address_fails_without_connecting() {
    let executor = RemoteExecutor::new(FakeTransport::default(), "");

    let result = executor.exec("10.5.1.20", "id").await;

    assert!(matches!(result.error, Some(RemoteError::InvalidConfig(_))));
    assert!(executor.transport().events().is_empty());
}

#[tokio::test]
async fn test_sessions_released_when_transport_exec_errors() {
    let transport = FakeTransport {
        exec_error: true,
        ..Default::default()
    };
    let executor = RemoteExecutor::new(transport, BASTION);

    let result = executor.exec("10.5.1.20", "id").await;

    assert!(matches!(result.error, Some(RemoteError::Session(_))));
    assert_eq!(executor.transport().open_sessions(), 0);
    let events = executor.transport().events();
    assert_eq!(
        &events[events.len() - 2..],
        &["disconnect 10.5.1.20".to_string(), format!("disconnect {}", BASTION)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_exec_drops_both_sessions() {
    let transport = FakeTransport {
        hang_exec: true,
        ..Default::default()
    };
    let executor = RemoteExecutor::new(transport, BASTION);

    let outcome = tokio::time::timeout(Duration::from_secs(5), executor.exec("10.5.1.20", "id")).await;

    assert!(outcome.is_err());
    let events = executor.transport().events();
    assert!(events.contains(&"dropped 10.5.1.20".to_string()), "{:?}", events);
    assert!(events.contains(&format!("dropped {}", BASTION)), "{:?}", events);
    assert!(!events.iter().any(|e| e.starts_with("disconnect")));
}
