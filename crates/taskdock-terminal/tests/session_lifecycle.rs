//! Session lifecycle tests against a real /bin/sh.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use taskdock_terminal::OutputFilter;
use taskdock_terminal::PtySession;
use taskdock_terminal::SessionConfig;
use taskdock_terminal::SessionEvent;
use taskdock_terminal::SessionState;

const RECV_WAIT: Duration = Duration::from_millis(100);
const RECV_TRIES: u32 = 50;

fn sh_config(dir: &Path) -> SessionConfig {
    SessionConfig::new(Some(Path::new("/bin/sh")), dir, HashMap::new())
}

/// Drains events, filtering output as the controller would, until the
/// accumulated text contains `needle`, a terminated event arrives, or the
/// budget runs out.
async fn drain_for(
    events: &mut UnboundedReceiver<SessionEvent>,
    needle: Option<&str>,
) -> (String, Option<i32>) {
    let mut filter = OutputFilter::new();
    let mut text = String::new();
    for _ in 0..RECV_TRIES {
        match tokio::time::timeout(RECV_WAIT, events.recv()).await {
            Ok(Some(SessionEvent::Output(bytes))) => {
                text.push_str(&filter.process(&bytes).text);
                if let Some(needle) = needle {
                    if text.contains(needle) {
                        return (text, None);
                    }
                }
            }
            Ok(Some(SessionEvent::Terminated(code))) => return (text, Some(code)),
            Ok(None) => break,
            Err(_) => {}
        }
    }
    (text, None)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn echo_round_trip_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, mut events) = PtySession::spawn(sh_config(dir.path()));
    assert_eq!(session.state(), SessionState::Running);

    // Arithmetic keeps the expected text out of the tty's input echo.
    session.write(b"echo tick-$((40+2))\n");
    let (text, _) = drain_for(&mut events, Some("tick-42")).await;

    assert!(text.contains("tick-42"), "filtered output was: {text:?}");
    assert!(!text.contains('\x1b'));
    assert!(!text.contains('\r'));
    session.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn child_exit_emits_real_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, mut events) = PtySession::spawn(sh_config(dir.path()));

    session.write(b"exit 7\n");
    let (_, code) = drain_for(&mut events, None).await;

    assert_eq!(code, Some(7));
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.last_exit_code(), Some(7));
    session.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_yields_independent_instance() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, events) = PtySession::spawn(sh_config(dir.path()));
    let first_pid = session.pid().expect("first child pid");

    // Input sent to the old instance must never reach the new one.
    session.write(b"echo stale-input\n");
    drop(events);

    let mut events = session.restart();
    let second_pid = session.pid().expect("second child pid");
    assert_ne!(first_pid, second_pid);
    assert_eq!(session.state(), SessionState::Running);

    session.write(b"echo fresh-$((1+1))\n");
    let (text, _) = drain_for(&mut events, Some("fresh-2")).await;
    assert!(text.contains("fresh-2"), "filtered output was: {text:?}");
    assert!(!text.contains("stale-input"));
    session.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_after_termination_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, mut events) = PtySession::spawn(sh_config(dir.path()));

    session.write(b"exit 0\n");
    let (_, code) = drain_for(&mut events, None).await;
    assert_eq!(code, Some(0));

    session.write(b"echo never\n");
    session.send_signal(libc::SIGINT);
    assert_eq!(session.state(), SessionState::Terminated);
    session.close();
}
