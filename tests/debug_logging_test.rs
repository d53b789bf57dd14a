//! Verifies that failure paths which are deliberately non-fatal (an invalid
//! skill manifest, a `FailOpen` hook handler erroring) still leave a trace
//! via `tracing`, instead of failing silently.

use open_agent_rt::{ErrorPolicy, HookBus, HookContext, HookEvent, SkillManager, SkillMode};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = SharedBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capturing_subscriber() -> (impl tracing::Subscriber, Arc<Mutex<Vec<u8>>>) {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer = SharedBuffer(buf.clone());
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_max_level(tracing::Level::WARN)
        .without_time()
        .with_ansi(false)
        .finish();
    (subscriber, buf)
}

#[test]
fn invalid_skill_manifest_logs_a_warning_instead_of_aborting_discovery() {
    let tmp = tempfile::tempdir().unwrap();
    let bad_dir = tmp.path().join("not-a-skill");
    std::fs::create_dir_all(&bad_dir).unwrap();
    std::fs::write(bad_dir.join("SKILL.md"), "no front matter here").unwrap();

    let (subscriber, buf) = capturing_subscriber();
    let manager = tracing::subscriber::with_default(subscriber, || {
        SkillManager::discover(&[tmp.path().to_path_buf()], SkillMode::Activation).unwrap()
    });
    assert!(manager.skills().is_empty());

    let output = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
    assert!(output.contains("skipping invalid skill manifest"));
}

#[tokio::test]
async fn fail_open_hook_handler_error_is_logged_and_does_not_abort_emission() {
    let bus = HookBus::default();
    bus.register(
        HookEvent::ToolRegisterBefore,
        open_agent_rt::HookRegistration::new(|_ctx| async move { Err(open_agent_rt::Error::other("boom")) })
            .error_policy(ErrorPolicy::FailOpen),
    );

    let (subscriber, buf) = capturing_subscriber();
    let guard = tracing::subscriber::set_default(subscriber);
    let result = bus
        .emit(HookContext::new(HookEvent::ToolRegisterBefore, "registry"))
        .await;
    drop(guard);

    assert!(result.is_ok());
    let output = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
    assert!(output.contains("hook handler failed"));
}
