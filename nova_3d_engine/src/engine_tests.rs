use super::*;
use serial_test::serial;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// Backend registry tests
// ============================================================================

fn dummy_factory(_window: &Window, _config: &EngineConfig) -> Result<Arc<dyn GraphicsDevice>> {
    Err(Error::InitializationFailed("dummy backend".to_string()))
}

#[test]
#[serial]
fn test_register_backend() {
    Engine::reset_for_testing();
    assert!(!Engine::backend_registered("dummy"));

    Engine::register_backend("dummy", dummy_factory);
    assert!(Engine::backend_registered("dummy"));
}

#[test]
#[serial]
fn test_register_backend_replaces_previous() {
    Engine::reset_for_testing();
    Engine::register_backend("dummy", dummy_factory);
    Engine::register_backend("dummy", dummy_factory);
    assert!(Engine::backend_registered("dummy"));
}

#[test]
#[serial]
fn test_unknown_backend_not_registered() {
    Engine::reset_for_testing();
    assert!(!Engine::backend_registered("does-not-exist"));
}

// ============================================================================
// Logging API tests
// ============================================================================

static CAPTURED: Mutex<Vec<(LogSeverity, String, String)>> = Mutex::new(Vec::new());
static CAPTURE_COUNT: AtomicUsize = AtomicUsize::new(0);

struct CaptureLogger;

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        CAPTURED.lock().unwrap().push((
            entry.severity,
            entry.source.clone(),
            entry.message.clone(),
        ));
        CAPTURE_COUNT.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
#[serial]
fn test_log_routes_through_custom_logger() {
    CAPTURED.lock().unwrap().clear();
    Engine::set_logger(CaptureLogger);

    Engine::log(LogSeverity::Info, "nova3d::Test", "hello".to_string());

    {
        let captured = CAPTURED.lock().unwrap();
        let entry = captured.last().expect("log entry captured");
        assert_eq!(entry.0, LogSeverity::Info);
        assert_eq!(entry.1, "nova3d::Test");
        assert_eq!(entry.2, "hello");
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_log_detailed_carries_severity() {
    CAPTURED.lock().unwrap().clear();
    Engine::set_logger(CaptureLogger);

    Engine::log_detailed(
        LogSeverity::Error,
        "nova3d::Test",
        "boom".to_string(),
        file!(),
        line!(),
    );

    {
        let captured = CAPTURED.lock().unwrap();
        let entry = captured.last().expect("log entry captured");
        assert_eq!(entry.0, LogSeverity::Error);
        assert_eq!(entry.2, "boom");
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_reset_logger_restores_default() {
    Engine::set_logger(CaptureLogger);
    Engine::reset_logger();

    // After reset, the capture logger no longer receives entries
    let before = CAPTURE_COUNT.load(Ordering::SeqCst);
    Engine::log(LogSeverity::Info, "nova3d::Test", "after reset".to_string());
    assert_eq!(CAPTURE_COUNT.load(Ordering::SeqCst), before);
}
