//! Last-resort panic recorder. A panic that escapes the normal error
//! handling still leaves a readable last-error entry in the state file, so
//! `last-error` can explain why a run died.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// Chains a panic hook that patches the last-error slot straight into the
/// state file. Everything in the hook is best-effort; a failure to write
/// must never mask the panic itself.
pub fn install(state_file: PathBuf) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();

        record_fatal(&state_file, &message, &location);
        previous(info);
    }));
}

fn record_fatal(state_file: &Path, message: &str, location: &str) {
    let Ok(raw) = std::fs::read_to_string(state_file) else {
        return;
    };
    let Ok(mut state) = serde_json::from_str::<Value>(&raw) else {
        return;
    };
    let Some(options) = state
        .get_mut("options")
        .and_then(Value::as_object_mut)
    else {
        return;
    };

    options.insert(
        "last_error".to_string(),
        json!({
            "message": format!("panic: {message}"),
            "location": location,
            "at": chrono::Utc::now().timestamp(),
        }),
    );
    if let Ok(raw) = serde_json::to_string_pretty(&state) {
        let _ = std::fs::write(state_file, raw);
    }
}
